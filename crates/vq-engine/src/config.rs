//! Configuration for quality measurement

use crate::{Result, VisqolError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Operating mode, fixed for the lifetime of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Full-band audio at 48 kHz
    #[default]
    Audio,
    /// Voice-band speech at 16 kHz with voice activity detection
    Speech,
}

impl Mode {
    /// Sample rate every buffer is converted to before analysis
    pub fn sample_rate(&self) -> u32 {
        match self {
            Mode::Audio => 48_000,
            Mode::Speech => 16_000,
        }
    }

    /// Fixed analysis layout for this mode
    pub fn profile(&self) -> ModeProfile {
        match self {
            Mode::Audio => ModeProfile {
                mode: Mode::Audio,
                sample_rate: 48_000,
                num_bands: 32,
                min_freq: 50.0,
                max_freq: 15_000.0,
                window_size: 2048,
                hop_size: 1024,
                patch_size: 30,
                patch_stride: 15,
                search_window: 10,
                use_vad: false,
            },
            Mode::Speech => ModeProfile {
                mode: Mode::Speech,
                sample_rate: 16_000,
                num_bands: 32,
                min_freq: 50.0,
                max_freq: 8_000.0,
                window_size: 256,
                hop_size: 128,
                patch_size: 20,
                patch_stride: 10,
                search_window: 10,
                use_vad: true,
            },
        }
    }

    /// File stem of the bundled/on-disk model resource
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Audio => "audio",
            Mode::Speech => "speech",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-mode analysis constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeProfile {
    pub mode: Mode,

    /// Required sample rate (Hz)
    pub sample_rate: u32,

    /// Number of perceptual frequency bands
    pub num_bands: usize,

    /// Lowest band centre (Hz)
    pub min_freq: f64,

    /// Upper limit of the band layout (Hz)
    pub max_freq: f64,

    /// Analysis window length in samples
    pub window_size: usize,

    /// Hop between analysis frames in samples
    pub hop_size: usize,

    /// Patch length in frames
    pub patch_size: usize,

    /// Patch stride in frames
    pub patch_stride: usize,

    /// Maximum patch offset (frames) tried by patch alignment
    pub search_window: usize,

    /// Exclude silent frames from scoring
    pub use_vad: bool,
}

impl ModeProfile {
    /// Number of analysis frames produced for a buffer of `len` samples.
    ///
    /// Buffers shorter than one window produce a single zero-padded frame.
    pub fn frame_count(&self, len: usize) -> usize {
        if len == 0 {
            0
        } else if len <= self.window_size {
            1
        } else {
            (len - self.window_size) / self.hop_size + 1
        }
    }

    /// Start frames of the patches laid over `num_frames` frames.
    ///
    /// The last patch always ends on the last frame, so a stride that does
    /// not divide the span gets one extra start at `num_frames - patch_size`.
    pub fn patch_starts(&self, num_frames: usize) -> Vec<usize> {
        if num_frames == 0 {
            return Vec::new();
        }
        if num_frames <= self.patch_size {
            return vec![0];
        }
        let last = num_frames - self.patch_size;
        let mut starts: Vec<usize> = (0..=last).step_by(self.patch_stride.max(1)).collect();
        if starts.last() != Some(&last) {
            starts.push(last);
        }
        starts
    }

    /// Patch length for a spectrogram with `num_frames` frames
    pub fn effective_patch_size(&self, num_frames: usize) -> usize {
        self.patch_size.min(num_frames)
    }
}

/// Voice activity detection thresholds (SPEECH mode)
///
/// A frame is active when its level is within `relative_floor_db` of the
/// loudest frame in the buffer and above `absolute_floor_db` dBFS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VadConfig {
    pub relative_floor_db: f64,
    pub absolute_floor_db: f64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            relative_floor_db: 40.0,
            absolute_floor_db: -70.0,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Operating mode
    pub mode: Mode,

    /// Directory holding `<mode>.json` model resources (bundled when unset)
    pub model_dir: Option<PathBuf>,

    /// Voice activity thresholds, used in SPEECH mode only
    pub vad: VadConfig,

    /// Depth (dB) below the pair's loudest cell that spectrograms are floored at
    pub dynamic_range_db: f64,

    /// Worker threads for batch measurement (0 = rayon default)
    pub max_concurrency: usize,

    /// Maximum global lag (seconds) searched by the high-fidelity aligner
    pub max_lag_seconds: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Audio,
            model_dir: None,
            vad: VadConfig::default(),
            dynamic_range_db: 45.0,
            max_concurrency: 0,
            max_lag_seconds: 0.5,
        }
    }
}

impl EngineConfig {
    /// Full-band audio preset
    pub fn audio() -> Self {
        Self::default()
    }

    /// Speech preset
    pub fn speech() -> Self {
        Self {
            mode: Mode::Speech,
            ..Default::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| VisqolError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(self.dynamic_range_db.is_finite() && self.dynamic_range_db > 0.0) {
            return Err(VisqolError::Config(format!(
                "dynamic range must be positive, got {}",
                self.dynamic_range_db
            )));
        }
        if !(self.vad.relative_floor_db.is_finite() && self.vad.relative_floor_db >= 0.0) {
            return Err(VisqolError::Config(format!(
                "VAD relative floor must be non-negative, got {}",
                self.vad.relative_floor_db
            )));
        }
        if !self.vad.absolute_floor_db.is_finite() {
            return Err(VisqolError::Config("VAD absolute floor must be finite".into()));
        }
        if !(self.max_lag_seconds.is_finite() && self.max_lag_seconds >= 0.0) {
            return Err(VisqolError::Config(format!(
                "maximum lag must be non-negative, got {}",
                self.max_lag_seconds
            )));
        }
        Ok(())
    }

    /// Builder pattern: set mode
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Builder pattern: load models from a directory
    pub fn with_model_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.model_dir = Some(dir.into());
        self
    }

    /// Builder pattern: set VAD thresholds
    pub fn with_vad(mut self, vad: VadConfig) -> Self {
        self.vad = vad;
        self
    }

    /// Builder pattern: set spectrogram dynamic range
    pub fn with_dynamic_range_db(mut self, db: f64) -> Self {
        self.dynamic_range_db = db;
        self
    }

    /// Builder pattern: bound batch worker threads
    pub fn with_max_concurrency(mut self, threads: usize) -> Self {
        self.max_concurrency = threads;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_rates() {
        assert_eq!(Mode::default(), Mode::Audio);
        assert_eq!(Mode::Audio.sample_rate(), 48_000);
        assert_eq!(Mode::Speech.sample_rate(), 16_000);
        assert_eq!(Mode::Speech.profile().sample_rate, 16_000);
        assert!(Mode::Audio.profile().window_size > Mode::Speech.profile().window_size);
    }

    #[test]
    fn test_frame_count() {
        let profile = Mode::Audio.profile();
        assert_eq!(profile.frame_count(0), 0);
        assert_eq!(profile.frame_count(10), 1);
        assert_eq!(profile.frame_count(2048), 1);
        // 3 s at 48 kHz
        assert_eq!(profile.frame_count(144_000), 139);
    }

    #[test]
    fn test_patch_starts() {
        let profile = Mode::Audio.profile();
        assert_eq!(profile.patch_starts(0), Vec::<usize>::new());
        assert_eq!(profile.patch_starts(5), vec![0]);
        assert_eq!(profile.patch_starts(30), vec![0]);
        assert_eq!(profile.patch_starts(60), vec![0, 15, 30]);
        assert_eq!(profile.effective_patch_size(5), 5);
    }

    #[test]
    fn test_patch_starts_cover_tail_frames() {
        let profile = Mode::Speech.profile();
        // 1 s at 16 kHz: 124 frames, stride 10 leaves frames 120..124 uncovered
        let starts = profile.patch_starts(124);
        assert_eq!(starts.first(), Some(&0));
        assert_eq!(starts.last(), Some(&104));
        assert_eq!(starts[starts.len() - 2], 100);

        for num_frames in 21..200 {
            let starts = profile.patch_starts(num_frames);
            let last = starts[starts.len() - 1];
            assert_eq!(last + profile.patch_size, num_frames);
            assert!(starts.windows(2).all(|w| w[1] > w[0]));
        }
    }

    #[test]
    fn test_builder_pattern() {
        let config = EngineConfig::speech()
            .with_model_dir("/opt/models")
            .with_dynamic_range_db(60.0)
            .with_max_concurrency(2);

        assert_eq!(config.mode, Mode::Speech);
        assert_eq!(config.model_dir, Some(PathBuf::from("/opt/models")));
        assert_eq!(config.dynamic_range_db, 60.0);
        assert_eq!(config.max_concurrency, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_range() {
        let config = EngineConfig::default().with_dynamic_range_db(0.0);
        assert!(matches!(config.validate(), Err(VisqolError::Config(_))));
    }

    #[test]
    fn test_config_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "mode": "speech", "max_concurrency": 3 }"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.mode, Mode::Speech);
        assert_eq!(config.max_concurrency, 3);
        assert_eq!(config.dynamic_range_db, 45.0);
    }
}

//! Signal loading: file paths and in-memory arrays into mono buffers
//!
//! Multi-channel arrays come in two explicit layouts so there is never a
//! guess about orientation:
//!
//! - [`SampleArray::Planar`] is channel-major: one vector per channel.
//! - [`SampleArray::Interleaved`] is frame-major: `[l0, r0, l1, r1, ...]`,
//!   the memory order of a row-major `(frames, channels)` matrix.
//!
//! Both are downmixed to mono by averaging channels.

use crate::{Result, VisqolError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// In-memory sample data
#[derive(Debug, Clone, PartialEq)]
pub enum SampleArray {
    /// Single channel
    Mono(Vec<f64>),
    /// Channel-major: `channels[c][i]`
    Planar(Vec<Vec<f64>>),
    /// Frame-major interleaved samples
    Interleaved { samples: Vec<f64>, channels: usize },
}

/// Anything a measurement accepts as reference or degraded signal
#[derive(Debug, Clone, PartialEq)]
pub enum AudioInput {
    /// Audio container on disk
    File(PathBuf),
    /// Samples in memory; without a sample rate they are taken to be at the
    /// engine mode's rate
    Array {
        data: SampleArray,
        sample_rate: Option<u32>,
    },
}

impl AudioInput {
    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        AudioInput::File(path.into())
    }

    pub fn mono(samples: Vec<f64>) -> Self {
        AudioInput::Array {
            data: SampleArray::Mono(samples),
            sample_rate: None,
        }
    }

    pub fn planar(channels: Vec<Vec<f64>>) -> Self {
        AudioInput::Array {
            data: SampleArray::Planar(channels),
            sample_rate: None,
        }
    }

    pub fn interleaved(samples: Vec<f64>, channels: usize) -> Self {
        AudioInput::Array {
            data: SampleArray::Interleaved { samples, channels },
            sample_rate: None,
        }
    }

    /// Attach a sample rate to array input. File input keeps its decoded rate.
    pub fn with_sample_rate(self, rate: u32) -> Self {
        match self {
            AudioInput::Array { data, .. } => AudioInput::Array {
                data,
                sample_rate: Some(rate),
            },
            file => file,
        }
    }

    /// Provenance identifier: the path for files, `None` for arrays
    pub fn source_path(&self) -> Option<String> {
        match self {
            AudioInput::File(path) => Some(path.display().to_string()),
            AudioInput::Array { .. } => None,
        }
    }

    /// Human-readable identifier (`"array"` for in-memory input)
    pub fn identifier(&self) -> String {
        self.source_path().unwrap_or_else(|| ARRAY_SOURCE.to_string())
    }
}

/// Identifier used for in-memory input in reports
pub const ARRAY_SOURCE: &str = "array";

impl From<&str> for AudioInput {
    fn from(path: &str) -> Self {
        AudioInput::File(PathBuf::from(path))
    }
}

impl From<String> for AudioInput {
    fn from(path: String) -> Self {
        AudioInput::File(PathBuf::from(path))
    }
}

impl From<&Path> for AudioInput {
    fn from(path: &Path) -> Self {
        AudioInput::File(path.to_path_buf())
    }
}

impl From<PathBuf> for AudioInput {
    fn from(path: PathBuf) -> Self {
        AudioInput::File(path)
    }
}

impl From<&PathBuf> for AudioInput {
    fn from(path: &PathBuf) -> Self {
        AudioInput::File(path.clone())
    }
}

impl From<Vec<f64>> for AudioInput {
    fn from(samples: Vec<f64>) -> Self {
        AudioInput::mono(samples)
    }
}

impl From<&[f64]> for AudioInput {
    fn from(samples: &[f64]) -> Self {
        AudioInput::mono(samples.to_vec())
    }
}

impl From<Vec<f32>> for AudioInput {
    fn from(samples: Vec<f32>) -> Self {
        AudioInput::mono(samples.into_iter().map(f64::from).collect())
    }
}

impl From<&[f32]> for AudioInput {
    fn from(samples: &[f32]) -> Self {
        AudioInput::mono(samples.iter().copied().map(f64::from).collect())
    }
}

impl From<Vec<Vec<f64>>> for AudioInput {
    fn from(channels: Vec<Vec<f64>>) -> Self {
        AudioInput::planar(channels)
    }
}

/// Where a buffer came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceId {
    File(String),
    Array,
}

impl SourceId {
    pub fn path(&self) -> Option<&str> {
        match self {
            SourceId::File(path) => Some(path),
            SourceId::Array => None,
        }
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceId::File(path) => f.write_str(path),
            SourceId::Array => f.write_str(ARRAY_SOURCE),
        }
    }
}

/// Canonical mono signal
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Mono samples
    pub samples: Vec<f64>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Channel count of the source before downmix
    pub source_channels: usize,

    /// Provenance
    pub source: SourceId,
}

impl AudioBuffer {
    /// Wrap mono samples that are already known to be finite
    pub fn mono(samples: Vec<f64>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            source_channels: 1,
            source: SourceId::Array,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.samples.len() as f64 / self.sample_rate as f64
        }
    }

    /// New buffer holding the first `len` samples
    pub fn truncated(&self, len: usize) -> Self {
        Self {
            samples: self.samples[..len.min(self.samples.len())].to_vec(),
            sample_rate: self.sample_rate,
            source_channels: self.source_channels,
            source: self.source.clone(),
        }
    }

    /// Peak absolute amplitude
    pub fn peak(&self) -> f64 {
        self.samples.iter().map(|s| s.abs()).fold(0.0, f64::max)
    }

    /// Level and length summary
    pub fn stats(&self) -> AudioStats {
        let n = self.samples.len();
        let (rms, mean_amplitude) = if n == 0 {
            (0.0, 0.0)
        } else {
            let energy: f64 = self.samples.iter().map(|s| s * s).sum();
            let magnitude: f64 = self.samples.iter().map(|s| s.abs()).sum();
            ((energy / n as f64).sqrt(), magnitude / n as f64)
        };

        AudioStats {
            duration: self.duration(),
            sample_rate: self.sample_rate,
            num_samples: n,
            rms,
            peak: self.peak(),
            mean_amplitude,
        }
    }
}

/// Basic statistics of a mono buffer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioStats {
    /// Seconds
    pub duration: f64,
    pub sample_rate: u32,
    pub num_samples: usize,
    pub rms: f64,
    /// Largest absolute sample
    pub peak: f64,
    /// Mean absolute sample
    pub mean_amplitude: f64,
}

impl std::fmt::Display for AudioStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.3}s @ {} Hz ({} samples), RMS {:.4}, peak {:.4}, mean |x| {:.4}",
            self.duration,
            self.sample_rate,
            self.num_samples,
            self.rms,
            self.peak,
            self.mean_amplitude
        )
    }
}

/// Load any input into a mono buffer.
///
/// `fallback_rate` is the rate assumed for arrays that carry none.
pub fn load(input: &AudioInput, fallback_rate: u32) -> Result<AudioBuffer> {
    match input {
        AudioInput::File(path) => load_file(path),
        AudioInput::Array { data, sample_rate } => {
            load_array(data, sample_rate.unwrap_or(fallback_rate))
        }
    }
}

/// Decode an audio file to mono
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let path_str = path.display().to_string();

    let (interleaved, channels, sample_rate) = if is_wav(path) {
        read_wav(path, &path_str)?
    } else {
        read_symphonia(path, &path_str)?
    };

    if sample_rate == 0 {
        return Err(VisqolError::Decode(format!("{}: sample rate is zero", path_str)));
    }

    let samples = downmix_interleaved(&interleaved, channels);
    if let Some(bad) = samples.iter().position(|s| !s.is_finite()) {
        return Err(VisqolError::Decode(format!(
            "{}: non-finite sample at frame {}",
            path_str, bad
        )));
    }

    debug!(
        "Loaded {}: {} frames, {} channel(s), {} Hz",
        path_str,
        samples.len(),
        channels,
        sample_rate
    );

    Ok(AudioBuffer {
        samples,
        sample_rate,
        source_channels: channels,
        source: SourceId::File(path_str),
    })
}

/// Cheap pre-flight check of an input file.
///
/// Missing files fail with `Io`. WAV files must parse and hold at least one
/// frame (`Decode` / `EmptyAudio`); other containers must be non-empty and
/// recognised by the decoder probe.
pub fn validate_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    let path_str = path.display().to_string();

    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(VisqolError::InvalidInput(format!("{}: not a file", path_str)));
    }
    if metadata.len() == 0 {
        return Err(VisqolError::EmptyAudio(format!("{}: file is empty", path_str)));
    }

    if is_wav(path) {
        let reader = hound::WavReader::open(path)
            .map_err(|e| VisqolError::Decode(format!("{}: {}", path_str, e)))?;
        if reader.duration() == 0 {
            return Err(VisqolError::EmptyAudio(format!("{}: no frames", path_str)));
        }
    } else {
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }
        symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| VisqolError::Decode(format!("{}: {}", path_str, e)))?;
    }
    Ok(())
}

/// Check every path with [`validate_file`], returning the failures in input
/// order. Paths listed more than once are checked once.
pub fn validate_inputs<I, P>(paths: I) -> Vec<(PathBuf, VisqolError)>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut seen = HashSet::new();
    let mut failures = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if !seen.insert(path.to_path_buf()) {
            continue;
        }
        if let Err(e) = validate_file(path) {
            debug!("{} failed validation: {}", path.display(), e);
            failures.push((path.to_path_buf(), e));
        }
    }
    failures
}

/// Validate and downmix an in-memory array
pub fn load_array(data: &SampleArray, sample_rate: u32) -> Result<AudioBuffer> {
    if sample_rate == 0 {
        return Err(VisqolError::InvalidInput("sample rate must be positive".into()));
    }

    let (samples, channels) = match data {
        SampleArray::Mono(samples) => (samples.clone(), 1),
        SampleArray::Planar(planes) => {
            let first = planes
                .first()
                .ok_or_else(|| VisqolError::InvalidInput("array has no channels".into()))?;
            let len = first.len();
            if let Some(ragged) = planes.iter().position(|p| p.len() != len) {
                return Err(VisqolError::InvalidInput(format!(
                    "channel {} has {} samples, channel 0 has {}",
                    ragged,
                    planes[ragged].len(),
                    len
                )));
            }
            let scale = 1.0 / planes.len() as f64;
            let mono = (0..len)
                .map(|i| planes.iter().map(|p| p[i]).sum::<f64>() * scale)
                .collect();
            (mono, planes.len())
        }
        SampleArray::Interleaved { samples, channels } => {
            if *channels == 0 {
                return Err(VisqolError::InvalidInput("array has no channels".into()));
            }
            if samples.len() % channels != 0 {
                return Err(VisqolError::InvalidInput(format!(
                    "{} interleaved samples is not a multiple of {} channels",
                    samples.len(),
                    channels
                )));
            }
            (downmix_interleaved(samples, *channels), *channels)
        }
    };

    if samples.is_empty() {
        return Err(VisqolError::InvalidInput("array is empty".into()));
    }
    if let Some(bad) = samples.iter().position(|s| !s.is_finite()) {
        return Err(VisqolError::InvalidInput(format!(
            "non-finite sample at frame {}",
            bad
        )));
    }

    Ok(AudioBuffer {
        samples,
        sample_rate,
        source_channels: channels,
        source: SourceId::Array,
    })
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

/// Average interleaved frames down to one channel
fn downmix_interleaved(interleaved: &[f64], channels: usize) -> Vec<f64> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let scale = 1.0 / channels as f64;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f64>() * scale)
        .collect()
}

/// Read WAV with hound (exact for 32-bit float)
fn read_wav(path: &Path, path_str: &str) -> Result<(Vec<f64>, usize, u32)> {
    let reader = hound::WavReader::open(path).map_err(|e| match e {
        hound::Error::IoError(io) => VisqolError::Io(io),
        other => VisqolError::Decode(format!("{}: {}", path_str, other)),
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(VisqolError::Decode(format!("{}: no channels", path_str)));
    }

    let samples: Vec<f64> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| VisqolError::Decode(format!("{}: {}", path_str, e)))?,
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            if bits == 0 || bits > 32 {
                return Err(VisqolError::Decode(format!(
                    "{}: unsupported bit depth {}",
                    path_str, bits
                )));
            }
            let max_val = (1i64 << (bits - 1)) as f64;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f64 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| VisqolError::Decode(format!("{}: {}", path_str, e)))?
        }
    };

    Ok((samples, channels, spec.sample_rate))
}

/// Read any other container through symphonia
fn read_symphonia(path: &Path, path_str: &str) -> Result<(Vec<f64>, usize, u32)> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| VisqolError::Decode(format!("{}: {}", path_str, e)))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| VisqolError::Decode(format!("{}: no audio track", path_str)))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| VisqolError::Decode(format!("{}: unknown sample rate", path_str)))?;

    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| VisqolError::Decode(format!("{}: {}", path_str, e)))?;

    let track_id = track.id;
    let mut interleaved = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(VisqolError::Decode(format!("{}: {}", path_str, e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| VisqolError::Decode(format!("{}: {}", path_str, e)))?;

        let spec = *decoded.spec();
        if channels == 0 {
            channels = spec.channels.count();
        }
        let mut buffer = SampleBuffer::<f64>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        interleaved.extend_from_slice(buffer.samples());
    }

    if channels == 0 {
        return Err(VisqolError::Decode(format!("{}: unknown channel count", path_str)));
    }

    Ok((interleaved, channels, sample_rate))
}

//! Backend selection: high-fidelity gammatone pipeline or FFT approximation
//!
//! Both backends turn an aligned reference/degraded pair into per-band patch
//! similarities; the engine never sees which one it holds beyond
//! [`BackendKind`]. Availability is probed once, when the engine is built.

use crate::config::{EngineConfig, ModeProfile, VadConfig};
use crate::loader::AudioBuffer;
use crate::similarity::{PatchScores, SimilarityConstants, score_band_patches};
use crate::spectral::{FftBandAnalyzer, Spectrogram, prepare_pair};
use crate::vad::detect_activity;
use crate::{Result, VisqolError};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Which implementation produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Gammatone filterbank with global and per-patch alignment
    HighFidelity,
    /// FFT band summation with per-band sliding similarity
    Approximate,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::HighFidelity => "high_fidelity",
            BackendKind::Approximate => "approximate",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an engine's backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Uninitialized,
    Probing,
    HighFidelity,
    Approximate,
}

impl EngineState {
    /// Move to `next`, rejecting anything but
    /// `Uninitialized → Probing → {HighFidelity, Approximate}`
    pub fn transition(self, next: EngineState) -> Result<EngineState> {
        use EngineState::*;
        match (self, next) {
            (Uninitialized, Probing) | (Probing, HighFidelity) | (Probing, Approximate) => Ok(next),
            _ => Err(VisqolError::Config(format!(
                "illegal engine state transition {:?} -> {:?}",
                self, next
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::HighFidelity | EngineState::Approximate)
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        match self {
            EngineState::HighFidelity => Some(BackendKind::HighFidelity),
            EngineState::Approximate => Some(BackendKind::Approximate),
            _ => None,
        }
    }
}

/// Answers whether the high-fidelity backend can be used
pub trait BackendProbe {
    fn high_fidelity_available(&self) -> bool;
}

impl<F> BackendProbe for F
where
    F: Fn() -> bool,
{
    fn high_fidelity_available(&self) -> bool {
        self()
    }
}

/// Default probe: whether the `high-fidelity` feature was compiled in
#[derive(Debug, Clone, Copy, Default)]
pub struct CompiledProbe;

impl BackendProbe for CompiledProbe {
    fn high_fidelity_available(&self) -> bool {
        cfg!(feature = "high-fidelity")
    }
}

/// Settings every backend needs from the engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BackendSettings {
    pub profile: ModeProfile,
    pub vad: VadConfig,
    pub dynamic_range_db: f64,
    pub max_lag_seconds: f64,
}

impl BackendSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            profile: config.mode.profile(),
            vad: config.vad,
            dynamic_range_db: config.dynamic_range_db,
            max_lag_seconds: config.max_lag_seconds,
        }
    }

    pub fn constants(&self) -> SimilarityConstants {
        SimilarityConstants::for_range(self.dynamic_range_db)
    }

    /// Voice activity of the reference, when the mode uses it
    fn activity(&self, reference: &[f64]) -> Option<Vec<bool>> {
        self.profile
            .use_vad
            .then(|| detect_activity(reference, &self.profile, &self.vad))
    }
}

/// Floored spectrogram pair plus the reference's voice activity mask
#[derive(Debug, Clone)]
pub struct Analysis {
    pub reference: Spectrogram,
    pub degraded: Spectrogram,
    pub active: Option<Vec<bool>>,
}

impl Analysis {
    pub fn active_frames(&self) -> usize {
        match &self.active {
            Some(mask) => mask.iter().filter(|&&a| a).count(),
            None => self.reference.num_frames(),
        }
    }
}

/// Capability shared by both backends
pub trait SimilarityBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Spectrograms of a pair already at the mode's rate and equal length
    fn analyze(&self, reference: &AudioBuffer, degraded: &AudioBuffer) -> Result<Analysis>;

    /// Per-band patch similarities of an analysed pair
    fn score(&self, analysis: &Analysis) -> Result<PatchScores>;
}

/// FFT band-summation backend
pub struct ApproximateBackend {
    settings: BackendSettings,
    analyzer: FftBandAnalyzer,
}

impl ApproximateBackend {
    pub fn new(settings: BackendSettings) -> Result<Self> {
        let analyzer = FftBandAnalyzer::new(&settings.profile)?;
        Ok(Self { settings, analyzer })
    }
}

impl SimilarityBackend for ApproximateBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Approximate
    }

    fn analyze(&self, reference: &AudioBuffer, degraded: &AudioBuffer) -> Result<Analysis> {
        let mut ref_spec = self.analyzer.analyze(&reference.samples)?;
        let mut deg_spec = self.analyzer.analyze(&degraded.samples)?;
        prepare_pair(&mut ref_spec, &mut deg_spec, self.settings.dynamic_range_db);

        Ok(Analysis {
            reference: ref_spec,
            degraded: deg_spec,
            active: self.settings.activity(&reference.samples),
        })
    }

    fn score(&self, analysis: &Analysis) -> Result<PatchScores> {
        score_band_patches(
            &analysis.reference,
            &analysis.degraded,
            &self.settings.profile,
            analysis.active.as_deref(),
            &self.settings.constants(),
        )
    }
}

#[cfg(feature = "high-fidelity")]
pub use high_fidelity::HighFidelityBackend;

#[cfg(feature = "high-fidelity")]
mod high_fidelity {
    use super::*;
    use crate::alignment::{apply_lag, estimate_lag};
    use crate::gammatone::GammatoneAnalyzer;
    use crate::similarity::score_aligned_patches;

    /// Gammatone filterbank backend with global lag compensation and
    /// per-patch alignment
    pub struct HighFidelityBackend {
        settings: BackendSettings,
        analyzer: GammatoneAnalyzer,
    }

    impl HighFidelityBackend {
        pub fn new(settings: BackendSettings) -> Result<Self> {
            let analyzer = GammatoneAnalyzer::new(&settings.profile)?;
            Ok(Self { settings, analyzer })
        }
    }

    impl SimilarityBackend for HighFidelityBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::HighFidelity
        }

        fn analyze(&self, reference: &AudioBuffer, degraded: &AudioBuffer) -> Result<Analysis> {
            let max_lag = (self.settings.max_lag_seconds * self.settings.profile.sample_rate as f64)
                .round() as usize;
            let lag = estimate_lag(&reference.samples, &degraded.samples, max_lag);
            let (ref_samples, deg_samples) = apply_lag(&reference.samples, &degraded.samples, lag);
            if ref_samples.is_empty() {
                return Err(VisqolError::EmptyAudio(format!(
                    "no overlap left after compensating a {} sample lag",
                    lag
                )));
            }

            let mut ref_spec = self.analyzer.analyze(ref_samples)?;
            let mut deg_spec = self.analyzer.analyze(deg_samples)?;
            prepare_pair(&mut ref_spec, &mut deg_spec, self.settings.dynamic_range_db);

            Ok(Analysis {
                reference: ref_spec,
                degraded: deg_spec,
                active: self.settings.activity(ref_samples),
            })
        }

        fn score(&self, analysis: &Analysis) -> Result<PatchScores> {
            score_aligned_patches(
                &analysis.reference,
                &analysis.degraded,
                &self.settings.profile,
                analysis.active.as_deref(),
                &self.settings.constants(),
            )
        }
    }
}

/// Backend chosen for the lifetime of one engine
pub struct Dispatch {
    backend: Box<dyn SimilarityBackend>,
    state: EngineState,
    notice: Option<VisqolError>,
}

impl Dispatch {
    /// Run the probe once and build the selected backend
    pub fn probe(settings: BackendSettings, probe: &dyn BackendProbe) -> Result<Self> {
        let state = EngineState::Uninitialized.transition(EngineState::Probing)?;

        let (backend, notice) = if probe.high_fidelity_available() {
            match build_high_fidelity(settings.clone()) {
                Ok(backend) => (backend, None),
                Err(reason) => (
                    Box::new(ApproximateBackend::new(settings)?) as Box<dyn SimilarityBackend>,
                    Some(reason),
                ),
            }
        } else {
            (
                Box::new(ApproximateBackend::new(settings)?) as Box<dyn SimilarityBackend>,
                Some(VisqolError::BackendUnavailable(
                    "probe reported the high-fidelity backend as unavailable".into(),
                )),
            )
        };

        let state = state.transition(match backend.kind() {
            BackendKind::HighFidelity => EngineState::HighFidelity,
            BackendKind::Approximate => EngineState::Approximate,
        })?;

        match &notice {
            Some(reason) => warn!("{}; using the approximate backend", reason),
            None => info!("Using the {} backend", backend.kind()),
        }

        Ok(Self {
            backend,
            state,
            notice,
        })
    }

    pub fn backend(&self) -> &dyn SimilarityBackend {
        self.backend.as_ref()
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// `BackendUnavailable` reason when the engine fell back
    pub fn notice(&self) -> Option<&VisqolError> {
        self.notice.as_ref()
    }
}

#[cfg(feature = "high-fidelity")]
fn build_high_fidelity(settings: BackendSettings) -> Result<Box<dyn SimilarityBackend>> {
    HighFidelityBackend::new(settings)
        .map(|backend| Box::new(backend) as Box<dyn SimilarityBackend>)
        .map_err(|e| VisqolError::BackendUnavailable(e.to_string()))
}

#[cfg(not(feature = "high-fidelity"))]
fn build_high_fidelity(_settings: BackendSettings) -> Result<Box<dyn SimilarityBackend>> {
    Err(VisqolError::BackendUnavailable(
        "built without the high-fidelity feature".into(),
    ))
}

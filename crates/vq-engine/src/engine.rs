//! The measurement engine

use crate::aggregate::aggregate;
use crate::backend::{
    BackendKind, BackendProbe, BackendSettings, CompiledProbe, Dispatch, EngineState,
};
use crate::batch::{BatchEntry, BatchRunner, CancelToken};
use crate::config::{EngineConfig, Mode, ModeProfile};
use crate::loader::{AudioInput, load};
use crate::model::QualityModel;
use crate::report::write_results_csv;
use crate::resample::align;
use crate::result::MeasurementResult;
use crate::{Result, VisqolError};
use log::{debug, info};
use std::path::Path;

/// Reference/degraded quality measurement engine.
///
/// Mode, quality model and backend are fixed at construction. Build the
/// engine once and share it (it is `Sync`) rather than building one per
/// thread.
///
/// ```no_run
/// use vq_engine::{Mode, Visqol};
///
/// let engine = Visqol::new(Mode::Speech)?;
/// let result = engine.measure("reference.wav", "degraded.wav")?;
/// println!("MOS-LQO {:.3}", result.moslqo());
/// # Ok::<(), vq_engine::VisqolError>(())
/// ```
pub struct Visqol {
    config: EngineConfig,
    profile: ModeProfile,
    model: QualityModel,
    dispatch: Dispatch,
}

impl std::fmt::Debug for Visqol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visqol")
            .field("mode", &self.config.mode)
            .field("backend", &self.dispatch.kind())
            .field("state", &self.dispatch.state())
            .finish()
    }
}

/// Builder for [`Visqol`]
pub struct VisqolBuilder {
    config: EngineConfig,
    probe: Box<dyn BackendProbe>,
}

impl Default for VisqolBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            probe: Box::new(CompiledProbe),
        }
    }
}

impl VisqolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn model_dir<P: Into<std::path::PathBuf>>(mut self, dir: P) -> Self {
        self.config.model_dir = Some(dir.into());
        self
    }

    /// Replace the availability probe for the high-fidelity backend
    pub fn probe<P: BackendProbe + 'static>(mut self, probe: P) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Validate configuration, load the quality model and probe the backend
    pub fn build(self) -> Result<Visqol> {
        self.config.validate()?;
        let model = QualityModel::load(&self.config)?;
        let dispatch = Dispatch::probe(BackendSettings::from_config(&self.config), &*self.probe)?;

        info!(
            "ViSQOL engine ready: {} mode, {} backend",
            self.config.mode,
            dispatch.kind()
        );

        Ok(Visqol {
            profile: self.config.mode.profile(),
            config: self.config,
            model,
            dispatch,
        })
    }
}

impl Visqol {
    /// Engine for `mode` with default settings
    pub fn new(mode: Mode) -> Result<Self> {
        Self::builder().mode(mode).build()
    }

    pub fn with_config(config: EngineConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> VisqolBuilder {
        VisqolBuilder::new()
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn model(&self) -> &QualityModel {
        &self.model
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.dispatch.kind()
    }

    pub fn state(&self) -> EngineState {
        self.dispatch.state()
    }

    /// Why the high-fidelity backend is not in use, if it is not
    pub fn backend_notice(&self) -> Option<&VisqolError> {
        self.dispatch.notice()
    }

    /// Compare `degraded` against `reference`
    pub fn measure<R, D>(&self, reference: R, degraded: D) -> Result<MeasurementResult>
    where
        R: Into<AudioInput>,
        D: Into<AudioInput>,
    {
        self.measure_inputs(&reference.into(), &degraded.into(), None)
    }

    /// [`measure`](Self::measure) that gives up with `Cancelled` once
    /// `cancel` fires; checked between pipeline stages
    pub fn measure_cancellable<R, D>(
        &self,
        reference: R,
        degraded: D,
        cancel: &CancelToken,
    ) -> Result<MeasurementResult>
    where
        R: Into<AudioInput>,
        D: Into<AudioInput>,
    {
        self.measure_inputs(&reference.into(), &degraded.into(), Some(cancel))
    }

    pub(crate) fn measure_inputs(
        &self,
        reference: &AudioInput,
        degraded: &AudioInput,
        cancel: Option<&CancelToken>,
    ) -> Result<MeasurementResult> {
        let checkpoint = || match cancel {
            Some(token) => token.check(),
            None => Ok(()),
        };
        let rate = self.profile.sample_rate;

        checkpoint()?;
        let ref_buffer = load(reference, rate)?;
        let deg_buffer = load(degraded, rate)?;

        checkpoint()?;
        let (ref_buffer, deg_buffer) = align(&ref_buffer, &deg_buffer, self.config.mode)?;

        checkpoint()?;
        let backend = self.dispatch.backend();
        let analysis = backend.analyze(&ref_buffer, &deg_buffer)?;
        debug!(
            "{} frames x {} bands, {} active",
            analysis.reference.num_frames(),
            analysis.reference.num_bands(),
            analysis.active_frames()
        );

        checkpoint()?;
        let scores = backend.score(&analysis)?;
        let summary = aggregate(&scores, self.model.band_weights())?;
        let moslqo = self.model.predict(summary.vnsim);

        debug!(
            "{} vs {}: vnsim {:.4}, MOS-LQO {:.4}",
            reference.identifier(),
            degraded.identifier(),
            summary.vnsim,
            moslqo
        );

        Ok(MeasurementResult::new(
            moslqo,
            summary.vnsim,
            summary.fvnsim,
            analysis.reference.center_freqs,
            reference.source_path(),
            degraded.source_path(),
            backend.kind(),
            self.config.mode,
            summary.patch_count,
        ))
    }

    /// Measure every pair, in order, over a worker pool bounded by
    /// `max_concurrency`.
    ///
    /// Failed pairs keep their slot with the error. With `output` set the
    /// entries are also written there as CSV; only that write can fail the
    /// call.
    pub fn measure_batch<I, R, D>(&self, pairs: I, output: Option<&Path>) -> Result<Vec<BatchEntry>>
    where
        I: IntoIterator<Item = (R, D)>,
        R: Into<AudioInput>,
        D: Into<AudioInput>,
    {
        let pairs: Vec<(AudioInput, AudioInput)> = pairs
            .into_iter()
            .map(|(r, d)| (r.into(), d.into()))
            .collect();

        let entries = BatchRunner::new(self).run(&pairs);

        if let Some(path) = output {
            write_results_csv(path, &entries)?;
        }
        Ok(entries)
    }
}

//! # vq-engine
//!
//! Objective audio quality measurement: compares a degraded signal against
//! its reference and predicts a MOS-LQO (Mean Opinion Score, Listening
//! Quality Objective) between 1 and 5.
//!
//! ## Pipeline
//!
//! - **Loader**: WAV via hound, other containers via symphonia, or in-memory
//!   arrays; downmixed to mono
//! - **Aligner**: band-limited resampling to the mode's rate, truncation to
//!   the overlapping region
//! - **Analyzer**: ERB-spaced band energies per frame, in dB
//! - **Scorer**: structural similarity over time/frequency patches
//! - **Aggregator**: per-band means (FVNSIM), global mean (VNSIM) and the
//!   mode's regression model to MOS-LQO
//!
//! Two modes exist: full-band `Audio` at 48 kHz and `Speech` at 16 kHz with
//! voice activity detection. Two backends exist: the high-fidelity gammatone
//! pipeline (cargo feature `high-fidelity`, on by default) and an FFT
//! approximation. The engine picks one at construction and keeps it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use vq_engine::{Mode, Visqol};
//!
//! let engine = Visqol::new(Mode::Audio)?;
//! let result = engine.measure("reference.wav", "degraded.wav")?;
//!
//! println!("MOS-LQO: {:.3} (vnsim {:.3})", result.moslqo(), result.vnsim());
//! for (freq, sim) in result.bands() {
//!     println!("{:>8.1} Hz  {:.3}", freq, sim);
//! }
//! # Ok::<(), vq_engine::VisqolError>(())
//! ```

pub mod aggregate;
pub mod backend;
pub mod bands;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod model;
pub mod report;
pub mod resample;
pub mod result;
pub mod similarity;
pub mod spectral;
pub mod vad;

#[cfg(feature = "high-fidelity")]
pub mod alignment;
#[cfg(feature = "high-fidelity")]
pub mod gammatone;

pub use backend::{BackendKind, BackendProbe, CompiledProbe, EngineState, SimilarityBackend};
pub use batch::{BatchEntry, BatchRunner, BatchSummary, CancelToken};
pub use config::{EngineConfig, Mode, ModeProfile, VadConfig};
pub use engine::{Visqol, VisqolBuilder};
pub use error::{ErrorKind, Result, VisqolError};
pub use loader::{
    AudioBuffer, AudioInput, AudioStats, SampleArray, SourceId, load, load_file, validate_file,
    validate_inputs,
};
pub use model::{Mapping, QualityModel};
pub use report::{BatchPair, load_batch_csv, write_results_csv, write_results_json};
pub use result::MeasurementResult;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

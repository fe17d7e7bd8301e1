//! Versioned VNSIM → MOS-LQO regression models
//!
//! A model is a small JSON document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "mode": "audio",
//!   "mapping": { "kind": "logistic", "slope": 10.0, "midpoint": 0.7 },
//!   "band_weights": null
//! }
//! ```
//!
//! Default models for both modes are compiled into the crate. Setting
//! [`EngineConfig::model_dir`](crate::EngineConfig) replaces them with
//! `<dir>/<mode>.json`.

use crate::config::{EngineConfig, Mode};
use crate::{Result, VisqolError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Lowest MOS-LQO
pub const MOS_MIN: f64 = 1.0;

/// Highest MOS-LQO
pub const MOS_MAX: f64 = 5.0;

/// Model format version this crate reads
pub const MODEL_VERSION: u32 = 1;

/// Points of `[0, 1]` checked for monotonicity on load
const MONOTONICITY_SAMPLES: usize = 101;

const BUNDLED_AUDIO: &str = include_str!("../models/audio.json");
const BUNDLED_SPEECH: &str = include_str!("../models/speech.json");

/// Monotone mapping from similarity to opinion score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mapping {
    /// Logistic curve rescaled so `f(0) = 1` and `f(1) = 5`
    Logistic { slope: f64, midpoint: f64 },

    /// Polynomial in VNSIM, coefficients in ascending power order, clamped
    /// to `[1, 5]`
    Polynomial { coefficients: Vec<f64> },
}

impl Mapping {
    pub fn apply(&self, vnsim: f64) -> f64 {
        match self {
            Mapping::Logistic { slope, midpoint } => {
                let sigmoid = |x: f64| 1.0 / (1.0 + (-slope * (x - midpoint)).exp());
                let low = sigmoid(0.0);
                let high = sigmoid(1.0);
                MOS_MIN + (MOS_MAX - MOS_MIN) * (sigmoid(vnsim) - low) / (high - low)
            }
            Mapping::Polynomial { coefficients } => coefficients
                .iter()
                .rev()
                .fold(0.0, |acc, c| acc * vnsim + c),
        }
    }
}

/// Regression model for one mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityModel {
    pub version: u32,
    pub mode: Mode,
    pub mapping: Mapping,

    /// Optional per-band weights for the across-band VNSIM mean
    #[serde(default)]
    pub band_weights: Option<Vec<f64>>,
}

impl QualityModel {
    /// Resolve the model for `config.mode`: from `model_dir` when set,
    /// otherwise the bundled default
    pub fn load(config: &EngineConfig) -> Result<Self> {
        match &config.model_dir {
            Some(dir) => Self::from_file(dir.join(format!("{}.json", config.mode)), config.mode),
            None => Self::bundled(config.mode),
        }
    }

    /// Default model compiled into the crate
    pub fn bundled(mode: Mode) -> Result<Self> {
        let text = match mode {
            Mode::Audio => BUNDLED_AUDIO,
            Mode::Speech => BUNDLED_SPEECH,
        };
        Self::from_json(text, mode, &format!("bundled {} model", mode))
    }

    pub fn from_file<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| VisqolError::ModelLoad(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text, mode, &path.display().to_string())
    }

    /// Parse and validate a model document; `origin` names it in errors
    pub fn from_json(text: &str, mode: Mode, origin: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(text)
            .map_err(|e| VisqolError::ModelLoad(format!("{}: {}", origin, e)))?;
        model
            .validate(mode)
            .map_err(|reason| VisqolError::ModelLoad(format!("{}: {}", origin, reason)))?;
        debug!("Loaded {} (version {})", origin, model.version);
        Ok(model)
    }

    fn validate(&self, mode: Mode) -> std::result::Result<(), String> {
        if self.version != MODEL_VERSION {
            return Err(format!(
                "unsupported model version {} (expected {})",
                self.version, MODEL_VERSION
            ));
        }
        if self.mode != mode {
            return Err(format!("model is for {} mode, engine runs {}", self.mode, mode));
        }

        match &self.mapping {
            Mapping::Logistic { slope, midpoint } => {
                if !(slope.is_finite() && *slope > 0.0 && midpoint.is_finite()) {
                    return Err(format!(
                        "logistic mapping needs a positive slope, got slope {} midpoint {}",
                        slope, midpoint
                    ));
                }
            }
            Mapping::Polynomial { coefficients } => {
                if coefficients.is_empty() {
                    return Err("polynomial mapping has no coefficients".into());
                }
            }
        }

        let mut previous = f64::NEG_INFINITY;
        for i in 0..MONOTONICITY_SAMPLES {
            let x = i as f64 / (MONOTONICITY_SAMPLES - 1) as f64;
            let y = self.predict(x);
            if !y.is_finite() {
                return Err(format!("mapping is not finite at vnsim {}", x));
            }
            if y < previous {
                return Err(format!("mapping decreases at vnsim {}", x));
            }
            previous = y;
        }

        if let Some(weights) = &self.band_weights {
            let num_bands = mode.profile().num_bands;
            if weights.len() != num_bands {
                return Err(format!(
                    "{} band weights, mode has {} bands",
                    weights.len(),
                    num_bands
                ));
            }
            if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                return Err("band weights must be finite and non-negative".into());
            }
            if weights.iter().sum::<f64>() <= 0.0 {
                return Err("band weights sum to zero".into());
            }
        }

        Ok(())
    }

    /// MOS-LQO for a VNSIM value, clamped to `[1, 5]`
    pub fn predict(&self, vnsim: f64) -> f64 {
        self.mapping
            .apply(vnsim.clamp(0.0, 1.0))
            .clamp(MOS_MIN, MOS_MAX)
    }

    pub fn band_weights(&self) -> Option<&[f64]> {
        self.band_weights.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bundled_models_load() {
        for mode in [Mode::Audio, Mode::Speech] {
            let model = QualityModel::bundled(mode).unwrap();
            assert_eq!(model.mode, mode);
            assert_relative_eq!(model.predict(0.0), MOS_MIN, epsilon = 1e-12);
            assert_relative_eq!(model.predict(1.0), MOS_MAX, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_logistic_is_monotone() {
        let model = QualityModel::bundled(Mode::Audio).unwrap();
        let mid = model.predict(0.5);
        assert!(mid > MOS_MIN && mid < MOS_MAX);
        assert!(model.predict(0.9) > model.predict(0.8));
    }

    #[test]
    fn test_polynomial_clamps() {
        let mapping = Mapping::Polynomial {
            coefficients: vec![-0.5, 1.5, 4.0],
        };
        assert_relative_eq!(mapping.apply(1.0), 5.0);
        let model = QualityModel {
            version: 1,
            mode: Mode::Speech,
            mapping,
            band_weights: None,
        };
        assert_relative_eq!(model.predict(0.0), MOS_MIN);
        assert!(model.validate(Mode::Speech).is_ok());
    }

    #[test]
    fn test_rejects_decreasing_mapping() {
        let json = r#"{ "version": 1, "mode": "audio",
            "mapping": { "kind": "polynomial", "coefficients": [5.0, -4.0] } }"#;
        assert!(matches!(
            QualityModel::from_json(json, Mode::Audio, "test"),
            Err(VisqolError::ModelLoad(_))
        ));
    }

    #[test]
    fn test_rejects_version_and_mode() {
        let json = r#"{ "version": 2, "mode": "audio",
            "mapping": { "kind": "logistic", "slope": 10.0, "midpoint": 0.7 } }"#;
        assert!(matches!(
            QualityModel::from_json(json, Mode::Audio, "test"),
            Err(VisqolError::ModelLoad(_))
        ));

        let json = r#"{ "version": 1, "mode": "speech",
            "mapping": { "kind": "logistic", "slope": 10.0, "midpoint": 0.7 } }"#;
        assert!(matches!(
            QualityModel::from_json(json, Mode::Audio, "test"),
            Err(VisqolError::ModelLoad(_))
        ));
    }

    #[test]
    fn test_rejects_bad_band_weights() {
        let json = r#"{ "version": 1, "mode": "audio",
            "mapping": { "kind": "logistic", "slope": 10.0, "midpoint": 0.7 },
            "band_weights": [1.0, 2.0] }"#;
        let err = QualityModel::from_json(json, Mode::Audio, "test").unwrap_err();
        assert!(err.to_string().contains("band weights"));
    }

    #[test]
    fn test_model_dir_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::speech().with_model_dir(dir.path());
        assert!(matches!(
            QualityModel::load(&config),
            Err(VisqolError::ModelLoad(_))
        ));

        std::fs::write(
            dir.path().join("speech.json"),
            r#"{ "version": 1, "mode": "speech",
                 "mapping": { "kind": "polynomial", "coefficients": [1.0, 4.0] } }"#,
        )
        .unwrap();
        let model = QualityModel::load(&config).unwrap();
        assert_relative_eq!(model.predict(0.5), 3.0);

        std::fs::write(dir.path().join("speech.json"), "{ not json").unwrap();
        assert!(matches!(
            QualityModel::load(&config),
            Err(VisqolError::ModelLoad(_))
        ));
    }
}

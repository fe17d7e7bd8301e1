//! Measurement output

use crate::backend::BackendKind;
use crate::config::Mode;
use serde::Serialize;

/// Outcome of comparing one reference/degraded pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementResult {
    moslqo: f64,
    vnsim: f64,
    fvnsim: Vec<f64>,
    center_freq_bands: Vec<f64>,
    reference_path: Option<String>,
    degraded_path: Option<String>,
    backend: BackendKind,
    mode: Mode,
    patch_count: usize,
}

impl MeasurementResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        moslqo: f64,
        vnsim: f64,
        fvnsim: Vec<f64>,
        center_freq_bands: Vec<f64>,
        reference_path: Option<String>,
        degraded_path: Option<String>,
        backend: BackendKind,
        mode: Mode,
        patch_count: usize,
    ) -> Self {
        Self {
            moslqo,
            vnsim,
            fvnsim,
            center_freq_bands,
            reference_path,
            degraded_path,
            backend,
            mode,
            patch_count,
        }
    }

    /// Predicted mean opinion score, 1.0 to 5.0
    pub fn moslqo(&self) -> f64 {
        self.moslqo
    }

    /// Global similarity before regression, 0.0 to 1.0
    pub fn vnsim(&self) -> f64 {
        self.vnsim
    }

    /// Mean similarity per band
    pub fn fvnsim(&self) -> &[f64] {
        &self.fvnsim
    }

    /// Centre frequency (Hz) of every band, aligned with [`fvnsim`](Self::fvnsim)
    pub fn center_freq_bands(&self) -> &[f64] {
        &self.center_freq_bands
    }

    /// Reference file path, `None` for in-memory input
    pub fn reference_path(&self) -> Option<&str> {
        self.reference_path.as_deref()
    }

    /// Degraded file path, `None` for in-memory input
    pub fn degraded_path(&self) -> Option<&str> {
        self.degraded_path.as_deref()
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Patches that contributed to every band
    pub fn patch_count(&self) -> usize {
        self.patch_count
    }

    /// `(centre frequency, fvnsim)` per band
    pub fn bands(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.center_freq_bands
            .iter()
            .copied()
            .zip(self.fvnsim.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MeasurementResult {
        MeasurementResult::new(
            4.2,
            0.91,
            vec![0.9, 0.92],
            vec![100.0, 200.0],
            Some("ref.wav".into()),
            None,
            BackendKind::Approximate,
            Mode::Speech,
            7,
        )
    }

    #[test]
    fn test_accessors() {
        let result = sample();
        assert_eq!(result.reference_path(), Some("ref.wav"));
        assert_eq!(result.degraded_path(), None);
        assert_eq!(result.bands().collect::<Vec<_>>(), vec![(100.0, 0.9), (200.0, 0.92)]);
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        for field in [
            "moslqo",
            "vnsim",
            "fvnsim",
            "center_freq_bands",
            "reference_path",
            "degraded_path",
        ] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
        assert_eq!(json["backend"], "approximate");
        assert_eq!(json["mode"], "speech");
        assert!(json["degraded_path"].is_null());
    }
}

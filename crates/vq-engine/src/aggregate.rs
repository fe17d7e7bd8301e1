//! Reduction of per-patch similarities to VNSIM and FVNSIM

use crate::similarity::PatchScores;
use crate::{Result, VisqolError};

/// Global and per-band similarity of one measurement
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    /// Global similarity in `[0, 1]`
    pub vnsim: f64,

    /// Mean similarity of every band
    pub fvnsim: Vec<f64>,

    /// Patches contributing to every band
    pub patch_count: usize,
}

/// Average patch scores per band, then across bands.
///
/// With `weights` the across-band mean is weighted. Fails with `EmptyAudio`
/// when no patch survived voice activity filtering.
pub fn aggregate(scores: &PatchScores, weights: Option<&[f64]>) -> Result<Aggregate> {
    let patch_count = scores.num_patches();
    if scores.num_bands() == 0 || patch_count == 0 {
        return Err(VisqolError::EmptyAudio(
            "no active patches left to score".into(),
        ));
    }

    let fvnsim: Vec<f64> = scores
        .bands
        .iter()
        .map(|patches| {
            let mean = patches.iter().sum::<f64>() / patches.len().max(1) as f64;
            mean.clamp(0.0, 1.0)
        })
        .collect();

    let vnsim = match weights {
        Some(weights) => {
            if weights.len() != fvnsim.len() {
                return Err(VisqolError::ModelLoad(format!(
                    "{} band weights for {} bands",
                    weights.len(),
                    fvnsim.len()
                )));
            }
            let total: f64 = weights.iter().sum();
            fvnsim.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / total
        }
        None => fvnsim.iter().sum::<f64>() / fvnsim.len() as f64,
    };

    Ok(Aggregate {
        vnsim: vnsim.clamp(0.0, 1.0),
        fvnsim,
        patch_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scores() -> PatchScores {
        PatchScores {
            bands: vec![vec![1.0, 0.8], vec![0.4, 0.6], vec![0.5, 0.5]],
        }
    }

    #[test]
    fn test_unweighted_mean() {
        let agg = aggregate(&scores(), None).unwrap();
        assert_eq!(agg.patch_count, 2);
        assert_relative_eq!(agg.fvnsim[0], 0.9);
        assert_relative_eq!(agg.fvnsim[1], 0.5);
        assert_relative_eq!(agg.fvnsim[2], 0.5);
        assert_relative_eq!(agg.vnsim, 1.9 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_weighted_mean() {
        let agg = aggregate(&scores(), Some(&[2.0, 1.0, 1.0])).unwrap();
        assert_relative_eq!(agg.vnsim, (1.8 + 0.5 + 0.5) / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_no_patches_is_empty_audio() {
        let empty = PatchScores {
            bands: vec![Vec::new(); 4],
        };
        assert!(matches!(
            aggregate(&empty, None),
            Err(VisqolError::EmptyAudio(_))
        ));
    }

    #[test]
    fn test_weight_length_mismatch() {
        assert!(matches!(
            aggregate(&scores(), Some(&[1.0])),
            Err(VisqolError::ModelLoad(_))
        ));
    }
}

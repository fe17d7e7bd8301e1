//! Patch-based structural similarity between spectrograms
//!
//! Two scorers share one output shape, a list of per-patch values for every
//! band:
//!
//! - [`score_band_patches`] slides (patch frames × 1 band) windows along time
//!   and scores each with 1-D structural similarity.
//! - [`score_aligned_patches`] takes (patch frames × all bands) windows, finds
//!   the best-matching degraded patch within the search window and reports
//!   the per-band mean of a 3×3 Gaussian NSIM map.

use crate::config::ModeProfile;
use crate::spectral::Spectrogram;
use crate::{Result, VisqolError};
use log::debug;

/// 3×3 Gaussian weights (σ = 0.5) over (time, frequency)
const GAUSSIAN_SIGMA: f64 = 0.5;

/// Stabilising constants derived from the spectrogram intensity range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityConstants {
    pub c1: f64,
    pub c2: f64,
    pub c3: f64,
}

impl SimilarityConstants {
    /// Constants for values spanning `[0, intensity_range]`
    pub fn for_range(intensity_range: f64) -> Self {
        let c1 = (0.01 * intensity_range).powi(2);
        let c2 = (0.03 * intensity_range).powi(2);
        Self { c1, c2, c3: c2 / 2.0 }
    }
}

/// Similarity values indexed `[band][patch]`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PatchScores {
    pub bands: Vec<Vec<f64>>,
}

impl PatchScores {
    fn with_bands(num_bands: usize) -> Self {
        Self {
            bands: vec![Vec::new(); num_bands],
        }
    }

    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }

    /// Patches scored (identical for every band)
    pub fn num_patches(&self) -> usize {
        self.bands.first().map_or(0, Vec::len)
    }
}

/// Reject spectrogram pairs whose shapes disagree
pub fn check_shapes(reference: &Spectrogram, degraded: &Spectrogram) -> Result<()> {
    if reference.num_bands() != degraded.num_bands() {
        return Err(VisqolError::Alignment(format!(
            "band count mismatch: reference {} vs degraded {}",
            reference.num_bands(),
            degraded.num_bands()
        )));
    }
    if reference.num_frames() != degraded.num_frames() {
        return Err(VisqolError::Alignment(format!(
            "frame count mismatch: reference {} vs degraded {}",
            reference.num_frames(),
            degraded.num_frames()
        )));
    }
    let ragged = reference
        .values
        .iter()
        .chain(&degraded.values)
        .any(|frame| frame.len() != reference.num_bands());
    if ragged {
        return Err(VisqolError::Alignment(
            "frame width differs from band count".into(),
        ));
    }
    Ok(())
}

/// 1-D structural similarity (luminance × contrast × structure) of two
/// equal-length non-negative series, in `[0, 1]`
pub fn ssim_1d(reference: &[f64], degraded: &[f64], k: &SimilarityConstants) -> f64 {
    let n = reference.len().min(degraded.len());
    if n == 0 {
        return 0.0;
    }
    let (reference, degraded) = (&reference[..n], &degraded[..n]);

    let mean = |s: &[f64]| s.iter().sum::<f64>() / n as f64;
    let mu_r = mean(reference);
    let mu_d = mean(degraded);

    let (mut var_r, mut var_d, mut cov) = (0.0, 0.0, 0.0);
    for (&r, &d) in reference.iter().zip(degraded) {
        let (dr, dd) = (r - mu_r, d - mu_d);
        var_r += dr * dr;
        var_d += dd * dd;
        cov += dr * dd;
    }
    var_r /= n as f64;
    var_d /= n as f64;
    cov /= n as f64;
    let (sd_r, sd_d) = (var_r.sqrt(), var_d.sqrt());

    let luminance = (2.0 * mu_r * mu_d + k.c1) / (mu_r * mu_r + mu_d * mu_d + k.c1);
    let contrast = (2.0 * sd_r * sd_d + k.c2) / (var_r + var_d + k.c2);
    let structure = ((cov + k.c3) / (sd_r * sd_d + k.c3)).clamp(0.0, 1.0);

    (luminance * contrast * structure).clamp(0.0, 1.0)
}

/// Sliding single-band patches scored with [`ssim_1d`].
///
/// `active` marks frames kept by voice activity detection; a patch whose
/// frames are all inactive is skipped for every band.
pub fn score_band_patches(
    reference: &Spectrogram,
    degraded: &Spectrogram,
    profile: &ModeProfile,
    active: Option<&[bool]>,
    constants: &SimilarityConstants,
) -> Result<PatchScores> {
    check_shapes(reference, degraded)?;

    let num_frames = reference.num_frames();
    let size = profile.effective_patch_size(num_frames);
    let ref_bands: Vec<Vec<f64>> = (0..reference.num_bands()).map(|b| reference.band(b)).collect();
    let deg_bands: Vec<Vec<f64>> = (0..degraded.num_bands()).map(|b| degraded.band(b)).collect();

    let mut scores = PatchScores::with_bands(reference.num_bands());
    let mut skipped = 0;
    for start in profile.patch_starts(num_frames) {
        if !patch_is_active(active, start, size) {
            skipped += 1;
            continue;
        }
        for (band, out) in scores.bands.iter_mut().enumerate() {
            let r = &ref_bands[band][start..start + size];
            let d = &deg_bands[band][start..start + size];
            out.push(ssim_1d(r, d, constants));
        }
    }

    debug!(
        "Scored {} band patches of {} frames ({} silent skipped)",
        scores.num_patches(),
        size,
        skipped
    );
    Ok(scores)
}

/// Full-height patches matched against the degraded spectrogram within
/// `±profile.search_window` frames and scored with a Gaussian NSIM map.
pub fn score_aligned_patches(
    reference: &Spectrogram,
    degraded: &Spectrogram,
    profile: &ModeProfile,
    active: Option<&[bool]>,
    constants: &SimilarityConstants,
) -> Result<PatchScores> {
    check_shapes(reference, degraded)?;

    let num_frames = reference.num_frames();
    let num_bands = reference.num_bands();
    let size = profile.effective_patch_size(num_frames);
    let kernel = gaussian_kernel();

    let mut scores = PatchScores::with_bands(num_bands);
    let mut skipped = 0;
    let mut shifted = 0;
    for start in profile.patch_starts(num_frames) {
        if !patch_is_active(active, start, size) {
            skipped += 1;
            continue;
        }

        let ref_patch = &reference.values[start..start + size];
        let mut best: Option<(f64, Vec<f64>)> = None;
        let mut best_offset = 0isize;

        for offset in search_offsets(profile.search_window) {
            let Some(deg_start) = start.checked_add_signed(offset) else {
                continue;
            };
            if deg_start + size > num_frames {
                continue;
            }
            let deg_patch = &degraded.values[deg_start..deg_start + size];
            let band_means = nsim_band_means(ref_patch, deg_patch, num_bands, &kernel, constants);
            let mean = band_means.iter().sum::<f64>() / num_bands.max(1) as f64;

            let better = match &best {
                Some((value, _)) => mean > *value,
                None => true,
            };
            if better {
                best = Some((mean, band_means));
                best_offset = offset;
            }
        }

        if let Some((_, band_means)) = best {
            if best_offset != 0 {
                shifted += 1;
            }
            for (out, value) in scores.bands.iter_mut().zip(band_means) {
                out.push(value);
            }
        }
    }

    debug!(
        "Scored {} aligned patches of {}x{} ({} shifted, {} silent skipped)",
        scores.num_patches(),
        size,
        num_bands,
        shifted,
        skipped
    );
    Ok(scores)
}

fn patch_is_active(active: Option<&[bool]>, start: usize, size: usize) -> bool {
    match active {
        Some(mask) => mask.iter().skip(start).take(size).any(|&a| a),
        None => true,
    }
}

/// 0, +1, -1, +2, -2, ... up to ±window
fn search_offsets(window: usize) -> impl Iterator<Item = isize> {
    std::iter::once(0).chain((1..=window as isize).flat_map(|d| [d, -d]))
}

fn gaussian_kernel() -> [[f64; 3]; 3] {
    let mut kernel = [[0.0; 3]; 3];
    let mut total = 0.0;
    for (i, row) in kernel.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            let (di, dj) = (i as f64 - 1.0, j as f64 - 1.0);
            *cell = (-(di * di + dj * dj) / (2.0 * GAUSSIAN_SIGMA * GAUSSIAN_SIGMA)).exp();
            total += *cell;
        }
    }
    for row in &mut kernel {
        for cell in row.iter_mut() {
            *cell /= total;
        }
    }
    kernel
}

/// Per-band mean of the NSIM map of two equally sized patches
fn nsim_band_means(
    reference: &[Vec<f64>],
    degraded: &[Vec<f64>],
    num_bands: usize,
    kernel: &[[f64; 3]; 3],
    k: &SimilarityConstants,
) -> Vec<f64> {
    let frames = reference.len();
    let mut sums = vec![0.0; num_bands];
    if frames == 0 {
        return sums;
    }

    for t in 0..frames {
        for (b, sum) in sums.iter_mut().enumerate() {
            let (mut mu_r, mut mu_d) = (0.0, 0.0);
            let (mut rr, mut dd, mut rd) = (0.0, 0.0, 0.0);
            for (i, row) in kernel.iter().enumerate() {
                let tt = (t + i).saturating_sub(1).min(frames - 1);
                for (j, &w) in row.iter().enumerate() {
                    let bb = (b + j).saturating_sub(1).min(num_bands - 1);
                    let (r, d) = (reference[tt][bb], degraded[tt][bb]);
                    mu_r += w * r;
                    mu_d += w * d;
                    rr += w * r * r;
                    dd += w * d * d;
                    rd += w * r * d;
                }
            }
            let var_r = (rr - mu_r * mu_r).max(0.0);
            let var_d = (dd - mu_d * mu_d).max(0.0);
            let cov = rd - mu_r * mu_d;

            let intensity = (2.0 * mu_r * mu_d + k.c1) / (mu_r * mu_r + mu_d * mu_d + k.c1);
            let structure =
                ((cov + k.c3) / (var_r.sqrt() * var_d.sqrt() + k.c3)).clamp(0.0, 1.0);
            *sum += intensity * structure;
        }
    }

    sums.iter().map(|s| (s / frames as f64).clamp(0.0, 1.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use approx::assert_relative_eq;

    fn constants() -> SimilarityConstants {
        SimilarityConstants::for_range(45.0)
    }

    /// Spectrogram with a moving ridge so patches have structure
    fn ridge(frames: usize, bands: usize, shift: usize) -> Spectrogram {
        let values = (0..frames)
            .map(|t| {
                (0..bands)
                    .map(|b| {
                        let phase = (t + shift) as f64 * 0.3 + b as f64 * 0.7;
                        22.5 + 20.0 * phase.sin()
                    })
                    .collect()
            })
            .collect();
        Spectrogram {
            values,
            center_freqs: (0..bands).map(|b| 100.0 * (b + 1) as f64).collect(),
        }
    }

    #[test]
    fn test_ssim_identical_is_one() {
        let series = [1.0, 5.0, 9.0, 3.0, 7.0];
        assert_relative_eq!(ssim_1d(&series, &series, &constants()), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ssim_bounded_and_symmetric() {
        let a = [1.0, 5.0, 9.0, 3.0, 7.0];
        let b = [9.0, 1.0, 2.0, 8.0, 0.0];
        let ab = ssim_1d(&a, &b, &constants());
        let ba = ssim_1d(&b, &a, &constants());
        assert!((0.0..=1.0).contains(&ab));
        assert_relative_eq!(ab, ba, epsilon = 1e-12);
        // Anti-correlated series have no structural agreement
        assert_relative_eq!(ab, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_ssim_flat_series() {
        let zeros = [0.0; 8];
        assert_relative_eq!(ssim_1d(&zeros, &zeros, &constants()), 1.0);
        assert!(ssim_1d(&zeros, &[40.0; 8], &constants()) < 0.01);
    }

    #[test]
    fn test_band_patches_identical() {
        let profile = Mode::Audio.profile();
        let spec = ridge(100, 8, 0);
        let scores = score_band_patches(&spec, &spec, &profile, None, &constants()).unwrap();

        assert_eq!(scores.num_bands(), 8);
        assert_eq!(scores.num_patches(), profile.patch_starts(100).len());
        for band in &scores.bands {
            for &v in band {
                assert_relative_eq!(v, 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_inactive_patches_are_skipped() {
        let profile = Mode::Speech.profile();
        let spec = ridge(60, 4, 0);
        // Frames 0..30 active, 30..60 silent
        let mask: Vec<bool> = (0..60).map(|t| t < 30).collect();

        let scores = score_band_patches(&spec, &spec, &profile, Some(&mask), &constants()).unwrap();
        // Starts 0, 10, 20, 30, 40: the last two fall entirely in silence
        assert_eq!(profile.patch_starts(60), vec![0, 10, 20, 30, 40]);
        assert_eq!(scores.num_patches(), 3);

        let silent = vec![false; 60];
        let scores =
            score_band_patches(&spec, &spec, &profile, Some(&silent), &constants()).unwrap();
        assert_eq!(scores.num_patches(), 0);
    }

    #[test]
    fn test_shape_mismatch_is_alignment_fault() {
        let profile = Mode::Audio.profile();
        let a = ridge(40, 8, 0);
        let b = ridge(40, 6, 0);
        assert!(matches!(
            score_band_patches(&a, &b, &profile, None, &constants()),
            Err(VisqolError::Alignment(_))
        ));
        let c = ridge(39, 8, 0);
        assert!(matches!(
            score_aligned_patches(&a, &c, &profile, None, &constants()),
            Err(VisqolError::Alignment(_))
        ));
    }

    #[test]
    fn test_aligned_patches_identical() {
        let profile = Mode::Audio.profile();
        let spec = ridge(100, 8, 0);
        let scores = score_aligned_patches(&spec, &spec, &profile, None, &constants()).unwrap();

        assert_eq!(scores.num_patches(), profile.patch_starts(100).len());
        for band in &scores.bands {
            for &v in band {
                assert_relative_eq!(v, 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_aligned_patches_recover_shift() {
        let profile = Mode::Audio.profile();
        let reference = ridge(120, 8, 0);
        // Degraded lags the reference by 3 frames
        let mut degraded = ridge(120, 8, 0);
        degraded.values.rotate_right(3);

        let aligned =
            score_aligned_patches(&reference, &degraded, &profile, None, &constants()).unwrap();
        let unaligned =
            score_band_patches(&reference, &degraded, &profile, None, &constants()).unwrap();

        let mean = |s: &PatchScores| {
            let all: Vec<f64> = s.bands.iter().flatten().copied().collect();
            all.iter().sum::<f64>() / all.len() as f64
        };
        // Interior patches find the exact match
        assert_relative_eq!(aligned.bands[0][2], 1.0, epsilon = 1e-9);
        assert!(mean(&aligned) > mean(&unaligned));
    }

    #[test]
    fn test_search_offsets_order() {
        let offsets: Vec<isize> = search_offsets(2).collect();
        assert_eq!(offsets, vec![0, 1, -1, 2, -2]);
    }

    #[test]
    fn test_gaussian_kernel_normalised() {
        let kernel = gaussian_kernel();
        let total: f64 = kernel.iter().flatten().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        assert!(kernel[1][1] > kernel[0][1] && kernel[0][1] > kernel[0][0]);
    }
}

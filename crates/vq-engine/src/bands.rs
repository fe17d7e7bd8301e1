//! ERB-spaced perceptual band layout shared by both analyzers

use crate::config::ModeProfile;
use serde::{Deserialize, Serialize};

/// Glasberg & Moore ear quality factor
pub const EAR_Q: f64 = 9.26449;

/// Minimum auditory filter bandwidth (Hz)
pub const MIN_BW: f64 = 24.7;

/// Equivalent rectangular bandwidth at `freq` (Hz)
pub fn erb(freq: f64) -> f64 {
    freq / EAR_Q + MIN_BW
}

/// `n` centre frequencies uniformly spaced on the ERB scale, ascending.
///
/// The lowest centre is `low`; the highest stays just below `high`.
pub fn erb_space(low: f64, high: f64, n: usize) -> Vec<f64> {
    let offset = EAR_Q * MIN_BW;
    let step = ((low + offset).ln() - (high + offset).ln()) / n as f64;
    let mut centers: Vec<f64> = (1..=n)
        .map(|i| -offset + (i as f64 * step).exp() * (high + offset))
        .collect();
    centers.reverse();
    centers
}

/// Band centres and edges for one mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandLayout {
    /// Centre frequency of every band (Hz), ascending
    pub centers: Vec<f64>,

    /// `(low, high)` edges of every band (Hz)
    pub edges: Vec<(f64, f64)>,
}

impl BandLayout {
    pub fn for_profile(profile: &ModeProfile) -> Self {
        let nyquist = profile.sample_rate as f64 / 2.0;
        let centers = erb_space(profile.min_freq, profile.max_freq, profile.num_bands);
        let edges = band_edges(&centers, nyquist);
        Self { centers, edges }
    }

    pub fn num_bands(&self) -> usize {
        self.centers.len()
    }
}

fn band_edges(centers: &[f64], nyquist: f64) -> Vec<(f64, f64)> {
    let n = centers.len();
    (0..n)
        .map(|i| {
            let low = if i > 0 {
                0.5 * (centers[i - 1] + centers[i])
            } else if n > 1 {
                (centers[0] - 0.5 * (centers[1] - centers[0])).max(0.0)
            } else {
                0.5 * centers[0]
            };
            let high = if i + 1 < n {
                0.5 * (centers[i] + centers[i + 1])
            } else if n > 1 {
                (centers[i] + 0.5 * (centers[i] - centers[i - 1])).min(nyquist)
            } else {
                nyquist
            };
            (low, high)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use approx::assert_relative_eq;

    #[test]
    fn test_erb_space_bounds() {
        let centers = erb_space(50.0, 8000.0, 32);
        assert_eq!(centers.len(), 32);
        assert_relative_eq!(centers[0], 50.0, epsilon = 1e-9);
        assert!(centers[31] < 8000.0);
        assert!(centers.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_erb_spacing_is_uniform_on_erb_scale() {
        let centers = erb_space(100.0, 10_000.0, 16);
        let erb_rate = |f: f64| (f + EAR_Q * MIN_BW).ln();
        let steps: Vec<f64> = centers
            .windows(2)
            .map(|w| erb_rate(w[1]) - erb_rate(w[0]))
            .collect();
        for step in &steps {
            assert_relative_eq!(*step, steps[0], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_layout_edges_tile_the_range() {
        for mode in [Mode::Audio, Mode::Speech] {
            let profile = mode.profile();
            let layout = BandLayout::for_profile(&profile);
            assert_eq!(layout.num_bands(), profile.num_bands);
            for (i, (low, high)) in layout.edges.iter().enumerate() {
                assert!(low < high);
                assert!(*low <= layout.centers[i] && layout.centers[i] <= *high);
                assert!(*high <= profile.sample_rate as f64 / 2.0);
            }
            for pair in layout.edges.windows(2) {
                assert_relative_eq!(pair[0].1, pair[1].0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_erb_width() {
        assert_relative_eq!(erb(1000.0), 132.639, epsilon = 1e-3);
    }
}

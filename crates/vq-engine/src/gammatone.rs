//! ERB gammatone filterbank analyzer
//!
//! Each band is a fourth-order gammatone filter realised as four cascaded
//! biquads (Slaney's factorisation), normalised to unity gain at its centre
//! frequency. Band output is framed with the mode's Hann window and reduced
//! to energy in dB.

use crate::bands::{BandLayout, erb};
use crate::config::ModeProfile;
use crate::spectral::{Spectrogram, fill_frame, hann_window, power_to_db};
use crate::{Result, VisqolError};
use num_complex::Complex64;
use rayon::prelude::*;
use std::f64::consts::PI;

/// Second-order section, transposed direct form II
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    fn response(&self, omega: f64) -> Complex64 {
        let z1 = Complex64::from_polar(1.0, -omega);
        let z2 = z1 * z1;
        (self.b0 + self.b1 * z1 + self.b2 * z2) / (1.0 + self.a1 * z1 + self.a2 * z2)
    }

    fn filter(&self, input: &mut [f64]) {
        let (mut s1, mut s2) = (0.0, 0.0);
        for x in input.iter_mut() {
            let y = self.b0 * *x + s1;
            s1 = self.b1 * *x - self.a1 * y + s2;
            s2 = self.b2 * *x - self.a2 * y;
            *x = y;
        }
    }
}

/// One gammatone band
#[derive(Debug, Clone)]
pub struct GammatoneFilter {
    center: f64,
    stages: [Biquad; 4],
}

impl GammatoneFilter {
    pub fn new(center: f64, sample_rate: u32) -> Self {
        let t = 1.0 / sample_rate as f64;
        let b = 1.019 * 2.0 * PI * erb(center);
        let theta = 2.0 * PI * center * t;
        let decay = (b * t).exp();

        let a1 = -2.0 * theta.cos() / decay;
        let a2 = (-2.0 * b * t).exp();
        let cos_term = t * theta.cos() / decay;
        let sin_term = t * theta.sin() / decay;
        let plus = (3.0 + 2f64.powf(1.5)).sqrt();
        let minus = (3.0 - 2f64.powf(1.5)).sqrt();

        let stage = |b1: f64| Biquad {
            b0: t,
            b1,
            b2: 0.0,
            a1,
            a2,
        };
        let mut stages = [
            stage(-(cos_term + plus * sin_term)),
            stage(-(cos_term - plus * sin_term)),
            stage(-(cos_term + minus * sin_term)),
            stage(-(cos_term - minus * sin_term)),
        ];

        let gain: f64 = stages.iter().map(|s| s.response(theta).norm()).product();
        if gain > 0.0 && gain.is_finite() {
            stages[0].b0 /= gain;
            stages[0].b1 /= gain;
            stages[0].b2 /= gain;
        }

        Self { center, stages }
    }

    pub fn center(&self) -> f64 {
        self.center
    }

    /// Magnitude response at `freq` Hz
    pub fn magnitude_at(&self, freq: f64, sample_rate: u32) -> f64 {
        let omega = 2.0 * PI * freq / sample_rate as f64;
        self.stages.iter().map(|s| s.response(omega).norm()).product()
    }

    /// Filter a signal through all four stages
    pub fn process(&self, samples: &[f64]) -> Vec<f64> {
        let mut out = samples.to_vec();
        for stage in &self.stages {
            stage.filter(&mut out);
        }
        out
    }
}

/// Gammatone filterbank band-energy analyzer
pub struct GammatoneAnalyzer {
    profile: ModeProfile,
    layout: BandLayout,
    filters: Vec<GammatoneFilter>,
    window: Vec<f64>,
    window_weight: f64,
}

impl GammatoneAnalyzer {
    pub fn new(profile: &ModeProfile) -> Result<Self> {
        if profile.window_size == 0 || profile.hop_size == 0 {
            return Err(VisqolError::Config(format!(
                "window {} / hop {} must be non-zero",
                profile.window_size, profile.hop_size
            )));
        }

        let layout = BandLayout::for_profile(profile);
        let filters = layout
            .centers
            .iter()
            .map(|&cf| GammatoneFilter::new(cf, profile.sample_rate))
            .collect();
        let window = hann_window(profile.window_size);
        let window_weight = window.iter().sum();

        Ok(Self {
            profile: profile.clone(),
            layout,
            filters,
            window,
            window_weight,
        })
    }

    pub fn filters(&self) -> &[GammatoneFilter] {
        &self.filters
    }

    /// Band-energy spectrogram of `samples`
    pub fn analyze(&self, samples: &[f64]) -> Result<Spectrogram> {
        let num_frames = self.profile.frame_count(samples.len());

        let columns: Vec<Vec<f64>> = self
            .filters
            .par_iter()
            .map(|filter| self.band_energy(&filter.process(samples), num_frames))
            .collect();

        let values = (0..num_frames)
            .map(|frame| columns.iter().map(|column| column[frame]).collect())
            .collect();

        Ok(Spectrogram {
            values,
            center_freqs: self.layout.centers.clone(),
        })
    }

    fn band_energy(&self, band: &[f64], num_frames: usize) -> Vec<f64> {
        let mut frame = vec![0.0; self.profile.window_size];
        (0..num_frames)
            .map(|index| {
                fill_frame(band, index, self.profile.hop_size, &mut frame);
                let energy: f64 = frame
                    .iter()
                    .zip(&self.window)
                    .map(|(s, w)| w * s * s)
                    .sum();
                power_to_db(energy / self.window_weight)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use approx::assert_relative_eq;

    #[test]
    fn test_unity_gain_at_center() {
        for &cf in &[50.0, 440.0, 1000.0, 4000.0, 12_000.0] {
            let filter = GammatoneFilter::new(cf, 48_000);
            assert_relative_eq!(filter.magnitude_at(cf, 48_000), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_rejects_distant_frequencies() {
        let filter = GammatoneFilter::new(1000.0, 48_000);
        assert!(filter.magnitude_at(4000.0, 48_000) < 0.01);
        assert!(filter.magnitude_at(250.0, 48_000) < 0.01);
    }

    #[test]
    fn test_bandwidth_follows_erb() {
        for &cf in &[500.0, 1000.0, 4000.0] {
            let filter = GammatoneFilter::new(cf, 48_000);
            // Half an ERB off centre a 4th-order gammatone sits near -3.7 dB
            let gain = filter.magnitude_at(cf + erb(cf) / 2.0, 48_000);
            assert!(gain > 0.55 && gain < 0.75, "cf {}: gain {}", cf, gain);
        }
    }

    #[test]
    fn test_steady_tone_passes_at_unit_gain() {
        let rate = 16_000;
        let filter = GammatoneFilter::new(1000.0, rate);
        let tone: Vec<f64> = (0..rate as usize)
            .map(|i| (2.0 * PI * 1000.0 * i as f64 / rate as f64).sin())
            .collect();
        let out = filter.process(&tone);
        let tail = &out[8000..];
        let rms = (tail.iter().map(|s| s * s).sum::<f64>() / tail.len() as f64).sqrt();
        assert!((rms - 1.0 / 2f64.sqrt()).abs() < 0.01, "rms was {}", rms);
    }

    #[test]
    fn test_analyzer_shape() {
        let profile = Mode::Speech.profile();
        let analyzer = GammatoneAnalyzer::new(&profile).unwrap();
        let samples: Vec<f64> = (0..8000)
            .map(|i| 0.3 * (2.0 * PI * 500.0 * i as f64 / 16_000.0).sin())
            .collect();
        let spec = analyzer.analyze(&samples).unwrap();

        assert_eq!(spec.num_frames(), profile.frame_count(8000));
        assert_eq!(spec.num_bands(), 32);
        assert_eq!(analyzer.filters().len(), 32);
        assert!(spec.values.iter().all(|f| f.iter().all(|v| v.is_finite())));
    }

    #[test]
    fn test_tone_peaks_near_its_band() {
        let profile = Mode::Speech.profile();
        let analyzer = GammatoneAnalyzer::new(&profile).unwrap();
        let samples: Vec<f64> = (0..8000)
            .map(|i| 0.3 * (2.0 * PI * 1000.0 * i as f64 / 16_000.0).sin())
            .collect();
        let spec = analyzer.analyze(&samples).unwrap();

        let frame = &spec.values[spec.num_frames() / 2];
        let loudest = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        let cf = analyzer.filters()[loudest].center();
        assert!((cf - 1000.0).abs() < 150.0, "loudest band centred at {}", cf);
    }
}

//! Framed band-energy spectrograms and the FFT band-summation analyzer

use crate::bands::BandLayout;
use crate::config::ModeProfile;
use crate::{Result, VisqolError};
use num_complex::Complex64;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Power assigned to silent cells before conversion to dB (-200 dB)
pub const POWER_FLOOR: f64 = 1e-20;

/// Band-energy spectrogram in dB, laid out `values[frame][band]`
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
    pub values: Vec<Vec<f64>>,

    /// Centre frequency of every band (Hz), ascending
    pub center_freqs: Vec<f64>,
}

impl Spectrogram {
    pub fn num_frames(&self) -> usize {
        self.values.len()
    }

    pub fn num_bands(&self) -> usize {
        self.center_freqs.len()
    }

    /// Time series of one band
    pub fn band(&self, band: usize) -> Vec<f64> {
        self.values.iter().map(|frame| frame[band]).collect()
    }

    /// Largest cell value, `-inf` when empty
    pub fn max_value(&self) -> f64 {
        self.values
            .iter()
            .flat_map(|frame| frame.iter().copied())
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Smallest cell value, `+inf` when empty
    pub fn min_value(&self) -> f64 {
        self.values
            .iter()
            .flat_map(|frame| frame.iter().copied())
            .fold(f64::INFINITY, f64::min)
    }

    fn floor_and_shift(&mut self, floor: f64) {
        for frame in &mut self.values {
            for cell in frame.iter_mut() {
                *cell = cell.max(floor) - floor;
            }
        }
    }
}

/// Floor a reference/degraded pair at `dynamic_range_db` below its loudest
/// cell and shift both so the floor sits at zero.
///
/// Both spectrograms end up in `[0, dynamic_range_db]` on a shared scale.
pub fn prepare_pair(reference: &mut Spectrogram, degraded: &mut Spectrogram, dynamic_range_db: f64) {
    let peak = reference.max_value().max(degraded.max_value());
    if !peak.is_finite() {
        return;
    }
    let floor = peak - dynamic_range_db;
    reference.floor_and_shift(floor);
    degraded.floor_and_shift(floor);
}

/// Periodic Hann window
pub fn hann_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / size as f64).cos()))
        .collect()
}

/// Convert a power value to dB, clamping silence to the power floor
pub fn power_to_db(power: f64) -> f64 {
    10.0 * power.max(POWER_FLOOR).log10()
}

/// Copy frame `index` of `samples` into `out`, zero-padding past the end
pub fn fill_frame(samples: &[f64], index: usize, hop: usize, out: &mut [f64]) {
    let start = index * hop;
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = samples.get(start + i).copied().unwrap_or(0.0);
    }
}

/// FFT band-summation analyzer.
///
/// Hann-windowed STFT whose power bins are summed into ERB-spaced bands.
pub struct FftBandAnalyzer {
    profile: ModeProfile,
    layout: BandLayout,
    fft: Arc<dyn RealToComplex<f64>>,
    window: Vec<f64>,
    window_energy: f64,
    bin_ranges: Vec<(usize, usize)>,
}

impl FftBandAnalyzer {
    pub fn new(profile: &ModeProfile) -> Result<Self> {
        if profile.window_size == 0 || profile.hop_size == 0 {
            return Err(VisqolError::Config(format!(
                "window {} / hop {} must be non-zero",
                profile.window_size, profile.hop_size
            )));
        }

        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(profile.window_size);
        let window = hann_window(profile.window_size);
        let window_energy = window.iter().map(|w| w * w).sum();
        let layout = BandLayout::for_profile(profile);
        let bin_ranges = bin_ranges(&layout, profile.window_size, profile.sample_rate);

        Ok(Self {
            profile: profile.clone(),
            layout,
            fft,
            window,
            window_energy,
            bin_ranges,
        })
    }

    pub fn layout(&self) -> &BandLayout {
        &self.layout
    }

    /// Band-energy spectrogram of `samples`
    pub fn analyze(&self, samples: &[f64]) -> Result<Spectrogram> {
        let size = self.profile.window_size;
        let num_frames = self.profile.frame_count(samples.len());
        let mut input = vec![0.0f64; size];
        let mut frame = vec![0.0f64; size];
        let mut spectrum = vec![Complex64::new(0.0, 0.0); size / 2 + 1];
        let mut values = Vec::with_capacity(num_frames);

        for index in 0..num_frames {
            fill_frame(samples, index, self.profile.hop_size, &mut frame);
            for ((dst, &s), &w) in input.iter_mut().zip(&frame).zip(&self.window) {
                *dst = s * w;
            }

            self.fft
                .process(&mut input, &mut spectrum)
                .map_err(|e| VisqolError::Config(format!("FFT failed: {}", e)))?;

            let bands = self
                .bin_ranges
                .iter()
                .map(|&(lo, hi)| {
                    let power: f64 = spectrum[lo..hi].iter().map(|c| c.norm_sqr()).sum();
                    power_to_db(power / self.window_energy)
                })
                .collect();
            values.push(bands);
        }

        Ok(Spectrogram {
            values,
            center_freqs: self.layout.centers.clone(),
        })
    }
}

/// Half-open bin range of every band; bands narrower than one bin take the
/// bin nearest their centre
fn bin_ranges(layout: &BandLayout, fft_size: usize, sample_rate: u32) -> Vec<(usize, usize)> {
    let resolution = sample_rate as f64 / fft_size as f64;
    let last_bin = fft_size / 2;

    layout
        .edges
        .iter()
        .zip(&layout.centers)
        .map(|(&(low, high), &center)| {
            let lo = (low / resolution).ceil() as usize;
            let hi = ((high / resolution).ceil() as usize).min(last_bin + 1);
            if lo < hi {
                (lo, hi)
            } else {
                let nearest = ((center / resolution).round() as usize).min(last_bin);
                (nearest, nearest + 1)
            }
        })
        .collect()
}

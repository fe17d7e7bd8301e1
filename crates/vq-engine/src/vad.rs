//! Frame-level voice activity detection

use crate::config::{ModeProfile, VadConfig};
use crate::spectral::{fill_frame, hann_window, power_to_db};

/// Hann-weighted level (dBFS) of every analysis frame
pub fn frame_levels(samples: &[f64], profile: &ModeProfile) -> Vec<f64> {
    let window = hann_window(profile.window_size);
    let weight: f64 = window.iter().sum();
    let mut frame = vec![0.0; profile.window_size];

    (0..profile.frame_count(samples.len()))
        .map(|index| {
            fill_frame(samples, index, profile.hop_size, &mut frame);
            let energy: f64 = frame.iter().zip(&window).map(|(s, w)| w * s * s).sum();
            // Full-scale sine measures -3 dBFS
            power_to_db(energy / weight)
        })
        .collect()
}

/// Mark each frame active or silent.
///
/// A frame is active when it is no more than `relative_floor_db` below the
/// loudest frame and at least `absolute_floor_db` loud.
pub fn detect_activity(samples: &[f64], profile: &ModeProfile, config: &VadConfig) -> Vec<bool> {
    let levels = frame_levels(samples, profile);
    let loudest = levels.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let relative = loudest - config.relative_floor_db;

    levels
        .iter()
        .map(|&level| level >= relative && level >= config.absolute_floor_db)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;

    fn tone(len: usize, amplitude: f64) -> Vec<f64> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f64::consts::PI * 300.0 * i as f64 / 16_000.0).sin())
            .collect()
    }

    #[test]
    fn test_silence_is_inactive() {
        let profile = Mode::Speech.profile();
        let mask = detect_activity(&vec![0.0; 16_000], &profile, &VadConfig::default());
        assert_eq!(mask.len(), profile.frame_count(16_000));
        assert!(mask.iter().all(|active| !active));
    }

    #[test]
    fn test_speech_then_pause() {
        let profile = Mode::Speech.profile();
        let mut samples = tone(8000, 0.5);
        samples.extend(vec![0.0; 8000]);

        let mask = detect_activity(&samples, &profile, &VadConfig::default());
        assert!(mask[..20].iter().all(|&a| a));
        assert!(mask[mask.len() - 20..].iter().all(|&a| !a));
    }

    #[test]
    fn test_quiet_passage_below_relative_floor() {
        let profile = Mode::Speech.profile();
        let mut samples = tone(8000, 0.5);
        // 60 dB quieter than the loud part
        samples.extend(tone(8000, 0.0005));

        let mask = detect_activity(&samples, &profile, &VadConfig::default());
        assert!(mask[5]);
        assert!(!mask[mask.len() - 5]);

        let lenient = VadConfig {
            relative_floor_db: 80.0,
            absolute_floor_db: -100.0,
        };
        let mask = detect_activity(&samples, &profile, &lenient);
        assert!(mask.iter().all(|&a| a));
    }

    #[test]
    fn test_level_of_full_scale_sine() {
        let profile = Mode::Speech.profile();
        let levels = frame_levels(&tone(4000, 1.0), &profile);
        let mid = levels[levels.len() / 2];
        assert!((mid + 3.01).abs() < 0.2, "level was {}", mid);
    }
}

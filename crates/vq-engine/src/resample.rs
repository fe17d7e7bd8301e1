//! Sample rate conversion and length alignment

use crate::config::Mode;
use crate::loader::AudioBuffer;
use crate::{Result, VisqolError};
use log::{debug, warn};
use rubato::{FftFixedIn, Resampler};

/// Duration mismatch (seconds) above which alignment logs a warning
const DURATION_MISMATCH_TOLERANCE: f64 = 0.001;

/// Sub-chunks used by the FFT resampler
const SUB_CHUNKS: usize = 2;

/// Input chunk size fed to the FFT resampler
const CHUNK_SIZE: usize = 1024;

/// Bring both buffers to the mode's rate and truncate them to their overlap.
///
/// Mismatched lengths are not an error: the longer buffer is cut to the
/// shorter one. Fails with `EmptyAudio` when either buffer is empty or the
/// overlap vanishes after resampling.
pub fn align(
    reference: &AudioBuffer,
    degraded: &AudioBuffer,
    mode: Mode,
) -> Result<(AudioBuffer, AudioBuffer)> {
    if reference.is_empty() {
        return Err(VisqolError::EmptyAudio(format!(
            "reference {} has no samples",
            reference.source
        )));
    }
    if degraded.is_empty() {
        return Err(VisqolError::EmptyAudio(format!(
            "degraded {} has no samples",
            degraded.source
        )));
    }

    let target_rate = mode.sample_rate();
    let reference = resample(reference, target_rate)?;
    let degraded = resample(degraded, target_rate)?;

    if (reference.duration() - degraded.duration()).abs() > DURATION_MISMATCH_TOLERANCE {
        warn!(
            "Duration mismatch: reference is {:.3}s, degraded is {:.3}s; using the overlap",
            reference.duration(),
            degraded.duration()
        );
    }

    let overlap = reference.len().min(degraded.len());
    if overlap == 0 {
        return Err(VisqolError::EmptyAudio(
            "no overlapping samples after resampling".into(),
        ));
    }

    Ok((reference.truncated(overlap), degraded.truncated(overlap)))
}

/// Resample a buffer to `target_rate` with band-limited FFT interpolation.
///
/// Output length is `floor(len * target / source)`.
pub fn resample(buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
    let ratio = target_rate as f64 / buffer.sample_rate as f64;
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(VisqolError::InvalidInput(format!(
            "cannot convert {} Hz to {} Hz",
            buffer.sample_rate, target_rate
        )));
    }

    if buffer.sample_rate == target_rate {
        return Ok(buffer.clone());
    }

    let expected = (buffer.len() as u64 * target_rate as u64 / buffer.sample_rate as u64) as usize;
    let samples = if expected == 0 {
        Vec::new()
    } else {
        convert(&buffer.samples, buffer.sample_rate, target_rate, expected)?
    };

    debug!(
        "Resampled {}: {} Hz -> {} Hz, {} -> {} samples",
        buffer.source,
        buffer.sample_rate,
        target_rate,
        buffer.len(),
        samples.len()
    );

    Ok(AudioBuffer {
        samples,
        sample_rate: target_rate,
        source_channels: buffer.source_channels,
        source: buffer.source.clone(),
    })
}

fn convert(input: &[f64], from: u32, to: u32, expected: usize) -> Result<Vec<f64>> {
    let mut resampler =
        FftFixedIn::<f64>::new(from as usize, to as usize, CHUNK_SIZE, SUB_CHUNKS, 1)
            .map_err(|e| VisqolError::Resample(e.to_string()))?;

    let delay = resampler.output_delay();
    let wanted = expected + delay;
    let mut output = Vec::with_capacity(wanted);

    let mut pos = 0;
    loop {
        let needed = resampler.input_frames_next();
        if pos + needed > input.len() {
            break;
        }
        let chunk = resampler
            .process(&[&input[pos..pos + needed]], None)
            .map_err(|e| VisqolError::Resample(e.to_string()))?;
        output.extend_from_slice(&chunk[0]);
        pos += needed;
    }

    if pos < input.len() {
        let chunk = resampler
            .process_partial(Some(&[&input[pos..]]), None)
            .map_err(|e| VisqolError::Resample(e.to_string()))?;
        output.extend_from_slice(&chunk[0]);
    }

    // Flush the delay line
    while output.len() < wanted {
        let chunk = resampler
            .process_partial::<&[f64]>(None, None)
            .map_err(|e| VisqolError::Resample(e.to_string()))?;
        if chunk[0].is_empty() {
            break;
        }
        output.extend_from_slice(&chunk[0]);
    }

    let start = delay.min(output.len());
    let end = (start + expected).min(output.len());
    Ok(output[start..end].to_vec())
}

//! WAV output: 16-bit PCM mono.

use std::path::Path;

use crate::artifacts::parent_dir;
use crate::error::{PipelineError, Result};

/// Average interleaved channels down to mono.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels = channels as usize;
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

fn to_i16(sample: f32) -> i16 {
    let clamped = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    (clamped * i16::MAX as f32) as i16
}

/// Write mono f32 samples as a 16-bit PCM WAV, atomically.
///
/// Returns the number of samples written.
pub fn write_wav_pcm16(path: &Path, samples: &[f32], sample_rate: u32) -> Result<usize> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir).map_err(PipelineError::io(dir))?;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(PipelineError::io(dir))?;
    {
        let mut writer = hound::WavWriter::new(std::io::BufWriter::new(&mut tmp), spec)?;
        for &s in samples {
            writer.write_sample(to_i16(s))?;
        }
        writer.finalize()?;
    }
    tmp.as_file().sync_all().map_err(PipelineError::io(tmp.path()))?;
    tmp.persist(path).map_err(|e| PipelineError::io(path)(e.error))?;
    Ok(samples.len())
}

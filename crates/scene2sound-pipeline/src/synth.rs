//! Audio Synthesizer: prompt → audio model → WAV on disk.

use std::path::Path;

use scene2sound_config::AudioSettings;
use scene2sound_media::{AudioModel, AudioRequest};
use scene2sound_types::{AudioArtifact, AudioPrompt};

use crate::error::{PipelineError, Result};
use crate::wav::{downmix, write_wav_pcm16};

#[derive(Debug, Clone)]
pub struct AudioSynthesizer {
    settings: AudioSettings,
}

impl AudioSynthesizer {
    pub fn new(settings: &AudioSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    fn request(&self, prompt: &AudioPrompt) -> AudioRequest {
        AudioRequest {
            prompt: prompt.as_str().to_string(),
            duration_s: self.settings.seconds,
            steps: self.settings.steps,
            guidance_scale: self.settings.guidance,
            seed: self.settings.seed,
            waveforms: self.settings.batch_size,
        }
    }

    /// Generate a clip for `prompt` and write it to `dest`.
    ///
    /// Model-side failures (including an empty waveform) become
    /// [`PipelineError::Generation`]; nothing is written in that case.
    pub async fn synthesize(
        &self,
        image_id: &str,
        prompt: &AudioPrompt,
        dest: &Path,
        model: &dyn AudioModel,
    ) -> Result<AudioArtifact> {
        tracing::debug!(image_id, prompt = %prompt, "Generating audio");

        let output = model
            .generate(self.request(prompt))
            .await
            .map_err(|e| PipelineError::Generation(format!("{e:#}")))?;

        if output.samples.is_empty() || output.sample_rate == 0 {
            return Err(PipelineError::Generation(
                "model returned an empty waveform".into(),
            ));
        }

        let mono = downmix(&output.samples, output.channels);
        let num_samples = write_wav_pcm16(dest, &mono, output.sample_rate)?;

        let artifact = AudioArtifact {
            image_id: image_id.to_string(),
            path: dest.to_path_buf(),
            sample_rate: output.sample_rate,
            num_samples,
        };
        tracing::info!(
            image_id,
            path = %dest.display(),
            duration_s = artifact.duration_s(),
            "Wrote audio"
        );
        Ok(artifact)
    }
}

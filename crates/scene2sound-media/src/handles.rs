//! Lifecycle-scoped model handles.
//!
//! Handles are acquired once per run and passed into the pipeline stages, so
//! tests can substitute in-process models without touching global state.

use scene2sound_config::PipelineRunConfig;

use crate::audio::HttpAudioModel;
use crate::types::{AudioModel, VisionModel};
use crate::vision::OpenAiCompatVision;

/// The models a run holds for its whole duration.
pub struct ModelHandles {
    vision: Option<Box<dyn VisionModel>>,
    audio: Option<Box<dyn AudioModel>>,
}

impl ModelHandles {
    /// Wrap already-constructed models.
    pub fn new(
        vision: Option<Box<dyn VisionModel>>,
        audio: Option<Box<dyn AudioModel>>,
    ) -> Self {
        Self { vision, audio }
    }

    /// Connect to the models this run needs and check each one.
    ///
    /// Stages the run skips get no handle.
    pub async fn load(config: &PipelineRunConfig) -> anyhow::Result<Self> {
        let vision: Option<Box<dyn VisionModel>> = if config.needs_vision() {
            let model = OpenAiCompatVision::new(&config.vision, config.access_token.clone())?;
            tracing::info!(
                model = %config.vision.model,
                endpoint = %config.vision.endpoint,
                "Loading vision-language model"
            );
            model.check().await.map_err(|e| {
                anyhow::anyhow!("vision model '{}' unavailable: {e}", config.vision.model)
            })?;
            Some(Box::new(model))
        } else {
            None
        };

        let audio: Option<Box<dyn AudioModel>> = if config.needs_audio() {
            let model = HttpAudioModel::new(&config.audio, config.access_token.clone())?;
            tracing::info!(
                model = %config.audio.model,
                endpoint = %config.audio.endpoint,
                "Loading audio-generation model"
            );
            model.check().await.map_err(|e| {
                anyhow::anyhow!("audio model '{}' unavailable: {e}", config.audio.model)
            })?;
            Some(Box::new(model))
        } else {
            None
        };

        Ok(Self::new(vision, audio))
    }

    pub fn vision(&self) -> Option<&dyn VisionModel> {
        self.vision.as_deref()
    }

    pub fn audio(&self) -> Option<&dyn AudioModel> {
        self.audio.as_deref()
    }

    /// Release the models.
    pub fn shutdown(self) {
        if let Some(vision) = self.vision {
            tracing::info!(provider = vision.id(), "Released vision-language model");
        }
        if let Some(audio) = self.audio {
            tracing::info!(provider = audio.id(), "Released audio-generation model");
        }
    }
}

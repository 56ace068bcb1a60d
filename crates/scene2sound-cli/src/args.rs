use std::path::PathBuf;

use clap::Parser;
use scene2sound_config::Settings;
use scene2sound_types::StageFlags;

/// Generate ambient audio clips from the sound sources visible in images.
#[derive(Parser, Debug)]
#[command(name = "scene2sound", version)]
pub struct Args {
    /// TOML settings file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Folder of input images
    #[arg(long, alias = "data_dir")]
    pub data_dir: Option<PathBuf>,

    /// Folder for sound-source JSON artifacts
    #[arg(long, alias = "sound_sources_dir")]
    pub sound_sources_dir: Option<PathBuf>,

    /// Folder for generated audio
    #[arg(long, alias = "result_dir")]
    pub result_dir: Option<PathBuf>,

    /// Folder of few-shot examples
    #[arg(long, alias = "examples_dir")]
    pub examples_dir: Option<PathBuf>,

    /// Process only this image
    #[arg(long)]
    pub single: Option<PathBuf>,

    /// Reuse existing sound-source JSON instead of calling the vision model
    #[arg(long, alias = "skip_vlm")]
    pub skip_vlm: bool,

    /// Stop after building prompts
    #[arg(long, alias = "skip_audio")]
    pub skip_audio: bool,

    /// One clip per sound-source variant instead of one per image
    #[arg(long, alias = "per_variant")]
    pub per_variant: bool,

    /// Vision model endpoint (OpenAI-compatible)
    #[arg(long, alias = "vision_url")]
    pub vision_url: Option<String>,

    /// Vision model ID
    #[arg(long, alias = "vision_model")]
    pub vision_model: Option<String>,

    /// Audio model endpoint
    #[arg(long, alias = "audio_url")]
    pub audio_url: Option<String>,

    /// Audio model ID
    #[arg(long, alias = "audio_model")]
    pub audio_model: Option<String>,

    /// Clip length in seconds
    #[arg(long, alias = "audio_seconds")]
    pub audio_seconds: Option<f32>,

    /// Diffusion steps
    #[arg(long, alias = "audio_steps")]
    pub audio_steps: Option<u32>,

    /// Classifier-free guidance scale
    #[arg(long, alias = "audio_guidance")]
    pub audio_guidance: Option<f32>,

    /// Random seed for reproducible audio
    #[arg(long, alias = "audio_seed")]
    pub audio_seed: Option<u64>,

    /// Waveforms generated per prompt
    #[arg(long, alias = "batch_size")]
    pub batch_size: Option<u32>,

    /// Write the run summary as JSON to this path
    #[arg(long, alias = "save_log")]
    pub save_log: Option<PathBuf>,
}

impl Args {
    /// Layer command-line overrides on top of file/default settings.
    pub fn apply(&self, settings: &mut Settings) {
        let paths = &mut settings.paths;
        if let Some(dir) = &self.data_dir {
            paths.data_dir = dir.clone();
        }
        if let Some(dir) = &self.sound_sources_dir {
            paths.sound_sources_dir = dir.clone();
        }
        if let Some(dir) = &self.result_dir {
            paths.result_dir = dir.clone();
        }
        if let Some(dir) = &self.examples_dir {
            paths.examples_dir = dir.clone();
        }

        let vision = &mut settings.vision;
        if let Some(url) = &self.vision_url {
            vision.endpoint = url.clone();
        }
        if let Some(model) = &self.vision_model {
            vision.model = model.clone();
        }

        let audio = &mut settings.audio;
        if let Some(url) = &self.audio_url {
            audio.endpoint = url.clone();
        }
        if let Some(model) = &self.audio_model {
            audio.model = model.clone();
        }
        if let Some(seconds) = self.audio_seconds {
            audio.seconds = seconds;
        }
        if let Some(steps) = self.audio_steps {
            audio.steps = steps;
        }
        if let Some(guidance) = self.audio_guidance {
            audio.guidance = guidance;
        }
        if self.audio_seed.is_some() {
            audio.seed = self.audio_seed;
        }
        if let Some(batch_size) = self.batch_size {
            audio.batch_size = batch_size;
        }
    }

    pub fn stages(&self) -> StageFlags {
        StageFlags {
            skip_vlm: self.skip_vlm,
            skip_audio: self.skip_audio,
            per_variant: self.per_variant,
            single: self.single.clone(),
        }
    }
}

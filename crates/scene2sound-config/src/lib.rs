use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use scene2sound_types::StageFlags;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Invalid {field} URL '{value}': {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Environment variables holding the model-download access token, in lookup order.
pub const ACCESS_TOKEN_VARS: [&str; 2] = ["HUGGING_FACE_TOKEN", "HF_TOKEN"];

/// Filesystem layout of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Folder scanned for input images.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Folder holding one sound-source JSON artifact per image.
    #[serde(default = "default_sound_sources_dir")]
    pub sound_sources_dir: PathBuf,
    /// Folder receiving the generated audio.
    #[serde(default = "default_result_dir")]
    pub result_dir: PathBuf,
    /// Few-shot example store (`<id>_sound_source.json` + `image/<id>.jpg`).
    #[serde(default = "default_examples_dir")]
    pub examples_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_sound_sources_dir() -> PathBuf {
    PathBuf::from("sound_sources")
}

fn default_result_dir() -> PathBuf {
    PathBuf::from("result")
}

fn default_examples_dir() -> PathBuf {
    PathBuf::from("vlm_prompt")
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sound_sources_dir: default_sound_sources_dir(),
            result_dir: default_result_dir(),
            examples_dir: default_examples_dir(),
        }
    }
}

/// Vision-language model service (OpenAI-compatible chat completions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionSettings {
    #[serde(default = "default_vision_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_vision_model")]
    pub model: String,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_vision_endpoint() -> String {
    "http://127.0.0.1:8000/v1".to_string()
}

fn default_vision_model() -> String {
    "Qwen/Qwen2-VL-7B-Instruct".to_string()
}

fn default_max_new_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.3
}

fn default_top_p() -> f32 {
    0.8
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            endpoint: default_vision_endpoint(),
            model: default_vision_model(),
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

/// Audio-generation model service and its sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    #[serde(default = "default_audio_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_audio_model")]
    pub model: String,
    /// Clip length in seconds.
    #[serde(default = "default_audio_seconds")]
    pub seconds: f32,
    /// Diffusion steps.
    #[serde(default = "default_audio_steps")]
    pub steps: u32,
    #[serde(default = "default_audio_guidance")]
    pub guidance: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Waveforms generated per prompt. The service ranks them; the first is kept.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

fn default_audio_endpoint() -> String {
    "http://127.0.0.1:8001".to_string()
}

fn default_audio_model() -> String {
    "cvssp/audioldm-s-full-v2".to_string()
}

fn default_audio_seconds() -> f32 {
    4.0
}

fn default_audio_steps() -> u32 {
    200
}

fn default_audio_guidance() -> f32 {
    3.5
}

fn default_batch_size() -> u32 {
    1
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            endpoint: default_audio_endpoint(),
            model: default_audio_model(),
            seconds: default_audio_seconds(),
            steps: default_audio_steps(),
            guidance: default_audio_guidance(),
            seed: None,
            batch_size: default_batch_size(),
        }
    }
}

/// Prompt construction limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptSettings {
    /// Upper bound on prompt length, counted in whitespace-separated words.
    #[serde(default = "default_max_prompt_words")]
    pub max_prompt_words: usize,
}

fn default_max_prompt_words() -> usize {
    70
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            max_prompt_words: default_max_prompt_words(),
        }
    }
}

/// Settings that may come from a TOML file. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub vision: VisionSettings,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub prompt: PromptSettings,
}

/// Everything a run needs to know. Built once at start and not changed afterwards.
#[derive(Debug, Clone)]
pub struct PipelineRunConfig {
    pub paths: PathSettings,
    pub vision: VisionSettings,
    pub audio: AudioSettings,
    pub prompt: PromptSettings,
    pub stages: StageFlags,
    /// Where to write the JSON run summary, if anywhere.
    pub save_log: Option<PathBuf>,
    /// Bearer token for the model services.
    pub access_token: Option<String>,
}

impl PipelineRunConfig {
    /// Freeze settings and stage flags into a validated run config.
    pub fn new(
        settings: Settings,
        stages: StageFlags,
        save_log: Option<PathBuf>,
        access_token: Option<String>,
    ) -> Result<Self> {
        let config = Self {
            paths: settings.paths,
            vision: settings.vision,
            audio: settings.audio,
            prompt: settings.prompt,
            stages,
            save_log,
            access_token,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let audio = &self.audio;
        if audio.seconds.is_nan() || audio.seconds <= 0.0 || audio.seconds > 600.0 {
            return Err(ConfigError::Invalid(format!(
                "audio seconds must be in (0, 600], got {}",
                audio.seconds
            )));
        }
        if audio.steps == 0 {
            return Err(ConfigError::Invalid("audio steps must be at least 1".into()));
        }
        if audio.batch_size == 0 {
            return Err(ConfigError::Invalid("batch size must be at least 1".into()));
        }
        if audio.guidance.is_nan() || audio.guidance < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "guidance scale must be non-negative, got {}",
                audio.guidance
            )));
        }
        if self.prompt.max_prompt_words == 0 {
            return Err(ConfigError::Invalid(
                "max_prompt_words must be at least 1".into(),
            ));
        }
        if !self.stages.skip_vlm {
            check_url("vision endpoint", &self.vision.endpoint)?;
        }
        if !self.stages.skip_audio {
            check_url("audio endpoint", &self.audio.endpoint)?;
        }
        Ok(())
    }

    /// Whether this run calls the vision-language model.
    pub fn needs_vision(&self) -> bool {
        !self.stages.skip_vlm
    }

    /// Whether this run calls the audio-generation model.
    pub fn needs_audio(&self) -> bool {
        !self.stages.skip_audio
    }
}

fn check_url(field: &'static str, value: &str) -> Result<()> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|source| ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
            source,
        })
}

/// Load `.env` from the working directory, if present.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!("Failed to load .env: {e}"),
    }
}

/// Read the access token from the process environment.
pub fn access_token_from_env() -> Option<String> {
    access_token_from(|name| std::env::var(name).ok())
}

/// Resolve the access token through `lookup`, honouring [`ACCESS_TOKEN_VARS`] order.
pub fn access_token_from(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    ACCESS_TOKEN_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Load settings from `path`, or defaults when no path is given.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => load_settings_from(path),
        None => Ok(Settings::default()),
    }
}

/// Load settings from a TOML file. A missing file is an error.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&content)?;
    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.paths.data_dir, PathBuf::from("data"));
        assert_eq!(settings.audio.model, "cvssp/audioldm-s-full-v2");
        assert_eq!(settings.audio.steps, 200);
        assert_eq!(settings.vision.max_new_tokens, 1024);
        assert_eq!(settings.prompt.max_prompt_words, 70);
    }

    #[test]
    fn test_toml_partial_parse() {
        let toml_str = r#"
            [paths]
            data_dir = "images"

            [audio]
            seconds = 8.0
            seed = 42
        "#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.paths.data_dir, PathBuf::from("images"));
        assert_eq!(settings.paths.result_dir, PathBuf::from("result"));
        assert_eq!(settings.audio.seconds, 8.0);
        assert_eq!(settings.audio.seed, Some(42));
        assert_eq!(settings.audio.guidance, 3.5);
        assert_eq!(settings.vision, VisionSettings::default());
    }

    #[test]
    fn test_load_settings_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_settings(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
        assert_eq!(load_settings(None).unwrap(), Settings::default());
    }

    #[test]
    fn test_load_settings_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene2sound.toml");
        std::fs::write(&path, "[prompt]\nmax_prompt_words = 12\n").unwrap();
        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings.prompt.max_prompt_words, 12);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.audio.seconds = 0.0;
        let err = PipelineRunConfig::new(settings, StageFlags::default(), None, None).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let mut settings = Settings::default();
        settings.audio.batch_size = 0;
        assert!(PipelineRunConfig::new(settings, StageFlags::default(), None, None).is_err());

        let mut settings = Settings::default();
        settings.vision.endpoint = "not a url".into();
        let err = PipelineRunConfig::new(settings, StageFlags::default(), None, None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
    }

    #[test]
    fn test_skipped_stage_endpoint_not_checked() {
        let mut settings = Settings::default();
        settings.vision.endpoint = "not a url".into();
        let stages = StageFlags {
            skip_vlm: true,
            ..Default::default()
        };
        let config = PipelineRunConfig::new(settings, stages, None, None).unwrap();
        assert!(!config.needs_vision());
        assert!(config.needs_audio());
    }

    #[test]
    fn test_access_token_lookup_order() {
        let token = access_token_from(|name| match name {
            "HUGGING_FACE_TOKEN" => Some("hf_primary".into()),
            "HF_TOKEN" => Some("hf_fallback".into()),
            _ => None,
        });
        assert_eq!(token.as_deref(), Some("hf_primary"));

        let token = access_token_from(|name| match name {
            "HUGGING_FACE_TOKEN" => Some("  ".into()),
            "HF_TOKEN" => Some("hf_fallback".into()),
            _ => None,
        });
        assert_eq!(token.as_deref(), Some("hf_fallback"));

        assert_eq!(access_token_from(|_| None), None);
    }
}

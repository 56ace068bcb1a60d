//! Pipeline error types.

use std::path::{Path, PathBuf};

use scene2sound_types::ErrorKind;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Input path missing or not a readable image. Fatal.
    #[error("not found: {path}: {reason}")]
    NotFound { path: PathBuf, reason: String },

    /// Model output could not be turned into sound sources.
    #[error("parse: {0}")]
    Parse(String),

    /// Extraction produced no sound sources for the image.
    #[error("no sound sources described for image '{0}'")]
    EmptyDescription(String),

    /// `skip_vlm` run with no prior sound-source JSON for the image.
    #[error("no sound-source artifact for image '{image_id}' at {path}")]
    MissingArtifact { image_id: String, path: PathBuf },

    /// The vision-language model call failed.
    #[error("vision model: {0}")]
    Extraction(String),

    /// The audio-generation model call failed.
    #[error("audio model: {0}")]
    Generation(String),

    /// A second input image with an identifier already processed in this run.
    #[error("duplicate image id '{image_id}': {path} (already used by another image)")]
    DuplicateId { image_id: String, path: PathBuf },

    /// File name unusable as an artifact identifier (`..`, separators).
    #[error("invalid image id from {0}")]
    InvalidId(PathBuf),

    #[error("io: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("wav: {0}")]
    Wav(#[from] hound::Error),

    /// Bad configuration. Fatal.
    #[error("config: {0}")]
    Config(#[from] scene2sound_config::ConfigError),

    /// A model could not be loaded. Fatal.
    #[error("model load: {0}")]
    ModelLoad(String),
}

impl PipelineError {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl AsRef<Path>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        move |source| Self::Io { path, source }
    }

    pub fn not_found(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Parse(_) => ErrorKind::Parse,
            Self::EmptyDescription(_) => ErrorKind::EmptyDescription,
            Self::MissingArtifact { .. } => ErrorKind::MissingArtifact,
            Self::Extraction(_) => ErrorKind::Extraction,
            Self::Generation(_) => ErrorKind::Generation,
            Self::DuplicateId { .. } => ErrorKind::DuplicateId,
            Self::InvalidId(_) => ErrorKind::InvalidId,
            Self::Io { .. } | Self::Json(_) | Self::Wav(_) => ErrorKind::Io,
            Self::Config(_) => ErrorKind::Config,
            Self::ModelLoad(_) => ErrorKind::ModelLoad,
        }
    }

    /// Setup errors abort the run; everything else only fails one image.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Config(_) | Self::ModelLoad(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_fatality() {
        let err = PipelineError::not_found("data/404.jpg", "no such file");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_fatal());
        assert!(err.to_string().contains("data/404.jpg"));

        let err = PipelineError::EmptyDescription("102".into());
        assert_eq!(err.kind(), ErrorKind::EmptyDescription);
        assert!(!err.is_fatal());

        let err = PipelineError::io("out/x.wav")(std::io::Error::other("disk full"));
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(!err.is_fatal());

        assert!(!PipelineError::Generation("oom".into()).is_fatal());
        let err = PipelineError::InvalidId("data/...jpg".into());
        assert_eq!(err.kind(), ErrorKind::InvalidId);
        assert!(!err.is_fatal());
        assert!(PipelineError::ModelLoad("refused".into()).is_fatal());
    }
}

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ──────────────────── Image Types ────────────────────

/// An input image, identified by its file stem (`data/101.jpg` -> `101`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub path: PathBuf,
}

impl ImageRecord {
    /// Build a record from a path, or `None` if the path has no usable file stem.
    ///
    /// The id names artifact files and folders, so it must be a single plain
    /// path component: `.`, `..` and stems containing a separator are refused.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let id = path.file_stem()?.to_str()?.trim();
        if !is_valid_id(id) {
            return None;
        }
        Some(Self {
            id: id.to_string(),
            path: path.to_path_buf(),
        })
    }
}

/// Whether `id` can be used as a single file-name component.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\'])
}

// ──────────────────── Sound Source Types ────────────────────

/// Candidate sound sources extracted from one image.
///
/// Persisted as `<image_id>_sound_source.json`:
/// `{"image_id": "101", "sources": [{"label": "dog barking"}]}` plus the
/// optional scene/mood/variant fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundSourceDescription {
    pub image_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood_description: Option<String>,
    #[serde(default)]
    pub sources: Vec<SoundSource>,
}

/// One object in the scene that can make sound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundSource {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<SoundVariant>,
    /// Fields the model emitted that have no dedicated slot.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A way of making a source sound (knock, rustle, drip, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoundVariant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_method: Option<String>,
    #[serde(default)]
    pub timbre: Vec<String>,
    /// Instrument whose character the sound resembles; `"None"` or absent means no mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_to_music_instrument: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl SoundSource {
    /// A source carrying only a label.
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            material: None,
            variants: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl SoundVariant {
    /// The instrument mapping, with the model's `"None"` spelling treated as absent.
    pub fn instrument(&self) -> Option<&str> {
        self.mapping_to_music_instrument
            .as_deref()
            .map(str::trim)
            .filter(|i| !i.is_empty() && !i.eq_ignore_ascii_case("none"))
    }
}

/// Variant count the extraction instruction asks the model to reach.
pub const MIN_EXPECTED_VARIANTS: usize = 5;

impl SoundSourceDescription {
    pub fn new(image_id: impl Into<String>, sources: Vec<SoundSource>) -> Self {
        Self {
            image_id: image_id.into(),
            scene_description: None,
            mood_description: None,
            sources,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.label.as_str())
    }

    pub fn total_variants(&self) -> usize {
        self.sources.iter().map(|s| s.variants.len()).sum()
    }

    /// Structural gaps worth a warning. None of them make the description unusable.
    pub fn validation_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.scene_description.is_none() {
            issues.push("Missing field: scene_description".to_string());
        }
        if self.mood_description.is_none() {
            issues.push("Missing field: mood_description".to_string());
        }
        for (i, source) in self.sources.iter().enumerate() {
            if source.material.is_none() {
                issues.push(format!("sources[{i}] missing field: material"));
            }
            if source.variants.is_empty() {
                issues.push(format!("sources[{i}] missing field: variants"));
            }
            for (j, variant) in source.variants.iter().enumerate() {
                if variant.play_method.is_none() {
                    issues.push(format!("sources[{i}].variants[{j}] missing field: play_method"));
                }
                if variant.timbre.is_empty() {
                    issues.push(format!("sources[{i}].variants[{j}] missing field: timbre"));
                }
            }
        }
        issues
    }
}

// ──────────────────── Prompt Types ────────────────────

/// Text prompt handed to the audio-generation model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioPrompt(String);

impl AudioPrompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn word_count(&self) -> usize {
        self.0.split_whitespace().count()
    }
}

impl fmt::Display for AudioPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Prompt for a single (source, variant) pair in per-variant mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantPrompt {
    pub source_name: String,
    pub play_method: String,
    pub prompt: AudioPrompt,
}

// ──────────────────── Artifact Types ────────────────────

/// A synthesized clip written to the results folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub image_id: String,
    pub path: PathBuf,
    pub sample_rate: u32,
    pub num_samples: usize,
}

impl AudioArtifact {
    pub fn duration_s(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_samples as f64 / self.sample_rate as f64
    }
}

// ──────────────────── Run Summary Types ────────────────────

/// Category of a failure, as reported in logs and the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Parse,
    EmptyDescription,
    MissingArtifact,
    Extraction,
    Generation,
    Io,
    /// Another input image already produced this identifier.
    DuplicateId,
    /// The file name does not yield a usable identifier.
    InvalidId,
    Config,
    ModelLoad,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Parse => "parse",
            Self::EmptyDescription => "empty_description",
            Self::MissingArtifact => "missing_artifact",
            Self::Extraction => "extraction",
            Self::Generation => "generation",
            Self::Io => "io",
            Self::DuplicateId => "duplicate_id",
            Self::InvalidId => "invalid_id",
            Self::Config => "config",
            Self::ModelLoad => "model_load",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stages a run executes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFlags {
    pub skip_vlm: bool,
    pub skip_audio: bool,
    pub per_variant: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded,
    Failed,
}

/// What happened to one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageOutcome {
    pub image_id: String,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_variants: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_issues: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<PathBuf>,
}

impl ImageOutcome {
    pub fn succeeded(image_id: impl Into<String>) -> Self {
        Self {
            image_id: image_id.into(),
            status: OutcomeStatus::Succeeded,
            error_kind: None,
            error: None,
            sources_count: None,
            total_variants: None,
            validation_issues: Vec::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn failed(image_id: impl Into<String>, kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            error_kind: Some(kind),
            error: Some(error.into()),
            ..Self::succeeded(image_id)
        }
    }

    /// Turn an in-progress outcome into a failure, keeping what was recorded so far.
    pub fn mark_failed(&mut self, kind: ErrorKind, error: impl Into<String>) {
        self.status = OutcomeStatus::Failed;
        self.error_kind = Some(kind);
        self.error = Some(error.into());
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}

/// Aggregate record of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: StageFlags,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<ImageOutcome>,
}

impl RunSummary {
    pub fn start(stages: StageFlags) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            stages,
            total: 0,
            succeeded: 0,
            failed: 0,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: ImageOutcome) {
        self.total += 1;
        if outcome.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ImageOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

//! On-disk artifacts, keyed by image identifier.
//!
//! ```text
//! <sound_sources_dir>/<id>/<id>_sound_source.json
//! <sound_sources_dir>/<id>/<id>_prompt.txt
//! <result_dir>/<id>.wav
//! <result_dir>/<id>/NN_<source>_<method>.wav   (per-variant mode)
//! <result_dir>/<id>/prompts.json               (per-variant mode)
//! ```
//!
//! Every write goes to a temporary file in the destination folder and is
//! renamed into place, so readers never see a partial file.

use std::io::Write;
use std::path::{Path, PathBuf};

use scene2sound_config::PathSettings;
use scene2sound_types::{AudioPrompt, SoundSourceDescription, VariantPrompt, is_valid_id};

use crate::error::{PipelineError, Result};
use crate::fewshot::SOUND_SOURCE_SUFFIX;
use crate::parse::normalize_value;

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    sound_sources_dir: PathBuf,
    result_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(paths: &PathSettings) -> Self {
        Self {
            sound_sources_dir: paths.sound_sources_dir.clone(),
            result_dir: paths.result_dir.clone(),
        }
    }

    /// Create the artifact folders.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.sound_sources_dir, &self.result_dir] {
            std::fs::create_dir_all(dir).map_err(PipelineError::io(dir))?;
        }
        Ok(())
    }

    pub fn description_path(&self, image_id: &str) -> PathBuf {
        self.sound_sources_dir
            .join(image_id)
            .join(format!("{image_id}{SOUND_SOURCE_SUFFIX}"))
    }

    fn flat_description_path(&self, image_id: &str) -> PathBuf {
        self.sound_sources_dir
            .join(format!("{image_id}{SOUND_SOURCE_SUFFIX}"))
    }

    pub fn prompt_path(&self, image_id: &str) -> PathBuf {
        self.sound_sources_dir
            .join(image_id)
            .join(format!("{image_id}_prompt.txt"))
    }

    pub fn audio_path(&self, image_id: &str) -> PathBuf {
        self.result_dir.join(format!("{image_id}.wav"))
    }

    pub fn variant_dir(&self, image_id: &str) -> PathBuf {
        self.result_dir.join(image_id)
    }

    /// Persist a description as pretty JSON.
    pub fn write_description(&self, desc: &SoundSourceDescription) -> Result<PathBuf> {
        let path = self.description_path(checked_id(&desc.image_id)?);
        let json = serde_json::to_vec_pretty(desc)?;
        write_atomic(&path, &json)?;
        Ok(path)
    }

    /// Read the description persisted for `image_id` by an earlier run.
    ///
    /// Looks in the per-image folder first, then directly under the
    /// sound-sources folder.
    pub fn read_description(&self, image_id: &str) -> Result<SoundSourceDescription> {
        checked_id(image_id)?;
        let nested = self.description_path(image_id);
        let path = [nested.clone(), self.flat_description_path(image_id)]
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| PipelineError::MissingArtifact {
                image_id: image_id.to_string(),
                path: nested,
            })?;

        let content = std::fs::read_to_string(&path).map_err(PipelineError::io(&path))?;
        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            PipelineError::Parse(format!("artifact {} is not valid JSON: {e}", path.display()))
        })?;
        if let Some(stored) = value.get("image_id").and_then(|v| v.as_str())
            && stored != image_id
        {
            tracing::warn!(image_id, stored, "Artifact image_id does not match its file name");
        }
        normalize_value(image_id, value)
    }

    /// Cache the prompt next to its description.
    pub fn write_prompt(&self, image_id: &str, prompt: &AudioPrompt) -> Result<PathBuf> {
        let path = self.prompt_path(checked_id(image_id)?);
        write_atomic(&path, prompt.as_str().as_bytes())?;
        Ok(path)
    }

    /// Record the per-variant prompts used for an image's clips.
    pub fn write_variant_prompts(&self, image_id: &str, prompts: &[VariantPrompt]) -> Result<PathBuf> {
        let path = self.variant_dir(checked_id(image_id)?).join("prompts.json");
        let json = serde_json::to_vec_pretty(prompts)?;
        write_atomic(&path, &json)?;
        Ok(path)
    }
}

/// Artifact paths are built by joining the id; anything that could leave
/// the artifact folders is refused.
fn checked_id(image_id: &str) -> Result<&str> {
    if is_valid_id(image_id) {
        Ok(image_id)
    } else {
        Err(PipelineError::InvalidId(PathBuf::from(image_id)))
    }
}

/// Write `bytes` to `path` through a temporary file in the same folder.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir).map_err(PipelineError::io(dir))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(PipelineError::io(dir))?;
    tmp.write_all(bytes).map_err(PipelineError::io(tmp.path()))?;
    tmp.as_file().sync_all().map_err(PipelineError::io(tmp.path()))?;
    tmp.persist(path).map_err(|e| PipelineError::io(path)(e.error))?;
    Ok(())
}

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Make `text` safe as a file-name component: path and shell-hostile
/// characters become `_`, whitespace runs become `_`, and the result is at
/// most `max_len` characters.
pub fn sanitize_filename(text: &str, max_len: usize) -> String {
    const INVALID: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
    let replaced: String = text
        .chars()
        .map(|c| if INVALID.contains(&c) { '_' } else { c })
        .collect();
    let joined = replaced.split_whitespace().collect::<Vec<_>>().join("_");
    let truncated: String = joined.chars().take(max_len).collect();
    if truncated.is_empty() {
        "_".to_string()
    } else {
        truncated
    }
}

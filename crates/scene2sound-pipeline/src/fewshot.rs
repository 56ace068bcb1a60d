//! Extraction instruction and the few-shot example store.

use std::path::{Path, PathBuf};

use scene2sound_media::{ImageInput, VisionExample};

use crate::images::{IMAGE_EXTENSIONS, mime_type};
use crate::parse::normalize_value;

/// Suffix of sound-source JSON files, shared by examples and artifacts.
pub const SOUND_SOURCE_SUFFIX: &str = "_sound_source.json";

/// Text sent with every image, example or real.
pub const SOURCE_QUERY: &str =
    "Analyze this image and generate a sound source JSON. Output only the JSON object.";

/// System instruction for the vision-language model.
pub const EXTRACTION_INSTRUCTION: &str = r#"You design soundscapes for still images. Look at the image and describe the physical sounds that could plausibly be heard in it, as one JSON object.

Work through these steps silently and output only the final JSON:

1. Scene. Write one vivid sentence summarising the scene (scene_description) and a few keywords for its atmosphere (mood_description).
2. Sources. List the objects that can make sound, with their main material. Include interactions between objects (footsteps on gravel) and with the environment (leaves in an unseen wind). Leave out human speech and emotional vocalisations such as laughing or crying; physical human sounds like footsteps, clapping or rustling clothes are fine.
3. Variants. For each source give one or more ways it sounds:
   - play_method: the action producing the sound (rustle, knock, footstep, drip, ...)
   - timbre: a list of keywords for its character
   - mapping_to_music_instrument: guitar, bass, keyboard or drums if the sound resembles one, otherwise "None"
   - confidence: 0.0 to 1.0, how well the sound fits the scene, mood and material
4. Filter. Drop variants with confidence below 0.7, but keep at least 5 variants in total; if filtering leaves fewer, restore the most plausible ones.

Output format:
{
  "scene_description": "...",
  "mood_description": "...",
  "sources": [
    {
      "label": "...",
      "material": "...",
      "variants": [
        {"play_method": "...", "timbre": ["...", "..."], "mapping_to_music_instrument": "None", "confidence": 0.8}
      ]
    }
  ]
}"#;

/// One worked example: an image and the JSON it should produce.
#[derive(Debug, Clone)]
pub struct FewShotExample {
    pub id: String,
    pub image: ImageInput,
    pub answer: String,
}

/// Worked examples shown to the model ahead of each real image.
///
/// Laid out as `<dir>/<id>_sound_source.json` next to `<dir>/image/<id>.jpg`.
#[derive(Debug, Clone, Default)]
pub struct ExampleStore {
    examples: Vec<FewShotExample>,
}

impl ExampleStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load every complete example pair under `dir`, sorted by id.
    ///
    /// Incomplete or unreadable pairs are skipped with a warning. A missing
    /// directory yields an empty store, i.e. zero-shot extraction.
    pub fn load(dir: &Path) -> Self {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "No few-shot examples available: {e}");
                return Self::empty();
            }
        };

        let mut ids: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                name.strip_suffix(SOUND_SOURCE_SUFFIX)
                    .filter(|id| !id.is_empty())
                    .map(String::from)
            })
            .collect();
        ids.sort();

        let mut examples = Vec::with_capacity(ids.len());
        for id in ids {
            match load_example(dir, &id) {
                Ok(example) => {
                    tracing::debug!(example = %id, "Loaded few-shot example");
                    examples.push(example);
                }
                Err(e) => tracing::warn!(example = %id, "Skipping few-shot example: {e}"),
            }
        }

        if examples.is_empty() {
            tracing::warn!(dir = %dir.display(), "No complete few-shot examples found");
        }
        Self { examples }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn examples(&self) -> &[FewShotExample] {
        &self.examples
    }

    pub fn to_vision_examples(&self) -> Vec<VisionExample> {
        self.examples
            .iter()
            .map(|e| VisionExample {
                image: e.image.clone(),
                answer: e.answer.clone(),
            })
            .collect()
    }
}

fn load_example(dir: &Path, id: &str) -> anyhow::Result<FewShotExample> {
    let json_path = dir.join(format!("{id}{SOUND_SOURCE_SUFFIX}"));
    let image_path = find_example_image(dir, id)
        .ok_or_else(|| anyhow::anyhow!("no image/{id}.* next to {}", json_path.display()))?;

    let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json_path)?)?;
    let desc = normalize_value(id, value)?;
    // Re-serialised so the model sees the same schema it must produce.
    let answer = serde_json::to_string(&desc)?;

    let data = std::fs::read(&image_path)?;
    let image = ImageInput {
        mime_type: mime_type(&image_path, &data).to_string(),
        data,
    };

    Ok(FewShotExample {
        id: id.to_string(),
        image,
        answer,
    })
}

fn find_example_image(dir: &Path, id: &str) -> Option<PathBuf> {
    let image_dir = dir.join("image");
    IMAGE_EXTENSIONS
        .iter()
        .flat_map(|ext| [ext.to_string(), ext.to_ascii_uppercase()])
        .map(|ext| image_dir.join(format!("{id}.{ext}")))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_pairs_sorted_and_skips_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("image")).unwrap();

        std::fs::write(
            dir.path().join("211_sound_source.json"),
            r#"{"sound_sources": [{"name": "bell", "material": "brass"}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("image").join("211.jpg"), b"jpg").unwrap();

        std::fs::write(
            dir.path().join("111_sound_source.json"),
            r#"{"sources": [{"label": "creek"}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("image").join("111.PNG"), b"png").unwrap();

        // JSON without a matching image.
        std::fs::write(
            dir.path().join("999_sound_source.json"),
            r#"{"sources": []}"#,
        )
        .unwrap();

        let store = ExampleStore::load(dir.path());
        assert_eq!(store.len(), 2);
        let ids: Vec<_> = store.examples().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["111", "211"]);

        let bell: serde_json::Value = serde_json::from_str(&store.examples()[1].answer).unwrap();
        assert_eq!(bell["sources"][0]["label"], "bell");
        assert_eq!(bell["image_id"], "211");
        assert_eq!(store.to_vision_examples().len(), 2);
    }

    #[test]
    fn test_missing_dir_is_zero_shot() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExampleStore::load(&dir.path().join("vlm_prompt"));
        assert!(store.is_empty());
    }
}

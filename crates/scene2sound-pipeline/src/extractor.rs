//! Sound-Source Extractor: image → vision-language model → persisted JSON.

use std::path::PathBuf;

use scene2sound_media::{VisionExample, VisionModel, VisionRequest};
use scene2sound_types::{ImageRecord, MIN_EXPECTED_VARIANTS, SoundSourceDescription};

use crate::artifacts::ArtifactStore;
use crate::error::{PipelineError, Result};
use crate::fewshot::{EXTRACTION_INSTRUCTION, ExampleStore, SOURCE_QUERY};
use crate::images::load_image;
use crate::parse::parse_response;

pub struct SourceExtractor {
    instruction: String,
    examples: Vec<VisionExample>,
    store: ArtifactStore,
}

impl SourceExtractor {
    pub fn new(examples: &ExampleStore, store: ArtifactStore) -> Self {
        Self {
            instruction: EXTRACTION_INSTRUCTION.to_string(),
            examples: examples.to_vision_examples(),
            store,
        }
    }

    pub fn example_count(&self) -> usize {
        self.examples.len()
    }

    /// Describe the sound sources in one image and persist the result.
    ///
    /// The JSON artifact is written even when no sources were found; the
    /// caller decides what an empty description means.
    pub async fn extract(
        &self,
        record: &ImageRecord,
        model: &dyn VisionModel,
    ) -> Result<(SoundSourceDescription, PathBuf)> {
        let image = load_image(record).await?;
        let request = VisionRequest {
            instruction: self.instruction.clone(),
            examples: self.examples.clone(),
            image,
            query: SOURCE_QUERY.to_string(),
        };

        let raw = model
            .generate(request)
            .await
            .map_err(|e| PipelineError::Extraction(format!("{e:#}")))?;
        tracing::debug!(image_id = %record.id, chars = raw.len(), "Vision model responded");

        let desc = parse_response(&record.id, &raw)?;
        let path = self.store.write_description(&desc)?;

        for issue in desc.validation_issues() {
            tracing::warn!(image_id = %record.id, "{issue}");
        }
        let variants = desc.total_variants();
        if !desc.is_empty() && variants < MIN_EXPECTED_VARIANTS {
            tracing::warn!(
                image_id = %record.id,
                variants,
                "Fewer sound variants than requested"
            );
        }
        tracing::info!(
            image_id = %record.id,
            sources = desc.sources.len(),
            variants,
            path = %path.display(),
            "Extracted sound sources"
        );
        Ok((desc, path))
    }
}

//! Pipeline Driver: batch loop, stage skipping and partial-failure policy.
//!
//! ```text
//! Start → EnumerateImages → PerImage{Extract → BuildPrompt → Synthesize} → Aggregate → Done
//! ```
//!
//! `skip_vlm` starts each image at BuildPrompt from the persisted JSON,
//! `skip_audio` stops after BuildPrompt, and `single` replaces enumeration
//! with one explicit image. Images are processed one at a time; a failure
//! is recorded against its image and the batch moves on.

use std::collections::HashSet;

use scene2sound_config::PipelineRunConfig;
use scene2sound_media::{AudioModel, ModelHandles, VisionModel};
use scene2sound_types::{ImageOutcome, ImageRecord, RunSummary, SoundSourceDescription};

use crate::artifacts::{ArtifactStore, sanitize_filename, write_atomic};
use crate::error::{PipelineError, Result};
use crate::extractor::SourceExtractor;
use crate::fewshot::ExampleStore;
use crate::images::{self, ImageSource};
use crate::prompt::PromptBuilder;
use crate::synth::AudioSynthesizer;

/// Longest source or method name kept in a per-variant clip file name.
const MAX_NAME_LEN: usize = 40;

pub struct PipelineDriver {
    config: PipelineRunConfig,
    models: ModelHandles,
    store: ArtifactStore,
    extractor: SourceExtractor,
    prompts: PromptBuilder,
    synth: AudioSynthesizer,
}

impl PipelineDriver {
    /// Assemble the stages for one run. Few-shot examples are only loaded
    /// when the run calls the vision model.
    pub fn new(config: PipelineRunConfig, models: ModelHandles) -> Self {
        let store = ArtifactStore::new(&config.paths);
        let examples = if config.needs_vision() {
            ExampleStore::load(&config.paths.examples_dir)
        } else {
            ExampleStore::empty()
        };
        let extractor = SourceExtractor::new(&examples, store.clone());
        let prompts = PromptBuilder::new(&config.prompt);
        let synth = AudioSynthesizer::new(&config.audio);
        Self {
            config,
            models,
            store,
            extractor,
            prompts,
            synth,
        }
    }

    /// Process the whole batch.
    ///
    /// Returns `Err` only for setup failures (missing or empty input, missing
    /// model handle, unwritable output folders). Per-image failures land in
    /// the returned summary.
    pub async fn run(&self) -> Result<RunSummary> {
        let records = self.enumerate()?;
        self.check_models()?;
        self.store.ensure_dirs()?;

        tracing::info!(
            images = records.len(),
            examples = self.extractor.example_count(),
            skip_vlm = self.config.stages.skip_vlm,
            skip_audio = self.config.stages.skip_audio,
            per_variant = self.config.stages.per_variant,
            "Starting run"
        );

        let mut summary = RunSummary::start(self.config.stages.clone());
        let mut seen = HashSet::new();
        for item in records {
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    let label = match &e {
                        PipelineError::InvalidId(path) => path.display().to_string(),
                        _ => String::new(),
                    };
                    record_failure(&mut summary, &label, &e);
                    continue;
                }
            };
            // The first image to claim an id keeps it; later ones would
            // overwrite its artifacts.
            if !seen.insert(record.id.clone()) {
                let e = PipelineError::DuplicateId {
                    image_id: record.id.clone(),
                    path: record.path.clone(),
                };
                record_failure(&mut summary, &record.id, &e);
                continue;
            }

            let mut outcome = ImageOutcome::succeeded(&record.id);
            match self.process(&record, &mut outcome).await {
                Ok(()) => tracing::info!(image_id = %record.id, "Image done"),
                Err(e) => {
                    tracing::warn!(image_id = %record.id, kind = %e.kind(), "Image failed: {e}");
                    outcome.mark_failed(e.kind(), e.to_string());
                }
            }
            summary.record(outcome);
        }
        summary.finish();

        tracing::info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Run finished"
        );
        for failure in summary.failures() {
            tracing::info!(
                image_id = %failure.image_id,
                kind = failure.error_kind.map(|k| k.as_str()).unwrap_or("unknown"),
                "Failed image"
            );
        }

        if let Some(path) = &self.config.save_log {
            match serde_json::to_vec_pretty(&summary)
                .map_err(PipelineError::from)
                .and_then(|json| write_atomic(path, &json))
            {
                Ok(()) => tracing::info!(path = %path.display(), "Saved run log"),
                Err(e) => tracing::error!(path = %path.display(), "Failed to save run log: {e}"),
            }
        }

        Ok(summary)
    }

    /// Release the model handles.
    pub fn shutdown(self) {
        self.models.shutdown();
    }

    /// Input images in processing order. Files that cannot be identified
    /// stay in the list as errors so they are counted as failures.
    fn enumerate(&self) -> Result<Vec<Result<ImageRecord>>> {
        if let Some(path) = &self.config.stages.single {
            return Ok(vec![Ok(images::single(path)?)]);
        }

        let source = ImageSource::open(&self.config.paths.data_dir)?;
        let records: Vec<Result<ImageRecord>> = source.iter().collect();
        if records.is_empty() {
            return Err(PipelineError::not_found(
                source.root(),
                "no images in input folder",
            ));
        }
        Ok(records)
    }

    fn check_models(&self) -> Result<()> {
        if self.config.needs_vision() && self.models.vision().is_none() {
            return Err(PipelineError::ModelLoad("no vision model loaded".into()));
        }
        if self.config.needs_audio() && self.models.audio().is_none() {
            return Err(PipelineError::ModelLoad("no audio model loaded".into()));
        }
        Ok(())
    }

    fn vision(&self) -> Result<&dyn VisionModel> {
        self.models
            .vision()
            .ok_or_else(|| PipelineError::ModelLoad("no vision model loaded".into()))
    }

    fn audio(&self) -> Result<&dyn AudioModel> {
        self.models
            .audio()
            .ok_or_else(|| PipelineError::ModelLoad("no audio model loaded".into()))
    }

    async fn process(&self, record: &ImageRecord, outcome: &mut ImageOutcome) -> Result<()> {
        let desc = self.describe(record, outcome).await?;
        outcome.sources_count = Some(desc.sources.len());
        outcome.total_variants = Some(desc.total_variants());
        outcome.validation_issues = desc.validation_issues();

        if self.config.stages.per_variant {
            self.process_variants(&desc, outcome).await
        } else {
            self.process_single_clip(&desc, outcome).await
        }
    }

    async fn describe(
        &self,
        record: &ImageRecord,
        outcome: &mut ImageOutcome,
    ) -> Result<SoundSourceDescription> {
        if self.config.stages.skip_vlm {
            let desc = self.store.read_description(&record.id)?;
            tracing::debug!(image_id = %record.id, sources = desc.sources.len(), "Reusing sound sources");
            return Ok(desc);
        }
        let (desc, path) = self.extractor.extract(record, self.vision()?).await?;
        outcome.artifacts.push(path);
        Ok(desc)
    }

    async fn process_single_clip(
        &self,
        desc: &SoundSourceDescription,
        outcome: &mut ImageOutcome,
    ) -> Result<()> {
        let image_id = desc.image_id.as_str();
        let prompt = self.prompts.build(desc)?;
        tracing::info!(image_id, prompt = %prompt, "Built prompt");
        outcome.artifacts.push(self.store.write_prompt(image_id, &prompt)?);

        if self.config.stages.skip_audio {
            return Ok(());
        }
        let dest = self.store.audio_path(image_id);
        let artifact = self
            .synth
            .synthesize(image_id, &prompt, &dest, self.audio()?)
            .await?;
        outcome.artifacts.push(artifact.path);
        Ok(())
    }

    /// One clip per (source, variant). Every clip is attempted; the image
    /// fails if any of them did.
    async fn process_variants(
        &self,
        desc: &SoundSourceDescription,
        outcome: &mut ImageOutcome,
    ) -> Result<()> {
        let image_id = desc.image_id.as_str();
        let prompts = self.prompts.build_variants(desc)?;
        outcome
            .artifacts
            .push(self.store.write_variant_prompts(image_id, &prompts)?);

        if self.config.stages.skip_audio {
            return Ok(());
        }
        let audio = self.audio()?;
        let dir = self.store.variant_dir(image_id);

        let mut first_error = None;
        let mut failed = 0usize;
        for (i, variant) in prompts.iter().enumerate() {
            let file_name = format!(
                "{:02}_{}_{}.wav",
                i + 1,
                sanitize_filename(&variant.source_name, MAX_NAME_LEN),
                sanitize_filename(&variant.play_method, MAX_NAME_LEN)
            );
            match self
                .synth
                .synthesize(image_id, &variant.prompt, &dir.join(file_name), audio)
                .await
            {
                Ok(artifact) => outcome.artifacts.push(artifact.path),
                Err(e) => {
                    tracing::warn!(
                        image_id,
                        source = %variant.source_name,
                        play_method = %variant.play_method,
                        "Variant clip failed: {e}"
                    );
                    failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            None => Ok(()),
            Some(e) => Err(PipelineError::Generation(format!(
                "{failed} of {} variant clips failed; first: {e}",
                prompts.len()
            ))),
        }
    }
}

fn record_failure(summary: &mut RunSummary, image_id: &str, e: &PipelineError) {
    tracing::warn!(image_id, kind = %e.kind(), "Image failed: {e}");
    summary.record(ImageOutcome::failed(image_id, e.kind(), e.to_string()));
}

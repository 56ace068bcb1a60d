mod args;

use std::process::ExitCode;

use clap::Parser;
use scene2sound_config::PipelineRunConfig;
use scene2sound_media::ModelHandles;
use scene2sound_pipeline::{PipelineDriver, PipelineError};
use scene2sound_types::RunSummary;

use crate::args::Args;

/// Some image failed.
const EXIT_FAILED: u8 = 1;
/// Configuration or setup failure; nothing was processed.
const EXIT_SETUP: u8 = 2;

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    scene2sound_config::load_dotenv();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start runtime: {e}");
            return ExitCode::from(EXIT_SETUP);
        }
    };

    let result = rt.block_on(run(args));
    match &result {
        Ok(summary) => println!(
            "{} images: {} succeeded, {} failed",
            summary.total, summary.succeeded, summary.failed
        ),
        Err(e) => tracing::error!(kind = %e.kind(), "{e}"),
    }
    ExitCode::from(exit_status(&result))
}

/// 0 when every image succeeded, 1 when any failed, 2 on setup errors.
fn exit_status(result: &Result<RunSummary, PipelineError>) -> u8 {
    match result {
        Ok(summary) if summary.all_succeeded() => 0,
        Ok(_) => EXIT_FAILED,
        Err(_) => EXIT_SETUP,
    }
}

/// Everything that can fail here is a setup error; per-image failures are
/// carried in the summary.
async fn run(args: Args) -> Result<RunSummary, PipelineError> {
    let mut settings = scene2sound_config::load_settings(args.config.as_deref())?;
    args.apply(&mut settings);
    let config = PipelineRunConfig::new(
        settings,
        args.stages(),
        args.save_log.clone(),
        scene2sound_config::access_token_from_env(),
    )?;

    let models = ModelHandles::load(&config)
        .await
        .map_err(|e| PipelineError::ModelLoad(format!("{e:#}")))?;
    let driver = PipelineDriver::new(config, models);
    let result = driver.run().await;
    driver.shutdown();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene2sound_config::ConfigError;
    use scene2sound_types::{ErrorKind, ImageOutcome, StageFlags};

    #[test]
    fn test_exit_status_all_succeeded() {
        let mut summary = RunSummary::start(StageFlags::default());
        summary.record(ImageOutcome::succeeded("101"));
        summary.finish();
        assert_eq!(exit_status(&Ok(summary)), 0);
    }

    #[test]
    fn test_exit_status_some_failed() {
        let mut summary = RunSummary::start(StageFlags::default());
        summary.record(ImageOutcome::succeeded("1"));
        summary.record(ImageOutcome::failed("2", ErrorKind::Extraction, "internal error"));
        summary.record(ImageOutcome::succeeded("3"));
        assert_eq!(exit_status(&Ok(summary)), 1);
    }

    #[test]
    fn test_exit_status_setup_errors() {
        let missing = PipelineError::not_found("data", "input folder does not exist");
        assert_eq!(exit_status(&Err(missing)), 2);

        let config = PipelineError::from(ConfigError::Invalid("steps must be at least 1".into()));
        assert_eq!(config.kind(), ErrorKind::Config);
        assert_eq!(exit_status(&Err(config)), 2);

        let model = PipelineError::ModelLoad("connection refused".into());
        assert_eq!(model.kind(), ErrorKind::ModelLoad);
        assert_eq!(exit_status(&Err(model)), 2);
    }
}

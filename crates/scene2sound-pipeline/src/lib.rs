//! scene2sound-pipeline: image → sound sources → prompt → audio.
//!
//! Each image is processed on its own:
//!
//! ```text
//! ImageSource ─→ SourceExtractor ─→ <id>_sound_source.json
//!                                          │
//!                     PromptBuilder ←──────┘
//!                          │
//!                  AudioSynthesizer ─→ <id>.wav
//! ```
//!
//! [`PipelineDriver`] owns the batch loop, the stage-skip flags and the
//! partial-failure policy.

pub mod artifacts;
pub mod driver;
pub mod error;
pub mod extractor;
pub mod fewshot;
pub mod images;
pub mod parse;
pub mod prompt;
pub mod synth;
pub mod wav;

pub use driver::PipelineDriver;
pub use error::{PipelineError, Result};

//! scene2sound-media: vision-language and audio-generation model providers.

pub mod audio;
pub mod handles;
pub mod types;
pub mod vision;

pub use handles::ModelHandles;
pub use types::{AudioModel, AudioOutput, AudioRequest, ImageInput, VisionExample, VisionModel, VisionRequest};

//! Model request/response types and provider traits.

use async_trait::async_trait;

/// Encoded image handed to the vision model.
#[derive(Debug, Clone)]
pub struct ImageInput {
    /// Image data (raw file bytes).
    pub data: Vec<u8>,
    /// MIME type (e.g. "image/jpeg").
    pub mime_type: String,
}

impl ImageInput {
    /// `data:` URL carrying the image inline.
    pub fn data_url(&self) -> String {
        let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &self.data);
        format!("data:{};base64,{}", self.mime_type, encoded)
    }
}

/// One worked example shown to the model before the real image.
#[derive(Debug, Clone)]
pub struct VisionExample {
    pub image: ImageInput,
    /// The answer the model should have given for `image`.
    pub answer: String,
}

/// Vision-language generation request.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    /// System instruction describing the task and output format.
    pub instruction: String,
    /// Few-shot examples, in order.
    pub examples: Vec<VisionExample>,
    /// Image to describe.
    pub image: ImageInput,
    /// User text sent alongside each image.
    pub query: String,
}

/// Audio generation request.
#[derive(Debug, Clone)]
pub struct AudioRequest {
    pub prompt: String,
    pub duration_s: f32,
    pub steps: u32,
    pub guidance_scale: f32,
    pub seed: Option<u64>,
    /// Candidate waveforms to generate; the first returned is the best-ranked one.
    pub waveforms: u32,
}

/// Raw audio returned by the audio model.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioOutput {
    /// Interleaved f32 samples, nominally in [-1, 1].
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// A vision-language model: image + instruction in, text out.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Provider identifier.
    fn id(&self) -> &str;
    /// Probe the model once at load time.
    async fn check(&self) -> anyhow::Result<()> {
        Ok(())
    }
    /// Generate a text response for the request.
    async fn generate(&self, req: VisionRequest) -> anyhow::Result<String>;
}

/// An audio-generation model: prompt in, waveform out.
#[async_trait]
pub trait AudioModel: Send + Sync {
    /// Provider identifier.
    fn id(&self) -> &str;
    /// Probe the model once at load time.
    async fn check(&self) -> anyhow::Result<()> {
        Ok(())
    }
    /// Generate audio for the request.
    async fn generate(&self, req: AudioRequest) -> anyhow::Result<AudioOutput>;
}

//! Audio-generation providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use scene2sound_config::AudioSettings;

use crate::types::{AudioModel, AudioOutput, AudioRequest};

/// Text-to-audio diffusion model (AudioLDM family) behind a small HTTP service.
///
/// `POST {endpoint}/generate` takes [`GenerateBody`] and answers with
/// `{"sample_rate": 16000, "channels": 1, "audios": [[...], ...]}`.
pub struct HttpAudioModel {
    endpoint: String,
    model: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    audio_length_in_s: f32,
    num_inference_steps: u32,
    guidance_scale: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    num_waveforms_per_prompt: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    sample_rate: u32,
    #[serde(default = "default_channels")]
    channels: u16,
    audios: Vec<Vec<f32>>,
}

fn default_channels() -> u16 {
    1
}

impl HttpAudioModel {
    pub fn new(settings: &AudioSettings, access_token: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            access_token,
            client,
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

fn into_output(resp: GenerateResponse) -> anyhow::Result<AudioOutput> {
    let samples = resp
        .audios
        .into_iter()
        .next()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Audio service returned no waveform"))?;
    if resp.channels == 0 {
        return Err(anyhow::anyhow!("Audio service reported zero channels"));
    }
    Ok(AudioOutput {
        samples,
        sample_rate: resp.sample_rate,
        channels: resp.channels,
    })
}

#[async_trait]
impl AudioModel for HttpAudioModel {
    fn id(&self) -> &str {
        "http-audioldm"
    }

    async fn check(&self) -> anyhow::Result<()> {
        let resp = self
            .request(self.client.get(format!("{}/health", self.endpoint)))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow::anyhow!(
                "Audio service at {} answered {}",
                self.endpoint,
                resp.status()
            ));
        }
        Ok(())
    }

    async fn generate(&self, req: AudioRequest) -> anyhow::Result<AudioOutput> {
        let body = GenerateBody {
            model: &self.model,
            prompt: &req.prompt,
            audio_length_in_s: req.duration_s,
            num_inference_steps: req.steps,
            guidance_scale: req.guidance_scale,
            seed: req.seed,
            num_waveforms_per_prompt: req.waveforms,
        };

        let resp = self
            .request(self.client.post(format!("{}/generate", self.endpoint)))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Audio generation error ({status}): {text}"));
        }

        into_output(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_body_shape() {
        let body = GenerateBody {
            model: "cvssp/audioldm-s-full-v2",
            prompt: "a dog barking",
            audio_length_in_s: 4.0,
            num_inference_steps: 200,
            guidance_scale: 3.5,
            seed: None,
            num_waveforms_per_prompt: 1,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["prompt"], "a dog barking");
        assert_eq!(value["num_inference_steps"], 200);
        assert!(value.get("seed").is_none());
    }

    #[test]
    fn test_response_takes_first_waveform() {
        let resp: GenerateResponse = serde_json::from_str(
            r#"{"sample_rate": 16000, "audios": [[0.1, -0.1], [0.5, 0.5]]}"#,
        )
        .unwrap();
        let out = into_output(resp).unwrap();
        assert_eq!(out.samples, vec![0.1, -0.1]);
        assert_eq!(out.channels, 1);
        assert_eq!(out.sample_rate, 16000);
    }

    #[test]
    fn test_response_without_audio_is_error() {
        let resp: GenerateResponse =
            serde_json::from_str(r#"{"sample_rate": 16000, "audios": []}"#).unwrap();
        assert!(into_output(resp).is_err());
    }
}

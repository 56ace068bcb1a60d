//! Vision-language providers.

use async_trait::async_trait;
use serde_json::{Value, json};

use scene2sound_config::VisionSettings;

use crate::types::{VisionModel, VisionRequest};

/// Vision-language model served behind an OpenAI-compatible
/// `/chat/completions` endpoint (e.g. vLLM serving Qwen2-VL).
pub struct OpenAiCompatVision {
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatVision {
    pub fn new(settings: &VisionSettings, access_token: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            max_tokens: settings.max_new_tokens,
            temperature: settings.temperature,
            top_p: settings.top_p,
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

    fn body(&self, req: &VisionRequest) -> Value {
        let mut messages = vec![json!({
            "role": "system",
            "content": req.instruction,
        })];

        for example in &req.examples {
            messages.push(user_turn(&example.image.data_url(), &req.query));
            messages.push(json!({
                "role": "assistant",
                "content": example.answer,
            }));
        }
        messages.push(user_turn(&req.image.data_url(), &req.query));

        json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "top_p": self.top_p,
        })
    }
}

fn user_turn(image_url: &str, text: &str) -> Value {
    json!({
        "role": "user",
        "content": [
            {
                "type": "image_url",
                "image_url": { "url": image_url }
            },
            {
                "type": "text",
                "text": text
            }
        ]
    })
}

#[async_trait]
impl VisionModel for OpenAiCompatVision {
    fn id(&self) -> &str {
        "openai-compat-vision"
    }

    async fn check(&self) -> anyhow::Result<()> {
        let resp = self
            .request(self.client.get(format!("{}/models", self.endpoint)))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow::anyhow!(
                "Vision service at {} answered {}",
                self.endpoint,
                resp.status()
            ));
        }
        Ok(())
    }

    async fn generate(&self, req: VisionRequest) -> anyhow::Result<String> {
        let body = self.body(&req);

        let resp = self
            .request(self.client.post(format!("{}/chat/completions", self.endpoint)))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let json: Value = resp.json().await?;

        if !status.is_success() {
            let msg = json
                .get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown error");
            return Err(anyhow::anyhow!("Vision API error ({status}): {msg}"));
        }

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow::anyhow!("Vision API response has no message content"))?
            .to_string();

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageInput, VisionExample};

    fn image(bytes: &[u8]) -> ImageInput {
        ImageInput {
            data: bytes.to_vec(),
            mime_type: "image/jpeg".into(),
        }
    }

    #[test]
    fn test_body_orders_examples_before_image() {
        let provider = OpenAiCompatVision::new(&VisionSettings::default(), None).unwrap();
        let req = VisionRequest {
            instruction: "describe sounds".into(),
            examples: vec![VisionExample {
                image: image(b"ex"),
                answer: r#"{"sources":[]}"#.into(),
            }],
            image: image(b"target"),
            query: "Output only the JSON object.".into(),
        };
        let body = provider.body(&req);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[2]["content"], r#"{"sources":[]}"#);
        assert_eq!(
            messages[3]["content"][0]["image_url"]["url"],
            image(b"target").data_url()
        );
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["model"], "Qwen/Qwen2-VL-7B-Instruct");
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let settings = VisionSettings {
            endpoint: "http://localhost:9000/v1/".into(),
            ..Default::default()
        };
        let provider = OpenAiCompatVision::new(&settings, Some("tok".into())).unwrap();
        assert_eq!(provider.endpoint, "http://localhost:9000/v1");
    }
}

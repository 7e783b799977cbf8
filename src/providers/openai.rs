//! OpenAI client for transcription (`audio/transcriptions`) and
//! summarization (`chat/completions`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use super::{audio_mime_type, Summarizer, Transcriber};

/// OpenAI HTTP client
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    transcription_model: String,
    chat_model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: String,
        base_url: String,
        transcription_model: String,
        chat_model: String,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build OpenAI HTTP client")?;

        Ok(Self {
            api_key,
            base_url,
            transcription_model,
            chat_model,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn checked(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        anyhow::bail!("OpenAI {} returned {}: {}", what, status, text)
    }
}

#[async_trait]
impl Transcriber for OpenAiClient {
    fn name(&self) -> &str {
        "openai-whisper"
    }

    async fn transcribe(&self, file_name: &str, audio: Vec<u8>) -> Result<String> {
        let file_part = Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(audio_mime_type(file_name))?;

        let form = Form::new()
            .text("model", self.transcription_model.clone())
            .part("file", file_part);

        let response = self
            .client
            .post(self.endpoint("audio/transcriptions"))
            .bearer_auth(self.api_key.trim())
            .multipart(form)
            .send()
            .await
            .context("Failed to call OpenAI transcription")?;

        let parsed: TranscriptionResponse = Self::checked(response, "transcription")
            .await?
            .json()
            .await
            .context("Failed to parse OpenAI transcription response")?;

        Ok(parsed.text.trim().to_string())
    }
}

#[async_trait]
impl Summarizer for OpenAiClient {
    fn name(&self) -> &str {
        "openai-chat"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.chat_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(self.api_key.trim())
            .json(&body)
            .send()
            .await
            .context("Failed to call OpenAI chat completions")?;

        let parsed: ChatResponse = Self::checked(response, "chat completions")
            .await?
            .json()
            .await
            .context("Failed to parse OpenAI chat response")?;

        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .context("OpenAI chat response had no content")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiClient {
        OpenAiClient::new(
            "sk-test".to_string(),
            "https://api.openai.com/v1/".to_string(),
            "whisper-1".to_string(),
            "gpt-3.5-turbo".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint() {
        assert_eq!(
            client().endpoint("chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_chat_request_shape() {
        let body = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: vec![ChatMessage {
                role: "user",
                content: "hello",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hello");
    }

    #[test]
    fn test_chat_response_parsing() {
        let json = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"A calm day."}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("A calm day."));
    }
}

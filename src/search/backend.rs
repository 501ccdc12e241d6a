//! HTTP client for an Ollama-compatible embedding/generation service

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use super::embedding::{check_embedding, EmbeddingBackend, GenerationBackend};
use crate::core::config::BackendConfig;
use crate::error::{BrainError, Result};

pub struct OllamaBackend {
    client: Client,
    base_url: String,
    embed_model: String,
    generate_model: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Option<Vec<f32>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

impl OllamaBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| BrainError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            embed_model: config.embed_model.clone(),
            generate_model: config.generate_model.clone(),
        })
    }

    fn post<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "Backend request");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| BrainError::BackendUnavailable(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(classify_status(status, &detail));
        }

        response
            .json::<T>()
            .map_err(|e| BrainError::BackendModel(format!("undecodable response from {url}: {e}")))
    }
}

impl EmbeddingBackend for OllamaBackend {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response: EmbedResponse = self.post(
            "/api/embeddings",
            json!({ "model": self.embed_model, "prompt": text }),
        )?;

        match response.embedding {
            Some(vector) => check_embedding(vector),
            None => Err(BrainError::BackendModel("response has no 'embedding' field".into())),
        }
    }
}

impl GenerationBackend for OllamaBackend {
    fn generate(&self, prompt: &str) -> Result<String> {
        let response: GenerateResponse = self.post(
            "/api/generate",
            json!({ "model": self.generate_model, "prompt": prompt, "stream": false }),
        )?;

        response
            .response
            .ok_or_else(|| BrainError::BackendModel("response has no 'response' field".into()))
    }
}

/// 5xx and gateway-ish statuses mean the service is down; anything else is
/// a configuration problem (unknown model, bad request).
fn classify_status(status: StatusCode, detail: &str) -> BrainError {
    let message = format!("HTTP {status}: {}", detail.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        BrainError::BackendUnavailable(message)
    } else {
        BrainError::BackendModel(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            BrainError::BackendUnavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "model 'x' not found"),
            BrainError::BackendModel(_)
        ));
    }

    #[test]
    fn test_unreachable_backend_is_unavailable() -> Result<()> {
        let backend = OllamaBackend::new(&BackendConfig {
            url: "http://127.0.0.1:9/".to_string(),
            timeout_secs: 1,
            ..BackendConfig::default()
        })?;

        assert!(matches!(backend.embed("hello"), Err(BrainError::BackendUnavailable(_))));
        assert!(matches!(backend.generate("hi"), Err(BrainError::BackendUnavailable(_))));
        Ok(())
    }

    #[test]
    fn test_response_shapes() {
        let ok: EmbedResponse = serde_json::from_str(r#"{"embedding":[0.1,0.2]}"#).unwrap();
        assert_eq!(ok.embedding, Some(vec![0.1, 0.2]));

        let missing: EmbedResponse = serde_json::from_str(r#"{"embeddings":[[0.1]]}"#).unwrap();
        assert!(missing.embedding.is_none());
    }
}

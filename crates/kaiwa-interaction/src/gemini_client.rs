//! GeminiClient - REST client for the Gemini generation service.
//!
//! Requests are authenticated with one credential from an ordered pool.
//! When the service rejects a credential (401/403, `UNAUTHENTICATED`,
//! `PERMISSION_DENIED`) the same request is repeated with the next one.
//! The position in the pool is sticky across calls and never wraps around.

use async_trait::async_trait;
use kaiwa_core::config::{DEFAULT_API_ROOT, GenerationConfig};
use kaiwa_core::generation::{EncodedImage, ModelCatalog, ModelInfo, TextGenerator};
use kaiwa_core::{KaiwaError, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const AUTH_STATUSES: [&str; 2] = ["UNAUTHENTICATED", "PERMISSION_DENIED"];

/// Client for `generateContent` and the model listing endpoint.
pub struct GeminiClient {
    client: Client,
    credentials: Vec<String>,
    /// Index of the credential the next request starts with.
    current: AtomicUsize,
    api_root: String,
    /// Short model name; switchable at runtime through `ModelCatalog`.
    model: RwLock<String>,
    timeout: Option<Duration>,
    system_instruction: Option<String>,
}

impl GeminiClient {
    /// Creates a client for `model` with an ordered credential pool.
    ///
    /// # Errors
    ///
    /// Returns `KaiwaError::Config` if the pool is empty.
    pub fn new(credentials: Vec<String>, model: impl Into<String>) -> Result<Self> {
        if credentials.is_empty() {
            return Err(KaiwaError::config("the credential pool is empty"));
        }
        Ok(Self {
            client: Client::new(),
            credentials,
            current: AtomicUsize::new(0),
            api_root: DEFAULT_API_ROOT.to_string(),
            model: RwLock::new(model.into()),
            timeout: None,
            system_instruction: None,
        })
    }

    /// Builds a client from the `[generation]` section of `config.toml`.
    pub fn from_config(credentials: Vec<String>, config: &GenerationConfig) -> Result<Self> {
        let mut client = Self::new(credentials, config.model.clone())?.with_api_root(&config.api_root);
        client.timeout = config.timeout();
        client.system_instruction = config.system_instruction.clone();
        Ok(client)
    }

    /// Overrides the service root, e.g. to point at a mock server.
    pub fn with_api_root(mut self, api_root: impl Into<String>) -> Self {
        self.api_root = api_root.into().trim_end_matches('/').to_string();
        self
    }

    /// Per-request timeout. Without one the transport default applies.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Adds a system instruction that will be sent alongside every request.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn model(&self) -> String {
        self.model
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }

    pub fn current_credential_index(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Runs `attempt` with the current credential, moving through the pool
    /// while the service keeps rejecting credentials.
    async fn with_rotation<T, F, Fut>(&self, operation: &'static str, attempt: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let last = self.credentials.len() - 1;
        let mut index = self.current.load(Ordering::SeqCst).min(last);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match attempt(self.credentials[index].clone()).await {
                Err(err) if is_authorization_error(&err) => {
                    tracing::warn!(
                        operation,
                        credential_index = index,
                        "credential rejected by the generation service"
                    );
                    if index == last {
                        return Err(KaiwaError::AuthExhausted { attempts });
                    }
                    index += 1;
                    self.current.fetch_max(index, Ordering::SeqCst);
                }
                outcome => {
                    if outcome.is_ok() {
                        tracing::debug!(operation, credential_index = index, attempts, "request succeeded");
                    }
                    return outcome;
                }
            }
        }
    }

    fn apply_timeout(&self, request: RequestBuilder) -> RequestBuilder {
        match self.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    async fn generate(&self, parts: Vec<Part>) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            system_instruction: self.system_instruction.as_ref().map(|text| Content {
                role: None,
                parts: vec![Part::Text { text: text.clone() }],
            }),
        };
        let url = format!("{}/models/{}:generateContent", self.api_root, self.model());

        self.with_rotation("generateContent", |key| {
            let builder = self.client.post(&url).query(&[("key", key)]).json(&request);
            let builder = self.apply_timeout(builder);
            async move {
                let body = send(builder).await?;
                let parsed: GenerateContentResponse = serde_json::from_str(&body)
                    .map_err(|e| KaiwaError::MalformedResponse(e.to_string()))?;
                if let Some(error) = parsed.error {
                    return Err(error.into_error(None));
                }
                extract_text_response(parsed.candidates)
            }
        })
        .await
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        self.generate(vec![Part::Text {
            text: prompt.to_string(),
        }])
        .await
    }

    async fn generate_text_with_image(&self, prompt: &str, image: &EncodedImage) -> Result<String> {
        let mut parts = Vec::with_capacity(2);
        if !prompt.trim().is_empty() {
            parts.push(Part::Text {
                text: prompt.to_string(),
            });
        }
        parts.push(Part::InlineData {
            inline_data: InlineDataPayload {
                mime_type: image.mime_type.clone(),
                data: image.data.clone(),
            },
        });
        self.generate(parts).await
    }
}

#[async_trait]
impl ModelCatalog for GeminiClient {
    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/models", self.api_root);
        self.with_rotation("listModels", |key| {
            let builder = self.apply_timeout(self.client.get(&url).query(&[("key", key)]));
            async move {
                let body = send(builder).await?;
                let parsed: ListModelsResponse = serde_json::from_str(&body)
                    .map_err(|e| KaiwaError::MalformedResponse(e.to_string()))?;
                Ok(parsed.models)
            }
        })
        .await
    }

    fn current_model(&self) -> String {
        self.model()
    }

    fn select_model(&self, model: &str) {
        let model = model.strip_prefix("models/").unwrap_or(model);
        tracing::info!(model, "switching generation model");
        *self
            .model
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = model.to_string();
    }
}

/// Sends the request and returns the body of a 2xx response.
async fn send(builder: RequestBuilder) -> Result<String> {
    let response = builder.send().await.map_err(transport_error)?;
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(map_http_error(status, &body))
    }
}

fn transport_error(err: reqwest::Error) -> KaiwaError {
    // The URL carries the credential as a query parameter.
    let err = err.without_url();
    if err.is_timeout() {
        KaiwaError::transport(format!("request timed out: {err}"))
    } else {
        KaiwaError::transport(err.to_string())
    }
}

fn is_authorization_error(err: &KaiwaError) -> bool {
    match err {
        KaiwaError::Service { code, status, .. } => {
            matches!(*code, 401 | 403)
                || status
                    .as_deref()
                    .is_some_and(|status| AUTH_STATUSES.contains(&status))
        }
        _ => false,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineDataPayload,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataPayload {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<i32>,
    message: Option<String>,
    status: Option<String>,
}

impl ErrorBody {
    fn into_error(self, http_status: Option<StatusCode>) -> KaiwaError {
        let code = self
            .code
            .or_else(|| http_status.map(|status| i32::from(status.as_u16())))
            .unwrap_or_default();
        KaiwaError::Service {
            code,
            status: self.status,
            message: self.message.unwrap_or_else(|| "no error message".to_string()),
        }
    }
}

/// Concatenates the text parts of the first candidate that has any.
fn extract_text_response(candidates: Vec<Candidate>) -> Result<String> {
    candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .find(|text| !text.is_empty())
        .ok_or(KaiwaError::EmptyResponse)
}

fn map_http_error(status: StatusCode, body: &str) -> KaiwaError {
    match serde_json::from_str::<ErrorWrapper>(body) {
        Ok(wrapper) => wrapper.error.into_error(Some(status)),
        Err(_) => KaiwaError::Service {
            code: i32::from(status.as_u16()),
            status: None,
            message: status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    const GENERATE_PATH: &str = "/models/gemini-2.5-flash:generateContent";

    fn client(server: &MockServer, keys: &[&str]) -> GeminiClient {
        GeminiClient::new(keys.iter().map(|k| k.to_string()).collect(), "gemini-2.5-flash")
            .unwrap()
            .with_api_root(server.base_url())
    }

    fn reply(text: &str) -> serde_json::Value {
        json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
    }

    fn unauthorized() -> serde_json::Value {
        json!({"error": {"code": 401, "message": "API key not valid", "status": "UNAUTHENTICATED"}})
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        let err = GeminiClient::new(Vec::new(), "m").err().unwrap();
        assert!(matches!(err, KaiwaError::Config(_)));
    }

    #[tokio::test]
    async fn test_rotates_until_a_credential_is_accepted() {
        let server = MockServer::start_async().await;
        let a = server
            .mock_async(|when, then| {
                when.method(POST).path(GENERATE_PATH).query_param("key", "A");
                then.status(401).json_body(unauthorized());
            })
            .await;
        let b = server
            .mock_async(|when, then| {
                when.method(POST).path(GENERATE_PATH).query_param("key", "B");
                then.status(403)
                    .json_body(json!({"error": {"code": 403, "message": "denied", "status": "PERMISSION_DENIED"}}));
            })
            .await;
        let c = server
            .mock_async(|when, then| {
                when.method(POST).path(GENERATE_PATH).query_param("key", "C");
                then.status(200).json_body(reply("Ciao"));
            })
            .await;

        let client = client(&server, &["A", "B", "C"]);
        let text = client.generate_text("hello").await.unwrap();

        assert_eq!(text, "Ciao");
        a.assert_hits_async(1).await;
        b.assert_hits_async(1).await;
        c.assert_hits_async(1).await;
        assert_eq!(client.current_credential_index(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_pool_after_one_attempt_each() {
        let server = MockServer::start_async().await;
        let rejected = server
            .mock_async(|when, then| {
                when.method(POST).path(GENERATE_PATH);
                then.status(401).json_body(unauthorized());
            })
            .await;

        let client = client(&server, &["A", "B"]);
        let err = client.generate_text("hello").await.unwrap_err();

        assert_eq!(err, KaiwaError::AuthExhausted { attempts: 2 });
        rejected.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_service_error_is_not_retried() {
        let server = MockServer::start_async().await;
        let failing = server
            .mock_async(|when, then| {
                when.method(POST).path(GENERATE_PATH);
                then.status(500)
                    .json_body(json!({"error": {"code": 500, "message": "backend down", "status": "INTERNAL"}}));
            })
            .await;

        let client = client(&server, &["A", "B", "C"]);
        let err = client.generate_text("hello").await.unwrap_err();

        assert!(matches!(err, KaiwaError::Service { code: 500, .. }));
        failing.assert_hits_async(1).await;
        assert_eq!(client.current_credential_index(), 0);
    }

    #[tokio::test]
    async fn test_error_body_on_success_status_follows_its_code() {
        let server = MockServer::start_async().await;
        let rejected = server
            .mock_async(|when, then| {
                when.method(POST).path(GENERATE_PATH).query_param("key", "A");
                then.status(200).json_body(unauthorized());
            })
            .await;
        let failing = server
            .mock_async(|when, then| {
                when.method(POST).path(GENERATE_PATH).query_param("key", "B");
                then.status(200)
                    .json_body(json!({"error": {"code": 429, "message": "slow down"}}));
            })
            .await;

        let client = client(&server, &["A", "B", "C"]);
        let err = client.generate_text("hello").await.unwrap_err();

        assert!(matches!(err, KaiwaError::Service { code: 429, .. }));
        rejected.assert_hits_async(1).await;
        failing.assert_hits_async(1).await;
        assert_eq!(client.current_credential_index(), 1);
    }

    #[tokio::test]
    async fn test_rotation_is_sticky_across_calls() {
        let server = MockServer::start_async().await;
        let a = server
            .mock_async(|when, then| {
                when.method(POST).path(GENERATE_PATH).query_param("key", "A");
                then.status(401).json_body(unauthorized());
            })
            .await;
        let b = server
            .mock_async(|when, then| {
                when.method(POST).path(GENERATE_PATH).query_param("key", "B");
                then.status(200).json_body(reply("ok"));
            })
            .await;

        let client = client(&server, &["A", "B"]);
        client.generate_text("first").await.unwrap();
        client.generate_text("second").await.unwrap();

        a.assert_hits_async(1).await;
        b.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_empty_candidates_is_empty_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(GENERATE_PATH);
                then.status(200).json_body(json!({"candidates": []}));
            })
            .await;

        let err = client(&server, &["A"]).generate_text("hello").await.unwrap_err();
        assert_eq!(err, KaiwaError::EmptyResponse);
    }

    #[tokio::test]
    async fn test_text_parts_are_concatenated() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(GENERATE_PATH);
                then.status(200).json_body(json!({"candidates": [
                    {"content": {"parts": []}},
                    {"content": {"parts": [{"text": "Rome, "}, {"text": "then Florence."}]}}
                ]}));
            })
            .await;

        let text = client(&server, &["A"]).generate_text("hello").await.unwrap();
        assert_eq!(text, "Rome, then Florence.");
    }

    #[tokio::test]
    async fn test_malformed_body_is_terminal() {
        let server = MockServer::start_async().await;
        let garbage = server
            .mock_async(|when, then| {
                when.method(POST).path(GENERATE_PATH);
                then.status(200).body("<html>gateway</html>");
            })
            .await;

        let err = client(&server, &["A", "B"]).generate_text("hello").await.unwrap_err();
        assert!(matches!(err, KaiwaError::MalformedResponse(_)));
        garbage.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_image_is_sent_as_inline_data() {
        let server = MockServer::start_async().await;
        let inline = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(GENERATE_PATH)
                    .body_contains(r#"{"text":"What is this?"}"#)
                    .body_contains(r#""inlineData":{"mimeType":"image/png","data":"iVBORw=="}"#);
                then.status(200).json_body(reply("A cat"));
            })
            .await;

        let image = EncodedImage {
            mime_type: "image/png".into(),
            data: "iVBORw==".into(),
        };
        let text = client(&server, &["A"])
            .generate_text_with_image("What is this?", &image)
            .await
            .unwrap();

        assert_eq!(text, "A cat");
        inline.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_list_models_uses_rotation() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/models").query_param("key", "A");
                then.status(401).json_body(unauthorized());
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/models").query_param("key", "B");
                then.status(200).json_body(json!({"models": [
                    {"name": "models/gemini-2.5-flash", "supportedGenerationMethods": ["generateContent"]},
                    {"name": "models/text-embedding-004", "supportedGenerationMethods": ["embedContent"]}
                ]}));
            })
            .await;

        let models = client(&server, &["A", "B"]).list_models().await.unwrap();
        let usable: Vec<&str> = models
            .iter()
            .filter(|m| m.supports_generation())
            .map(ModelInfo::short_name)
            .collect();
        assert_eq!(usable, vec!["gemini-2.5-flash"]);
    }

    #[tokio::test]
    async fn test_selected_model_is_used_for_later_requests() {
        let server = MockServer::start_async().await;
        let pro = server
            .mock_async(|when, then| {
                when.method(POST).path("/models/gemini-2.5-pro:generateContent");
                then.status(200).json_body(reply("from pro"));
            })
            .await;

        let client = client(&server, &["A"]);
        client.select_model("models/gemini-2.5-pro");

        assert_eq!(client.current_model(), "gemini-2.5-pro");
        assert_eq!(client.generate_text("hi").await.unwrap(), "from pro");
        pro.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_connection_failure_is_transport_error() {
        let client = GeminiClient::new(vec!["A".into(), "B".into()], "gemini-2.5-flash")
            .unwrap()
            .with_api_root("http://127.0.0.1:9");
        let err = client.generate_text("hello").await.unwrap_err();
        assert!(matches!(err, KaiwaError::Transport(_)));
        assert_eq!(client.current_credential_index(), 0);
    }

    #[test]
    fn test_auth_detection() {
        let by_status = KaiwaError::Service {
            code: 400,
            status: Some("PERMISSION_DENIED".into()),
            message: String::new(),
        };
        let plain = KaiwaError::Service {
            code: 429,
            status: Some("RESOURCE_EXHAUSTED".into()),
            message: String::new(),
        };
        assert!(is_authorization_error(&by_status));
        assert!(!is_authorization_error(&plain));
        assert!(is_authorization_error(&map_http_error(StatusCode::UNAUTHORIZED, "nope")));
    }
}

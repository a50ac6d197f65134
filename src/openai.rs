use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::{ApiConfig, PromptRequest};
use crate::error::ClientError;

/// Raw transport chunks of a completion stream.
pub type ChunkStream = BoxStream<'static, Result<Bytes, ClientError>>;

/// Something that can open a streamed completion.
///
/// Dropping the returned stream releases the underlying connection.
#[async_trait]
pub trait CompletionSource: Send + Sync {
    async fn open(&self, request: &PromptRequest) -> Result<ChunkStream, ClientError>;
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    prompt: &'a str,
    max_tokens: u32,
    temperature: f64,
    stop: &'a str,
    stream: bool,
    logprobs: u32,
}

impl<'a> From<&'a PromptRequest> for CompletionBody<'a> {
    fn from(req: &'a PromptRequest) -> Self {
        Self {
            prompt: &req.prompt,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            stop: &req.stop,
            stream: true,
            logprobs: 1,
        }
    }
}

/// [`CompletionSource`] backed by the OpenAI engines completions endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiCompletions {
    http: reqwest::Client,
    api: ApiConfig,
}

impl OpenAiCompletions {
    pub fn new(api: ApiConfig) -> Result<Self, ClientError> {
        if api.api_key.trim().is_empty() {
            return Err(ClientError::Configuration(
                "the OPENAI_API_SECRET_KEY environment variable has not been set".into(),
            ));
        }
        // No overall timeout: a generation may stream for as long as it takes.
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, api })
    }

    pub fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/engines/{}/completions",
            self.api.base_url.trim_end_matches('/'),
            model
        )
    }
}

#[async_trait]
impl CompletionSource for OpenAiCompletions {
    async fn open(&self, request: &PromptRequest) -> Result<ChunkStream, ClientError> {
        let url = self.endpoint(&request.model);
        let body = CompletionBody::from(request);
        debug!(
            %url,
            model = %request.model,
            max_tokens = request.max_tokens,
            "opening completion stream"
        );
        trace!(prompt = %request.prompt, "completion prompt");
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.api.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }
        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(ClientError::from))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn api(base_url: String) -> ApiConfig {
        ApiConfig {
            base_url,
            api_key: "sk-test".into(),
        }
    }

    #[test]
    fn missing_key_is_configuration_error() {
        let err = OpenAiCompletions::new(ApiConfig {
            base_url: "http://localhost".into(),
            api_key: " ".into(),
        })
        .unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }

    #[test]
    fn builds_engine_endpoint() {
        let client = OpenAiCompletions::new(api("https://api.openai.com/v1/".into())).unwrap();
        assert_eq!(
            client.endpoint("davinci"),
            "https://api.openai.com/v1/engines/davinci/completions"
        );
    }

    #[tokio::test]
    async fn posts_streaming_request_with_logprobs() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/engines/davinci/completions")
                    .header("Authorization", "Bearer sk-test")
                    .json_body(json!({
                        "prompt": "Hello",
                        "max_tokens": 32,
                        "temperature": 0.7,
                        "stop": "",
                        "stream": true,
                        "logprobs": 1
                    }));
                then.status(200).body("data: [DONE]\n\n");
            })
            .await;

        let client = OpenAiCompletions::new(api(server.base_url())).unwrap();
        let mut stream = client.open(&PromptRequest::new("Hello")).await.unwrap();
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(body, b"data: [DONE]\n\n");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/engines/davinci/completions");
                then.status(401).body("bad key");
            })
            .await;
        let client = OpenAiCompletions::new(api(server.base_url())).unwrap();
        let err = client.open(&PromptRequest::new("Hello")).await.err().unwrap();
        match err {
            ClientError::Status { status, body } => {
                assert_eq!(status.as_u16(), 401);
                assert_eq!(body, "bad key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

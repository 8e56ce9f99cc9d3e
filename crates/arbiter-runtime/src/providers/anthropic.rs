//! Anthropic judge provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use super::{ApiCredential, JudgeError, JudgeProvider, JudgeResponse};

/// Environment variable for the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Anthropic messages-API judge.
#[derive(Debug)]
pub struct AnthropicJudge {
    credential: ApiCredential,
    base_url: String,
    client: OnceLock<reqwest::Client>,
}

impl AnthropicJudge {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: ApiCredential::new(api_key, "Anthropic API key"),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: OnceLock::new(),
        }
    }

    /// Create from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, JudgeError> {
        let credential = ApiCredential::from_env(ANTHROPIC_API_KEY_ENV, "Anthropic API key")?;
        Ok(Self {
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: OnceLock::new(),
        })
    }

    /// Override the API endpoint (testing, proxies).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn client(&self) -> &reqwest::Client {
        self.client.get_or_init(|| {
            reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("HTTP client builds")
        })
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl JudgeProvider for AnthropicJudge {
    async fn call(
        &self,
        prompt: &str,
        system: Option<&str>,
        model: &str,
        max_tokens: u32,
    ) -> Result<JudgeResponse, JudgeError> {
        let request = MessagesRequest {
            model,
            max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let started = Instant::now();

        // Credential is only exposed here, at the point of use.
        let response = self
            .client()
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    JudgeError::Timeout(REQUEST_TIMEOUT)
                } else {
                    JudgeError::Http(e.to_string())
                }
            })?;

        let status = response.status();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(JudgeError::Auth);
        }

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(JudgeError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let message = response
                .json::<ApiErrorBody>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|e| format!("unparsable error body: {e}"));
            return Err(JudgeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| JudgeError::Parse(e.to_string()))?;

        let text = body
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(JudgeResponse {
            text,
            resolved_model: body.model,
            input_tokens: body.usage.input_tokens,
            output_tokens: body.usage.output_tokens,
            latency_seconds: started.elapsed().as_secs_f64(),
        })
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_name() {
        let judge = AnthropicJudge::new("test-key");
        assert_eq!(judge.name(), "anthropic");
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret = "sk-ant-REDACTED";
        let judge = AnthropicJudge::new(secret);
        let debug = format!("{judge:?}");
        assert!(!debug.contains(secret));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_custom_base_url() {
        let judge = AnthropicJudge::new("key").with_base_url("http://localhost:8080/v1");
        assert_eq!(judge.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_request_serialisation() {
        let request = MessagesRequest {
            model: "judge-model",
            max_tokens: 500,
            system: None,
            messages: vec![Message {
                role: "user",
                content: "hello",
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "judge-model");
        assert!(json.get("system").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }
}

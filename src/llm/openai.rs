//! OpenAI-compatible completion backend.

use crate::config::{ApiStyle, ModelConfig};
use crate::conversation::{Role, Turn};
use crate::error::{LlmError, Result};
use crate::llm::backend::{CompletionParams, ModelBackend};

use anyhow::Context as _;
use async_trait::async_trait;

/// Talks to `/v1/chat/completions` or the legacy `/v1/completions` endpoint.
pub struct OpenAiBackend {
    http_client: reqwest::Client,
    api_style: ApiStyle,
    model_name: String,
    api_key: String,
    base_url: String,
}

impl OpenAiBackend {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| LlmError::MissingProviderKey("openai".into()))?;

        // The engine enforces the per-call timeout; this only guards against
        // sockets that never close.
        let http_client = reqwest::Client::builder()
            .timeout(config.call_timeout * 2)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http_client,
            api_style: config.api_style,
            model_name: config.model_name.clone(),
            api_key,
            base_url: config.base_url.clone(),
        })
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.api_style {
            ApiStyle::Chat => format!("{base}/v1/chat/completions"),
            ApiStyle::Completions => format!("{base}/v1/completions"),
        }
    }

    fn request_body(&self, messages: &[Turn], params: &CompletionParams) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model_name,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
            "top_p": params.top_p,
            "frequency_penalty": params.frequency_penalty,
            "presence_penalty": params.presence_penalty,
        });

        match self.api_style {
            ApiStyle::Chat => {
                body["messages"] = serde_json::json!(convert_messages_to_openai(messages));
            }
            ApiStyle::Completions => {
                body["prompt"] = serde_json::json!(render_transcript(messages));
            }
        }

        body
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        messages: &[Turn],
        params: &CompletionParams,
    ) -> std::result::Result<Option<String>, LlmError> {
        let body = self.request_body(messages, params);

        let response = self
            .http_client
            .post(self.endpoint())
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|error| LlmError::ProviderRequest(error.to_string()))?;

        let status = response.status();
        let response_text = response.text().await.map_err(|error| {
            LlmError::ProviderRequest(format!("failed to read response body: {error}"))
        })?;

        let response_body: serde_json::Value =
            serde_json::from_str(&response_text).map_err(|error| {
                LlmError::CompletionFailed(format!(
                    "OpenAI response ({status}) is not valid JSON: {error}\nBody: {}",
                    truncate_body(&response_text)
                ))
            })?;

        if !status.is_success() {
            let message = response_body["error"]["message"]
                .as_str()
                .unwrap_or("unknown error");
            return Err(LlmError::ProviderRequest(format!(
                "OpenAI API error ({status}): {message}"
            )));
        }

        let reply = parse_openai_response(&response_body, self.api_style)?;
        if let Some(text) = &reply {
            tracing::debug!(
                model = %self.model_name,
                chars = text.chars().count(),
                usage = %response_body["usage"],
                "model replied"
            );
        }
        Ok(reply)
    }
}

fn convert_messages_to_openai(messages: &[Turn]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|turn| {
            serde_json::json!({
                "role": turn.role().as_str(),
                "content": turn.content(),
            })
        })
        .collect()
}

/// Flatten a message list into the `User:`/`Assistant:` transcript used by
/// the legacy completions endpoint. Ends with an open `Assistant:` line.
pub fn render_transcript(messages: &[Turn]) -> String {
    let mut prompt = String::new();
    for turn in messages {
        match turn.role() {
            Role::System => prompt.push_str(turn.content()),
            Role::User => {
                prompt.push_str("\nUser: ");
                prompt.push_str(turn.content());
            }
            Role::Assistant => {
                prompt.push_str("\nAssistant: ");
                prompt.push_str(turn.content());
            }
        }
    }
    prompt.push_str("\nAssistant:");
    prompt
}

/// Extract the first choice's text. An empty `choices` array or blank text
/// is an empty reply; a body without `choices` at all is malformed.
fn parse_openai_response(
    body: &serde_json::Value,
    api_style: ApiStyle,
) -> std::result::Result<Option<String>, LlmError> {
    let choices = body["choices"].as_array().ok_or_else(|| {
        LlmError::CompletionFailed("no choices returned from OpenAI".into())
    })?;

    let Some(choice) = choices.first() else {
        return Ok(None);
    };

    let text = match api_style {
        ApiStyle::Chat => choice["message"]["content"].as_str(),
        ApiStyle::Completions => choice["text"].as_str(),
    };

    Ok(text
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string))
}

/// Truncate a response body for error messages to avoid dumping megabytes of HTML.
fn truncate_body(body: &str) -> &str {
    const LIMIT: usize = 500;
    match body.char_indices().nth(LIMIT) {
        Some((byte_index, _)) => &body[..byte_index],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    fn backend(api_style: ApiStyle, base_url: &str) -> OpenAiBackend {
        let mut config = BotConfig::default().model;
        config.api_style = api_style;
        config.api_key = Some("sk-test".into());
        config.base_url = base_url.into();
        OpenAiBackend::new(&config).expect("backend builds")
    }

    fn sample_messages() -> Vec<Turn> {
        vec![
            Turn::system("be a pirate"),
            Turn::user("hi"),
            Turn::assistant("ahoy"),
            Turn::user("how are you"),
        ]
    }

    /// Serve exactly one HTTP request and return its raw text.
    async fn serve_once(listener: TcpListener, status: &'static str, body: String) -> String {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = Vec::new();
        let mut buffer = [0u8; 4096];

        loop {
            let read = socket.read(&mut buffer).await.expect("read request");
            if read == 0 {
                break;
            }
            request.extend_from_slice(&buffer[..read]);

            let text = String::from_utf8_lossy(&request);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if request.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }

        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket
            .write_all(response.as_bytes())
            .await
            .expect("write response");
        String::from_utf8_lossy(&request).into_owned()
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let config = BotConfig::default().model;
        let error = OpenAiBackend::new(&config)
            .err()
            .expect("backend without key must fail");
        assert!(error.to_string().contains("missing API key"));
    }

    #[test]
    fn chat_body_passes_parameters_through() {
        let backend = backend(ApiStyle::Chat, "https://api.openai.com/");
        let params = BotConfig::default().model.params;

        let body = backend.request_body(&sample_messages(), &params);

        assert_eq!(backend.endpoint(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][3]["content"], "how are you");
        assert!((body["frequency_penalty"].as_f64().unwrap_or_default() - 0.5).abs() < 1e-6);
        assert!((body["presence_penalty"].as_f64().unwrap_or_default() - 0.6).abs() < 1e-6);
        assert!(body.get("prompt").is_none());
    }

    #[test]
    fn completions_body_uses_flattened_prompt() {
        let backend = backend(ApiStyle::Completions, "https://api.openai.com");
        let params = BotConfig::default().model.params;

        let body = backend.request_body(&sample_messages(), &params);

        assert_eq!(backend.endpoint(), "https://api.openai.com/v1/completions");
        assert_eq!(
            body["prompt"],
            "be a pirate\nUser: hi\nAssistant: ahoy\nUser: how are you\nAssistant:"
        );
        assert!(body.get("messages").is_none());
    }

    #[test]
    fn parses_chat_and_completion_choices() {
        let chat = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Ahoy!  " } }]
        });
        assert_eq!(
            parse_openai_response(&chat, ApiStyle::Chat).expect("parses"),
            Some("Ahoy!".to_string())
        );

        let completion = serde_json::json!({ "choices": [{ "text": " Arr." }] });
        assert_eq!(
            parse_openai_response(&completion, ApiStyle::Completions).expect("parses"),
            Some("Arr.".to_string())
        );
    }

    #[test]
    fn empty_choices_are_an_empty_reply() {
        let empty = serde_json::json!({ "choices": [] });
        assert_eq!(parse_openai_response(&empty, ApiStyle::Chat).expect("parses"), None);

        let blank = serde_json::json!({ "choices": [{ "message": { "content": "   " } }] });
        assert_eq!(parse_openai_response(&blank, ApiStyle::Chat).expect("parses"), None);

        let null_content = serde_json::json!({ "choices": [{ "message": { "content": null } }] });
        assert_eq!(
            parse_openai_response(&null_content, ApiStyle::Chat).expect("parses"),
            None
        );
    }

    #[test]
    fn missing_choices_is_an_error() {
        let body = serde_json::json!({ "object": "chat.completion" });
        let error = parse_openai_response(&body, ApiStyle::Chat).expect_err("malformed body");
        assert!(error.to_string().contains("no choices"));
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let body = "ş".repeat(600);
        assert_eq!(truncate_body(&body).chars().count(), 500);
        assert_eq!(truncate_body("short"), "short");
    }

    #[tokio::test]
    async fn completes_against_a_live_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr");
        let server = tokio::spawn(serve_once(
            listener,
            "200 OK",
            serde_json::json!({
                "choices": [{ "message": { "role": "assistant", "content": "Ahoy matey" } }],
                "usage": { "prompt_tokens": 12, "completion_tokens": 3 }
            })
            .to_string(),
        ));

        let backend = backend(ApiStyle::Chat, &format!("http://{address}"));
        let reply = backend
            .complete(&sample_messages(), &BotConfig::default().model.params)
            .await
            .expect("completion succeeds");

        assert_eq!(reply.as_deref(), Some("Ahoy matey"));

        let request = server.await.expect("server task");
        assert!(request.starts_with("POST /v1/chat/completions"));
        assert!(request.to_lowercase().contains("authorization: bearer sk-test"));
        assert!(request.contains("\"how are you\""));
    }

    #[tokio::test]
    async fn api_errors_surface_provider_message() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr");
        let server = tokio::spawn(serve_once(
            listener,
            "429 Too Many Requests",
            serde_json::json!({ "error": { "message": "Rate limit reached" } }).to_string(),
        ));

        let backend = backend(ApiStyle::Chat, &format!("http://{address}"));
        let error = backend
            .complete(&sample_messages(), &BotConfig::default().model.params)
            .await
            .expect_err("429 must fail");

        assert!(error.to_string().contains("Rate limit reached"));
        server.await.expect("server task");
    }
}

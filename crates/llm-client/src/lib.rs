use analysis_core::protocol::{ToolCall, ToolCallChunk};
use analysis_core::{AnalysisError, ChatChunk, ChatModel, Settings};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// OpenAI-compatible chat client. DeepSeek is the primary provider; OpenAI
/// is the fallback when enabled.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    chat_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

#[derive(Deserialize)]
struct StreamToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

impl LlmClient {
    pub fn new(base_url: &str, api_key: String, model: &str, temperature: f64, max_tokens: u32) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            chat_url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.to_string(),
            temperature,
            max_tokens,
        }
    }

    /// Select the enabled provider, DeepSeek first.
    pub fn from_settings(settings: &Settings) -> Result<Self, AnalysisError> {
        if settings.deepseek_enabled {
            tracing::info!("LLM provider: DeepSeek");
            Ok(Self::new(
                &settings.deepseek_base_url,
                settings.deepseek_api_key.clone(),
                "deepseek-chat",
                0.0,
                4096,
            ))
        } else if settings.openai_enabled {
            tracing::info!("LLM provider: OpenAI");
            let base = settings
                .openai_base_url
                .as_deref()
                .unwrap_or("https://api.openai.com/v1");
            Ok(Self::new(base, settings.openai_api_key.clone(), "gpt-4o", 0.0, 4096))
        } else {
            Err(AnalysisError::ConfigError(
                "no LLM provider enabled; set DEEPSEEK_ENABLED or OPENAI_ENABLED".to_string(),
            ))
        }
    }

}

/// Parse one `data:` payload of the upstream stream into a ChatChunk.
fn parse_stream_payload(payload: &str) -> Option<ChatChunk> {
    let parsed: StreamResponse = serde_json::from_str(payload).ok()?;
    let choice = parsed.choices.into_iter().next()?;
    let mut chunk = ChatChunk {
        content: choice.delta.content.unwrap_or_default(),
        finish_reason: choice.finish_reason,
        ..Default::default()
    };
    if let Some(deltas) = choice.delta.tool_calls {
        for d in deltas {
            let (name, args) = match d.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            chunk.tool_call_chunks.push(ToolCallChunk {
                name,
                args,
                id: d.id,
                index: d.index,
                r#type: "tool_call_chunk".to_string(),
            });
        }
    }
    Some(chunk)
}

/// Assemble completed tool calls from accumulated chunks, keyed by index.
fn assemble_tool_calls(chunks: &[ToolCallChunk]) -> Vec<ToolCall> {
    let mut by_index: Vec<(usize, String, String, String)> = Vec::new();
    for c in chunks {
        match by_index.iter_mut().find(|(i, ..)| *i == c.index) {
            Some((_, id, name, args)) => {
                if let Some(cid) = &c.id {
                    *id = cid.clone();
                }
                if let Some(n) = &c.name {
                    *name = n.clone();
                }
                if let Some(a) = &c.args {
                    args.push_str(a);
                }
            }
            None => by_index.push((
                c.index,
                c.id.clone().unwrap_or_default(),
                c.name.clone().unwrap_or_default(),
                c.args.clone().unwrap_or_default(),
            )),
        }
    }
    by_index
        .into_iter()
        .map(|(_, id, name, args)| ToolCall {
            name,
            args: serde_json::from_str(&args).unwrap_or(Value::Null),
            id,
            r#type: "tool_call".to_string(),
        })
        .collect()
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, AnalysisError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };
        let response = self
            .client
            .post(&self.chat_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::LlmError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AnalysisError::LlmError(format!(
                "Error code: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::LlmError(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AnalysisError::LlmError("empty completion".to_string()))
    }

    async fn complete_streaming(
        &self,
        prompt: &str,
        on_chunk: &(dyn Fn(ChatChunk) + Send + Sync),
    ) -> Result<String, AnalysisError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: true,
        };
        let response = self
            .client
            .post(&self.chat_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::LlmError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AnalysisError::LlmError(format!(
                "Error code: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut accumulated = String::new();
        let mut pending_tool_chunks: Vec<ToolCallChunk> = Vec::new();

        while let Some(piece) = stream.next().await {
            let piece = piece.map_err(|e| AnalysisError::LlmError(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&piece));

            // Frames are separated by a blank line; keep the trailing partial.
            while let Some(pos) = buffer.find("\n\n") {
                let frame: String = buffer.drain(..pos + 2).collect();
                for line in frame.lines() {
                    let Some(payload) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if payload.trim() == "[DONE]" {
                        continue;
                    }
                    if let Some(chunk) = parse_stream_payload(payload) {
                        accumulated.push_str(&chunk.content);
                        pending_tool_chunks.extend(chunk.tool_call_chunks.iter().cloned());
                        let is_final = chunk.finish_reason.as_deref() == Some("tool_calls");
                        on_chunk(chunk);
                        if is_final && !pending_tool_chunks.is_empty() {
                            on_chunk(ChatChunk {
                                tool_calls: assemble_tool_calls(&pending_tool_chunks),
                                finish_reason: Some("tool_calls".to_string()),
                                ..Default::default()
                            });
                        }
                    }
                }
            }
        }

        Ok(accumulated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_payload_content_delta() {
        let payload = r#"{"choices":[{"delta":{"content":"看多"},"finish_reason":null}]}"#;
        let chunk = parse_stream_payload(payload).unwrap();
        assert_eq!(chunk.content, "看多");
        assert!(chunk.finish_reason.is_none());
    }

    #[test]
    fn stream_payload_finish_reason() {
        let payload = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let chunk = parse_stream_payload(payload).unwrap();
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn tool_call_chunks_assemble_by_index() {
        let chunks = vec![
            ToolCallChunk {
                name: Some("get_news".into()),
                args: Some("{\"stock".into()),
                id: Some("call_1".into()),
                index: 0,
                r#type: "tool_call_chunk".into(),
            },
            ToolCallChunk {
                name: None,
                args: Some("_code\":\"000001.SZ\"}".into()),
                id: None,
                index: 0,
                r#type: "tool_call_chunk".into(),
            },
        ];
        let calls = assemble_tool_calls(&chunks);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "get_news");
        assert_eq!(calls[0].args["stock_code"], "000001.SZ");
    }
}

//! Wire types for the JSON-per-line event stream served over SSE.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MessageChunk,
    ToolCalls,
    ToolCallChunks,
    Progress,
    NodeComplete,
    AnalysisResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: Value,
    pub id: String,
    #[serde(default = "tool_call_type")]
    pub r#type: String,
}

fn tool_call_type() -> String {
    "tool_call".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub index: usize,
    #[serde(default = "tool_call_chunk_type")]
    pub r#type: String,
}

fn tool_call_chunk_type() -> String {
    "tool_call_chunk".to_string()
}

/// One frame of the streaming protocol. Optional fields are omitted when
/// absent so the wire shape matches the documented protocol exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    pub event_type: EventType,
    pub thread_id: String,
    pub agent: String,
    pub id: String,
    #[serde(default = "assistant_role")]
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_symbol: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_chunks: Option<Vec<ToolCallChunk>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_data: Option<Value>,
}

fn assistant_role() -> String {
    "assistant".to_string()
}

impl StreamEvent {
    pub fn new(event_type: EventType, thread_id: &str, agent: &str, id: &str) -> Self {
        Self {
            event_type,
            thread_id: thread_id.to_string(),
            agent: agent.to_string(),
            id: id.to_string(),
            role: assistant_role(),
            content: None,
            finish_reason: None,
            progress_symbol: None,
            tool_calls: None,
            tool_call_chunks: None,
            node_status: None,
            result_data: None,
        }
    }

    /// Serialize as one SSE frame: `data: <json>\n\n`.
    pub fn to_sse_frame(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("data: {json}\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_fields_are_omitted() {
        let ev = StreamEvent::new(EventType::Progress, "t", "fundamental_analysis", "r");
        let json = serde_json::to_string(&ev).unwrap();
        assert!(!json.contains("finish_reason"));
        assert!(!json.contains("tool_calls"));
        assert!(json.contains("\"event_type\":\"progress\""));
    }

    #[test]
    fn sse_frame_shape() {
        let mut ev = StreamEvent::new(EventType::MessageChunk, "t", "system", "final-run");
        ev.content = Some("分析流程已结束。".into());
        ev.finish_reason = Some("stop".into());
        let frame = ev.to_sse_frame();
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("\n\n"));
    }
}

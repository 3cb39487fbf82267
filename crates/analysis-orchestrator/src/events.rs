//! Lifecycle events emitted by the scheduler and their translation into the
//! JSON-per-line stream protocol.

use analysis_core::protocol::{EventType, StreamEvent};
use analysis_core::ChatChunk;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    ChainStart {
        node: String,
        run_id: String,
    },
    ChainEnd {
        node: String,
        run_id: String,
        output: Value,
    },
    ToolStart {
        node: String,
        run_id: String,
        tool: String,
    },
    ToolEnd {
        node: String,
        run_id: String,
        tool: String,
        output: String,
    },
    LlmChunk {
        node: String,
        run_id: String,
        content: String,
        finish_reason: Option<String>,
        tool_calls: Vec<analysis_core::protocol::ToolCall>,
        tool_call_chunks: Vec<analysis_core::protocol::ToolCallChunk>,
    },
    /// Unrecoverable pipeline failure; becomes the system_error frame.
    Fatal {
        error: String,
    },
    GraphEnd,
}

/// Cheap fan-out handle for emitting lifecycle events. A dropped receiver
/// (client gone) turns emission into a no-op; nodes still run to completion.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<UnboundedSender<PipelineEvent>>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that drops everything; used by the background variant.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn chain_start(&self, node: &str, run_id: &str) {
        self.emit(PipelineEvent::ChainStart {
            node: node.to_string(),
            run_id: run_id.to_string(),
        });
    }

    pub fn chain_end(&self, node: &str, run_id: &str, output: Value) {
        self.emit(PipelineEvent::ChainEnd {
            node: node.to_string(),
            run_id: run_id.to_string(),
            output,
        });
    }

    pub fn tool_start(&self, node: &str, run_id: &str, tool: &str) {
        self.emit(PipelineEvent::ToolStart {
            node: node.to_string(),
            run_id: run_id.to_string(),
            tool: tool.to_string(),
        });
    }

    pub fn tool_end(&self, node: &str, run_id: &str, tool: &str, output: &str) {
        self.emit(PipelineEvent::ToolEnd {
            node: node.to_string(),
            run_id: run_id.to_string(),
            tool: tool.to_string(),
            output: output.to_string(),
        });
    }

    pub fn llm_chunk(&self, node: &str, run_id: &str, chunk: ChatChunk) {
        self.emit(PipelineEvent::LlmChunk {
            node: node.to_string(),
            run_id: run_id.to_string(),
            content: chunk.content,
            finish_reason: chunk.finish_reason,
            tool_calls: chunk.tool_calls,
            tool_call_chunks: chunk.tool_call_chunks,
        });
    }
}

const ANALYST_NODES: &[&str] = &[
    "fundamental_analysis",
    "technical_analysis",
    "sentiment_analysis",
    "news_analysis",
    "fund_analysis",
    "supervisor",
    "final_result_save",
];

fn report_title(node: &str) -> String {
    match node {
        "fundamental_analysis" => "基本面分析报告".to_string(),
        "technical_analysis" => "技术分析报告".to_string(),
        "sentiment_analysis" => "情绪分析报告".to_string(),
        "news_analysis" => "新闻分析报告".to_string(),
        "fund_analysis" => "资金分析报告".to_string(),
        "supervisor" => "总决策报告".to_string(),
        "final_result_save" => "最终结果保存".to_string(),
        other => format!("{other}报告"),
    }
}

fn truncate_chars(s: &str, n: usize) -> String {
    if s.chars().count() <= n {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(n).collect::<String>())
    }
}

/// Map one lifecycle event to zero or more SSE frames (a chain-end yields a
/// `node_complete` plus an `analysis_result`, concatenated into one frame
/// string). Graph-end is suppressed.
pub fn format_event(event: &PipelineEvent, thread_id: &str) -> Option<String> {
    match event {
        PipelineEvent::GraphEnd => None,

        PipelineEvent::Fatal { error } => Some(error_frame(thread_id, error)),

        PipelineEvent::ChainStart { node, run_id } => {
            let mut ev = StreamEvent::new(EventType::Progress, thread_id, node, run_id);
            ev.content = Some(format!("节点 '{node}' 开始执行..."));
            ev.node_status = Some("started".to_string());
            ev.progress_symbol = Some(true);
            Some(ev.to_sse_frame())
        }

        PipelineEvent::ToolStart { node, run_id, tool } => {
            let mut ev = StreamEvent::new(EventType::Progress, thread_id, node, run_id);
            ev.content = Some(format!("工具 '{tool}' 正在执行..."));
            ev.progress_symbol = Some(true);
            Some(ev.to_sse_frame())
        }

        PipelineEvent::ToolEnd {
            node,
            run_id,
            tool,
            output,
        } => {
            let mut ev = StreamEvent::new(EventType::Progress, thread_id, node, run_id);
            ev.content = Some(format!(
                "工具 '{tool}' 执行完成: {}",
                truncate_chars(output, 200)
            ));
            ev.progress_symbol = Some(false);
            Some(ev.to_sse_frame())
        }

        PipelineEvent::LlmChunk {
            node,
            run_id,
            content,
            finish_reason,
            tool_calls,
            tool_call_chunks,
        } => {
            if !tool_call_chunks.is_empty() {
                let mut ev = StreamEvent::new(EventType::ToolCallChunks, thread_id, node, run_id);
                ev.tool_call_chunks = Some(tool_call_chunks.clone());
                return Some(ev.to_sse_frame());
            }
            if !content.is_empty() {
                let mut ev = StreamEvent::new(EventType::MessageChunk, thread_id, node, run_id);
                ev.content = Some(content.clone());
                ev.finish_reason = finish_reason.clone();
                return Some(ev.to_sse_frame());
            }
            if !tool_calls.is_empty() {
                let mut ev = StreamEvent::new(EventType::ToolCalls, thread_id, node, run_id);
                ev.tool_calls = Some(tool_calls.clone());
                ev.finish_reason = Some("tool_calls".to_string());
                return Some(ev.to_sse_frame());
            }
            None
        }

        PipelineEvent::ChainEnd {
            node,
            run_id,
            output,
        } => {
            if !ANALYST_NODES.contains(&node.as_str()) {
                return None;
            }
            let mut complete = StreamEvent::new(EventType::NodeComplete, thread_id, node, run_id);
            complete.content = Some(format!("节点 '{node}' 执行完成"));
            complete.node_status = Some("completed".to_string());
            complete.finish_reason = Some("stop".to_string());

            let mut frames = complete.to_sse_frame();

            if let Value::Object(map) = output {
                if !map.is_empty() {
                    let mut report_content = format!("=== {} ===\n", report_title(node));
                    if node == "final_result_save" {
                        if let Some(files) = map.get("saved_files").and_then(Value::as_object) {
                            report_content.push_str(&format!("已保存文件数量: {}\n", files.len()));
                        }
                        if let Some(path) = map.get("summary_filepath").and_then(Value::as_str) {
                            report_content.push_str(&format!("摘要文件路径: {path}\n"));
                        }
                        if let Some(final_report) = map.get("final_report").and_then(Value::as_str)
                        {
                            report_content.push_str(&format!("{final_report}\n"));
                        }
                    } else {
                        for (key, value) in map {
                            if key.ends_with("_report") || key.ends_with("_result") {
                                match value {
                                    Value::String(s) => {
                                        report_content.push_str(&format!("{s}\n\n"))
                                    }
                                    other => report_content
                                        .push_str(&format!("{key}: {other}\n\n")),
                                }
                            }
                        }
                    }

                    let mut result =
                        StreamEvent::new(EventType::AnalysisResult, thread_id, node, run_id);
                    result.content = Some(report_content);
                    result.result_data = Some(output.clone());
                    result.finish_reason = Some("stop".to_string());
                    frames.push_str(&result.to_sse_frame());
                }
            }
            Some(frames)
        }
    }
}

/// The terminal frame every stream ends with.
pub fn terminal_frame(thread_id: &str) -> String {
    let mut ev = StreamEvent::new(EventType::MessageChunk, thread_id, "system", "final-run");
    ev.content = Some("分析流程已结束。".to_string());
    ev.finish_reason = Some("stop".to_string());
    ev.to_sse_frame()
}

/// The error frame emitted before the terminal frame when the run aborts.
pub fn error_frame(thread_id: &str, error: &str) -> String {
    let mut ev = StreamEvent::new(EventType::MessageChunk, thread_id, "system_error", "error-run");
    ev.content = Some(format!("分析过程中出现严重错误: {error}"));
    ev.finish_reason = Some("stop".to_string());
    ev.to_sse_frame()
}

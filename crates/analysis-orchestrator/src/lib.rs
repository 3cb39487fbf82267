pub mod events;
pub mod graph;
pub mod nodes;
pub mod parsers;
pub mod prompts;
pub mod runtime;

pub use events::{error_frame, format_event, terminal_frame, EventSink, PipelineEvent};
pub use graph::{run_pipeline, GRAPH};
pub use runtime::{Runtime, TaskEntry, TaskStatus};

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Launch a streaming run: the pipeline executes in the background while
/// formatted SSE frames arrive on the returned channel, ending with exactly
/// one terminal frame. Dropping the receiver does not cancel in-flight
/// nodes; they complete and persist their artifacts.
pub fn spawn_stream_analysis(
    rt: Arc<Runtime>,
    symbol: String,
    end_date: Option<String>,
) -> mpsc::UnboundedReceiver<String> {
    let thread_id = Uuid::new_v4().to_string();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (frame_tx, frame_rx) = mpsc::unbounded_channel();

    let pipeline_thread = thread_id.clone();
    tokio::spawn(async move {
        let events = EventSink::new(event_tx);
        let run = graph::run_pipeline(
            rt,
            &symbol,
            end_date,
            &pipeline_thread,
            events.clone(),
        );
        if futures_util::FutureExt::catch_unwind(std::panic::AssertUnwindSafe(run))
            .await
            .is_err()
        {
            events.emit(PipelineEvent::Fatal {
                error: "pipeline panicked".to_string(),
            });
        }
        // The sink (and with it the event channel) closes here.
    });

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if let Some(frame) = format_event(&event, &thread_id) {
                if frame_tx.send(frame).is_err() {
                    // Client went away; keep draining so the pipeline's
                    // sends never block, but stop formatting.
                    while event_rx.recv().await.is_some() {}
                    break;
                }
            }
        }
        let _ = frame_tx.send(terminal_frame(&thread_id));
    });

    frame_rx
}

/// Non-streaming variant used by the background task endpoint: run the DAG
/// to completion and return the merged final state.
pub async fn run_background_analysis(
    rt: Arc<Runtime>,
    symbol: String,
    end_date: Option<String>,
) -> Value {
    let thread_id = Uuid::new_v4().to_string();
    graph::run_pipeline(rt, &symbol, end_date, &thread_id, EventSink::disabled()).await
}

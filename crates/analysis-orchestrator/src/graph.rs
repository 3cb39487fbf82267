//! The static analyst DAG and its scheduler. Eligible nodes (all
//! predecessors complete) run concurrently; node failures are contained and
//! reported, and downstream nodes run with neutral defaults.

use crate::events::{EventSink, PipelineEvent};
use crate::nodes::{self, NodeContext};
use crate::runtime::Runtime;
use futures_util::FutureExt;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use uuid::Uuid;

pub struct NodeSpec {
    pub name: &'static str,
    pub deps: &'static [&'static str],
}

/// start → {fundamental, news, technical, fund};
/// {fundamental, news} → sentiment;
/// {sentiment, technical, fund, fundamental} → supervisor;
/// supervisor → final save.
pub const GRAPH: &[NodeSpec] = &[
    NodeSpec { name: "fundamental_analysis", deps: &[] },
    NodeSpec { name: "news_analysis", deps: &[] },
    NodeSpec { name: "technical_analysis", deps: &[] },
    NodeSpec { name: "fund_analysis", deps: &[] },
    NodeSpec {
        name: "sentiment_analysis",
        deps: &["fundamental_analysis", "news_analysis"],
    },
    NodeSpec {
        name: "supervisor",
        deps: &[
            "sentiment_analysis",
            "technical_analysis",
            "fund_analysis",
            "fundamental_analysis",
        ],
    },
    NodeSpec {
        name: "final_result_save",
        deps: &["supervisor"],
    },
];

fn spawn_node(
    join_set: &mut JoinSet<(&'static str, String, Value)>,
    rt: Arc<Runtime>,
    ctx: Arc<NodeContext>,
    node: &'static str,
) {
    join_set.spawn(async move {
        let run_id = Uuid::new_v4().to_string();
        ctx.events.chain_start(node, &run_id);
        let result = AssertUnwindSafe(Box::pin(nodes::run_node(&rt, &ctx, node, &run_id)))
            .catch_unwind()
            .await;
        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::error!(node, error = %e, "node failed");
                json!({ "error": e.to_string() })
            }
            Err(_) => {
                tracing::error!(node, "node panicked");
                json!({ "error": "node panicked" })
            }
        };
        (node, run_id, output)
    });
}

/// Run the full DAG for one request and return the merged final state.
/// Every node's output lands in the shared state under its report key;
/// merges are disjoint by construction.
pub async fn run_pipeline(
    rt: Arc<Runtime>,
    symbol: &str,
    end_date: Option<String>,
    thread_id: &str,
    events: EventSink,
) -> Value {
    tracing::info!(symbol, ?end_date, "pipeline starting");

    // The entry node is purely a lifecycle marker.
    let start_id = Uuid::new_v4().to_string();
    events.chain_start("start", &start_id);
    events.chain_end("start", &start_id, json!({}));

    let state = Arc::new(Mutex::new(Map::new()));
    let ctx = Arc::new(NodeContext {
        symbol: symbol.to_string(),
        end_date,
        thread_id: thread_id.to_string(),
        events: events.clone(),
        state: Arc::clone(&state),
    });

    let mut remaining: HashMap<&'static str, usize> = HashMap::new();
    let mut dependents: HashMap<&'static str, Vec<&'static str>> = HashMap::new();
    for node in GRAPH {
        remaining.insert(node.name, node.deps.len());
        for dep in node.deps {
            dependents.entry(dep).or_default().push(node.name);
        }
    }

    let mut join_set: JoinSet<(&'static str, String, Value)> = JoinSet::new();
    for node in GRAPH {
        if node.deps.is_empty() {
            spawn_node(&mut join_set, Arc::clone(&rt), Arc::clone(&ctx), node.name);
        }
    }

    while let Some(finished) = join_set.join_next().await {
        let Ok((node, run_id, output)) = finished else {
            tracing::error!("node task aborted");
            continue;
        };

        if let Value::Object(map) = &output {
            let mut guard = state.lock().expect("state lock poisoned");
            for (key, value) in map {
                guard.insert(key.clone(), value.clone());
            }
        }
        events.chain_end(node, &run_id, output);

        if let Some(next) = dependents.get(node) {
            for candidate in next {
                let count = remaining.get_mut(candidate).expect("known node");
                *count -= 1;
                if *count == 0 {
                    spawn_node(&mut join_set, Arc::clone(&rt), Arc::clone(&ctx), candidate);
                }
            }
        }
    }

    events.emit(PipelineEvent::GraphEnd);
    tracing::info!(symbol, "pipeline complete");
    let guard = state.lock().expect("state lock poisoned");
    Value::Object(guard.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_edges_match_the_documented_dag() {
        let find = |name: &str| GRAPH.iter().find(|n| n.name == name).unwrap();
        assert!(find("fundamental_analysis").deps.is_empty());
        assert!(find("news_analysis").deps.is_empty());
        assert_eq!(
            find("sentiment_analysis").deps,
            &["fundamental_analysis", "news_analysis"]
        );
        assert_eq!(find("supervisor").deps.len(), 4);
        assert_eq!(find("final_result_save").deps, &["supervisor"]);
    }
}

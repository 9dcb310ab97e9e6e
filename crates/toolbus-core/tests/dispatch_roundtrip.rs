//! Full client/server protocol path inside one process

use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use toolbus_core::descriptor::ParamSpec;
use toolbus_core::protocol::{ArgMap, ServerInfo};
use toolbus_core::registry::{FnTool, Tool, ToolRegistry};
use toolbus_core::transport::{MemoryTransport, Transport};
use toolbus_core::{BusError, Dispatcher, Session};

struct SleepTool;

#[async_trait::async_trait]
impl Tool for SleepTool {
    fn name(&self) -> &str {
        "sleep_ms"
    }

    fn description(&self) -> &str {
        "Sleep for the given number of milliseconds, then report it"
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::integer("ms", "How long to sleep")]
    }

    async fn invoke(&self, args: ArgMap) -> Result<serde_json::Value, BusError> {
        let ms = args["ms"].as_i64().unwrap_or_default() as u64;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!(ms))
    }
}

fn build_registry() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SleepTool));
    registry.register(Arc::new(FnTool::new(
        "add",
        "Add two numbers",
        vec![
            ParamSpec::number("a", "first operand"),
            ParamSpec::number("b", "second operand"),
        ],
        |args| {
            Ok(json!(
                args["a"].as_f64().unwrap_or_default() + args["b"].as_f64().unwrap_or_default()
            ))
        },
    )));
    Arc::new(registry)
}

async fn connected_pair() -> (Session, tokio::task::JoinHandle<()>) {
    let (client_end, server_end) = MemoryTransport::pair();
    let dispatcher = Arc::new(Dispatcher::new(
        build_registry(),
        ServerInfo::new("inproc", "0.1.0"),
    ));

    let transport: Arc<dyn Transport> = Arc::new(server_end);
    let serving = tokio::spawn(dispatcher.serve(transport));

    let session = Session::establish(
        "inproc".to_string(),
        Arc::new(client_end),
        Duration::from_secs(5),
    )
    .await
    .expect("session should establish");

    (session, serving)
}

fn num_args(pairs: &[(&str, f64)]) -> ArgMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
}

#[tokio::test]
async fn test_handshake_and_listing() {
    let (session, serving) = connected_pair().await;

    assert_eq!(session.server_info().unwrap().server_name, "inproc");

    let tools = session.list_tools().await.unwrap();
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["add", "sleep_ms"]);

    session.close().await;
    serving.await.unwrap();
}

#[tokio::test]
async fn test_call_through_the_full_path() {
    let (session, serving) = connected_pair().await;

    let value = session
        .call("add", num_args(&[("a", 2.0), ("b", 3.0)]), None)
        .await
        .unwrap();
    assert_eq!(value, json!(5.0));

    session.close().await;
    serving.await.unwrap();
}

#[tokio::test]
async fn test_unknown_tool_surfaces_not_hangs() {
    let (session, serving) = connected_pair().await;

    let err = session
        .call("frobnicate", ArgMap::new(), None)
        .await
        .err()
        .expect("unknown tool should fail");
    assert!(matches!(err, BusError::UnknownTool { .. }));

    session.close().await;
    serving.await.unwrap();
}

#[tokio::test]
async fn test_slow_call_does_not_block_fast_call() {
    let (session, serving) = connected_pair().await;

    let mut slow_args = ArgMap::new();
    slow_args.insert("ms".to_string(), json!(300));
    let mut fast_args = ArgMap::new();
    fast_args.insert("ms".to_string(), json!(10));

    let started = Instant::now();
    let (slow, fast) = tokio::join!(
        session.call("sleep_ms", slow_args, None),
        session.call("sleep_ms", fast_args, None),
    );

    assert_eq!(slow.unwrap(), json!(300));
    assert_eq!(fast.unwrap(), json!(10));
    // Concurrent dispatch: both finish in roughly the slow tool's time,
    // nowhere near the 310 ms a serialized server would need.
    assert!(started.elapsed() < Duration::from_millis(450));

    session.close().await;
    serving.await.unwrap();
}

#[tokio::test]
async fn test_argument_binding_enforced_end_to_end() {
    let (session, serving) = connected_pair().await;

    let err = session
        .call("add", num_args(&[("a", 1.0)]), None)
        .await
        .err()
        .expect("missing parameter should fail");
    assert!(matches!(err, BusError::InvalidArguments { .. }));

    session.close().await;
    serving.await.unwrap();
}

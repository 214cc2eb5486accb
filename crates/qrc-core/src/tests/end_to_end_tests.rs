//! Remediation through a real `RpcClient` against a mock Core on TCP

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use qrc_rpc::{ConnectionConfig, FrameCodec, RpcClient};
use qrc_types::{AuditKind, SiteLabels};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

use crate::DiagnosticsEngine;

#[derive(Clone, Default)]
struct ScriptState {
    reloaded: Arc<AtomicBool>,
    reload_requests: Arc<AtomicUsize>,
}

fn script_controls(state: &ScriptState) -> Value {
    let (count, log) = if state.reloaded.load(Ordering::SeqCst) {
        (0, "")
    } else {
        (2, "Line 7: attempt to perform arithmetic on a nil value")
    };

    json!({
        "Name": "Main Script",
        "Controls": [
            {
                "Name": "script.error.count",
                "Type": "Float",
                "Value": count,
                "String": count.to_string(),
            },
            {"Name": "log.history", "Type": "Text", "Value": log, "String": log},
            {"Name": "status", "Type": "Status", "Value": 0, "String": "OK"},
        ]
    })
}

async fn serve(stream: TcpStream, state: ScriptState) {
    let mut framed = Framed::new(stream, FrameCodec::new());

    while let Some(Ok(request)) = framed.next().await {
        let id = request["id"].clone();
        let result = match request["method"].as_str().unwrap_or_default() {
            "Component.GetComponents" => json!([
                {"Name": "Main Script", "ID": "a1", "Type": "device_controller_script"},
                {"Name": "Mixer", "ID": "b2", "Type": "mixer"},
            ]),
            "Component.GetControls" => script_controls(&state),
            "Component.Set" => {
                assert_eq!(request["params"]["Controls"][0]["Name"], "reload");
                state.reload_requests.fetch_add(1, Ordering::SeqCst);
                state.reloaded.store(true, Ordering::SeqCst);
                json!(true)
            }
            _ => continue,
        };

        let reply = json!({"jsonrpc": "2.0", "id": id, "result": result});
        if framed.send(reply).await.is_err() {
            break;
        }
    }
}

#[tokio::test]
async fn test_remediate_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = ScriptState::default();

    let server_state = state.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream, server_state.clone()));
        }
    });

    let config = ConnectionConfig::new("127.0.0.1")
        .with_port(addr.port())
        .with_timeouts(
            Duration::from_secs(2),
            Duration::from_secs(5),
            Duration::from_millis(150),
        );
    let engine = DiagnosticsEngine::new(RpcClient::new(config).unwrap());

    let report = engine
        .remediate(&SiteLabels::new("Acme AV", "HQ", "core-01"))
        .await;

    assert_eq!(report.script_errors.len(), 1);
    assert_eq!(
        report.script_errors[0].details.as_deref(),
        Some("Line 7: attempt to perform ari...")
    );
    assert!(report.script_statuses.is_empty());
    assert!(!report.has_persistent_issues());
    assert_eq!(state.reload_requests.load(Ordering::SeqCst), 1);
    assert!(matches!(
        report.audit_events.last().map(|e| &e.kind),
        Some(AuditKind::IssuesResolved { .. })
    ));
}

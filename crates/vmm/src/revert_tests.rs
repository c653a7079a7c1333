// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Monitor double answering OK to every command, any number of sessions.
async fn ok_monitor() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { return };
            tokio::spawn(async move {
                let (read, mut write) = stream.into_split();
                let mut lines = BufReader::new(read).lines();
                while let Ok(Some(_)) = lines.next_line().await {
                    if write.write_all(b"OK\n").await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    addr
}

/// Monitor double that fails `loadvm` with an error token.
async fn broken_loadvm_monitor() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { return };
            tokio::spawn(async move {
                let (read, mut write) = stream.into_split();
                let mut lines = BufReader::new(read).lines();
                while let Ok(Some(command)) = lines.next_line().await {
                    let reply: &[u8] = if command.starts_with("loadvm") {
                        b"error: snapshot corrupt\n"
                    } else {
                        b"OK\n"
                    };
                    if write.write_all(reply).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    addr
}

/// Agent double answering {"crash": false}.
async fn live_agent() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { return };
            let body = r#"{"crash": false}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    addr
}

fn engine(monitor_addr: String, agent_addr: String) -> RevertEngine {
    RevertEngine::new(
        MonitorClient::new(monitor_addr),
        AgentClient::new(agent_addr),
        "fuzzing-ready",
    )
}

#[tokio::test]
async fn fast_revert_happy_path_records_latency() {
    let monitor = ok_monitor().await;
    let agent = live_agent().await;
    let mut engine = engine(monitor, agent);

    let latency = engine.fast_revert().await.unwrap();
    assert!(latency < Duration::from_secs(2));

    let stats = engine.stats();
    assert_eq!(stats.fast_total, 1);
    assert_eq!(stats.slow_total, 0);
    assert!((stats.fast_ratio - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn failed_loadvm_surfaces_monitor_error() {
    let monitor = broken_loadvm_monitor().await;
    let agent = live_agent().await;
    let mut engine = engine(monitor, agent);

    let result = engine.fast_revert().await;
    assert!(matches!(result, Err(RevertError::Monitor(_))));
    // Failed attempts are not recorded; the caller records the slow path
    assert_eq!(engine.stats().fast_total, 0);
}

#[tokio::test]
async fn partial_revert_is_caught_by_liveness_probe() {
    let monitor = ok_monitor().await;
    // Agent endpoint that nothing listens on: probe fails
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let agent = listener.local_addr().unwrap().to_string();
    drop(listener);

    let mut engine = engine(monitor, agent);
    let result = engine.fast_revert().await;
    assert!(matches!(result, Err(RevertError::LivenessProbe(_))));
}

#[tokio::test]
async fn slow_reverts_lower_the_ratio() {
    let monitor = ok_monitor().await;
    let agent = live_agent().await;
    let mut engine = engine(monitor, agent);

    engine.fast_revert().await.unwrap();
    engine.record_slow(Duration::from_secs(3));

    let stats = engine.stats();
    assert_eq!(stats.fast_total, 1);
    assert_eq!(stats.slow_total, 1);
    assert!((stats.fast_ratio - 0.5).abs() < f64::EPSILON);
    // The 3 s slow restore dominates the high percentiles
    assert!(stats.p99_ms >= 3_000);
}

#[tokio::test]
async fn percentiles_come_from_recorded_latencies() {
    let monitor = ok_monitor().await;
    let agent = live_agent().await;
    let mut engine = engine(monitor, agent);

    for ms in [10u64, 20, 30, 40, 1_000] {
        engine.record_slow(Duration::from_millis(ms));
    }
    let stats = engine.stats();
    assert_eq!(stats.p50_ms, 30);
    assert_eq!(stats.p99_ms, 1_000);
}

//! End-to-end tests over real WebSockets.
//!
//! Each test spawns the broker on a random port and drives it with
//! `WsTestClient` participants.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use anyhow::Result;
use broker_service::actors::ConnectionSettings;
use broker_service::broker::ParticipantState;
use broker_service::protocol::{ClientEvent, ServerEvent, SignalKind};
use broker_test_utils::{TestBrokerServer, WsTestClient};
use serde_json::json;

const SILENCE: Duration = Duration::from_millis(200);

/// Poll the broker until `check` holds or a second passes.
async fn eventually<F>(server: &TestBrokerServer, check: F) -> Result<()>
where
    F: Fn(broker_service::broker::BrokerStatus) -> bool,
{
    for _ in 0..50 {
        if check(server.broker().get_status().await?) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    anyhow::bail!("broker never reached expected state")
}

async fn paired_clients(server: &TestBrokerServer) -> Result<(WsTestClient, WsTestClient)> {
    let mut alice = WsTestClient::connect(server).await?;
    let mut bob = WsTestClient::connect(server).await?;

    alice.search().await?;
    assert_eq!(alice.recv_queue_count().await?, 0);
    assert_eq!(alice.recv_queue_count().await?, 1);
    bob.search().await?;

    let bob_found = bob.expect_found().await?;
    let alice_found = alice.expect_found().await?;
    assert_eq!(bob_found.peer_id, alice.participant_id());
    assert_eq!(alice_found.peer_id, bob.participant_id());
    assert_eq!(alice_found.pairing_id, bob_found.pairing_id);

    Ok((alice, bob))
}

#[tokio::test]
async fn test_connect_assigns_distinct_ids() -> Result<()> {
    let server = TestBrokerServer::spawn().await?;

    let mut alice = WsTestClient::connect(&server).await?;
    let bob = WsTestClient::connect(&server).await?;

    assert_ne!(alice.participant_id(), bob.participant_id());
    assert_eq!(alice.recv_queue_count().await?, 0);

    let status = server.broker().get_status().await?;
    assert_eq!(status.connections, 2);
    assert_eq!(server.metrics().connection_count(), 2);

    Ok(())
}

#[tokio::test]
async fn test_two_searchers_are_paired() -> Result<()> {
    let server = TestBrokerServer::spawn().await?;
    let (alice, bob) = paired_clients(&server).await?;

    let state = server
        .broker()
        .participant_state(alice.participant_id())
        .await?;
    assert_eq!(state, ParticipantState::Paired);

    let status = server.broker().get_status().await?;
    assert_eq!(status.pairings_active, 1);
    assert_eq!(status.queue_depth, 0);

    drop(bob);
    Ok(())
}

#[tokio::test]
async fn test_signaling_is_relayed_with_sender() -> Result<()> {
    let server = TestBrokerServer::spawn().await?;
    let (mut alice, mut bob) = paired_clients(&server).await?;

    alice
        .send(&ClientEvent::Signal {
            kind: SignalKind::Offer,
            payload: json!({
                "to": bob.participant_id(),
                "offer": {"type": "offer", "sdp": "v=0"}
            }),
        })
        .await?;

    let event = bob.expect("offer").await?;
    assert_eq!(
        event,
        ServerEvent::Offer(json!({
            "from": alice.participant_id(),
            "offer": {"type": "offer", "sdp": "v=0"}
        }))
    );

    bob.send(&ClientEvent::Signal {
        kind: SignalKind::IceCandidate,
        payload: json!({
            "to": alice.participant_id(),
            "candidate": {"candidate": "candidate:1 1 udp 1 127.0.0.1 9 typ host"}
        }),
    })
    .await?;
    alice.expect("ice-candidate").await?;

    Ok(())
}

#[tokio::test]
async fn test_malformed_signaling_is_dropped() -> Result<()> {
    let server = TestBrokerServer::spawn().await?;
    let (mut alice, mut bob) = paired_clients(&server).await?;

    // answer without its body
    alice
        .send(&ClientEvent::Signal {
            kind: SignalKind::Answer,
            payload: json!({"to": bob.participant_id()}),
        })
        .await?;
    bob.expect_silence(SILENCE).await?;

    // the connection survives
    alice.send(&ClientEvent::Like).await?;
    assert_eq!(bob.recv_notification().await?, ServerEvent::Like);

    Ok(())
}

#[tokio::test]
async fn test_garbage_frames_are_ignored() -> Result<()> {
    let server = TestBrokerServer::spawn().await?;
    let mut alice = WsTestClient::connect(&server).await?;

    alice.send_raw("not json").await?;
    alice.send_raw(r#"{"event":"teleport"}"#).await?;
    alice.send_binary(vec![0, 1, 2]).await?;
    alice.search().await?;

    let state = async {
        for _ in 0..50 {
            let state = server
                .broker()
                .participant_state(alice.participant_id())
                .await?;
            if state == ParticipantState::Searching {
                return Ok::<_, anyhow::Error>(state);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        anyhow::bail!("participant never started searching")
    }
    .await?;
    assert_eq!(state, ParticipantState::Searching);

    Ok(())
}

#[tokio::test]
async fn test_skip_notifies_peer_and_requeues_both() -> Result<()> {
    let server = TestBrokerServer::spawn().await?;
    let (mut alice, mut bob) = paired_clients(&server).await?;

    alice.send(&ClientEvent::Skip).await?;

    assert_eq!(bob.recv_notification().await?, ServerEvent::Skipped);
    alice.expect_silence(SILENCE).await?;
    eventually(&server, |s| s.queue_depth == 2 && s.pairings_active == 0).await
}

#[tokio::test]
async fn test_report_blocks_future_pairing() -> Result<()> {
    let server = TestBrokerServer::spawn().await?;
    let (mut alice, mut bob) = paired_clients(&server).await?;

    alice
        .send(&ClientEvent::Report {
            target: Some(bob.participant_id()),
        })
        .await?;
    assert_eq!(bob.recv_notification().await?, ServerEvent::Reported);

    // Alice waits in the queue; Bob searching again must not meet her.
    bob.search().await?;
    bob.expect_silence(SILENCE).await?;

    let status = server.broker().get_status().await?;
    assert_eq!(status.queue_depth, 2);
    assert_eq!(status.pairings_active, 0);
    assert_eq!(status.block_relations, 1);

    Ok(())
}

#[tokio::test]
async fn test_disconnect_cancels_peer() -> Result<()> {
    let server = TestBrokerServer::spawn().await?;
    let (alice, mut bob) = paired_clients(&server).await?;
    let bob_id = bob.participant_id();

    alice.close().await?;

    assert_eq!(bob.recv_notification().await?, ServerEvent::Cancelled);
    eventually(&server, |s| s.connections == 1 && s.queue_depth == 1).await?;

    let state = server.broker().participant_state(bob_id).await?;
    assert_eq!(state, ParticipantState::Searching);

    Ok(())
}

#[tokio::test]
async fn test_idle_connection_is_closed() -> Result<()> {
    let server = TestBrokerServer::spawn_with_settings(ConnectionSettings {
        ping_interval: Duration::from_millis(50),
        idle_timeout: Duration::from_millis(150),
        mailbox: 16,
    })
    .await?;

    let mut quiet = WsTestClient::connect(&server).await?;

    // Not reading means pings go unanswered
    tokio::time::sleep(Duration::from_millis(400)).await;

    let frame = quiet.wait_closed(Duration::from_secs(2)).await?;
    assert_eq!(frame.map(|f| u16::from(f.code)), Some(1001));
    eventually(&server, |s| s.connections == 0).await
}

#[tokio::test]
async fn test_shutdown_closes_connections_and_refuses_new_ones() -> Result<()> {
    let server = TestBrokerServer::spawn().await?;
    let mut alice = WsTestClient::connect(&server).await?;

    server.broker().shutdown().await?;

    let frame = alice.wait_closed(Duration::from_secs(2)).await?;
    assert_eq!(frame.map(|f| u16::from(f.code)), Some(1001));

    let status = WsTestClient::connect_refused(&server).await?;
    assert_eq!(status, 503);

    Ok(())
}

#[tokio::test]
async fn test_broker_cancel_sends_close_to_every_connection() -> Result<()> {
    let server = TestBrokerServer::spawn().await?;
    let mut clients = Vec::new();
    for _ in 0..4 {
        clients.push(WsTestClient::connect(&server).await?);
    }

    // Cancelling directly stops the broker actor at once, dropping every
    // connection mailbox alongside the cancellation.
    server.broker().cancel();

    for client in &mut clients {
        let frame = client.wait_closed(Duration::from_secs(3)).await?;
        assert_eq!(frame.map(|f| u16::from(f.code)), Some(1001));
    }
    Ok(())
}

#[tokio::test]
async fn test_close_frame_reaches_slow_readers() -> Result<()> {
    let server = TestBrokerServer::spawn_with_settings(ConnectionSettings {
        ping_interval: Duration::from_millis(50),
        idle_timeout: Duration::from_millis(150),
        mailbox: 16,
    })
    .await?;

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(WsTestClient::connect(&server).await?);
    }

    // Stay silent well past the idle close before reading anything.
    tokio::time::sleep(Duration::from_millis(600)).await;

    for client in &mut clients {
        let frame = client.wait_closed(Duration::from_secs(2)).await?;
        assert_eq!(frame.map(|f| u16::from(f.code)), Some(1001));
    }
    eventually(&server, |s| s.connections == 0).await
}

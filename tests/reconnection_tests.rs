/// Client reconnection tests
///
/// Run with: cargo test --test reconnection_tests

mod common;

use common::{marine, start_server, start_with, user};
use marinedb::{Command, MarineError, Reply, SessionState};
use std::time::Duration;

#[tokio::test]
async fn test_session_reconnects_and_reuses_credentials() {
    let first = start_server().await;
    let addr = first.addr();
    let store = first.store.clone();
    let gateway = first.gateway.clone();

    let mut alice = user(addr, "alice").await;
    alice.request(Command::Add(marine("before", 10))).await.unwrap();

    first.handle.shutdown().await.unwrap();
    let second = start_with(addr.port(), store, gateway).await;

    // The request in flight when the server went away is reported, not resent.
    let mut reply = None;
    for _ in 0..3 {
        match alice.request(Command::Add(marine("after", 20))).await {
            Ok(r) => {
                reply = Some(r);
                break;
            }
            Err(e) => assert!(matches!(e, MarineError::Connection(_)), "got {:?}", e),
        }
    }

    assert_eq!(reply, Some(Reply::Nothing));
    assert!(alice.reconnects() >= 1);
    assert_eq!(alice.state(), SessionState::Ready);
    assert_eq!(alice.login(), Some("alice"));
    assert_eq!(second.store.len().await, 2);
}

#[tokio::test]
async fn test_connect_waits_for_the_server() {
    let gone = start_server().await;
    let addr = gone.addr();
    gone.handle.shutdown().await.unwrap();

    let connecting = tokio::spawn(async move { common::connect(addr).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!connecting.is_finished());

    let _server = common::start_with(
        addr.port(),
        gone.store.clone(),
        gone.gateway.clone(),
    )
    .await;
    let session = connecting.await.unwrap();
    assert_eq!(session.state(), SessionState::Authenticating);
}

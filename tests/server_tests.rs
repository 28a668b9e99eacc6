/// End-to-end tests over a real listener
///
/// Run with: cargo test --test server_tests

mod common;

use common::{PASSWORD, connect, marine, start_server, user};
use marinedb::protocol::{Envelope, receive, send};
use marinedb::{Command, MarineError, MeleeWeapon, Reply, SessionState};
use marinedb::protocol::encode;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

fn heights(show: &Reply) -> Vec<i64> {
    let Reply::Text(json) = show else {
        panic!("show replied with {:?}", show);
    };
    let parsed: serde_json::Value = serde_json::from_str(json).unwrap();
    parsed
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["marine"]["height"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_register_then_authenticate() {
    let server = start_server().await;

    let mut first = connect(server.addr()).await;
    assert_eq!(first.state(), SessionState::Authenticating);
    assert!(first.is_login_free("alice").await.unwrap());
    first.register("alice", PASSWORD).await.unwrap();
    assert!(first.is_ready());
    assert_eq!(first.login(), Some("alice"));

    let mut second = connect(server.addr()).await;
    assert!(!second.is_login_free("alice").await.unwrap());
    assert!(!second.authenticate("alice", "wrong_pw").await.unwrap());
    assert!(!second.is_ready());
    assert!(second.authenticate("alice", PASSWORD).await.unwrap());
    assert!(second.is_ready());

    let mut third = connect(server.addr()).await;
    assert!(matches!(
        third.register("alice", "other_pw").await,
        Err(MarineError::Auth(_))
    ));
}

#[tokio::test]
async fn test_show_lists_records_in_height_order() {
    let server = start_server().await;
    let mut alice = user(server.addr(), "alice").await;

    for (name, height) in [("c", 30), ("a", 10), ("b", 20)] {
        let reply = alice.request(Command::Add(marine(name, height))).await.unwrap();
        assert_eq!(reply, Reply::Nothing);
    }

    let show = alice.request(Command::Show).await.unwrap();
    assert_eq!(heights(&show), vec![10, 20, 30]);
    assert_eq!(server.store.len().await, 3);
}

#[tokio::test]
async fn test_foreign_records_are_untouchable() {
    let server = start_server().await;
    let mut alice = user(server.addr(), "alice").await;
    let mut bob = user(server.addr(), "bob").await;

    alice.request(Command::Add(marine("mine", 10))).await.unwrap();
    let id = server.store.ids().await[0];

    assert_eq!(bob.request(Command::RemoveById(id)).await.unwrap(), Reply::Nothing);
    assert_eq!(bob.request(Command::RemoveHead).await.unwrap(), Reply::Nothing);
    bob.request(Command::Update {
        id,
        marine: marine("stolen", 99),
    })
    .await
    .unwrap();
    bob.request(Command::Clear).await.unwrap();

    let record = server.store.get(id).await.unwrap();
    assert_eq!(record.owner, "alice");
    assert_eq!(record.marine.name, "mine");

    match alice.request(Command::RemoveHead).await.unwrap() {
        Reply::Owned(removed) => assert_eq!(removed.id(), id),
        other => panic!("expected the removed head, got {:?}", other),
    }
    assert!(server.store.is_empty().await);
}

#[tokio::test]
async fn test_add_if_min_and_remove_greater() {
    let server = start_server().await;
    let mut alice = user(server.addr(), "alice").await;

    alice.request(Command::Add(marine("base", 50))).await.unwrap();
    alice.request(Command::AddIfMin(marine("taller", 60))).await.unwrap();
    alice.request(Command::AddIfMin(marine("shorter", 40))).await.unwrap();
    assert_eq!(
        heights(&alice.request(Command::Show).await.unwrap()),
        vec![40, 50]
    );

    alice.request(Command::RemoveGreater(marine("pivot", 45))).await.unwrap();
    assert_eq!(
        heights(&alice.request(Command::Show).await.unwrap()),
        vec![40]
    );
}

#[tokio::test]
async fn test_aggregates() {
    let server = start_server().await;
    let mut alice = user(server.addr(), "alice").await;

    assert_eq!(
        alice.request(Command::AverageOfHeight).await.unwrap(),
        Reply::Text("The average value of the height: 0.".into())
    );

    alice.request(Command::Add(marine("a", 10))).await.unwrap();
    let mut axe = marine("b", 20);
    axe.melee_weapon = MeleeWeapon::ChainAxe;
    alice.request(Command::Add(axe)).await.unwrap();

    assert_eq!(
        alice.request(Command::AverageOfHeight).await.unwrap(),
        Reply::Text("The average value of the height: 15.0.".into())
    );
    assert_eq!(
        alice
            .request(Command::CountGreaterThan(MeleeWeapon::PowerSword))
            .await
            .unwrap(),
        Reply::Text(
            "1 queue's elements have the value \"Melee Weapon\", greater than the given value."
                .into()
        )
    );

    let Reply::Text(info) = alice.request(Command::Info).await.unwrap() else {
        panic!("info must be text");
    };
    assert!(info.starts_with("collectionType: PriorityQueue<SpaceMarine>, createTime: "));
    assert!(info.ends_with("length: 2."));
}

#[tokio::test]
async fn test_update_replaces_id_and_keeps_owner() {
    let server = start_server().await;
    let mut alice = user(server.addr(), "alice").await;

    alice.request(Command::Add(marine("old", 10))).await.unwrap();
    let old_id = server.store.ids().await[0];

    alice
        .request(Command::Update {
            id: old_id,
            marine: marine("new", 12),
        })
        .await
        .unwrap();

    let ids = server.store.ids().await;
    assert_eq!(ids.len(), 1);
    assert_ne!(ids[0], old_id);
    let record = server.store.get(ids[0]).await.unwrap();
    assert_eq!(record.marine.name, "new");
    assert_eq!(record.owner, "alice");
}

#[tokio::test]
async fn test_undecodable_frame_is_dropped_and_connection_survives() {
    let server = start_server().await;
    let mut raw = TcpStream::connect(server.addr()).await.unwrap();

    // 0xc1 is never valid MessagePack.
    raw.write_all(&[0, 0, 0, 1, 0xc1]).await.unwrap();
    raw.flush().await.unwrap();

    send(&mut raw, &Envelope::login_check("alice")).await.unwrap();
    let reply: Reply = receive(&mut raw).await.unwrap();
    assert_eq!(reply, Reply::Bool(true));
    assert!(server.handle.metrics().protocol_failures >= 1);
}

#[tokio::test]
async fn test_stalled_partial_frame_does_not_block_other_clients() {
    let server = start_server().await;
    let mut stalled = TcpStream::connect(server.addr()).await.unwrap();
    stalled.write_all(&[0, 0]).await.unwrap();
    stalled.flush().await.unwrap();
    sleep(Duration::from_millis(50)).await;

    let served = timeout(Duration::from_secs(3), async {
        let mut session = connect(server.addr()).await;
        session.is_login_free("alice").await
    })
    .await
    .expect("a half-sent header stalled the server");
    assert!(served.unwrap());
}

#[tokio::test]
async fn test_frame_split_across_writes_is_served() {
    let server = start_server().await;
    let mut raw = TcpStream::connect(server.addr()).await.unwrap();
    let frame = encode(&Envelope::login_check("alice")).unwrap();

    let (head, tail) = frame.split_at(frame.len() / 2);
    raw.write_all(head).await.unwrap();
    raw.flush().await.unwrap();
    sleep(Duration::from_millis(50)).await;

    let mut alice = user(server.addr(), "alice").await;
    assert!(heights(&alice.request(Command::Show).await.unwrap()).is_empty());

    raw.write_all(tail).await.unwrap();
    let reply: Reply = timeout(Duration::from_secs(3), receive(&mut raw))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, Reply::Bool(false));
    assert_eq!(server.handle.metrics().protocol_failures, 0);
}

#[tokio::test]
async fn test_command_with_unknown_credentials_is_refused() {
    let server = start_server().await;
    let mut raw = TcpStream::connect(server.addr()).await.unwrap();

    send(&mut raw, &Envelope::command(Command::Clear, "ghost", PASSWORD))
        .await
        .unwrap();
    let reply: Reply = receive(&mut raw).await.unwrap();
    assert!(matches!(reply, Reply::Fault(_)));
    assert_eq!(server.handle.metrics().auth_failures, 1);
}

#[tokio::test]
async fn test_invalid_record_is_a_fault() {
    let server = start_server().await;
    let mut alice = user(server.addr(), "alice").await;

    let reply = alice.request(Command::Add(marine("", 10))).await.unwrap();
    assert!(matches!(reply, Reply::Fault(_)));
    assert!(server.store.is_empty().await);
    assert_eq!(server.handle.metrics().execution_faults, 1);
}

#[tokio::test]
async fn test_shutdown_stops_the_server() {
    let server = start_server().await;
    let addr = server.addr();
    let _alice = user(addr, "alice").await;

    let metrics = server.handle.metrics();
    assert_eq!(metrics.connections_accepted, 1);

    server.handle.shutdown().await.unwrap();
    assert!(TcpStream::connect(addr).await.is_err());
}

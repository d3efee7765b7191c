//! Raft layer tests: replicated determinism, snapshot round-trips, durable
//! log storage, and a single-node cluster end to end.

use std::sync::Arc;
use std::time::Duration;

use openraft::storage::{RaftLogStorage, RaftStateMachine};
use openraft::testing::log_id;
use openraft::{Entry, EntryPayload, RaftLogReader, RaftSnapshotBuilder, Vote};
use tempfile::TempDir;

use super::{LogStore, Node, RaftNode, SnapshotStore, StateMachine, TypeConfig};
use crate::protocol::{Code, Command, CommandResult, Message, QueueConfig};
use crate::queue::QueueManager;

fn entry(index: u64, command: Command) -> Entry<TypeConfig> {
    Entry {
        log_id: log_id(1, 0, index),
        payload: EntryPayload::Normal(command),
    }
}

fn machine(dir: &TempDir) -> (StateMachine, Arc<QueueManager>) {
    let manager = QueueManager::new();
    let snapshots = Arc::new(SnapshotStore::new(dir.path()).unwrap());
    (StateMachine::new(manager.clone(), snapshots), manager)
}

fn stamped(id: &str, body: &str) -> Message {
    let mut message = Message::new(id, body);
    message.timestamp = 1_700_000_000_000;
    message
}

/// Create + send + peek + pop + peek, checking each applied result.
#[tokio::test]
async fn apply_drives_the_queue_manager() {
    let dir = TempDir::new().unwrap();
    let (mut sm, _) = machine(&dir);
    let id = QueueManager::queue_id("A");

    let replies = sm
        .apply(vec![
            entry(1, Command::create_queue(QueueConfig::named("A"))),
            entry(2, Command::send_message(&id, stamped("m1", "hi"))),
            entry(3, Command::peek_message(&id)),
            entry(4, Command::pop_message(&id)),
            entry(5, Command::peek_message(&id)),
        ])
        .await
        .unwrap();

    assert_eq!(replies[0], CommandResult::Code(Code::Ok));
    assert_eq!(replies[1].result_code(), Code::Ok);
    match &replies[2] {
        CommandResult::Response(resp) => {
            assert_eq!(resp.code, Code::Ok);
            assert_eq!(resp.message.as_ref().unwrap().id, "m1");
        }
        other => panic!("unexpected peek reply: {other:?}"),
    }
    assert_eq!(replies[3].result_code(), Code::Ok);
    assert_eq!(replies[4].result_code(), Code::EmptyQueue);
}

/// Two replicas applying the same committed prefix hold equal state, peeks
/// and dead-letter moves included.
#[tokio::test]
async fn replicas_applying_same_log_are_equal() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let (mut replica_a, manager_a) = machine(&dir_a);
    let (mut replica_b, manager_b) = machine(&dir_b);
    let id = QueueManager::queue_id("A");

    let mut log = vec![entry(1, Command::create_queue(QueueConfig::named("A")))];
    for i in 0..5 {
        log.push(entry(
            2 + i,
            Command::send_message(&id, stamped(&format!("m{i}"), "payload")),
        ));
    }
    // Three peeks banish m0; one requeue brings it back to the tail.
    for i in 0..3 {
        log.push(entry(7 + i, Command::peek_message(&id)));
    }
    log.push(entry(10, Command::requeue(&id)));
    log.push(entry(11, Command::pop_message(&id)));

    replica_a.apply(log.clone()).await.unwrap();
    replica_b.apply(log).await.unwrap();

    let state_a = manager_a.snapshot_all().await;
    let state_b = manager_b.snapshot_all().await;
    assert_eq!(state_a, state_b);

    let ids: Vec<_> = state_a[&id].messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["m2", "m3", "m4", "m0"]);
    assert!(state_a[&id].dead_letter.is_empty());
}

#[tokio::test]
async fn view_queue_returns_the_message_list() {
    let dir = TempDir::new().unwrap();
    let (mut sm, _) = machine(&dir);
    let id = QueueManager::queue_id("A");

    let replies = sm
        .apply(vec![
            entry(1, Command::create_queue(QueueConfig::named("A"))),
            entry(2, Command::send_message(&id, stamped("m1", "a"))),
            entry(3, Command::send_message(&id, stamped("m2", "b"))),
            entry(4, Command::view_queue(&id)),
        ])
        .await
        .unwrap();

    match &replies[3] {
        CommandResult::Queue { code, messages } => {
            assert_eq!(*code, Code::Ok);
            let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
            assert_eq!(ids, ["m1", "m2"]);
        }
        other => panic!("unexpected view reply: {other:?}"),
    }
}

/// A structurally incomplete command must not poison a replica.
#[tokio::test]
async fn incomplete_commands_apply_as_not_found() {
    let dir = TempDir::new().unwrap();
    let (mut sm, manager) = machine(&dir);

    let bare = Command {
        command_type: crate::protocol::CommandType::CreateQueue,
        queue_id: None,
        message: None,
        queue_config: None,
    };
    let send_without_message = Command {
        command_type: crate::protocol::CommandType::SendMessage,
        queue_id: Some("queue-A".into()),
        message: None,
        queue_config: None,
    };

    let replies = sm
        .apply(vec![entry(1, bare), entry(2, send_without_message)])
        .await
        .unwrap();

    assert_eq!(replies[0], CommandResult::Code(Code::QueueNotFound));
    assert_eq!(replies[1], CommandResult::Code(Code::QueueNotFound));
    assert_eq!(manager.queue_count().await, 0);
}

/// Snapshot built on one replica and installed on a fresh one reproduces
/// per-queue state, with the receive counter starting over.
#[tokio::test]
async fn snapshot_transfers_state_between_replicas() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let (mut source, source_manager) = machine(&dir_a);
    let (mut target, target_manager) = machine(&dir_b);
    let id = QueueManager::queue_id("A");

    let mut log = vec![entry(1, Command::create_queue(QueueConfig::named("A")))];
    for i in 0..100 {
        log.push(entry(
            2 + i,
            Command::send_message(&id, stamped(&format!("m{i}"), "payload")),
        ));
    }
    source.apply(log).await.unwrap();

    let snapshot = source.build_snapshot().await.unwrap();
    target
        .install_snapshot(&snapshot.meta, snapshot.snapshot)
        .await
        .unwrap();

    assert_eq!(
        source_manager.snapshot_all().await,
        target_manager.snapshot_all().await
    );

    // Both replicas peek the same first message.
    let source_head = source_manager.peek_message(&id).await.message.unwrap();
    let target_head = target_manager.peek_message(&id).await.message.unwrap();
    assert_eq!(source_head.id, "m0");
    assert_eq!(target_head.id, "m0");
}

#[tokio::test]
async fn snapshot_store_round_trip_and_reap() {
    let dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(dir.path()).unwrap();

    let old = super::SnapshotData::new(
        openraft::SnapshotMeta {
            last_log_id: Some(log_id(1, 0, 3)),
            last_membership: Default::default(),
            snapshot_id: "100_1_3".to_string(),
        },
        b"{}".to_vec(),
    );
    let new = super::SnapshotData::new(
        openraft::SnapshotMeta {
            last_log_id: Some(log_id(1, 0, 9)),
            last_membership: Default::default(),
            snapshot_id: "200_1_9".to_string(),
        },
        br#"{"queue-A":null}"#.to_vec(),
    );

    store.save(&old).await.unwrap();
    store.save(&new).await.unwrap();

    let (_, current) = store.load_current().await.unwrap().unwrap();
    assert_eq!(current.meta.snapshot_id, "200_1_9");
    assert_eq!(current.queues, new.queues);

    store.reap_older_than("200_1_9").await.unwrap();
    let (_, current) = store.load_current().await.unwrap().unwrap();
    assert_eq!(current.meta.snapshot_id, "200_1_9");

    let remaining = std::fs::read_dir(dir.path().join("snapshots")).unwrap().count();
    assert_eq!(remaining, 1);
}

#[tokio::test]
async fn log_store_persists_votes_and_entries() {
    let dir = TempDir::new().unwrap();
    let mut store = LogStore::open(dir.path()).unwrap();

    assert!(store.read_vote().await.unwrap().is_none());
    let vote = Vote::new(2, 1);
    store.save_vote(&vote).await.unwrap();
    assert_eq!(store.read_vote().await.unwrap(), Some(vote));

    let entries: Vec<Entry<TypeConfig>> = (1..=5)
        .map(|i| entry(i, Command::peek_message("queue-A")))
        .collect();
    store.put_entries(entries).await.unwrap();

    let state = store.get_log_state().await.unwrap();
    assert_eq!(state.last_log_id, Some(log_id(1, 0, 5)));
    assert_eq!(state.last_purged_log_id, None);

    let read = store.try_get_log_entries(2..=4).await.unwrap();
    let indexes: Vec<_> = read.iter().map(|e| e.log_id.index).collect();
    assert_eq!(indexes, [2, 3, 4]);

    store.truncate(log_id(1, 0, 4)).await.unwrap();
    let state = store.get_log_state().await.unwrap();
    assert_eq!(state.last_log_id, Some(log_id(1, 0, 3)));

    store.purge(log_id(1, 0, 2)).await.unwrap();
    let state = store.get_log_state().await.unwrap();
    assert_eq!(state.last_purged_log_id, Some(log_id(1, 0, 2)));
    let read = store.try_get_log_entries(0..).await.unwrap();
    let indexes: Vec<_> = read.iter().map(|e| e.log_id.index).collect();
    assert_eq!(indexes, [3]);
}

/// Full single-node cluster: bootstrap, elect, apply through consensus.
#[tokio::test]
async fn single_node_cluster_applies_commands() {
    let dir = TempDir::new().unwrap();
    let manager = QueueManager::new();
    let node = Node::new("127.0.0.1", 21000, 21001);

    let raft = RaftNode::new(1, node, dir.path(), manager.clone(), true)
        .await
        .unwrap();
    raft.wait_until_leader(Duration::from_secs(10)).await.unwrap();
    assert!(raft.is_leader().await);

    let id = QueueManager::queue_id("A");
    let result = raft
        .apply(Command::create_queue(QueueConfig::named("A")))
        .await
        .unwrap();
    assert_eq!(result, CommandResult::Code(Code::Ok));

    let result = raft
        .apply(Command::send_message(&id, stamped("m1", "hi")))
        .await
        .unwrap();
    assert_eq!(result.result_code(), Code::Ok);

    let result = raft.apply(Command::peek_message(&id)).await.unwrap();
    match result {
        CommandResult::Response(resp) => assert_eq!(resp.message.unwrap().id, "m1"),
        other => panic!("unexpected peek result: {other:?}"),
    }

    let (leader_id, leader_node) = raft.leader().await.unwrap();
    assert_eq!(leader_id, 1);
    assert_eq!(leader_node.api_addr(), "127.0.0.1:21001");

    raft.shutdown().await;
}

/// Three-node cluster: replicate a message, kill the leader, and peek it on
/// the newly elected leader.
#[tokio::test(flavor = "multi_thread")]
async fn three_node_cluster_survives_leader_failure() {
    let mut dirs = Vec::new();
    let mut rafts = Vec::new();
    let mut servers = Vec::new();
    let mut managers = Vec::new();

    for i in 1..=3u64 {
        let dir = TempDir::new().unwrap();
        let manager = QueueManager::new();
        let node = Node::new("127.0.0.1", 24100 + i as u16, 24200 + i as u16);

        let raft = RaftNode::new(i, node.clone(), dir.path(), manager.clone(), i == 1)
            .await
            .unwrap();

        let listener = tokio::net::TcpListener::bind(node.raft_addr()).await.unwrap();
        let router = crate::http::create_raft_router(raft.clone());
        servers.push(tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        }));

        dirs.push(dir);
        managers.push(manager);
        rafts.push(raft);
    }

    rafts[0]
        .wait_until_leader(Duration::from_secs(10))
        .await
        .unwrap();
    for i in 2..=3u64 {
        let node = Node::new("127.0.0.1", 24100 + i as u16, 24200 + i as u16);
        rafts[0].add_voter(i, node).await.unwrap();
    }

    let id = QueueManager::queue_id("A");
    rafts[0]
        .apply(Command::create_queue(QueueConfig::named("A")))
        .await
        .unwrap();
    rafts[0]
        .apply(Command::send_message(&id, stamped("m1", "replicated")))
        .await
        .unwrap();

    // Followers apply on commit notification; give replication a moment.
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        let mut caught_up = true;
        for manager in &managers[1..] {
            let snapshot = manager.snapshot_all().await;
            if snapshot.get(&id).map(|q| q.messages.len()) != Some(1) {
                caught_up = false;
            }
        }
        if caught_up {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "followers never caught up"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // A follower never serves queue traffic: it answers 307 with the
    // leader's HTTP address.
    {
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use http_body_util::BodyExt;
        use tower::ServiceExt;

        let follower_app = crate::http::create_router(rafts[1].clone());
        let response = follower_app
            .oneshot(
                Request::get(format!("/peekMessage?queueID={id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(text, "Not the leader. Current leader: 127.0.0.1:24201");
    }

    // Kill the leader.
    servers[0].abort();
    rafts[0].shutdown().await;

    // One of the survivors wins the election.
    let deadline = std::time::Instant::now() + Duration::from_secs(30);
    let new_leader = loop {
        let mut elected = None;
        for raft in &rafts[1..] {
            if raft.is_leader().await {
                elected = Some(raft.clone());
            }
        }
        if let Some(leader) = elected {
            break leader;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "no leader elected after failover"
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
    };

    // The replicated message is still there. A fresh election can race the
    // first writes, so retry while leadership settles.
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    let resp = loop {
        match new_leader.apply(Command::peek_message(&id)).await {
            Ok(CommandResult::Response(resp)) => break resp,
            Ok(other) => panic!("unexpected peek result: {other:?}"),
            Err(_) if std::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Err(err) => panic!("peek after failover kept failing: {err}"),
        }
    };
    assert_eq!(resp.code, Code::Ok);
    assert_eq!(resp.message.unwrap().id, "m1");

    for raft in &rafts[1..] {
        raft.shutdown().await;
    }
    for server in servers {
        server.abort();
    }
}

/// Restarting from the same data dir replays the log into a fresh manager.
#[tokio::test]
async fn restart_recovers_from_the_log() {
    let dir = TempDir::new().unwrap();
    let id = QueueManager::queue_id("A");

    {
        let manager = QueueManager::new();
        let node = Node::new("127.0.0.1", 21010, 21011);
        let raft = RaftNode::new(1, node, dir.path(), manager.clone(), true)
            .await
            .unwrap();
        raft.wait_until_leader(Duration::from_secs(10)).await.unwrap();

        raft.apply(Command::create_queue(QueueConfig::named("A")))
            .await
            .unwrap();
        raft.apply(Command::send_message(&id, stamped("m1", "durable")))
            .await
            .unwrap();
        raft.shutdown().await;
    }

    let manager = QueueManager::new();
    let node = Node::new("127.0.0.1", 21010, 21011);
    let raft = RaftNode::new(1, node, dir.path(), manager.clone(), true)
        .await
        .unwrap();
    raft.wait_until_leader(Duration::from_secs(10)).await.unwrap();

    let result = raft.apply(Command::peek_message(&id)).await.unwrap();
    match result {
        CommandResult::Response(resp) => {
            assert_eq!(resp.code, Code::Ok);
            assert_eq!(resp.message.unwrap().id, "m1");
        }
        other => panic!("unexpected peek result: {other:?}"),
    }

    raft.shutdown().await;
}

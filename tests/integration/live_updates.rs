//! Live update broadcasting through the server's project channels.
//!
//! Uses `ChannelClient` directly as a `LiveFeed` to check event order,
//! kind filtering, channel authorization, and per-project scoping.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use taskboard::gateway::{LiveFeed, PersistenceGateway};
use taskboard::session::Session;
use taskboard::transport::ChannelClient;
use taskboard::transport::channel::DEFAULT_CONNECT_TIMEOUT;
use taskboard_proto::event::{EventKind, LiveUpdate, LiveUpdateEvent};
use taskboard_proto::task::{ProjectId, TaskDraft, TaskPatch, TaskStatus, UserId};
use taskboard_proto::wire::GatewayError;

async fn start_server() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = taskboard_server::server::start_server("127.0.0.1:0")
        .await
        .expect("failed to start taskboard server");
    (format!("ws://{addr}/ws"), handle)
}

async fn login(url: &str, email: &str) -> ChannelClient {
    let session = Session::new(UserId::new(), email, url);
    ChannelClient::connect(&session, DEFAULT_CONNECT_TIMEOUT)
        .await
        .unwrap()
}

/// Records every event delivered to a handler.
fn record(feed: &ChannelClient, kind: Option<EventKind>) -> Arc<Mutex<Vec<LiveUpdateEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    feed.subscribe(kind, move |event| sink.lock().push(event.clone()));
    seen
}

async fn wait_for(seen: &Mutex<Vec<LiveUpdateEvent>>, count: usize) -> Vec<LiveUpdateEvent> {
    for _ in 0..100 {
        if seen.lock().len() >= count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    seen.lock().clone()
}

async fn shared_project(url: &str) -> (ChannelClient, ChannelClient, ProjectId) {
    let alice = login(url, "alice@example.com").await;
    let bob = login(url, "bob@example.com").await;
    let project_id = alice.create_project("Launch").await.unwrap();
    alice
        .invite_member(project_id, "bob@example.com")
        .await
        .unwrap();
    (alice, bob, project_id)
}

#[tokio::test]
async fn member_sees_mutations_in_order() {
    let (url, _handle) = start_server().await;
    let (alice, bob, project_id) = shared_project(&url).await;
    bob.join(project_id).await.unwrap();
    let seen = record(&bob, None);

    let task = alice
        .create_task(TaskDraft::new(project_id, "Write docs"))
        .await
        .unwrap();
    alice
        .update_task(task.id, TaskPatch::status(TaskStatus::Done))
        .await
        .unwrap();
    alice.delete_task(task.id).await.unwrap();

    let events = wait_for(&seen, 3).await;
    let kinds: Vec<EventKind> = events.iter().map(LiveUpdateEvent::kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::TaskCreated, EventKind::TaskUpdated, EventKind::TaskDeleted]
    );
    assert!(events.iter().all(|e| e.project_id == project_id));
    match &events[1].update {
        LiveUpdate::TaskUpdated(record) => {
            assert_eq!(record.id, task.id);
            assert_eq!(record.status, "done");
        }
        other => panic!("expected TaskUpdated, got {other:?}"),
    }
    assert_eq!(events[2].update, LiveUpdate::TaskDeleted(task.id));
}

#[tokio::test]
async fn originator_receives_its_own_event_first() {
    let (url, _handle) = start_server().await;
    let alice = login(&url, "alice@example.com").await;
    let project_id = alice.create_project("Solo").await.unwrap();
    alice.join(project_id).await.unwrap();
    let seen = record(&alice, Some(EventKind::TaskCreated));

    let task = alice
        .create_task(TaskDraft::new(project_id, "Mine"))
        .await
        .unwrap();

    let events = seen.lock().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].update.task_id(), task.id);
}

#[tokio::test]
async fn kind_filter_limits_delivery() {
    let (url, _handle) = start_server().await;
    let (alice, bob, project_id) = shared_project(&url).await;
    bob.join(project_id).await.unwrap();
    let deletes = record(&bob, Some(EventKind::TaskDeleted));
    let everything = record(&bob, None);

    let task = alice
        .create_task(TaskDraft::new(project_id, "Brief"))
        .await
        .unwrap();
    alice.delete_task(task.id).await.unwrap();

    assert_eq!(wait_for(&everything, 2).await.len(), 2);
    let deletes = deletes.lock().clone();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].kind(), EventKind::TaskDeleted);
}

#[tokio::test]
async fn joining_requires_membership() {
    let (url, _handle) = start_server().await;
    let alice = login(&url, "alice@example.com").await;
    let carol = login(&url, "carol@example.com").await;
    let project_id = alice.create_project("Private").await.unwrap();

    assert_eq!(carol.join(project_id).await, Err(GatewayError::Unauthorized));

    alice
        .invite_member(project_id, "carol@example.com")
        .await
        .unwrap();
    carol.join(project_id).await.unwrap();
    let seen = record(&carol, None);
    alice
        .create_task(TaskDraft::new(project_id, "Welcome"))
        .await
        .unwrap();
    assert_eq!(wait_for(&seen, 1).await.len(), 1);
}

#[tokio::test]
async fn events_stay_within_their_project() {
    let (url, _handle) = start_server().await;
    let (alice, bob, shared) = shared_project(&url).await;
    let private = alice.create_project("Alice only").await.unwrap();
    alice.join(private).await.unwrap();
    bob.join(shared).await.unwrap();
    let bob_seen = record(&bob, None);

    alice
        .create_task(TaskDraft::new(private, "Secret"))
        .await
        .unwrap();
    alice
        .create_task(TaskDraft::new(shared, "Public"))
        .await
        .unwrap();

    // The shared event is published after the private one.
    let events = wait_for(&bob_seen, 1).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].project_id, shared);
}

#[tokio::test]
async fn leave_stops_delivery_for_that_project_only() {
    let (url, _handle) = start_server().await;
    let alice = login(&url, "alice@example.com").await;
    let first = alice.create_project("First").await.unwrap();
    let second = alice.create_project("Second").await.unwrap();
    alice.join(first).await.unwrap();
    alice.join(second).await.unwrap();
    alice.leave(first).await.unwrap();
    let seen = record(&alice, None);

    alice
        .create_task(TaskDraft::new(first, "Quiet"))
        .await
        .unwrap();
    alice
        .create_task(TaskDraft::new(second, "Loud"))
        .await
        .unwrap();

    let events = seen.lock().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].project_id, second);
}

#[tokio::test]
async fn failed_mutation_publishes_nothing() {
    let (url, _handle) = start_server().await;
    let (alice, bob, project_id) = shared_project(&url).await;
    bob.join(project_id).await.unwrap();
    let seen = record(&bob, None);

    let result = alice.create_task(TaskDraft::new(project_id, "   ")).await;
    assert!(matches!(result, Err(GatewayError::ValidationFailed(_))));
    alice
        .create_task(TaskDraft::new(project_id, "Valid"))
        .await
        .unwrap();

    let events = wait_for(&seen, 1).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), EventKind::TaskCreated);
}

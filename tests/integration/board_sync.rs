//! End-to-end board synchronization through an in-process server.
//!
//! Two or three users share a project; each runs a `BoardSync` attached to
//! its own `ChannelClient`. Covers optimistic moves, live propagation,
//! deletion races, and project isolation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use taskboard::board::{BoardError, BoardView, MoveOutcome};
use taskboard::session::Session;
use taskboard::sync::BoardSync;
use taskboard::transport::ChannelClient;
use taskboard::transport::channel::DEFAULT_CONNECT_TIMEOUT;
use taskboard_proto::task::{ProjectId, TaskDraft, TaskId, TaskStatus, UserId};
use taskboard_proto::wire::GatewayError;

/// Start the server in-process and return a ws:// URL.
async fn start_server() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = taskboard_server::server::start_server("127.0.0.1:0")
        .await
        .expect("failed to start taskboard server");
    (format!("ws://{addr}/ws"), handle)
}

async fn login(url: &str, email: &str) -> (Session, Arc<ChannelClient>) {
    let session = Session::new(UserId::new(), email, url);
    let client = ChannelClient::connect(&session, DEFAULT_CONNECT_TIMEOUT)
        .await
        .unwrap();
    (session, Arc::new(client))
}

/// A loaded board attached to its client's live feed.
async fn open_board(
    session: &Session,
    client: &Arc<ChannelClient>,
    project_id: ProjectId,
) -> Arc<BoardSync<ChannelClient>> {
    let board = Arc::new(BoardSync::new(session, project_id, Arc::clone(client)));
    board.attach(&**client).await.unwrap();
    board.load().await.unwrap();
    board
}

/// Polls `check` against the board until it holds or two seconds pass.
async fn eventually(
    board: &BoardSync<ChannelClient>,
    check: impl Fn(&BoardView) -> bool,
) -> bool {
    for _ in 0..100 {
        if board.view().as_ref().is_some_and(&check) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

fn status_of(view: &BoardView, task_id: TaskId) -> Option<TaskStatus> {
    view.locate(task_id).map(|(status, _)| status)
}

/// Alice owns a project that Bob is a member of.
struct Team {
    _server: tokio::task::JoinHandle<()>,
    url: String,
    project_id: ProjectId,
    alice: (Session, Arc<ChannelClient>),
    bob: (Session, Arc<ChannelClient>),
}

async fn team() -> Team {
    let (url, server) = start_server().await;
    let alice = login(&url, "alice@example.com").await;
    let bob = login(&url, "bob@example.com").await;
    let project_id = alice.1.create_project("Launch").await.unwrap();
    alice
        .1
        .invite_member(project_id, "bob@example.com")
        .await
        .unwrap();
    Team {
        _server: server,
        url,
        project_id,
        alice,
        bob,
    }
}

#[tokio::test]
async fn created_task_appears_once_on_every_board() {
    let team = team().await;
    let alice_board = open_board(&team.alice.0, &team.alice.1, team.project_id).await;
    let bob_board = open_board(&team.bob.0, &team.bob.1, team.project_id).await;

    let task = alice_board
        .submit_create(TaskDraft::new(team.project_id, "Write docs"))
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Todo);

    let alice_view = alice_board.view().unwrap();
    assert_eq!(alice_view.len(), 1);
    assert_eq!(alice_view.column(TaskStatus::Todo)[0].id, task.id);

    assert!(eventually(&bob_board, |v| v.contains(task.id)).await);
    assert_eq!(bob_board.view().unwrap().len(), 1);
}

#[tokio::test]
async fn move_persists_and_reaches_other_member() {
    let team = team().await;
    let alice_board = open_board(&team.alice.0, &team.alice.1, team.project_id).await;
    let bob_board = open_board(&team.bob.0, &team.bob.1, team.project_id).await;

    let task = alice_board
        .submit_create(TaskDraft::new(team.project_id, "Ship it"))
        .await
        .unwrap();
    assert!(eventually(&bob_board, |v| v.contains(task.id)).await);

    let outcome = alice_board
        .submit_status_change(task.id, "in_progress")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        MoveOutcome::Moved {
            task_id: task.id,
            from: TaskStatus::Todo,
            to: TaskStatus::InProgress,
        }
    );
    assert_eq!(alice_board.pending_moves(), 0);
    assert_eq!(
        status_of(&alice_board.view().unwrap(), task.id),
        Some(TaskStatus::InProgress)
    );

    assert!(
        eventually(&bob_board, |v| status_of(v, task.id) == Some(TaskStatus::InProgress)).await
    );

    // A fresh load agrees with the live-updated board.
    let reloaded = bob_board.load().await.unwrap();
    assert_eq!(status_of(&reloaded, task.id), Some(TaskStatus::InProgress));
    assert!(reloaded.is_partitioned());
    assert!(reloaded.is_coherent());
}

#[tokio::test]
async fn drop_over_task_inserts_before_it() {
    let team = team().await;
    let board = open_board(&team.alice.0, &team.alice.1, team.project_id).await;

    let mut first = TaskDraft::new(team.project_id, "First");
    first.status = Some(TaskStatus::Done);
    let first = board.submit_create(first).await.unwrap();
    let mut second = TaskDraft::new(team.project_id, "Second");
    second.status = Some(TaskStatus::Done);
    let second = board.submit_create(second).await.unwrap();
    let mover = board
        .submit_create(TaskDraft::new(team.project_id, "Mover"))
        .await
        .unwrap();

    board
        .submit_drop(mover.id, &second.id.to_string())
        .await
        .unwrap();

    let view = board.view().unwrap();
    let done: Vec<TaskId> = view.column(TaskStatus::Done).iter().map(|t| t.id).collect();
    assert_eq!(done, vec![first.id, mover.id, second.id]);
    assert!(view.column(TaskStatus::Todo).is_empty());
}

#[tokio::test]
async fn unknown_column_changes_nothing() {
    let team = team().await;
    let board = open_board(&team.alice.0, &team.alice.1, team.project_id).await;
    let task = board
        .submit_create(TaskDraft::new(team.project_id, "Stay put"))
        .await
        .unwrap();
    let before = board.view().unwrap();

    let result = board.submit_status_change(task.id, "archived").await;
    assert!(matches!(result, Err(BoardError::Move(_))));
    assert_eq!(board.view().unwrap(), before);
}

#[tokio::test]
async fn move_of_task_deleted_elsewhere_removes_it() {
    let team = team().await;
    let alice_board = open_board(&team.alice.0, &team.alice.1, team.project_id).await;
    let task = alice_board
        .submit_create(TaskDraft::new(team.project_id, "Short-lived"))
        .await
        .unwrap();

    // Bob's board is loaded but not attached, so it misses the delete.
    let bob_board = Arc::new(BoardSync::new(
        &team.bob.0,
        team.project_id,
        Arc::clone(&team.bob.1),
    ));
    bob_board.load().await.unwrap();
    alice_board.submit_delete(task.id).await.unwrap();
    assert!(bob_board.view().unwrap().contains(task.id));

    let result = bob_board.submit_status_change(task.id, "done").await;
    let err = result.unwrap_err();
    assert!(matches!(err.gateway_error(), Some(GatewayError::NotFound(_))));
    assert!(!bob_board.view().unwrap().contains(task.id));
    assert_eq!(bob_board.pending_moves(), 0);
}

#[tokio::test]
async fn delete_propagates() {
    let team = team().await;
    let alice_board = open_board(&team.alice.0, &team.alice.1, team.project_id).await;
    let bob_board = open_board(&team.bob.0, &team.bob.1, team.project_id).await;

    let task = alice_board
        .submit_create(TaskDraft::new(team.project_id, "Remove me"))
        .await
        .unwrap();
    assert!(eventually(&bob_board, |v| v.contains(task.id)).await);

    bob_board.submit_delete(task.id).await.unwrap();
    assert!(!bob_board.view().unwrap().contains(task.id));
    assert!(eventually(&alice_board, |v| !v.contains(task.id)).await);

    // Deleting again reports the miss but leaves the board alone.
    let err = alice_board.submit_delete(task.id).await.unwrap_err();
    assert!(matches!(err.gateway_error(), Some(GatewayError::NotFound(_))));
    assert!(alice_board.view().unwrap().is_empty());
}

#[tokio::test]
async fn competing_moves_converge_to_last_write() {
    let team = team().await;
    let alice_board = open_board(&team.alice.0, &team.alice.1, team.project_id).await;
    let bob_board = open_board(&team.bob.0, &team.bob.1, team.project_id).await;

    let task = alice_board
        .submit_create(TaskDraft::new(team.project_id, "Contested"))
        .await
        .unwrap();
    assert!(eventually(&bob_board, |v| v.contains(task.id)).await);

    alice_board
        .submit_status_change(task.id, "in_progress")
        .await
        .unwrap();
    bob_board.submit_status_change(task.id, "done").await.unwrap();

    assert!(eventually(&alice_board, |v| status_of(v, task.id) == Some(TaskStatus::Done)).await);
    assert_eq!(
        status_of(&bob_board.view().unwrap(), task.id),
        Some(TaskStatus::Done)
    );
    for board in [&alice_board, &bob_board] {
        let view = board.view().unwrap();
        assert_eq!(view.len(), 1);
        assert!(view.is_partitioned());
    }
}

#[tokio::test]
async fn events_from_other_projects_are_ignored() {
    let team = team().await;
    let other_project = team.alice.1.create_project("Side quest").await.unwrap();
    let board = open_board(&team.alice.0, &team.alice.1, team.project_id).await;
    let other_board = open_board(&team.alice.0, &team.alice.1, other_project).await;

    let elsewhere = other_board
        .submit_create(TaskDraft::new(other_project, "Elsewhere"))
        .await
        .unwrap();
    let here = board
        .submit_create(TaskDraft::new(team.project_id, "Here"))
        .await
        .unwrap();

    let view = board.view().unwrap();
    assert!(view.contains(here.id));
    assert!(!view.contains(elsewhere.id));
    assert_eq!(view.len(), 1);

    let other_view = other_board.view().unwrap();
    assert!(!other_view.contains(here.id));
    assert_eq!(other_view.len(), 1);
}

#[tokio::test]
async fn non_member_cannot_load_or_attach() {
    let team = team().await;
    let carol = login(&team.url, "carol@example.com").await;
    let board = Arc::new(BoardSync::new(
        &carol.0,
        team.project_id,
        Arc::clone(&carol.1),
    ));

    let err = board.load().await.unwrap_err();
    assert!(matches!(err.gateway_error(), Some(GatewayError::Unauthorized)));
    assert!(board.view().is_none());

    let err = board.attach(&*carol.1).await.unwrap_err();
    assert!(matches!(err.gateway_error(), Some(GatewayError::Unauthorized)));
}

#[tokio::test]
async fn members_are_loaded_with_the_board() {
    let team = team().await;
    let board = open_board(&team.bob.0, &team.bob.1, team.project_id).await;
    let mut emails: Vec<String> = board.members().into_iter().map(|m| m.email).collect();
    emails.sort();
    assert_eq!(emails, vec!["alice@example.com", "bob@example.com"]);
}

#[tokio::test]
async fn detached_board_stops_following() {
    let team = team().await;
    let alice_board = open_board(&team.alice.0, &team.alice.1, team.project_id).await;
    let bob_board = Arc::new(BoardSync::new(
        &team.bob.0,
        team.project_id,
        Arc::clone(&team.bob.1),
    ));
    let token = bob_board.attach(&*team.bob.1).await.unwrap();
    bob_board.load().await.unwrap();
    bob_board.detach(&*team.bob.1, token).await.unwrap();

    alice_board
        .submit_create(TaskDraft::new(team.project_id, "Unseen"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(bob_board.view().unwrap().is_empty());
}

#[tokio::test]
async fn deleted_project_fails_later_moves() {
    let team = team().await;
    let alice_board = open_board(&team.alice.0, &team.alice.1, team.project_id).await;
    let bob_board = open_board(&team.bob.0, &team.bob.1, team.project_id).await;
    let task = alice_board
        .submit_create(TaskDraft::new(team.project_id, "Orphan"))
        .await
        .unwrap();
    assert!(eventually(&bob_board, |v| v.contains(task.id)).await);

    team.alice.1.delete_project(team.project_id).await.unwrap();

    let err = bob_board
        .submit_status_change(task.id, "done")
        .await
        .unwrap_err();
    assert!(matches!(err.gateway_error(), Some(GatewayError::NotFound(_))));
    assert!(!bob_board.view().unwrap().contains(task.id));
}

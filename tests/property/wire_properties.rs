//! Property-based tests for the wire protocol and task model.
//!
//! Uses proptest to verify:
//! 1. Any live update event survives encode → decode.
//! 2. Random bytes never cause a panic in `decode` (returns `Err` gracefully).
//! 3. `decode_bounded` rejects every frame over the limit.
//! 4. Draft validation accepts exactly the titles within limits.
//! 5. Applying a patch twice equals applying it once.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use taskboard_proto::codec::{self, CodecError};
use taskboard_proto::event::{LiveUpdate, LiveUpdateEvent};
use taskboard_proto::task::{
    MAX_TASK_TITLE_LENGTH, ProjectId, Task, TaskDraft, TaskId, TaskPatch, TaskRecord, TaskStatus,
    UserId,
};
use taskboard_proto::wire::{ClientMessage, ServerMessage};
use uuid::Uuid;

// --- Strategies ---

fn arb_task_id() -> impl Strategy<Value = TaskId> {
    any::<u128>().prop_map(|n| TaskId::from_uuid(Uuid::from_u128(n)))
}

fn arb_project_id() -> impl Strategy<Value = ProjectId> {
    any::<u128>().prop_map(|n| ProjectId::from_uuid(Uuid::from_u128(n)))
}

fn arb_user_id() -> impl Strategy<Value = UserId> {
    any::<u128>().prop_map(|n| UserId::from_uuid(Uuid::from_u128(n)))
}

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop::sample::select(TaskStatus::ALL.to_vec())
}

fn arb_task() -> impl Strategy<Value = Task> {
    (
        arb_task_id(),
        arb_project_id(),
        "[^\x00]{1,100}",
        proptest::option::of("[^\x00]{0,200}"),
        arb_status(),
        proptest::option::of(arb_user_id()),
    )
        .prop_map(|(id, project_id, title, description, status, assignee)| Task {
            id,
            project_id,
            title,
            description,
            status,
            assignee,
        })
}

fn arb_event() -> impl Strategy<Value = LiveUpdateEvent> {
    let update = prop_oneof![
        arb_task().prop_map(|t| LiveUpdate::TaskCreated(TaskRecord::from(t))),
        arb_task().prop_map(|t| LiveUpdate::TaskUpdated(TaskRecord::from(t))),
        arb_task_id().prop_map(LiveUpdate::TaskDeleted),
    ];
    (arb_project_id(), update).prop_map(|(project_id, update)| LiveUpdateEvent::new(project_id, update))
}

fn arb_patch() -> impl Strategy<Value = TaskPatch> {
    (
        proptest::option::of("[a-z]{1,20}"),
        proptest::option::of(proptest::option::of("[a-z ]{0,40}")),
        proptest::option::of(arb_status()),
        proptest::option::of(proptest::option::of(arb_user_id())),
    )
        .prop_map(|(title, description, status, assignee)| TaskPatch {
            title,
            description,
            status,
            assignee,
        })
}

// --- Properties ---

proptest! {
    #[test]
    fn event_frame_round_trip(event in arb_event()) {
        let message = ServerMessage::Event(event);
        let bytes = codec::encode(&message).unwrap();
        let decoded: ServerMessage = codec::decode(&bytes).unwrap();
        prop_assert_eq!(decoded, message);
    }

    #[test]
    fn random_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let _ = codec::decode::<ClientMessage>(&bytes);
        let _ = codec::decode::<ServerMessage>(&bytes);
    }

    #[test]
    fn oversized_frames_are_rejected(
        bytes in prop::collection::vec(any::<u8>(), 1..256),
        max in 0..256usize,
    ) {
        let result = codec::decode_bounded::<ClientMessage>(&bytes, max);
        if bytes.len() > max {
            let is_too_large = matches!(result, Err(CodecError::FrameTooLarge { size, .. }) if size == bytes.len());
            prop_assert!(is_too_large);
        } else {
            let is_too_large = matches!(result, Err(CodecError::FrameTooLarge { .. }));
            prop_assert!(!is_too_large);
        }
    }

    #[test]
    fn draft_validation_follows_title_limits(
        padding in " {0,4}",
        body in "[a-z]{0,120}",
    ) {
        let title = format!("{padding}{body}{padding}");
        let result = TaskDraft::new(ProjectId::new(), title).validated();
        let len = body.chars().count();
        if (1..=MAX_TASK_TITLE_LENGTH).contains(&len) {
            prop_assert_eq!(result.unwrap().title, body);
        } else {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn patch_application_is_idempotent(task in arb_task(), patch in arb_patch()) {
        let mut once = task;
        patch.clone().apply_to(&mut once);
        let mut twice = once.clone();
        patch.apply_to(&mut twice);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn status_keys_parse_back(status in arb_status()) {
        prop_assert_eq!(status.key().parse::<TaskStatus>().unwrap(), status);
        let record = TaskRecord::from(&Task {
            id: TaskId::new(),
            project_id: ProjectId::new(),
            title: "t".to_string(),
            description: None,
            status,
            assignee: None,
        });
        prop_assert_eq!(Task::try_from(record).unwrap().status, status);
    }
}

//! Property-based tests for the board engine.
//!
//! Uses proptest to verify:
//! 1. Loading any listing yields a partitioned, coherent board.
//! 2. Merging the same live update twice equals merging it once.
//! 3. Rejecting every pending move, in any order, restores the board exactly.
//! 4. Any interleaving of moves, live updates, and settlements keeps every
//!    task in exactly one column matching its status.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use taskboard::board::reconcile;
use taskboard::board::{BoardEngine, BoardView, MoveIntent, MoveOutcome, MoveTarget};
use taskboard_proto::event::{LiveUpdate, LiveUpdateEvent};
use taskboard_proto::task::{ProjectId, Task, TaskId, TaskRecord, TaskStatus};

fn status(i: usize) -> TaskStatus {
    TaskStatus::ALL[i % 3]
}

fn record(project_id: ProjectId, n: usize, status: TaskStatus) -> TaskRecord {
    TaskRecord {
        id: TaskId::new(),
        project_id,
        title: format!("Task {n}"),
        description: None,
        status: status.key().to_string(),
        assignee: None,
    }
}

fn records(project_id: ProjectId, statuses: &[usize]) -> Vec<TaskRecord> {
    statuses
        .iter()
        .enumerate()
        .map(|(n, s)| record(project_id, n, status(*s)))
        .collect()
}

fn assert_well_formed(view: &BoardView) {
    assert!(view.is_partitioned(), "task in two columns: {view:?}");
    assert!(view.is_coherent(), "task in wrong column: {view:?}");
}

// --- Strategies ---

#[derive(Debug, Clone, Copy)]
enum Target {
    End,
    Index(usize),
    Anchor(usize),
}

fn arb_target() -> impl Strategy<Value = Target> {
    prop_oneof![
        Just(Target::End),
        (0..8usize).prop_map(Target::Index),
        (0..16usize).prop_map(Target::Anchor),
    ]
}

fn resolve_target(target: Target, ids: &[TaskId]) -> MoveTarget {
    match target {
        Target::End => MoveTarget::End,
        Target::Index(i) => MoveTarget::Index(i),
        Target::Anchor(i) => MoveTarget::Anchor(ids[i % ids.len()]),
    }
}

#[derive(Debug, Clone)]
enum Op {
    Move { task: usize, to: usize, target: Target },
    RemoteUpdate { task: usize, to: usize },
    RemoteDelete { task: usize },
    RemoteCreate { to: usize },
    Settle { pick: usize, success: bool },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..16usize, 0..3usize, arb_target())
            .prop_map(|(task, to, target)| Op::Move { task, to, target }),
        2 => (0..16usize, 0..3usize).prop_map(|(task, to)| Op::RemoteUpdate { task, to }),
        1 => (0..16usize).prop_map(|task| Op::RemoteDelete { task }),
        1 => (0..3usize).prop_map(|to| Op::RemoteCreate { to }),
        3 => (0..16usize, any::<bool>()).prop_map(|(pick, success)| Op::Settle { pick, success }),
    ]
}

// --- Properties ---

proptest! {
    #[test]
    fn load_yields_partitioned_board(
        statuses in prop::collection::vec(0..3usize, 0..20),
        duplicates in prop::collection::vec(0..20usize, 0..5),
        unknown in prop::collection::vec(any::<bool>(), 0..20),
    ) {
        let project_id = ProjectId::new();
        let mut listing = records(project_id, &statuses);
        for (record, bad) in listing.iter_mut().zip(&unknown) {
            if *bad {
                record.status = "archived".to_string();
            }
        }
        let valid = listing.iter().filter(|r| r.status != "archived").count();
        if !listing.is_empty() {
            for d in &duplicates {
                let mut dup = listing[d % listing.len()].clone();
                dup.title = "Duplicate".to_string();
                listing.push(dup);
            }
        }
        listing.push(record(ProjectId::new(), 99, TaskStatus::Todo));

        let view = reconcile::load(project_id, listing);
        assert_well_formed(&view);
        prop_assert_eq!(view.len(), valid);
        prop_assert!(view.task_ids().all(|id| view.get(id).unwrap().title != "Duplicate"));
    }

    #[test]
    fn merging_twice_equals_merging_once(
        statuses in prop::collection::vec(0..3usize, 1..12),
        pick in 0..12usize,
        to in 0..3usize,
        kind in 0..3usize,
    ) {
        let project_id = ProjectId::new();
        let listing = records(project_id, &statuses);
        let mut target = listing[pick % listing.len()].clone();
        let update = match kind {
            0 => LiveUpdate::TaskCreated(record(project_id, 50, status(to))),
            1 => {
                target.status = status(to).key().to_string();
                target.title = "Renamed".to_string();
                LiveUpdate::TaskUpdated(target)
            }
            _ => LiveUpdate::TaskDeleted(target.id),
        };
        let event = LiveUpdateEvent::new(project_id, update);

        let mut once = reconcile::load(project_id, listing);
        reconcile::apply_remote_event(&mut once, &event);
        let mut twice = once.clone();
        let changed = reconcile::apply_remote_event(&mut twice, &event);

        prop_assert!(!changed);
        prop_assert_eq!(&once, &twice);
        assert_well_formed(&twice);
    }

    #[test]
    fn rejecting_every_move_restores_board(
        statuses in prop::collection::vec(0..3usize, 1..10),
        moves in prop::collection::vec((0..16usize, 0..3usize, arb_target()), 1..10),
        order in prop::collection::vec(any::<u32>(), 10),
    ) {
        let project_id = ProjectId::new();
        let listing = records(project_id, &statuses);
        let ids: Vec<TaskId> = listing.iter().map(|r| r.id).collect();
        let mut engine = BoardEngine::new();
        let original = engine.load(project_id, listing).clone();

        let mut moved = Vec::new();
        for (task, to, target) in moves {
            let task_id = ids[task % ids.len()];
            let (from, _) = engine.view().unwrap().locate(task_id).unwrap();
            let mut to = status(to);
            if to == from {
                to = status(from.index() + 1);
            }
            let intent = MoveIntent::new(task_id, from, to, resolve_target(target, &ids));
            let outcome = engine.apply_local_move(intent);
            prop_assert_eq!(outcome, MoveOutcome::Moved { task_id, from, to });
            moved.push(task_id);
        }
        prop_assert_eq!(engine.pending_moves(), moved.len());

        let mut settle: Vec<(u32, TaskId)> = order.into_iter().zip(moved).collect();
        settle.sort_by_key(|(key, _)| *key);
        for (_, task_id) in settle {
            prop_assert!(engine.confirm_move(task_id, false, None));
            assert_well_formed(engine.view().unwrap());
        }

        prop_assert_eq!(engine.pending_moves(), 0);
        prop_assert_eq!(engine.view().unwrap(), &original);
    }

    #[test]
    fn any_interleaving_keeps_board_well_formed(
        statuses in prop::collection::vec(0..3usize, 1..10),
        ops in prop::collection::vec(arb_op(), 1..40),
    ) {
        let project_id = ProjectId::new();
        let listing = records(project_id, &statuses);
        let mut ids: Vec<TaskId> = listing.iter().map(|r| r.id).collect();
        let mut known: Vec<TaskRecord> = listing.clone();
        let mut engine = BoardEngine::new();
        engine.load(project_id, listing);

        // Moves awaiting settlement, oldest first.
        let mut in_flight: Vec<(TaskId, TaskStatus)> = Vec::new();

        for op in ops {
            match op {
                Op::Move { task, to, target } => {
                    let task_id = ids[task % ids.len()];
                    let from = engine
                        .view()
                        .unwrap()
                        .locate(task_id)
                        .map_or(TaskStatus::Todo, |(s, _)| s);
                    let intent = MoveIntent::new(task_id, from, status(to), resolve_target(target, &ids));
                    if let MoveOutcome::Moved { to, .. } = engine.apply_local_move(intent) {
                        in_flight.push((task_id, to));
                    }
                }
                Op::RemoteUpdate { task, to } => {
                    let mut record = known[task % known.len()].clone();
                    record.status = status(to).key().to_string();
                    engine.apply_remote_event(&LiveUpdateEvent::new(
                        project_id,
                        LiveUpdate::TaskUpdated(record),
                    ));
                }
                Op::RemoteDelete { task } => {
                    let task_id = ids[task % ids.len()];
                    engine.apply_remote_event(&LiveUpdateEvent::new(
                        project_id,
                        LiveUpdate::TaskDeleted(task_id),
                    ));
                }
                Op::RemoteCreate { to } => {
                    let created = record(project_id, ids.len(), status(to));
                    ids.push(created.id);
                    known.push(created.clone());
                    engine.apply_remote_event(&LiveUpdateEvent::new(
                        project_id,
                        LiveUpdate::TaskCreated(created),
                    ));
                }
                Op::Settle { pick, success } => {
                    if in_flight.is_empty() {
                        continue;
                    }
                    let task_id = in_flight[pick % in_flight.len()].0;
                    let position = in_flight.iter().position(|(id, _)| *id == task_id).unwrap();
                    let (_, to) = in_flight.remove(position);
                    let authoritative = success
                        .then(|| engine.view().unwrap().get(task_id).cloned())
                        .flatten()
                        .map(|task| Task { status: to, ..task });
                    prop_assert!(engine.confirm_move(task_id, success, authoritative));
                }
            }
            assert_well_formed(engine.view().unwrap());
            prop_assert_eq!(engine.pending_moves(), in_flight.len());
        }

        for (task_id, _) in in_flight {
            prop_assert!(engine.confirm_move(task_id, false, None));
            assert_well_formed(engine.view().unwrap());
        }
        prop_assert_eq!(engine.pending_moves(), 0);
    }
}

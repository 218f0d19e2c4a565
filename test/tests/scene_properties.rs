/// PROPERTY-BASED TESTS: handle translation and progress tracking
///
/// Key invariants:
/// 1. The handle table stays a bijection under any bind/unbind sequence
/// 2. A finished operation reports every expected peer exactly once,
///    either as completed or as timed out

use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};

use proptest::prelude::*;
use scenesync_shared::{
    ContentId, HandleTable, Instant, InstantOffset, LoadMode, OperationId, OperationKind, PeerId,
    ProgressTracker, SegmentHandle,
};

#[derive(Clone, Debug)]
enum TableOp {
    Bind(u32, u32),
    Unbind(u32, u32),
}

fn table_op_strategy() -> impl Strategy<Value = TableOp> {
    prop_oneof![
        (1u32..8, 1u32..8).prop_map(|(session, local)| TableOp::Bind(session, local)),
        (1u32..8, 1u32..8).prop_map(|(session, local)| TableOp::Unbind(session, local)),
    ]
}

#[derive(Clone, Debug)]
enum PeerEvent {
    Finished(u64),
    Disconnected(u64),
}

fn peer_event_strategy() -> impl Strategy<Value = PeerEvent> {
    prop_oneof![
        (1u64..10).prop_map(PeerEvent::Finished),
        (1u64..10).prop_map(PeerEvent::Disconnected),
    ]
}

proptest! {
    #[test]
    fn prop_handle_table_stays_bijective(ops in prop::collection::vec(table_op_strategy(), 1..40)) {
        let content = ContentId::from_name("arena");
        let mut table = HandleTable::new();
        let mut model: HashMap<u32, u32> = HashMap::new();

        for op in ops {
            match op {
                TableOp::Bind(session, local) => {
                    let expected = !model.contains_key(&session)
                        && !model.values().any(|bound| *bound == local);
                    let bound = table.bind(
                        SegmentHandle::new(session),
                        SegmentHandle::new(local),
                        content,
                        LoadMode::Additive,
                    );
                    prop_assert_eq!(bound, expected);
                    if bound {
                        model.insert(session, local);
                    }
                }
                TableOp::Unbind(session, local) => {
                    let expected = model.get(&session) == Some(&local);
                    let unbound = table.unbind(SegmentHandle::new(session), SegmentHandle::new(local));
                    prop_assert_eq!(unbound, expected);
                    if unbound {
                        model.remove(&session);
                    }
                }
            }

            prop_assert_eq!(table.bound_len(), model.len());
            for (session, local) in &model {
                let session = SegmentHandle::new(*session);
                let local = SegmentHandle::new(*local);
                prop_assert_eq!(table.session_to_local(&session), Some(local));
                prop_assert_eq!(table.local_to_session(&local), Some(session));
            }
        }
    }

    #[test]
    fn prop_minted_session_handles_are_never_bound(
        sessions in prop::collection::btree_set(1u32..500, 0..10)
    ) {
        let content = ContentId::from_name("forest");
        let mut table = HandleTable::new();
        for (offset, session) in sessions.iter().enumerate() {
            table.bind(
                SegmentHandle::new(*session),
                SegmentHandle::new(1000 + offset as u32),
                content,
                LoadMode::Additive,
            );
        }

        let minted = table.mint_session_handle();
        prop_assert!(!minted.is_none());
        prop_assert_eq!(table.session_to_local(&minted), None);
    }

    #[test]
    fn prop_finished_operation_partitions_expected_peers(
        peers in prop::collection::btree_set(1u64..10, 0..8),
        events in prop::collection::vec(peer_event_strategy(), 0..20),
        local_done in any::<bool>(),
    ) {
        let initiator = PeerId::new(0);
        let now = Instant::now();
        let timeout = Duration::from_secs(10);
        let mut tracker = ProgressTracker::new(
            OperationId::new(1),
            OperationKind::Load,
            peers.iter().map(|peer| PeerId::new(*peer)),
            &initiator,
            &now,
            timeout,
        );

        for event in events {
            match event {
                PeerEvent::Finished(peer) => {
                    tracker.mark_peer_finished(&PeerId::new(peer));
                }
                PeerEvent::Disconnected(peer) => tracker.on_peer_disconnected(&PeerId::new(peer)),
            }
        }
        if local_done {
            tracker.set_local_done();
        }

        let past_deadline = now.offset(timeout + Duration::from_secs(1));
        prop_assert!(tracker.update(&past_deadline));

        let completed: BTreeSet<PeerId> = tracker.completed_peers().into_iter().collect();
        let timed_out: BTreeSet<PeerId> = tracker.timed_out_peers().into_iter().collect();
        let expected: BTreeSet<PeerId> = peers.iter().map(|peer| PeerId::new(*peer)).collect();

        prop_assert!(completed.is_disjoint(&timed_out));
        let reported: BTreeSet<PeerId> = completed.union(&timed_out).copied().collect();
        prop_assert_eq!(reported, expected);
    }
}

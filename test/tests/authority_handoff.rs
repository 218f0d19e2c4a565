/// E2E tests for moving session authority from the server to a client
/// Every peer keeps its own handle table across the handoff

use scenesync_shared::{
    LoadEvent, LoadMode, LoadOperationCompletedEvent, OperationKind, SceneError, SegmentHandle,
};
use scenesync_test::{assert_rejected, client_peer, expect_summary, TestSession, SERVER_PEER};

fn handed_over_session() -> TestSession {
    let mut session = TestSession::new(1);
    session.connect_all_and_sync();
    session
        .server
        .request_load(
            TestSession::content("arena"),
            LoadMode::Single,
            &session.now,
            &mut session.server_world,
        )
        .expect("arena load should start");
    session.tick_n(3);

    let new_authority = client_peer(0);
    session
        .server
        .set_authority(new_authority, &session.now, &mut session.server_world);
    let peer = &mut session.clients[0];
    peer.client.promote_to_authority(&session.now, &mut peer.world);
    assert!(peer.client.is_authority());
    session.server.take_scene_events();
    session.clients[0].client.take_scene_events();
    session
}

#[test]
fn promoted_client_drives_the_server() {
    let mut session = handed_over_session();

    let peer = &mut session.clients[0];
    let operation = peer
        .client
        .request_load(
            TestSession::content("forest"),
            LoadMode::Additive,
            &session.now,
            &mut peer.world,
        )
        .expect("the new authority can start a load");
    session.tick_n(4);

    let peer = &mut session.clients[0];
    let mut events = peer.client.take_scene_events();
    let summary = expect_summary!(events, LoadOperationCompletedEvent);
    assert_eq!(summary.operation, operation);
    assert_eq!(summary.completed, vec![SERVER_PEER]);
    assert!(summary.timed_out.is_empty());

    assert_eq!(
        session.server_loader.loads().last(),
        Some(&("forest".to_string(), LoadMode::Additive))
    );
    let mut server_events = session.server.take_scene_events();
    let started: Vec<_> = server_events.read::<LoadEvent>().collect();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].initiator, client_peer(0));
    let summary = expect_summary!(server_events, LoadOperationCompletedEvent);
    assert_eq!(summary.operation, operation);
}

#[test]
fn new_authority_mints_fresh_session_handles() {
    let mut session = handed_over_session();
    let arena_session = session
        .session_handle(&SegmentHandle::new(100))
        .expect("arena bound on the server");

    let peer = &mut session.clients[0];
    peer.client
        .request_load(
            TestSession::content("forest"),
            LoadMode::Additive,
            &session.now,
            &mut peer.world,
        )
        .expect("the new authority can start a load");
    session.tick_n(4);

    let forest_session = session.clients[0]
        .client
        .coordinator()
        .handles()
        .local_to_session(&SegmentHandle::new(1001))
        .expect("forest bound on the new authority");
    assert_ne!(forest_session, arena_session);
    assert_eq!(session.server_local(&forest_session), Some(SegmentHandle::new(101)));
    assert_eq!(session.server_local(&arena_session), Some(SegmentHandle::new(100)));
}

#[test]
fn former_authority_is_an_observer() {
    let mut session = handed_over_session();

    let result = session.server.request_load(
        TestSession::content("caves"),
        LoadMode::Additive,
        &session.now,
        &mut session.server_world,
    );
    assert_rejected!(result, SceneError::NotAuthority { kind: OperationKind::Load });
    assert!(!session.server.coordinator().is_authority());
    assert_eq!(session.server.coordinator().authority(), Some(client_peer(0)));
}

#[test]
fn promoted_client_binds_its_own_segments() {
    let mut session = TestSession::new(1);
    session.connect_all_and_sync();
    let workshop = SegmentHandle::new(700);
    session.clients[0]
        .client
        .track_local_segment(TestSession::content("forest"), workshop, LoadMode::Additive)
        .expect("forest is in the catalog");
    assert_eq!(session.clients[0].client.coordinator().handles().local_to_session(&workshop), None);

    let peer = &mut session.clients[0];
    peer.client.promote_to_authority(&session.now, &mut peer.world);

    let handles = peer.client.coordinator().handles();
    let bound = handles
        .local_to_session(&workshop)
        .expect("promotion binds tracked segments");
    assert_eq!(handles.session_to_local(&bound), Some(workshop));
    assert!(peer
        .client
        .request_unload(workshop, &session.now, &mut peer.world)
        .is_ok());
}

/// E2E tests for what happens around a segment transition on an observer:
/// deferred entity creation, active segment changes and entity migration

use scenesync_shared::{
    ActiveSegmentChangedEvent, LoadMode, NetworkId, ObjectSegmentChangedEvent, SegmentHandle,
};
use scenesync_test::{TestSession, SERVER_PEER};

fn load(session: &mut TestSession, name: &str, mode: LoadMode) {
    session
        .server
        .request_load(
            TestSession::content(name),
            mode,
            &session.now,
            &mut session.server_world,
        )
        .expect("load should start");
    session.tick_n(3);
}

#[test]
fn entity_creation_waits_for_the_transition() {
    let mut session = TestSession::new(1);
    session.connect_all_and_sync();
    session.clients[0].loader.set_delay(2);

    session
        .server
        .request_load(
            TestSession::content("arena"),
            LoadMode::Single,
            &session.now,
            &mut session.server_world,
        )
        .expect("arena load should start");
    session.tick();

    let observer = &mut session.clients[0];
    assert!(observer.client.coordinator().active_operation().is_some());
    observer
        .client
        .receive_entity_creation(SERVER_PEER, b"first", &mut observer.world);
    observer
        .client
        .receive_entity_creation(SERVER_PEER, b"second", &mut observer.world);
    assert!(observer.world.created.is_empty());
    assert_eq!(observer.client.coordinator().deferred_creations(), 2);

    session.tick_n(3);

    let observer = &session.clients[0];
    assert_eq!(
        observer.world.created,
        vec![
            (SERVER_PEER, b"first".to_vec()),
            (SERVER_PEER, b"second".to_vec()),
        ]
    );
    assert_eq!(observer.client.coordinator().deferred_creations(), 0);
}

#[test]
fn entity_creation_outside_a_transition_is_immediate() {
    let mut session = TestSession::new(1);
    session.connect_all_and_sync();

    let observer = &mut session.clients[0];
    observer
        .client
        .receive_entity_creation(SERVER_PEER, b"now", &mut observer.world);
    assert_eq!(observer.world.created, vec![(SERVER_PEER, b"now".to_vec())]);
}

#[test]
fn active_segment_change_is_translated() {
    let mut session = TestSession::new(1);
    session.connect_all_and_sync();
    load(&mut session, "arena", LoadMode::Single);
    load(&mut session, "forest", LoadMode::Additive);
    session.clients[0].client.take_scene_events();

    let forest = SegmentHandle::new(101);
    session
        .server
        .set_active_segment(forest)
        .expect("forest is loaded");
    session.tick();

    let forest_session = session.session_handle(&forest).expect("forest bound");
    let observer = &mut session.clients[0];
    let observer_forest = observer.local(&forest_session).expect("observer bound forest");
    assert_eq!(observer.client.active_segment(), Some(observer_forest));

    let mut events = observer.client.take_scene_events();
    let changes: Vec<_> = events.read::<ActiveSegmentChangedEvent>().collect();
    assert_eq!(changes, vec![observer_forest]);
}

#[test]
fn entity_migration_is_translated() {
    let mut session = TestSession::new(1);
    load(&mut session, "arena", LoadMode::Single);
    load(&mut session, "forest", LoadMode::Additive);

    let wanderer = NetworkId::new(42);
    session
        .server_world
        .spawn_network_entity(wanderer, Some(SegmentHandle::new(100)));
    session.connect_all_and_sync();

    let forest = SegmentHandle::new(101);
    session
        .server
        .move_entity_to_segment(wanderer, forest, &mut session.server_world)
        .expect("wanderer exists");
    assert_eq!(
        session.server_world.entity_segment(&wanderer),
        Some(Some(forest))
    );
    session.tick();

    let forest_session = session.session_handle(&forest).expect("forest bound");
    let observer = &mut session.clients[0];
    let observer_forest = observer.local(&forest_session).expect("observer bound forest");
    assert_eq!(
        observer.world.entity_segment(&wanderer),
        Some(Some(observer_forest))
    );

    let mut events = observer.client.take_scene_events();
    let moves: Vec<_> = events.read::<ObjectSegmentChangedEvent>().collect();
    assert_eq!(moves, vec![(wanderer, observer_forest)]);
}

#[test]
fn single_load_evacuates_the_outgoing_segment() {
    let mut session = TestSession::new(1);
    session.connect_all_and_sync();
    load(&mut session, "arena", LoadMode::Single);
    load(&mut session, "forest", LoadMode::Additive);
    load(&mut session, "caves", LoadMode::Single);

    // the additive forest was torn down before caves replaced arena
    assert_eq!(session.server_loader.unloads(), vec![SegmentHandle::new(101)]);
    assert_eq!(session.server_world.evacuated, vec![SegmentHandle::new(100)]);
    assert_eq!(
        session.server.coordinator().active_segment(),
        Some(SegmentHandle::new(102))
    );
    assert_eq!(
        session
            .server
            .coordinator()
            .handles()
            .tracked_segments()
            .count(),
        1
    );

    let observer = &session.clients[0];
    assert_eq!(observer.loader.unloads(), vec![SegmentHandle::new(1001)]);
    assert_eq!(observer.client.active_segment(), Some(SegmentHandle::new(1002)));
}

pub mod coordinator;
pub mod deferred_queue;
pub mod events;
pub mod handle_table;
pub mod loader;
pub mod placement_registry;
pub mod progress_tracker;
pub mod sync_sequencer;
pub mod world;

pub mod payload;
pub mod scene_message;

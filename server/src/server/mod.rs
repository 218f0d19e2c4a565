mod scene_server;
pub use scene_server::SceneServer;

mod server_config;
pub use server_config::ServerConfig;

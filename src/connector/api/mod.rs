pub mod container;
pub mod controller;
pub mod http_server;

pub use container::{Container, ContainerConfig};
pub use controller::{AskController, ChatController, DEFAULT_SERVER_URL};
pub use http_server::{app, bind_addr, serve, ChatParams, DEFAULT_PORT};

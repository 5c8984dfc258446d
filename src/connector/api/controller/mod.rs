pub mod ask_controller;
pub mod chat_controller;

pub use ask_controller::{AskController, DEFAULT_SERVER_URL};
pub use chat_controller::ChatController;

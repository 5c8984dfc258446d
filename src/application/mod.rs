//! # Application Layer
//!
//! The token channel, the completer interface and the streaming use case
//! that connects them.

pub mod interfaces;
pub mod token_channel;
pub mod use_cases;

pub use interfaces::*;
pub use token_channel::*;
pub use use_cases::*;

//! # Connector Layer
//!
//! External integrations implementing application interfaces:
//! - Completers (Azure OpenAI streaming, mock)
//! - HTTP surface and command-line controllers

pub mod adapter;
pub mod api;

pub use adapter::*;
pub use api::*;

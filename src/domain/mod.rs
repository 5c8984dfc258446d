//! # Domain Layer
//!
//! Request, stream item and run record models plus the error type.
//! This layer is independent of the runtime and of any provider.

pub mod error;
pub mod models;

pub use error::*;
pub use models::*;

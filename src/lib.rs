//! A headless player for Scratch 3 projects.
//!
//! Scripts are compiled once at load time into flat lists of ops, split at
//! every point where a script may yield. The [`Runtime`] runs them as
//! cooperative threads, a frame at a time.

pub mod assembler;
pub mod block;
pub mod compiler;
pub mod costume;
pub mod error;
pub mod expression;
pub mod hat;
pub mod input;
mod interpreter;
pub mod json;
pub mod pen;
pub mod project;
pub mod runtime;
pub mod script;
pub mod statement;
pub mod target;
pub mod thread;

pub use block::Value;
pub use error::{Error, Result};
pub use project::{Config, Project};
pub use runtime::Runtime;

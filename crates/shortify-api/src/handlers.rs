//! Request handlers.

pub mod health;
pub mod jobs;
pub mod language;
pub mod objects;

pub use health::*;
pub use jobs::*;
pub use language::*;
pub use objects::*;

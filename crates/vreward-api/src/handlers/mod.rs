//! Request handlers.

pub mod health;
pub mod logs;
pub mod upload;

pub use health::*;
pub use logs::*;
pub use upload::*;

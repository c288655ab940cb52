mod commands;
mod queries;
mod service;
pub mod types;
mod warm;

pub use service::*;
pub use types::{AccessPath, LikeError};

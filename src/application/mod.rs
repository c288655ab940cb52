//! Application services: the like engine, event publishing and background jobs.

pub mod error;
pub mod events;
pub mod jobs;
pub mod likes;
pub mod pagination;
pub mod repos;

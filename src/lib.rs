//! Cache-first like counters and like/unlike bookkeeping backed by Postgres.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;

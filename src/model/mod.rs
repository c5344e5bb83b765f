//! Data models, split by where they live.
//!
//! - [`db`]: documents as stored.
//! - [`api`]: request and response bodies.
//! - [`common`]: types shared by both.
//! - [`mongodb`]: database plumbing.

pub mod api;
pub mod common;
pub mod db;
pub mod mongodb;

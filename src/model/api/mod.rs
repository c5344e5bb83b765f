//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - IDs are serialised as hex strings.
//! - Field names are camelCase.
//! - Datetimes are serialised as RFC 3339 strings.

pub mod attendance;
pub mod auth;
pub mod candidate;
pub mod election;
pub mod id;
pub mod profile;
pub mod results;
pub mod vote;

pub use id::ApiId;

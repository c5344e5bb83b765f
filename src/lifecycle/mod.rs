//! The election lifecycle: keeping the open flag in step with the schedule,
//! deciding whether a ballot may be cast, recording it, and finalising the
//! results.
//!
//! Everything here takes the current time as an argument, so callers decide
//! what "now" is.

pub mod admission;
pub mod control;
pub mod declaration;
pub mod recorder;
pub mod sync;
pub mod watcher;

use crate::error::Result;
use crate::store::Store;

/// Registered voter count, and the flat count used for turnout: the number
/// of registered voters, or `fallback_flats` while nobody is registered.
pub async fn flat_counts(store: &dyn Store, fallback_flats: u32) -> Result<(i64, i64)> {
    let voters = store.voters().await?.len() as i64;
    let flats = if voters > 0 {
        voters
    } else {
        i64::from(fallback_flats)
    };
    Ok((voters, flats))
}

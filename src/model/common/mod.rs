//! Types shared between the database and API representations.

mod origin;
mod phase;
mod position;
mod status;
mod window;

pub use origin::RequestOrigin;
pub use phase::ElectionPhase;
pub use position::{Position, UnknownPosition};
pub use status::ElectionStatus;
pub use window::ScheduleWindow;

//! # roomvisor-model
//!
//! Shared vocabulary for the roomvisor services.
//!
//! ## Types
//!
//! - [`RoomId`]: opaque 64-bit room identifier. Its canonical string form is
//!   the decimal integer, which is also how it is stored in the admission
//!   queue and used to name compute units.
//! - [`Region`]: coarse placement constraint over cluster nodes. `ANY` matches
//!   every node; named regions filter nodes by label.

mod error;
mod region;
mod room;

pub use error::ParseError;
pub use region::Region;
pub use room::RoomId;

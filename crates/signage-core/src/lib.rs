//! Signage domain logic with no I/O.
//!
//! Everything here is deterministic and is shared by the database layer
//! (ordering) and the HTTP handlers (picker, preview, pairing, media).

pub mod media;
pub mod ordering;
pub mod pairing;
pub mod picker;
pub mod presence;
pub mod preview;

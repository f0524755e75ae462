//! Push-event stream decoding.
//!
//! Turns a byte stream (`event:`/`data:`/`id:` records separated by blank
//! lines) into a lazy sequence of `Event` records. Payloads are left as raw
//! text; JSON decoding belongs to the router.

pub mod decoder;
pub mod error;

pub use decoder::{decode, Event, EventParser};
pub use error::StreamError;

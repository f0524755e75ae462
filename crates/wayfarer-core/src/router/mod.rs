//! Event routing.
//!
//! Each decoded `Event` is matched on its lower-cased name, its JSON payload
//! is validated into a typed `RoutedEvent`, and the result is handed to an
//! `EventHandler`. Invalid payloads are logged and skipped; the stream keeps
//! going.

pub mod dispatch;
pub mod error;
pub mod payloads;

pub use dispatch::{route, run, EventHandler, RoutedEvent, RouterStats};
pub use error::RouteError;
pub use payloads::{ContentDelta, Finish, InterfaceUpdate, MapMarker, MapUpdate, Notification, SectionUpdate};

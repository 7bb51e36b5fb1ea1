//! Signals: typed, thread-safe event routing
//!
//! Every task gets a [`SignalSet`] holding the fixed catalog of
//! [`SignalName`]s. Workers emit through [`SignalHandle`]s; each emission is
//! validated against the signal's [`PayloadShape`] and posted to the
//! reception context of every connected [`Listener`].

mod catalog;
mod listener;
mod payload;
mod set;

pub use catalog::{PayloadShape, SignalName, RESERVED_PARAMS};
pub use listener::Listener;
pub use payload::Payload;
pub use set::{ConnectionId, SignalHandle, SignalSet};

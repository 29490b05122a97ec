//! Offline-first client for a remote task list.
//!
//! Changes are applied to a local mirror at once, queued, and replayed to the
//! API in order whenever it is reachable.

pub mod cli;
pub mod io;
pub mod logging;
pub mod model;
pub mod ops;
pub mod remote;
pub mod tui;
pub mod util;

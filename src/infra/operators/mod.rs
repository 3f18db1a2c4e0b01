//! Operator-code lookup.
//!
//! [`OperatorTable`] maps the numeric `oper` code carried by every event to
//! the operator's display name. The table is maintained outside the feed and
//! loaded from disk at startup.

mod config;

pub use config::{OperatorTable, UNKNOWN_OPERATOR};

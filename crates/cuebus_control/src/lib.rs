//! Cuebus Control - Command Protocol
//!
//! Exposes a [`cuebus_core::Engine`] to a host application as JSON
//! requests, responses and pushed events:
//!
//! ```text
//! host ──{"command","params"}──▶ CommandProcessor ──▶ Engine
//! host ◀──{"success","data"|"error"}──┘
//! host ◀──{"event","data"}── event sink (crossbeam-channel)
//! ```

mod error;
mod processor;
mod request;
mod response;

pub use error::{CommandError, CommandResult};
pub use processor::CommandProcessor;
pub use request::Request;
pub use response::{ErrorBody, Response};

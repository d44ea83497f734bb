//! Command execution and session lifecycle.
//!
//! The driver layer runs commands over a [`TerminalChannel`](crate::channel::TerminalChannel):
//! [`CommandExecutor`] handles one exchange (including pagination markers),
//! [`TerminalGuard`] turns paging off and back on, and [`Session`] ties them
//! to a classified device.

mod config;
mod executor;
mod pagination;
pub(crate) mod response;
mod session;

pub use config::{PaginationMode, SessionConfig};
pub(crate) use config::seconds;
pub use executor::CommandExecutor;
pub use pagination::TerminalGuard;
pub use response::CommandResult;
pub use session::{Session, SessionPhase, SessionState};

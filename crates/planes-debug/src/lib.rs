//! Debug tools for surface planes - TCP debug server for remote inspection
//!
//! Start the debug server in your app:
//! ```ignore
//! let handler = Arc::new(Mutex::new(MyHandler::new()));
//! let _server = DebugServer::start(handler, planes_debug::DEFAULT_PORT);
//! ```

pub mod protocol;
pub mod server;

pub use protocol::*;
pub use server::{DebugHandler, DebugServer, SharedHandler};

/// Default debug server port
pub const DEFAULT_PORT: u16 = 9743;

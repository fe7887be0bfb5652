// Gateway & Session Router (spec §4.1). A single in-process event bus with
// a WebSocket frontend bound to loopback by default.

pub mod protocol;
pub mod server;
pub mod session_router;

pub use protocol::Frame;
pub use session_router::{BroadcastScope, GatewayApproval, SessionRouter};

//! Network Layer
//!
//! WebSocket admission, per-client sessions and mailboxes, the transport
//! pumps, and outbound fan-out. Nothing here blocks the tick scheduler.

pub mod admission;
pub mod fanout;
pub mod mailbox;
pub mod pump;
pub mod route;
pub mod server;
pub mod session;

pub use admission::{Admission, AdmissionError, INVALID_ROUTE_MESSAGE, VIEWER_ID_RANGE};
pub use fanout::Broadcaster;
pub use mailbox::{Mailbox, OUTBOUND_LIMIT};
pub use pump::{run_pump, TransportError, IDLE_WAIT};
pub use route::{ClientId, Recipient, Role, RouteTable};
pub use server::{GameServer, ServerError};
pub use session::{RegistryError, Session, SessionRegistry};

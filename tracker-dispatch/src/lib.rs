pub mod bounces;
pub mod compose;
pub mod error;
pub mod forward;
pub mod router;
pub mod transport;
pub mod vendor;

pub use bounces::BounceOutcome;
pub use compose::MailBuilder;
pub use error::{DispatchError, RoutingError, TransportError};
pub use forward::{Dispatcher, DropReason, ForwardOutcome};
pub use router::Route;
pub use transport::{Connection, OutgoingMessage, Transport, TransportConfig};
pub use vendor::{Classification, NoVendor, Vendor};

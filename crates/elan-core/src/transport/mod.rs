//! Transport layer module.

pub mod dispatch;
pub mod mock;
pub mod nusb;
pub mod traits;

pub use dispatch::Dispatcher;
pub use mock::{MockFailure, MockOp, MockTransport};
pub use nusb::NusbTransport;
pub use traits::{TransportError, UsbTransport};

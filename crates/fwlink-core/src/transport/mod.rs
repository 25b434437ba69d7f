//! Transport layer module.

pub mod framer;
pub mod mock;
pub mod serial;
pub mod simulator;
pub mod traits;

pub use framer::ResponseFramer;
pub use mock::MockSink;
pub use serial::SerialTransport;
pub use simulator::SimulatedDevice;
pub use traits::{FrameSink, TransportError};

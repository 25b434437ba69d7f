//! Upload state machine.

pub mod handlers;
pub mod machine;

pub use handlers::{HandlerContext, Outcome, handle_response, request_device_info};
pub use machine::{SessionState, Stall, UploadContext};

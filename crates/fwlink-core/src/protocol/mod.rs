//! Protocol module - updater wire definitions.

pub mod command;
pub mod constants;
pub mod device_info;
pub mod error;
pub mod frame;

pub use command::{Command, Status};
pub use constants::*;
pub use device_info::{DeviceInfo, DeviceReport};
pub use error::FrameError;
pub use frame::{Decoded, Request, Response};

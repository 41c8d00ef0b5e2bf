//! Handlers 模块

pub mod alarms;
pub mod bacnet;
pub mod devices;
pub mod email;
pub mod history;
pub mod system;
pub mod ws;

pub use alarms::*;
pub use bacnet::*;
pub use devices::*;
pub use email::*;
pub use history::*;
pub use system::*;
pub use ws::*;

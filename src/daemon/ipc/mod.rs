pub mod commands;
pub mod handlers;
pub mod server;

pub use commands::Command;
pub use server::{BridgeHandles, start};

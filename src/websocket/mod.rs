pub mod broadcaster;
pub mod connection;
pub mod handler;
pub mod types;

pub use handler::{ws_display_handler, ws_monitor_handler};

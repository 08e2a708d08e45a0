//! Delivery backends (Telegram lives in its own crate).

pub mod audit;
pub mod debug;
pub mod port;
pub mod throttled;

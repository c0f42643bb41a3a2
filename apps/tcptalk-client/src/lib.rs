pub mod config;
pub mod duplex;
pub mod error;
pub mod terminal;

pub use duplex::{ChatConnection, DisconnectReason, InboundEvent, UiChannels};

//! Message types exchanged with the host gateway
//!
//! The host hands inbound channel messages to the intake gate, and the
//! sync engine hands the same shape back to the host when replaying.

pub mod events;

pub use events::InboundMessage;

//! Inter-agent message protocol — envelope, taxonomy, and codec.

pub mod message;

pub use message::{Message, MessageKind};

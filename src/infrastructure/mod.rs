pub mod connection_registry;
pub mod messaging;
pub mod persistence;

pub use connection_registry::{ConnectionRegistry, ConnectionSender};

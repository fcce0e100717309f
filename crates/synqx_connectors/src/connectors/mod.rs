//! Reference connector implementations. Each one registers itself with a
//! [`crate::registry::ConnectorRegistry`] via a zero-argument factory
//! function matching [`crate::registry::ConnectorFactory`].

pub mod memory;
pub mod object_store;
pub mod postgres;

use crate::registry::{ConnectorHandle, ConnectorRegistry};

fn postgres_factory() -> Option<ConnectorHandle> {
    Some(postgres::handle())
}

fn memory_factory() -> Option<ConnectorHandle> {
    Some(memory::handle_for(memory::MemoryConnector::new()))
}

fn object_store_factory() -> Option<ConnectorHandle> {
    Some(object_store::handle_for(object_store::ObjectStoreConnector::new()))
}

/// Registers every reference connector this crate ships with `registry`.
/// Agent/control-plane startup calls this once before serving traffic.
pub fn register_builtins(registry: &ConnectorRegistry) {
    registry.register_if_available("postgres", postgres_factory);
    registry.register_if_available("memory", memory_factory);
    registry.register_if_available("object_store", object_store_factory);
}

//! Adapters behind the domain ports: storage backends, the system clock,
//! and the sandbox processor/notifier the daemon runs with.

pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod sandbox;

//! Pure in-memory implementation of the scheduling core's [`store`]
//! traits (`scheduling_core::store`), used by this workspace's own test
//! suite. Nothing here is meant for production persistence; a real
//! deployment backs the same trait family with whatever table store it
//! runs.

mod store;

pub use store::InMemoryStore;

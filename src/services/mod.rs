//! Sync engine services: the task variants and their runner, plus the
//! collaborators they consult (local cache, peers, registry, hashing).

pub mod cache;
pub mod hashing;
pub mod local_storage;
pub mod peers;
pub mod queue;
pub mod registry;
pub mod tasks;

//! Core data models for the sync engine.
//!
//! Object ids name files on disk, bag ids group objects for the ledger, and
//! cached objects record what is present locally. Peer URLs locate the
//! sibling nodes objects are fetched from.

pub mod bag_id;
pub mod cached_object;
pub mod object_id;
pub mod peer_url;

pub use bag_id::{BagId, DynamicBag, StaticBag};
pub use cached_object::CachedObject;
pub use object_id::ObjectId;
pub use peer_url::PeerUrl;

//! Expected content digests as recorded by the ledger.

use crate::errors::SyncResult;
use crate::models::{BagId, ObjectId};
use async_trait::async_trait;
use std::collections::HashMap;

/// Resolves the digest an object is expected to have.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// `Ok(None)` means the ledger records no digest for this object.
    async fn resolve_expected_hash(&self, bag: &BagId, id: &ObjectId)
    -> SyncResult<Option<String>>;
}

/// Digests supplied up front by an operator, keyed by object id.
///
/// Used for one-shot passes where no ledger connection is configured.
#[derive(Clone, Debug, Default)]
pub struct PinnedDigests {
    digests: HashMap<ObjectId, String>,
}

impl PinnedDigests {
    pub fn new(digests: impl IntoIterator<Item = (ObjectId, String)>) -> Self {
        Self {
            digests: digests.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

#[async_trait]
impl MetadataClient for PinnedDigests {
    async fn resolve_expected_hash(
        &self,
        _bag: &BagId,
        id: &ObjectId,
    ) -> SyncResult<Option<String>> {
        Ok(self.digests.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_pinned_digests() {
        let id = ObjectId::parse("9").unwrap();
        let pinned = PinnedDigests::new([(id.clone(), "abc".to_string())]);
        let bag = BagId::parse("static:council").unwrap();

        assert_eq!(
            pinned.resolve_expected_hash(&bag, &id).await.unwrap(),
            Some("abc".into())
        );
        assert_eq!(
            pinned
                .resolve_expected_hash(&bag, &ObjectId::parse("10").unwrap())
                .await
                .unwrap(),
            None
        );
        assert!(PinnedDigests::default().is_empty());
    }
}

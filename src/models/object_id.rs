//! Identifier of a data object, which doubles as its filename on disk.

use crate::errors::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_OBJECT_ID_LEN: usize = 1024;

/// A validated data object identifier.
///
/// Committed objects live at `<uploads>/<object id>` with no extension, so
/// the id must be a single safe path component.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Validate a raw id.
    ///
    /// Rejects empty or oversized ids, the `.` and `..` path components,
    /// path separators and control bytes (NUL included).
    pub fn parse(raw: impl Into<String>) -> SyncResult<Self> {
        let raw = raw.into();
        let reject = |reason: &str| SyncError::InvalidObjectId {
            id: raw.clone(),
            reason: reason.into(),
        };

        if raw.is_empty() {
            return Err(reject("must not be empty"));
        }
        if raw.len() > MAX_OBJECT_ID_LEN {
            return Err(reject("must be at most 1024 bytes"));
        }
        if raw == "." || raw == ".." {
            return Err(reject("must not be `.` or `..`"));
        }
        if raw
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'/' || b == b'\\')
        {
            return Err(reject("must not contain separators or control characters"));
        }

        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_ids() {
        let id = ObjectId::parse("obj-42").unwrap();
        assert_eq!(id.as_str(), "obj-42");
        assert_eq!(id.to_string(), "obj-42");
        assert!(ObjectId::parse("1337").is_ok());
        for raw in ["a..b", "...", ".hidden", "a#b?c", "100% done"] {
            assert!(ObjectId::parse(raw).is_ok(), "{raw:?} should be accepted");
        }
    }

    #[test]
    fn rejects_unsafe_ids() {
        for raw in ["", ".", "..", "../etc", "a/b", "a\\b", "nul\0byte", "tab\tid"] {
            assert!(
                matches!(ObjectId::parse(raw), Err(SyncError::InvalidObjectId { .. })),
                "{raw:?} should be rejected"
            );
        }
        assert!(ObjectId::parse("x".repeat(1025)).is_err());
    }

    #[test]
    fn serde_goes_through_validation() {
        let ids: Vec<ObjectId> = serde_json::from_str(r#"["1","2"]"#).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(serde_json::to_string(&ids).unwrap(), r#"["1","2"]"#);
        assert!(serde_json::from_str::<Vec<ObjectId>>(r#"["../x"]"#).is_err());
    }
}

//! Bag identifiers: the grouping under which data objects are assigned to
//! storage buckets.
//!
//! Accepted textual forms:
//! - `static:council`
//! - `static:wg:<working group>`
//! - `dynamic:member:<member id>`
//! - `dynamic:channel:<channel id>`

use crate::errors::{SyncError, SyncResult};
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BagId {
    Static(StaticBag),
    Dynamic(DynamicBag),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StaticBag {
    Council,
    WorkingGroup(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DynamicBag {
    Member(u64),
    Channel(u64),
}

impl BagId {
    /// Parse the textual bag id used by the ledger and the sync driver.
    pub fn parse(raw: &str) -> SyncResult<Self> {
        let invalid = |reason: &str| SyncError::InvalidBagId {
            raw: raw.to_string(),
            reason: reason.into(),
        };

        let parts: Vec<&str> = raw.split(':').collect();
        match parts.as_slice() {
            ["static", "council"] => Ok(BagId::Static(StaticBag::Council)),
            ["static", "wg", group] => {
                if group.is_empty() {
                    return Err(invalid("working group name is empty"));
                }
                if !group
                    .chars()
                    .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_'))
                {
                    return Err(invalid(
                        "working group name allows lowercase letters, digits, and underscores",
                    ));
                }
                Ok(BagId::Static(StaticBag::WorkingGroup(group.to_string())))
            }
            ["dynamic", kind, id] => {
                let id = id
                    .parse::<u64>()
                    .map_err(|_| invalid("dynamic bag id must be an unsigned integer"))?;
                match *kind {
                    "member" => Ok(BagId::Dynamic(DynamicBag::Member(id))),
                    "channel" => Ok(BagId::Dynamic(DynamicBag::Channel(id))),
                    _ => Err(invalid("dynamic bag kind must be `member` or `channel`")),
                }
            }
            ["static", ..] => Err(invalid("static bag must be `council` or `wg:<name>`")),
            ["dynamic", ..] => Err(invalid("dynamic bag must be `dynamic:<kind>:<id>`")),
            _ => Err(invalid("must start with `static` or `dynamic`")),
        }
    }
}

impl fmt::Display for BagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BagId::Static(StaticBag::Council) => write!(f, "static:council"),
            BagId::Static(StaticBag::WorkingGroup(group)) => write!(f, "static:wg:{}", group),
            BagId::Dynamic(DynamicBag::Member(id)) => write!(f, "dynamic:member:{}", id),
            BagId::Dynamic(DynamicBag::Channel(id)) => write!(f, "dynamic:channel:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_bag_kind() {
        assert_eq!(
            BagId::parse("static:council").unwrap(),
            BagId::Static(StaticBag::Council)
        );
        assert_eq!(
            BagId::parse("static:wg:storage").unwrap(),
            BagId::Static(StaticBag::WorkingGroup("storage".into()))
        );
        assert_eq!(
            BagId::parse("dynamic:member:4").unwrap(),
            BagId::Dynamic(DynamicBag::Member(4))
        );
        assert_eq!(
            BagId::parse("dynamic:channel:1337").unwrap(),
            BagId::Dynamic(DynamicBag::Channel(1337))
        );
    }

    #[test]
    fn display_is_canonical() {
        for raw in [
            "static:council",
            "static:wg:content_directory",
            "dynamic:member:0",
            "dynamic:channel:77",
        ] {
            assert_eq!(BagId::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn rejects_malformed_ids() {
        for raw in [
            "",
            "council",
            "static:",
            "static:wg:",
            "static:wg:Storage",
            "static:council:extra",
            "dynamic:channel:",
            "dynamic:channel:-1",
            "dynamic:video:3",
            "dynamic:member:1:2",
        ] {
            assert!(
                matches!(BagId::parse(raw), Err(SyncError::InvalidBagId { .. })),
                "{raw:?} should be rejected"
            );
        }
    }
}

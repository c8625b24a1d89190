//! Base URL of a sibling storage node's API.

use crate::errors::{SyncError, SyncResult};
use std::fmt;
use url::Url;

/// A parsed peer base URL such as `http://peer:3333/` or
/// `https://node.example/storage/`.
///
/// Only `http`/`https` URLs with a hierarchical path are accepted, so
/// endpoints can always be derived by appending path segments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PeerUrl(Url);

impl PeerUrl {
    pub fn parse(raw: &str) -> SyncResult<Self> {
        let reject = |reason: String| SyncError::InvalidPeerUrl {
            url: raw.to_string(),
            reason,
        };

        let url = Url::parse(raw.trim()).map_err(|err| reject(err.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(reject(format!("unsupported scheme `{}`", url.scheme())));
        }
        if url.cannot_be_a_base() {
            return Err(reject("cannot be used as a base URL".into()));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(reject("must not carry a query or fragment".into()));
        }

        Ok(Self(url))
    }

    /// Append `segments` to the base path. Each segment is percent-encoded,
    /// so reserved characters (`#`, `?`, `/`, `%`) stay inside it.
    pub fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.0.clone();
        // Always Ok: `parse` rejects cannot-be-a-base URLs.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for PeerUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_appended_to_the_base_path() {
        for base in ["http://peer:3333", "http://peer:3333/"] {
            let peer = PeerUrl::parse(base).unwrap();
            assert_eq!(
                peer.endpoint(["api", "v1", "files", "42"]).as_str(),
                "http://peer:3333/api/v1/files/42"
            );
        }

        let nested = PeerUrl::parse("https://node.example/storage/").unwrap();
        assert_eq!(
            nested.endpoint(["api", "v1", "state", "data-objects"]).as_str(),
            "https://node.example/storage/api/v1/state/data-objects"
        );
    }

    #[test]
    fn reserved_characters_stay_in_their_segment() {
        let peer = PeerUrl::parse("http://peer").unwrap();

        let url = peer.endpoint(["files", "a#b"]);
        assert_eq!(url.as_str(), "http://peer/files/a%23b");
        assert_eq!(url.fragment(), None);

        let url = peer.endpoint(["files", "what?x=1"]);
        assert_eq!(url.query(), None);
        assert_eq!(url.path_segments().unwrap().last(), Some("what%3Fx=1"));

        let url = peer.endpoint(["files", "100% done"]);
        assert_eq!(url.path(), "/files/100%25%20done");
    }

    #[test]
    fn rejects_unusable_bases() {
        for raw in [
            "",
            "peer:3333",
            "not a url",
            "ftp://peer/",
            "mailto:ops@peer",
            "http://peer/?token=1",
            "http://peer/#frag",
        ] {
            assert!(
                matches!(PeerUrl::parse(raw), Err(SyncError::InvalidPeerUrl { .. })),
                "{raw:?} should be rejected"
            );
        }
    }
}

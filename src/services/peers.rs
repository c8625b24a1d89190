//! Queries against sibling storage nodes.

use crate::errors::{SyncError, SyncResult};
use crate::models::{ObjectId, PeerUrl};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Header identifying the requesting node, for peer-side diagnostics.
pub const HOST_ID_HEADER: &str = "x-colossus-host-id";

const DATA_OBJECTS_PATH: [&str; 4] = ["api", "v1", "state", "data-objects"];
const FILES_PATH: [&str; 3] = ["api", "v1", "files"];

/// Asks a peer which objects it currently holds.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Fails with a transport, timeout, or status error when the peer is
    /// unavailable for this attempt.
    async fn list_held_objects(&self, peer: &PeerUrl, host_id: &str) -> SyncResult<Vec<String>>;
}

/// [`PeerClient`] over the peers' HTTP state API.
#[derive(Clone)]
pub struct HttpPeerClient {
    client: Client,
    timeout: Duration,
}

impl HttpPeerClient {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn list_held_objects(&self, peer: &PeerUrl, host_id: &str) -> SyncResult<Vec<String>> {
        let url = peer.endpoint(DATA_OBJECTS_PATH);
        debug!("Sync - fetching available data for {}", url);

        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .header(HOST_ID_HEADER, host_id)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::PeerStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.json::<Vec<String>>().await?)
    }
}

/// Download location of `id` on `peer`.
pub fn object_url(peer: &PeerUrl, id: &ObjectId) -> Url {
    let [api, version, files] = FILES_PATH;
    peer.endpoint([api, version, files, id.as_str()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client() -> HttpPeerClient {
        HttpPeerClient::new(Client::new(), Duration::from_secs(5))
    }

    fn peer(raw: &str) -> PeerUrl {
        PeerUrl::parse(raw).unwrap()
    }

    #[test]
    fn object_urls_encode_the_id() {
        let id = ObjectId::parse("42").unwrap();
        assert_eq!(
            object_url(&peer("http://peer:3333/"), &id).as_str(),
            "http://peer:3333/api/v1/files/42"
        );
        assert_eq!(
            object_url(&peer("http://peer:3333/base"), &id).as_str(),
            "http://peer:3333/base/api/v1/files/42"
        );

        let id = ObjectId::parse("a#b?c").unwrap();
        let url = object_url(&peer("http://peer:3333"), &id);
        assert_eq!(url.as_str(), "http://peer:3333/api/v1/files/a%23b%3Fc");
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query(), None);
    }

    #[tokio::test]
    async fn lists_objects_and_sends_host_header() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1/state/data-objects")
                .header(HOST_ID_HEADER, "node-7");
            then.status(200).json_body(serde_json::json!(["1", "2", "obj-42"]));
        });

        let held = client()
            .list_held_objects(&peer(&server.base_url()), "node-7")
            .await
            .unwrap();

        mock.assert();
        assert_eq!(held, vec!["1", "2", "obj-42"]);
    }

    #[tokio::test]
    async fn non_success_status_is_a_peer_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/state/data-objects");
            then.status(503);
        });

        let err = client()
            .list_held_objects(&peer(&server.base_url()), "node-7")
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::PeerStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn slow_peer_times_out() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/state/data-objects");
            then.status(200)
                .json_body(serde_json::json!([]))
                .delay(Duration::from_secs(2));
        });

        let err = HttpPeerClient::new(Client::new(), Duration::from_millis(100))
            .list_held_objects(&peer(&server.base_url()), "node-7")
            .await
            .unwrap_err();

        assert!(err.is_timeout(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn malformed_body_is_an_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/state/data-objects");
            then.status(200).body("not json");
        });

        let result = client()
            .list_held_objects(&peer(&server.base_url()), "node-7")
            .await;

        assert!(matches!(result, Err(SyncError::Http(_))));
    }
}

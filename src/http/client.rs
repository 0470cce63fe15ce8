//! HTTP peer client
//!
//! [`HttpPeer`] fetches values from one remote peer over the wire protocol:
//! `GET <base>/<escaped group>/<escaped key>` answered with a protobuf
//! [`GetResponse`] body.

use async_trait::async_trait;
use prost::Message;
use reqwest::Client;
use url::Url;

use crate::error::{Error, Result};
use crate::http::wire::{GetRequest, GetResponse};
use crate::peers::{Context, PeerClient};

/// A remote peer reachable over HTTP.
#[derive(Debug, Clone)]
pub struct HttpPeer {
    /// Base URL including the serving path, e.g.
    /// `http://10.0.0.2:8000/_groupcache/`
    base_url: Url,
    client: Client,
}

impl HttpPeer {
    /// Create a peer client for `base_url` (the peer's address joined
    /// with the pool's base path) using a dedicated HTTP client.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(base_url, Client::new())
    }

    /// Create a peer client reusing an existing HTTP client, so one
    /// connection pool serves every peer.
    pub fn with_client(base_url: &str, client: Client) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|err| Error::PeerUrl(err.to_string()))?;
        Ok(Self { base_url, client })
    }

    /// The URL serving `group` and `key`, with both escaped as single
    /// path segments.
    fn request_url(&self, group: &str, key: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::PeerUrl(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .push(group)
            .push(key);
        Ok(url)
    }
}

#[async_trait]
impl PeerClient for HttpPeer {
    async fn get(&self, ctx: &Context, request: &GetRequest) -> Result<GetResponse> {
        let url = self.request_url(&request.group, &request.key)?;

        let mut http_request = self.client.get(url);
        if let Some(remaining) = ctx.remaining() {
            http_request = http_request.timeout(remaining);
        }

        let response = http_request.send().await?;
        if !response.status().is_success() {
            return Err(Error::PeerStatus {
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await?;
        Ok(GetResponse::decode(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url_joins_base_path() {
        let peer = HttpPeer::new("http://10.0.0.2:8000/_groupcache/").expect("valid base");
        let url = peer.request_url("colors", "red").expect("url builds");
        assert_eq!(url.as_str(), "http://10.0.0.2:8000/_groupcache/colors/red");
    }

    #[test]
    fn test_request_url_escapes_segments() {
        let peer = HttpPeer::new("http://10.0.0.2:8000/_groupcache/").expect("valid base");
        let url = peer
            .request_url("my group", "a/b c")
            .expect("url builds");
        assert_eq!(
            url.as_str(),
            "http://10.0.0.2:8000/_groupcache/my%20group/a%2Fb%20c"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        assert!(matches!(
            HttpPeer::new("not a url"),
            Err(Error::PeerUrl(_))
        ));
    }
}

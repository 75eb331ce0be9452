//! HTTP channel to the application hosting the actors.

use async_trait::async_trait;
use capa_core::{
    ActorInvoker, ActorReference, InvokeEnvelope, InvokeResponse, InvokeStatus, MetadataMap,
    RuntimeError, RuntimeResult,
};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Headers that describe one hop and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, Error)]
pub enum AppChannelError {
    #[error("invalid app base URL: {0}")]
    BaseUrl(#[from] url::ParseError),

    #[error("app base URL cannot carry a path: {0}")]
    NotABase(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Forwards invocations to `{base_url}/actors/{type}/{id}/method/{method}`.
#[derive(Debug, Clone)]
pub struct HttpAppChannel {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpAppChannel {
    /// Channel to an application listening on `127.0.0.1:{port}`.
    pub fn new(port: u16) -> Result<Self, AppChannelError> {
        Self::with_base_url(&format!("http://127.0.0.1:{port}"))
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, AppChannelError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(AppChannelError::NotABase(base_url.into()));
        }
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, base_url })
    }

    /// Each identity part becomes exactly one encoded path segment, so a
    /// decoded `/`, `?` or `#` can never address another actor or method.
    fn method_url(&self, actor: &ActorReference, envelope: &InvokeEnvelope) -> RuntimeResult<Url> {
        let parts = [
            actor.actor_type.as_str(),
            actor.actor_id.as_str(),
            envelope.method.as_str(),
        ];
        if let Some(part) = parts.iter().find(|part| is_dot_segment(part)) {
            return Err(RuntimeError::failed(format!(
                "invalid path segment {part:?} for app channel"
            )));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RuntimeError::failed("app base URL cannot carry a path"))?
            .pop_if_empty()
            .push("actors")
            .push(parts[0])
            .push(parts[1])
            .push("method")
            .push(parts[2]);
        url.set_query((!envelope.query.is_empty()).then_some(envelope.query.as_str()));
        Ok(url)
    }
}

/// `url` drops these segments instead of encoding them.
fn is_dot_segment(part: &str) -> bool {
    matches!(part, "" | "." | "..")
}

#[async_trait]
impl ActorInvoker for HttpAppChannel {
    async fn invoke(
        &self,
        actor: &ActorReference,
        envelope: InvokeEnvelope,
    ) -> RuntimeResult<InvokeResponse> {
        let verb = reqwest::Method::from_bytes(envelope.verb.as_bytes())
            .map_err(|e| RuntimeError::failed(format!("invalid verb {}: {e}", envelope.verb)))?;
        let url = self.method_url(actor, &envelope)?;
        debug!(%actor, method = %envelope.method, %url, "forwarding invocation to app");

        let mut headers = to_header_map(&envelope.metadata);
        if !envelope.content_type.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&envelope.content_type) {
                headers.insert(CONTENT_TYPE, value);
            }
        }

        let response = self
            .client
            .request(verb, url)
            .headers(headers)
            .body(envelope.data)
            .send()
            .await
            .map_err(|e| RuntimeError::failed(format!("app channel request failed: {e}")))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let headers = to_metadata(response.headers());
        let data = response
            .bytes()
            .await
            .map_err(|e| RuntimeError::failed(format!("failed reading app response: {e}")))?
            .to_vec();

        Ok(InvokeResponse {
            status: InvokeStatus::http(status),
            headers,
            content_type,
            data,
        })
    }
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP
        .iter()
        .any(|hop| name.eq_ignore_ascii_case(hop))
}

/// Invalid names or values are dropped.
fn to_header_map(metadata: &MetadataMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, values) in metadata {
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
            continue;
        }
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        for value in values {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.append(name.clone(), value);
            }
        }
    }
    headers
}

fn to_metadata(headers: &HeaderMap) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    for (name, value) in headers {
        if is_hop_by_hop(name.as_str()) || name == CONTENT_TYPE {
            continue;
        }
        if let Ok(value) = value.to_str() {
            metadata
                .entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }
    metadata
}

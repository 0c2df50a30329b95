//! Identity probe logic.
//!
//! Asks the managed server who it is via its build-info endpoint. A server
//! that cannot be reached, answers non-2xx, times out, or answers without a
//! version is reported as `None`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde::Deserialize;
use tracing::debug;

/// Path of the managed server's build-info endpoint.
pub const BUILD_INFO_PATH: &str = "/api/v1/status/buildinfo";

/// Self-reported identity of the managed server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub version: String,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub go_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Option<String>,
    data: Option<serde_json::Value>,
}

/// Something that can ask the managed server for its identity.
///
/// The port is passed on every call because operators can move the server
/// to another port at runtime.
#[async_trait]
pub trait IdentityProbe: Send + Sync {
    async fn probe(&self, port: u16) -> Option<BuildInfo>;
}

/// Probes `GET http://{host}:{port}{BUILD_INFO_PATH}`.
#[derive(Debug, Clone)]
pub struct HttpIdentityProbe {
    host: String,
    timeout: Duration,
}

impl HttpIdentityProbe {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            timeout,
        }
    }

    /// Probe for a server on `localhost`.
    pub fn localhost(timeout: Duration) -> Self {
        Self::new("localhost", timeout)
    }

    fn address(&self, port: u16) -> String {
        format!("{}:{port}", self.host)
    }
}

#[async_trait]
impl IdentityProbe for HttpIdentityProbe {
    async fn probe(&self, port: u16) -> Option<BuildInfo> {
        let body = http_get(&self.address(port), BUILD_INFO_PATH, self.timeout).await?;
        parse_build_info(&body)
    }
}

/// Parse a build-info response. A payload without a version is absent.
pub fn parse_build_info(body: &[u8]) -> Option<BuildInfo> {
    let envelope: Envelope = match serde_json::from_slice(body) {
        Ok(env) => env,
        Err(e) => {
            debug!(error = %e, "build info is not valid JSON");
            return None;
        }
    };

    if let Some(status) = envelope.status.as_deref() {
        if status != "success" {
            debug!(%status, "build info request not successful");
            return None;
        }
    }

    let info: BuildInfo = serde_json::from_value(envelope.data?).ok()?;
    if info.version.trim().is_empty() {
        return None;
    }
    Some(info)
}

/// Issue a GET and return the body of a 2xx response.
async fn http_get(address: &str, path: &str, timeout: Duration) -> Option<Bytes> {
    let uri = format!("http://{address}{path}");

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect(address).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %uri, "identity probe connection failed");
                return None;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %uri, "identity probe handshake failed");
                return None;
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", address)
            .header("user-agent", "promctl-probe/0.1")
            .header("accept", "application/json")
            .body(http_body_util::Empty::<Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, %uri, "invalid identity probe request");
                return None;
            }
        };

        let resp = match sender.send_request(req).await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(error = %e, %uri, "identity probe request failed");
                return None;
            }
        };

        if !resp.status().is_success() {
            debug!(status = %resp.status(), %uri, "identity probe non-2xx");
            return None;
        }

        match resp.into_body().collect().await {
            Ok(collected) => Some(collected.to_bytes()),
            Err(e) => {
                debug!(error = %e, %uri, "identity probe body read failed");
                None
            }
        }
    })
    .await;

    match result {
        Ok(body) => body,
        Err(_) => {
            debug!(%uri, "identity probe timed out");
            None
        }
    }
}

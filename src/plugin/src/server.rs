//! HTTP server for the authorization plugin protocol.
//!
//! Listens on a Unix domain socket and routes the daemon's plugin calls to
//! the decision engine.

use std::convert::Infallible;
use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hyper::server::conn::Http;
use hyper::service::service_fn;
use hyper::{header, Body, Method, Request, Response, StatusCode};
use serde::Serialize;
use tokio::net::UnixListener;

use imgauthz_core::error::{AuthzError, Result};
use imgauthz_runtime::DecisionEngine;

use crate::error::error_to_response;
use crate::protocol::{ActivateResponse, AuthzRequest, AuthzResponse, PLUGIN_CONTENT_TYPE};

/// Socket the daemon discovers the plugin on.
pub const DEFAULT_SOCKET_PATH: &str = "/run/docker/plugins/img-authz-plugin.sock";

/// Owner and group read/write.
const SOCKET_MODE: u32 = 0o660;

pub const ACTIVATE_PATH: &str = "/Plugin.Activate";
pub const AUTHZ_REQUEST_PATH: &str = "/AuthZPlugin.AuthZReq";
pub const AUTHZ_RESPONSE_PATH: &str = "/AuthZPlugin.AuthZRes";
pub const METRICS_PATH: &str = "/metrics";

/// Authorization plugin server.
pub struct PluginServer {
    /// Path to the Unix domain socket.
    socket_path: PathBuf,
    /// Shared decision engine.
    engine: Arc<DecisionEngine>,
}

impl PluginServer {
    /// Create a new plugin server.
    pub fn new(socket_path: PathBuf, engine: Arc<DecisionEngine>) -> Self {
        Self {
            socket_path,
            engine,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn engine(&self) -> &Arc<DecisionEngine> {
        &self.engine
    }

    /// Bind the socket, replacing a stale one.
    pub fn bind(&self) -> Result<UnixListener> {
        // Remove existing socket file if present
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        // Ensure parent directory exists
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        std::fs::set_permissions(
            &self.socket_path,
            std::fs::Permissions::from_mode(SOCKET_MODE),
        )?;
        Ok(listener)
    }

    /// Serve until Ctrl-C or SIGTERM.
    pub async fn serve(&self) -> Result<()> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    /// Serve until `shutdown` completes, then remove the socket.
    pub async fn serve_with_shutdown<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = self.bind()?;

        tracing::info!(
            socket = %self.socket_path.display(),
            "Plugin server listening"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping plugin server");
                    break;
                }
                accepted = listener.accept() => {
                    let stream = match accepted {
                        Ok((stream, _)) => stream,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    let engine = self.engine.clone();
                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let engine = engine.clone();
                            async move { Ok::<_, Infallible>(handle(&engine, req).await) }
                        });
                        if let Err(e) = Http::new().serve_connection(stream, service).await {
                            tracing::debug!(error = %e, "Connection closed with error");
                        }
                    });
                }
            }
        }

        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            tracing::debug!(error = %e, "Failed to remove socket");
        }
        Ok(())
    }
}

/// Answer one HTTP request.
pub async fn handle(engine: &DecisionEngine, req: Request<Body>) -> Response<Body> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    match hyper::body::to_bytes(req.into_body()).await {
        Ok(body) => route(engine, &method, &path, &body).await,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Failed to read request body");
            plugin_response(&AuthzResponse::error(format!(
                "failed to read request body: {}",
                e
            )))
        }
    }
}

/// Dispatch a request with its body already read.
pub async fn route(
    engine: &DecisionEngine,
    method: &Method,
    path: &str,
    body: &[u8],
) -> Response<Body> {
    match (method, path) {
        (&Method::POST, ACTIVATE_PATH) => {
            tracing::info!("Plugin activated");
            plugin_response(&ActivateResponse::default())
        }
        (&Method::POST, AUTHZ_REQUEST_PATH) => match parse_request(body) {
            Ok(request) => {
                let decision = engine.authorize(&request.to_command()).await;
                plugin_response(&AuthzResponse::from(&decision))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Malformed authorization request");
                plugin_response(&error_to_response(e))
            }
        },
        (&Method::POST, AUTHZ_RESPONSE_PATH) => match parse_request(body) {
            Ok(request) => {
                let decision = engine.authorize_response(&request.to_command()).await;
                plugin_response(&AuthzResponse::from(&decision))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Malformed authorization response check");
                plugin_response(&error_to_response(e))
            }
        },
        (&Method::GET, METRICS_PATH) => {
            json_response(&engine.metrics().snapshot().await, "application/json")
        }
        _ => {
            tracing::debug!(method = %method, path = %path, "Unknown route");
            text_response(StatusCode::NOT_FOUND, "404 page not found\n")
        }
    }
}

fn parse_request(body: &[u8]) -> Result<AuthzRequest> {
    if body.is_empty() {
        return Err(AuthzError::ParseError("empty request body".to_string()));
    }
    Ok(serde_json::from_slice(body)?)
}

fn plugin_response<T: Serialize>(value: &T) -> Response<Body> {
    json_response(value, PLUGIN_CONTENT_TYPE)
}

fn json_response<T: Serialize>(value: &T, content_type: &str) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(bytes) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(bytes))
            .unwrap_or_else(|_| Response::new(Body::empty())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode response");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode response\n")
        }
    }
}

fn text_response(status: StatusCode, text: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(text));
    *response.status_mut() = status;
    response
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use imgauthz_core::{PluginConfig, RegistryPolicy, TrustPolicy};
    use imgauthz_runtime::StubCapability;

    fn engine(stub: Arc<StubCapability>) -> DecisionEngine {
        let config = PluginConfig {
            registries: RegistryPolicy::new(["docker.io"]),
            trust: TrustPolicy {
                server: Some("https://notary.local".to_string()),
                ..TrustPolicy::default()
            },
        };
        DecisionEngine::new(Arc::new(config), stub)
    }

    async fn body_json(response: Response<Body>) -> serde_json::Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn authz_body(method: &str, uri: &str, body: Option<&str>) -> Vec<u8> {
        let request = serde_json::json!({
            "RequestMethod": method,
            "RequestUri": uri,
            "RequestBody": body.map(|b| STANDARD.encode(b)),
        });
        serde_json::to_vec(&request).unwrap()
    }

    #[tokio::test]
    async fn test_activate() {
        let engine = engine(Arc::new(StubCapability::passing()));
        let resp = route(&engine, &Method::POST, ACTIVATE_PATH, b"").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            PLUGIN_CONTENT_TYPE
        );
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({"Implements": ["authz"]})
        );
    }

    #[tokio::test]
    async fn test_authz_request_allows_verified_pull() {
        let stub = Arc::new(StubCapability::passing());
        let engine = engine(stub.clone());
        let body = authz_body("POST", "/v1.41/images/create?fromImage=ubuntu&tag=22.04", None);

        let resp = route(&engine, &Method::POST, AUTHZ_REQUEST_PATH, &body).await;
        assert_eq!(body_json(resp).await, serde_json::json!({"Allow": true}));
        assert_eq!(stub.requests()[0].gun, "docker.io/library/ubuntu");
        assert_eq!(stub.requests()[0].tag, "22.04");
    }

    #[tokio::test]
    async fn test_authz_request_denies_failed_verification() {
        let engine = engine(Arc::new(StubCapability::failing("no trust data")));
        let body = authz_body(
            "POST",
            "/v1.41/containers/create",
            Some(r#"{"Image":"ubuntu"}"#),
        );

        let resp = route(&engine, &Method::POST, AUTHZ_REQUEST_PATH, &body).await;
        let json = body_json(resp).await;
        assert_eq!(json["Allow"], false);
        assert_eq!(json["Msg"], "no trust data");
    }

    #[tokio::test]
    async fn test_malformed_request_reports_err() {
        let engine = engine(Arc::new(StubCapability::passing()));
        let resp = route(&engine, &Method::POST, AUTHZ_REQUEST_PATH, b"{not json").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["Allow"], false);
        assert!(json["Err"].as_str().unwrap().starts_with("invalid request"));
    }

    #[tokio::test]
    async fn test_empty_request_reports_err() {
        let engine = engine(Arc::new(StubCapability::passing()));
        let resp = route(&engine, &Method::POST, AUTHZ_REQUEST_PATH, b"").await;
        let json = body_json(resp).await;
        assert_eq!(json["Allow"], false);
        assert!(json["Err"].is_string());
    }

    #[tokio::test]
    async fn test_authz_response_always_allows() {
        let stub = Arc::new(StubCapability::failing("never"));
        let engine = engine(stub.clone());
        let body = authz_body("POST", "/v1.41/images/create?fromImage=quay.io/x/y", None);

        let resp = route(&engine, &Method::POST, AUTHZ_RESPONSE_PATH, &body).await;
        assert_eq!(body_json(resp).await, serde_json::json!({"Allow": true}));
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_metrics_counts_requests() {
        let engine = engine(Arc::new(StubCapability::passing()));
        let body = authz_body("GET", "/v1.41/containers/json", None);
        route(&engine, &Method::POST, AUTHZ_REQUEST_PATH, &body).await;

        let resp = route(&engine, &Method::GET, METRICS_PATH, b"").await;
        let json = body_json(resp).await;
        assert_eq!(json["total_requests"], 1);
        assert_eq!(json["allowed"], 1);
        assert_eq!(json["by_state"]["not_image_command"], 1);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let engine = engine(Arc::new(StubCapability::passing()));
        let resp = route(&engine, &Method::POST, "/VolumeDriver.Create", b"{}").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = route(&engine, &Method::GET, AUTHZ_REQUEST_PATH, b"").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

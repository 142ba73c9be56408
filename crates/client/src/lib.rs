//! o2bridge client: shared request/response plumbing for REST-style backends.
//!
//! Every attempt carries the configured auth, content-type and identification headers.
//! 5xx and 429 responses (and transport failures) are retried with a fixed delay up to the
//! configured count; every other response ends the loop. Bodies are always read to the end.

#![forbid(unsafe_code)]

mod config;

pub use config::{Auth, ClientConfig, TlsConfig, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY};

use std::time::Instant;

use bytes::Bytes;
use o2bridge_core::{Ctx, O2Error, O2Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const MAX_ERROR_BODY: usize = 512;

/// One logical request; retried as a unit.
#[derive(Debug, Clone)]
pub struct Call {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Body>,
    auth: Option<Auth>,
}

#[derive(Debug, Clone)]
enum Body {
    Json(serde_json::Value),
    Raw { content_type: String, bytes: Bytes },
}

impl Call {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), body: None, auth: None }
    }
    pub fn get(path: impl Into<String>) -> Self { Self::new(Method::GET, path) }
    pub fn post(path: impl Into<String>) -> Self { Self::new(Method::POST, path) }
    pub fn put(path: impl Into<String>) -> Self { Self::new(Method::PUT, path) }
    pub fn delete(path: impl Into<String>) -> Self { Self::new(Method::DELETE, path) }

    pub fn query(mut self, k: &str, v: impl ToString) -> Self {
        self.query.push((k.to_string(), v.to_string()));
        self
    }

    pub fn query_opt(self, k: &str, v: Option<impl ToString>) -> Self {
        match v { Some(v) => self.query(k, v), None => self }
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> O2Result<Self> {
        self.body = Some(Body::Json(serde_json::to_value(body)?));
        Ok(self)
    }

    pub fn raw(mut self, content_type: &str, bytes: impl Into<Bytes>) -> Self {
        self.body = Some(Body::Raw { content_type: content_type.to_string(), bytes: bytes.into() });
        self
    }

    /// Override the configured auth for this call (e.g. a session token).
    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn path(&self) -> &str { &self.path }
}

/// Structured error payload probed from non-2xx bodies.
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default, alias = "errorCode", alias = "error_code")]
    code: Option<serde_json::Value>,
    #[serde(default, alias = "detail", alias = "errorMessage", alias = "error_description")]
    message: Option<String>,
}

pub struct BackendClient {
    backend: String,
    http: reqwest::Client,
    cfg: ClientConfig,
}

impl BackendClient {
    /// Build a client for `backend` (used in logs and metrics labels).
    pub fn new(backend: &str, cfg: ClientConfig) -> O2Result<Self> {
        let cfg = cfg.normalized();
        if cfg.endpoint.is_empty() {
            return Err(O2Error::InvalidArgument(format!("{}: endpoint is required", backend)));
        }
        reqwest::Url::parse(&cfg.endpoint)
            .map_err(|e| O2Error::InvalidArgument(format!("{}: invalid endpoint {}: {}", backend, cfg.endpoint, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (k, v) in cfg.headers.iter() {
            let name = HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| O2Error::InvalidArgument(format!("header {}: {}", k, e)))?;
            let value = HeaderValue::from_str(v).map_err(|e| O2Error::InvalidArgument(format!("header {}: {}", k, e)))?;
            headers.insert(name, value);
        }

        let mut builder = reqwest::Client::builder()
            .min_tls_version(reqwest::tls::Version::TLS_1_3)
            .user_agent(cfg.user_agent.clone())
            .default_headers(headers)
            .connect_timeout(cfg.timeout.min(std::time::Duration::from_secs(10)));
        builder = apply_tls(builder, &cfg.tls, backend)?;
        let http = builder.build().map_err(|e| O2Error::Internal(format!("{}: building http client: {}", backend, e)))?;
        Ok(Self { backend: backend.to_string(), http, cfg })
    }

    pub fn endpoint(&self) -> &str { &self.cfg.endpoint }

    pub fn config(&self) -> &ClientConfig { &self.cfg }

    /// Send and decode a JSON response.
    pub async fn json<T: DeserializeOwned>(&self, ctx: &Ctx, call: Call) -> O2Result<T> {
        let path = call.path.clone();
        let body = self.send(ctx, call).await?;
        serde_json::from_slice(&body).map_err(|e| O2Error::Internal(format!("{}: decoding {}: {}", self.backend, path, e)))
    }

    /// Send, discarding any response body.
    pub async fn exec(&self, ctx: &Ctx, call: Call) -> O2Result<()> {
        self.send(ctx, call).await.map(|_| ())
    }

    /// Send with retries; returns the raw 2xx body.
    pub async fn send(&self, ctx: &Ctx, call: Call) -> O2Result<Bytes> {
        let attempts = self.cfg.retry_attempts + 1;
        let mut last: Option<O2Error> = None;
        for attempt in 1..=attempts {
            ctx.check(&call.path)?;
            match self.attempt(ctx, &call).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_context() => return Err(e),
                Err(e) if e.is_retryable() => {
                    metrics::counter!("backend_retries_total", 1, "backend" => self.backend.clone());
                    warn!(backend = %self.backend, path = %call.path, attempt, of = attempts, error = %e, "retryable backend failure");
                    last = Some(e);
                    if attempt < attempts {
                        ctx.sleep(&call.path, self.cfg.retry_delay).await?;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        let last = last.unwrap_or_else(|| O2Error::Internal("no attempt made".into()));
        Err(O2Error::RetriesExhausted { attempts, last: Box::new(last) })
    }

    async fn attempt(&self, ctx: &Ctx, call: &Call) -> O2Result<Bytes> {
        let t0 = Instant::now();
        let url = format!("{}{}", self.cfg.endpoint, call.path);
        let mut rb = self.http.request(call.method.clone(), &url).timeout(self.cfg.timeout);
        if !call.query.is_empty() { rb = rb.query(&call.query); }
        rb = match call.auth.as_ref().unwrap_or(&self.cfg.auth) {
            Auth::None => rb,
            Auth::Bearer(token) => rb.bearer_auth(token),
            Auth::Basic { username, password } => rb.basic_auth(username, Some(password)),
            Auth::Header { name, value } => rb.header(name.as_str(), value.as_str()),
        };
        rb = match &call.body {
            Some(Body::Json(v)) => rb.json(v),
            Some(Body::Raw { content_type, bytes }) => rb.header(CONTENT_TYPE, content_type.as_str()).body(bytes.clone()),
            None => rb,
        };

        let resp = ctx.run(&call.path, async { rb.send().await.map_err(|e| transport_error(&self.backend, e)) }).await?;
        let status = resp.status();
        // always drain so the connection goes back to the pool
        let body = ctx.run(&call.path, async { resp.bytes().await.map_err(|e| transport_error(&self.backend, e)) }).await?;

        let took_ms = t0.elapsed().as_secs_f64() * 1000.0;
        metrics::counter!("backend_requests_total", 1, "backend" => self.backend.clone(), "status" => status.as_u16().to_string());
        metrics::histogram!("backend_request_ms", took_ms, "backend" => self.backend.clone());
        debug!(backend = %self.backend, method = %call.method, path = %call.path, status = status.as_u16(), took_ms = took_ms as u64, "backend call");

        if status.is_success() { Ok(body) } else { Err(decode_error(status, &body)) }
    }
}

fn apply_tls(mut builder: reqwest::ClientBuilder, tls: &TlsConfig, backend: &str) -> O2Result<reqwest::ClientBuilder> {
    let read = |p: &std::path::Path| {
        std::fs::read(p).map_err(|e| O2Error::InvalidArgument(format!("{}: reading {}: {}", backend, p.display(), e)))
    };
    if let Some(ca) = tls.ca_file.as_deref() {
        let cert = reqwest::Certificate::from_pem(&read(ca)?)
            .map_err(|e| O2Error::InvalidArgument(format!("{}: CA bundle: {}", backend, e)))?;
        builder = builder.tls_built_in_root_certs(false).add_root_certificate(cert);
    }
    match (tls.cert_file.as_deref(), tls.key_file.as_deref()) {
        (Some(cert), Some(key)) => {
            let mut pem = read(cert)?;
            pem.push(b'\n');
            pem.extend(read(key)?);
            let id = reqwest::Identity::from_pem(&pem)
                .map_err(|e| O2Error::InvalidArgument(format!("{}: client identity: {}", backend, e)))?;
            builder = builder.identity(id);
        }
        (None, None) => {}
        _ => return Err(O2Error::InvalidArgument(format!("{}: client cert and key must be set together", backend))),
    }
    if tls.insecure_skip_verify {
        warn!(backend = %backend, "TLS certificate verification disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }
    Ok(builder)
}

fn transport_error(backend: &str, e: reqwest::Error) -> O2Error {
    if e.is_timeout() {
        O2Error::ConnectionFailed(format!("{}: request timed out: {}", backend, e))
    } else if e.is_decode() || e.is_builder() {
        O2Error::Internal(format!("{}: {}", backend, e))
    } else {
        O2Error::ConnectionFailed(format!("{}: {}", backend, e))
    }
}

/// Prefer a structured `{code, message}` payload; fall back to the raw body.
fn decode_error(status: StatusCode, body: &[u8]) -> O2Error {
    if let Ok(p) = serde_json::from_slice::<ErrorPayload>(body) {
        if let Some(message) = p.message {
            let code = p.code.map(|c| match c { serde_json::Value::String(s) => s, other => other.to_string() });
            return O2Error::Backend { status: status.as_u16(), code, message };
        }
    }
    let text = String::from_utf8_lossy(body);
    let mut snippet: String = text.chars().take(MAX_ERROR_BODY).collect();
    if snippet.is_empty() { snippet = status.canonical_reason().unwrap_or("no body").to_string(); }
    O2Error::Backend { status: status.as_u16(), code: None, message: format!("unexpected status {}: {}", status.as_u16(), snippet) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use o2bridge_core::ErrorKind;

    #[test]
    fn structured_error_payload_is_surfaced() {
        let e = decode_error(StatusCode::NOT_FOUND, br#"{"code":"E404","message":"server s1 not found"}"#);
        match &e {
            O2Error::Backend { status, code, message } => {
                assert_eq!(*status, 404);
                assert_eq!(code.as_deref(), Some("E404"));
                assert_eq!(message, "server s1 not found");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(e.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn numeric_codes_and_aliases() {
        let e = decode_error(StatusCode::CONFLICT, br#"{"errorCode":17,"detail":"exists"}"#);
        assert!(matches!(e, O2Error::Backend { ref code, ref message, .. } if code.as_deref() == Some("17") && message == "exists"));
    }

    #[test]
    fn raw_body_kept_for_diagnosis() {
        let e = decode_error(StatusCode::BAD_GATEWAY, b"<html>upstream down</html>");
        assert!(e.to_string().contains("upstream down"));
        assert!(e.is_retryable());
        let e = decode_error(StatusCode::SERVICE_UNAVAILABLE, b"");
        assert!(e.to_string().contains("Service Unavailable"));
    }

    #[test]
    fn endpoint_is_validated() {
        assert!(BackendClient::new("dtias", ClientConfig::default()).is_err());
        assert!(BackendClient::new("dtias", ClientConfig::new("not a url")).is_err());
        assert!(BackendClient::new("dtias", ClientConfig::new("https://dtias.example")).is_ok());
    }

    #[test]
    fn cert_without_key_is_rejected() {
        let mut cfg = ClientConfig::new("https://dtias.example");
        cfg.tls.cert_file = Some("/nonexistent/cert.pem".into());
        let err = BackendClient::new("dtias", cfg).err().expect("must fail");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}

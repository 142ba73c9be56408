use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_USER_AGENT: &str = concat!("o2bridge/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Auth {
    #[default]
    None,
    Bearer(String),
    Basic { username: String, password: String },
    /// Token carried in a custom header (e.g. `X-Auth-Token`).
    Header { name: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM bundle replacing the system trust store.
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    /// Lab use only; logged loudly when set.
    pub insecure_skip_verify: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub endpoint: String,
    pub auth: Auth,
    /// Per-attempt timeout; zero means `DEFAULT_TIMEOUT`.
    pub timeout: Duration,
    /// Retries after the first attempt; zero means `DEFAULT_RETRY_ATTEMPTS`.
    pub retry_attempts: u32,
    /// Fixed delay between attempts; zero means `DEFAULT_RETRY_DELAY`.
    pub retry_delay: Duration,
    pub user_agent: String,
    /// Fixed identification headers sent with every request.
    pub headers: Vec<(String, String)>,
    pub tls: TlsConfig,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self { Self { endpoint: endpoint.into(), ..Default::default() } }

    pub fn normalized(mut self) -> Self {
        if self.timeout.is_zero() { self.timeout = DEFAULT_TIMEOUT; }
        if self.retry_attempts == 0 { self.retry_attempts = DEFAULT_RETRY_ATTEMPTS; }
        if self.retry_delay.is_zero() { self.retry_delay = DEFAULT_RETRY_DELAY; }
        if self.user_agent.is_empty() { self.user_agent = DEFAULT_USER_AGENT.to_string(); }
        while self.endpoint.ends_with('/') { self.endpoint.pop(); }
        self
    }

    /// Read `<prefix>_ENDPOINT`, `_TOKEN`, `_AUTH_HEADER`, `_USERNAME`, `_PASSWORD`, `_TIMEOUT_SECS`,
    /// `_RETRY_ATTEMPTS`, `_RETRY_DELAY_MS`, `_CA_FILE`, `_CERT_FILE`, `_KEY_FILE`, `_INSECURE_SKIP_VERIFY`.
    pub fn from_env(prefix: &str) -> Self {
        let var = |k: &str| std::env::var(format!("{}_{}", prefix, k)).ok().filter(|s| !s.is_empty());
        let num = |k: &str| var(k).and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);
        let auth = match (var("TOKEN"), var("AUTH_HEADER"), var("USERNAME"), var("PASSWORD")) {
            (Some(value), Some(name), _, _) => Auth::Header { name, value },
            (Some(token), None, _, _) => Auth::Bearer(token),
            (None, _, Some(username), password) => Auth::Basic { username, password: password.unwrap_or_default() },
            _ => Auth::None,
        };
        Self {
            endpoint: var("ENDPOINT").unwrap_or_default(),
            auth,
            timeout: Duration::from_secs(num("TIMEOUT_SECS")),
            retry_attempts: num("RETRY_ATTEMPTS") as u32,
            retry_delay: Duration::from_millis(num("RETRY_DELAY_MS")),
            user_agent: String::new(),
            headers: Vec::new(),
            tls: TlsConfig {
                ca_file: var("CA_FILE").map(PathBuf::from),
                cert_file: var("CERT_FILE").map(PathBuf::from),
                key_file: var("KEY_FILE").map(PathBuf::from),
                insecure_skip_verify: var("INSECURE_SKIP_VERIFY").map(|s| s == "1" || s.eq_ignore_ascii_case("true")).unwrap_or(false),
            },
        }
    }
}

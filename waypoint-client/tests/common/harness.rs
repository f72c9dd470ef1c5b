//! Test harness for bootstrap E2E tests.
//!
//! Runs a minimal HTTP/1.1 registry on a local tokio listener serving the
//! three endpoints a client touches during bootstrap:
//!
//! - `GET /config`
//! - `GET /get_ca_certificate`
//! - `GET /sign_ca_certificate?=<base64 CSR>`
//!
//! An rcgen CA signs submitted CSRs. Every request is counted per endpoint.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use base64::Engine as _;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, CertificateSigningRequestParams, DnType,
    IsCa, KeyPair,
};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use waypoint_client::{RetryPolicy, Settings};

/// Certificate authority backed by rcgen.
pub struct TestCa {
    key: KeyPair,
    cert: Certificate,
}

impl TestCa {
    pub fn new() -> Self {
        let key = KeyPair::generate().expect("Failed to generate CA key");
        let mut params =
            CertificateParams::new(Vec::<String>::new()).expect("Failed to build CA params");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(DnType::CommonName, "waypoint-test-ca");
        let cert = params
            .self_signed(&key)
            .expect("Failed to self-sign CA certificate");
        Self { key, cert }
    }

    pub fn pem(&self) -> String {
        self.cert.pem()
    }

    pub fn cert_der(&self) -> CertificateDer<'static> {
        self.cert.der().clone()
    }

    /// Server certificate and PKCS#8 key for `host`, which may be an IP.
    pub fn issue_server(&self, host: &str) -> (CertificateDer<'static>, PrivateKeyDer<'static>) {
        let server_key = KeyPair::generate().expect("Failed to generate server key");
        let mut params =
            CertificateParams::new(vec![host.to_string()]).expect("Failed to build server params");
        params.distinguished_name.push(DnType::CommonName, host);
        let cert = params
            .signed_by(&server_key, &self.cert, &self.key)
            .expect("Failed to sign server certificate");
        let key = PrivatePkcs8KeyDer::from(server_key.serialize_der());
        (cert.der().clone(), key.into())
    }

    /// Sign a PEM CSR, keeping its subject and public key.
    pub fn sign(&self, csr_pem: &str) -> Result<String, rcgen::Error> {
        let csr = CertificateSigningRequestParams::from_pem(csr_pem)?;
        Ok(csr.signed_by(&self.cert, &self.key)?.pem())
    }

    /// Issue a client bundle into `dir` the way an operator would provision one.
    pub fn issue_bundle(&self, dir: &Path) -> IssuedBundle {
        std::fs::create_dir_all(dir).expect("Failed to create bundle dir");

        let client_key = KeyPair::generate().expect("Failed to generate client key");
        let cert = CertificateParams::new(vec!["provisioned-client".to_string()])
            .expect("Failed to build client params")
            .signed_by(&client_key, &self.cert, &self.key)
            .expect("Failed to sign client certificate");

        let bundle = IssuedBundle {
            ca: dir.join("ca.crt"),
            cert: dir.join("client.crt"),
            key: dir.join("client.key"),
        };
        std::fs::write(&bundle.ca, self.pem()).unwrap();
        std::fs::write(&bundle.cert, cert.pem()).unwrap();
        std::fs::write(&bundle.key, client_key.serialize_pem()).unwrap();
        bundle
    }
}

/// Paths of a provisioned (not enrolled) client bundle.
#[derive(Debug, Clone)]
pub struct IssuedBundle {
    pub ca: PathBuf,
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Per-endpoint request counters.
#[derive(Debug, Default)]
pub struct Counters {
    pub config: AtomicUsize,
    pub ca: AtomicUsize,
    pub sign: AtomicUsize,
}

impl Counters {
    pub fn config(&self) -> usize {
        self.config.load(Ordering::SeqCst)
    }

    pub fn ca(&self) -> usize {
        self.ca.load(Ordering::SeqCst)
    }

    pub fn sign(&self) -> usize {
        self.sign.load(Ordering::SeqCst)
    }

    /// Requests to the CA endpoints.
    pub fn enrollment(&self) -> usize {
        self.ca() + self.sign()
    }
}

struct State {
    config_body: String,
    ca: TestCa,
    ca_body: Option<String>,
    stall_ca: bool,
    config_failures: AtomicUsize,
    counters: Arc<Counters>,
}

/// Registry configuration before it starts listening.
pub struct RegistryBuilder {
    services: serde_json::Map<String, Value>,
    ca_body: Option<String>,
    stall_ca: bool,
    config_failures: usize,
    ca: Option<TestCa>,
}

impl RegistryBuilder {
    /// Add a service entry under `key`.
    pub fn service(mut self, key: &str, entry: Value) -> Self {
        self.services.insert(key.to_string(), entry);
        self
    }

    /// Serve `body` from `/get_ca_certificate` instead of the CA certificate.
    pub fn ca_body(mut self, body: &str) -> Self {
        self.ca_body = Some(body.to_string());
        self
    }

    /// Accept `/get_ca_certificate` requests and never answer them.
    pub fn stall_ca(mut self) -> Self {
        self.stall_ca = true;
        self
    }

    /// Answer the first `n` `/config` requests with 503.
    pub fn fail_config(mut self, n: usize) -> Self {
        self.config_failures = n;
        self
    }

    pub fn with_ca(mut self, ca: TestCa) -> Self {
        self.ca = Some(ca);
        self
    }

    pub async fn start(self) -> TestRegistry {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test registry");
        let port = listener.local_addr().unwrap().port();
        let counters = Arc::new(Counters::default());

        let state = Arc::new(State {
            config_body: json!({ "Services": self.services }).to_string(),
            ca: self.ca.unwrap_or_else(TestCa::new),
            ca_body: self.ca_body,
            stall_ca: self.stall_ca,
            config_failures: AtomicUsize::new(self.config_failures),
            counters: Arc::clone(&counters),
        });

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let _ = handle(stream, state).await;
                });
            }
        });

        TestRegistry {
            port,
            counters,
            task,
        }
    }
}

/// A running registry. Stops when dropped.
pub struct TestRegistry {
    pub port: u16,
    pub counters: Arc<Counters>,
    task: JoinHandle<()>,
}

impl TestRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            services: serde_json::Map::new(),
            ca_body: None,
            stall_ca: false,
            config_failures: 0,
            ca: None,
        }
    }

    /// Host clients should use for both the registry and TLS service entries.
    pub fn domain(&self) -> &'static str {
        "127.0.0.1"
    }
}

impl Drop for TestRegistry {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(mut stream: TcpStream, state: Arc<State>) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut chunk = [0u8; 4096];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        request.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&request);
    let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    if target == "/get_ca_certificate" && state.stall_ca {
        state.counters.ca.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
    }
    let (status, body) = route(&state, &target);

    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn route(state: &State, target: &str) -> (&'static str, String) {
    let counters = &state.counters;

    if target == "/config" {
        counters.config.fetch_add(1, Ordering::SeqCst);
        let failing = state
            .config_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return ("503 Service Unavailable", "registry warming up".to_string());
        }
        return ("200 OK", state.config_body.clone());
    }

    if target == "/get_ca_certificate" {
        counters.ca.fetch_add(1, Ordering::SeqCst);
        let body = state.ca_body.clone().unwrap_or_else(|| state.ca.pem());
        return ("200 OK", body);
    }

    if let Some(encoded) = target.strip_prefix("/sign_ca_certificate?=") {
        counters.sign.fetch_add(1, Ordering::SeqCst);
        let signed = STANDARD
            .decode(encoded)
            .ok()
            .and_then(|csr| String::from_utf8(csr).ok())
            .and_then(|csr| state.ca.sign(&csr).ok());
        return match signed {
            Some(pem) => ("200 OK", pem),
            None => ("400 Bad Request", "invalid csr".to_string()),
        };
    }

    ("404 Not Found", "not found".to_string())
}

/// Accepts TCP connections, reads nothing and never answers.
pub struct SilentEndpoint {
    pub port: u16,
    task: JoinHandle<()>,
}

impl SilentEndpoint {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind silent endpoint");
        let port = listener.local_addr().unwrap().port();

        let task = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        Self { port, task }
    }
}

impl Drop for SilentEndpoint {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Registry entry in the `/config` wire shape.
pub fn service_entry(
    id: &str,
    name: &str,
    domain: &str,
    port: u16,
    proxy: u16,
    tls: bool,
) -> Value {
    json!({
        "Id": id,
        "Name": name,
        "Domain": domain,
        "Port": port,
        "Proxy": proxy,
        "TLS": tls,
    })
}

/// Entry listing credential paths, as registries do for provisioned clients.
pub fn tls_entry_with_paths(id: &str, domain: &str, port: u16, bundle: &IssuedBundle) -> Value {
    let mut entry = service_entry(id, id, domain, port, port + 1, true);
    entry["CertAuthorityTrust"] = json!(bundle.ca.display().to_string());
    entry["CertFile"] = json!(bundle.cert.display().to_string());
    entry["KeyFile"] = json!(bundle.key.display().to_string());
    entry
}

/// Settings for tests: cache under `root`, short timeouts, no retry.
pub fn test_settings(root: &Path) -> Settings {
    Settings::default()
        .with_cache_root(root)
        .with_request_timeout(std::time::Duration::from_secs(5))
        .with_retry(RetryPolicy::none())
}

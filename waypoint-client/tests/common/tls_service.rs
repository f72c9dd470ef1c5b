//! gRPC endpoint behind rustls that requires a client certificate.
//!
//! Every unary call is counted and answered with an empty message and
//! `grpc-status: 0`. The certificate chain each client presents during the
//! handshake is kept for inspection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use h2::server::SendResponse;
use h2::RecvStream;
use http::{HeaderMap, HeaderValue, Request, Response};
use rustls::pki_types::CertificateDer;
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

use super::TestCa;

type Chain = Vec<CertificateDer<'static>>;

/// A running mTLS service on `127.0.0.1`. Stops when dropped.
pub struct TlsService {
    pub port: u16,
    handshakes: Arc<Mutex<Vec<Chain>>>,
    calls: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl TlsService {
    /// Serve a certificate for `127.0.0.1` issued by `ca`, trusting only
    /// client certificates that chain to `ca`.
    pub async fn start(ca: &TestCa) -> Self {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut roots = RootCertStore::empty();
        roots.add(ca.cert_der()).expect("Failed to add CA root");
        let verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
                .build()
                .expect("Failed to build client verifier");

        let (cert, key) = ca.issue_server("127.0.0.1");
        let mut config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .expect("Failed to select protocol versions")
            .with_client_cert_verifier(verifier)
            .with_single_cert(vec![cert], key)
            .expect("Failed to build server config");
        config.alpn_protocols = vec![b"h2".to_vec()];
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind TLS service");
        let port = listener.local_addr().unwrap().port();
        let handshakes = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));

        let task = {
            let handshakes = Arc::clone(&handshakes);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let acceptor = acceptor.clone();
                    let handshakes = Arc::clone(&handshakes);
                    let calls = Arc::clone(&calls);
                    tokio::spawn(async move {
                        let Ok(tls) = acceptor.accept(stream).await else {
                            return;
                        };
                        let chain = tls.get_ref().1.peer_certificates().unwrap_or_default();
                        handshakes.lock().unwrap().push(chain.to_vec());
                        let _ = serve(tls, calls).await;
                    });
                }
            })
        };

        Self {
            port,
            handshakes,
            calls,
            task,
        }
    }

    /// Client certificate chains seen by completed handshakes, in order.
    pub fn handshakes(&self) -> Vec<Chain> {
        self.handshakes.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Drop for TlsService {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(tls: TlsStream<TcpStream>, calls: Arc<AtomicUsize>) -> Result<(), h2::Error> {
    let mut connection = h2::server::handshake(tls).await?;
    // Streams only make progress while the connection is polled.
    while let Some(request) = connection.accept().await {
        let (request, respond) = request?;
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let _ = answer(request, respond).await;
        });
    }
    Ok(())
}

async fn answer(
    request: Request<RecvStream>,
    mut respond: SendResponse<Bytes>,
) -> Result<(), h2::Error> {
    let mut body = request.into_body();
    while let Some(chunk) = body.data().await {
        let chunk = chunk?;
        let _ = body.flow_control().release_capacity(chunk.len());
    }

    let response = Response::builder()
        .header("content-type", "application/grpc")
        .body(())
        .expect("Failed to build response");
    let mut stream = respond.send_response(response, false)?;

    // Empty message: uncompressed flag plus zero length.
    stream.send_data(Bytes::from_static(&[0, 0, 0, 0, 0]), false)?;

    let mut trailers = HeaderMap::new();
    trailers.insert("grpc-status", HeaderValue::from_static("0"));
    stream.send_trailers(trailers)?;
    Ok(())
}

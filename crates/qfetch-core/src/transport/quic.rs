//! QUIC transport implementation using Quinn.
//!
//! Provides the rustls configurations for both ends, endpoint construction,
//! and the [`Connection`] implementation used by the server.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use quinn::{Endpoint, IdleTimeout, RecvStream, SendStream, TransportConfig};
use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
use tracing::debug;

use crate::constants::ALPN;
use crate::error::{Error, Result};
use crate::identity::{cert_hash, to_hex, TlsIdentity};

use super::Connection;

// =============================================================================
// Quinn Connection
// =============================================================================

/// A QUIC connection wrapper.
#[derive(Debug, Clone)]
pub struct QuicConnection {
    inner: quinn::Connection,
}

impl QuicConnection {
    /// Create a new connection wrapper.
    pub fn new(conn: quinn::Connection) -> Self {
        Self { inner: conn }
    }

    /// Get the underlying Quinn connection.
    pub fn inner(&self) -> &quinn::Connection {
        &self.inner
    }

    /// Open a bidirectional stream (client side).
    pub async fn open_stream(&self) -> Result<(SendStream, RecvStream)> {
        self.inner.open_bi().await.map_err(|e| Error::Transport {
            message: format!("failed to open stream: {}", e),
        })
    }

    /// Wait until the peer closes the connection or it idles out.
    pub async fn closed(&self) {
        let reason = self.inner.closed().await;
        debug!(peer = %self.inner.remote_address(), reason = %reason, "Connection closed");
    }

    /// Close the connection immediately.
    pub fn close(&self, reason: &str) {
        self.inner.close(0u32.into(), reason.as_bytes());
    }

    /// SHA-256 fingerprint of the certificate the peer presented, if any.
    pub fn peer_fingerprint(&self) -> Option<String> {
        let identity = self.inner.peer_identity()?;
        let certs = identity
            .downcast::<Vec<rustls::pki_types::CertificateDer<'static>>>()
            .ok()?;
        certs.first().map(|cert| to_hex(&cert_hash(cert.as_ref())))
    }
}

impl Connection for QuicConnection {
    type SendStream = SendStream;
    type RecvStream = RecvStream;

    async fn accept_stream(&self) -> Result<(SendStream, RecvStream)> {
        self.inner.accept_bi().await.map_err(|e| match e {
            quinn::ConnectionError::ApplicationClosed(_)
            | quinn::ConnectionError::ConnectionClosed(_)
            | quinn::ConnectionError::LocallyClosed => Error::ConnectionClosed,
            quinn::ConnectionError::TimedOut => Error::Timeout,
            other => Error::Transport {
                message: format!("failed to accept stream: {}", other),
            },
        })
    }

    fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_address()
    }
}

// =============================================================================
// TLS Configuration Helpers
// =============================================================================

fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Create server TLS configuration from a provisioned identity.
pub fn server_crypto_config(identity: &TlsIdentity) -> Result<rustls::ServerConfig> {
    let mut config = rustls::ServerConfig::builder_with_provider(crypto_provider())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| Error::Certificate {
            message: format!("unsupported TLS configuration: {}", e),
        })?
        .with_no_client_auth()
        .with_single_cert(vec![identity.certificate()], identity.private_key())
        .map_err(|e| Error::Certificate {
            message: format!("failed to create server config: {}", e),
        })?;

    config.alpn_protocols = vec![ALPN.to_vec()];
    Ok(config)
}

/// Create a client TLS configuration for a server with an ephemeral identity.
///
/// Any certificate is accepted unless `expected_cert_hash` pins one; handshake
/// signatures are always verified against the presented certificate.
pub fn client_crypto_config(expected_cert_hash: Option<&[u8]>) -> Result<rustls::ClientConfig> {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::DigitallySignedStruct;

    /// Trust-on-first-use verifier with optional certificate pinning.
    #[derive(Debug)]
    struct PinningVerifier {
        expected_hash: Option<Vec<u8>>,
        algorithms: WebPkiSupportedAlgorithms,
    }

    impl ServerCertVerifier for PinningVerifier {
        fn verify_server_cert(
            &self,
            end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> std::result::Result<ServerCertVerified, rustls::Error> {
            if let Some(expected) = &self.expected_hash {
                if cert_hash(end_entity.as_ref()) != *expected {
                    return Err(rustls::Error::General(
                        "certificate hash mismatch".to_string(),
                    ));
                }
            }
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            self.algorithms.supported_schemes()
        }
    }

    let provider = crypto_provider();
    let verifier = Arc::new(PinningVerifier {
        expected_hash: expected_cert_hash.map(|h| h.to_vec()),
        algorithms: provider.signature_verification_algorithms,
    });

    let mut config = rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| Error::Certificate {
            message: format!("unsupported TLS configuration: {}", e),
        })?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();

    config.alpn_protocols = vec![ALPN.to_vec()];
    Ok(config)
}

// =============================================================================
// Endpoints
// =============================================================================

/// Bind a server endpoint presenting `identity`.
///
/// Must be called from within a tokio runtime.
pub fn server_endpoint(
    identity: &TlsIdentity,
    bind_addr: SocketAddr,
    idle_timeout: Duration,
) -> Result<Endpoint> {
    let crypto = server_crypto_config(identity)?;
    let quic_crypto = QuicServerConfig::try_from(crypto).map_err(|e| Error::Certificate {
        message: format!("failed to create QUIC server config: {}", e),
    })?;

    let mut server_config = quinn::ServerConfig::with_crypto(Arc::new(quic_crypto));

    let mut transport = TransportConfig::default();
    transport.max_idle_timeout(Some(IdleTimeout::try_from(idle_timeout).map_err(|e| {
        Error::Config {
            message: format!("invalid idle timeout: {}", e),
        }
    })?));
    // Requests only ever arrive on bidirectional streams.
    transport.max_concurrent_uni_streams(0u8.into());
    server_config.transport_config(Arc::new(transport));

    Endpoint::server(server_config, bind_addr).map_err(Error::Io)
}

/// Create a client endpoint able to reach `server_addr`.
///
/// Binds an ephemeral port of the same address family.
pub fn client_endpoint(
    server_addr: SocketAddr,
    expected_cert_hash: Option<&[u8]>,
) -> Result<Endpoint> {
    let bind_addr = match server_addr.ip() {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };

    let mut endpoint = Endpoint::client(bind_addr).map_err(|e| Error::Transport {
        message: format!("failed to create QUIC endpoint: {}", e),
    })?;

    let crypto = client_crypto_config(expected_cert_hash)?;
    let client_config = quinn::ClientConfig::new(Arc::new(
        QuicClientConfig::try_from(crypto).map_err(|e| Error::Transport {
            message: format!("failed to create QUIC config: {}", e),
        })?,
    ));
    endpoint.set_default_client_config(client_config);

    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::provision_identity;

    #[test]
    fn server_config_advertises_alpn() {
        let identity = provision_identity().unwrap();
        let config = server_crypto_config(&identity).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"data-transfer".to_vec()]);
    }

    #[test]
    fn client_config_advertises_alpn() {
        let config = client_crypto_config(None).unwrap();
        assert_eq!(config.alpn_protocols, vec![ALPN.to_vec()]);
    }

    #[tokio::test]
    async fn server_endpoint_binds_ephemeral_port() {
        let identity = provision_identity().unwrap();
        let endpoint = server_endpoint(
            &identity,
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_ne!(endpoint.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn pinned_client_connects_and_sees_fingerprint() {
        let identity = provision_identity().unwrap();
        let server = server_endpoint(
            &identity,
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_secs(5),
        )
        .unwrap();
        let addr = server.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let incoming = server.accept().await.expect("incoming");
            let conn = incoming.await.expect("handshake");
            QuicConnection::new(conn)
        });

        let pin = cert_hash(identity.cert_der());
        let client = client_endpoint(addr, Some(&pin)).unwrap();
        let conn = client
            .connect(addr, crate::constants::SERVER_NAME)
            .unwrap()
            .await
            .expect("client handshake");
        let conn = QuicConnection::new(conn);

        assert_eq!(conn.peer_fingerprint(), Some(identity.fingerprint()));
        let server_side = accept.await.unwrap();
        assert_eq!(server_side.remote_addr().port(), client.local_addr().unwrap().port());
    }

    #[tokio::test]
    async fn wrong_pin_is_rejected() {
        let identity = provision_identity().unwrap();
        let server = server_endpoint(
            &identity,
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_secs(5),
        )
        .unwrap();
        let addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            if let Some(incoming) = server.accept().await {
                let _ = incoming.await;
            }
        });

        let client = client_endpoint(addr, Some(&[0u8; 32])).unwrap();
        let result = client
            .connect(addr, crate::constants::SERVER_NAME)
            .unwrap()
            .await;
        assert!(result.is_err());
    }
}

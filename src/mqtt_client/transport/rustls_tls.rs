// SPDX-License-Identifier: MPL-2.0

//! Rustls-based TLS layer (feature-gated)

#[cfg(feature = "rustls-tls")]
mod imp {
    use super::super::{BoxedTransport, Endpoint, StreamLayer, Transport, TransportError};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tracing::debug;

    use rustls::client::danger::{ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::ServerName;
    use rustls::{ClientConfig as RustlsClientConfig, RootCertStore};
    use rustls_pki_types::pem::PemObject;
    use rustls_pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
    use tokio_rustls::{client::TlsStream, TlsConnector};

    /// TLS configuration for the rustls layer
    #[derive(Clone, Default, Debug)]
    pub struct RustlsTlsConfig {
        /// Load the platform trust store
        pub use_system_roots: bool,
        /// Extra root certificates (DER)
        pub custom_root_certs: Vec<Vec<u8>>,
        pub client_cert_chain: Option<Vec<Vec<u8>>>,
        pub client_private_key: Option<Vec<u8>>,
        /// Skip certificate chain validation. Testing only.
        pub danger_accept_invalid_certs: bool,
        /// Skip hostname verification. Testing only.
        pub danger_accept_invalid_hostnames: bool,
        pub alpn_protocols: Vec<Vec<u8>>,
        /// SNI override; the endpoint host is used when unset
        pub server_name: Option<String>,
    }

    impl RustlsTlsConfig {
        pub fn builder() -> RustlsTlsConfigBuilder {
            RustlsTlsConfigBuilder::default()
        }

        pub fn to_client_config(&self) -> Result<RustlsClientConfig, TransportError> {
            let mut roots = RootCertStore::empty();

            if self.use_system_roots {
                let native = rustls_native_certs::load_native_certs();
                if native.certs.is_empty() && !native.errors.is_empty() {
                    return Err(TransportError::Tls(format!(
                        "failed to load platform root certs: {:?}",
                        native.errors
                    )));
                }
                for cert in native.certs {
                    roots.add(cert).map_err(|e| {
                        TransportError::Tls(format!("failed to add root cert: {:?}", e))
                    })?;
                }
            }

            for cert in &self.custom_root_certs {
                roots.add(cert.clone().into()).map_err(|e| {
                    TransportError::Tls(format!("failed to add custom root: {:?}", e))
                })?;
            }

            let builder = RustlsClientConfig::builder().with_root_certificates(roots);
            let mut cfg = match (&self.client_cert_chain, &self.client_private_key) {
                (Some(chain), Some(key)) => {
                    let chain_der: Vec<CertificateDer<'static>> =
                        chain.iter().cloned().map(CertificateDer::from).collect();
                    let key_der = PrivateKeyDer::try_from(key.clone()).map_err(|e| {
                        TransportError::Tls(format!("failed to parse client private key: {}", e))
                    })?;
                    builder
                        .with_client_auth_cert(chain_der, key_der)
                        .map_err(|e| {
                            TransportError::Tls(format!("invalid client certificate: {}", e))
                        })?
                }
                _ => builder.with_no_client_auth(),
            };

            if !self.alpn_protocols.is_empty() {
                cfg.alpn_protocols = self.alpn_protocols.clone();
            }

            if self.danger_accept_invalid_certs || self.danger_accept_invalid_hostnames {
                cfg.dangerous()
                    .set_certificate_verifier(Arc::new(InsecureServerCertVerifier {
                        skip_name_check: self.danger_accept_invalid_hostnames,
                    }));
            }

            Ok(cfg)
        }
    }

    #[derive(Default)]
    pub struct RustlsTlsConfigBuilder {
        config: RustlsTlsConfig,
    }

    impl RustlsTlsConfigBuilder {
        pub fn use_system_roots(mut self, enable: bool) -> Self {
            self.config.use_system_roots = enable;
            self
        }

        /// Add root certificates from PEM bytes (one or more CERTIFICATE sections).
        pub fn add_roots_from_pem(mut self, pem_data: &[u8]) -> Result<Self, TransportError> {
            let before = self.config.custom_root_certs.len();
            for cert in CertificateDer::pem_slice_iter(pem_data).flatten() {
                self.config.custom_root_certs.push(cert.as_ref().to_vec());
            }
            if self.config.custom_root_certs.len() == before {
                return Err(TransportError::Tls(
                    "no valid certificates found in PEM data".to_string(),
                ));
            }
            Ok(self)
        }

        pub fn client_auth_from_pem(
            mut self,
            cert_chain_pem: &[u8],
            private_key_pem: &[u8],
        ) -> Result<Self, TransportError> {
            let chain: Vec<Vec<u8>> = CertificateDer::pem_slice_iter(cert_chain_pem)
                .filter_map(|r| r.ok().map(|c| c.as_ref().to_vec()))
                .collect();
            if chain.is_empty() {
                return Err(TransportError::Tls(
                    "no valid certificates found in client cert PEM".to_string(),
                ));
            }
            let key = PrivateKeyDer::from_pem_slice(private_key_pem).map_err(|e| {
                TransportError::Tls(format!("failed to parse client private key PEM: {:?}", e))
            })?;

            self.config.client_cert_chain = Some(chain);
            self.config.client_private_key = Some(key.secret_der().to_vec());
            Ok(self)
        }

        pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
            self.config.danger_accept_invalid_certs = accept;
            self
        }

        pub fn danger_accept_invalid_hostnames(mut self, accept: bool) -> Self {
            self.config.danger_accept_invalid_hostnames = accept;
            self
        }

        pub fn alpn_list(mut self, protocols: Vec<Vec<u8>>) -> Self {
            self.config.alpn_protocols = protocols;
            self
        }

        pub fn server_name(mut self, name: impl Into<String>) -> Self {
            self.config.server_name = Some(name.into());
            self
        }

        pub fn build(self) -> RustlsTlsConfig {
            self.config
        }
    }

    /// Accepts any chain, optionally still checking the name. Testing only.
    #[derive(Debug)]
    struct InsecureServerCertVerifier {
        skip_name_check: bool,
    }

    impl ServerCertVerifier for InsecureServerCertVerifier {
        fn verify_server_cert(
            &self,
            end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            if !self.skip_name_check {
                let cert = rustls::server::ParsedCertificate::try_from(end_entity)?;
                rustls::client::verify_server_name(&cert, server_name)?;
            }
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &rustls::DigitallySignedStruct,
        ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
            Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &rustls::DigitallySignedStruct,
        ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
            Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
            vec![
                rustls::SignatureScheme::RSA_PKCS1_SHA256,
                rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
                rustls::SignatureScheme::RSA_PKCS1_SHA384,
                rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
                rustls::SignatureScheme::RSA_PSS_SHA256,
                rustls::SignatureScheme::RSA_PSS_SHA384,
                rustls::SignatureScheme::RSA_PSS_SHA512,
                rustls::SignatureScheme::ED25519,
            ]
        }
    }

    impl Transport for TlsStream<BoxedTransport> {
        fn remote_addr(&self) -> Option<String> {
            self.get_ref().0.remote_addr()
        }
    }

    /// TLS over whatever stream the connector (or a previous layer) produced.
    pub struct RustlsTlsLayer {
        connector: TlsConnector,
        server_name: Option<String>,
    }

    impl RustlsTlsLayer {
        pub fn new(config: RustlsTlsConfig) -> Result<Self, TransportError> {
            let client_config = config.to_client_config()?;
            Ok(Self {
                connector: TlsConnector::from(Arc::new(client_config)),
                server_name: config.server_name,
            })
        }
    }

    #[async_trait]
    impl StreamLayer for RustlsTlsLayer {
        fn name(&self) -> &'static str {
            "TLS"
        }

        async fn handshake(
            &self,
            endpoint: &Endpoint,
            inner: BoxedTransport,
        ) -> Result<BoxedTransport, TransportError> {
            let host = self
                .server_name
                .clone()
                .unwrap_or_else(|| endpoint.host.clone());
            let server_name = ServerName::try_from(host.clone()).map_err(|_| {
                TransportError::InvalidAddress(format!("invalid DNS name for TLS: {}", host))
            })?;
            let stream = self
                .connector
                .connect(server_name, inner)
                .await
                .map_err(|e| TransportError::Handshake {
                    layer: "TLS",
                    reason: e.to_string(),
                })?;
            debug!("TLS established with {}", endpoint);
            Ok(Box::new(stream))
        }
    }

}

#[cfg(feature = "rustls-tls")]
pub use imp::{RustlsTlsConfig, RustlsTlsConfigBuilder, RustlsTlsLayer};

//! TLS connector built from a [`TrustStrategy`].

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::driver::config::TrustStrategy;
use crate::driver::error::{DriverError, DriverResult};

/// Connector plus the SNI name for `host`.
pub fn tls_connector(trust: &TrustStrategy, host: &str) -> DriverResult<(TlsConnector, ServerName<'static>)> {
    let client_config = match trust {
        TrustStrategy::TrustSystemCas => {
            let mut store = RootCertStore::empty();
            store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            rustls::ClientConfig::builder()
                .with_root_certificates(store)
                .with_no_client_auth()
        }
        TrustStrategy::TrustCustomCas(paths) => {
            let mut store = RootCertStore::empty();
            for path in paths {
                for cert in load_certs(path)? {
                    store
                        .add(cert)
                        .map_err(|e| DriverError::configuration(format!("invalid CA cert {:?}: {}", path, e)))?;
                }
            }
            rustls::ClientConfig::builder()
                .with_root_certificates(store)
                .with_no_client_auth()
        }
        TrustStrategy::TrustAllCertificates => rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(TrustAll))
            .with_no_client_auth(),
    };

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| DriverError::configuration(format!("invalid server name: {}", host)))?;

    Ok((TlsConnector::from(Arc::new(client_config)), server_name))
}

fn load_certs(path: &Path) -> DriverResult<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| DriverError::configuration(format!("cannot open cert file {:?}: {}", path, e)))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DriverError::configuration(format!("invalid cert file {:?}: {}", path, e)))
}

/// Accepts any server certificate (`+ssc` schemes).
#[derive(Debug)]
struct TrustAll;

impl ServerCertVerifier for TrustAll {
    fn verify_server_cert(
        &self,
        _: &CertificateDer<'_>,
        _: &[CertificateDer<'_>],
        _: &ServerName<'_>,
        _: &[u8],
        _: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_ca_file() {
        let trust = TrustStrategy::TrustCustomCas(vec![PathBuf::from("/nonexistent/ca.pem")]);
        let err = match tls_connector(&trust, "db.example.com") {
            Err(e) => e,
            Ok(_) => panic!("custom CA file should be required"),
        };
        assert!(matches!(err, DriverError::Configuration(_)));
        assert!(err.to_string().contains("cannot open"));
    }

    #[test]
    fn test_trust_all_builds() {
        assert!(tls_connector(&TrustStrategy::TrustAllCertificates, "localhost").is_ok());
    }

    #[test]
    fn test_ip_server_name() {
        assert!(tls_connector(&TrustStrategy::TrustSystemCas, "127.0.0.1").is_ok());
    }
}

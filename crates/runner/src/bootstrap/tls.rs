use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};

use super::BootstrapError;
use crate::config::TlsPaths;

fn read(path: &Path) -> Result<Vec<u8>, BootstrapError> {
    std::fs::read(path).map_err(|source| BootstrapError::Read { path: path.to_path_buf(), source })
}

fn parse_certificates(pem: &[u8], what: &str) -> Result<Vec<CertificateDer<'static>>, BootstrapError> {
    let certs = CertificateDer::pem_slice_iter(pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| BootstrapError::Tls(format!("parse {what} certificates: {e}")))?;
    if certs.is_empty() {
        return Err(BootstrapError::Tls(format!("no {what} certificates found")));
    }
    Ok(certs)
}

/// Server config for the artifact cache: TLS 1.3 only, client certificates
/// required and checked against the CA bundle.
pub fn load_server_tls(paths: &TlsPaths) -> Result<Arc<ServerConfig>, BootstrapError> {
    let certs = parse_certificates(&read(&paths.cert)?, "server")?;
    let key = PrivateKeyDer::from_pem_slice(&read(&paths.key)?)
        .map_err(|e| BootstrapError::Tls(format!("parse private key: {e}")))?;

    let mut roots = RootCertStore::empty();
    for ca in parse_certificates(&read(&paths.ca)?, "CA")? {
        roots.add(ca).map_err(|e| BootstrapError::Tls(format!("add CA certificate: {e}")))?;
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
        .build()
        .map_err(|e| BootstrapError::Tls(format!("client verifier: {e}")))?;
    let cfg = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| BootstrapError::Tls(format!("protocol versions: {e}")))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| BootstrapError::Tls(format!("server config: {e}")))?;
    Ok(Arc::new(cfg))
}

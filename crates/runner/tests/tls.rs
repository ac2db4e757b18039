#![forbid(unsafe_code)]

use std::path::Path;

use gatesync_runner::bootstrap::load_server_tls;
use gatesync_runner::config::TlsPaths;
use gatesync_runner::BootstrapError;
use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};

fn write_material(dir: &Path) -> TlsPaths {
    let ca_key = KeyPair::generate().unwrap();
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let ca = ca_params.self_signed(&ca_key).unwrap();

    let server_key = KeyPair::generate().unwrap();
    let server = CertificateParams::new(vec!["gatesync.gatesync-system.svc".to_string()])
        .unwrap()
        .signed_by(&server_key, &ca, &ca_key)
        .unwrap();

    let paths = TlsPaths { cert: dir.join("tls.crt"), key: dir.join("tls.key"), ca: dir.join("ca.crt") };
    std::fs::write(&paths.cert, server.pem()).unwrap();
    std::fs::write(&paths.key, server_key.serialize_pem()).unwrap();
    std::fs::write(&paths.ca, ca.pem()).unwrap();
    paths
}

#[test]
fn loads_mutual_tls_config() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_material(dir.path());
    let cfg = load_server_tls(&paths).unwrap();
    assert!(cfg.alpn_protocols.is_empty());
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut paths = write_material(dir.path());
    paths.ca = dir.path().join("nope.crt");
    assert!(matches!(load_server_tls(&paths), Err(BootstrapError::Read { .. })));
}

#[test]
fn ca_file_without_certificates_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_material(dir.path());
    std::fs::write(&paths.ca, "not a certificate\n").unwrap();
    let err = load_server_tls(&paths).unwrap_err();
    assert!(matches!(err, BootstrapError::Tls(ref m) if m.contains("CA")), "{err}");
}

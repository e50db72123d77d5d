//! Per-domain TLS material and cached server configurations.
//!
//! # Responsibilities
//! - Locate `{domain}-cert.pem` / `{domain}-key.pem` under the cert directory
//! - Fall back to the wildcard local pair for local-suffix domains
//! - Build rustls configs with a pinned protocol window and AEAD-only suites
//! - Cache built configs until explicitly cleared
//!
//! # Design Decisions
//! - Builds are single-flight behind a mutex; lookups are lock-free (DashMap)
//! - Files are read once per domain; on-disk changes need a cache clear

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use rustls::crypto::ring::{cipher_suite, default_provider};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use serde::Serialize;
use thiserror::Error;

use crate::config::TlsConfig;

/// Cache key and file stem of the wildcard local pair.
pub const WILDCARD_LOCAL: &str = "wildcard-local";

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("no certificate for {0}")]
    NotFound(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates in {0}")]
    EmptyChain(PathBuf),

    #[error("no private key in {0}")]
    MissingKey(PathBuf),

    #[error("invalid TLS material: {0}")]
    Rustls(#[from] rustls::Error),
}

/// A `*-cert.pem` file found on disk.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CertificateInfo {
    pub domain: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub key_present: bool,
}

/// Lazily-built, cached TLS server configurations keyed by domain.
pub struct TlsContextStore {
    certs_dir: PathBuf,
    keys_dir: PathBuf,
    local_suffix: String,
    cache: DashMap<String, Arc<ServerConfig>>,
    build_lock: Mutex<()>,
}

impl TlsContextStore {
    pub fn new(cert_dir: impl AsRef<Path>, local_suffix: impl Into<String>) -> Self {
        let base = cert_dir.as_ref();
        Self {
            certs_dir: base.join("certs"),
            keys_dir: base.join("private"),
            local_suffix: local_suffix.into().to_ascii_lowercase(),
            cache: DashMap::new(),
            build_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &TlsConfig) -> Self {
        Self::new(&config.cert_dir, config.local_suffix.clone())
    }

    pub fn cert_path(&self, name: &str) -> PathBuf {
        self.certs_dir.join(format!("{name}-cert.pem"))
    }

    pub fn key_path(&self, name: &str) -> PathBuf {
        self.keys_dir.join(format!("{name}-key.pem"))
    }

    pub fn is_local_domain(&self, domain: &str) -> bool {
        !self.local_suffix.is_empty() && domain.to_ascii_lowercase().ends_with(&self.local_suffix)
    }

    /// File stem of the pair that serves `domain`, if any exists on disk.
    pub fn material_for(&self, domain: &str) -> Option<String> {
        let domain = domain.to_ascii_lowercase();
        if self.has_pair(&domain) {
            return Some(domain);
        }
        if self.is_local_domain(&domain) && self.has_pair(WILDCARD_LOCAL) {
            return Some(WILDCARD_LOCAL.to_string());
        }
        None
    }

    fn has_pair(&self, name: &str) -> bool {
        self.cert_path(name).is_file() && self.key_path(name).is_file()
    }

    /// TLS context for `domain`; `None` when no usable material exists.
    pub fn get_context(&self, domain: &str) -> Option<Arc<ServerConfig>> {
        match self.context(domain) {
            Ok(config) => Some(config),
            Err(TlsError::NotFound(_)) => {
                tracing::debug!(domain = %domain, "No certificate available");
                None
            }
            Err(e) => {
                tracing::warn!(domain = %domain, error = %e, "Failed to build TLS context");
                None
            }
        }
    }

    /// Like [`get_context`](Self::get_context) but keeps the failure reason.
    pub fn context(&self, domain: &str) -> Result<Arc<ServerConfig>, TlsError> {
        let key = domain.to_ascii_lowercase();
        if let Some(config) = self.cache.get(&key) {
            return Ok(Arc::clone(config.value()));
        }

        let _guard = self
            .build_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(config) = self.cache.get(&key) {
            return Ok(Arc::clone(config.value()));
        }

        let stem = self
            .material_for(&key)
            .ok_or_else(|| TlsError::NotFound(key.clone()))?;
        let config = Arc::new(build_server_config(&self.cert_path(&stem), &self.key_path(&stem))?);
        tracing::info!(domain = %key, certificate = %stem, "TLS context built");
        self.cache.insert(key, Arc::clone(&config));
        Ok(config)
    }

    /// Context built from the wildcard local pair.
    pub fn wildcard_context(&self) -> Option<Arc<ServerConfig>> {
        if !self.has_pair(WILDCARD_LOCAL) {
            return None;
        }
        self.get_context(WILDCARD_LOCAL)
    }

    /// Whether a context can be built for `domain`.
    pub fn validate_certificate(&self, domain: &str) -> Result<(), TlsError> {
        self.context(domain).map(drop)
    }

    /// Every `*-cert.pem` in the certificate directory, sorted by domain.
    pub fn list_available_certificates(&self) -> Vec<CertificateInfo> {
        let Ok(entries) = std::fs::read_dir(&self.certs_dir) else {
            return Vec::new();
        };

        let mut found: Vec<CertificateInfo> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let domain = name.strip_suffix("-cert.pem")?.to_string();
                let key_path = self.key_path(&domain);
                Some(CertificateInfo {
                    cert_path: entry.path(),
                    key_present: key_path.is_file(),
                    key_path,
                    domain,
                })
            })
            .collect();
        found.sort_by(|a, b| a.domain.cmp(&b.domain));
        found
    }

    pub fn cached_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.cache.iter().map(|e| e.key().clone()).collect();
        domains.sort();
        domains
    }

    /// Drop every cached context.
    pub fn clear_cache(&self) {
        let count = self.cache.len();
        self.cache.clear();
        tracing::info!(contexts = count, "TLS context cache cleared");
    }
}

/// Forward-secret AEAD suites only.
fn provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: vec![
            cipher_suite::TLS13_AES_256_GCM_SHA384,
            cipher_suite::TLS13_AES_128_GCM_SHA256,
            cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        ],
        ..default_provider()
    }
}

/// Build a TLS 1.2–1.3 server config from a PEM pair. ALPN offers HTTP/1.1 only.
pub fn build_server_config(cert_path: &Path, key_path: &Path) -> Result<ServerConfig, TlsError> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(provider()))
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(config)
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::EmptyChain(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::MissingKey(path.to_path_buf()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::path::Path;

    /// Write a self-signed pair for `name` (a domain or `wildcard-local`).
    pub fn write_pair(cert_dir: &Path, name: &str, san: &str) {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec![san.to_string()]).unwrap();
        fs::create_dir_all(cert_dir.join("certs")).unwrap();
        fs::create_dir_all(cert_dir.join("private")).unwrap();
        fs::write(cert_dir.join(format!("certs/{name}-cert.pem")), cert.pem()).unwrap();
        fs::write(cert_dir.join(format!("private/{name}-key.pem")), key_pair.serialize_pem()).unwrap();
    }
}

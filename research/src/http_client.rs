use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{Certificate, Client, redirect};
use thiserror::Error;
use tracing::info;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_REDIRECTS: usize = 10;

#[derive(Error, Debug)]
pub enum HttpClientError {
    #[error("cannot read certificate {path}: {source}")]
    ReadCertificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid certificate {path}: {source}")]
    InvalidCertificate {
        path: PathBuf,
        #[source]
        source: reqwest::Error,
    },

    #[error("no certificates found in {0}")]
    EmptyBundle(PathBuf),

    #[error("cannot build http client: {0}")]
    Build(#[from] reqwest::Error),
}

/// The client shared by the LLM provider, the search tool and the tracer.
///
/// `cert_path` adds an extra trusted root, for networks behind a TLS
/// intercepting proxy. PEM files may hold a whole bundle; anything else is
/// read as a single DER certificate.
pub fn build(cert_path: Option<&Path>) -> Result<Client, HttpClientError> {
    let mut builder = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .redirect(redirect::Policy::limited(MAX_REDIRECTS))
        .user_agent(concat!("research-cli/", env!("CARGO_PKG_VERSION")));

    if let Some(path) = cert_path {
        for cert in load_certificates(path)? {
            builder = builder.add_root_certificate(cert);
        }
        info!(path = %path.display(), "trusting additional root certificate");
    }

    Ok(builder.build()?)
}

fn load_certificates(path: &Path) -> Result<Vec<Certificate>, HttpClientError> {
    let bytes = fs::read(path).map_err(|source| HttpClientError::ReadCertificate {
        path: path.to_path_buf(),
        source,
    })?;
    let invalid = |source| HttpClientError::InvalidCertificate {
        path: path.to_path_buf(),
        source,
    };

    if bytes.starts_with(b"-----BEGIN") || bytes.windows(11).any(|w| w == b"-----BEGIN ") {
        let certs = Certificate::from_pem_bundle(&bytes).map_err(invalid)?;
        if certs.is_empty() {
            return Err(HttpClientError::EmptyBundle(path.to_path_buf()));
        }
        Ok(certs)
    } else {
        Ok(vec![Certificate::from_der(&bytes).map_err(invalid)?])
    }
}

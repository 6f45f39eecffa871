//! Local TLS certificates via `mkcert`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use crate::workflow::CertificateRegenerator;

use super::command;

pub const CERT_FILE: &str = "localhost.pem";
pub const KEY_FILE: &str = "localhost-key.pem";

#[derive(Debug, Clone)]
pub struct MkcertRegenerator {
    cert_dir: PathBuf,
    hosts: Vec<String>,
}

impl MkcertRegenerator {
    pub fn new(cert_dir: impl Into<PathBuf>) -> Self {
        Self {
            cert_dir: cert_dir.into(),
            hosts: vec!["localhost".into(), "127.0.0.1".into(), "::1".into()],
        }
    }

    pub fn cert_dir(&self) -> &Path {
        &self.cert_dir
    }

    pub fn mkcert_args(&self) -> Vec<String> {
        let mut args = vec![
            "-cert-file".to_string(),
            self.cert_dir.join(CERT_FILE).display().to_string(),
            "-key-file".to_string(),
            self.cert_dir.join(KEY_FILE).display().to_string(),
        ];
        args.extend(self.hosts.iter().cloned());
        args
    }
}

impl CertificateRegenerator for MkcertRegenerator {
    fn regenerate(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.cert_dir).with_context(|| {
            format!(
                "Failed to create certificate directory: {}",
                self.cert_dir.display()
            )
        })?;

        let args = self.mkcert_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        command::run_blocking("mkcert", &args).context("Failed to regenerate certificates")?;

        info!(dir = %self.cert_dir.display(), "Certificates regenerated");
        Ok(())
    }
}

//! Server configuration loaded from environment variables (and `.env`).

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// JWT secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `CAMPUS_HOST` / `CAMPUS_PORT`. Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// Env: `CAMPUS_DB_PATH`. Default: `campus.db`
    pub db_path: PathBuf,

    /// Where attachments are written and served from.
    /// Env: `CAMPUS_UPLOAD_DIR`. Default: `./uploads`
    pub upload_dir: PathBuf,

    /// Env: `CAMPUS_JWT_SECRET`. A placeholder is refused unless
    /// `CAMPUS_ALLOW_DEV_SECRET=1`.
    pub jwt_secret: String,

    /// Env: `CAMPUS_MAX_ATTACHMENT_BYTES`. Default: 10 MiB
    pub max_attachment_bytes: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("CAMPUS_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("CAMPUS_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("CAMPUS_PORT must be a port number")?;
        let http_addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .context("CAMPUS_HOST must be an IP address")?;

        let jwt_secret = lookup("CAMPUS_JWT_SECRET").unwrap_or_else(|| "dev-secret-change-me".into());
        let allow_dev_secret = lookup("CAMPUS_ALLOW_DEV_SECRET").as_deref() == Some("1");
        if jwt_secret.is_empty() || (PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) && !allow_dev_secret) {
            bail!("CAMPUS_JWT_SECRET is unset or still a placeholder (set CAMPUS_ALLOW_DEV_SECRET=1 for local use)");
        }

        let max_attachment_bytes = match lookup("CAMPUS_MAX_ATTACHMENT_BYTES") {
            Some(raw) => raw
                .parse()
                .context("CAMPUS_MAX_ATTACHMENT_BYTES must be a byte count")?,
            None => 10 * 1024 * 1024,
        };

        Ok(Self {
            http_addr,
            db_path: lookup("CAMPUS_DB_PATH").unwrap_or_else(|| "campus.db".into()).into(),
            upload_dir: lookup("CAMPUS_UPLOAD_DIR").unwrap_or_else(|| "./uploads".into()).into(),
            jwt_secret,
            max_attachment_bytes,
        })
    }
}

//! Per-terminal token persistence
//!
//! Each terminal identifier owns one bearer token stored as
//! `<dir>/<identifier>.dat`. The first run generates it; later runs reuse it
//! so the service keeps recognising the terminal.

use anyhow::{bail, Context, Result};
use ecr_session::core::credentials::TOKEN_LENGTH;
use ecr_session::generate_token;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Token files keyed by terminal identifier
#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the token file for `identifier`
    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.dir.join(format!("{}.dat", identifier))
    }

    /// Return the stored token, generating and persisting one when missing
    ///
    /// A stored token is returned as stored, whatever its length.
    pub fn load_or_create(&self, identifier: &str) -> Result<String> {
        if identifier.is_empty()
            || identifier
                .chars()
                .any(|c| std::path::is_separator(c) || c == '.')
        {
            bail!("invalid terminal identifier {:?}", identifier);
        }

        let path = self.path_for(identifier);
        if path.exists() {
            debug!("Loading token from {:?}", path);
            let token = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let token = token.trim().to_string();
            if token.is_empty() {
                bail!("token file {} is empty", path.display());
            }
            if token.len() != TOKEN_LENGTH {
                warn!("Token in {:?} has {} characters, using it as stored", path, token.len());
            }
            return Ok(token);
        }

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let token = generate_token();
        fs::write(&path, &token).with_context(|| format!("failed to write {}", path.display()))?;
        info!("Generated new token for terminal {}", identifier);

        Ok(token)
    }
}

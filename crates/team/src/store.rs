// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk CLI config: server config, cached token, flow preference.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::credential::lifecycle::ConfigStore;
use crate::credential::{AuthFlow, AuthToken, RemoteConfig};

/// Everything persisted between runs.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_config: Option<RemoteConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<AuthToken>,
    #[serde(default)]
    pub use_device_code: bool,
    #[serde(default)]
    pub no_browser: bool,
}

impl StoredConfig {
    pub fn auth_flow(&self) -> AuthFlow {
        AuthFlow::from_settings(self.use_device_code, self.no_browser)
    }
}

/// JSON config file with atomic writes.
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file; a missing file is an empty config.
    pub fn load_stored(&self) -> anyhow::Result<StoredConfig> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoredConfig::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse {}", self.path.display()))
    }

    /// Write atomically (unique temp file + rename).
    pub fn save_stored(&self, stored: &StoredConfig) -> anyhow::Result<()> {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        let json = serde_json::to_string_pretty(stored)?;
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, json)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    /// Apply `f` to the stored config and write the result.
    pub fn update(&self, f: impl FnOnce(&mut StoredConfig)) -> anyhow::Result<StoredConfig> {
        let mut stored = self.load_stored()?;
        f(&mut stored);
        self.save_stored(&stored)?;
        Ok(stored)
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> anyhow::Result<(Option<RemoteConfig>, Option<AuthToken>)> {
        let stored = self.load_stored()?;
        Ok((stored.server_config, stored.auth_token))
    }

    fn save(&self, cfg: &RemoteConfig, token: &AuthToken) -> anyhow::Result<()> {
        self.update(|stored| {
            stored.server_config = Some(cfg.clone());
            stored.auth_token = Some(token.clone());
        })?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Release check against a JSON document carrying `tag_name`.

use std::time::Duration;

use semver::Version;
use serde::Deserialize;

const UPDATE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// Fetch the latest tag from `url`; `Some(tag)` when it is newer than `current`.
pub async fn check_for_update(url: &str, current: &str) -> anyhow::Result<Option<String>> {
    crate::ensure_crypto();
    let client = reqwest::Client::builder()
        .timeout(UPDATE_TIMEOUT)
        .user_agent(concat!("team-cli/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let resp = client.get(url).send().await?.error_for_status()?;
    let release: Release = resp.json().await?;
    Ok(is_newer(&release.tag_name, current).then_some(release.tag_name))
}

/// Whether tag `latest` (`v1.2.3`) is a newer version than `current`.
///
/// Tags without the `v` prefix, or that are not semver, are never newer.
pub fn is_newer(latest: &str, current: &str) -> bool {
    let Some(latest) = latest.strip_prefix('v').and_then(|v| Version::parse(v).ok()) else {
        return false;
    };
    let current = current.strip_prefix('v').unwrap_or(current);
    Version::parse(current).is_ok_and(|current| latest > current)
}

#[cfg(test)]
#[path = "update_tests.rs"]
mod tests;

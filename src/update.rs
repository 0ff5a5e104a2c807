use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use semver::Version;
use serde::Deserialize;

const RELEASES_URL: &str = "https://api.github.com/repos/clipdeck/clipdeck/releases/latest";
const CHECK_TIMEOUT: Duration = Duration::from_secs(8);

pub const SKIP_UPDATE_ENV: &str = "CLIPDECK_SKIP_UPDATE_CHECK";

#[derive(Debug, Clone)]
pub struct UpdateInfo {
    pub version: Version,
    pub release_url: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    html_url: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
}

pub fn check_for_update(current: &Version) -> Result<Option<UpdateInfo>> {
    match fetch_latest_release()? {
        Some(release) => newer_release(&release, current),
        None => Ok(None),
    }
}

fn fetch_latest_release() -> Result<Option<Release>> {
    let client = Client::builder()
        .timeout(CHECK_TIMEOUT)
        .user_agent(format!("clipdeck/{} (update-check)", crate::VERSION))
        .build()
        .context("build update HTTP client")?;

    let response = client
        .get(RELEASES_URL)
        .header("Accept", "application/vnd.github+json")
        .send()
        .context("request latest release metadata")?;

    match response.status() {
        // No published release yet.
        StatusCode::NOT_FOUND => Ok(None),
        StatusCode::FORBIDDEN => bail!("rate limited by GitHub while checking for updates"),
        status if status.is_success() => {
            Ok(Some(response.json().context("decode release response")?))
        }
        status => bail!("update check failed with status {}", status),
    }
}

/// Whether a published release supersedes the running build. Drafts and
/// prereleases never count, whatever their tag says.
fn newer_release(release: &Release, current: &Version) -> Result<Option<UpdateInfo>> {
    if release.draft || release.prerelease {
        return Ok(None);
    }
    let version = parse_release_tag(&release.tag_name)?;
    if &version > current {
        Ok(Some(UpdateInfo {
            version,
            release_url: release.html_url.clone(),
        }))
    } else {
        Ok(None)
    }
}

/// Release tags come both bare ("0.2.0") and prefixed ("v0.2.0").
fn parse_release_tag(tag: &str) -> Result<Version> {
    let trimmed = tag.trim();
    let bare = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    Version::parse(bare).with_context(|| format!("parse release tag {trimmed:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(tag: &str, draft: bool, prerelease: bool) -> Release {
        Release {
            tag_name: tag.into(),
            html_url: "https://github.com/clipdeck/clipdeck/releases/latest".into(),
            draft,
            prerelease,
        }
    }

    #[test]
    fn parses_prefixed_and_bare_tags() {
        assert_eq!(parse_release_tag("v1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_release_tag("V1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(parse_release_tag(" 1.2.3 ").unwrap(), Version::new(1, 2, 3));
        assert!(parse_release_tag("nightly").is_err());
    }

    #[test]
    fn newer_version_is_reported() {
        let current = Version::new(0, 1, 0);
        let info = newer_release(&release("v0.2.0", false, false), &current)
            .unwrap()
            .unwrap();
        assert_eq!(info.version, Version::new(0, 2, 0));
    }

    #[test]
    fn same_or_older_version_is_ignored() {
        let current = Version::new(0, 2, 0);
        assert!(newer_release(&release("v0.2.0", false, false), &current)
            .unwrap()
            .is_none());
        assert!(newer_release(&release("v0.1.9", false, false), &current)
            .unwrap()
            .is_none());
    }

    #[test]
    fn drafts_and_prereleases_never_count() {
        let current = Version::new(0, 1, 0);
        assert!(newer_release(&release("v9.0.0", true, false), &current)
            .unwrap()
            .is_none());
        assert!(newer_release(&release("v9.0.0", false, true), &current)
            .unwrap()
            .is_none());
    }
}

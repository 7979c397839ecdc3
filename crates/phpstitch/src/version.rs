//! Version string discovery for bundle headers

use std::{fs, path::Path, process::Command};

use log::debug;
use serde::Deserialize;

#[derive(Deserialize)]
struct ComposerManifest {
    version: Option<String>,
}

/// Find a version for the project rooted at `dir`
///
/// Tries, in order: the exact git tag of `HEAD`, `git-<short hash>`, the
/// `version` field of `composer.json` and finally a build timestamp.
pub fn discover_version(dir: &Path) -> String {
    if let Some(version) = git_version(dir) {
        return version;
    }
    if let Some(version) = composer_version(dir) {
        return version;
    }
    let fallback = format!("build-{}", chrono::Local::now().format("%Y%m%d-%H%M%S"));
    debug!("No git or composer version found, using {fallback}");
    fallback
}

fn git(dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

fn git_version(dir: &Path) -> Option<String> {
    if !dir.join(".git").is_dir() {
        return None;
    }
    let hash = git(dir, &["rev-parse", "--short", "HEAD"])?;
    match git(dir, &["describe", "--tags", "--exact-match", "HEAD"]) {
        Some(tag) => Some(tag),
        None => Some(format!("git-{hash}")),
    }
}

fn composer_version(dir: &Path) -> Option<String> {
    let text = fs::read_to_string(dir.join("composer.json")).ok()?;
    match serde_json::from_str::<ComposerManifest>(&text) {
        Ok(manifest) => manifest.version,
        Err(e) => {
            debug!("Ignoring unreadable composer.json: {e}");
            None
        }
    }
}

//! Version marker rewritten when a ritual commit is confirmed.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

/// Project descriptors searched at the repository root, in order.
pub const DESCRIPTORS: &[&str] = &["Cargo.toml", "package.json", "pyproject.toml", "setup.py"];

static VERSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^(?P<prefix>[ \t]*"?version"?[ \t]*[:=][ \t]*["'])(?P<major>\d+)\.(?P<minor>\d+)\.(?P<patch>\d+)(?P<suffix>["'])"#,
    )
    .expect("version pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionBump {
    /// Descriptor path relative to the repository root.
    pub file: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone)]
pub struct VersionMarker {
    repo_root: PathBuf,
}

impl VersionMarker {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    /// Bumps the patch number in the first descriptor carrying a version line.
    ///
    /// `Ok(None)` when no descriptor exists or none has a recognisable version.
    pub fn bump(&self) -> io::Result<Option<VersionBump>> {
        for name in DESCRIPTORS {
            let path = self.repo_root.join(name);
            let Ok(text) = fs::read_to_string(&path) else {
                continue;
            };
            let Some((rewritten, from, to)) = bump_text(&text) else {
                debug!(file = name, "no version line found");
                continue;
            };
            fs::write(&path, rewritten)?;
            info!(file = name, %from, %to, "version marker bumped");
            return Ok(Some(VersionBump {
                file: (*name).to_string(),
                from,
                to,
            }));
        }
        debug!("no version marker to bump");
        Ok(None)
    }
}

/// Returns the rewritten text with the old and new version strings.
pub fn bump_text(text: &str) -> Option<(String, String, String)> {
    let caps = VERSION_LINE.captures(text)?;
    let whole = caps.get(0)?;
    let patch = caps["patch"].parse::<u64>().ok()?.checked_add(1)?;

    let from = format!("{}.{}.{}", &caps["major"], &caps["minor"], &caps["patch"]);
    let to = format!("{}.{}.{}", &caps["major"], &caps["minor"], patch);

    let mut rewritten = String::with_capacity(text.len() + 2);
    rewritten.push_str(&text[..whole.start()]);
    rewritten.push_str(&caps["prefix"]);
    rewritten.push_str(&to);
    rewritten.push_str(&caps["suffix"]);
    rewritten.push_str(&text[whole.end()..]);
    Some((rewritten, from, to))
}

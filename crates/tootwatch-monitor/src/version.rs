//! Version label parsing.
//!
//! Release tags and server-reported versions are not always strict semver
//! (`v4.2.0`, `4.2`, `3.0.0rc1`, `4.2.1+glitch`). Labels are normalized
//! before comparison; build metadata never affects ordering.

use std::cmp::Ordering;

use semver::{BuildMetadata, Version};

/// Parse a release label or reported version into a comparable `Version`.
pub fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let label = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    let mut version = match Version::parse(label) {
        Ok(v) => v,
        Err(_) => Version::parse(&normalize(label)?).ok()?,
    };
    version.build = BuildMetadata::EMPTY;
    Some(version)
}

/// Pad missing minor/patch components and hyphenate a glued pre-release
/// suffix (`3.0.0rc1` becomes `3.0.0-rc1`).
fn normalize(label: &str) -> Option<String> {
    let split = label.find(['-', '+']).unwrap_or(label.len());
    let (core, suffix) = label.split_at(split);

    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }

    let mut glued = "";
    if let Some(last) = parts.last_mut() {
        let component: &str = *last;
        let digits = component
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(component.len());
        if digits == 0 {
            return None;
        }
        glued = &component[digits..];
        *last = &component[..digits];
    }
    while parts.len() < 3 {
        parts.push("0");
    }

    let mut normalized = parts.join(".");
    if !glued.is_empty() {
        if !suffix.is_empty() && !suffix.starts_with('+') {
            return None;
        }
        normalized.push('-');
        normalized.push_str(glued.trim_start_matches('.'));
    }
    normalized.push_str(suffix);
    Some(normalized)
}

/// Compare two labels by semantic-version precedence.
///
/// Returns `None` if either label does not parse.
pub fn compare_labels(a: &str, b: &str) -> Option<Ordering> {
    Some(parse_version(a)?.cmp(&parse_version(b)?))
}

/// Whether a release label denotes a release candidate or beta build.
pub fn is_prerelease(label: &str) -> bool {
    match parse_version(label) {
        Some(version) => !version.pre.is_empty(),
        None => {
            let lower = label.to_ascii_lowercase();
            lower.contains("-rc") || lower.contains("-beta")
        }
    }
}

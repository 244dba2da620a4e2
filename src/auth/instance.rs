//! Instance host and account handle parsing.

use std::sync::OnceLock;

use regex::Regex;

use super::error::AuthError;

fn host_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)*(:[0-9]{1,5})?$")
            .expect("static host pattern compiles")
    })
}

/// Normalize user input into a bare instance host (`social.example`,
/// optionally with `:port`).
///
/// A scheme and a single trailing slash are tolerated and stripped; paths,
/// userinfo, whitespace and anything outside `[a-z0-9.-]` are rejected.
pub fn normalize_instance_host(raw: &str) -> Result<String, AuthError> {
    let trimmed = raw.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let host = without_scheme
        .strip_suffix('/')
        .unwrap_or(without_scheme)
        .to_ascii_lowercase();

    if host.is_empty() {
        return Err(AuthError::InvalidInstance("instance is empty".to_string()));
    }
    if !host_pattern().is_match(&host) {
        return Err(AuthError::InvalidInstance(format!(
            "{host:?} is not a bare hostname"
        )));
    }
    Ok(host)
}

/// Extract the username from `alice`, `@alice` or `@alice@social.example`.
///
/// A fully qualified handle must belong to `instance_host`.
pub fn parse_handle(handle: &str, instance_host: &str) -> Result<String, AuthError> {
    let trimmed = handle.trim().trim_start_matches('@');
    let (user, domain) = match trimmed.split_once('@') {
        Some((user, domain)) => (user, Some(domain)),
        None => (trimmed, None),
    };
    if user.is_empty() {
        return Err(AuthError::MissingParameters);
    }
    if let Some(domain) = domain {
        let domain = normalize_instance_host(domain)?;
        if domain != instance_host {
            return Err(AuthError::InvalidInstance(format!(
                "handle belongs to {domain}, not {instance_host}"
            )));
        }
    }
    Ok(user.to_string())
}

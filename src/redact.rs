//! Helpers that keep secrets and huge payloads out of the logs.
//!
//! Presigned URLs carry their credentials in the query string, and inline audio
//! arrives as multi-megabyte base64 strings; neither belongs in a log line.

/// Drop the query string, fragment and any `user:pass@` credentials from a URL.
pub fn redact_url(url: &str) -> String {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let base = strip_userinfo(&url[..end]);
    if end < url.len() {
        format!("{}?<redacted>", base)
    } else {
        base
    }
}

fn strip_userinfo(url: &str) -> String {
    let authority_start = url.find("://").map(|i| i + 3).unwrap_or(0);
    let authority_end = url[authority_start..]
        .find('/')
        .map(|i| authority_start + i)
        .unwrap_or(url.len());
    match url[authority_start..authority_end].rfind('@') {
        Some(at) => format!(
            "{}<redacted>@{}",
            &url[..authority_start],
            &url[authority_start + at + 1..]
        ),
        None => url.to_string(),
    }
}

/// Shorten long values to a prefix plus their length.
pub fn truncate_for_log(value: &str) -> String {
    const LIMIT: usize = 100;
    const PREFIX: usize = 50;

    if value.chars().count() <= LIMIT {
        return value.to_string();
    }
    let prefix: String = value.chars().take(PREFIX).collect();
    format!("{}...({} chars)", prefix, value.chars().count())
}

/// Human-readable duration such as "42.3s", "3m 5s" or "1h 30m 45s".
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{:.1}s", seconds);
    }

    let total = seconds as u64;
    let (minutes, secs) = (total / 60, total % 60);
    let (hours, mins) = (minutes / 60, minutes % 60);

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else {
        format!("{}m {}s", mins, secs)
    }
}

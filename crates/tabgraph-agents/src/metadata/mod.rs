//! Pluggable tab metadata providers.
//!
//! A provider turns `(title, url)` into a label, an attribution source
//! and a short summary. Implementations are selected by configuration;
//! every one of them falls back to a deterministic record built from
//! the URL's domain when generation fails.

pub mod gemini;
pub mod you;

use async_trait::async_trait;
use tabgraph_core::TabMetadata;

/// Contract shared by every metadata provider.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Generate metadata for a tab.
    async fn generate(&self, title: &str, url: &str) -> anyhow::Result<TabMetadata>;
}

/// Extract a clean domain name from a URL.
///
/// `https://docs.anthropic.com/...` becomes `Anthropic`,
/// `https://github.com/user/repo` becomes `Github`.
pub fn extract_domain(url: &str) -> String {
    let host = url
        .split("://")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .unwrap_or("");
    if host.is_empty() {
        return "Web".to_string();
    }

    let host = host.strip_prefix("www.").unwrap_or(host);
    let label = host
        .strip_prefix("docs.")
        .or_else(|| host.strip_prefix("api."))
        .unwrap_or(host)
        .split('.')
        .next()
        .unwrap_or("");

    if label.is_empty() {
        return "Web".to_string();
    }

    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Web".to_string(),
    }
}

/// Deterministic metadata built from the title and domain.
pub fn fallback_metadata(title: &str, url: &str) -> TabMetadata {
    let domain = extract_domain(url);
    let label = if title.is_empty() {
        "Untitled".to_string()
    } else {
        title.chars().take(50).collect()
    };

    TabMetadata {
        display_label: format!("{} • {}", label, domain),
        label,
        source: domain,
        summary: String::new(),
    }
}

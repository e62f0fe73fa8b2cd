//! Normalized search results and the pure aggregation functions applied to
//! them after every gathering call.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// One search hit, normalized across providers. `url` is the identity key
/// for deduplication within a single gathering call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub title: String,
    pub url: String,
    /// Snippet or summary of the content.
    pub content: String,
    /// Full page/transcript content when the provider supplies it.
    #[serde(default)]
    pub raw_content: Option<String>,
}

/// Uniform response shape every provider normalizes to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SourceRecord>,
}

const TRUNCATION_MARKER: &str = "... [truncated]";

/// Deduplicate a gathering call's results by URL (first occurrence wins) and
/// render them into a single evidence block.
///
/// When `include_raw_content` is set, each source's raw content is limited to
/// roughly `max_tokens_per_source` tokens using a 4-chars-per-token estimate,
/// with a marker appended when cut. A source missing its raw content gets an
/// empty substitute and a diagnostic, never an error.
pub fn deduplicate_and_format_sources(
    results: &[SourceRecord],
    max_tokens_per_source: usize,
    include_raw_content: bool,
) -> String {
    let mut seen_urls: Vec<&str> = Vec::new();
    let mut formatted = String::from("Sources:\n\n");

    for source in results {
        if seen_urls.contains(&source.url.as_str()) {
            continue;
        }
        seen_urls.push(&source.url);

        formatted.push_str(&format!("Source {}:\n===\n", source.title));
        formatted.push_str(&format!("URL: {}\n===\n", source.url));
        formatted.push_str(&format!(
            "Most relevant content from source: {}\n===\n",
            source.content
        ));

        if include_raw_content {
            let raw = match source.raw_content.as_deref() {
                Some(raw) => raw,
                None => {
                    warn!(url = %source.url, "no raw content found for source");
                    ""
                }
            };
            let char_limit = max_tokens_per_source * 4;
            let limited = truncate_chars(raw, char_limit);
            formatted.push_str(&format!(
                "Full source content limited to {max_tokens_per_source} tokens: {limited}\n\n"
            ));
        }
    }

    formatted.trim().to_string()
}

/// Render a gathering call's results as a bullet citation list, one line per
/// source. Intentionally does not deduplicate: the same URL appearing in two
/// iterations yields two citation lines.
pub fn format_citations(results: &[SourceRecord]) -> String {
    results
        .iter()
        .map(|source| format!("* {} : {}", source.title, source.url))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate to at most `limit` characters (not bytes), appending a marker
/// when content was cut.
fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

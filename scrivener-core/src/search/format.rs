//! Renders deduplicated sources into the drafting context.

use super::SourceRecord;
use std::fmt::Write;
use tracing::debug;

/// Rough characters-per-token ratio used to turn a token budget into a character cut.
const CHARS_PER_TOKEN: usize = 4;

const TRUNCATION_MARKER: &str = "... [truncated]";

/// Serialise `sources` into one context blob for the writer model.
///
/// Each source lists its title, URL and most relevant content. When
/// `include_raw_content` is set, the full text follows, cut to
/// `max_tokens_per_source * 4` characters.
pub fn format_sources(
    sources: &[SourceRecord],
    max_tokens_per_source: usize,
    include_raw_content: bool,
) -> String {
    let rule = "=".repeat(80);
    let thin_rule = "-".repeat(80);
    let char_limit = max_tokens_per_source.saturating_mul(CHARS_PER_TOKEN);

    let mut out = String::from("Content from sources:\n");
    for source in sources {
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "Source: {}", source.title);
        let _ = writeln!(out, "{thin_rule}");
        let _ = writeln!(out, "URL: {}\n===", source.url);
        let _ = writeln!(
            out,
            "Most relevant content from source: {}\n===",
            source.content
        );
        if include_raw_content {
            let raw = match source.raw_content.as_deref() {
                Some(raw) => truncate_chars(raw, char_limit),
                None => {
                    debug!(url = %source.url, "Source has no raw content");
                    String::new()
                }
            };
            let _ = writeln!(
                out,
                "Full source content limited to {max_tokens_per_source} tokens: {raw}\n"
            );
        }
        let _ = writeln!(out, "{rule}\n");
    }
    out.trim().to_string()
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

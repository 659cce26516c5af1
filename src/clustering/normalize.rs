// Text normalization applied before embedding.

/// Lowercase, collapse runs of whitespace to a single space, and trim.
///
/// Empty input yields an empty string.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize a batch of texts, preserving order.
pub fn normalize_texts(texts: &[String]) -> Vec<String> {
    texts.iter().map(|t| normalize_text(t)).collect()
}

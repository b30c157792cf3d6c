use unicode_normalization::UnicodeNormalization;

/// Normalize a phrase the same way at ingestion and at query time:
/// Unicode NFC, lowercase, trim, collapse internal whitespace to a single
/// space, strip leading/trailing ASCII punctuation. Idempotent --
/// `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(input: &str) -> String {
    let nfc: String = input.nfc().collect();
    let lower = nfc.to_lowercase();
    let collapsed = collapse_whitespace(lower.trim());
    strip_ascii_punctuation(&collapsed).to_string()
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !prev_was_space {
                out.push(' ');
            }
            prev_was_space = true;
        } else {
            out.push(c);
            prev_was_space = false;
        }
    }
    out
}

fn strip_ascii_punctuation(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_ascii_punctuation())
}

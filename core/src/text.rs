use once_cell::sync::Lazy;
use regex::Regex;

// Anything shaped like a markup tag: <b>, </color>, <size=12>
static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

/// Convert a raw table value into the form shown to the translator.
///
/// With `preserve_markup` only the literal `\n` escapes become line breaks so
/// a rich renderer can still interpret the tags. Without it, tags are
/// stripped, `&quot;` is decoded and stray backslashes are dropped.
pub fn to_display(raw: &str, preserve_markup: bool) -> String {
    if preserve_markup {
        return raw.replace("\\n", "\n");
    }

    let stripped = TAG_REGEX.replace_all(raw, "");
    stripped
        .replace("&quot;", "\"")
        .replace("\\n", "\n")
        .replace('\\', "")
}

/// Convert edited or translated text back into the escaped form the table
/// files use for line breaks.
pub fn to_storage(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\\n")
}

/// Shorten `text` to `max_chars` characters, appending `...` when cut.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

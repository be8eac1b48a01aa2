/// Normalize a title into a form suitable for comparisons.
///
/// Dots and underscores become spaces, whitespace runs collapse, and every word
/// is capitalized (`"the.matrix"` -> `"The Matrix"`). Total and idempotent.
pub fn normalize(title: &str) -> String {
    title
        .replace(['.', '_'], " ")
        .split_whitespace()
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };

    let mut out = String::with_capacity(word.len());
    // Multi-char uppercase expansions (e.g. 'ß' -> "SS") keep only the first
    // char uppercase so a second pass is a no-op.
    let mut upper = first.to_uppercase();
    if let Some(head) = upper.next() {
        out.push(head);
    }
    out.extend(upper.flat_map(char::to_lowercase));
    out.extend(chars.flat_map(char::to_lowercase));
    out
}

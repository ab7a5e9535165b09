//! Text cleanup for scraped strings.

/// Remove NUL bytes, turn other control characters (CR, LF, tabs, …) into
/// spaces, trim, and truncate to `max_len` characters ending in `...`.
pub fn sanitize_text(text: &str, max_len: Option<usize>) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != '\0')
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let cleaned = cleaned.trim();

    match max_len {
        Some(max) if cleaned.chars().count() > max => {
            let keep = max.saturating_sub(3);
            let mut out: String = cleaned.chars().take(keep).collect();
            out.push_str("...");
            out
        }
        _ => cleaned.to_string(),
    }
}

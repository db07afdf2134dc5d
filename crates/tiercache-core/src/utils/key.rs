/// Maximum key length accepted by the remote document service.
pub const DEFAULT_MAX_KEY_LENGTH: usize = 1500;

/// Characters that are not allowed to survive into a tier key.
fn is_reserved(c: char) -> bool {
    matches!(c, '/' | '\\' | '#' | '[' | ']') || c.is_whitespace()
}

/// Canonicalize an application key so every tier sees the same string.
///
/// Path separators, whitespace, `#`, `[` and `]` become `_`, runs of `_`
/// collapse into one, and the result is cut to `max_len` characters.
pub fn sanitize_key(raw: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_underscore = false;

    for c in raw.chars() {
        let c = if is_reserved(c) { '_' } else { c };
        if c == '_' {
            if last_underscore {
                continue;
            }
            last_underscore = true;
        } else {
            last_underscore = false;
        }
        out.push(c);
    }

    truncate_chars(&out, max_len)
}

/// Truncate a string to at most `max_len` characters, respecting char boundaries
pub fn truncate_chars(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_reserved() {
        assert_eq!(sanitize_key("users/1", 100), "users_1");
        assert_eq!(sanitize_key("a b\tc", 100), "a_b_c");
        assert_eq!(sanitize_key("page#top", 100), "page_top");
        assert_eq!(sanitize_key("list[0]", 100), "list_0_");
        assert_eq!(sanitize_key(r"win\path", 100), "win_path");
    }

    #[test]
    fn test_sanitize_collapses_underscores() {
        assert_eq!(sanitize_key("a//b", 100), "a_b");
        assert_eq!(sanitize_key("a / b", 100), "a_b");
        assert_eq!(sanitize_key("a__b", 100), "a_b");
    }

    #[test]
    fn test_sanitize_keeps_ordinary_keys() {
        assert_eq!(sanitize_key("user:1", 100), "user:1");
        assert_eq!(sanitize_key("leaderboard.weekly", 100), "leaderboard.weekly");
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(2000);
        assert_eq!(sanitize_key(&long, DEFAULT_MAX_KEY_LENGTH).len(), 1500);
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 5), "hi");
    }
}

//! Minimal shell-style glob matching (`*` and `?` only), used for basename filtering in the
//! walker and for expanding configured source/dest member lists against the discovered set.

/// Does `text` match `pattern`? `*` matches any run of characters (including none), `?`
/// matches exactly one character. No character classes, no brace expansion.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, &text)
}

fn match_from(pattern: &[char], text: &[char]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some('*') => {
            if match_from(&pattern[1..], text) {
                return true;
            }
            !text.is_empty() && match_from(pattern, &text[1..])
        }
        Some('?') => !text.is_empty() && match_from(&pattern[1..], &text[1..]),
        Some(&c) => text.first() == Some(&c) && match_from(&pattern[1..], &text[1..]),
    }
}

/// True if `pattern` contains a glob metacharacter.
pub fn has_wildcard(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_match() {
        assert!(glob_match("foo.txt", "foo.txt"));
        assert!(!glob_match("foo.txt", "bar.txt"));
    }

    #[test]
    fn star_matches_any_run() {
        assert!(glob_match("*.mkv", "movie.mkv"));
        assert!(glob_match("*.mkv", ".mkv"));
        assert!(!glob_match("*.mkv", "movie.mp4"));
        assert!(glob_match("a*b*c", "aXXbYYc"));
    }

    #[test]
    fn question_matches_one_char() {
        assert!(glob_match("disk?", "disk1"));
        assert!(!glob_match("disk?", "disk10"));
        assert!(!glob_match("disk?", "disk"));
    }

    #[test]
    fn empty_pattern_matches_only_empty() {
        assert!(glob_match("", ""));
        assert!(!glob_match("", "x"));
    }
}

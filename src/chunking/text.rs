//! Byte-offset helpers that never split a UTF-8 sequence or a word.

pub fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

pub fn ceil_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Leading slice of at most `max_bytes`, cut back to the last whitespace.
/// Returns `(slice, truncated)`.
pub fn head_on_word(text: &str, max_bytes: usize) -> (&str, bool) {
    if text.len() <= max_bytes {
        return (text, false);
    }

    let cut = floor_char_boundary(text, max_bytes);
    let cut = if text[cut..].starts_with(char::is_whitespace) {
        cut
    } else {
        text[..cut]
            .rfind(char::is_whitespace)
            .unwrap_or(cut)
    };
    (text[..cut].trim_end(), true)
}

/// Trailing slice of at most `max_bytes`, starting on a word.
pub fn tail_on_word(text: &str, max_bytes: usize) -> &str {
    if max_bytes == 0 {
        return "";
    }
    if text.len() <= max_bytes {
        return text.trim();
    }

    let from = ceil_char_boundary(text, text.len() - max_bytes);
    if text[..from].ends_with(char::is_whitespace) {
        return text[from..].trim();
    }
    match text[from..].find(char::is_whitespace) {
        Some(offset) => text[from + offset..].trim(),
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_boundaries_step_over_multibyte_sequences() {
        let text = "a≥b";
        assert_eq!(floor_char_boundary(text, 2), 1);
        assert_eq!(ceil_char_boundary(text, 2), 4);
        assert_eq!(floor_char_boundary(text, 99), text.len());
    }

    #[test]
    fn head_on_word_backs_off_to_whitespace() {
        assert_eq!(head_on_word("alpha beta gamma", 13), ("alpha beta", true));
        assert_eq!(head_on_word("alpha beta gamma", 10), ("alpha beta", true));
        assert_eq!(head_on_word("short", 10), ("short", false));
    }

    #[test]
    fn tail_on_word_starts_at_a_word() {
        assert_eq!(tail_on_word("alpha beta gamma", 8), "gamma");
        assert_eq!(tail_on_word("alpha beta gamma", 11), "beta gamma");
        assert_eq!(tail_on_word("unbroken", 4), "");
        assert_eq!(tail_on_word("alpha", 0), "");
    }
}

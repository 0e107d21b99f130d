//! Text helpers for search keys and free-text cleanup.

fn is_kanji(c: char) -> bool {
    ('\u{4E00}'..='\u{9FAF}').contains(&c)
}

fn is_katakana(c: char) -> bool {
    ('\u{30A1}'..='\u{30F6}').contains(&c) || c == 'ー'
}

fn is_hiragana(c: char) -> bool {
    ('\u{3041}'..='\u{3093}').contains(&c)
}

fn is_term_char(c: char) -> bool {
    is_kanji(c) || is_katakana(c)
}

/// Fold a name into a comparison key: hiragana become katakana, full-width
/// ASCII and the ideographic space become half-width, then lowercase.
pub fn normalize_search_key(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{3041}'..='\u{3096}' => char::from_u32(c as u32 + 0x60).unwrap_or(c),
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            '\u{3000}' => ' ',
            _ => c,
        })
        .flat_map(char::to_lowercase)
        .collect()
}

/// The leading kanji/katakana run of a product name, used as the search
/// word for incident lookups. A leading `【…】` label is skipped. Falls back
/// to the whole input when no such run exists.
pub fn extract_search_term(text: &str) -> String {
    let mut rest = text.trim();
    if let Some(after) = rest.strip_prefix('【')
        && let Some(end) = after.find('】')
    {
        rest = &after[end + '】'.len_utf8()..];
    }

    let start = rest
        .char_indices()
        .find(|(_, c)| is_term_char(*c))
        .map(|(i, _)| i);
    let Some(start) = start else {
        return text.to_string();
    };
    let run: String = rest[start..].chars().take_while(|c| is_term_char(*c)).collect();
    run
}

/// Remove `(コード: …)` annotations the incident service embeds in text,
/// including any whitespace before them.
pub fn strip_code_annotation(text: &str) -> String {
    const OPEN: &str = "(コード:";
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(OPEN) {
        let after = &rest[pos + OPEN.len()..];
        let body = after.trim_start();
        let close = body.find(')');
        match close {
            Some(end) if end > 0 => {
                out.push_str(rest[..pos].trim_end());
                rest = &body[end + 1..];
            }
            _ => {
                out.push_str(&rest[..pos + OPEN.len()]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Drop characters the incident search service does not accept.
pub fn sanitize_query(input: &str) -> String {
    input
        .chars()
        .filter(|&c| {
            is_hiragana(c)
                || is_term_char(c)
                || c.is_ascii_alphanumeric()
                || c.is_whitespace()
                || "-,、.()（）".contains(c)
        })
        .collect::<String>()
        .trim()
        .to_string()
}

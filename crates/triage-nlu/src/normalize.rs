//! Text normalization shared by every matcher stage.
//!
//! Vocabulary terms are normalized with the same function at load time, so
//! byte offsets reported by the matcher always refer to normalized text.

/// Fold one Latin character to its unaccented lowercase form.
fn fold(c: char, out: &mut String) {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => "o",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'œ' => "oe",
        'æ' => "ae",
        'ß' => "ss",
        '\u{2019}' | '\u{2018}' | '`' => "'",
        '\u{2013}' | '\u{2014}' => "-",
        _ => {
            out.push(c);
            return;
        }
    };
    out.push_str(folded);
}

/// Lowercase, fold diacritics, collapse whitespace, and glue `+`, `-` and
/// `°` to their neighbours so "38 ° 5" and "38°5" read the same.
pub fn normalize(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for c in text.chars().flat_map(char::to_lowercase) {
        fold(c, &mut folded);
    }

    let mut out = String::with_capacity(folded.len());
    let mut pending_space = false;
    for c in folded.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        let glue = matches!(c, '+' | '-' | '°');
        let prev_glue = out.ends_with(['+', '-', '°']);
        if pending_space && !out.is_empty() && !glue && !prev_glue {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

/// Whether the character is part of a word for boundary checks.
pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric()
}

/// Every byte offset at which `term` occurs in `text` starting on a word
/// boundary.  With `strict`, the match must also end on a boundary.
pub(crate) fn bounded_matches(text: &str, term: &str, strict: bool) -> Vec<usize> {
    if term.is_empty() {
        return Vec::new();
    }
    text.match_indices(term)
        .filter(|(pos, _)| {
            let starts_clean = text[..*pos].chars().next_back().map_or(true, |c| !is_word_char(c))
                || !term.chars().next().is_some_and(is_word_char);
            let end = pos + term.len();
            let ends_clean = !strict
                || text[end..].chars().next().map_or(true, |c| !is_word_char(c))
                || !term.chars().next_back().is_some_and(is_word_char);
            starts_clean && ends_clean
        })
        .map(|(pos, _)| pos)
        .collect()
}

/// First boundary-respecting occurrence of `term`.
pub(crate) fn find_bounded(text: &str, term: &str, strict: bool) -> Option<usize> {
    bounded_matches(text, term, strict).into_iter().next()
}

/// Up to `chars` characters of `text` starting at byte offset `from`.
pub(crate) fn window(text: &str, from: usize, chars: usize) -> &str {
    let rest = text.get(from..).unwrap_or_default();
    match rest.char_indices().nth(chars) {
        Some((end, _)) => &rest[..end],
        None => rest,
    }
}

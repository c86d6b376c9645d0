//! BERT-style pre-tokenization: clean, lowercase, strip accents, split on
//! whitespace and punctuation.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r') || c.is_whitespace()
}

fn is_control(c: char) -> bool {
    !matches!(c, '\t' | '\n' | '\r') && c.is_control()
}

/// ASCII symbols count as punctuation even where Unicode says otherwise (`$`, `^`, `` ` ``).
pub fn is_punctuation(c: char) -> bool {
    let cp = c as u32;
    (33..=47).contains(&cp)
        || (58..=64).contains(&cp)
        || (91..=96).contains(&cp)
        || (123..=126).contains(&cp)
        || matches!(c, '¡' | '«' | '·' | '»' | '¿')
        || ('\u{2010}'..='\u{2027}').contains(&c)
        || ('\u{2030}'..='\u{205E}').contains(&c)
        || ('\u{3001}'..='\u{3003}').contains(&c)
        || ('\u{3008}'..='\u{3011}').contains(&c)
        || ('\u{FF01}'..='\u{FF0F}').contains(&c)
}

/// CJK ideographs are split into single-character words.
fn is_cjk(c: char) -> bool {
    let cp = c as u32;
    (0x4E00..=0x9FFF).contains(&cp)
        || (0x3400..=0x4DBF).contains(&cp)
        || (0x20000..=0x2A6DF).contains(&cp)
        || (0x2A700..=0x2B73F).contains(&cp)
        || (0x2B740..=0x2B81F).contains(&cp)
        || (0x2B820..=0x2CEAF).contains(&cp)
        || (0xF900..=0xFAFF).contains(&cp)
        || (0x2F800..=0x2FA1F).contains(&cp)
}

fn strip_accents(word: &str) -> String {
    word.nfd().filter(|&c| !is_combining_mark(c)).collect()
}

/// Split text into lowercase, accent-free words; every punctuation character is its own word.
pub fn pre_tokenize(text: &str) -> Vec<String> {
    let mut cleaned = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\0' || c == '\u{FFFD}' || is_control(c) {
            continue;
        }
        if is_whitespace(c) {
            cleaned.push(' ');
        } else if is_cjk(c) {
            cleaned.push(' ');
            cleaned.push(c);
            cleaned.push(' ');
        } else {
            cleaned.push(c);
        }
    }

    let mut words = Vec::new();
    for raw in cleaned.split_whitespace() {
        let word = strip_accents(&raw.to_lowercase());
        let mut current = String::new();
        for c in word.chars() {
            if is_punctuation(c) {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
                words.push(c.to_string());
            } else {
                current.push(c);
            }
        }
        if !current.is_empty() {
            words.push(current);
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_punctuation_and_lowercases() {
        assert_eq!(
            pre_tokenize("What's the capital of Germany?"),
            vec!["what", "'", "s", "the", "capital", "of", "germany", "?"]
        );
    }

    #[test]
    fn strips_accents_and_controls() {
        assert_eq!(pre_tokenize("Café\u{0007} Ünïcode"), vec!["cafe", "unicode"]);
    }

    #[test]
    fn whitespace_only_yields_nothing() {
        assert!(pre_tokenize(" \t\r\n ").is_empty());
        assert!(pre_tokenize("").is_empty());
    }

    #[test]
    fn cjk_characters_become_words() {
        assert_eq!(pre_tokenize("ab中文"), vec!["ab", "中", "文"]);
    }
}

//! WordPiece vocabulary: one token per line, id = line index.

use crate::errors::{MiniLmError, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

pub const CLS_TOKEN: &str = "[CLS]";
pub const SEP_TOKEN: &str = "[SEP]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const PAD_TOKEN: &str = "[PAD]";

/// Marker prefixed to word-continuation pieces.
pub const CONTINUATION_PREFIX: &str = "##";

/// Ids of the reserved tokens, discovered from the vocabulary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub cls: u32,
    pub sep: u32,
    pub unk: u32,
    pub pad: u32,
}

#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokens: Vec<String>,
    ids: HashMap<String, u32>,
    special: SpecialTokens,
}

impl Vocabulary {
    /// Build from tokens in id order.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        if tokens.is_empty() {
            return Err(MiniLmError::Format("vocabulary is empty".into()));
        }
        let mut ids = HashMap::with_capacity(tokens.len());
        for (id, token) in tokens.iter().enumerate() {
            if token.is_empty() {
                continue;
            }
            if ids.contains_key(token) {
                warn!(token = %token, id, "duplicate vocabulary entry, keeping first id");
                continue;
            }
            ids.insert(token.clone(), id as u32);
        }
        let lookup = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| MiniLmError::Format(format!("vocabulary lacks {}", name)))
        };
        let special = SpecialTokens {
            cls: lookup(CLS_TOKEN)?,
            sep: lookup(SEP_TOKEN)?,
            unk: lookup(UNK_TOKEN)?,
            pad: lookup(PAD_TOKEN)?,
        };
        Ok(Self {
            tokens,
            ids,
            special,
        })
    }

    /// Parse `vocab.txt` contents. Line endings (`\n` or `\r\n`) are stripped.
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_tokens(text.lines().map(|l| l.trim_end_matches('\r')))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                MiniLmError::Format(format!("{}: vocabulary is not UTF-8", path.display()))
            } else {
                MiniLmError::resource(path, e)
            }
        })?;
        Self::parse(&text)
    }

    pub fn id(&self, token: &str) -> Option<u32> {
        self.ids.get(token).copied()
    }

    pub fn token(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.ids.contains_key(token)
    }

    pub fn special(&self) -> SpecialTokens {
        self.special
    }

    pub fn is_special(&self, id: u32) -> bool {
        let s = self.special;
        id == s.cls || id == s.sep || id == s.unk || id == s.pad
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "[PAD]\r\n[UNK]\r\n[CLS]\r\n[SEP]\r\nhello\r\n##lo\r\n\r\nhello\r\n";

    #[test]
    fn ids_follow_line_numbers() {
        let vocab = Vocabulary::parse(SAMPLE).unwrap();
        assert_eq!(vocab.len(), 8);
        assert_eq!(vocab.id("hello"), Some(4));
        assert_eq!(vocab.id("##lo"), Some(5));
        assert_eq!(vocab.token(5), Some("##lo"));
        assert_eq!(
            vocab.special(),
            SpecialTokens {
                cls: 2,
                sep: 3,
                unk: 1,
                pad: 0
            }
        );
    }

    #[test]
    fn blank_lines_keep_their_id_but_are_not_matchable() {
        let vocab = Vocabulary::parse(SAMPLE).unwrap();
        assert_eq!(vocab.token(6), Some(""));
        assert!(!vocab.contains(""));
    }

    #[test]
    fn missing_special_token_is_format_error() {
        let err = Vocabulary::parse("[PAD]\n[UNK]\n[CLS]\nfoo\n").unwrap_err();
        assert!(err.is_format_error());
        assert!(err.to_string().contains("[SEP]"));
    }

    #[test]
    fn empty_vocabulary_is_format_error() {
        assert!(Vocabulary::parse("").unwrap_err().is_format_error());
    }
}

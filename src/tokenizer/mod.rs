//! WordPiece tokenizer producing bounded `[CLS] … [SEP]` sequences.

pub mod normalize;
pub mod vocab;

pub use normalize::pre_tokenize;
pub use vocab::{SpecialTokens, Vocabulary, CONTINUATION_PREFIX};

use crate::errors::{MiniLmError, Result};

/// Words longer than this many characters map straight to `[UNK]`.
pub const MAX_WORD_CHARS: usize = 100;

/// Token ids for one input, `[CLS]` first and `[SEP]` after the last real token.
///
/// A padded sequence keeps track of how many leading ids are real.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSequence {
    ids: Vec<u32>,
    real_len: usize,
}

impl TokenSequence {
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Tokens before any padding.
    pub fn real_len(&self) -> usize {
        self.real_len
    }

    /// `true` for real tokens, `false` for padding.
    pub fn attention_mask(&self) -> Vec<bool> {
        (0..self.ids.len()).map(|i| i < self.real_len).collect()
    }

    /// Append `pad_id` until the sequence is `len` long. Longer sequences are left as is.
    pub fn padded_to(mut self, len: usize, pad_id: u32) -> Self {
        if self.ids.len() < len {
            self.ids.resize(len, pad_id);
        }
        self
    }
}

/// Greedy longest-prefix WordPiece over a fixed vocabulary.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    vocab: Vocabulary,
    max_tokens: usize,
}

impl Tokenizer {
    pub fn new(vocab: Vocabulary, max_tokens: usize) -> Self {
        Self { vocab, max_tokens }
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Encode `text`. Empty or whitespace-only text yields `[CLS] [SEP]`.
    pub fn tokenize(&self, text: &str) -> Result<TokenSequence> {
        let special = self.vocab.special();
        let mut ids = vec![special.cls];
        for word in pre_tokenize(text) {
            self.word_piece(&word, &mut ids);
        }
        ids.push(special.sep);
        if ids.len() > self.max_tokens {
            return Err(MiniLmError::TokenLimitExceeded {
                count: ids.len(),
                limit: self.max_tokens,
            });
        }
        let real_len = ids.len();
        Ok(TokenSequence { ids, real_len })
    }

    /// Encode and pad with `[PAD]` up to the token limit.
    pub fn tokenize_padded(&self, text: &str) -> Result<TokenSequence> {
        Ok(self
            .tokenize(text)?
            .padded_to(self.max_tokens, self.vocab.special().pad))
    }

    fn word_piece(&self, word: &str, out: &mut Vec<u32>) {
        let unk = self.vocab.special().unk;
        let chars: Vec<char> = word.chars().collect();
        if chars.len() > MAX_WORD_CHARS {
            out.push(unk);
            return;
        }

        let mut candidate = String::with_capacity(word.len() + CONTINUATION_PREFIX.len());
        let mut start = 0;
        while start < chars.len() {
            let mut end = chars.len();
            let mut matched = None;
            while start < end {
                candidate.clear();
                if start > 0 {
                    candidate.push_str(CONTINUATION_PREFIX);
                }
                candidate.extend(&chars[start..end]);
                if let Some(id) = self.vocab.id(&candidate) {
                    matched = Some(id);
                    break;
                }
                end -= 1;
            }
            match matched {
                Some(id) => {
                    out.push(id);
                    start = end;
                }
                None => {
                    // unmatched remainder collapses to one [UNK]
                    out.push(unk);
                    return;
                }
            }
        }
    }

    /// Rebuild readable text from ids, joining `##` pieces and skipping special tokens.
    pub fn decode(&self, ids: &[u32]) -> String {
        let mut text = String::new();
        for &id in ids {
            if self.vocab.is_special(id) && id != self.vocab.special().unk {
                continue;
            }
            let Some(token) = self.vocab.token(id) else {
                continue;
            };
            match token.strip_prefix(CONTINUATION_PREFIX) {
                Some(rest) if !text.is_empty() => text.push_str(rest),
                _ => {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(token);
                }
            }
        }
        text
    }
}

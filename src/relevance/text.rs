use anyhow::{anyhow, bail, Result};
use tokenizers::Tokenizer;

/// Fixed-length BERT inputs for one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEncoding {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

impl TextEncoding {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Number of non-padding positions
    pub fn token_count(&self) -> usize {
        self.attention_mask.iter().filter(|&&m| m == 1).count()
    }
}

/// WordPiece encoder producing `[CLS] tokens [SEP] [PAD]...` sequences of a
/// fixed length. Prompts longer than the context are cut on the right;
/// `[CLS]` and `[SEP]` are always kept.
pub struct BertTextEncoder {
    tokenizer: Tokenizer,
    max_len: usize,
    cls_id: u32,
    sep_id: u32,
    pad_id: u32,
}

impl BertTextEncoder {
    pub fn new(tokenizer: Tokenizer, max_len: usize) -> Result<Self> {
        if max_len < 2 {
            bail!("text context of {} cannot hold [CLS] and [SEP]", max_len);
        }

        let special = |token: &str| {
            tokenizer
                .token_to_id(token)
                .ok_or_else(|| anyhow!("tokenizer has no {} token", token))
        };
        let cls_id = special("[CLS]")?;
        let sep_id = special("[SEP]")?;
        let pad_id = special("[PAD]")?;

        Ok(Self {
            tokenizer,
            max_len,
            cls_id,
            sep_id,
            pad_id,
        })
    }

    pub fn encode(&self, text: &str) -> Result<TextEncoding> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow!("Failed to tokenize prompt: {}", e))?;

        let body = encoding.get_ids();
        let keep = body.len().min(self.max_len - 2);
        if keep < body.len() {
            tracing::debug!(tokens = body.len(), kept = keep, "Truncating prompt");
        }

        let mut input_ids = Vec::with_capacity(self.max_len);
        input_ids.push(self.cls_id as i64);
        input_ids.extend(body[..keep].iter().map(|&id| id as i64));
        input_ids.push(self.sep_id as i64);

        let used = input_ids.len();
        input_ids.resize(self.max_len, self.pad_id as i64);

        let mut attention_mask = vec![1i64; used];
        attention_mask.resize(self.max_len, 0);

        Ok(TextEncoding {
            input_ids,
            attention_mask,
            token_type_ids: vec![0; self.max_len],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::word_level_tokenizer;

    fn encoder(max_len: usize) -> BertTextEncoder {
        let tokenizer = word_level_tokenizer(&[
            "[PAD]", "[UNK]", "[CLS]", "[SEP]", "a", "blue", "square", "red", "triangle",
        ]);
        BertTextEncoder::new(tokenizer, max_len).unwrap()
    }

    #[test]
    fn test_short_prompt_is_padded() {
        let encoding = encoder(8).encode("a blue square").unwrap();

        assert_eq!(encoding.input_ids, vec![2, 4, 5, 6, 3, 0, 0, 0]);
        assert_eq!(encoding.attention_mask, vec![1, 1, 1, 1, 1, 0, 0, 0]);
        assert_eq!(encoding.token_type_ids, vec![0; 8]);
        assert_eq!(encoding.token_count(), 5);
    }

    #[test]
    fn test_long_prompt_is_truncated() {
        let prompt = "a red triangle ".repeat(200);
        let encoding = encoder(40).encode(&prompt).unwrap();

        assert_eq!(encoding.len(), 40);
        assert_eq!(encoding.token_count(), 40);
        assert_eq!(encoding.input_ids[0], 2);
        assert_eq!(encoding.input_ids[39], 3);
        assert_eq!(&encoding.input_ids[1..4], &[4, 7, 8]);
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let encoding = encoder(6).encode("a purple square").unwrap();
        assert_eq!(&encoding.input_ids[..5], &[2, 4, 1, 6, 3]);
    }

    #[test]
    fn test_empty_prompt() {
        let encoding = encoder(4).encode("").unwrap();
        assert_eq!(encoding.input_ids, vec![2, 3, 0, 0]);
    }

    #[test]
    fn test_missing_special_tokens_rejected() {
        let tokenizer = word_level_tokenizer(&["[UNK]", "a"]);
        assert!(BertTextEncoder::new(tokenizer, 8).is_err());
    }

    #[test]
    fn test_context_too_small_rejected() {
        let tokenizer = word_level_tokenizer(&["[PAD]", "[UNK]", "[CLS]", "[SEP]"]);
        assert!(BertTextEncoder::new(tokenizer, 1).is_err());
    }
}

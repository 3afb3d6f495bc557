//! Helpers shared by unit tests.

use tokenizers::Tokenizer;

/// Whitespace word-level tokenizer where each word's id is its index.
pub fn word_level_tokenizer(words: &[&str]) -> Tokenizer {
    let vocab: serde_json::Map<String, serde_json::Value> = words
        .iter()
        .enumerate()
        .map(|(id, word)| (word.to_string(), serde_json::json!(id)))
        .collect();

    let json = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [],
        "normalizer": null,
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": "[UNK]"
        }
    });

    Tokenizer::from_bytes(json.to_string().as_bytes()).unwrap()
}

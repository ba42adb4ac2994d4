//! Token entries and word/character vocabularies.
//!
//! Lookups are always made on the lowercased form. Anything missing from a
//! vocabulary resolves to its `<UNK>` id; it is never an error.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Reserved unknown-token key present in both vocabularies.
pub const UNK: &str = "<UNK>";
/// Reserved padding key present in both vocabularies.
pub const PAD: &str = "<PAD>";

/// A token-level input record. Only the literal word is read.
pub trait Entry {
    fn word(&self) -> &str;
}

impl Entry for str {
    fn word(&self) -> &str {
        self
    }
}

impl Entry for String {
    fn word(&self) -> &str {
        self.as_str()
    }
}

impl<T: Entry + ?Sized> Entry for &T {
    fn word(&self) -> &str {
        (**self).word()
    }
}

/// A CoNLL-style token. The tag columns are carried for the caller; the
/// encoder only reads `word`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub word: String,
    pub lemma: Option<String>,
    pub upos: Option<String>,
    pub xpos: Option<String>,
}

impl Token {
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            ..Self::default()
        }
    }
}

impl Entry for Token {
    fn word(&self) -> &str {
        &self.word
    }
}

/// Word and character vocabularies.
///
/// Both maps are guaranteed to contain [`UNK`] and [`PAD`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEncodings")]
pub struct Encodings {
    word2int: HashMap<String, u32>,
    char2int: HashMap<String, u32>,
}

#[derive(Deserialize)]
struct RawEncodings {
    word2int: HashMap<String, u32>,
    char2int: HashMap<String, u32>,
}

impl TryFrom<RawEncodings> for Encodings {
    type Error = Error;

    fn try_from(raw: RawEncodings) -> Result<Self> {
        Self::new(raw.word2int, raw.char2int)
    }
}

impl Encodings {
    pub fn new(word2int: HashMap<String, u32>, char2int: HashMap<String, u32>) -> Result<Self> {
        for (name, map) in [("word2int", &word2int), ("char2int", &char2int)] {
            for key in [UNK, PAD] {
                if !map.contains_key(key) {
                    return Err(Error::Vocabulary(format!("{name} has no {key} entry")));
                }
            }
        }
        Ok(Self { word2int, char2int })
    }

    /// Build vocabularies from training sentences.
    ///
    /// Ids: `<PAD>` = 0, `<UNK>` = 1, then lowercased words seen at least
    /// `word_cutoff` times and every lowercased character, in first-seen order.
    pub fn compute<S, E>(sentences: &[S], word_cutoff: usize) -> Self
    where
        S: AsRef<[E]>,
        E: Entry,
    {
        let mut word_order: Vec<String> = Vec::new();
        let mut word_freq: HashMap<String, usize> = HashMap::new();
        let mut char2int = reserved_map();

        for sentence in sentences {
            for entry in sentence.as_ref() {
                let word = entry.word();
                let lower = word.to_lowercase();
                let count = word_freq.entry(lower.clone()).or_insert_with(|| {
                    word_order.push(lower);
                    0
                });
                *count += 1;

                for c in word.chars() {
                    let key: String = c.to_lowercase().collect();
                    let next = char2int.len() as u32;
                    char2int.entry(key).or_insert(next);
                }
            }
        }

        let mut word2int = reserved_map();
        for word in word_order {
            if word_freq[&word] >= word_cutoff && !word2int.contains_key(&word) {
                let next = word2int.len() as u32;
                word2int.insert(word, next);
            }
        }

        tracing::debug!(
            "computed encodings: {} words, {} chars",
            word2int.len(),
            char2int.len()
        );
        Self { word2int, char2int }
    }

    /// Load vocabularies from a JSON file with `word2int` and `char2int` objects.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    /// Id of the lowercased word, or `<UNK>`.
    pub fn word_id(&self, word: &str) -> u32 {
        self.word2int
            .get(&word.to_lowercase())
            .copied()
            .unwrap_or_else(|| self.word_unk_id())
    }

    /// Id of the lowercased character, or `<UNK>`.
    ///
    /// The lowercase form may span several code points (e.g. `İ`).
    pub fn char_id(&self, c: char) -> u32 {
        let key: String = c.to_lowercase().collect();
        self.char2int
            .get(&key)
            .copied()
            .unwrap_or_else(|| self.char_unk_id())
    }

    pub fn word_unk_id(&self) -> u32 {
        self.word2int[UNK]
    }

    pub fn word_pad_id(&self) -> u32 {
        self.word2int[PAD]
    }

    pub fn char_unk_id(&self) -> u32 {
        self.char2int[UNK]
    }

    /// Rows needed in the word embedding table.
    ///
    /// Ids are not required to be dense, so this is `max id + 1`.
    pub fn num_words(&self) -> usize {
        table_rows(&self.word2int)
    }

    /// Rows needed in the character embedding table.
    pub fn num_chars(&self) -> usize {
        table_rows(&self.char2int)
    }

    pub fn word2int(&self) -> &HashMap<String, u32> {
        &self.word2int
    }

    pub fn char2int(&self) -> &HashMap<String, u32> {
        &self.char2int
    }
}

fn reserved_map() -> HashMap<String, u32> {
    HashMap::from([(PAD.to_string(), 0), (UNK.to_string(), 1)])
}

fn table_rows(map: &HashMap<String, u32>) -> usize {
    map.values().max().map_or(0, |&m| m as usize + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> Encodings {
        let words = HashMap::from([
            ("<PAD>".to_string(), 3),
            ("<UNK>".to_string(), 1),
            ("cat".to_string(), 5),
        ]);
        let chars = HashMap::from([
            ("<PAD>".to_string(), 0),
            ("<UNK>".to_string(), 1),
            ("c".to_string(), 2),
            ("a".to_string(), 3),
        ]);
        Encodings::new(words, chars).unwrap()
    }

    #[test]
    fn test_missing_reserved_entry() {
        let words = HashMap::from([("<UNK>".to_string(), 1)]);
        let chars = HashMap::from([("<UNK>".to_string(), 1), ("<PAD>".to_string(), 0)]);
        let err = Encodings::new(words, chars).unwrap_err();
        assert!(err.to_string().contains("word2int has no <PAD>"));
    }

    #[test]
    fn test_lookup_is_lowercased() {
        let enc = toy();
        assert_eq!(enc.word_id("Cat"), 5);
        assert_eq!(enc.word_id("CAT"), 5);
        assert_eq!(enc.word_id("dog"), 1);
        assert_eq!(enc.char_id('C'), 2);
        assert_eq!(enc.char_id('a'), 3);
        assert_eq!(enc.char_id('z'), 1);
        assert_eq!(enc.word_pad_id(), 3);
        assert_eq!(enc.num_words(), 6);
    }

    #[test]
    fn test_compute_vocabulary() {
        let sents = vec![vec!["The", "cat"], vec!["the", "dog", "!"]];
        let enc = Encodings::compute(&sents, 2);
        assert_eq!(enc.word_pad_id(), 0);
        assert_eq!(enc.word_unk_id(), 1);
        // Only "the" reaches the cutoff.
        assert_eq!(enc.word_id("THE"), 2);
        assert_eq!(enc.word_id("cat"), 1);
        assert_eq!(enc.char_id('T'), 2);
        assert_eq!(enc.char_id('!'), enc.char_id('!'));
        assert_ne!(enc.char_id('!'), enc.char_unk_id());
        assert_eq!(enc.num_chars(), enc.char2int().len());
    }

    #[test]
    fn test_json_rejects_incomplete_vocabulary() {
        let json = r#"{"word2int": {"<UNK>": 1}, "char2int": {"<UNK>": 1, "<PAD>": 0}}"#;
        assert!(serde_json::from_str::<Encodings>(json).is_err());

        let json = r#"{"word2int": {"<UNK>": 1, "<PAD>": 0}, "char2int": {"<UNK>": 1, "<PAD>": 0}}"#;
        let enc: Encodings = serde_json::from_str(json).unwrap();
        assert_eq!(enc.word_id("anything"), 1);
    }

    #[test]
    fn test_entry_impls() {
        let tok = Token::new("Paris");
        assert_eq!(tok.word(), "Paris");
        assert_eq!("x".word(), "x");
        assert_eq!(String::from("y").word(), "y");
        assert_eq!((&tok).word(), "Paris");
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.json");
        let enc = Encodings::compute(&[vec!["The", "cat"], vec!["the", "mat"]], 1);
        enc.to_json_file(&path).unwrap();

        let loaded = Encodings::from_json_file(&path).unwrap();
        assert_eq!(loaded, enc);
        assert_eq!(loaded.word_id("CAT"), enc.word_id("cat"));
    }

    #[test]
    fn test_json_file_without_pad_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.json");
        std::fs::write(
            &path,
            r#"{"word2int": {"<UNK>": 1, "cat": 2}, "char2int": {"<UNK>": 1, "<PAD>": 0}}"#,
        )
        .unwrap();

        let err = Encodings::from_json_file(&path).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
        assert!(err.to_string().contains("word2int has no <PAD>"), "{err}");

        let missing = dir.path().join("absent.json");
        assert!(matches!(
            Encodings::from_json_file(&missing).unwrap_err(),
            Error::Io(_)
        ));
    }
}

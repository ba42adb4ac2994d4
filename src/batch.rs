//! Sentence batching and character case classification.
//!
//! A batch of `B` sentences becomes three padded id grids:
//!
//! ```text
//! word_ids  [B, S]      padded with the vocabulary's <PAD> id
//! char_ids  [B*S, W]    padded with 0
//! case_ids  [B*S, W]    padded with 0 (CaseCategory::Padding)
//! ```
//!
//! where `S` is the longest sentence and `W` the longest word anywhere in
//! the batch. Character padding is 0 even when `<PAD>` maps elsewhere.

use candle_core::{Device, Tensor};

use crate::Result;
use crate::vocab::{Encodings, Entry};

/// Case of a single character, as fed to the case embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CaseCategory {
    Padding = 0,
    Upper = 1,
    Lower = 2,
    /// No case distinction (digits, punctuation, most scripts).
    Symbol = 3,
}

impl CaseCategory {
    pub fn of(c: char) -> Self {
        if c.to_lowercase().eq(c.to_uppercase()) {
            Self::Symbol
        } else if !c.to_uppercase().eq(std::iter::once(c)) {
            Self::Lower
        } else {
            Self::Upper
        }
    }

    pub fn index(self) -> u32 {
        self as u32
    }
}

/// Case index of `c`: 1 upper, 2 lower, 3 symbol.
pub fn case_index(c: char) -> u32 {
    CaseCategory::of(c).index()
}

/// Padded id grids for one forward call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub batch_size: usize,
    pub max_sent_len: usize,
    pub max_word_len: usize,
    /// Unpadded length of each sentence.
    pub lengths: Vec<usize>,
    /// Row-major `[batch_size, max_sent_len]`.
    pub word_ids: Vec<u32>,
    /// Row-major `[batch_size * max_sent_len, max_word_len]`.
    pub char_ids: Vec<u32>,
    /// Same layout as `char_ids`.
    pub case_ids: Vec<u32>,
}

impl Batch {
    /// Look up and pad every sentence.
    ///
    /// Each entry must expose its word; nothing else is read.
    pub fn build<S, E>(sentences: &[S], encodings: &Encodings) -> Self
    where
        S: AsRef<[E]>,
        E: Entry,
    {
        let lengths: Vec<usize> = sentences.iter().map(|s| s.as_ref().len()).collect();
        let max_sent_len = lengths.iter().copied().max().unwrap_or(0);
        let max_word_len = sentences
            .iter()
            .flat_map(|s| s.as_ref().iter())
            .map(|e| e.word().chars().count())
            .max()
            .unwrap_or(0);

        let rows = sentences.len() * max_sent_len;
        let mut word_ids = Vec::with_capacity(rows);
        let mut char_ids = Vec::with_capacity(rows * max_word_len);
        let mut case_ids = Vec::with_capacity(rows * max_word_len);
        let word_pad = encodings.word_pad_id();

        for sentence in sentences {
            let sentence = sentence.as_ref();
            for entry in sentence {
                let word = entry.word();
                word_ids.push(encodings.word_id(word));

                let mut len = 0;
                for c in word.chars() {
                    char_ids.push(encodings.char_id(c));
                    case_ids.push(case_index(c));
                    len += 1;
                }
                let pad = max_word_len - len;
                char_ids.extend(std::iter::repeat_n(0, pad));
                case_ids.extend(std::iter::repeat_n(CaseCategory::Padding.index(), pad));
            }

            let missing = max_sent_len - sentence.len();
            word_ids.extend(std::iter::repeat_n(word_pad, missing));
            char_ids.extend(std::iter::repeat_n(0, missing * max_word_len));
            case_ids.extend(std::iter::repeat_n(0, missing * max_word_len));
        }

        Self {
            batch_size: sentences.len(),
            max_sent_len,
            max_word_len,
            lengths,
            word_ids,
            char_ids,
            case_ids,
        }
    }

    /// Number of (possibly padded) token positions, `batch_size * max_sent_len`.
    pub fn num_tokens(&self) -> usize {
        self.batch_size * self.max_sent_len
    }

    pub fn word_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_vec(
            self.word_ids.clone(),
            (self.batch_size, self.max_sent_len),
            device,
        )?)
    }

    pub fn char_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_vec(
            self.char_ids.clone(),
            (self.num_tokens(), self.max_word_len),
            device,
        )?)
    }

    pub fn case_tensor(&self, device: &Device) -> Result<Tensor> {
        Ok(Tensor::from_vec(
            self.case_ids.clone(),
            (self.num_tokens(), self.max_word_len),
            device,
        )?)
    }

    /// `[B*S, W]` f32 mask, 1.0 on real characters.
    ///
    /// Derived from the case grid since every real character has a non-zero
    /// case index.
    pub fn char_mask(&self, device: &Device) -> Result<Tensor> {
        let mask: Vec<f32> = self
            .case_ids
            .iter()
            .map(|&c| if c == 0 { 0.0 } else { 1.0 })
            .collect();
        Ok(Tensor::from_vec(mask, (self.num_tokens(), self.max_word_len), device)?)
    }

    /// `[B, S]` f32 mask, 1.0 on real tokens.
    pub fn token_mask(&self, device: &Device) -> Result<Tensor> {
        let mut mask = Vec::with_capacity(self.num_tokens());
        for &len in &self.lengths {
            mask.extend((0..self.max_sent_len).map(|i| if i < len { 1f32 } else { 0.0 }));
        }
        Ok(Tensor::from_vec(
            mask,
            (self.batch_size, self.max_sent_len),
            device,
        )?)
    }
}

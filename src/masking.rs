//! Structured word/character input dropout (training only).
//!
//! Every token position draws two uniforms `p1`, `p2` and picks one of four
//! outcomes for the (character, word) pair:
//!
//! ```text
//! p1 >= prob, p2 <  prob  →  (2, 0)   keep chars, double them
//! p1 <  prob, p2 >= prob  →  (0, 2)   keep words, double them
//! p1 <  prob, p2 <  prob  →  (0, 0)   drop both
//! p1 >= prob, p2 >= prob  →  (1, 1)   keep both
//! ```
//!
//! With `a = [p1 >= prob]` and `b = [p2 >= prob]` this is
//! `char = a·(2 − b)`, `word = b·(2 − a)`, which is how it is evaluated.
//!
//! The random source is always supplied by the caller.

use candle_core::{DType, Device, Tensor};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::Result;

/// Reproducible generator for [`sample_input_masks`].
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Scalar form of the outcome table, `(char, word)`.
pub fn mask_pair(p1: f64, p2: f64, prob: f64) -> (f32, f32) {
    match (p1 >= prob, p2 >= prob) {
        (true, false) => (2.0, 0.0),
        (false, true) => (0.0, 2.0),
        (false, false) => (0.0, 0.0),
        (true, true) => (1.0, 1.0),
    }
}

/// Per-position multipliers for the character and word channels.
#[derive(Debug, Clone)]
pub struct InputMasks {
    /// `[batch, seq]`
    pub char: Tensor,
    /// `[batch, seq]`
    pub word: Tensor,
}

impl InputMasks {
    /// Multiply `[batch, seq, dim]` embeddings by their masks.
    pub fn apply(&self, char_emb: &Tensor, word_emb: &Tensor) -> Result<(Tensor, Tensor)> {
        let char_mask = self.char.unsqueeze(2)?.to_dtype(char_emb.dtype())?;
        let word_mask = self.word.unsqueeze(2)?.to_dtype(word_emb.dtype())?;
        Ok((
            char_emb.broadcast_mul(&char_mask)?,
            word_emb.broadcast_mul(&word_mask)?,
        ))
    }
}

/// Sample masks for a `[batch, seq]` grid of token positions.
pub fn sample_input_masks<R: Rng + ?Sized>(
    rng: &mut R,
    batch: usize,
    seq: usize,
    prob: f64,
    device: &Device,
) -> Result<InputMasks> {
    let n = batch * seq;
    let p1: Vec<f64> = (0..n).map(|_| rng.random::<f64>()).collect();
    let p2: Vec<f64> = (0..n).map(|_| rng.random::<f64>()).collect();

    // Compared in f64 on the host so the thresholds match `mask_pair` exactly.
    let keep_char = Tensor::from_vec(p1, (batch, seq), &Device::Cpu)?
        .ge(prob)?
        .to_dtype(DType::F32)?;
    let keep_word = Tensor::from_vec(p2, (batch, seq), &Device::Cpu)?
        .ge(prob)?
        .to_dtype(DType::F32)?;

    // a·(2 − b) and b·(2 − a)
    let char = (&keep_char * keep_word.affine(-1.0, 2.0)?)?;
    let word = (&keep_word * keep_char.affine(-1.0, 2.0)?)?;
    Ok(InputMasks {
        char: char.to_device(device)?,
        word: word.to_device(device)?,
    })
}

//! Character-level word encoder with self-attention pooling.
//!
//! Turns each word's padded character features into one fixed-size vector.
//!
//! ## Architecture
//!
//! ```text
//! chars [N, W, F] → BiLSTM(H, layers) → h [N, W, 2H]
//!
//! scores  = Linear(H, 1)(tanh(Linear(2H, H)(h)))      [N, W]
//! weights = softmax(scores masked to real characters)
//! pooled  = Σ_w weights_w · h_w                        [N, 2H]
//!
//! summary = cat[pooled, h_fwd[last char], h_bwd[first char]]   [N, 4H]
//! out     = Linear(4H, output_size)(Dropout(summary))          [N, output_size]
//! ```
//!
//! Words are right-padded to the batch's longest word. The backward LSTM
//! direction reverses each word within its own length, so a word's vector
//! does not depend on the other words in the batch. Rows with no real
//! characters (sentence padding, empty words) attend uniformly and are
//! otherwise treated like any other row.

use candle_core::{DType, IndexOp, Module, Tensor};
use candle_nn::{self as nn, VarBuilder};

use crate::Result;
use crate::model::lstm::BiLstm;

/// Additive score for padded characters. Finite, so fully padded rows stay
/// free of NaNs.
const MASKED_SCORE: f64 = -1e4;

/// Self-attention character network.
#[derive(Debug)]
pub struct CharacterNetwork {
    encoder: BiLstm,
    attention_proj: nn::Linear,
    attention_score: nn::Linear,
    output: nn::Linear,
    dropout: nn::Dropout,
    output_size: usize,
}

impl CharacterNetwork {
    pub fn new(
        input_size: usize,
        encoder_size: usize,
        encoder_layers: usize,
        output_size: usize,
        dropout: f64,
        vb: VarBuilder,
    ) -> Result<Self> {
        let encoder = BiLstm::new(
            input_size,
            encoder_size,
            encoder_layers,
            dropout,
            vb.pp("encoder"),
        )?;
        let enc_out = encoder.output_size();
        let attention_proj = nn::linear(enc_out, encoder_size, vb.pp("attention.proj"))?;
        let attention_score = nn::linear_no_bias(encoder_size, 1, vb.pp("attention.score"))?;
        let output = nn::linear(2 * enc_out, output_size, vb.pp("output"))?;

        Ok(Self {
            encoder,
            attention_proj,
            attention_score,
            output,
            dropout: nn::Dropout::new(dropout as f32),
            output_size,
        })
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// Forward pass.
    ///
    /// - `chars`: `[N, W, input_size]` per-character features
    /// - `mask`: `[N, W]` 1.0 for real characters, 0.0 for padding
    ///
    /// Returns `[N, output_size]`. `W == 0` yields zeros.
    pub fn forward_t(&self, chars: &Tensor, mask: &Tensor, train: bool) -> Result<Tensor> {
        let (n, w, _) = chars.dims3()?;
        if n == 0 || w == 0 {
            return Ok(Tensor::zeros(
                (n, self.output_size),
                chars.dtype(),
                chars.device(),
            )?);
        }
        let mask = mask.to_dtype(chars.dtype())?;
        let lengths = mask.sum(1)?; // [N]

        let h = self.encoder.forward_t(chars, Some(&lengths), train)?; // [N, W, 2H]
        let hidden = self.encoder.hidden_size();

        // Attention pooling over characters.
        let scores = self
            .attention_score
            .forward(&self.attention_proj.forward(&h)?.tanh()?)?
            .squeeze(2)?; // [N, W]
        let bias = (mask.affine(1.0, -1.0)? * -MASKED_SCORE)?;
        let scores = (scores + bias)?;
        let weights = nn::ops::softmax_last_dim(&scores)?;
        let pooled = weights.unsqueeze(1)?.matmul(&h)?.squeeze(1)?; // [N, 2H]

        // Forward state at the last real character, backward state at the first.
        let last = (&lengths - 1.0)?
            .clamp(0f32, (w - 1) as f32)?
            .to_dtype(DType::U32)?; // [N]
        let index = last
            .reshape((n, 1, 1))?
            .expand((n, 1, hidden))?
            .contiguous()?;
        let fwd_last = h
            .narrow(2, 0, hidden)?
            .contiguous()?
            .gather(&index, 1)?
            .squeeze(1)?; // [N, H]
        let bwd_first = h.i((.., 0, hidden..))?.contiguous()?; // [N, H]

        let summary = Tensor::cat(&[&pooled, &fwd_last, &bwd_first], 1)?;
        let summary = self.dropout.forward(&summary, train)?;
        Ok(self.output.forward(&summary)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use candle_nn::VarMap;

    fn make_vb(device: &Device) -> (VarMap, VarBuilder<'static>) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        (varmap, vb)
    }

    fn network(vb: VarBuilder) -> CharacterNetwork {
        CharacterNetwork::new(8, 6, 2, 10, 0.5, vb).unwrap()
    }

    #[test]
    fn output_shape() {
        let device = Device::Cpu;
        let (_varmap, vb) = make_vb(&device);
        let net = network(vb);

        let chars = Tensor::randn(0f32, 1.0, (5, 7, 8), &device).unwrap();
        let mask = Tensor::ones((5, 7), DType::F32, &device).unwrap();
        let out = net.forward_t(&chars, &mask, false).unwrap();
        assert_eq!(out.dims(), &[5, 10]);
    }

    #[test]
    fn padding_rows_stay_finite() {
        let device = Device::Cpu;
        let (_varmap, vb) = make_vb(&device);
        let net = network(vb);

        let chars = Tensor::randn(0f32, 1.0, (2, 4, 8), &device).unwrap();
        // Second row is sentence padding: no real characters.
        let mask = Tensor::new(&[[1f32, 1.0, 0.0, 0.0], [0.0, 0.0, 0.0, 0.0]], &device).unwrap();
        let out = net.forward_t(&chars, &mask, false).unwrap();
        let values: Vec<f32> = out.flatten_all().unwrap().to_vec1().unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn zero_width_words() {
        let device = Device::Cpu;
        let (_varmap, vb) = make_vb(&device);
        let net = network(vb);

        let chars = Tensor::zeros((3, 0, 8), DType::F32, &device).unwrap();
        let mask = Tensor::zeros((3, 0), DType::F32, &device).unwrap();
        let out = net.forward_t(&chars, &mask, true).unwrap();
        assert_eq!(out.dims(), &[3, 10]);
        let sum: f32 = out.abs().unwrap().sum_all().unwrap().to_scalar().unwrap();
        assert_eq!(sum, 0.0);
    }

    #[test]
    fn eval_is_deterministic() {
        let device = Device::Cpu;
        let (_varmap, vb) = make_vb(&device);
        let net = network(vb);

        let chars = Tensor::randn(0f32, 1.0, (4, 5, 8), &device).unwrap();
        let mask = Tensor::ones((4, 5), DType::F32, &device).unwrap();
        let a: Vec<Vec<f32>> = net.forward_t(&chars, &mask, false).unwrap().to_vec2().unwrap();
        let b: Vec<Vec<f32>> = net.forward_t(&chars, &mask, false).unwrap().to_vec2().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn word_vector_ignores_batch_padding() {
        let device = Device::Cpu;
        let (_varmap, vb) = make_vb(&device);
        let net = network(vb);

        // A 3-character word alone, then next to a 6-character word.
        let short = Tensor::randn(0f32, 1.0, (1, 3, 8), &device).unwrap();
        let alone = net
            .forward_t(&short, &Tensor::ones((1, 3), DType::F32, &device).unwrap(), false)
            .unwrap();

        let padded_short = short.pad_with_zeros(1, 0, 3).unwrap();
        let long = Tensor::randn(0f32, 1.0, (1, 6, 8), &device).unwrap();
        let chars = Tensor::cat(&[&padded_short, &long], 0).unwrap();
        let mask = Tensor::new(
            &[[1f32, 1.0, 1.0, 0.0, 0.0, 0.0], [1.0, 1.0, 1.0, 1.0, 1.0, 1.0]],
            &device,
        )
        .unwrap();
        let batched = net.forward_t(&chars, &mask, false).unwrap().narrow(0, 0, 1).unwrap();

        let diff: f32 = (alone - batched)
            .unwrap()
            .abs()
            .unwrap()
            .max_all()
            .unwrap()
            .to_scalar()
            .unwrap();
        assert!(diff < 1e-5, "diff {diff}");
    }
}

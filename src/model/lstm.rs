//! Stacked bidirectional LSTM.
//!
//! Each layer runs one `candle_nn::LSTM` over the sequence and a second one
//! over the time-reversed sequence, then concatenates both outputs:
//!
//! ```text
//! x [B, T, F] ─┬─ LSTM_fwd ──────────────────────── [B, T, H] ─┐
//!              └─ rev(T) → LSTM_bwd → rev(T) ─ [B, T, H] ─┴─ cat → [B, T, 2H]
//! ```
//!
//! With per-row lengths, `rev` reverses only the first `len` steps of each row
//! and leaves the right padding in place, so the backward direction reads the
//! real steps first. Outputs at real positions then do not depend on how much
//! padding the batch carries. Without lengths the whole row is flipped.
//!
//! Dropout is applied between layers in training mode. Only the output
//! sequence is returned; final hidden/cell states are discarded.
//!
//! ## Weight key paths
//!
//! ```text
//! weight_ih_l{i}, weight_hh_l{i}, bias_ih_l{i}, bias_hh_l{i}
//! weight_ih_l{i}_reverse, ...                         (backward direction)
//! ```

use candle_core::{DType, Tensor};
use candle_nn::rnn::Direction;
use candle_nn::{self as nn, LSTMConfig, RNN, VarBuilder};

use crate::Result;

struct BiLstmLayer {
    fwd: nn::LSTM,
    bwd: nn::LSTM,
}

impl BiLstmLayer {
    fn new(in_dim: usize, hidden: usize, layer_idx: usize, vb: VarBuilder) -> Result<Self> {
        let fwd = nn::lstm(
            in_dim,
            hidden,
            LSTMConfig {
                layer_idx,
                ..LSTMConfig::default()
            },
            vb.clone(),
        )?;
        let bwd = nn::lstm(
            in_dim,
            hidden,
            LSTMConfig {
                layer_idx,
                direction: Direction::Backward,
                ..LSTMConfig::default()
            },
            vb,
        )?;
        Ok(Self { fwd, bwd })
    }

    /// `[B, T, F]` → `[B, T, 2H]`, with `T > 0`.
    ///
    /// `rev` is the `[B, T]` u32 time permutation from [`reverse_index`].
    fn forward(&self, xs: &Tensor, rev: Option<&Tensor>) -> Result<Tensor> {
        let forward_out = self.fwd.states_to_tensor(&self.fwd.seq(xs)?)?;

        let backward_out = match rev {
            Some(rev) => {
                let reversed = permute_time(xs, rev)?;
                let out = self.bwd.states_to_tensor(&self.bwd.seq(&reversed)?)?;
                permute_time(&out, rev)?
            }
            None => {
                let reversed = xs.flip(&[1])?.contiguous()?;
                self.bwd
                    .states_to_tensor(&self.bwd.seq(&reversed)?)?
                    .flip(&[1])?
            }
        };

        Ok(Tensor::cat(&[&forward_out, &backward_out], 2)?.contiguous()?)
    }
}

/// Per-row time reversal within each valid length.
///
/// `lengths`: `[B]` step counts (any float or integer dtype). Returns `[B, T]`
/// u32 where step `t < len` maps to `len - 1 - t` and padding maps to itself.
/// The permutation is its own inverse.
fn reverse_index(lengths: &Tensor, time: usize) -> Result<Tensor> {
    let batch = lengths.dim(0)?;
    let steps = Tensor::arange(0u32, time as u32, lengths.device())?
        .to_dtype(DType::F32)?
        .unsqueeze(0)?
        .broadcast_as((batch, time))?;
    let lens = lengths
        .to_dtype(DType::F32)?
        .unsqueeze(1)?
        .broadcast_as((batch, time))?;
    let valid = steps.lt(&lens)?;
    let flipped = ((&lens - 1.0)? - &steps)?;
    Ok(valid.where_cond(&flipped, &steps)?.to_dtype(DType::U32)?)
}

/// Reorder `xs [B, T, F]` along time with a `[B, T]` index.
fn permute_time(xs: &Tensor, index: &Tensor) -> Result<Tensor> {
    let (b, t, f) = xs.dims3()?;
    let index = index.unsqueeze(2)?.expand((b, t, f))?.contiguous()?;
    Ok(xs.contiguous()?.gather(&index, 1)?)
}

/// Multi-layer bidirectional LSTM over batch-major sequences.
pub struct BiLstm {
    layers: Vec<BiLstmLayer>,
    dropout: nn::Dropout,
    hidden_size: usize,
}

impl std::fmt::Debug for BiLstm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BiLstm")
            .field("num_layers", &self.layers.len())
            .field("hidden_size", &self.hidden_size)
            .finish()
    }
}

impl BiLstm {
    pub fn new(
        input_size: usize,
        hidden_size: usize,
        num_layers: usize,
        dropout: f64,
        vb: VarBuilder,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(num_layers);
        for i in 0..num_layers {
            let in_dim = if i == 0 { input_size } else { 2 * hidden_size };
            layers.push(BiLstmLayer::new(in_dim, hidden_size, i, vb.clone())?);
        }
        Ok(Self {
            layers,
            dropout: nn::Dropout::new(dropout as f32),
            hidden_size,
        })
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// Width of each output step, `2 * hidden_size`.
    pub fn output_size(&self) -> usize {
        2 * self.hidden_size
    }

    /// `xs`: `[B, T, input_size]` → `[B, T, 2 * hidden_size]`.
    ///
    /// `lengths` (`[B]`) marks how many leading steps of each row are real;
    /// rows are assumed right-padded. `None` treats every step as real.
    ///
    /// An empty batch or zero-length sequence returns zeros of the output
    /// shape.
    pub fn forward_t(&self, xs: &Tensor, lengths: Option<&Tensor>, train: bool) -> Result<Tensor> {
        let (batch, time, _) = xs.dims3()?;
        if batch == 0 || time == 0 {
            return Ok(Tensor::zeros(
                (batch, time, self.output_size()),
                xs.dtype(),
                xs.device(),
            )?);
        }

        let rev = lengths.map(|l| reverse_index(l, time)).transpose()?;
        let mut h = xs.contiguous()?;
        for (i, layer) in self.layers.iter().enumerate() {
            if i > 0 {
                h = self.dropout.forward(&h, train)?;
            }
            h = layer.forward(&h, rev.as_ref())?;
        }
        Ok(h)
    }
}

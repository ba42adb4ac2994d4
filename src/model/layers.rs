//! Small building blocks shared by the character and sentence encoders.
//!
//! - [`PaddedEmbedding`] — lookup table whose row 0 always reads as zeros
//! - [`FeatureFusion`] — concat N features → Linear → tanh → Dropout

use candle_core::{D, Module, Tensor};
use candle_nn::{self as nn, VarBuilder};

use crate::Result;

/// Index whose embedding is forced to zero.
pub const PADDING_IDX: u32 = 0;

/// Embedding table with a zeroed padding row.
///
/// The table itself is a plain `candle_nn::Embedding`; lookups of
/// [`PADDING_IDX`] are masked to zero so they carry neither signal nor
/// gradient.
#[derive(Debug, Clone)]
pub struct PaddedEmbedding {
    inner: nn::Embedding,
}

impl PaddedEmbedding {
    pub fn new(vocab_size: usize, dim: usize, vb: VarBuilder) -> Result<Self> {
        let inner = nn::embedding(vocab_size, dim, vb)?;
        Ok(Self { inner })
    }

    /// `ids`: any shape of u32 → `[..ids.shape, dim]`.
    pub fn forward(&self, ids: &Tensor) -> Result<Tensor> {
        let emb = self.inner.forward(ids)?;
        let keep = ids
            .ne(PADDING_IDX)?
            .to_dtype(emb.dtype())?
            .unsqueeze(D::Minus1)?;
        Ok(emb.broadcast_mul(&keep)?)
    }
}

/// Concatenate heterogeneous features and project them to a fixed width.
///
/// ```text
/// cat(x_1 .. x_n, dim=-1) → Linear(Σ d_i, out) → tanh → Dropout(p)
/// ```
///
/// Used for the character + case projection and for the output MLP (a
/// single input).
#[derive(Debug, Clone)]
pub struct FeatureFusion {
    proj: nn::Linear,
    dropout: nn::Dropout,
    out_dim: usize,
}

impl FeatureFusion {
    pub fn new(in_dims: &[usize], out_dim: usize, dropout: f64, vb: VarBuilder) -> Result<Self> {
        let in_dim = in_dims.iter().sum();
        let proj = nn::linear(in_dim, out_dim, vb.pp("proj"))?;
        Ok(Self {
            proj,
            dropout: nn::Dropout::new(dropout as f32),
            out_dim,
        })
    }

    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    /// All inputs share leading dimensions; dropout is active only when
    /// `train` is set.
    pub fn forward_t(&self, inputs: &[&Tensor], train: bool) -> Result<Tensor> {
        let x = match inputs {
            [single] => (*single).clone(),
            _ => Tensor::cat(inputs, D::Minus1)?,
        };
        let x = self.proj.forward(&x)?.tanh()?;
        Ok(self.dropout.forward(&x, train)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn make_vb(device: &Device) -> (VarMap, VarBuilder<'static>) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        (varmap, vb)
    }

    #[test]
    fn padded_embedding_zeroes_index_zero() {
        let device = Device::Cpu;
        let (_varmap, vb) = make_vb(&device);
        let emb = PaddedEmbedding::new(10, 4, vb).unwrap();

        let ids = Tensor::new(&[[0u32, 3], [3, 0]], &device).unwrap();
        let out = emb.forward(&ids).unwrap();
        assert_eq!(out.dims(), &[2, 2, 4]);

        let rows: Vec<Vec<Vec<f32>>> = out.to_vec3().unwrap();
        assert_eq!(rows[0][0], vec![0.0; 4]);
        assert_eq!(rows[1][1], vec![0.0; 4]);
        assert_eq!(rows[0][1], rows[1][0]);
        assert!(rows[0][1].iter().any(|v| *v != 0.0));
    }

    #[test]
    fn fusion_concatenates_and_projects() {
        let device = Device::Cpu;
        let (varmap, vb) = make_vb(&device);
        let fusion = FeatureFusion::new(&[8, 3], 5, 0.5, vb).unwrap();
        assert_eq!(varmap.data().lock().unwrap()["proj.weight"].dims(), &[5, 11]);

        let a = Tensor::randn(0f32, 1.0, (2, 7, 8), &device).unwrap();
        let b = Tensor::randn(0f32, 1.0, (2, 7, 3), &device).unwrap();
        let out = fusion.forward_t(&[&a, &b], false).unwrap();
        assert_eq!(out.dims(), &[2, 7, 5]);

        // tanh bounds the output.
        let max: f32 = out.abs().unwrap().max_all().unwrap().to_scalar().unwrap();
        assert!(max <= 1.0);
    }

    #[test]
    fn fusion_eval_is_deterministic() {
        let device = Device::Cpu;
        let (_varmap, vb) = make_vb(&device);
        let fusion = FeatureFusion::new(&[6], 6, 0.5, vb).unwrap();
        let x = Tensor::randn(0f32, 1.0, (3, 6), &device).unwrap();
        let a: Vec<Vec<f32>> = fusion.forward_t(&[&x], false).unwrap().to_vec2().unwrap();
        let b: Vec<Vec<f32>> = fusion.forward_t(&[&x], false).unwrap().to_vec2().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fusion_rejects_mismatched_inputs() {
        let device = Device::Cpu;
        let (_varmap, vb) = make_vb(&device);
        let fusion = FeatureFusion::new(&[4, 4], 2, 0.0, vb).unwrap();
        let a = Tensor::zeros((2, 4), DType::F32, &device).unwrap();
        let b = Tensor::zeros((3, 4), DType::F32, &device).unwrap();
        assert!(fusion.forward_t(&[&a, &b], false).is_err());
    }
}

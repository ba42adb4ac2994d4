//! Word-level text encoder for the tagger.
//!
//! Combines a character-derived vector and a word embedding per token, runs
//! the sentence through a bidirectional LSTM and projects the result to the
//! tagger's working width.
//!
//! ## Architecture
//!
//! ```text
//! sentences ─ Batch::build ─┬─ char ids [B*S, W] ─ char_emb ─┐
//!                           │  case ids [B*S, W] ─ case_emb ─┴─ char_proj → [B*S, W, Fc]
//!                           │                                     ↓
//!                           │                          CharacterNetwork → [B, S, E]
//!                           └─ word ids [B, S] ─ word_emb ────────────── [B, S, E]
//!
//! x   = tanh(m_c · char + m_w · word)      (m = input masks in training, else 1)
//! h   = BiLSTM(cat[x, cond], lengths)      [B, S, 2H]
//! out = mlp(cat[h, cond])                  [B, S, tagger_mlp_layer]
//! ```
//!
//! `cond` is the optional external conditioning and only present when the
//! encoder is built with a non-zero conditioning width. `mlp` is a
//! single-input [`FeatureFusion`]. Both LSTMs run length-aware, so outputs at
//! real positions do not depend on padding added for other batch members.
//!
//! ## Weight key paths
//!
//! ```text
//! word_emb.weight, char_emb.weight, case_emb.weight
//! char_proj.proj.{weight,bias}
//! character_network.encoder.*, character_network.attention.*, character_network.output.*
//! encoder.weight_{ih,hh}_l{i}[_reverse], encoder.bias_{ih,hh}_l{i}[_reverse]
//! mlp.proj.{weight,bias}
//! ```

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use rand::{Rng, RngCore};

use crate::batch::Batch;
use crate::config::{DeviceSpec, TaggerConfig};
use crate::masking::sample_input_masks;
use crate::model::encoder::character::CharacterNetwork;
use crate::model::layers::{FeatureFusion, PaddedEmbedding};
use crate::model::lstm::BiLstm;
use crate::vocab::{Encodings, Entry};
use crate::{Error, Result};

/// Number of case categories (padding, upper, lower, symbol).
const NUM_CASES: usize = 4;

/// Character-aware text encoder.
#[derive(Debug)]
pub struct TextEncoder {
    word_emb: PaddedEmbedding,
    char_emb: PaddedEmbedding,
    case_emb: PaddedEmbedding,
    char_proj: FeatureFusion,
    character_network: CharacterNetwork,
    encoder: BiLstm,
    mlp: FeatureFusion,
    encodings: Encodings,
    config: TaggerConfig,
    ext_conditioning: usize,
    dtype: DType,
    device: Device,
}

impl TextEncoder {
    /// Build the encoder on `vb`'s device and dtype.
    ///
    /// `ext_conditioning` widens the sentence encoder input and the MLP input
    /// by that many features.
    pub fn new(
        config: &TaggerConfig,
        encodings: Encodings,
        ext_conditioning: Option<usize>,
        vb: VarBuilder,
    ) -> Result<Self> {
        config.validate()?;
        let ext = ext_conditioning.unwrap_or(0);
        let emb = config.tagger_embeddings_size;
        let char_in = config.char_input_embeddings_size;

        let word_emb = PaddedEmbedding::new(encodings.num_words(), emb, vb.pp("word_emb"))?;
        let char_emb = PaddedEmbedding::new(encodings.num_chars(), char_in, vb.pp("char_emb"))?;
        let case_emb =
            PaddedEmbedding::new(NUM_CASES, config.case_embeddings_size, vb.pp("case_emb"))?;
        let char_proj = FeatureFusion::new(
            &[char_in, config.case_embeddings_size],
            char_in,
            config.tagger_encoder_dropout,
            vb.pp("char_proj"),
        )?;
        let character_network = CharacterNetwork::new(
            char_in,
            config.char_encoder_size,
            config.char_encoder_layers,
            emb,
            config.tagger_encoder_dropout,
            vb.pp("character_network"),
        )?;
        let encoder = BiLstm::new(
            emb + ext,
            config.tagger_encoder_size,
            config.tagger_encoder_layers,
            config.tagger_encoder_dropout,
            vb.pp("encoder"),
        )?;
        let mlp = FeatureFusion::new(
            &[encoder.output_size(), ext],
            config.tagger_mlp_layer,
            config.tagger_mlp_dropout,
            vb.pp("mlp"),
        )?;

        tracing::info!(
            "Text encoder: {} words, {} chars, emb={}, encoder={}x{}, mlp={}, ext={}, device={:?}",
            encodings.num_words(),
            encodings.num_chars(),
            emb,
            config.tagger_encoder_layers,
            config.tagger_encoder_size,
            config.tagger_mlp_layer,
            ext,
            vb.device()
        );

        Ok(Self {
            word_emb,
            char_emb,
            case_emb,
            char_proj,
            character_network,
            encoder,
            mlp,
            encodings,
            config: config.clone(),
            ext_conditioning: ext,
            dtype: vb.dtype(),
            device: vb.device().clone(),
        })
    }

    /// Build with freshly initialised f32 parameters registered in `varmap`.
    ///
    /// The varmap is what an external training loop hands to its optimizer.
    pub fn from_varmap(
        config: &TaggerConfig,
        encodings: Encodings,
        ext_conditioning: Option<usize>,
        device: DeviceSpec,
        varmap: &VarMap,
    ) -> Result<Self> {
        let device = device.resolve()?;
        let vb = VarBuilder::from_varmap(varmap, DType::F32, &device);
        Self::new(config, encodings, ext_conditioning, vb)
    }

    pub fn config(&self) -> &TaggerConfig {
        &self.config
    }

    pub fn encodings(&self) -> &Encodings {
        &self.encodings
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Width of each output vector.
    pub fn output_size(&self) -> usize {
        self.config.tagger_mlp_layer
    }

    /// Inference forward pass. No masking or dropout; deterministic.
    ///
    /// Returns `[batch, max_sent_len, tagger_mlp_layer]`.
    pub fn forward<S, E>(&self, sentences: &[S], conditioning: Option<&Tensor>) -> Result<Tensor>
    where
        S: AsRef<[E]>,
        E: Entry,
    {
        self.run(sentences, conditioning, None)
    }

    /// Training forward pass: structured input dropout drawn from `rng`, plus
    /// regular dropout in every sub-layer.
    pub fn forward_t<S, E, R>(
        &self,
        sentences: &[S],
        conditioning: Option<&Tensor>,
        rng: &mut R,
    ) -> Result<Tensor>
    where
        S: AsRef<[E]>,
        E: Entry,
        R: Rng,
    {
        self.run(sentences, conditioning, Some(rng as &mut dyn RngCore))
    }

    /// Batch `sentences` and run the character projection.
    ///
    /// Returns `(char_features [B*S, W, char_input_embeddings_size], word_ids [B, S])`.
    pub fn create_batches<S, E>(&self, sentences: &[S]) -> Result<(Tensor, Tensor)>
    where
        S: AsRef<[E]>,
        E: Entry,
    {
        let batch = Batch::build(sentences, &self.encodings);
        let chars = self.project_characters(&batch, false)?;
        Ok((chars, batch.word_tensor(&self.device)?))
    }

    fn run<S, E>(
        &self,
        sentences: &[S],
        conditioning: Option<&Tensor>,
        rng: Option<&mut dyn RngCore>,
    ) -> Result<Tensor>
    where
        S: AsRef<[E]>,
        E: Entry,
    {
        let train = rng.is_some();
        let batch = Batch::build(sentences, &self.encodings);
        let (b, s) = (batch.batch_size, batch.max_sent_len);
        tracing::debug!(
            "text encoder forward: batch={b} max_sent={s} max_word={} train={train}",
            batch.max_word_len
        );

        if batch.num_tokens() == 0 {
            return Ok(Tensor::zeros(
                (b, s, self.output_size()),
                self.dtype,
                &self.device,
            )?);
        }

        let chars = self.project_characters(&batch, train)?;
        let char_mask = batch.char_mask(&self.device)?;
        let char_emb = self
            .character_network
            .forward_t(&chars, &char_mask, train)?
            .reshape((b, s, self.config.tagger_embeddings_size))?;
        let word_emb = self.word_emb.forward(&batch.word_tensor(&self.device)?)?;

        let x = match rng {
            Some(rng) => {
                let masks = sample_input_masks(
                    rng,
                    b,
                    s,
                    self.config.tagger_input_dropout_prob,
                    &self.device,
                )?;
                let (char_emb, word_emb) = masks.apply(&char_emb, &word_emb)?;
                (char_emb + word_emb)?
            }
            None => (char_emb + word_emb)?,
        };
        let x = x.tanh()?;

        let cond = self.conditioning(b, s, conditioning)?;
        let x = with_conditioning(x, cond.as_ref())?;
        let lengths = batch.token_mask(&self.device)?.sum(1)?;
        let h = self.encoder.forward_t(&x, Some(&lengths), train)?;
        let h = with_conditioning(h, cond.as_ref())?;
        self.mlp.forward_t(&[&h], train)
    }

    /// Embed characters and cases, then fuse them: `[B*S, W, char_input_embeddings_size]`.
    fn project_characters(&self, batch: &Batch, train: bool) -> Result<Tensor> {
        let n = batch.num_tokens();
        let w = batch.max_word_len;
        if n == 0 || w == 0 {
            return Ok(Tensor::zeros(
                (n, w, self.char_proj.out_dim()),
                self.dtype,
                &self.device,
            )?);
        }
        let chars = self.char_emb.forward(&batch.char_tensor(&self.device)?)?;
        let cases = self.case_emb.forward(&batch.case_tensor(&self.device)?)?;
        self.char_proj.forward_t(&[&chars, &cases], train)
    }

    /// Conditioning broadcast to `[B, S, ext]`, or `None` when the encoder
    /// was built without it. A missing tensor reads as zeros.
    fn conditioning(
        &self,
        batch: usize,
        seq: usize,
        conditioning: Option<&Tensor>,
    ) -> Result<Option<Tensor>> {
        let ext = self.ext_conditioning;
        if ext == 0 {
            return Ok(None);
        }
        let cond = match conditioning {
            None => Tensor::zeros((batch, seq, ext), self.dtype, &self.device)?,
            Some(c) => {
                let c = c.to_device(&self.device)?.to_dtype(self.dtype)?;
                match c.rank() {
                    2 => c.unsqueeze(1)?.broadcast_as((batch, seq, ext))?.contiguous()?,
                    3 => c,
                    r => {
                        return Err(Error::Config(format!(
                            "conditioning must be [batch, {ext}] or [batch, seq, {ext}], got rank {r}"
                        )));
                    }
                }
            }
        };
        Ok(Some(cond))
    }
}

fn with_conditioning(x: Tensor, cond: Option<&Tensor>) -> Result<Tensor> {
    match cond {
        Some(c) => Ok(Tensor::cat(&[&x, c], 2)?),
        None => Ok(x),
    }
}

//! Character-aware text encoder for part-of-speech tagging.
//!
//! A candle-based model definition that turns batches of tokenised sentences
//! into per-token feature vectors for a downstream tagging head.
//!
//! ## Architecture
//!
//! ```text
//! words ── lowercased lookup ── word embedding ──────────────┐
//!                                                            ├→ masked sum → tanh
//! chars ─┬ char embedding ─┐                                 │
//!        └ case embedding ─┴→ projection → char network ─────┘
//!                                                            ↓
//!                                                 BiLSTM → Linear → tanh → Dropout
//! ```
//!
//! In training the character and word channels go through a structured
//! input dropout whose random source is supplied by the caller.
//!
//! ## Modules
//!
//! - [`vocab`] — entries and word/character vocabularies
//! - [`batch`] — padding, id lookup, case classification
//! - [`masking`] — structured word/character input dropout
//! - [`model`] — embeddings, BiLSTM, character network, text encoder
//! - [`config`] — hyperparameters and device selection

pub mod batch;
pub mod config;
pub mod masking;
pub mod model;
pub mod vocab;

mod error;

pub use config::{DeviceSpec, TaggerConfig};
pub use error::{Error, Result};
pub use model::encoder::text::TextEncoder;
pub use vocab::{Encodings, Entry, Token};

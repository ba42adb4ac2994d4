//! Network components.
//!
//! - [`layers`] — padded embeddings and the concat → Linear → tanh → Dropout fusion block
//! - [`lstm`] — stacked bidirectional LSTM
//! - [`encoder`] — character network and the word-level text encoder

pub mod encoder;
pub mod layers;
pub mod lstm;

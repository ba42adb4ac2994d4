//! Encoders.
//!
//! - [`character`] — self-attention character network (characters → one vector per word)
//! - [`text`] — word-level text encoder combining characters, word embeddings and a BiLSTM

pub mod character;
pub mod text;

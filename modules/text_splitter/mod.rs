//! Text Splitter
//!
//! Splits oversized document text into token-bounded chunks at sentence
//! boundaries so each chunk fits the model's input limit. Chunks partition
//! the input in order: concatenating them reproduces the original text.

pub mod splitter;
pub mod types;

pub use splitter::{sentence_units, TextSplitter};
pub use types::*;

#[cfg(test)]
mod tests;

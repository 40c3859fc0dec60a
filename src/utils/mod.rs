//! Shared utility functions for r2r.
//!
//! Text transforms applied to model responses before they enter the
//! pipeline.

pub mod code_block;

pub use code_block::{extract_any_block, extract_python_block, unwrap_code_block};

//! Field extraction and value normalization for Japanese receipts.
//!
//! Input is the ordered list of recognized text spans produced by OCR;
//! output is a [`ryoshu_core::ReceiptRecord`] with ranked alternates per
//! field. The normalization functions are also usable standalone, e.g. on
//! user-edited values.

mod amount;
mod date;
mod extract;
pub mod normalize;
mod payee;
pub mod tables;
mod text;
mod usage;

pub use extract::{Candidate, ExtractorConfig, FieldExtractor};
pub use normalize::{
    is_valid_normalized_amount, is_valid_normalized_date, is_valid_normalized_payee,
    is_valid_normalized_usage, normalize_amount, normalize_date, normalize_payee, normalize_usage,
};

pub mod fields;
pub mod geometry;
pub mod hash;

pub use fields::{FieldKind, FieldResult, ReceiptRecord, RecognizedText, RecordMetadata};
pub use geometry::{BufferError, PixelBuffer, Rect};
pub use hash::{hash_pixels, sha256_bytes, to_hex};

//! PDF writing for incremental updates.
//!
//! ```text
//! PdfDocument (original bytes, xref, trailer)
//!     ↓
//! [IncrementalUpdate] (new and replaced objects)
//!     ↓
//! [ObjectSerializer] (serializes PDF objects)
//!     ↓
//! original bytes + objects + xref section + trailer
//! ```

mod incremental;
mod object_serializer;

pub use incremental::{IncrementalUpdate, WrittenUpdate};
pub use object_serializer::{hex_upper, name_bytes, ObjectSerializer};

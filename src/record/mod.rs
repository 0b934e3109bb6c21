//! Record model for synthquery
//!
//! Rows are ordered column → value mappings. Cells are tagged scalars whose
//! raw text form drives equality and text ordering, and whose numeric form is
//! obtained only through `try_coerce_number`.

mod record;
mod value;

pub use record::Record;
pub use value::{coerce_number, try_coerce_number, Value, UNSET_MARKER};

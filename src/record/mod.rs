//! Record & tuple model (C5, spec §4.5): column metadata, row/key tuples,
//! comparable-key encoding, and externally-stored (off-page) fields.

mod column;
mod tuple;

pub use column::{Column, ColumnType};
pub use tuple::{externalize_if_needed, FieldValue, Tuple, TupleKind, EXTERN_LOCAL_PREFIX_LEN};

//! Tuple model: the in-memory representation of a row or a search key
//! (spec §4.5). A [`Tuple`] is either a `Row` (one value per table column,
//! used for insert/update payloads and fetched rows) or a `Key` (a prefix
//! of an index's columns, used for search/comparison).

use crate::common::{Error, Result};

use super::column::{Column, ColumnType};

/// Which role a [`Tuple`] is playing; affects how many columns are
/// expected and whether system columns may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TupleKind {
    Row,
    Key,
}

/// One field's value. `External` models a field whose payload doesn't fit
/// on the index page and was pushed to the arena as an overflow chain;
/// only a prefix plus the total length live inline (spec §4.5's
/// "externally stored field").
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bytes(Vec<u8>),
    External { prefix: Vec<u8>, full_len: usize },
}

/// Threshold above which a variable-length field is pushed off-page
/// (loosely mirrors the original's ~768-byte local prefix for BLOBs).
pub const EXTERN_LOCAL_PREFIX_LEN: usize = 768;

#[derive(Debug, Clone)]
pub struct Tuple {
    pub kind: TupleKind,
    pub fields: Vec<FieldValue>,
}

impl Tuple {
    /// Build a row tuple: one field per column in `cols`, in order.
    pub fn row_tuple(fields: Vec<FieldValue>) -> Self {
        Self {
            kind: TupleKind::Row,
            fields,
        }
    }

    /// Build a key tuple over the first `n_cols` columns of an index.
    pub fn key_tuple(fields: Vec<FieldValue>) -> Self {
        Self {
            kind: TupleKind::Key,
            fields,
        }
    }

    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    /// Validate `self` against `cols` (same order), rejecting writes to
    /// system columns, NULLs in NOT NULL columns, and type mismatches.
    /// Used before an insert/update is allowed into the row DML engine.
    pub fn validate(&self, cols: &[Column]) -> Result<()> {
        if self.fields.len() > cols.len() {
            return Err(Error::DataMismatch);
        }
        for (field, col) in self.fields.iter().zip(cols.iter()) {
            if col.is_system && !matches!(field, FieldValue::Null) {
                // System columns (DB_ROW_ID/DB_TRX_ID/DB_ROLL_PTR) are
                // assigned by the engine, never by client writes.
                return Err(Error::DataMismatch);
            }
            match field {
                FieldValue::Null if !col.nullable => return Err(Error::DataMismatch),
                FieldValue::Null => {}
                FieldValue::Int(_) | FieldValue::UInt(_) if !col.col_type.is_integer() => {
                    return Err(Error::DataMismatch)
                }
                FieldValue::Float(_)
                    if !matches!(col.col_type, ColumnType::Float | ColumnType::Double) =>
                {
                    return Err(Error::DataMismatch)
                }
                FieldValue::Bytes(_) | FieldValue::External { .. }
                    if col.col_type.is_integer()
                        || matches!(col.col_type, ColumnType::Float | ColumnType::Double) =>
                {
                    return Err(Error::DataMismatch)
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Canonicalize `self` into a byte-comparable key: fixed-width
    /// integers in big-endian with a sign-flip so memcmp order matches
    /// numeric order, CHAR padded to its declared width, everything else
    /// length-prefixed. Mirrors `mach_write_int_type`-style canonical
    /// encoding used for index keys.
    pub fn encode_comparable(&self, cols: &[Column]) -> Vec<u8> {
        let mut out = Vec::new();
        for (field, col) in self.fields.iter().zip(cols.iter()) {
            match field {
                FieldValue::Null => out.push(0),
                FieldValue::Int(v) => {
                    out.push(1);
                    let flipped = (*v as i64) ^ i64::MIN;
                    out.extend_from_slice(&flipped.to_be_bytes());
                }
                FieldValue::UInt(v) => {
                    out.push(1);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                FieldValue::Float(v) => {
                    out.push(1);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                FieldValue::Bytes(b) => {
                    out.push(1);
                    let mut bytes = b.clone();
                    if let ColumnType::Char(width) = col.col_type {
                        bytes.resize(width as usize, b' ');
                    }
                    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                    out.extend_from_slice(&bytes);
                }
                FieldValue::External { prefix, full_len } => {
                    out.push(1);
                    out.extend_from_slice(&(*full_len as u32).to_be_bytes());
                    out.extend_from_slice(prefix);
                }
            }
        }
        out
    }
}

/// Push a field's value off-page once it exceeds `EXTERN_LOCAL_PREFIX_LEN`,
/// keeping only a local prefix inline. Grounds on the arena allocator for
/// the overflow storage (spec §4.1/§4.5 interaction).
pub fn externalize_if_needed(value: Vec<u8>) -> FieldValue {
    if value.len() <= EXTERN_LOCAL_PREFIX_LEN {
        FieldValue::Bytes(value)
    } else {
        let full_len = value.len();
        let prefix = value[..EXTERN_LOCAL_PREFIX_LEN].to_vec();
        FieldValue::External { prefix, full_len }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::column::{Column, ColumnType};

    fn cols() -> Vec<Column> {
        vec![
            Column::new("id", ColumnType::Int, false),
            Column::new("name", ColumnType::VarChar(32), true),
        ]
    }

    #[test]
    fn test_validate_rejects_null_in_not_null() {
        let t = Tuple::row_tuple(vec![FieldValue::Null, FieldValue::Null]);
        assert!(t.validate(&cols()).is_err());
    }

    #[test]
    fn test_validate_accepts_matching_types() {
        let t = Tuple::row_tuple(vec![
            FieldValue::Int(7),
            FieldValue::Bytes(b"hi".to_vec()),
        ]);
        assert!(t.validate(&cols()).is_ok());
    }

    #[test]
    fn test_validate_rejects_system_column_write() {
        let sys_cols = vec![Column::system("DB_TRX_ID", ColumnType::BigInt)];
        let t = Tuple::row_tuple(vec![FieldValue::Int(1)]);
        assert!(t.validate(&sys_cols).is_err());
    }

    #[test]
    fn test_encode_comparable_char_padding() {
        let cols = vec![Column::new("c", ColumnType::Char(4), true)];
        let t = Tuple::key_tuple(vec![FieldValue::Bytes(b"ab".to_vec())]);
        let enc = t.encode_comparable(&cols);
        // tag byte + 4-byte length prefix + 4 padded bytes
        assert_eq!(enc.len(), 1 + 4 + 4);
        assert_eq!(&enc[5..], b"ab  ");
    }

    #[test]
    fn test_encode_comparable_int_order_preserving() {
        let cols = vec![Column::new("id", ColumnType::Int, false)];
        let neg = Tuple::key_tuple(vec![FieldValue::Int(-5)]).encode_comparable(&cols);
        let pos = Tuple::key_tuple(vec![FieldValue::Int(5)]).encode_comparable(&cols);
        assert!(neg < pos);
    }

    #[test]
    fn test_externalize_threshold() {
        let small = vec![0u8; 10];
        assert!(matches!(externalize_if_needed(small), FieldValue::Bytes(_)));
        let big = vec![0u8; EXTERN_LOCAL_PREFIX_LEN + 100];
        match externalize_if_needed(big) {
            FieldValue::External { prefix, full_len } => {
                assert_eq!(prefix.len(), EXTERN_LOCAL_PREFIX_LEN);
                assert_eq!(full_len, EXTERN_LOCAL_PREFIX_LEN + 100);
            }
            _ => panic!("expected External"),
        }
    }
}

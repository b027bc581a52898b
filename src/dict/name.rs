//! Table name normalization (spec §4.10): every table name is stored and
//! looked up as `db/table`, exactly one '/', case rules applied up front
//! so a lookup never depends on the caller's capitalization.

use crate::common::{Error, Result};

/// Normalize a `(database, table)` pair into the canonical `db/table`
/// dictionary key.
///
/// Rejects names containing `/` themselves (exactly one separator is
/// inserted by this function), and the `.`/`..` path-escape prefixes the
/// original guards against when names map to filesystem paths.
pub fn normalize_table_name(db: &str, table: &str) -> Result<String> {
    for part in [db, table] {
        if part.is_empty() {
            return Err(Error::InvalidInput("empty name component".into()));
        }
        if part.contains('/') {
            return Err(Error::InvalidInput(format!("name component contains '/': {part}")));
        }
        if part == "." || part == ".." || part.starts_with("./") || part.starts_with("../") {
            return Err(Error::InvalidInput(format!("disallowed name component: {part}")));
        }
    }
    // Lowercase to match the case-insensitive filesystem behavior the
    // original normalizes toward on Windows, applied uniformly here so
    // lookups are portable regardless of host OS.
    Ok(format!("{}/{}", db.to_lowercase(), table.to_lowercase()))
}

/// Split a normalized `db/table` name back into its two parts.
pub fn split_table_name(name: &str) -> Result<(&str, &str)> {
    let mut parts = name.splitn(2, '/');
    let db = parts.next().filter(|s| !s.is_empty());
    let table = parts.next().filter(|s| !s.is_empty());
    match (db, table) {
        (Some(db), Some(table)) => Ok((db, table)),
        _ => Err(Error::InvalidInput(format!("not a normalized table name: {name}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_joins() {
        assert_eq!(normalize_table_name("Sales", "Orders").unwrap(), "sales/orders");
    }

    #[test]
    fn test_rejects_embedded_slash() {
        assert!(normalize_table_name("sales/x", "orders").is_err());
    }

    #[test]
    fn test_rejects_dotdot() {
        assert!(normalize_table_name("..", "orders").is_err());
    }

    #[test]
    fn test_split_roundtrip() {
        let full = normalize_table_name("db", "t").unwrap();
        assert_eq!(split_table_name(&full).unwrap(), ("db", "t"));
    }

    #[test]
    fn test_split_rejects_unnormalized() {
        assert!(split_table_name("no_slash_here").is_err());
    }
}

//! Quote table identity and schema bootstrap

mod bootstrap;

pub use bootstrap::{ensure_schema, RetentionPolicy};

use crate::error::{Result, StorageError};
use std::fmt;

/// Schema-qualified name of the quote hypertable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    schema: String,
    table: String,
}

impl TableRef {
    pub fn new(schema: &str, table: &str) -> Result<Self> {
        // Identifiers are interpolated into SQL, so only plain lowercase names pass
        for name in [schema, table] {
            if !is_valid_identifier(name) {
                return Err(StorageError::InvalidIdentifier {
                    name: name.to_string(),
                });
            }
        }

        Ok(Self {
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `"schema"."table"`, safe to splice into a statement
    pub fn qualified(&self) -> String {
        format!("\"{}\".\"{}\"", self.schema, self.table)
    }
}

impl Default for TableRef {
    fn default() -> Self {
        Self {
            schema: "quotes".to_string(),
            table: "real_time".to_string(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

fn is_valid_identifier(name: &str) -> bool {
    if name.is_empty() || name.len() > 63 {
        return false;
    }

    let Some(first_char) = name.chars().next() else {
        return false;
    };
    if !first_char.is_ascii_lowercase() && first_char != '_' {
        return false;
    }

    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifier() {
        assert!(is_valid_identifier("real_time"));
        assert!(is_valid_identifier("quotes"));
        assert!(is_valid_identifier("_staging_2"));

        assert!(!is_valid_identifier("")); // Empty
        assert!(!is_valid_identifier("real_time; DROP TABLE x")); // SQL injection attempt
        assert!(!is_valid_identifier("1_quotes")); // Starts with number
        assert!(!is_valid_identifier("RealTime")); // Contains uppercase
    }

    #[test]
    fn test_table_ref() {
        let table = TableRef::new("quotes", "real_time").unwrap();
        assert_eq!(table, TableRef::default());
        assert_eq!(table.qualified(), "\"quotes\".\"real_time\"");
        assert_eq!(table.to_string(), "quotes.real_time");

        assert!(TableRef::new("quotes", "Real\"Time").is_err());
    }
}

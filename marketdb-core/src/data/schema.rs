use polars::prelude::*;

/// Canonical column order for every stored or serialized bar table.
pub const COLUMNS: [&str; 7] = [
    "symbol",
    "timestamp",
    "open",
    "high",
    "low",
    "close",
    "volume",
];

/// Provider fields a bar table is built from.
pub const REQUIRED_FIELDS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Expected schema for bar data
pub struct BarSchema;

impl BarSchema {
    /// Get the canonical bar schema
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("symbol".into(), DataType::String),
            Field::new("timestamp".into(), DataType::Int64),
            Field::new("open".into(), DataType::Float64),
            Field::new("high".into(), DataType::Float64),
            Field::new("low".into(), DataType::Float64),
            Field::new("close".into(), DataType::Float64),
            Field::new("volume".into(), DataType::Int64),
        ])
    }

    /// Validate DataFrame against schema, including column order.
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let expected = Self::schema();
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        if names != COLUMNS {
            return Err(SchemaError::ColumnOrder(names));
        }

        Ok(())
    }

    /// DDL for a bar table. `table` must already be a validated identifier.
    pub fn create_table_sql(table: &str) -> String {
        format!(
            "CREATE TABLE \"{table}\" (\
             symbol TEXT NOT NULL, \
             timestamp INTEGER NOT NULL, \
             open REAL NOT NULL, \
             high REAL NOT NULL, \
             low REAL NOT NULL, \
             close REAL NOT NULL, \
             volume INTEGER NOT NULL)"
        )
    }

    /// Row insert for a bar table, placeholders in canonical order.
    pub fn insert_sql(table: &str) -> String {
        format!(
            "INSERT INTO \"{table}\" ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            COLUMNS.join(", ")
        )
    }

    /// True if `name` is a plain SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`.
    pub fn is_valid_table_name(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("Column order {0:?} does not match canonical order")]
    ColumnOrder(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical_frame() -> DataFrame {
        df!(
            "symbol" => &["AJG"],
            "timestamp" => &[1_704_153_600i64],
            "open" => &[224.1],
            "high" => &[226.5],
            "low" => &[222.8],
            "close" => &[225.9],
            "volume" => &[812_300i64],
        )
        .unwrap()
    }

    #[test]
    fn test_schema_matches_column_order() {
        let schema = BarSchema::schema();
        let names: Vec<String> = schema.iter_names().map(|n| n.to_string()).collect();
        assert_eq!(names, COLUMNS);
    }

    #[test]
    fn test_validate_accepts_canonical_frame() {
        assert!(BarSchema::validate(&canonical_frame()).is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_column() {
        let df = canonical_frame().drop("volume").unwrap();
        let result = BarSchema::validate(&df);
        assert!(matches!(result.unwrap_err(), SchemaError::MissingColumn(_)));
    }

    #[test]
    fn test_validate_rejects_wrong_type() {
        let df = df!(
            "symbol" => &["AJG"],
            "timestamp" => &[1_704_153_600i64],
            "open" => &[224.1],
            "high" => &[226.5],
            "low" => &[222.8],
            "close" => &[225.9],
            "volume" => &[812_300.0],
        )
        .unwrap();
        let result = BarSchema::validate(&df);
        assert!(matches!(result.unwrap_err(), SchemaError::TypeMismatch { .. }));
    }

    #[test]
    fn test_validate_rejects_reordered_columns() {
        let df = canonical_frame()
            .select(["timestamp", "symbol", "open", "high", "low", "close", "volume"])
            .unwrap();
        let result = BarSchema::validate(&df);
        assert!(matches!(result.unwrap_err(), SchemaError::ColumnOrder(_)));
    }

    #[test]
    fn test_table_name_validation() {
        assert!(BarSchema::is_valid_table_name("ohlcv"));
        assert!(BarSchema::is_valid_table_name("_daily_2024"));
        assert!(!BarSchema::is_valid_table_name(""));
        assert!(!BarSchema::is_valid_table_name("2024_bars"));
        assert!(!BarSchema::is_valid_table_name("ohlcv; DROP TABLE x"));
        assert!(!BarSchema::is_valid_table_name("o\"hlcv"));
    }

    #[test]
    fn test_insert_sql_lists_canonical_columns() {
        assert_eq!(
            BarSchema::insert_sql("ohlcv"),
            "INSERT INTO \"ohlcv\" (symbol, timestamp, open, high, low, close, volume) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        );
    }
}

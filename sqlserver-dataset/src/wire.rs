//! Wire type codes.
//!
//! Drivers report column types with the `java.sql.Types` numbering, plus the
//! SQL Server specific `DATETIMEOFFSET`. Native drivers map their own type
//! tags onto these codes so one conversion table serves all of them.

#![allow(missing_docs)]

pub const ARRAY: i32 = 2003;
pub const BIGINT: i32 = -5;
pub const BINARY: i32 = -2;
pub const BIT: i32 = -7;
pub const BLOB: i32 = 2004;
pub const BOOLEAN: i32 = 16;
pub const CHAR: i32 = 1;
pub const CLOB: i32 = 2005;
pub const DATE: i32 = 91;
pub const DECIMAL: i32 = 3;
pub const DOUBLE: i32 = 8;
pub const FLOAT: i32 = 6;
pub const INTEGER: i32 = 4;
pub const LONGNVARCHAR: i32 = -16;
pub const LONGVARBINARY: i32 = -4;
pub const LONGVARCHAR: i32 = -1;
pub const NCHAR: i32 = -15;
pub const NCLOB: i32 = 2011;
pub const NUMERIC: i32 = 2;
pub const NVARCHAR: i32 = -9;
pub const OTHER: i32 = 1111;
pub const REAL: i32 = 7;
pub const SMALLINT: i32 = 5;
pub const TIME: i32 = 92;
pub const TIMESTAMP: i32 = 93;
pub const TINYINT: i32 = -6;
pub const VARBINARY: i32 = -3;
pub const VARCHAR: i32 = 12;

/// SQL Server `datetimeoffset`.
pub const DATETIMEOFFSET: i32 = -155;

/// Name of a wire type code, for logs and error messages.
pub fn type_name(code: i32) -> &'static str {
    match code {
        ARRAY => "ARRAY",
        BIGINT => "BIGINT",
        BINARY => "BINARY",
        BIT => "BIT",
        BLOB => "BLOB",
        BOOLEAN => "BOOLEAN",
        CHAR => "CHAR",
        CLOB => "CLOB",
        DATE => "DATE",
        DECIMAL => "DECIMAL",
        DOUBLE => "DOUBLE",
        FLOAT => "FLOAT",
        INTEGER => "INTEGER",
        LONGNVARCHAR => "LONGNVARCHAR",
        LONGVARBINARY => "LONGVARBINARY",
        LONGVARCHAR => "LONGVARCHAR",
        NCHAR => "NCHAR",
        NCLOB => "NCLOB",
        NUMERIC => "NUMERIC",
        NVARCHAR => "NVARCHAR",
        OTHER => "OTHER",
        REAL => "REAL",
        SMALLINT => "SMALLINT",
        TIME => "TIME",
        TIMESTAMP => "TIMESTAMP",
        TINYINT => "TINYINT",
        VARBINARY => "VARBINARY",
        VARCHAR => "VARCHAR",
        DATETIMEOFFSET => "DATETIMEOFFSET",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_name() {
        assert_eq!(type_name(TIMESTAMP), "TIMESTAMP");
        assert_eq!(type_name(DATETIMEOFFSET), "DATETIMEOFFSET");
        assert_eq!(type_name(424242), "UNKNOWN");
    }
}

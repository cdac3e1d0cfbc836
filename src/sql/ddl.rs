//! DDL Generation for Document Tables
//!
//! Generates the statements that create document tables, their virtual
//! columns and indexes, and the append-only schema history table.

use crate::error::Result;
use crate::sql::DATA_COLUMN;
use crate::sql::dialect::Dialect;
use crate::sql::sanitize::json_path_segments;
use crate::types::{ColumnDescriptor, Schema};

/// DDL Generator for document tables
pub struct DdlGenerator<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> DdlGenerator<'a> {
    /// Create a new DDL generator for the given dialect
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    fn quote(&self, identifier: &str) -> String {
        self.dialect.quote_identifier(identifier)
    }

    /// Generate CREATE TABLE with the data column followed by one virtual
    /// column per schema entry
    pub fn generate_create_table(&self, table_name: &str, schema: &Schema) -> Result<String> {
        let mut column_defs = vec![format!(
            "{} {} DEFAULT NULL",
            self.quote(DATA_COLUMN),
            self.dialect.data_column_type()
        )];
        for (path, column) in schema.iter() {
            column_defs.push(self.format_column_definition(path, column)?);
        }

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({}){}",
            self.quote(table_name),
            column_defs.join(", "),
            self.dialect.table_options()
        ))
    }

    /// Generate ALTER TABLE ADD COLUMN for one virtual column
    pub fn generate_add_column(
        &self,
        table_name: &str,
        path: &str,
        column: &ColumnDescriptor,
    ) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote(table_name),
            self.format_column_definition(path, column)?
        ))
    }

    /// Generate ALTER TABLE DROP COLUMN
    pub fn generate_drop_column(&self, table_name: &str, column: &ColumnDescriptor) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote(table_name),
            self.quote(&column.name)
        )
    }

    /// Generate the index statement for a column, if it needs one
    pub fn generate_create_index(
        &self,
        table_name: &str,
        column: &ColumnDescriptor,
    ) -> Option<String> {
        self.dialect.create_index(table_name, column)
    }

    pub fn generate_drop_index(&self, table_name: &str, column: &ColumnDescriptor) -> String {
        self.dialect.drop_index(table_name, column)
    }

    /// Statements removing a column, dropping its index first when it has one
    pub fn generate_remove_column(
        &self,
        table_name: &str,
        column: &ColumnDescriptor,
    ) -> Vec<String> {
        let mut statements = Vec::with_capacity(2);
        if self.dialect.create_index(table_name, column).is_some() {
            statements.push(self.generate_drop_index(table_name, column));
        }
        statements.push(self.generate_drop_column(table_name, column));
        statements
    }

    /// Generate DROP TABLE statement
    pub fn generate_drop_table(&self, table_name: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote(table_name))
    }

    pub fn generate_rename_table(&self, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote(from),
            self.quote(to)
        )
    }

    /// Generate the statement that copies every document from `source` into
    /// `target`, filling shadow columns from the document
    pub fn generate_copy_documents(
        &self,
        source: &str,
        target: &str,
        schema: &Schema,
    ) -> Result<String> {
        let mut columns = vec![self.quote(DATA_COLUMN)];
        let mut values = vec![self.quote(DATA_COLUMN)];
        for (path, column) in schema.iter() {
            let segments = json_path_segments(path)?;
            columns.push(self.quote(&column.name));
            values.push(self.dialect.json_extract(&segments));
        }
        Ok(format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            self.quote(target),
            columns.join(", "),
            values.join(", "),
            self.quote(source)
        ))
    }

    /// Generate CREATE TABLE for the schema history table
    pub fn generate_create_schema_table(&self, table_name: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             schema_table VARCHAR(100) NOT NULL, \
             schema_version BIGINT NOT NULL, \
             schema_time BIGINT NOT NULL, \
             schema_schema TEXT NOT NULL, \
             PRIMARY KEY (schema_table, schema_version))",
            self.quote(table_name)
        )
    }

    /// Format a single virtual column for CREATE TABLE or ADD COLUMN
    pub fn format_column_definition(&self, path: &str, column: &ColumnDescriptor) -> Result<String> {
        let segments = json_path_segments(path)?;
        Ok(self.dialect.column_definition(&segments, column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::sql::dialect::{MySqlDialect, PostgresDialect, SqliteDialect};

    fn test_schema() -> Schema {
        Schema::core().with_column(
            "test.a",
            ColumnDescriptor::new("test_a", "VARCHAR(100)").btree(),
        )
    }

    // ==================== CREATE TABLE Tests ====================

    #[test]
    fn test_generate_create_table_postgres() {
        let dialect = PostgresDialect;
        let generator = DdlGenerator::new(&dialect);

        let ddl = generator
            .generate_create_table("documents", &test_schema())
            .unwrap();

        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"documents\" ("));
        assert!(ddl.contains("\"json_data\" JSONB DEFAULT NULL"));
        assert!(ddl.contains("\"dso_id\" VARCHAR(16) GENERATED ALWAYS AS"));
        assert!(ddl.contains("\"test_a\" VARCHAR(100) GENERATED ALWAYS AS"));
        assert!(ddl.contains("'{test,a}'"));
    }

    #[test]
    fn test_generate_create_table_mysql() {
        let dialect = MySqlDialect;
        let generator = DdlGenerator::new(&dialect);

        let ddl = generator
            .generate_create_table("documents", &Schema::core())
            .unwrap();

        assert!(ddl.contains("`json_data` JSON DEFAULT NULL"));
        assert!(ddl.contains("`dso_deleted` BIGINT GENERATED ALWAYS AS"));
        assert!(ddl.ends_with("ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"));
    }

    #[test]
    fn test_generate_create_table_sqlite() {
        let dialect = SqliteDialect;
        let generator = DdlGenerator::new(&dialect);

        let ddl = generator
            .generate_create_table("documents", &Schema::core())
            .unwrap();

        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS \"documents\" (\"json_data\" TEXT DEFAULT NULL, \
             \"dso_deleted\" BIGINT, \"dso_id\" VARCHAR(16) PRIMARY KEY, \"dso_type\" VARCHAR(30))"
        );
    }

    #[test]
    fn test_generate_create_table_empty_schema() {
        let dialect = SqliteDialect;
        let generator = DdlGenerator::new(&dialect);

        let ddl = generator
            .generate_create_table("bare", &Schema::new())
            .unwrap();

        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS \"bare\" (\"json_data\" TEXT DEFAULT NULL)"
        );
    }

    #[test]
    fn test_generate_create_table_rejects_unsafe_path() {
        let dialect = PostgresDialect;
        let generator = DdlGenerator::new(&dialect);
        let schema = Schema::new().with_column("a.b'", ColumnDescriptor::new("a_b", "TEXT"));

        let result = generator.generate_create_table("documents", &schema);

        assert!(matches!(result, Err(StoreError::InvalidPath(_))));
    }

    // ==================== ALTER TABLE Tests ====================

    #[test]
    fn test_generate_add_column() {
        let dialect = PostgresDialect;
        let generator = DdlGenerator::new(&dialect);
        let column = ColumnDescriptor::new("test_c", "VARCHAR(100)");

        let ddl = generator
            .generate_add_column("documents", "test.c", &column)
            .unwrap();

        assert!(ddl.starts_with("ALTER TABLE \"documents\" ADD COLUMN \"test_c\" VARCHAR(100)"));
        assert!(ddl.contains("'{test,c}'"));
    }

    #[test]
    fn test_generate_drop_column() {
        let dialect = MySqlDialect;
        let generator = DdlGenerator::new(&dialect);
        let column = ColumnDescriptor::new("test_b", "VARCHAR(100)");

        assert_eq!(
            generator.generate_drop_column("documents", &column),
            "ALTER TABLE `documents` DROP COLUMN `test_b`"
        );
    }

    #[test]
    fn test_generate_remove_indexed_column_drops_index_first() {
        let dialect = PostgresDialect;
        let generator = DdlGenerator::new(&dialect);
        let column = ColumnDescriptor::new("test_a", "VARCHAR(100)").btree();

        assert_eq!(
            generator.generate_remove_column("docs", &column),
            vec![
                "DROP INDEX IF EXISTS \"docs_test_a_idx\"".to_string(),
                "ALTER TABLE \"docs\" DROP COLUMN \"test_a\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_generate_remove_unindexed_column() {
        let dialect = MySqlDialect;
        let generator = DdlGenerator::new(&dialect);
        let column = ColumnDescriptor::new("test_b", "VARCHAR(100)");

        assert_eq!(
            generator.generate_remove_column("docs", &column),
            vec!["ALTER TABLE `docs` DROP COLUMN `test_b`".to_string()]
        );

        let unique = column.unique();
        assert_eq!(
            generator.generate_remove_column("docs", &unique),
            vec![
                "DROP INDEX `docs_test_b_idx` ON `docs`".to_string(),
                "ALTER TABLE `docs` DROP COLUMN `test_b`".to_string(),
            ]
        );
    }

    // ==================== Rebuild Tests ====================

    #[test]
    fn test_generate_copy_documents() {
        let dialect = SqliteDialect;
        let generator = DdlGenerator::new(&dialect);
        let schema = Schema::new().with_column(
            "test.a",
            ColumnDescriptor::new("test_a", "VARCHAR(100)"),
        );

        let sql = generator
            .generate_copy_documents("documents", "documents_rebuild", &schema)
            .unwrap();

        assert_eq!(
            sql,
            "INSERT INTO \"documents_rebuild\" (\"json_data\", \"test_a\") \
             SELECT \"json_data\", json_extract(\"json_data\", '$.\"test\".\"a\"') FROM \"documents\""
        );
    }

    #[test]
    fn test_generate_drop_and_rename_table() {
        let dialect = SqliteDialect;
        let generator = DdlGenerator::new(&dialect);

        assert_eq!(
            generator.generate_drop_table("documents"),
            "DROP TABLE IF EXISTS \"documents\""
        );
        assert_eq!(
            generator.generate_rename_table("tmp", "documents"),
            "ALTER TABLE \"tmp\" RENAME TO \"documents\""
        );
    }

    // ==================== Schema Table Tests ====================

    #[test]
    fn test_generate_create_schema_table() {
        let dialect = PostgresDialect;
        let generator = DdlGenerator::new(&dialect);

        let ddl = generator.generate_create_schema_table("document_schema");

        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"document_schema\""));
        assert!(ddl.contains("schema_version BIGINT NOT NULL"));
        assert!(ddl.contains("PRIMARY KEY (schema_table, schema_version)"));
    }
}

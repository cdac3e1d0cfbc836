//! Statement generation for document reads and writes

use crate::error::Result;
use crate::search::Search;
use crate::sql::DATA_COLUMN;
use crate::sql::dialect::Dialect;
use crate::sql::expand::expand_paths;
use crate::sql::sanitize::json_path_segments;

/// Generates SELECT/INSERT/UPDATE/DELETE text for a dialect
///
/// Placeholders for written values are numbered from 1 in the order the
/// columns are given; statements built from a [`Search`] keep their `:name`
/// parameters for [`bind_named`](crate::sql::expand::bind_named).
pub struct DmlGenerator<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> DmlGenerator<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    fn quote(&self, identifier: &str) -> String {
        self.dialect.quote_identifier(identifier)
    }

    /// Rewrite any `${path}` still present in a fragment into a JSON
    /// extraction expression
    pub fn expand_fragment(&self, fragment: &str) -> Result<String> {
        expand_paths(fragment, |path| {
            let segments = json_path_segments(path)?;
            Ok(Some(self.dialect.json_extract(&segments)))
        })
    }

    /// Expression for a path (used as a row key when no column is declared)
    pub fn path_expression(&self, path: &str) -> Result<String> {
        let segments = json_path_segments(path)?;
        Ok(self.dialect.json_extract(&segments))
    }

    fn clauses(&self, search: &Search, with_order: bool) -> Result<String> {
        let mut sql = String::new();
        if let Some(fragment) = search.where_clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.expand_fragment(fragment)?);
        }
        if !with_order {
            return Ok(sql);
        }
        if let Some(fragment) = search.order() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.expand_fragment(fragment)?);
        }
        if let Some(limit) = self.dialect.limit_clause(search.limit(), search.offset()) {
            sql.push(' ');
            sql.push_str(&limit);
        }
        Ok(sql)
    }

    /// SELECT returning the document text as the single column
    pub fn generate_select(&self, table: &str, search: &Search) -> Result<String> {
        Ok(format!(
            "SELECT {} AS {} FROM {}{}",
            self.dialect.data_select(),
            self.quote(DATA_COLUMN),
            self.quote(table),
            self.clauses(search, true)?
        ))
    }

    /// COUNT over the WHERE fragment; order, limit and offset do not apply
    pub fn generate_count(&self, table: &str, search: &Search) -> Result<String> {
        Ok(format!(
            "SELECT COUNT(*) AS {} FROM {}{}",
            self.quote("row_count"),
            self.quote(table),
            self.clauses(search, false)?
        ))
    }

    /// INSERT of the document plus the given shadow columns
    pub fn generate_insert(&self, table: &str, shadow_columns: &[&str]) -> String {
        let mut columns = vec![self.quote(DATA_COLUMN)];
        let mut values = vec![self.dialect.data_param(&self.dialect.placeholder(1))];
        for (i, column) in shadow_columns.iter().enumerate() {
            columns.push(self.quote(column));
            values.push(self.dialect.placeholder(i + 2));
        }
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote(table),
            columns.join(", "),
            values.join(", ")
        )
    }

    /// UPDATE of the document plus the given shadow columns, keyed by
    /// `key_expression`, whose value is bound last
    pub fn generate_update(
        &self,
        table: &str,
        shadow_columns: &[&str],
        key_expression: &str,
    ) -> String {
        let mut assignments = vec![format!(
            "{} = {}",
            self.quote(DATA_COLUMN),
            self.dialect.data_param(&self.dialect.placeholder(1))
        )];
        for (i, column) in shadow_columns.iter().enumerate() {
            assignments.push(format!(
                "{} = {}",
                self.quote(column),
                self.dialect.placeholder(i + 2)
            ));
        }
        format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.quote(table),
            assignments.join(", "),
            key_expression,
            self.dialect.placeholder(shadow_columns.len() + 2)
        )
    }

    pub fn generate_delete(&self, table: &str, key_expression: &str) -> String {
        format!(
            "DELETE FROM {} WHERE {} = {}",
            self.quote(table),
            key_expression,
            self.dialect.placeholder(1)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::sql::dialect::{MySqlDialect, PostgresDialect, SqliteDialect};

    // ==================== SELECT Tests ====================

    #[test]
    fn test_generate_select_plain() {
        let dialect = SqliteDialect;
        let generator = DmlGenerator::new(&dialect);

        let sql = generator.generate_select("docs", &Search::new()).unwrap();

        assert_eq!(sql, "SELECT \"json_data\" AS \"json_data\" FROM \"docs\"");
    }

    #[test]
    fn test_generate_select_full() {
        let dialect = PostgresDialect;
        let generator = DmlGenerator::new(&dialect);
        let search = Search::new()
            .with_where("\"dso_type\" = :type AND ${test.a} > 1")
            .with_order("${test.b} DESC")
            .with_limit(5)
            .with_offset(10);

        let sql = generator.generate_select("docs", &search).unwrap();

        assert_eq!(
            sql,
            "SELECT CAST(\"json_data\" AS TEXT) AS \"json_data\" FROM \"docs\" \
             WHERE \"dso_type\" = :type AND (\"json_data\" #>> '{test,a}') > 1 \
             ORDER BY (\"json_data\" #>> '{test,b}') DESC LIMIT 5 OFFSET 10"
        );
    }

    #[test]
    fn test_generate_select_rejects_unsafe_path() {
        let dialect = MySqlDialect;
        let generator = DmlGenerator::new(&dialect);
        let search = Search::new().with_where("${a') OR 1=1 --} = 1");

        let result = generator.generate_select("docs", &search);

        assert!(matches!(result, Err(StoreError::InvalidPath(_))));
    }

    #[test]
    fn test_generate_count_ignores_paging() {
        let dialect = SqliteDialect;
        let generator = DmlGenerator::new(&dialect);
        let search = Search::new()
            .with_where("\"dso_deleted\" IS NULL")
            .with_order("\"dso_id\"")
            .with_limit(1);

        let sql = generator.generate_count("docs", &search).unwrap();

        assert_eq!(
            sql,
            "SELECT COUNT(*) AS \"row_count\" FROM \"docs\" WHERE \"dso_deleted\" IS NULL"
        );
    }

    // ==================== Write Tests ====================

    #[test]
    fn test_generate_insert_postgres() {
        let dialect = PostgresDialect;
        let generator = DmlGenerator::new(&dialect);

        assert_eq!(
            generator.generate_insert("docs", &[]),
            "INSERT INTO \"docs\" (\"json_data\") VALUES (CAST($1 AS JSONB))"
        );
    }

    #[test]
    fn test_generate_insert_shadow_columns() {
        let dialect = SqliteDialect;
        let generator = DmlGenerator::new(&dialect);

        assert_eq!(
            generator.generate_insert("docs", &["dso_id", "dso_type"]),
            "INSERT INTO \"docs\" (\"json_data\", \"dso_id\", \"dso_type\") VALUES (?, ?, ?)"
        );
    }

    #[test]
    fn test_generate_update_binds_key_last() {
        let dialect = PostgresDialect;
        let generator = DmlGenerator::new(&dialect);

        assert_eq!(
            generator.generate_update("docs", &[], "\"dso_id\""),
            "UPDATE \"docs\" SET \"json_data\" = CAST($1 AS JSONB) WHERE \"dso_id\" = $2"
        );

        let dialect = SqliteDialect;
        let generator = DmlGenerator::new(&dialect);
        assert_eq!(
            generator.generate_update("docs", &["dso_id"], "\"dso_id\""),
            "UPDATE \"docs\" SET \"json_data\" = ?, \"dso_id\" = ? WHERE \"dso_id\" = ?"
        );
    }

    #[test]
    fn test_generate_delete() {
        let dialect = MySqlDialect;
        let generator = DmlGenerator::new(&dialect);
        let key = generator.path_expression("dso.id").unwrap();

        assert_eq!(
            generator.generate_delete("docs", &key),
            "DELETE FROM `docs` WHERE JSON_UNQUOTE(JSON_EXTRACT(`json_data`, '$.\"dso\".\"id\"')) = ?"
        );
    }
}

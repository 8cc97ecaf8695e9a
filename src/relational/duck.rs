use crate::db::db_pool::{DuckDBConnectionManager, DuckPool};
use crate::llm::{GenerationRequest, LlmManager};
use crate::prompts::sql_prompt;
use crate::relational::sql::{ensure_read_only, extract_sql};
use crate::relational::{RelationalError, RelationalSource};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound on rows handed back to the answer prompt.
const MAX_ROWS: usize = 200;
const SAMPLE_ROWS: usize = 3;

/// Answers questions with model-written SQL over a read-only DuckDB file.
pub struct DuckRelationalSource {
    pool: DuckPool,
    llm: Arc<LlmManager>,
}

impl DuckRelationalSource {
    pub fn open(path: &str, llm: Arc<LlmManager>) -> Result<Self, RelationalError> {
        let pool = DuckDBConnectionManager::read_only(path.to_string())
            .map_err(execution)?
            .into_pool(2)
            .map_err(execution)?;
        info!("Relational source opened read-only at {}", path);
        Ok(Self { pool, llm })
    }

    /// Markdown description of every table, with a few sample rows.
    pub async fn describe_schema(&self) -> Result<String, RelationalError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<String, RelationalError> {
            let conn = pool.get().map_err(execution)?;
            let mut metadata = String::from("# DATABASE SCHEMA\n\n");

            let mut stmt = conn
                .prepare(
                    "SELECT table_name, column_name, data_type, is_nullable
                     FROM information_schema.columns
                     WHERE table_schema = 'main'
                     ORDER BY table_name, ordinal_position",
                )
                .map_err(execution)?;
            let columns: Vec<(String, String, String, String)> = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
                .map_err(execution)?
                .filter_map(Result::ok)
                .collect();

            if columns.is_empty() {
                metadata.push_str("No tables found in this database.\n");
                return Ok(metadata);
            }

            let mut current: Option<&str> = None;
            for (table, column, data_type, nullable) in &columns {
                if current != Some(table.as_str()) {
                    if let Some(previous) = current {
                        append_samples(&conn, previous, &mut metadata);
                    }
                    metadata.push_str(&format!("### Table: {}\n\n", table));
                    metadata.push_str("| Column Name | Data Type | Nullable |\n");
                    metadata.push_str("|------------|-----------|----------|\n");
                    current = Some(table.as_str());
                }
                metadata.push_str(&format!("| {} | {} | {} |\n", column, data_type, nullable));
            }
            if let Some(last) = current {
                append_samples(&conn, last, &mut metadata);
            }

            Ok(metadata)
        })
        .await
        .map_err(execution)?
    }
}

fn execution(e: impl std::fmt::Display) -> RelationalError {
    RelationalError::Execution(e.to_string())
}

fn append_samples(conn: &duckdb::Connection, table: &str, metadata: &mut String) {
    let sql = format!("SELECT * FROM \"{}\" LIMIT {}", table.replace('"', "\"\""), SAMPLE_ROWS);
    match query_json(conn, &sql) {
        Ok(rows) => metadata.push_str(&format!("\n#### Sample Data:\n\n{}\n\n", rows)),
        Err(e) => {
            warn!("Could not sample table {}: {}", table, e);
            metadata.push('\n');
        }
    }
}

fn query_json(conn: &duckdb::Connection, sql: &str) -> Result<Value, RelationalError> {
    let mut stmt = conn.prepare(sql).map_err(execution)?;
    let batches: Vec<RecordBatch> = stmt.query_arrow([]).map_err(execution)?.collect();
    batches_to_json(&batches)
}

/// Record batches as a JSON array of row objects.
fn batches_to_json(batches: &[RecordBatch]) -> Result<Value, RelationalError> {
    let mut writer = arrow::json::ArrayWriter::new(Vec::new());
    let refs: Vec<&RecordBatch> = batches.iter().collect();
    writer.write_batches(&refs).map_err(execution)?;
    writer.finish().map_err(execution)?;

    let buffer = writer.into_inner();
    if buffer.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }
    serde_json::from_slice(&buffer).map_err(execution)
}

#[async_trait]
impl RelationalSource for DuckRelationalSource {
    async fn generate_query(&self, question: &str) -> Result<String, RelationalError> {
        let schema = self.describe_schema().await?;
        let answer = self
            .llm
            .generate_text(GenerationRequest::prompt(sql_prompt(question, &schema)))
            .await?;

        let sql = ensure_read_only(&extract_sql(&answer)).map_err(RelationalError::Rejected)?;
        info!("Generated SQL: {}", sql);
        Ok(sql)
    }

    async fn run_query(&self, sql: &str) -> Result<Value, RelationalError> {
        let statement = ensure_read_only(sql).map_err(RelationalError::Rejected)?;
        let bounded = format!("SELECT * FROM ({}) AS generated LIMIT {}", statement, MAX_ROWS);
        let pool = self.pool.clone();

        let rows = tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(execution)?;
            query_json(&conn, &bounded)
        })
        .await
        .map_err(execution)??;

        debug!(
            "Relational query returned {} row(s)",
            rows.as_array().map(Vec::len).unwrap_or(0)
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;
    use serde_json::json;

    fn seeded_db(dir: &tempfile::TempDir) -> String {
        let path = dir.path().join("logs.duckdb").to_string_lossy().to_string();
        let conn = duckdb::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE logs (service VARCHAR, level VARCHAR);
             INSERT INTO logs VALUES ('api', 'error'), ('api', 'info'), ('worker', 'error');",
        )
        .unwrap();
        path
    }

    fn source(path: &str, answer: &str) -> DuckRelationalSource {
        let llm = LlmManager::with_provider(Box::new(ScriptedModel::new().with_completion(answer)), "m");
        DuckRelationalSource::open(path, Arc::new(llm)).unwrap()
    }

    #[tokio::test]
    async fn test_run_query_returns_rows_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = seeded_db(&dir);
        let source = source(&path, "unused");

        let rows = source
            .run_query("SELECT level, count(*) AS n FROM logs GROUP BY level ORDER BY level;")
            .await
            .unwrap();
        assert_eq!(rows, json!([{"level": "error", "n": 2}, {"level": "info", "n": 1}]));
    }

    #[tokio::test]
    async fn test_generate_query_extracts_and_guards() {
        let dir = tempfile::tempdir().unwrap();
        let path = seeded_db(&dir);

        let ok = source(&path, "SELECT service FROM logs WHERE level = 'error';\n```");
        assert_eq!(
            ok.generate_query("which services failed?").await.unwrap(),
            "SELECT service FROM logs WHERE level = 'error'"
        );

        let bad = source(&path, "DROP TABLE logs;");
        assert!(matches!(
            bad.generate_query("clean up").await,
            Err(RelationalError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_schema_description_lists_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = seeded_db(&dir);
        let schema = source(&path, "unused").describe_schema().await.unwrap();

        assert!(schema.contains("### Table: logs"));
        assert!(schema.contains("| level | VARCHAR |"));
        assert!(schema.contains("Sample Data"));
    }

    #[tokio::test]
    async fn test_empty_result_is_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = seeded_db(&dir);
        let rows = source(&path, "unused")
            .run_query("SELECT * FROM logs WHERE level = 'fatal'")
            .await
            .unwrap();
        assert_eq!(rows, json!([]));
    }
}

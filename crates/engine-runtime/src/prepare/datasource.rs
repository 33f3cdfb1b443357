use crate::{
    error::PrepareError,
    prepare::dialect::{DialectPrepareOption, prepare_option},
};
use async_trait::async_trait;
use model::job::{DataSourceConfiguration, JobConfiguration, QualifiedTable, TableMapping};
use std::{collections::HashSet, sync::Arc};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
#[error("{message}")]
pub struct SqlError {
    pub message: String,
}

impl SqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, data_source: &DataSourceConfiguration, sql: &str)
    -> Result<(), SqlError>;
}

/// Produces the `CREATE TABLE` statement of an existing source table.
#[async_trait]
pub trait DdlGenerator: Send + Sync {
    async fn generate(
        &self,
        data_source: &DataSourceConfiguration,
        table: &QualifiedTable,
    ) -> Result<String, SqlError>;
}

pub struct PrepareTargetSchemasParams<'a> {
    pub target: &'a DataSourceConfiguration,
    pub mappings: &'a [TableMapping],
}

pub struct PrepareTargetTablesParams<'a> {
    pub job_config: &'a JobConfiguration,
    pub mappings: &'a [TableMapping],
}

/// Bootstraps target schemas and tables before the inventory copy.
/// Safe to run again when a job resumes.
pub struct DataSourcePreparer {
    executor: Arc<dyn SqlExecutor>,
    ddl: Arc<dyn DdlGenerator>,
}

impl DataSourcePreparer {
    pub fn new(executor: Arc<dyn SqlExecutor>, ddl: Arc<dyn DdlGenerator>) -> Self {
        Self { executor, ddl }
    }

    pub async fn prepare_target_schemas(
        &self,
        params: PrepareTargetSchemasParams<'_>,
    ) -> Result<(), PrepareError> {
        let option = prepare_option(params.target.database_type);
        let mut created: HashSet<String> = HashSet::new();

        for mapping in params.mappings {
            let Some(schema) = mapping.target.schema.as_deref() else {
                continue;
            };
            if option.default_schema == Some(schema) || created.contains(schema) {
                continue;
            }
            if !option.supports_schema {
                info!(
                    database_type = %params.target.database_type,
                    "Target does not support schemas, skipping schema creation"
                );
                return Ok(());
            }

            let sql = format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                option.quote_identifier(schema)
            );
            self.executor.execute(params.target, &sql).await?;
            created.insert(schema.to_string());
        }
        Ok(())
    }

    pub async fn prepare_target_tables(
        &self,
        params: PrepareTargetTablesParams<'_>,
    ) -> Result<(), PrepareError> {
        let target = &params.job_config.target;
        let option = prepare_option(target.database_type);

        for mapping in params.mappings {
            let source = params
                .job_config
                .source(&mapping.source_data_source)
                .ok_or_else(|| PrepareError::MissingDataSource(mapping.source_data_source.clone()))?;

            let ddl = self
                .ddl
                .generate(source, &mapping.source)
                .await
                .map_err(|e| PrepareError::Ddl {
                    table: mapping.source.to_string(),
                    message: e.message,
                })?;
            let sql = decorate_ddl(&ddl, &mapping.target, option);

            match self.executor.execute(target, &sql).await {
                Ok(()) => {}
                Err(e) if option.is_ignorable(&e.message) => {
                    warn!(table = %mapping.target, error = %e, "Ignoring target table error");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Rewrites a source `CREATE TABLE` statement for the target: the table
/// name becomes `target` and the statement gains `IF NOT EXISTS`.
/// Anything that is not a `CREATE TABLE` statement is returned unchanged.
pub fn decorate_ddl(ddl: &str, target: &QualifiedTable, option: &DialectPrepareOption) -> String {
    const CREATE_TABLE: &str = "CREATE TABLE";
    const IF_NOT_EXISTS: &str = "IF NOT EXISTS";

    let ddl = ddl.trim();
    if !starts_with_ignore_case(ddl, CREATE_TABLE) {
        return ddl.to_string();
    }

    let mut rest = ddl[CREATE_TABLE.len()..].trim_start();
    if starts_with_ignore_case(rest, IF_NOT_EXISTS) {
        rest = rest[IF_NOT_EXISTS.len()..].trim_start();
    }

    let name_end = table_name_end(rest);
    let body = rest[name_end..].trim_start();

    let target_name = match target.schema.as_deref().filter(|_| option.supports_schema) {
        Some(schema) => format!(
            "{}.{}",
            option.quote_identifier(schema),
            option.quote_identifier(&target.table)
        ),
        None => option.quote_identifier(&target.table),
    };

    format!("{CREATE_TABLE} {IF_NOT_EXISTS} {target_name} {body}")
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Byte offset just past a possibly quoted and qualified table name.
/// Source and target may quote differently, so both styles are accepted.
fn table_name_end(s: &str) -> usize {
    let mut open_quote: Option<char> = None;
    for (idx, ch) in s.char_indices() {
        match open_quote {
            Some(quote) if ch == quote => open_quote = None,
            Some(_) => {}
            None if ch == '`' || ch == '"' => open_quote = Some(ch),
            None if ch.is_whitespace() || ch == '(' => return idx,
            None => {}
        }
    }
    s.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::job::{DataNodeLine, DatabaseType};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingExecutor {
        statements: Mutex<Vec<String>>,
        fail_with: Option<&'static str>,
    }

    #[async_trait]
    impl SqlExecutor for RecordingExecutor {
        async fn execute(&self, _: &DataSourceConfiguration, sql: &str) -> Result<(), SqlError> {
            self.statements.lock().unwrap().push(sql.to_string());
            match self.fail_with {
                Some(message) => Err(SqlError::new(message)),
                None => Ok(()),
            }
        }
    }

    struct FixedDdl;

    #[async_trait]
    impl DdlGenerator for FixedDdl {
        async fn generate(
            &self,
            _: &DataSourceConfiguration,
            table: &QualifiedTable,
        ) -> Result<String, SqlError> {
            Ok(format!(
                "CREATE TABLE {} (order_id INT PRIMARY KEY, user_id INT)",
                table.table
            ))
        }
    }

    fn data_source(name: &str, database_type: DatabaseType) -> DataSourceConfiguration {
        DataSourceConfiguration {
            name: name.into(),
            database_type,
            url: format!("{name}://localhost"),
        }
    }

    fn mapping(schema: Option<&str>, table: &str) -> TableMapping {
        TableMapping {
            logic_table: table.into(),
            source_data_source: "ds_0".into(),
            source: QualifiedTable::new(None, table),
            target: QualifiedTable::new(schema, table),
        }
    }

    fn job_config(target: DatabaseType, mappings: Vec<TableMapping>) -> JobConfiguration {
        JobConfiguration {
            job_id: "j".into(),
            sharding_count: 1,
            data_node_lines: vec![DataNodeLine { mappings }],
            sources: vec![data_source("ds_0", DatabaseType::MySql)],
            target: data_source("target", target),
            disabled: false,
        }
    }

    #[test]
    fn decorates_plain_and_quoted_ddl() {
        let pg = prepare_option(DatabaseType::PostgreSql);
        let target = QualifiedTable::new(Some("sales"), "t_order");

        assert_eq!(
            decorate_ddl("CREATE TABLE t_order_0 (id INT)", &target, pg),
            r#"CREATE TABLE IF NOT EXISTS "sales"."t_order" (id INT)"#
        );
        assert_eq!(
            decorate_ddl(
                "create table if not exists `db`.`t order`(id INT)",
                &QualifiedTable::new(None, "t_order"),
                prepare_option(DatabaseType::MySql)
            ),
            "CREATE TABLE IF NOT EXISTS `t_order` (id INT)"
        );
        assert_eq!(decorate_ddl("ALTER TABLE t ADD c INT", &target, pg), "ALTER TABLE t ADD c INT");
    }

    #[tokio::test]
    async fn creates_each_non_default_schema_once() {
        let executor = Arc::new(RecordingExecutor::default());
        let preparer = DataSourcePreparer::new(executor.clone(), Arc::new(FixedDdl));
        let mappings = vec![
            mapping(None, "t_a"),
            mapping(Some("public"), "t_b"),
            mapping(Some("sales"), "t_c"),
            mapping(Some("sales"), "t_d"),
        ];

        preparer
            .prepare_target_schemas(PrepareTargetSchemasParams {
                target: &data_source("target", DatabaseType::PostgreSql),
                mappings: &mappings,
            })
            .await
            .unwrap();

        assert_eq!(
            *executor.statements.lock().unwrap(),
            vec![r#"CREATE SCHEMA IF NOT EXISTS "sales""#.to_string()]
        );
    }

    #[tokio::test]
    async fn schema_creation_is_skipped_without_schema_support() {
        let executor = Arc::new(RecordingExecutor::default());
        let preparer = DataSourcePreparer::new(executor.clone(), Arc::new(FixedDdl));

        preparer
            .prepare_target_schemas(PrepareTargetSchemasParams {
                target: &data_source("target", DatabaseType::MySql),
                mappings: &[mapping(Some("sales"), "t_c")],
            })
            .await
            .unwrap();
        assert!(executor.statements.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tolerates_ignorable_table_errors() {
        let executor = Arc::new(RecordingExecutor {
            fail_with: Some("ERROR: multiple primary keys for table \"t_order\" are not allowed"),
            ..Default::default()
        });
        let preparer = DataSourcePreparer::new(executor.clone(), Arc::new(FixedDdl));
        let config = job_config(DatabaseType::PostgreSql, vec![mapping(None, "t_order")]);

        preparer
            .prepare_target_tables(PrepareTargetTablesParams {
                job_config: &config,
                mappings: &config.data_node_lines[0].mappings,
            })
            .await
            .unwrap();
        assert_eq!(executor.statements.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn propagates_other_table_errors() {
        let executor = Arc::new(RecordingExecutor {
            fail_with: Some("permission denied"),
            ..Default::default()
        });
        let preparer = DataSourcePreparer::new(executor, Arc::new(FixedDdl));
        let config = job_config(DatabaseType::PostgreSql, vec![mapping(None, "t_order")]);

        let err = preparer
            .prepare_target_tables(PrepareTargetTablesParams {
                job_config: &config,
                mappings: &config.data_node_lines[0].mappings,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PrepareError::Sql(_)));
    }
}

use crate::{
    context::JobItemContext,
    error::{BoxError, PrepareError},
    prepare::{
        JobPreparer, TaskFactory,
        datasource::{DataSourcePreparer, PrepareTargetSchemasParams, PrepareTargetTablesParams},
    },
    task::{Dumper, Importer, PipelineTask, TransmissionTask},
};
use async_trait::async_trait;
use model::{
    job::{DataSourceConfiguration, JobStatus, TableMapping},
    position::{IngestPosition, TaskKind},
};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, info};

/// Opens the readers and writers tasks are made of.
pub trait TransmissionConnector: Send + Sync {
    fn inventory_dumper(
        &self,
        source: &DataSourceConfiguration,
        mapping: &TableMapping,
    ) -> Result<Arc<dyn Dumper>, BoxError>;

    /// Change stream of every `mappings` table on `source`.
    fn incremental_dumper(
        &self,
        source: &DataSourceConfiguration,
        mappings: &[TableMapping],
    ) -> Result<Arc<dyn Dumper>, BoxError>;

    fn importer(&self, target: &DataSourceConfiguration) -> Result<Arc<dyn Importer>, BoxError>;
}

/// One inventory task per table mapping and one incremental task per
/// source data source of the item.
pub struct TransmissionTaskFactory {
    connector: Arc<dyn TransmissionConnector>,
}

impl TransmissionTaskFactory {
    pub fn new(connector: Arc<dyn TransmissionConnector>) -> Self {
        Self { connector }
    }

    pub fn inventory_task_id(mapping: &TableMapping, sharding_item: u32) -> String {
        format!(
            "{}.{}#{}",
            mapping.source_data_source, mapping.source, sharding_item
        )
    }

    pub fn incremental_task_id(data_source: &str, sharding_item: u32) -> String {
        format!("{data_source}.incremental#{sharding_item}")
    }
}

fn creation_error(task_id: &str, e: BoxError) -> PrepareError {
    PrepareError::TaskCreation(format!("{task_id}: {e}"))
}

#[async_trait]
impl TaskFactory for TransmissionTaskFactory {
    async fn create_tasks(
        &self,
        context: &JobItemContext,
    ) -> Result<Vec<Arc<dyn PipelineTask>>, PrepareError> {
        let config = context.job_config();
        let item = context.sharding_item();
        let line = config.data_node_line(item).ok_or_else(|| {
            PrepareError::TaskCreation(format!("no data node line for sharding item {item}"))
        })?;
        let importer = self
            .connector
            .importer(&config.target)
            .map_err(|e| creation_error(&config.target.name, e))?;

        let mut tasks: Vec<Arc<dyn PipelineTask>> = Vec::new();
        let mut by_source: BTreeMap<&str, Vec<TableMapping>> = BTreeMap::new();

        for mapping in &line.mappings {
            let source = config
                .source(&mapping.source_data_source)
                .ok_or_else(|| PrepareError::MissingDataSource(mapping.source_data_source.clone()))?;
            let task_id = Self::inventory_task_id(mapping, item);
            let position = context
                .init_progress()
                .map(|p| p.inventory_position(&task_id))
                .unwrap_or_default();

            let dumper = self
                .connector
                .inventory_dumper(source, mapping)
                .map_err(|e| creation_error(&task_id, e))?;
            tasks.push(Arc::new(
                TransmissionTask::new(
                    task_id,
                    TaskKind::Inventory,
                    dumper,
                    importer.clone(),
                    context.process().clone(),
                )
                .with_position(position),
            ));

            by_source
                .entry(mapping.source_data_source.as_str())
                .or_default()
                .push(mapping.clone());
        }

        for (name, mappings) in by_source {
            let Some(source) = config.source(name) else {
                continue;
            };
            let task_id = Self::incremental_task_id(name, item);
            let position = context
                .init_progress()
                .map(|p| p.incremental_position(&task_id))
                .unwrap_or(IngestPosition::Placeholder);

            let dumper = self
                .connector
                .incremental_dumper(source, &mappings)
                .map_err(|e| creation_error(&task_id, e))?;
            tasks.push(Arc::new(
                TransmissionTask::new(
                    task_id,
                    TaskKind::Incremental,
                    dumper,
                    importer.clone(),
                    context.process().clone(),
                )
                .with_position(position),
            ));
        }

        debug!(
            job_id = context.job_id(),
            sharding_item = item,
            tasks = tasks.len(),
            "Created tasks"
        );
        Ok(tasks)
    }
}

/// Prepares target tables, then builds tasks for every item.
pub struct TransmissionJobPreparer {
    datasource: Option<DataSourcePreparer>,
    factory: Arc<dyn TaskFactory>,
}

impl TransmissionJobPreparer {
    pub fn new(factory: Arc<dyn TaskFactory>) -> Self {
        Self {
            datasource: None,
            factory,
        }
    }

    pub fn with_datasource_preparer(mut self, datasource: DataSourcePreparer) -> Self {
        self.datasource = Some(datasource);
        self
    }

    async fn prepare_target(&self, context: &JobItemContext) -> Result<(), PrepareError> {
        let Some(datasource) = &self.datasource else {
            return Ok(());
        };

        let config = context.job_config();
        let mappings = config
            .data_node_line(context.sharding_item())
            .map(|line| line.mappings.as_slice())
            .unwrap_or_default();

        datasource
            .prepare_target_schemas(PrepareTargetSchemasParams {
                target: &config.target,
                mappings,
            })
            .await?;
        datasource
            .prepare_target_tables(PrepareTargetTablesParams {
                job_config: config,
                mappings,
            })
            .await
    }
}

#[async_trait]
impl JobPreparer for TransmissionJobPreparer {
    async fn init_tasks(&self, contexts: &[Arc<JobItemContext>]) -> Result<(), PrepareError> {
        for context in contexts {
            let resumed = context
                .init_progress()
                .is_some_and(|p| p.status.is_past_inventory());
            if !resumed {
                self.prepare_target(context).await?;
            }

            for task in self.factory.create_tasks(context).await? {
                context.add_task(task);
            }
            context.set_status(JobStatus::ExecuteInventoryTask);

            info!(
                job_id = context.job_id(),
                sharding_item = context.sharding_item(),
                resumed,
                "Initialized tasks"
            );
        }
        Ok(())
    }
}

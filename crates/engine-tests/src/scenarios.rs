#[cfg(test)]
mod tests {
    use crate::support::{
        Behavior, CountingImporter, FixedConnector, FixedDdlGenerator, Harness, MockTask,
        PrepareMode, QueueDumper, RecordingSqlExecutor, ScriptedPreparer, event_log,
        table_mapping, wait_until,
    };
    use engine_core::{
        coordination::CoordinationStore, sink::SocketSink, state::ProgressStore,
        state::SledProgressStore,
    };
    use engine_runtime::{
        api::{GovernanceJobApi, watch_disabled_jobs},
        barrier::barrier_enable_path,
        error::JobError,
        job::PIPELINE_ERROR_CODE,
        prepare::{DataSourcePreparer, TransmissionJobPreparer, TransmissionTaskFactory},
    };
    use model::{
        job::{JobItemProgress, JobStatus, JobType},
        position::IngestPosition,
        response::{CdcResponse, ResponseStatus},
    };
    use std::{sync::Arc, time::Duration};
    use tokio::sync::mpsc;
    use tracing_test::traced_test;

    fn count_stop_logs(lines: &[&str]) -> usize {
        lines.iter().filter(|line| line.contains("Stop job")).count()
    }

    fn copying_connector() -> Arc<FixedConnector> {
        Arc::new(FixedConnector {
            inventory: Arc::new(QueueDumper::with_rows("t_order_0", 3)),
            incremental: Arc::new(QueueDumper::default()),
            importer: Arc::new(CountingImporter::default()),
        })
    }

    fn preparer_with_target(
        connector: Arc<FixedConnector>,
        executor: Arc<RecordingSqlExecutor>,
        ddl: Arc<FixedDdlGenerator>,
    ) -> Arc<TransmissionJobPreparer> {
        Arc::new(
            TransmissionJobPreparer::new(Arc::new(TransmissionTaskFactory::new(connector)))
                .with_datasource_preparer(DataSourcePreparer::new(executor, ddl)),
        )
    }

    // Inventory: [finished, placeholder], incremental: [placeholder].
    // The placeholder inventory task runs, the finished one never starts,
    // and the item moves on to its incremental phase exactly once.
    #[traced_test]
    #[tokio::test]
    async fn promotes_item_to_incremental_phase() {
        let done = Arc::new(MockTask::inventory("inv-done", Behavior::Complete).finished());
        let pending = Arc::new(MockTask::inventory("inv-pending", Behavior::Complete));
        let incremental = Arc::new(MockTask::incremental("inc", Behavior::Complete));
        let preparer = Arc::new(ScriptedPreparer::new(PrepareMode::Succeed).with_tasks(
            0,
            vec![done.clone(), pending.clone(), incremental.clone()],
        ));
        let harness = Harness::new(JobType::Migration, 1, preparer.clone()).await;

        harness.job.execute(&harness.sharding(0)).await.unwrap();
        harness.job.join_triggered().await;

        assert_eq!(done.starts(), 0);
        assert_eq!(pending.starts(), 1);
        assert_eq!(incremental.starts(), 1);
        assert_eq!(harness.status(0), Some(JobStatus::ExecuteIncrementalTask));

        let saved = harness
            .progress
            .load_progress(&harness.job_id, 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.status, JobStatus::ExecuteIncrementalTask);
        assert_eq!(saved.inventory["inv-pending"], IngestPosition::Finished);
        assert!(harness.error_updates().is_empty());
        assert!(harness.disabled_jobs().is_empty());
    }

    // Stopping is requested while tasks are being initialized; inventory
    // still completes but the incremental phase never begins.
    #[traced_test]
    #[tokio::test]
    async fn stop_during_init_blocks_promotion() {
        let done = Arc::new(MockTask::inventory("inv", Behavior::Complete).finished());
        let incremental = Arc::new(MockTask::incremental("inc", Behavior::Complete));
        let preparer = Arc::new(
            ScriptedPreparer::new(PrepareMode::StopDuringInit)
                .with_tasks(0, vec![done.clone(), incremental.clone()]),
        );
        let harness = Harness::new(JobType::Migration, 1, preparer).await;

        harness.job.execute(&harness.sharding(0)).await.unwrap();
        harness.job.join_triggered().await;

        assert_eq!(done.starts(), 0);
        assert_eq!(incremental.starts(), 0);
        assert_eq!(harness.status(0), Some(JobStatus::ExecuteInventoryTask));
    }

    #[traced_test]
    #[tokio::test]
    async fn incremental_starts_after_inventory_resolves() {
        let events = event_log();
        let inventory = Arc::new(
            MockTask::inventory("inv", Behavior::Complete).with_events(events.clone()),
        );
        let incremental = Arc::new(
            MockTask::incremental("inc", Behavior::Stream).with_events(events.clone()),
        );
        let preparer = Arc::new(
            ScriptedPreparer::new(PrepareMode::Succeed)
                .with_tasks(0, vec![inventory.clone(), incremental.clone()]),
        );
        let harness = Harness::new(JobType::Migration, 1, preparer).await;

        harness.job.execute(&harness.sharding(0)).await.unwrap();
        wait_until(|| incremental.starts() == 1).await;

        let recorded = events.lock().unwrap().clone();
        let inventory_done = recorded.iter().position(|e| e == "done:inv").unwrap();
        let incremental_start = recorded.iter().position(|e| e == "start:inc").unwrap();
        assert!(inventory_done < incremental_start, "events: {recorded:?}");

        // The stream only ends when the job is stopped.
        harness.registry.stop(&harness.job_id);
        harness.job.join_triggered().await;
        assert!(events.lock().unwrap().contains(&"done:inc".to_string()));
    }

    #[traced_test]
    #[tokio::test]
    async fn running_item_is_not_prepared_twice() {
        let inventory = Arc::new(MockTask::inventory("inv", Behavior::Stream));
        let preparer = Arc::new(
            ScriptedPreparer::new(PrepareMode::Succeed).with_tasks(0, vec![inventory.clone()]),
        );
        let harness = Harness::new(JobType::Migration, 1, preparer.clone()).await;

        harness.job.execute(&harness.sharding(0)).await.unwrap();
        wait_until(|| inventory.starts() == 1).await;
        assert_eq!(harness.errors.cleans.lock().unwrap().len(), 1);

        harness.job.execute(&harness.sharding(0)).await.unwrap();
        assert_eq!(preparer.calls(), 1);
        assert_eq!(inventory.starts(), 1);
        assert_eq!(harness.errors.cleans.lock().unwrap().len(), 1);

        harness.registry.stop(&harness.job_id);
        harness.job.join_triggered().await;
    }

    #[traced_test]
    #[tokio::test]
    async fn stopping_job_ignores_execution() {
        let inventory = Arc::new(MockTask::inventory("inv", Behavior::Complete));
        let preparer = Arc::new(
            ScriptedPreparer::new(PrepareMode::Succeed).with_tasks(0, vec![inventory.clone()]),
        );
        let harness = Harness::new(JobType::Migration, 1, preparer.clone()).await;
        harness.job.runner_manager().stop();

        harness.job.execute(&harness.sharding(0)).await.unwrap();
        harness.job.join_triggered().await;

        assert_eq!(preparer.calls(), 0);
        assert_eq!(inventory.starts(), 0);
        assert!(harness.errors.cleans.lock().unwrap().is_empty());
        assert!(!harness.registry.is_running(&harness.job_id));
    }

    #[traced_test]
    #[tokio::test]
    async fn task_failure_escalates_once() {
        let failing = Arc::new(MockTask::inventory("inv", Behavior::Fail("disk full")));
        let incremental = Arc::new(MockTask::incremental("inc", Behavior::Complete));
        let preparer = Arc::new(
            ScriptedPreparer::new(PrepareMode::Succeed)
                .with_tasks(0, vec![failing.clone(), incremental.clone()]),
        );
        let (tx, mut rx) = mpsc::channel(4);
        let harness = Harness::with_sink(
            JobType::Migration,
            1,
            preparer,
            Arc::new(SocketSink::new(tx)),
        )
        .await;

        harness.job.execute(&harness.sharding(0)).await.unwrap();
        harness.job.join_triggered().await;

        let updates = harness.error_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, harness.job_id);
        assert_eq!(updates[0].1, 0);
        assert!(updates[0].2.contains("disk full"));
        assert_eq!(harness.disabled_jobs(), vec![harness.job_id.clone()]);
        assert!(!harness.registry.is_running(&harness.job_id));
        assert!(harness.job.runner_manager().is_stopping());
        assert_eq!(incremental.starts(), 0);
        logs_assert(|lines: &[&str]| match count_stop_logs(lines) {
            1 => Ok(()),
            n => Err(format!("expected one stop, saw {n}")),
        });

        let frame = rx.try_recv().unwrap();
        let response: CdcResponse = serde_json::from_slice(&frame).unwrap();
        assert_eq!(response.status, ResponseStatus::Failed);
        assert_eq!(response.error_code.as_deref(), Some(PIPELINE_ERROR_CODE));

        let saved = harness
            .progress
            .load_progress(&harness.job_id, 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.status, JobStatus::ExecuteFailure);
    }

    #[traced_test]
    #[tokio::test]
    async fn preparation_failure_is_returned_and_escalated() {
        let inventory = Arc::new(MockTask::inventory("inv", Behavior::Complete));
        let preparer = Arc::new(
            ScriptedPreparer::new(PrepareMode::Fail("target unreachable"))
                .with_tasks(0, vec![inventory.clone()]),
        );
        let harness = Harness::new(JobType::Migration, 1, preparer).await;

        let err = harness.job.execute(&harness.sharding(0)).await.unwrap_err();
        assert!(matches!(err, JobError::Prepare { .. }));

        let updates = harness.error_updates();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].2.contains("target unreachable"));
        assert_eq!(harness.disabled_jobs(), vec![harness.job_id.clone()]);
        assert_eq!(inventory.starts(), 0);
        logs_assert(|lines: &[&str]| match count_stop_logs(lines) {
            1 => Ok(()),
            n => Err(format!("expected one stop, saw {n}")),
        });
    }

    #[traced_test]
    #[tokio::test]
    async fn rejects_malformed_job_id_and_unknown_item() {
        let preparer = Arc::new(ScriptedPreparer::new(PrepareMode::Succeed));
        let harness = Harness::new(JobType::Migration, 2, preparer.clone()).await;

        let err = harness
            .job
            .execute(&model::sharding::ShardingContext::new("x01P", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::JobId(_)));

        let err = harness.job.execute(&harness.sharding(5)).await.unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidShardingItem {
                sharding_item: 5,
                sharding_count: 2,
                ..
            }
        ));
        assert_eq!(preparer.calls(), 0);
        assert!(!harness.registry.is_running(&harness.job_id));

        harness.job.execute(&harness.sharding(0)).await.unwrap();
        harness.job.join_triggered().await;
        assert!(harness.registry.is_running(&harness.job_id));
    }

    #[traced_test]
    #[tokio::test]
    async fn streaming_job_drives_every_item_at_once() {
        let preparer = Arc::new(ScriptedPreparer::new(PrepareMode::Succeed));
        let harness = Harness::new(JobType::Cdc, 3, preparer.clone()).await;

        harness.job.execute(&harness.sharding(0)).await.unwrap();
        harness.job.join_triggered().await;

        assert_eq!(preparer.calls(), 1);
        assert_eq!(preparer.contexts_seen(), 3);
        assert_eq!(harness.job.runner_manager().sharding_items(), vec![0, 1, 2]);
        for item in 0..3 {
            assert_eq!(harness.status(item), Some(JobStatus::ExecuteIncrementalTask));
        }
    }

    #[traced_test]
    #[tokio::test]
    async fn bounded_job_finishes_and_releases_item() {
        let inventory = Arc::new(MockTask::inventory("check", Behavior::Complete));
        let preparer = Arc::new(
            ScriptedPreparer::new(PrepareMode::Succeed).with_tasks(0, vec![inventory.clone()]),
        );
        let harness = Harness::new(JobType::ConsistencyCheck, 1, preparer).await;

        harness.job.execute(&harness.sharding(0)).await.unwrap();
        harness.job.join_triggered().await;

        assert_eq!(inventory.starts(), 1);
        assert_eq!(harness.status(0), None);
        let saved = harness
            .progress
            .load_progress(&harness.job_id, 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.status, JobStatus::Finished);
    }

    // Every item acknowledges on the enable barrier when it starts, so an
    // operator start returns once all shards are up.
    #[traced_test]
    #[tokio::test]
    async fn start_waits_for_every_item() {
        let preparer = Arc::new(ScriptedPreparer::new(PrepareMode::Succeed));
        let harness = Harness::new(JobType::Migration, 2, preparer).await;
        let _watcher = harness.barrier.clone().watch();
        let api = GovernanceJobApi::new(harness.governance.clone(), harness.barrier.clone());

        let path = barrier_enable_path(&harness.job_id);
        let start = {
            let job_id = harness.job_id.clone();
            tokio::spawn(async move { api.start(&job_id, Duration::from_secs(5)).await })
        };
        wait_until(|| harness.barrier.is_registered(&path)).await;

        harness.job.execute(&harness.sharding(0)).await.unwrap();
        harness.job.execute(&harness.sharding(1)).await.unwrap();

        assert!(start.await.unwrap().unwrap());
        assert!(harness.store.get(&path).await.unwrap().is_none());
        harness.job.join_triggered().await;
    }

    #[traced_test]
    #[tokio::test]
    async fn stop_request_reaches_running_job() {
        let inventory = Arc::new(MockTask::inventory("inv", Behavior::Stream));
        let preparer = Arc::new(
            ScriptedPreparer::new(PrepareMode::Succeed).with_tasks(0, vec![inventory.clone()]),
        );
        let harness = Harness::new(JobType::Migration, 1, preparer).await;
        let _barrier_watcher = harness.barrier.clone().watch();
        let _job_watcher = watch_disabled_jobs(
            Arc::new(harness.store.clone()),
            harness.registry.clone(),
            harness.barrier.clone(),
        );

        harness.job.execute(&harness.sharding(0)).await.unwrap();
        wait_until(|| inventory.starts() == 1).await;

        let api = GovernanceJobApi::new(harness.governance.clone(), harness.barrier.clone());
        assert!(api.stop(&harness.job_id, Duration::from_secs(5)).await.unwrap());
        assert!(!harness.registry.is_running(&harness.job_id));

        harness.job.join_triggered().await;
        let config = harness
            .governance
            .job_configs()
            .load(&harness.job_id)
            .await
            .unwrap();
        assert!(config.disabled);
    }

    #[traced_test]
    #[tokio::test]
    async fn resumed_item_skips_finished_inventory() {
        let state_dir = tempfile::tempdir().unwrap();
        let progress = Arc::new(SledProgressStore::open(state_dir.path()).unwrap());
        let job_id = crate::support::job_id(JobType::Migration, "scenario");

        let inventory_id = TransmissionTaskFactory::inventory_task_id(&table_mapping(0), 0);
        let mut checkpoint = JobItemProgress::new(&job_id, 0, JobStatus::ExecuteIncrementalTask);
        checkpoint
            .inventory
            .insert(inventory_id.clone(), IngestPosition::Finished);
        progress.save_progress(&checkpoint).await.unwrap();

        let connector = Arc::new(FixedConnector {
            inventory: Arc::new(QueueDumper::with_rows("t_order_0", 3)),
            incremental: Arc::new(QueueDumper::default()),
            importer: Arc::new(CountingImporter::default()),
        });
        let preparer = Arc::new(TransmissionJobPreparer::new(Arc::new(
            TransmissionTaskFactory::new(connector.clone()),
        )));
        let harness =
            Harness::resumed(JobType::Migration, 1, preparer, progress, state_dir).await;
        assert_eq!(harness.job_id, job_id);

        harness.job.execute(&harness.sharding(0)).await.unwrap();
        harness.job.join_triggered().await;

        assert_eq!(connector.inventory.calls(), 0);
        assert!(connector.incremental.calls() >= 1);
        assert_eq!(connector.importer.written(), 0);

        let saved = harness
            .progress
            .load_progress(&job_id, 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.status, JobStatus::ExecuteIncrementalTask);
        assert_eq!(saved.inventory[&inventory_id], IngestPosition::Finished);
    }

    #[traced_test]
    #[tokio::test]
    async fn fresh_item_copies_inventory_then_streams() {
        let connector = Arc::new(FixedConnector {
            inventory: Arc::new(QueueDumper::with_rows("t_order_0", 3)),
            incremental: Arc::new(QueueDumper::default()),
            importer: Arc::new(CountingImporter::default()),
        });
        let preparer = Arc::new(TransmissionJobPreparer::new(Arc::new(
            TransmissionTaskFactory::new(connector.clone()),
        )));
        let harness = Harness::new(JobType::Migration, 1, preparer).await;

        harness.job.execute(&harness.sharding(0)).await.unwrap();
        harness.job.join_triggered().await;

        assert_eq!(connector.importer.written(), 3);
        assert!(connector.incremental.calls() >= 1);

        let inventory_id = TransmissionTaskFactory::inventory_task_id(&table_mapping(0), 0);
        let saved = harness
            .progress
            .load_progress(&harness.job_id, 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.status, JobStatus::ExecuteIncrementalTask);
        assert_eq!(saved.inventory[&inventory_id], IngestPosition::Finished);
        assert_eq!(saved.processed_records, 3);
    }

    #[traced_test]
    #[tokio::test]
    async fn fresh_item_creates_target_table() {
        let connector = copying_connector();
        let executor = Arc::new(RecordingSqlExecutor::default());
        let ddl = Arc::new(FixedDdlGenerator::default());
        let preparer = preparer_with_target(connector.clone(), executor.clone(), ddl.clone());
        let harness = Harness::new(JobType::Migration, 1, preparer).await;

        harness.job.execute(&harness.sharding(0)).await.unwrap();
        harness.job.join_triggered().await;

        assert_eq!(ddl.tables(), vec!["t_order_0".to_string()]);
        assert_eq!(
            executor.statements(),
            vec![
                r#"CREATE TABLE IF NOT EXISTS "t_order" (order_id INT PRIMARY KEY, user_id INT)"#
                    .to_string()
            ]
        );
        assert_eq!(connector.importer.written(), 3);
    }

    #[traced_test]
    #[tokio::test]
    async fn resumed_item_does_not_recreate_target_table() {
        let state_dir = tempfile::tempdir().unwrap();
        let progress = Arc::new(SledProgressStore::open(state_dir.path()).unwrap());
        let job_id = crate::support::job_id(JobType::Migration, "scenario");

        let inventory_id = TransmissionTaskFactory::inventory_task_id(&table_mapping(0), 0);
        let mut checkpoint = JobItemProgress::new(&job_id, 0, JobStatus::ExecuteIncrementalTask);
        checkpoint
            .inventory
            .insert(inventory_id, IngestPosition::Finished);
        progress.save_progress(&checkpoint).await.unwrap();

        let connector = copying_connector();
        let executor = Arc::new(RecordingSqlExecutor::default());
        let ddl = Arc::new(FixedDdlGenerator::default());
        let preparer = preparer_with_target(connector.clone(), executor.clone(), ddl.clone());
        let harness =
            Harness::resumed(JobType::Migration, 1, preparer, progress, state_dir).await;

        harness.job.execute(&harness.sharding(0)).await.unwrap();
        harness.job.join_triggered().await;

        assert!(executor.statements().is_empty());
        assert!(ddl.tables().is_empty());
        assert!(connector.incremental.calls() >= 1);
        assert_eq!(harness.status(0), Some(JobStatus::ExecuteIncrementalTask));
    }
}

//! Checkpoint management use case.
//!
//! [`CheckpointManager`] snapshots the engine's [`AgentRuntime`] into a
//! [`CheckpointStore`] and restores it again. A store-level read/write lock
//! serializes persistence operations against each other; the runtime's own
//! lock keeps snapshots consistent with the loop's writes.

use crate::ports::checkpoint_store::{CheckpointError, CheckpointStore};
use crate::use_cases::run_agent::runtime::SharedRuntime;
use crate::use_cases::shared::RunningGuard;
use chrono::Utc;
use conductor_domain::{AgentState, Checkpoint, CheckpointId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    runtime: SharedRuntime,
    running: Arc<AtomicBool>,
    store_lock: RwLock<()>,
    instance_id: Option<String>,
    seq: AtomicU64,
}

impl CheckpointManager {
    /// `running` is the engine's in-flight flag; restore refuses while it is set.
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        runtime: SharedRuntime,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            runtime,
            running,
            store_lock: RwLock::new(()),
            instance_id: None,
            seq: AtomicU64::new(0),
        }
    }

    pub fn with_instance_id(mut self, instance_id: Option<String>) -> Self {
        self.instance_id = instance_id;
        self
    }

    fn next_id(&self) -> CheckpointId {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        CheckpointId::generate(Utc::now(), seq, self.instance_id.as_deref())
    }

    /// Snapshots the live runtime and writes it durably.
    pub async fn save(&self) -> Result<Checkpoint, CheckpointError> {
        let _guard = self.store_lock.write().await;
        let checkpoint = {
            let runtime = self.runtime.read().await;
            runtime.snapshot(self.next_id(), Utc::now())
        };
        self.store.write(&checkpoint).await?;
        info!(
            checkpoint = %checkpoint.id,
            state = %checkpoint.state,
            iteration = checkpoint.iteration,
            "Checkpoint saved"
        );
        Ok(checkpoint)
    }

    /// Overwrites the live runtime with a stored checkpoint.
    ///
    /// Holds the engine's in-flight flag for the whole restore, so a run
    /// cannot start halfway through and a running engine is refused.
    pub async fn restore(&self, id: &CheckpointId) -> Result<Checkpoint, CheckpointError> {
        let _running = RunningGuard::claim(&self.running).ok_or(CheckpointError::AgentBusy)?;
        let _guard = self.store_lock.write().await;
        let checkpoint = self.store.read(id).await?;
        self.runtime.write().await.restore(checkpoint.clone());
        info!(checkpoint = %id, state = %checkpoint.state, "Checkpoint restored");
        Ok(checkpoint)
    }

    pub async fn list(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        let _guard = self.store_lock.read().await;
        self.store.list().await
    }

    pub async fn delete(&self, id: &CheckpointId) -> Result<(), CheckpointError> {
        let _guard = self.store_lock.write().await;
        self.store.delete(id).await?;
        debug!(checkpoint = %id, "Checkpoint deleted");
        Ok(())
    }

    /// Saves a checkpoint every `interval` until `cancel` fires.
    ///
    /// Ticks where the agent is `Idle` or `Complete` are skipped. Save
    /// failures are logged and the task keeps running.
    pub fn start_auto_save(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("Auto-save stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let state = manager.runtime.read().await.state;
                        if matches!(state, AgentState::Idle | AgentState::Complete) {
                            continue;
                        }
                        if let Err(e) = manager.save().await {
                            warn!("Auto-save failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::checkpoint_store::InMemoryCheckpointStore;
    use crate::use_cases::run_agent::runtime::AgentRuntime;
    use conductor_domain::{Decision, DecisionType, Goal, Plan, Task, TaskResult};

    fn setup() -> (
        Arc<InMemoryCheckpointStore>,
        SharedRuntime,
        Arc<AtomicBool>,
        CheckpointManager,
    ) {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let mut runtime = AgentRuntime::for_goal(Goal::new("refactor the parser"));
        runtime.state = AgentState::Executing;
        runtime.plan = Plan::new(vec![
            Task::new("1", "split module", "split parser.rs", "run_command"),
            Task::new("2", "add tests", "add parser tests", "run_command"),
        ]);
        runtime.plan.tasks[0].settle(TaskResult::success("1", "run_command", 12));
        runtime.record_result(TaskResult::success("1", "run_command", 12));
        runtime.decisions.push(Decision::new(
            AgentState::Planning,
            DecisionType::SelectTool,
            "task 1 -> run_command",
            0.8,
        ));
        runtime.iteration = 3;
        let runtime = runtime.shared();
        let running = Arc::new(AtomicBool::new(false));
        let manager = CheckpointManager::new(store.clone(), runtime.clone(), running.clone());
        (store, runtime, running, manager)
    }

    #[tokio::test]
    async fn test_save_restore_round_trip_is_byte_identical() {
        let (store, runtime, _running, manager) = setup();
        let saved = manager.save().await.unwrap();
        let raw_before = store.raw(&saved.id).unwrap();

        {
            let mut rt = runtime.write().await;
            rt.state = AgentState::Failed;
            rt.plan = Plan::default();
            rt.decisions.clear();
            rt.iteration = 42;
        }

        let restored = manager.restore(&saved.id).await.unwrap();
        assert_eq!(restored, saved);

        let rt = runtime.read().await;
        let resnapshot = rt.snapshot(saved.id.clone(), saved.timestamp);
        assert_eq!(
            serde_json::to_string_pretty(&resnapshot).unwrap(),
            raw_before
        );
        assert_eq!(rt.state, AgentState::Executing);
        assert_eq!(rt.iteration, 3);
    }

    #[tokio::test]
    async fn test_checkpoint_is_isolated_from_live_runtime() {
        let (_store, runtime, _running, manager) = setup();
        let saved = manager.save().await.unwrap();

        runtime.write().await.plan.tasks[1].mark_in_progress();
        let reread = manager.list().await.unwrap().remove(0);
        assert_eq!(reread.plan, saved.plan);
        assert_ne!(runtime.read().await.plan, saved.plan);
    }

    #[tokio::test]
    async fn test_restore_refused_while_running() {
        let (_store, _runtime, running, manager) = setup();
        let saved = manager.save().await.unwrap();

        running.store(true, Ordering::SeqCst);
        assert!(matches!(
            manager.restore(&saved.id).await,
            Err(CheckpointError::AgentBusy)
        ));
    }

    #[tokio::test]
    async fn test_restore_holds_running_flag_until_done() {
        let (_store, _runtime, running, manager) = setup();
        let saved = manager.save().await.unwrap();

        let held = manager.store_lock.read().await;
        let restore = manager.restore(&saved.id);
        tokio::pin!(restore);
        tokio::select! {
            biased;
            _ = &mut restore => panic!("restore finished while the store was locked"),
            _ = tokio::task::yield_now() => {}
        }
        assert!(running.load(Ordering::SeqCst), "a run cannot start mid-restore");

        drop(held);
        restore.await.unwrap();
        assert!(!running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_instance_scoped() {
        let (_store, _runtime, _running, manager) = setup();
        let manager = manager.with_instance_id(Some("node-a".into()));
        let a = manager.save().await.unwrap();
        let b = manager.save().await.unwrap();

        assert_ne!(a.id, b.id);
        assert!(a.id.as_str().starts_with("checkpoint_node-a_"));
        assert_eq!(manager.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_and_missing() {
        let (_store, _runtime, _running, manager) = setup();
        let saved = manager.save().await.unwrap();
        manager.delete(&saved.id).await.unwrap();

        assert!(matches!(
            manager.delete(&saved.id).await,
            Err(CheckpointError::NotFound(_))
        ));
        assert!(matches!(
            manager.restore(&saved.id).await,
            Err(CheckpointError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_save_skips_idle_and_stops_on_cancel() {
        let (store, runtime, _running, manager) = setup();
        let manager = Arc::new(manager);
        let cancel = CancellationToken::new();
        let handle = manager.start_auto_save(Duration::from_secs(5), cancel.clone());

        tokio::time::sleep(Duration::from_secs(11)).await;
        let saved_while_executing = store.len();
        assert_eq!(saved_while_executing, 2);

        runtime.write().await.state = AgentState::Idle;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.len(), saved_while_executing);

        cancel.cancel();
        handle.await.unwrap();
    }
}

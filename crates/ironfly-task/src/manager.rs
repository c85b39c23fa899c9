//! Lock acquisition

use ironfly_common::{Error, Result};
use ironfly_store::SharedStore;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::pool::WorkerPool;
use crate::task::Task;

/// Backoff for [`TaskManager::acquire_with_retry`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub attempts: u32,
    /// Delay before the second attempt; doubles each retry
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
            max_delay: base_delay.saturating_mul(10),
        }
    }

    /// Delay before retry number `retry` (0-based), with up to 10% jitter.
    fn delay(&self, retry: u32) -> Duration {
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_delay);
        let jitter_ms = (backoff.as_millis() as u64) / 10;
        let jitter = if jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=jitter_ms)
        } else {
            0
        };
        backoff + Duration::from_millis(jitter)
    }
}

/// Hands out [`Task`]s for nodes in a store.
#[derive(Clone)]
pub struct TaskManager {
    store: SharedStore,
    host: String,
    pool: WorkerPool,
    retry: RetryPolicy,
}

impl TaskManager {
    /// `host` is the identity written into reservations.
    pub fn new(store: SharedStore, host: impl Into<String>) -> Self {
        Self {
            store,
            host: host.into(),
            pool: WorkerPool::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_worker_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Acquire a task for the node named by `ident` (uuid or name).
    ///
    /// Exclusive acquisition reserves the node in one compare-and-set.
    /// Fails fast with `NoFreeConductorWorker` when the pool is full,
    /// `NodeNotFound` when the node does not exist and `NodeLocked` when
    /// another holder has it. If loading ports fails after the node was
    /// reserved, the reservation is released before the error returns.
    pub async fn acquire(&self, ident: &str, shared: bool, purpose: &str) -> Result<Task> {
        let permit = self.pool.try_admit()?;

        let node = if shared {
            self.store.get_node(ident).await?
        } else {
            self.store.reserve_node(ident, &self.host).await?
        };

        let loaded = async {
            let ports = self.store.list_ports_by_node(node.uuid).await?;
            let portgroups = self.store.list_portgroups_by_node(node.uuid).await?;
            Ok::<_, Error>((ports, portgroups))
        }
        .await;

        let (ports, portgroups) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                if !shared {
                    if let Err(release_err) = self.store.release_node(node.uuid, &self.host).await {
                        warn!(node = %node.uuid, error = %release_err, "Failed to release node after load error");
                    }
                }
                return Err(e);
            }
        };

        debug!(
            node = %node.uuid,
            host = %self.host,
            shared,
            purpose,
            "Acquired node lock"
        );
        Ok(Task::new(
            self.store.clone(),
            self.host.clone(),
            node,
            ports,
            portgroups,
            shared,
            purpose.to_string(),
            permit,
        ))
    }

    pub async fn acquire_exclusive(&self, ident: &str, purpose: &str) -> Result<Task> {
        self.acquire(ident, false, purpose).await
    }

    pub async fn acquire_shared(&self, ident: &str, purpose: &str) -> Result<Task> {
        self.acquire(ident, true, purpose).await
    }

    /// Exclusive acquire that retries `NodeLocked` with exponential backoff.
    ///
    /// Other errors, including `NoFreeConductorWorker`, return immediately.
    pub async fn acquire_with_retry(&self, ident: &str, purpose: &str) -> Result<Task> {
        let mut retry = 0;
        loop {
            match self.acquire(ident, false, purpose).await {
                Err(Error::NodeLocked { node, host }) if retry + 1 < self.retry.attempts => {
                    let delay = self.retry.delay(retry);
                    info!(
                        node = %node,
                        holder = %host,
                        attempt = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Node locked, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironfly_common::{Event, NodeRecord, Port, ProvisionState, VifCarrier};
    use ironfly_store::{MemoryStore, Store};
    use std::sync::Arc;

    async fn setup() -> (TaskManager, NodeRecord) {
        let store = Arc::new(MemoryStore::new());
        let node = store
            .create_node(
                NodeRecord::new("fake")
                    .with_name("node-1")
                    .with_provision_state(ProvisionState::Available),
            )
            .await
            .unwrap();
        store
            .create_port(Port::new(node.uuid, "52:54:00:00:00:01"))
            .await
            .unwrap();
        (TaskManager::new(store, "conductor-a"), node)
    }

    #[tokio::test]
    async fn test_exclusive_acquire_sets_reservation() {
        let (manager, node) = setup().await;
        let task = manager.acquire("node-1", false, "test").await.unwrap();
        assert_eq!(task.node().reservation.as_deref(), Some("conductor-a"));
        assert_eq!(task.ports().len(), 1);

        let stored = manager.store().get_node("node-1").await.unwrap();
        assert_eq!(stored.reservation.as_deref(), Some("conductor-a"));

        task.release().await.unwrap();
        let stored = manager.store().get_node(&node.uuid.to_string()).await.unwrap();
        assert!(stored.reservation.is_none());
    }

    #[tokio::test]
    async fn test_second_exclusive_acquire_is_locked_until_release() {
        let (manager, node) = setup().await;
        let other = TaskManager::new(manager.store().clone(), "conductor-b");

        let task = manager.acquire_exclusive("node-1", "first").await.unwrap();
        let err = other.acquire_exclusive("node-1", "second").await.unwrap_err();
        assert_eq!(
            err,
            Error::NodeLocked {
                node: node.uuid.to_string(),
                host: "conductor-a".to_string(),
            }
        );

        task.release().await.unwrap();
        let task = other.acquire_exclusive("node-1", "second").await.unwrap();
        task.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_exclusive_acquire_has_one_winner() {
        let (manager, _) = setup().await;
        let a = manager.clone();
        let b = TaskManager::new(manager.store().clone(), "conductor-b");

        let (ra, rb) = tokio::join!(
            a.acquire_exclusive("node-1", "a"),
            b.acquire_exclusive("node-1", "b")
        );
        let ok = [ra.is_ok(), rb.is_ok()];
        assert_eq!(ok.iter().filter(|x| **x).count(), 1);
        for r in [ra, rb] {
            match r {
                Ok(task) => task.release().await.unwrap(),
                Err(e) => assert!(matches!(e, Error::NodeLocked { .. })),
            }
        }
    }

    #[tokio::test]
    async fn test_shared_tasks_coexist_with_exclusive() {
        let (manager, _) = setup().await;
        let exclusive = manager.acquire_exclusive("node-1", "write").await.unwrap();
        let s1 = manager.acquire_shared("node-1", "read").await.unwrap();
        let s2 = manager.acquire_shared("node-1", "read").await.unwrap();
        assert!(s1.is_shared());
        s1.release().await.unwrap();
        s2.release().await.unwrap();

        let stored = manager.store().get_node("node-1").await.unwrap();
        assert_eq!(stored.reservation.as_deref(), Some("conductor-a"));
        exclusive.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_shared_task_cannot_mutate() {
        let (manager, _) = setup().await;
        let mut task = manager.acquire_shared("node-1", "read").await.unwrap();
        assert!(matches!(
            task.node_mut(),
            Err(Error::ExclusiveLockRequired(_))
        ));
        assert!(matches!(
            task.process_event(Event::Deploy),
            Err(Error::ExclusiveLockRequired(_))
        ));
        assert!(matches!(
            task.save_node().await,
            Err(Error::ExclusiveLockRequired(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_node() {
        let (manager, _) = setup().await;
        assert_eq!(
            manager.acquire_exclusive("ghost", "x").await.unwrap_err(),
            Error::NodeNotFound("ghost".to_string())
        );
        assert!(matches!(
            manager.acquire_shared("ghost", "x").await,
            Err(Error::NodeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_release_after_reservation_stolen_reports_not_locked() {
        let (manager, node) = setup().await;
        let task = manager.acquire_exclusive("node-1", "x").await.unwrap();

        // Operator breaks the lock and someone else takes it
        manager
            .store()
            .release_node(node.uuid, "conductor-a")
            .await
            .unwrap();
        manager
            .store()
            .reserve_node("node-1", "conductor-b")
            .await
            .unwrap();

        assert_eq!(
            task.release().await.unwrap_err(),
            Error::NodeNotLocked(node.uuid.to_string())
        );
        let stored = manager.store().get_node("node-1").await.unwrap();
        assert_eq!(stored.reservation.as_deref(), Some("conductor-b"));
    }

    #[tokio::test]
    async fn test_pool_exhaustion_fails_fast() {
        let (manager, _) = setup().await;
        let manager = manager.with_worker_pool(WorkerPool::new(1));
        let held = manager.acquire_shared("node-1", "hold").await.unwrap();
        assert_eq!(
            manager.acquire_exclusive("node-1", "x").await.unwrap_err(),
            Error::NoFreeConductorWorker
        );
        // nothing was reserved by the rejected attempt
        let stored = manager.store().get_node("node-1").await.unwrap();
        assert!(stored.reservation.is_none());
        held.release().await.unwrap();
        assert!(manager.acquire_exclusive("node-1", "x").await.is_ok());
    }

    #[tokio::test]
    async fn test_drop_releases_in_background() {
        let (manager, _) = setup().await;
        {
            let _task = manager.acquire_exclusive("node-1", "x").await.unwrap();
        }
        // let the spawned release run
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let stored = manager.store().get_node("node-1").await.unwrap();
        assert!(stored.reservation.is_none());
    }

    #[tokio::test]
    async fn test_process_event_and_save() {
        let (manager, _) = setup().await;
        let mut task = manager.acquire_exclusive("node-1", "deploy").await.unwrap();
        let t = task.process_event(Event::Deploy).unwrap();
        assert_eq!(t.to, ProvisionState::Deploying);
        task.save_node().await.unwrap();
        task.release().await.unwrap();

        let stored = manager.store().get_node("node-1").await.unwrap();
        assert_eq!(stored.provision_state, ProvisionState::Deploying);
        assert_eq!(stored.target_provision_state, Some(ProvisionState::Active));
    }

    #[tokio::test]
    async fn test_save_port_persists_extra() {
        let (manager, _) = setup().await;
        let mut task = manager.acquire_exclusive("node-1", "x").await.unwrap();
        task.ports_mut().unwrap()[0].set_vif_port_id("vif-9");
        task.save_ports().await.unwrap();
        let node_uuid = task.node().uuid;
        task.release().await.unwrap();

        let ports = manager.store().list_ports_by_node(node_uuid).await.unwrap();
        assert_eq!(ports[0].vif_port_id(), Some("vif-9"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_with_retry_waits_for_holder() {
        let (manager, node) = setup().await;
        let manager = manager.with_retry_policy(RetryPolicy::new(5, Duration::from_millis(100)));
        let store = manager.store().clone();

        store.reserve_node("node-1", "conductor-b").await.unwrap();
        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            store.release_node(node.uuid, "conductor-b").await.unwrap();
        });

        let task = manager.acquire_with_retry("node-1", "retry").await.unwrap();
        assert_eq!(task.node().reservation.as_deref(), Some("conductor-a"));
        task.release().await.unwrap();
        releaser.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_with_retry_gives_up() {
        let (manager, _) = setup().await;
        let manager = manager.with_retry_policy(RetryPolicy::new(3, Duration::from_millis(10)));
        manager
            .store()
            .reserve_node("node-1", "conductor-b")
            .await
            .unwrap();
        assert!(matches!(
            manager.acquire_with_retry("node-1", "retry").await,
            Err(Error::NodeLocked { .. })
        ));
    }

    #[test]
    fn test_retry_delay_grows_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100));
        assert!(policy.delay(0) >= Duration::from_millis(100));
        assert!(policy.delay(0) <= Duration::from_millis(110));
        assert!(policy.delay(2) >= Duration::from_millis(400));
        assert!(policy.delay(20) <= Duration::from_millis(1100));
    }
}

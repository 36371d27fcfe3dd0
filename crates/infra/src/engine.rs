//! Engine registry: one object that owns the shared store, handler registry
//! and persister, hands out submitters and the dispatcher, and tears
//! everything down on `shutdown`.

use std::io;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::runtime::Handle;
use tracing::info;

use jobrelay_analysis::{HandlerRegistry, RegistryError, ResultHandler};
use jobrelay_core::JobKind;
use jobrelay_events::NotificationBus;

use crate::config::{ConfigError, EngineConfig};
use crate::correlation::{CorrelationStore, InMemoryCorrelationStore, StoreError};
use crate::dispatch::NotificationDispatcher;
use crate::lifecycle::Lifecycle;
use crate::persist::{DownstreamError, DownstreamPersister, PostgresDocumentStore, ResultPersister};
use crate::submit::{ExternalJobService, JobSubmitter, SubmissionPolicy};
use crate::workers::{ExpirySweeper, NotificationWorker, WorkerHandle};

pub type SharedStore = Arc<dyn CorrelationStore>;
pub type SharedPersister = Arc<dyn ResultPersister>;
pub type EngineDispatcher = NotificationDispatcher<SharedStore, SharedPersister>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("downstream store setup failed: {0}")]
    Downstream(#[from] DownstreamError),

    #[error("no result persister configured (set DATABASE_URL with a runtime, or supply one)")]
    MissingPersister,

    #[error("failed to start workers: {0}")]
    Workers(#[from] io::Error),
}

pub struct EngineBuilder {
    config: EngineConfig,
    registry: HandlerRegistry,
    store: Option<SharedStore>,
    persister: Option<SharedPersister>,
    runtime: Option<Handle>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: HandlerRegistry::new(),
            store: None,
            persister: None,
            runtime: None,
        }
    }

    pub fn with_store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_persister(mut self, persister: SharedPersister) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Runtime used by the Postgres document store when `DATABASE_URL` is set.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn register<H>(mut self, handler: H) -> Result<Self, EngineError>
    where
        H: ResultHandler + 'static,
    {
        self.registry.register(handler)?;
        Ok(self)
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        let store: SharedStore = match self.store {
            Some(store) => store,
            None => default_store(&self.config)?,
        };

        let persister: SharedPersister = match (self.persister, &self.config.database_url, self.runtime) {
            (Some(persister), _, _) => persister,
            (None, Some(url), Some(runtime)) => {
                let documents = PostgresDocumentStore::connect_lazy(url, runtime)?;
                Arc::new(DownstreamPersister::new(documents))
            }
            (None, _, _) => return Err(EngineError::MissingPersister),
        };

        let lifecycle = Lifecycle::new();
        let registry = Arc::new(self.registry);

        let dispatcher = Arc::new(
            NotificationDispatcher::new(store.clone(), registry.clone(), persister)
                .with_release_mode(self.config.release_mode)
                .with_lifecycle(lifecycle.clone()),
        );

        let sweeper = ExpirySweeper::spawn("jobrelay-sweep", store.clone(), self.config.sweep_interval)?;

        info!(
            kinds = ?registry.kinds(),
            release_mode = ?self.config.release_mode,
            "engine built"
        );

        Ok(Engine {
            config: self.config,
            store,
            registry,
            dispatcher,
            lifecycle,
            workers: Mutex::new(vec![sweeper]),
        })
    }
}

#[cfg(feature = "redis")]
fn default_store(config: &EngineConfig) -> Result<SharedStore, EngineError> {
    use crate::correlation::RedisCorrelationStore;

    match &config.redis_url {
        Some(url) => {
            let store: SharedStore = Arc::new(
                RedisCorrelationStore::new(url, Some(config.key_prefix.clone()))?
                    .with_release_ttl(config.release_ttl),
            );
            Ok(store)
        }
        None => Ok(in_memory_store(config)),
    }
}

#[cfg(not(feature = "redis"))]
fn default_store(config: &EngineConfig) -> Result<SharedStore, EngineError> {
    match &config.redis_url {
        Some(url) => Err(ConfigError::Invalid {
            key: "JOBRELAY_REDIS_URL",
            value: url.clone(),
            reason: "built without the `redis` feature".to_string(),
        }
        .into()),
        None => Ok(in_memory_store(config)),
    }
}

fn in_memory_store(config: &EngineConfig) -> SharedStore {
    Arc::new(InMemoryCorrelationStore::new().with_release_ttl(config.release_ttl))
}

/// Running engine. Construct once per process.
pub struct Engine {
    config: EngineConfig,
    store: SharedStore,
    registry: Arc<HandlerRegistry>,
    dispatcher: Arc<EngineDispatcher>,
    lifecycle: Lifecycle,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("kinds", &self.registry.kinds())
            .field("accepting", &self.lifecycle.is_accepting())
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn is_accepting(&self) -> bool {
        self.lifecycle.is_accepting()
    }

    /// Submitter for `kind` using the configured TTL and retry defaults.
    pub fn submitter<S>(&self, kind: JobKind, service: S) -> JobSubmitter<S, SharedStore>
    where
        S: ExternalJobService,
    {
        self.submitter_with_policy(
            kind,
            service,
            SubmissionPolicy::new(self.config.submission_retry.clone()),
        )
    }

    pub fn submitter_with_policy<S>(
        &self,
        kind: JobKind,
        service: S,
        policy: SubmissionPolicy,
    ) -> JobSubmitter<S, SharedStore>
    where
        S: ExternalJobService,
    {
        JobSubmitter::new(kind, service, self.store.clone())
            .with_policy(policy)
            .with_ttl(self.config.correlation_ttl)
            .with_lifecycle(self.lifecycle.clone())
    }

    pub fn dispatcher(&self) -> Arc<EngineDispatcher> {
        self.dispatcher.clone()
    }

    /// Drain `bus` on `dispatch_concurrency` worker threads until shutdown.
    pub fn start_workers<B>(&self, bus: &B) -> Result<(), EngineError>
    where
        B: NotificationBus + ?Sized,
    {
        let handle = NotificationWorker::spawn(
            "jobrelay-dispatch",
            bus,
            self.dispatcher.clone(),
            self.config.dispatch_concurrency,
        )?;

        match self.workers.lock() {
            Ok(mut workers) => workers.push(handle),
            Err(poisoned) => poisoned.into_inner().push(handle),
        }
        Ok(())
    }

    /// Stop accepting submissions and notifications, then join the workers
    /// and the expiry sweeper.
    ///
    /// In-flight dispatches finish; entries already written stay in the store
    /// and expire by TTL if their notification never gets processed.
    pub fn shutdown(&self) {
        if !self.lifecycle.stop() {
            return;
        }

        let workers = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for worker in workers {
            worker.shutdown();
        }

        info!(stats = ?self.dispatcher.stats(), "engine shut down");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! Engine lifecycle management.
//!
//! [`EngineLifecycle`] owns the single engine instance. Initialization runs
//! in the background under a generation number; callers wait on a oneshot
//! channel queued under their own generation.
//!
//! # Overlapping requests
//!
//! Only one initialization run exists at a time. A request arriving while a
//! run is in flight advances the generation, which makes the running attempt
//! stale. The stale run aborts at its next checkpoint, rejects its own
//! callers with an aborted error, and hands over to the newest generation
//! that still has callers. Callers of generations in between are rejected as
//! superseded, so no caller ever receives a handle older than the request it
//! made.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use vaultbuild_engine::{AssetAcquirer, EngineHost, EngineLifecycle};
//! use vaultbuild_core::EngineConfig;
//!
//! # async fn example(host: Arc<dyn EngineHost>, acquirer: AssetAcquirer) -> vaultbuild_core::Result<()> {
//! let lifecycle = EngineLifecycle::new(EngineConfig::default(), host, acquirer)?;
//! let handle = lifecycle.initialize("first build").await?;
//! println!("engine ready at generation {}", handle.generation());
//! lifecycle.unload().await;
//! # Ok(())
//! # }
//! ```

use crate::acquirer::AssetAcquirer;
use crate::compiler::CompiledModule;
use crate::generation::{GenerationCounter, GenerationGuard};
use crate::protocol::{BundlingEngine, EngineHost, ScriptHandle};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, oneshot};
use vaultbuild_core::{EngineConfig, EngineStatus, Error, EventBus, Result};

type Waiter = oneshot::Sender<Result<EngineHandle>>;
type Handshake =
    std::result::Result<Arc<dyn BundlingEngine>, (Option<Arc<dyn BundlingEngine>>, Error)>;

/// A ready engine and the generation that produced it.
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<dyn BundlingEngine>,
    generation: u64,
}

impl EngineHandle {
    /// The engine API.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn BundlingEngine> {
        &self.engine
    }

    /// Generation whose initialization produced this handle.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The engine status changed.
    StatusChanged {
        /// New status
        status: EngineStatus,
        /// Generation current at the change
        generation: u64,
        /// Failure message when `status` is [`EngineStatus::Error`]
        error: Option<String>,
    },
}

struct Ready {
    engine: Arc<dyn BundlingEngine>,
    generation: u64,
    script: ScriptHandle,
}

impl Ready {
    fn handle(&self) -> EngineHandle {
        EngineHandle {
            engine: Arc::clone(&self.engine),
            generation: self.generation,
        }
    }
}

struct LifecycleState {
    status: EngineStatus,
    last_error: Option<Arc<Error>>,
    running: Option<u64>,
    waiters: BTreeMap<u64, Vec<Waiter>>,
    ready: Option<Ready>,
}

/// Decisions taken while settling a finished run.
#[derive(Default)]
struct Settled {
    teardown: Option<Ready>,
    next_run: Option<u64>,
    event: Option<EngineEvent>,
}

struct Inner {
    config: EngineConfig,
    host: Arc<dyn EngineHost>,
    acquirer: AssetAcquirer,
    generations: GenerationCounter,
    state: Mutex<LifecycleState>,
    events: EventBus<EngineEvent>,
}

/// Owns the engine instance and its initialization runs.
pub struct EngineLifecycle {
    inner: Arc<Inner>,
}

impl EngineLifecycle {
    /// Creates a lifecycle in the `uninitialized` state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `config` is invalid.
    pub fn new(
        config: EngineConfig,
        host: Arc<dyn EngineHost>,
        acquirer: AssetAcquirer,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                host,
                acquirer,
                generations: GenerationCounter::new(),
                state: Mutex::new(LifecycleState {
                    status: EngineStatus::Uninitialized,
                    last_error: None,
                    running: None,
                    waiters: BTreeMap::new(),
                    ready: None,
                }),
                events: EventBus::new(),
            }),
        })
    }

    /// Initializes the engine, or returns the ready one.
    ///
    /// # Errors
    ///
    /// - aborted [`Error::EngineInitialization`] if a newer request or an
    ///   [`unload`](Self::unload) superseded this one
    /// - [`Error::EngineInitialization`] if the current attempt failed
    pub async fn initialize(&self, reason: &str) -> Result<EngineHandle> {
        let receiver = {
            let mut state = self.inner.state();
            if state.status == EngineStatus::Initialized
                && state.running.is_none()
                && let Some(ready) = &state.ready
            {
                return Ok(ready.handle());
            }

            let generation = self.inner.generations.advance();
            tracing::info!(generation, reason, "Engine initialization requested");
            let (sender, receiver) = oneshot::channel();
            state.waiters.entry(generation).or_default().push(sender);

            if state.running.is_none() {
                state.running = Some(generation);
                Inner::spawn_run(&self.inner, generation);
            } else {
                tracing::debug!(
                    generation,
                    running = ?state.running,
                    "Initialization in flight, queued behind it"
                );
            }
            if state.status != EngineStatus::Initializing {
                state.status = EngineStatus::Initializing;
                state.last_error = None;
                self.inner.events.publish(EngineEvent::StatusChanged {
                    status: EngineStatus::Initializing,
                    generation,
                    error: None,
                });
            }
            receiver
        };
        receive(receiver).await
    }

    /// Waits for the engine to become ready without superseding a run in
    /// flight.
    ///
    /// Starts an initialization only when none is running.
    ///
    /// # Errors
    ///
    /// Same as [`initialize`](Self::initialize).
    pub async fn wait_ready(&self) -> Result<EngineHandle> {
        let receiver = {
            let mut state = self.inner.state();
            if state.running.is_some() {
                let (sender, receiver) = oneshot::channel();
                let generation = self.inner.generations.current();
                state.waiters.entry(generation).or_default().push(sender);
                Some(receiver)
            } else if let Some(ready) = &state.ready {
                return Ok(ready.handle());
            } else {
                None
            }
        };
        match receiver {
            Some(receiver) => receive(receiver).await,
            None => self.initialize("wait for engine").await,
        }
    }

    /// Stops the engine and rejects every pending caller.
    ///
    /// Any run in flight becomes stale. Calling this repeatedly is harmless.
    pub async fn unload(&self) {
        let (ready, waiters, generation, changed) = {
            let mut state = self.inner.state();
            let generation = self.inner.generations.advance();
            let changed = state.status != EngineStatus::Uninitialized;
            state.status = EngineStatus::Uninitialized;
            state.last_error = None;
            (
                state.ready.take(),
                std::mem::take(&mut state.waiters),
                generation,
                changed,
            )
        };

        let rejected = waiters
            .into_values()
            .flatten()
            .map(|waiter| waiter.send(Err(Error::aborted("Engine unloaded"))))
            .count();
        if let Some(ready) = ready {
            self.inner.teardown(ready).await;
        }
        if changed {
            tracing::info!(generation, rejected, "Engine unloaded");
            self.inner.events.publish(EngineEvent::StatusChanged {
                status: EngineStatus::Uninitialized,
                generation,
                error: None,
            });
        }
    }

    /// Clears the persistent and in-memory caches, unloads, and
    /// initializes from the network.
    ///
    /// # Errors
    ///
    /// Same as [`initialize`](Self::initialize).
    pub async fn renew(&self) -> Result<EngineHandle> {
        if let Err(err) = self.inner.acquirer.cache_for(&self.inner.config).clear().await {
            tracing::warn!(error = %err, "Failed to clear engine cache");
        }
        self.inner.acquirer.forget_compiled();
        self.unload().await;
        self.initialize("renew").await
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        self.inner.state().status
    }

    /// Error of the last failed current-generation run.
    #[must_use]
    pub fn last_error(&self) -> Option<Arc<Error>> {
        self.inner.state().last_error.clone()
    }

    /// The ready engine, if any.
    #[must_use]
    pub fn engine(&self) -> Option<EngineHandle> {
        self.inner.state().ready.as_ref().map(Ready::handle)
    }

    /// Latest generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generations.current()
    }

    /// Subscribes to status changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    /// Engine configuration in use.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

impl fmt::Debug for EngineLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineLifecycle")
            .field("status", &self.status())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

async fn receive(receiver: oneshot::Receiver<Result<EngineHandle>>) -> Result<EngineHandle> {
    receiver
        .await
        .unwrap_or_else(|_| Err(Error::aborted("Engine lifecycle dropped the request")))
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs one generation in a task of its own so a panic is reported as a
    /// failure instead of leaving callers waiting.
    fn spawn_run(inner: &Arc<Self>, generation: u64) {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let worker = {
                let inner = Arc::clone(&inner);
                tokio::spawn(async move { inner.run(generation).await })
            };
            let outcome = worker.await.unwrap_or_else(|err| {
                Err(Error::engine(format!("Engine initialization task failed: {err}")))
            });

            let settled = inner.settle(generation, outcome);
            if let Some(ready) = settled.teardown {
                inner.teardown(ready).await;
            }
            if let Some(event) = settled.event {
                inner.events.publish(event);
            }
            if let Some(next) = settled.next_run {
                tracing::debug!(from = generation, to = next, "Handing over initialization");
                Self::spawn_run(&inner, next);
            }
        });
    }

    async fn run(&self, generation: u64) -> Result<Ready> {
        let guard = self.generations.guard(generation);
        let assets = self.acquirer.get_assets(&self.config, &guard).await?;
        guard.check("script injection")?;

        let script = self.host.inject_script(&assets.script_text).await?;
        match self.handshake(&guard, assets.module).await {
            Ok(engine) => {
                tracing::info!(generation, source = ?assets.source, "Engine initialized");
                Ok(Ready {
                    engine,
                    generation,
                    script,
                })
            }
            Err((engine, err)) => {
                self.discard(engine, script).await;
                Err(err)
            }
        }
    }

    /// Waits for the API and initializes it. On failure the API, if it
    /// appeared, is returned alongside the error so it can be stopped.
    async fn handshake(
        &self,
        guard: &GenerationGuard,
        module: CompiledModule,
    ) -> Handshake {
        let engine = self.wait_for_api(guard).await.map_err(|err| (None, err))?;

        let timeout = self.config.init_timeout();
        let initialized = tokio::time::timeout(timeout, engine.initialize(module)).await;
        let failure = match initialized {
            Ok(Ok(())) => guard.check("engine initialization").err(),
            Ok(Err(err)) => Some(Error::EngineInitialization {
                message: "Engine rejected initialization".to_string(),
                aborted: false,
                source: Some(Box::new(err)),
            }),
            Err(_) => Some(Error::EngineInitialization {
                message: "Engine did not finish initializing".to_string(),
                aborted: false,
                source: Some(Box::new(Error::Timeout {
                    operation: "engine initialization".to_string(),
                    duration_secs: timeout.as_secs(),
                })),
            }),
        };
        match failure {
            None => Ok(engine),
            Some(err) => Err((Some(engine), err)),
        }
    }

    async fn wait_for_api(&self, guard: &GenerationGuard) -> Result<Arc<dyn BundlingEngine>> {
        let attempts = self.config.api_poll_attempts;
        for _ in 0..attempts {
            guard.check("engine API wait")?;
            if let Some(api) = self.host.api() {
                return Ok(api);
            }
            tokio::time::sleep(self.config.api_poll_interval()).await;
        }
        guard.check("engine API wait")?;
        Err(Error::engine(format!(
            "Engine API did not appear after {attempts} polls"
        )))
    }

    fn settle(&self, generation: u64, outcome: Result<Ready>) -> Settled {
        let mut state = self.state();
        if state.running == Some(generation) {
            state.running = None;
        }
        let current = self.generations.guard(generation).is_current();
        let waiters = state.waiters.remove(&generation).unwrap_or_default();
        let mut settled = Settled::default();

        match outcome {
            Ok(ready) if current => {
                let handle = ready.handle();
                for waiter in waiters {
                    let _ = waiter.send(Ok(handle.clone()));
                }
                state.ready = Some(ready);
                state.status = EngineStatus::Initialized;
                state.last_error = None;
                settled.event = Some(EngineEvent::StatusChanged {
                    status: EngineStatus::Initialized,
                    generation,
                    error: None,
                });
            }
            Ok(ready) => {
                tracing::debug!(generation, "Discarding engine of a superseded generation");
                settled.teardown = Some(ready);
                reject_superseded(waiters, generation);
            }
            Err(err) if err.is_aborted() || !current => {
                tracing::debug!(generation, error = %err, "Initialization aborted");
                reject_superseded(waiters, generation);
            }
            Err(err) => {
                tracing::error!(generation, error = %err, "Engine initialization failed");
                let shared = Arc::new(err);
                for waiter in waiters {
                    let _ = waiter.send(Err(Error::from_shared(&shared)));
                }
                settled.event = Some(EngineEvent::StatusChanged {
                    status: EngineStatus::Error,
                    generation,
                    error: Some(shared.to_string()),
                });
                state.status = EngineStatus::Error;
                state.last_error = Some(shared);
            }
        }

        if state.running.is_none()
            && let Some(next) = state.waiters.keys().next_back().copied()
        {
            let older: Vec<u64> = state.waiters.range(..next).map(|(g, _)| *g).collect();
            for stale in older {
                if let Some(waiters) = state.waiters.remove(&stale) {
                    reject_superseded(waiters, stale);
                }
            }
            state.running = Some(next);
            settled.next_run = Some(next);
        } else if state.running.is_none() && state.status == EngineStatus::Initializing {
            state.status = EngineStatus::Uninitialized;
            settled.event.get_or_insert(EngineEvent::StatusChanged {
                status: EngineStatus::Uninitialized,
                generation: self.generations.current(),
                error: None,
            });
        }
        settled
    }

    async fn teardown(&self, ready: Ready) {
        self.discard(Some(ready.engine), ready.script).await;
    }

    async fn discard(&self, engine: Option<Arc<dyn BundlingEngine>>, script: ScriptHandle) {
        if let Some(engine) = engine {
            match tokio::time::timeout(self.config.stop_timeout(), engine.stop()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!(error = %err, "Engine stop failed"),
                Err(_) => tracing::warn!("Engine did not stop in time"),
            }
        }
        if let Err(err) = self.host.remove_script(script).await {
            tracing::warn!(error = %err, "Failed to remove engine script");
        }
    }
}

fn reject_superseded(waiters: Vec<Waiter>, generation: u64) {
    for waiter in waiters {
        let _ = waiter.send(Err(Error::aborted(format!(
            "Initialization generation {generation} was superseded"
        ))));
    }
}

//! `SessionHost`: the frame loop that feeds a transport into a registry.
//!
//! Every frame the host drains the transport's pending events into the
//! [`SessionRegistry`], then ticks it so backend completions, handshake
//! timeouts and retries are applied. Nothing here blocks between frames.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use warden_protocol::{Codec, JsonCodec};
use warden_session::{
    AuthBackend, AuthOrchestrator, ServerContext, SessionError,
    SessionRegistry, Subscription,
};
use warden_tick::{TickConfig, TickScheduler};
use warden_transport::Transport;

use crate::WardenError;

/// Owns a registry and the scheduler that drives it.
pub struct SessionHost<T: Transport, C: Codec = JsonCodec> {
    registry: SessionRegistry<T, C>,
    scheduler: TickScheduler,
}

impl<T: Transport> SessionHost<T, JsonCodec> {
    /// Builds a host from a `warden.toml` file. A missing file yields
    /// default settings and becomes the permission backing file.
    ///
    /// # Errors
    /// Returns [`WardenError::Session`] if the file exists but cannot be
    /// read or parsed.
    pub fn from_config(
        path: impl AsRef<Path>,
        backend: impl AuthBackend,
        transport: T,
    ) -> Result<Self, WardenError> {
        let ctx = Arc::new(ServerContext::load(path)?);
        let orchestrator = AuthOrchestrator::new(backend, &ctx);
        Ok(Self::new(SessionRegistry::new(ctx, orchestrator, transport)))
    }
}

impl<T: Transport, C: Codec> SessionHost<T, C> {
    /// A host ticking `registry` at the default rate.
    pub fn new(registry: SessionRegistry<T, C>) -> Self {
        Self::with_tick_config(registry, TickConfig::default())
    }

    /// A host ticking `registry` with an explicit scheduler config.
    pub fn with_tick_config(
        registry: SessionRegistry<T, C>,
        config: TickConfig,
    ) -> Self {
        Self {
            registry,
            scheduler: TickScheduler::new(config),
        }
    }

    /// The registry this host drives.
    pub fn registry(&self) -> &SessionRegistry<T, C> {
        &self.registry
    }

    /// Mutable access to the registry, e.g. to feed identity claims.
    pub fn registry_mut(&mut self) -> &mut SessionRegistry<T, C> {
        &mut self.registry
    }

    /// The frame scheduler, for tick counts and timing metrics.
    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    /// Shorthand for `registry_mut().subscribe()`.
    pub fn subscribe(&mut self) -> Subscription {
        self.registry.subscribe()
    }

    /// Routes every pending transport event into the registry and returns
    /// how many were handled. Refused connections are logged, not
    /// propagated: one full server must not stop the loop.
    pub fn pump(&mut self) -> usize {
        let events = self.registry.transport().poll_events();
        let count = events.len();
        for event in events {
            match self.registry.handle_event(event) {
                Ok(()) => {}
                Err(SessionError::CapacityExceeded { max }) => {
                    tracing::debug!(max, "connection refused, server full");
                }
                Err(error) => {
                    tracing::warn!(%error, "transport event failed");
                }
            }
        }
        count
    }

    /// One frame: pump the transport, then tick the registry.
    pub fn tick(&mut self) {
        self.pump();
        self.registry.tick();
    }

    /// Runs frames until `shutdown` resolves, then shuts the registry down.
    ///
    /// A backend that fails to initialize is not fatal: the orchestrator
    /// retries every frame and answers tickets with `ProviderUnavailable`
    /// meanwhile.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if let Err(error) = self.registry.orchestrator_mut().initialize() {
            tracing::warn!(%error, "auth backend failed to initialize");
        }
        tracing::info!(
            backend = self.registry.orchestrator().backend_name(),
            rate_hz = self.scheduler.tick_rate_hz(),
            "session host running"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = self.scheduler.wait_for_tick() => {
                    self.tick();
                    self.scheduler.record_tick_end();
                }
            }
        }

        self.registry.shutdown();
        tracing::info!(frames = self.scheduler.tick_count(), "session host stopped");
    }
}

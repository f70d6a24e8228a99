//! Synchronous adapter
//!
//! Drives the same orchestrator future as the async API on a tokio runtime,
//! so blocking callers get identical retry, circuit and escalation behavior.
//! Must not be used from inside an async task; use it from plain threads or
//! `spawn_blocking`.

use std::future::{ready, Future};
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::context::RecoveryResult;
use crate::engine::{ExecuteOptions, RecoveryEngine};
use crate::error::OperationError;

enum Driver {
    Handle(Handle),
    Owned(Runtime),
}

impl Driver {
    fn block_on<F: Future>(&self, future: F) -> F::Output {
        match self {
            Self::Handle(handle) => handle.block_on(future),
            Self::Owned(runtime) => runtime.block_on(future),
        }
    }
}

/// Blocking front-end for a shared [`RecoveryEngine`]
pub struct BlockingRecovery {
    engine: Arc<RecoveryEngine>,
    driver: Driver,
}

impl BlockingRecovery {
    /// Drive calls on an existing runtime
    pub fn new(engine: Arc<RecoveryEngine>, handle: Handle) -> Self {
        Self {
            engine,
            driver: Driver::Handle(handle),
        }
    }

    /// Drive calls on a dedicated current-thread runtime
    pub fn with_runtime(engine: Arc<RecoveryEngine>) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            engine,
            driver: Driver::Owned(runtime),
        })
    }

    pub fn engine(&self) -> &Arc<RecoveryEngine> {
        &self.engine
    }

    /// Blocking [`RecoveryEngine::execute_with_recovery`]
    pub fn execute<T, F>(&self, component: &str, operation: &str, work: F) -> RecoveryResult<T>
    where
        F: FnMut(u32) -> Result<T, OperationError>,
    {
        self.execute_with_options(component, operation, ExecuteOptions::default(), work)
    }

    /// Blocking [`RecoveryEngine::execute_with_options`]
    pub fn execute_with_options<T, F>(
        &self,
        component: &str,
        operation: &str,
        options: ExecuteOptions,
        mut work: F,
    ) -> RecoveryResult<T>
    where
        F: FnMut(u32) -> Result<T, OperationError>,
    {
        self.driver.block_on(self.engine.execute_with_options(
            component,
            operation,
            options,
            |attempt| ready(work(attempt)),
        ))
    }
}

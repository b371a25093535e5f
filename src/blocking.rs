//! Driving async clients from blocking calls

use crate::error::*;
use std::future::Future;
use tokio::runtime::{Builder, EnterGuard, Handle, Runtime, RuntimeFlavor};

/// Private runtime the daemon and runtime backends run their clients on
///
/// Usable from plain threads and from worker threads of a multi-threaded
/// tokio runtime. A thread driving a current-thread runtime cannot block at
/// all, so calls from there fail with [`Error::AsyncContext`].
pub(crate) struct BlockingRuntime {
    // `None` only while dropping
    rt: Option<Runtime>,
}

impl BlockingRuntime {
    pub(crate) fn new() -> Result<Self> {
        check_context()?;
        let rt = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Construction(format!("tokio runtime: {}", e)))?;
        Ok(BlockingRuntime { rt: Some(rt) })
    }

    /// Run `future` to completion on this runtime
    pub(crate) fn block_on<T, F>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let rt = self.runtime()?;
        if in_async_context()? {
            tokio::task::block_in_place(|| rt.block_on(future))
        } else {
            rt.block_on(future)
        }
    }

    /// Make this runtime current, for clients which capture it on creation
    pub(crate) fn enter(&self) -> Result<EnterGuard<'_>> {
        Ok(self.runtime()?.enter())
    }

    fn runtime(&self) -> Result<&Runtime> {
        self.rt
            .as_ref()
            .ok_or_else(|| Error::Construction("tokio runtime is shut down".to_string()))
    }
}

impl Drop for BlockingRuntime {
    fn drop(&mut self) {
        // Dropping a runtime blocks, which async contexts do not allow
        if let Some(rt) = self.rt.take() {
            if Handle::try_current().is_ok() {
                rt.shutdown_background();
            }
        }
    }
}

fn check_context() -> Result<()> {
    in_async_context().map(|_| ())
}

/// `true` on a worker thread of a multi-threaded runtime
fn in_async_context() -> Result<bool> {
    match Handle::try_current() {
        Err(_) => Ok(false),
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => Ok(true),
            _ => Err(Error::AsyncContext),
        },
    }
}

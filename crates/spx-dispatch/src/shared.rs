//! Thread-safe handle to a [`Dispatcher`].
//!
//! Every operation takes one global lock, so calls from several threads are
//! serialized exactly as they would be on a single thread.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use spx_model::Value;

use crate::coerce::CallArgs;
use crate::dispatcher::Dispatcher;
use crate::error::Result;

#[derive(Clone)]
pub struct SharedDispatcher {
    inner: Arc<Mutex<Dispatcher>>,
}

impl SharedDispatcher {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            inner: Arc::new(Mutex::new(dispatcher)),
        }
    }

    pub fn call(&self, symbol: &str, args: impl Into<CallArgs>) -> Result<Vec<Value>> {
        self.inner.lock().call(symbol, args)
    }

    /// Runs `f` with the lock held, e.g. to configure modes and then call.
    pub fn with<R>(&self, f: impl FnOnce(&mut Dispatcher) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn lock(&self) -> MutexGuard<'_, Dispatcher> {
        self.inner.lock()
    }
}

impl From<Dispatcher> for SharedDispatcher {
    fn from(dispatcher: Dispatcher) -> Self {
        Self::new(dispatcher)
    }
}

//! Reference native library for the spx dispatch layer.
//!
//! An in-process stand-in for the wrapped numeric library: body and frame
//! lookups backed by a [`KernelPool`], and vector math on nalgebra types.
//! [`SIGNATURES`] is the signature table describing every routine.

mod pool;
mod routines;

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use spx_compat::NativeLibrary;

pub use pool::{BodyRecord, KernelPool, PoolMiss};

/// JSON signature table for every routine in [`Toolkit::library`].
pub const SIGNATURES: &str = include_str!("../tables/reference_signatures.json");

/// Owner of the kernel pool shared by every routine of its libraries.
#[derive(Debug, Clone, Default)]
pub struct Toolkit {
    pool: Arc<RwLock<KernelPool>>,
}

impl Toolkit {
    pub fn new(pool: KernelPool) -> Self {
        Self {
            pool: Arc::new(RwLock::new(pool)),
        }
    }

    pub fn standard() -> Self {
        Self::new(KernelPool::standard())
    }

    /// Native library whose routines read this toolkit's pool.
    pub fn library(&self) -> NativeLibrary {
        let mut library = NativeLibrary::new();
        routines::register_all(&mut library, &self.pool);
        library
    }

    pub fn pool(&self) -> RwLockReadGuard<'_, KernelPool> {
        self.pool.read()
    }

    /// Changes are visible to libraries built before the call.
    pub fn pool_mut(&self) -> RwLockWriteGuard<'_, KernelPool> {
        self.pool.write()
    }
}

//! Per-component execution lock.
//!
//! A component marks itself busy when a state-mutating entry point starts and
//! clears the mark when it returns, whether it succeeded or not. A nested call
//! that finds the mark set is rejected with [`Error::Reentrancy`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Busy flag guarding one component's entry points
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReentrancyLock {
    component: String,
    #[serde(skip)]
    entered: Option<&'static str>,
}

impl ReentrancyLock {
    /// Create an idle lock for the named component
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            entered: None,
        }
    }

    /// Whether an entry point is currently executing
    pub fn is_entered(&self) -> bool {
        self.entered.is_some()
    }

    /// Name of the entry point currently holding the lock
    pub fn holder(&self) -> Option<&'static str> {
        self.entered
    }

    /// Mark the component busy
    pub fn acquire(&mut self, operation: &'static str) -> Result<()> {
        if let Some(holder) = self.entered {
            tracing::warn!(
                component = %self.component,
                holder,
                operation,
                "reentrant call rejected"
            );
            return Err(Error::Reentrancy(format!("{}::{}", self.component, operation)));
        }
        self.entered = Some(operation);
        Ok(())
    }

    /// Clear the busy mark
    pub fn release(&mut self) {
        self.entered = None;
    }
}

/// Implemented by components that guard their entry points
pub trait Guarded: Sized {
    /// The component's lock
    fn lock(&mut self) -> &mut ReentrancyLock;

    /// Run `f` with the lock held, releasing it on every exit path
    fn non_reentrant<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.lock().acquire(operation)?;
        let result = f(self);
        self.lock().release();
        result
    }
}

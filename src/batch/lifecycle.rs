//! Lifecycle guard shared by every pipeline variant.
//!
//! The state is a two-bit word: `INITIALIZED` is set by `init`, `CLOSED` by
//! `close`. Bits are only ever added, so a closed pipeline can never run again.

use std::sync::atomic::{AtomicU8, Ordering};

const INITIALIZED: u8 = 0b01;
const CLOSED: u8 = 0b10;

/// Externally visible pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Running,
    Closed,
}

impl PipelineState {
    fn from_bits(bits: u8) -> Self {
        if bits & CLOSED == CLOSED {
            PipelineState::Closed
        } else if bits & INITIALIZED == INITIALIZED {
            PipelineState::Running
        } else {
            PipelineState::Uninitialized
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::Running => "running",
            PipelineState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Call-order violations. These are programming errors on the caller side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("{0} instance is not initialized")]
    NotInitialized(&'static str),

    #[error("{0} instance is closed")]
    Closed(&'static str),
}

#[derive(Debug)]
pub struct LifecycleGuard {
    component: &'static str,
    bits: AtomicU8,
}

impl LifecycleGuard {
    pub fn new(component: &'static str) -> Self {
        Self {
            component,
            bits: AtomicU8::new(0),
        }
    }

    pub fn component(&self) -> &'static str {
        self.component
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Precondition for submitting items.
    pub fn ensure_accepting(&self) -> Result<(), LifecycleError> {
        let bits = self.bits.load(Ordering::Acquire);
        if bits & CLOSED == CLOSED {
            return Err(LifecycleError::Closed(self.component));
        }
        if bits & INITIALIZED == 0 {
            return Err(LifecycleError::NotInitialized(self.component));
        }
        Ok(())
    }

    pub fn ensure_not_closed(&self) -> Result<(), LifecycleError> {
        if self.state() == PipelineState::Closed {
            return Err(LifecycleError::Closed(self.component));
        }
        Ok(())
    }

    /// Marks the guard initialized. Returns `Ok(true)` only for the call that
    /// performed the transition.
    pub fn begin_init(&self) -> Result<bool, LifecycleError> {
        let prev = self.bits.fetch_or(INITIALIZED, Ordering::AcqRel);
        if prev & CLOSED == CLOSED {
            return Err(LifecycleError::Closed(self.component));
        }
        Ok(prev & INITIALIZED == 0)
    }

    /// Marks the guard closed. Returns `Ok(true)` only for the call that
    /// performed the transition.
    pub fn begin_close(&self) -> Result<bool, LifecycleError> {
        let prev = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                if bits & INITIALIZED == 0 {
                    None
                } else {
                    Some(bits | CLOSED)
                }
            })
            .map_err(|_| LifecycleError::NotInitialized(self.component))?;
        Ok(prev & CLOSED == 0)
    }
}

//! Capability lifecycle: the state machine that gates access to a resource.
//!
//! ```text
//! unknown | unavailable -> initializing -> available | unavailable
//! available <-> restricted
//! (any but terminating) -> terminating -> unavailable
//! ```
//!
//! Every transition goes through [`Lifecycle`], which rejects moves the table
//! does not allow. Owners hold it under their own lock.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityState {
    #[default]
    Unknown,
    Initializing,
    Available,
    /// Temporarily lost an external precondition; work in flight continues.
    Restricted,
    Unavailable,
    Terminating,
}

impl CapabilityState {
    /// Is `self -> to` a legal transition?
    pub fn can_transition_to(self, to: CapabilityState) -> bool {
        use CapabilityState::*;
        match (self, to) {
            (Unknown | Unavailable, Initializing) => true,
            (Initializing, Available | Unavailable) => true,
            (Available, Restricted) | (Restricted, Available) => true,
            (Terminating, Unavailable) => true,
            (from, Terminating) => from != Terminating,
            _ => false,
        }
    }
}

impl fmt::Display for CapabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CapabilityState::Unknown => "unknown",
            CapabilityState::Initializing => "initializing",
            CapabilityState::Available => "available",
            CapabilityState::Restricted => "restricted",
            CapabilityState::Unavailable => "unavailable",
            CapabilityState::Terminating => "terminating",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("capability is {0}, not available")]
    NotAvailable(CapabilityState),

    #[error("invalid capability transition {from} -> {to}")]
    InvalidTransition {
        from: CapabilityState,
        to: CapabilityState,
    },
}

/// Current capability state plus the legal ways out of it.
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: CapabilityState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CapabilityState {
        self.state
    }

    pub fn is_available(&self) -> bool {
        self.state == CapabilityState::Available
    }

    /// Fail fast unless the capability is `available`.
    pub fn ensure_available(&self) -> Result<(), LifecycleError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(LifecycleError::NotAvailable(self.state))
        }
    }

    pub fn begin_activation(&mut self) -> Result<(), LifecycleError> {
        self.transition(CapabilityState::Initializing)
    }

    pub fn complete_activation(&mut self) -> Result<(), LifecycleError> {
        self.transition(CapabilityState::Available)
    }

    pub fn fail_activation(&mut self) -> Result<(), LifecycleError> {
        self.transition(CapabilityState::Unavailable)
    }

    /// `available -> restricted`; no-op if already restricted.
    pub fn restrict(&mut self) -> Result<(), LifecycleError> {
        if self.state == CapabilityState::Restricted {
            return Ok(());
        }
        self.transition(CapabilityState::Restricted)
    }

    /// `restricted -> available`; no-op if already available.
    pub fn restore(&mut self) -> Result<(), LifecycleError> {
        if self.is_available() {
            return Ok(());
        }
        self.transition(CapabilityState::Available)
    }

    pub fn begin_termination(&mut self) -> Result<(), LifecycleError> {
        self.transition(CapabilityState::Terminating)
    }

    pub fn finish_termination(&mut self) -> Result<(), LifecycleError> {
        self.transition(CapabilityState::Unavailable)
    }

    fn transition(&mut self, to: CapabilityState) -> Result<(), LifecycleError> {
        if !self.state.can_transition_to(to) {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(from = %self.state, to = %to, "capability transition");
        self.state = to;
        Ok(())
    }
}

/// A resource-backed subsystem driven by the capability lifecycle.
#[async_trait]
pub trait Capability: Send + Sync {
    type Error;

    fn state(&self) -> CapabilityState;

    /// `unknown | unavailable -> initializing -> available`, or
    /// `-> unavailable` with the acquisition error returned.
    async fn activate(&self) -> Result<(), Self::Error>;

    /// `any -> terminating -> unavailable`, releasing the resource before
    /// returning.
    fn deactivate(&self);
}

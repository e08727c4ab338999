//! Connection lifecycle state machine.
//!
//! Provides a `ConnectionPhase` enum that models the handshake and
//! session lifecycle of one device connection, with validated
//! transitions that return `Result` instead of panicking.

use std::time::Instant;

use crate::error::EmberError;

// ── ConnectionPhase ──────────────────────────────────────────────

/// The current phase of a device connection.
///
/// ```text
///  Uninitialized ──► HelloSent ──► LoginSent ──► Connected
///        ▲               │             │             │
///        └───────────────┴─────────────┴─────────────┘
///                    (any disconnect)
/// ```
///
/// Inbound messages are interpreted according to the current phase,
/// not their own kind: the same wire kind is only legitimate in
/// specific phases.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionPhase {
    /// No active connection. Initial / terminal state.
    #[default]
    Uninitialized,

    /// TCP link is up; greeting sent, awaiting acknowledgement.
    HelloSent,

    /// Greeting acknowledged; login sent, awaiting the result.
    LoginSent,

    /// Login accepted; ready for application traffic.
    Connected {
        /// When the connection entered the `Connected` state.
        since: Instant,
    },
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::HelloSent => write!(f, "HelloSent"),
            Self::LoginSent => write!(f, "LoginSent"),
            Self::Connected { .. } => write!(f, "Connected"),
        }
    }
}

impl ConnectionPhase {
    /// Returns `true` when the session is established and application
    /// messages may be sent.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Returns `true` when no connection attempt is in flight.
    pub fn is_uninitialized(&self) -> bool {
        matches!(self, Self::Uninitialized)
    }

    /// How long the connection has been established.
    ///
    /// Returns `None` for any other phase.
    pub fn connected_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Connected { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `HelloSent`.
    ///
    /// Valid from: `Uninitialized`.
    pub fn hello_sent(&mut self) -> Result<(), EmberError> {
        match self {
            Self::Uninitialized => {
                *self = Self::HelloSent;
                Ok(())
            }
            _ => Err(EmberError::ProtocolViolation(
                "cannot send greeting: not in Uninitialized state",
            )),
        }
    }

    /// Transition to `LoginSent`.
    ///
    /// Valid from: `HelloSent`.
    pub fn login_sent(&mut self) -> Result<(), EmberError> {
        match self {
            Self::HelloSent => {
                *self = Self::LoginSent;
                Ok(())
            }
            _ => Err(EmberError::ProtocolViolation(
                "cannot send login: greeting not acknowledged",
            )),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `LoginSent`.
    pub fn login_accepted(&mut self) -> Result<(), EmberError> {
        match self {
            Self::LoginSent => {
                *self = Self::Connected {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(EmberError::ProtocolViolation(
                "cannot complete login: no login in flight",
            )),
        }
    }

    /// Collapse back to `Uninitialized` regardless of current phase.
    ///
    /// Every disconnect path ends here.
    pub fn reset(&mut self) {
        *self = Self::Uninitialized;
    }
}

// ── Tests ────────────────────────────────────────────────────────

use std::fmt;

use crate::verifier::ConnectionState;

/// Crate error type that carries the process exit code.
///
/// Only a clean interrupt exits 0; everything else signals the external
/// supervisor to restart the process after its fixed delay.
#[derive(Debug)]
pub enum KeeperError {
    /// Missing or invalid configuration input (fatal, never retried)
    Config(String),
    /// Token injection or dashboard confirmation failed (fatal for this run)
    Login(String),
    /// The extension check resolved to anything but fully connected
    Connection(ConnectionState),
    /// No live viewport remains in the session
    ViewportLoss(String),
    /// A bounded wait for an element elapsed without it appearing
    ElementNotFound(String),
    /// External interrupt requested a clean shutdown
    Interrupted,
}

impl KeeperError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            KeeperError::Interrupted => 0,
            _ => 1,
        }
    }

    /// Whether an error chain bottoms out in a session-fatal viewport loss
    pub fn is_viewport_loss(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<KeeperError>(),
            Some(KeeperError::ViewportLoss(_))
        )
    }
}

impl fmt::Display for KeeperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeeperError::Config(msg) => write!(f, "Configuration error: {}", msg),
            KeeperError::Login(msg) => write!(f, "Login failed: {}", msg),
            KeeperError::Connection(state) => {
                write!(f, "Extension is not connected (status: {})", state)
            }
            KeeperError::ViewportLoss(msg) => {
                write!(f, "No usable viewport remains: {}", msg)
            }
            KeeperError::ElementNotFound(selector) => {
                write!(f, "Timed out waiting for element: {}", selector)
            }
            KeeperError::Interrupted => write!(f, "Interrupted, shutting down"),
        }
    }
}

impl std::error::Error for KeeperError {}

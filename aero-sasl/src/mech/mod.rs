//! The boundary between the protocol engine and the SASL mechanisms. The
//! engine never looks at credentials, it only drives these state machines.

pub mod login;
pub mod plain;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::AuthRequest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send this challenge and wait for the client's response
    Challenge(Vec<u8>),
    /// Authentication succeeded
    Done,
}

/// Server half of one authentication attempt.
#[async_trait]
pub trait ServerMechanism: Send {
    /// Begins or continues the exchange. `response` is `None` when the client
    /// sent no initial response, which differs from an empty one. An error
    /// means the attempt failed.
    async fn next(&mut self, response: Option<&[u8]>) -> Result<Step>;
}

/// Client half of one authentication attempt.
pub trait ClientMechanism: Send {
    /// Mechanism name and optional initial response.
    fn start(&mut self) -> Result<(String, Option<Vec<u8>>)>;

    fn next(&mut self, challenge: &[u8]) -> Result<Vec<u8>>;
}

/// Builds a fresh [`ServerMechanism`] for each `AUTH` naming its mechanism.
pub type MechanismFactory = Arc<dyn Fn(&AuthRequest) -> Box<dyn ServerMechanism> + Send + Sync>;

/// Credential check used by the password based mechanisms.
#[async_trait]
pub trait LoginProvider: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<()>;
}

pub type ArcLoginProvider = Arc<dyn LoginProvider>;

#[async_trait]
impl<F> LoginProvider for F
where
    F: Fn(&str, &str) -> Result<()> + Send + Sync,
{
    async fn login(&self, username: &str, password: &str) -> Result<()> {
        self(username, password)
    }
}

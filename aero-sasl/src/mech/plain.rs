//! PLAIN SASL - https://datatracker.ietf.org/doc/html/rfc4616

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::{ArcLoginProvider, ClientMechanism, ServerMechanism, Step};
use crate::decode::auth_plain;

pub const NAME: &str = "PLAIN";
const EMPTY_AUTHZ: &[u8] = &[];

pub struct PlainServer {
    login: ArcLoginProvider,
}

impl PlainServer {
    pub fn new(login: ArcLoginProvider) -> Self {
        Self { login }
    }
}

#[async_trait]
impl ServerMechanism for PlainServer {
    async fn next(&mut self, response: Option<&[u8]>) -> Result<Step> {
        let data = match response {
            // Ask for the credentials with an empty challenge
            None => return Ok(Step::Challenge(vec![])),
            Some(data) => data,
        };

        // Check that we can extract user's login+pass
        let (ubin, pbin) = match auth_plain(data) {
            Ok(([], (authz, user, pass))) if authz == user || authz == EMPTY_AUTHZ => (user, pass),
            Ok(_) => bail!("Impersonating user is not supported"),
            Err(e) => bail!("Could not parse the SASL PLAIN data chunk: {}", e),
        };

        // Try to convert it to UTF-8
        let (user, password) = match (std::str::from_utf8(ubin), std::str::from_utf8(pbin)) {
            (Ok(u), Ok(p)) => (u, p),
            _ => bail!("Username or password contain invalid UTF-8 characters"),
        };

        self.login
            .login(user, password)
            .await
            .map_err(|e| anyhow!("login failed for {}: {}", user, e))?;
        tracing::debug!(user = %user, "PLAIN login succeeded");
        Ok(Step::Done)
    }
}

pub struct PlainClient {
    authz: String,
    username: String,
    password: String,
}

impl PlainClient {
    pub fn new(
        authz: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            authz: authz.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl ClientMechanism for PlainClient {
    fn start(&mut self) -> Result<(String, Option<Vec<u8>>)> {
        let ir = [
            self.authz.as_bytes(),
            self.username.as_bytes(),
            self.password.as_bytes(),
        ]
        .join(&0u8);
        Ok((NAME.to_string(), Some(ir)))
    }

    fn next(&mut self, _challenge: &[u8]) -> Result<Vec<u8>> {
        bail!("sasl: unexpected server challenge")
    }
}

//! The obsolete but widespread LOGIN mechanism: the server asks for the
//! username then the password, each in its own challenge.

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::{ArcLoginProvider, ClientMechanism, ServerMechanism, Step};

pub const NAME: &str = "LOGIN";
const USERNAME_CHALLENGE: &[u8] = b"Username:";
const PASSWORD_CHALLENGE: &[u8] = b"Password:";

enum State {
    Init,
    AwaitUsername,
    AwaitPassword(String),
    Done,
}

pub struct LoginServer {
    login: ArcLoginProvider,
    state: State,
}

impl LoginServer {
    pub fn new(login: ArcLoginProvider) -> Self {
        Self {
            login,
            state: State::Init,
        }
    }
}

fn utf8(data: &[u8], what: &str) -> Result<String> {
    match std::str::from_utf8(data) {
        Ok(v) => Ok(v.to_string()),
        Err(_) => bail!("{} contains invalid UTF-8 characters", what),
    }
}

#[async_trait]
impl ServerMechanism for LoginServer {
    async fn next(&mut self, response: Option<&[u8]>) -> Result<Step> {
        match (std::mem::replace(&mut self.state, State::Done), response) {
            (State::Init, None) | (State::Init, Some([])) => {
                self.state = State::AwaitUsername;
                Ok(Step::Challenge(USERNAME_CHALLENGE.to_vec()))
            }
            // Username given as initial response
            (State::Init, Some(user)) | (State::AwaitUsername, Some(user)) => {
                self.state = State::AwaitPassword(utf8(user, "username")?);
                Ok(Step::Challenge(PASSWORD_CHALLENGE.to_vec()))
            }
            (State::AwaitPassword(user), Some(pass)) => {
                let password = utf8(pass, "password")?;
                if let Err(e) = self.login.login(&user, &password).await {
                    bail!("login failed for {}: {}", user, e);
                }
                tracing::debug!(user = %user, "LOGIN login succeeded");
                Ok(Step::Done)
            }
            _ => bail!("unexpected LOGIN step"),
        }
    }
}

pub struct LoginClient {
    username: String,
    password: String,
    password_sent: bool,
}

impl LoginClient {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            password_sent: false,
        }
    }
}

impl ClientMechanism for LoginClient {
    fn start(&mut self) -> Result<(String, Option<Vec<u8>>)> {
        self.password_sent = false;
        Ok((NAME.to_string(), Some(self.username.as_bytes().to_vec())))
    }

    fn next(&mut self, _challenge: &[u8]) -> Result<Vec<u8>> {
        if self.password_sent {
            bail!("sasl: unexpected server challenge");
        }
        self.password_sent = true;
        Ok(self.password.as_bytes().to_vec())
    }
}

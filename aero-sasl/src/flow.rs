use crate::codec::Line;
use crate::decode::{base64, base64_enc};
use crate::error::{Error, Result};
use crate::fail::AuthFail;
use crate::mech::{ServerMechanism, Step};
use crate::server::Registry;
use crate::types::AuthRequest;

const UNSUPPORTED_MECHANISM: &str = "unsupported mechanism";
const AUTHENTICATION_FAILED: &str = "authentication failed";

/// Server side of the authentication exchange on one connection, once the
/// handshake is done. Only one attempt is in flight at a time: an `OK` or a
/// `FAIL` brings the connection back to [`State::AwaitAuth`].
pub enum State {
    AwaitAuth,
    AwaitResponse {
        request: AuthRequest,
        session: Box<dyn ServerMechanism>,
    },
}

impl State {
    pub fn new() -> Self {
        Self::AwaitAuth
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AwaitAuth => "await-auth",
            Self::AwaitResponse { .. } => "await-response",
        }
    }

    /// Consume one client line and compute the single reply it calls for.
    /// Errors are fatal for the connection: no reply must be sent.
    pub async fn progress(&mut self, line: Line, registry: &Registry) -> Result<Line> {
        let (request, mut session, response) = match std::mem::replace(self, Self::AwaitAuth) {
            Self::AwaitAuth => {
                let request = AuthRequest::parse(line.expect("AUTH", 3)?)?;
                tracing::debug!(id=%request.id, mechanism=%request.mechanism, service=%request.service, "New authentication request");

                let factory = match registry.get(&request.mechanism) {
                    Some(f) => f,
                    None => {
                        tracing::warn!(mechanism=%request.mechanism, "Unsupported Authentication Mechanism");
                        return Ok(AuthFail::new(request.id, UNSUPPORTED_MECHANISM).to_line());
                    }
                };
                let session = factory(&request);
                let response = request.initial_response.clone();
                (request, session, response)
            }
            Self::AwaitResponse { request, session } => {
                let mut params = line.expect("CONT", 2)?;
                // Check that ID matches
                if params[0] != request.id {
                    return Err(Error::RequestIdMismatch {
                        sent: request.id,
                        received: params.swap_remove(0),
                    });
                }
                let response = base64(&params[1])?;
                (request, session, Some(response))
            }
        };

        match session.next(response.as_deref()).await {
            Ok(Step::Challenge(challenge)) => {
                let reply = Line::new("CONT")
                    .param(&request.id)
                    .param(base64_enc(&challenge));
                *self = Self::AwaitResponse { request, session };
                Ok(reply)
            }
            Ok(Step::Done) => {
                tracing::info!(id=%request.id, mechanism=%request.mechanism, service=%request.service, "Authentication succeeded");
                Ok(Line::new("OK").param(request.id))
            }
            Err(e) => {
                tracing::warn!(id=%request.id, mechanism=%request.mechanism, err=?e, "Authentication failed");
                Ok(AuthFail::new(request.id, AUTHENTICATION_FAILED).to_line())
            }
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

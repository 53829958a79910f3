use std::fmt;

use crate::codec::Line;
use crate::decode::key_value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailCode {
    /// This is a temporary internal failure, e.g. connection was lost to SQL database.
    TempFail,
    /// Authentication succeeded, but authorization failed (master user's password was ok, but destination user was not ok).
    AuthzFail,
    /// User is disabled (password may or may not have been correct)
    UserDisabled,
    /// User's password has expired.
    PassExpired,
    /// Any other `code=` value, kept verbatim
    Other(String),
}

impl FailCode {
    pub fn from_token(token: &str) -> Self {
        match token {
            "temp_fail" => Self::TempFail,
            "authz_fail" => Self::AuthzFail,
            "user_disabled" => Self::UserDisabled,
            "pass_expired" => Self::PassExpired,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Self::TempFail => "temp_fail",
            Self::AuthzFail => "authz_fail",
            Self::UserDisabled => "user_disabled",
            Self::PassExpired => "pass_expired",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for FailCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Outcome of a rejected authentication, as carried by a `FAIL` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthFail {
    pub request_id: String,
    pub code: Option<FailCode>,
    pub reason: Option<String>,
}

impl fmt::Display for AuthFail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dovecot-sasl: authentication failed")?;
        if let Some(reason) = &self.reason {
            write!(f, ": {}", reason)?;
        }
        match &self.code {
            Some(code) => write!(f, " (code={})", code),
            None => f.write_str(" (code=)"),
        }
    }
}

impl std::error::Error for AuthFail {}

fn is_safe(value: &str) -> bool {
    !value.is_empty() && !value.contains(&['\t', '\n'][..])
}

impl AuthFail {
    pub fn new(request_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            code: None,
            reason: Some(reason.into()),
        }
    }

    pub fn with_code(mut self, code: FailCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Parse `FAIL` parameters: `<id> [key=value...]`. Pairs are applied in
    /// order, the last assignment to the code or the reason wins.
    pub fn parse(params: &[String]) -> Self {
        let (request_id, pairs) = match params.split_first() {
            Some((id, pairs)) => (id.clone(), pairs),
            None => return Self::default(),
        };

        let mut af = Self {
            request_id,
            ..Self::default()
        };
        for p in pairs {
            match key_value(p) {
                // A bare `reason` or `code` carries nothing
                ("reason", Some(reason)) => {
                    af.reason = Some(reason.to_string()).filter(|r| !r.is_empty())
                }
                ("code", Some(code)) => {
                    af.code = Some(code)
                        .filter(|c| !c.is_empty())
                        .map(FailCode::from_token)
                }

                // Legacy, 2.2 codes.
                ("temp", _) => af.code = Some(FailCode::TempFail),
                ("authz", _) => af.code = Some(FailCode::AuthzFail),
                ("user_disabled", _) => af.code = Some(FailCode::UserDisabled),
                ("pass_expired", _) => af.code = Some(FailCode::PassExpired),
                _ => (),
            }
        }
        af
    }

    /// Values containing a framing delimiter are dropped, never escaped.
    pub fn format(&self) -> Vec<String> {
        // The id slot is always there, even empty, so the pairs keep their place
        let mut params = vec![self.request_id.clone()];
        if let Some(reason) = self.reason.as_deref().filter(|r| is_safe(r)) {
            params.push(format!("reason={}", reason));
        }
        if let Some(code) = self.code.as_ref().map(FailCode::token).filter(|c| is_safe(c)) {
            params.push(format!("code={}", code));
        }
        params
    }

    pub fn to_line(&self) -> Line {
        Line::new("FAIL").params(self.format())
    }
}

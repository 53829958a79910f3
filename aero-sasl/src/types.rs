use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use crate::decode::{base64, key_value, number, port};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
}

impl Version {
    /// The only version spoken here. Both sides check that they support the
    /// same major version and disconnect otherwise; minor can be ignored.
    pub const CURRENT: Version = Version { major: 1, minor: 1 };

    /// Validate the `VERSION` parameters sent by `peer` ("client" or "server").
    pub fn negotiate(params: &[String], peer: &'static str) -> Result<Version> {
        let (major, minor) = match params {
            [major, minor, ..] => (major, minor),
            _ => {
                return Err(Error::MissingParams {
                    command: "VERSION".into(),
                    got: params.len(),
                })
            }
        };

        if number(major) != Some(Self::CURRENT.major) {
            return Err(Error::IncompatibleVersion {
                peer,
                major: major.clone(),
                minor: minor.clone(),
            });
        }
        let minor = number(minor)
            .ok_or_else(|| Error::MalformedLine(format!("bad minor version {:?}", minor)))?;

        Ok(Version {
            major: Self::CURRENT.major,
            minor,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// -----------------------------------------------------------------
//
// MECHANISM CATALOG
//
// -----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Anonymous authentication
    Anonymous,
    /// Transfers plaintext passwords
    PlainText,
    /// Subject to passive (dictionary) attack
    Dictionary,
    /// Subject to active (non-dictionary) attack
    Active,
    /// Provides forward secrecy between sessions
    ForwardSecrecy,
    /// Provides mutual authentication
    MutualAuth,
    /// Don't advertise this as available SASL mechanism (eg. APOP)
    Private,
}

impl Capability {
    /// Wire order used when formatting a `MECH` line.
    pub const ALL: [Capability; 7] = [
        Self::Anonymous,
        Self::PlainText,
        Self::Dictionary,
        Self::Active,
        Self::ForwardSecrecy,
        Self::MutualAuth,
        Self::Private,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::PlainText => "plaintext",
            // Dovecot spells it this way on the wire
            Self::Dictionary => "dictonary",
            Self::Active => "active",
            Self::ForwardSecrecy => "forward-secrecy",
            Self::MutualAuth => "mutual-auth",
            Self::Private => "private",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.token() == token)
    }
}

/// Security properties advertised for one mechanism in a `MECH` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mechanism {
    pub anonymous: bool,
    pub plaintext: bool,
    pub dictionary: bool,
    pub active: bool,
    pub forward_secrecy: bool,
    pub mutual_auth: bool,
    pub private: bool,
}

impl Mechanism {
    pub fn with(caps: &[Capability]) -> Self {
        let mut mech = Self::default();
        for c in caps {
            *mech.flag_mut(*c) = true;
        }
        mech
    }

    fn flag_mut(&mut self, cap: Capability) -> &mut bool {
        match cap {
            Capability::Anonymous => &mut self.anonymous,
            Capability::PlainText => &mut self.plaintext,
            Capability::Dictionary => &mut self.dictionary,
            Capability::Active => &mut self.active,
            Capability::ForwardSecrecy => &mut self.forward_secrecy,
            Capability::MutualAuth => &mut self.mutual_auth,
            Capability::Private => &mut self.private,
        }
    }

    pub fn has(&self, cap: Capability) -> bool {
        match cap {
            Capability::Anonymous => self.anonymous,
            Capability::PlainText => self.plaintext,
            Capability::Dictionary => self.dictionary,
            Capability::Active => self.active,
            Capability::ForwardSecrecy => self.forward_secrecy,
            Capability::MutualAuth => self.mutual_auth,
            Capability::Private => self.private,
        }
    }

    /// Parse `MECH` parameters. Unknown capabilities are skipped so that
    /// newer servers keep working with us.
    pub fn parse(params: &[String]) -> Result<(String, Mechanism)> {
        let (name, caps) = params.split_first().ok_or(Error::MissingMechanismName)?;
        if name.is_empty() {
            return Err(Error::MissingMechanismName);
        }

        let mut mech = Mechanism::default();
        for cap in caps.iter().filter_map(|c| Capability::from_token(c)) {
            *mech.flag_mut(cap) = true;
        }
        Ok((name.clone(), mech))
    }

    pub fn format(&self, name: &str) -> Vec<String> {
        std::iter::once(name.to_string())
            .chain(
                Capability::ALL
                    .into_iter()
                    .filter(|c| self.has(*c))
                    .map(|c| c.token().to_string()),
            )
            .collect()
    }
}

/// What each side learnt during the handshake. Built once per connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Version announced by the peer
    pub version: Version,
    /// CPID and SPID are the client and server process identifiers.
    pub cpid: String,
    pub spid: String,
    /// Server process-specific unique connection identifier.
    pub cuid: String,
    /// Connection-specific 128 bit cookie in hex. Absent with protocol 1.0 servers.
    pub cookie: Option<String>,
    pub mechanisms: HashMap<String, Mechanism>,
}

// -----------------------------------------------------------------
//
// AUTHENTICATION REQUESTS
//
// -----------------------------------------------------------------

/// A parsed `AUTH` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRequest {
    /// Connection-specific request identifier chosen by the client.
    pub id: String,
    /// A SASL mechanism (eg. LOGIN, PLAIN, etc.)
    pub mechanism: String,
    /// Service requesting authentication, eg. pop3, imap, smtp.
    pub service: String,
    /// Unique session ID. Mainly used for logging.
    pub session: Option<String>,

    pub local_ip: Option<IpAddr>,
    pub local_port: Option<u16>,
    pub remote_ip: Option<IpAddr>,
    pub remote_port: Option<u16>,

    /// Remote user has secured transport to auth client (e.g. localhost, SSL, TLS).
    pub secured: bool,
    /// Remote user has presented a valid SSL certificate.
    pub valid_client_cert: bool,
    /// Ignore auth penalty tracking for this request
    pub no_penalty: bool,
    /// Username taken from client's SSL certificate.
    pub cert_username: bool,

    /// Initial response for authentication mechanism, already decoded.
    pub initial_response: Option<Vec<u8>>,
}

fn required<'a>(key: &str, value: Option<&'a str>) -> Result<&'a str> {
    value.ok_or_else(|| Error::MalformedRequest(format!("missing value for {}", key)))
}

fn ip(key: &str, value: Option<&str>) -> Result<IpAddr> {
    let value = required(key, value)?;
    value
        .parse()
        .map_err(|_| Error::MalformedRequest(format!("malformed {}: {}", key, value)))
}

fn request_port(key: &str, value: Option<&str>) -> Result<u16> {
    let value = required(key, value)?;
    port(value).ok_or_else(|| Error::MalformedRequest(format!("malformed {}: {}", key, value)))
}

impl AuthRequest {
    /// Parse the parameters of an `AUTH` command: `<id> <mechanism> [options...]`.
    pub fn parse(params: Vec<String>) -> Result<Self> {
        if params.len() < 3 {
            return Err(Error::MalformedRequest("not enough params".into()));
        }

        let mut params = params.into_iter();
        let mut req = AuthRequest {
            id: params.next().unwrap_or_default(),
            mechanism: params.next().unwrap_or_default(),
            ..AuthRequest::default()
        };
        // Nothing could be correlated with the reply
        if req.id.is_empty() {
            return Err(Error::MalformedRequest("empty request id".into()));
        }

        for p in params {
            match key_value(&p) {
                ("resp", value) => {
                    let data = base64(required("resp", value)?).map_err(|e| {
                        Error::MalformedRequest(format!("malformed initial response: {}", e))
                    })?;
                    req.initial_response = Some(data);
                }
                ("service", value) => req.service = required("service", value)?.to_string(),
                ("session", value) => req.session = Some(required("session", value)?.to_string()),
                ("secured", _) => req.secured = true,
                ("valid-client-cert", _) => req.valid_client_cert = true,
                ("no-penalty", _) => req.no_penalty = true,
                ("cert_username", _) => req.cert_username = true,
                ("lip", value) => req.local_ip = Some(ip("lip", value)?),
                ("rip", value) => req.remote_ip = Some(ip("rip", value)?),
                ("lport", value) => req.local_port = Some(request_port("lport", value)?),
                ("rport", value) => req.remote_port = Some(request_port("rport", value)?),
                (key, _) => tracing::trace!(option = key, "Ignoring unknown AUTH option"),
            }
        }

        Ok(req)
    }
}

/// Optional parameters a client attaches to its `AUTH` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOption {
    Secured,
    ValidClientCert,
    NoPenalty,
    CertUsername,
    Session(String),
    LocalIp(IpAddr),
    LocalPort(u16),
    RemoteIp(IpAddr),
    RemotePort(u16),
}

impl fmt::Display for AuthOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secured => f.write_str("secured"),
            Self::ValidClientCert => f.write_str("valid-client-cert"),
            Self::NoPenalty => f.write_str("no-penalty"),
            Self::CertUsername => f.write_str("cert_username"),
            Self::Session(id) => write!(f, "session={}", id),
            Self::LocalIp(ip) => write!(f, "lip={}", ip),
            Self::LocalPort(port) => write!(f, "lport={}", port),
            Self::RemoteIp(ip) => write!(f, "rip={}", ip),
            Self::RemotePort(port) => write!(f, "rport={}", port),
        }
    }
}

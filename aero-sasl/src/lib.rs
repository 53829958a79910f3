//! Seek compatibility with the Dovecot Authentication Protocol, on both the
//! server and the client side.
//!
//! ## Trace
//!
//! ```text
//! S: VERSION	1	1
//! S: SPID	15
//! S: CUID	17654
//! S: COOKIE	f56692bee41f471ed01bd83520025305
//! S: MECH	PLAIN	plaintext
//! S: MECH	LOGIN	plaintext
//! S: DONE
//! C: VERSION	1	1
//! C: CPID	1
//!
//! C: AUTH	1	PLAIN	service=smtp	secured	resp=AGZveGNwcAAxMjM0
//! S: OK	1
//!
//! C: AUTH	2	PLAIN	service=smtp
//! S: CONT	2
//! C: CONT	2	AGZveGNwcAA1Njc4
//! S: FAIL	2	reason=authentication failed
//!
//! C: AUTH	42	LOGIN	service=smtp
//! S: CONT	42	VXNlcm5hbWU6
//! C: CONT	42	b64User
//! S: CONT	42	UGFzc3dvcmQ6
//! C: CONT	42	b64Pass
//! S: OK	42
//! ```
//!
//! ## RFC References
//!
//! PLAIN SASL - https://datatracker.ietf.org/doc/html/rfc4616
//!
//!
//! ## Dovecot References
//!
//! https://doc.dovecot.org/developer_manual/design/auth_protocol/
//! https://doc.dovecot.org/configuration_manual/authentication/authentication_mechanisms/#authentication-authentication-mechanisms
//! https://doc.dovecot.org/configuration_manual/howto/postfix_and_dovecot_sasl/#howto-postfix-and-dovecot-sasl

pub mod client;
pub mod codec;
pub mod decode;
pub mod encode;
pub mod error;
pub mod fail;
pub mod flow;
pub mod handshake;
pub mod mech;
pub mod server;
pub mod types;

pub use client::{AuthRes, Client};
pub use error::{Error, Result};
pub use fail::{AuthFail, FailCode};
pub use server::{Registry, Server};
pub use types::{AuthOption, AuthRequest, Capability, ConnectionInfo, Mechanism, Version};

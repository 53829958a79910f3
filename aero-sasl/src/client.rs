use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::codec::{Line, LineCodec};
use crate::decode::{base64, base64_enc, key_value};
use crate::error::{Error, Result};
use crate::fail::AuthFail;
use crate::handshake;
use crate::mech::ClientMechanism;
use crate::types::{AuthOption, ConnectionInfo};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRes {
    /// Carries the `user=` value when the server sent one
    Success(Option<String>),
    Failed(AuthFail),
}

impl AuthRes {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Authentication client, e.g. a mail server delegating SASL to Dovecot.
pub struct Client<S> {
    codec: LineCodec<S>,
    info: ConnectionInfo,
    rid: u64,
}

impl Client<TcpStream> {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        Self::new(TcpStream::connect(addr).await?).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S> {
    pub async fn new(stream: S) -> Result<Self> {
        let mut codec = LineCodec::new(stream);
        let info = handshake::client(&mut codec, &std::process::id().to_string()).await?;
        Ok(Self {
            codec,
            info,
            rid: 0,
        })
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Run one authentication with `mech` for `service`.
    ///
    /// A rejection by the server is a successful call returning
    /// [`AuthRes::Failed`]; an `Err` means the connection can't be used anymore.
    pub async fn authenticate<M>(
        &mut self,
        service: &str,
        mech: &mut M,
        options: &[AuthOption],
    ) -> Result<AuthRes>
    where
        M: ClientMechanism + ?Sized,
    {
        let (name, ir) = mech.start().map_err(Error::Mechanism)?;
        if !self.info.mechanisms.contains_key(&name) {
            return Err(Error::UnsupportedMechanism(name));
        }

        self.rid += 1;
        let rid = self.rid.to_string();

        let mut auth = Line::new("AUTH")
            .param(&rid)
            .param(name)
            .param(format!("service={}", service))
            .params(options.iter().map(ToString::to_string));
        if let Some(ir) = ir {
            auth = auth.param(format!("resp={}", base64_enc(&ir)));
        }
        self.codec.write(&auth).await?;

        loop {
            let Line { command, params } = self.codec.read().await?;
            match params.first() {
                None => return Err(Error::MissingParams { command, got: 0 }),
                Some(id) if *id != rid => {
                    return Err(Error::RequestIdMismatch {
                        sent: rid,
                        received: id.clone(),
                    })
                }
                Some(_) => (),
            }

            match command.as_str() {
                "OK" => {
                    let user = params[1..].iter().find_map(|p| match key_value(p) {
                        ("user", Some(user)) => Some(user.to_string()),
                        _ => None,
                    });
                    tracing::debug!(id=%rid, "Authentication succeeded");
                    return Ok(AuthRes::Success(user));
                }
                "FAIL" => {
                    let af = AuthFail::parse(&params);
                    tracing::debug!(id=%rid, reason=?af.reason, code=?af.code, "Authentication failed");
                    return Ok(AuthRes::Failed(af));
                }
                "CONT" => {
                    let challenge = params.get(1).ok_or(Error::MissingParams {
                        command: command.clone(),
                        got: params.len(),
                    })?;
                    let challenge = base64(challenge)?;
                    let response = mech.next(&challenge).map_err(Error::Mechanism)?;
                    self.codec
                        .write(&Line::new("CONT").param(&rid).param(base64_enc(&response)))
                        .await?;
                }
                _ => return Err(Error::UnexpectedCommand(command)),
            }
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.codec.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fail::FailCode;
    use crate::mech::login::LoginClient;
    use crate::mech::plain::PlainClient;
    use tokio::io::{
        duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
    };

    const ANNOUNCE: &str = concat!(
        "VERSION\t1\t2\n",
        "MECH\tPLAIN\tplaintext\n",
        "MECH\tLOGIN\tplaintext\n",
        "SPID\t15\n",
        "CUID\t17654\n",
        "COOKIE\tf56692bee41f471ed01bd83520025305\n",
        "DONE\n"
    );

    type Peer = (Lines<BufReader<ReadHalf<DuplexStream>>>, WriteHalf<DuplexStream>);

    async fn setup() -> (Client<DuplexStream>, Peer) {
        let (a, b) = duplex(4096);
        let (rd, mut wr) = tokio::io::split(b);
        let mut lines = BufReader::new(rd).lines();
        wr.write_all(ANNOUNCE.as_bytes()).await.unwrap();

        let client = Client::new(a).await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "VERSION\t1\t1");
        assert!(lines.next_line().await.unwrap().unwrap().starts_with("CPID\t"));
        (client, (lines, wr))
    }

    #[tokio::test]
    async fn success_with_initial_response() {
        let (mut client, (mut lines, mut wr)) = setup().await;
        assert_eq!(client.info().spid, "15");

        wr.write_all(b"OK\t1\tuser=alice\n").await.unwrap();
        let res = client
            .authenticate(
                "smtp",
                &mut PlainClient::new("", "alice", "hunter2"),
                &[AuthOption::Secured, AuthOption::RemotePort(4242)],
            )
            .await
            .unwrap();

        assert_eq!(res, AuthRes::Success(Some("alice".into())));
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "AUTH\t1\tPLAIN\tservice=smtp\tsecured\trport=4242\tresp=AGFsaWNlAGh1bnRlcjI="
        );
    }

    #[tokio::test]
    async fn continuation_then_failure() {
        let (mut client, (mut lines, mut wr)) = setup().await;

        wr.write_all(b"CONT\t1\tUGFzc3dvcmQ6\nFAIL\t1\treason=nope\ttemp\n")
            .await
            .unwrap();
        let res = client
            .authenticate("imap", &mut LoginClient::new("alice", "hunter2"), &[])
            .await
            .unwrap();

        match res {
            AuthRes::Failed(af) => {
                assert_eq!(af.request_id, "1");
                assert_eq!(af.reason.as_deref(), Some("nope"));
                assert_eq!(af.code, Some(FailCode::TempFail));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "AUTH\t1\tLOGIN\tservice=imap\tresp=YWxpY2U="
        );
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "CONT\t1\taHVudGVyMg==");
    }

    #[tokio::test]
    async fn request_ids_increase() {
        let (mut client, (mut lines, mut wr)) = setup().await;

        wr.write_all(b"FAIL\t1\nOK\t2\n").await.unwrap();
        let mut mech = PlainClient::new("", "alice", "hunter2");
        assert!(!client
            .authenticate("smtp", &mut mech, &[])
            .await
            .unwrap()
            .is_success());
        assert!(client
            .authenticate("smtp", &mut mech, &[])
            .await
            .unwrap()
            .is_success());

        assert!(lines.next_line().await.unwrap().unwrap().starts_with("AUTH\t1\t"));
        assert!(lines.next_line().await.unwrap().unwrap().starts_with("AUTH\t2\t"));
    }

    #[tokio::test]
    async fn unsupported_mechanism_is_checked_locally() {
        struct Anonymous;
        impl ClientMechanism for Anonymous {
            fn start(&mut self) -> anyhow::Result<(String, Option<Vec<u8>>)> {
                Ok(("ANONYMOUS".into(), None))
            }
            fn next(&mut self, _: &[u8]) -> anyhow::Result<Vec<u8>> {
                Ok(vec![])
            }
        }

        let (mut client, (_lines, _wr)) = setup().await;
        assert!(matches!(
            client.authenticate("smtp", &mut Anonymous, &[]).await,
            Err(Error::UnsupportedMechanism(m)) if m == "ANONYMOUS"
        ));
    }

    #[tokio::test]
    async fn mismatched_request_id_is_fatal() {
        let (mut client, (_lines, mut wr)) = setup().await;

        wr.write_all(b"OK\t7\n").await.unwrap();
        let res = client
            .authenticate("smtp", &mut PlainClient::new("", "a", "b"), &[])
            .await;
        assert!(matches!(
            res,
            Err(Error::RequestIdMismatch { sent, received }) if sent == "1" && received == "7"
        ));
    }

    #[tokio::test]
    async fn unexpected_reply_is_fatal() {
        let (mut client, (_lines, mut wr)) = setup().await;

        wr.write_all(b"DONE\t1\n").await.unwrap();
        let res = client
            .authenticate("smtp", &mut PlainClient::new("", "a", "b"), &[])
            .await;
        assert!(matches!(res, Err(Error::UnexpectedCommand(c)) if c == "DONE"));
    }

    #[tokio::test]
    async fn broken_channel_is_an_error() {
        let (mut client, (_lines, mut wr)) = setup().await;

        wr.shutdown().await.unwrap();
        let res = client
            .authenticate("smtp", &mut PlainClient::new("", "a", "b"), &[])
            .await;
        assert!(matches!(res, Err(Error::Closed)));
    }
}

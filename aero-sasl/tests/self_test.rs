use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use aero_sasl::mech::login::{self, LoginClient, LoginServer};
use aero_sasl::mech::plain::{self, PlainClient, PlainServer};
use aero_sasl::mech::ArcLoginProvider;
use aero_sasl::{
    AuthOption, AuthRes, Capability, Client, Error, FailCode, Mechanism, Registry, Server,
};

fn authenticator() -> ArcLoginProvider {
    Arc::new(|user: &str, pass: &str| {
        if user == "foxcpp" && pass == "1234" {
            return Ok(());
        }
        bail!("nope")
    })
}

async fn start_server() -> (Arc<Server>, String, JoinHandle<aero_sasl::Result<()>>) {
    let plain_login = authenticator();
    let login_login = authenticator();
    let registry = Registry::builder()
        .mechanism(
            plain::NAME,
            Mechanism::with(&[Capability::PlainText]),
            move |_| Box::new(PlainServer::new(plain_login.clone())),
        )
        .mechanism(
            login::NAME,
            Mechanism::with(&[Capability::PlainText]),
            move |_| Box::new(LoginServer::new(login_login.clone())),
        )
        .build();
    let server = Arc::new(Server::new(registry));

    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap().to_string();
    let handle = tokio::spawn(server.clone().serve(tcp));
    (server, addr, handle)
}

struct RawPeer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    wr: OwnedWriteHalf,
}

impl RawPeer {
    async fn connect(addr: &str) -> Self {
        let (rd, wr) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            lines: BufReader::new(rd).lines(),
            wr,
        }
    }

    async fn read_announce(&mut self) -> Vec<String> {
        let mut announced = vec![];
        loop {
            match self.lines.next_line().await.unwrap() {
                Some(l) if l == "DONE" => return announced,
                Some(l) => announced.push(l),
                None => panic!("closed during handshake"),
            }
        }
    }

    async fn send(&mut self, raw: &str) {
        self.wr.write_all(raw.as_bytes()).await.unwrap();
    }

    /// `None` once the server dropped the connection, whether it ended
    /// with a FIN or a reset.
    async fn recv(&mut self) -> Option<String> {
        self.lines.next_line().await.ok().flatten()
    }
}

#[tokio::test]
async fn sasl_plain() {
    let (server, addr, _handle) = start_server().await;
    let mut cl = Client::connect(addr.as_str()).await.unwrap();
    assert!(cl.info().mechanisms.contains_key("PLAIN"));
    assert!(cl.info().cookie.is_some());

    let res = cl
        .authenticate(
            "smtp",
            &mut PlainClient::new("", "foxcpp", "1234"),
            &[AuthOption::Secured],
        )
        .await
        .unwrap();
    assert_eq!(res, AuthRes::Success(None));

    // Same connection, wrong password: a typed rejection, not a broken channel
    let res = cl
        .authenticate(
            "smtp",
            &mut PlainClient::new("", "foxcpp", "5678"),
            &[AuthOption::Secured],
        )
        .await
        .unwrap();
    match res {
        AuthRes::Failed(af) => {
            assert_eq!(af.request_id, "2");
            assert_eq!(af.reason.as_deref(), Some("authentication failed"));
            assert_eq!(af.code, None);
        }
        other => panic!("Expected an auth fail, got {:?}", other),
    }

    let res = cl
        .authenticate("imap", &mut LoginClient::new("foxcpp", "1234"), &[])
        .await
        .unwrap();
    assert!(res.is_success());

    cl.close().await.unwrap();
    server.close();
}

#[tokio::test]
async fn wire_replies() {
    let (server, addr, _handle) = start_server().await;
    let mut peer = RawPeer::connect(&addr).await;

    let announced = peer.read_announce().await;
    assert_eq!(announced[0], "VERSION\t1\t1");
    assert!(announced[1].starts_with("SPID\t"));
    assert!(announced[2].starts_with("CUID\t"));
    assert!(announced[3].starts_with("COOKIE\t"));
    assert_eq!(announced[3].len(), "COOKIE\t".len() + 32);
    assert!(announced.contains(&"MECH\tPLAIN\tplaintext".to_string()));

    peer.send("VERSION\t1\t1\nCPID\t1\n").await;
    peer.send("AUTH\t1\tPLAIN\tservice=smtp\tsecured\tresp=AGZveGNwcAAxMjM0\n").await;
    assert_eq!(peer.recv().await.as_deref(), Some("OK\t1"));

    peer.send("AUTH\t2\tPLAIN\tservice=smtp\tsecured\tresp=AGZveGNwcAA1Njc4\n").await;
    assert_eq!(
        peer.recv().await.as_deref(),
        Some("FAIL\t2\treason=authentication failed")
    );

    server.close();
}

#[tokio::test]
async fn unsupported_mechanism() {
    let (server, addr, _handle) = start_server().await;
    let mut peer = RawPeer::connect(&addr).await;
    peer.read_announce().await;
    peer.send("VERSION\t1\t1\nCPID\t1\n").await;

    peer.send("AUTH\t1\tCRAM-MD5\tservice=smtp\n").await;
    assert_eq!(
        peer.recv().await.as_deref(),
        Some("FAIL\t1\treason=unsupported mechanism")
    );

    // The connection is still usable
    peer.send("AUTH\t2\tPLAIN\tservice=smtp\n").await;
    assert_eq!(peer.recv().await.as_deref(), Some("CONT\t2\t"));
    peer.send("CONT\t2\tAGZveGNwcAAxMjM0\n").await;
    assert_eq!(peer.recv().await.as_deref(), Some("OK\t2"));

    server.close();
}

#[tokio::test]
async fn incompatible_client_version() {
    let (server, addr, _handle) = start_server().await;
    let mut peer = RawPeer::connect(&addr).await;
    peer.read_announce().await;

    // One write, the server may reset the connection as soon as it reads VERSION
    let auth = "AUTH\t1\tPLAIN\tservice=smtp\tresp=AGZveGNwcAAxMjM0\n";
    peer.send(&format!("VERSION\t2\t0\nCPID\t1\n{}", auth)).await;
    assert_eq!(peer.recv().await, None);

    server.close();
}

#[tokio::test]
async fn malformed_initial_response_closes_silently() {
    let (server, addr, _handle) = start_server().await;
    let mut peer = RawPeer::connect(&addr).await;
    peer.read_announce().await;
    peer.send("VERSION\t1\t1\nCPID\t1\n").await;

    peer.send("AUTH\t1\tPLAIN\tservice=smtp\tresp=%%%notbase64\n").await;
    assert_eq!(peer.recv().await, None);

    server.close();
}

#[tokio::test]
async fn client_rejects_unknown_mechanism_locally() {
    struct CramMd5;
    impl aero_sasl::mech::ClientMechanism for CramMd5 {
        fn start(&mut self) -> anyhow::Result<(String, Option<Vec<u8>>)> {
            Ok(("CRAM-MD5".into(), None))
        }
        fn next(&mut self, _: &[u8]) -> anyhow::Result<Vec<u8>> {
            bail!("not implemented")
        }
    }

    let (server, addr, _handle) = start_server().await;
    let mut cl = Client::connect(addr.as_str()).await.unwrap();
    assert!(matches!(
        cl.authenticate("smtp", &mut CramMd5, &[]).await,
        Err(Error::UnsupportedMechanism(_))
    ));

    // Nothing was sent, the connection still works
    let res = cl
        .authenticate("smtp", &mut PlainClient::new("", "foxcpp", "1234"), &[])
        .await
        .unwrap();
    assert!(res.is_success());
    server.close();
}

#[tokio::test]
async fn close_unblocks_connections_and_listener() {
    let (server, addr, handle) = start_server().await;
    let mut peer = RawPeer::connect(&addr).await;
    peer.read_announce().await;
    peer.send("VERSION\t1\t1\nCPID\t1\n").await;

    server.close();
    server.close();

    assert_eq!(peer.recv().await, None);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("serve must return after close")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn fail_codes_reach_the_client() {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();

    let fake = tokio::spawn(async move {
        let (socket, _) = tcp.accept().await.unwrap();
        let (rd, mut wr) = socket.into_split();
        let mut lines = BufReader::new(rd).lines();
        wr.write_all(b"VERSION\t1\t2\nSPID\t1\nCUID\t1\nCOOKIE\t00\nMECH\tPLAIN\tplaintext\nDONE\n")
            .await
            .unwrap();
        lines.next_line().await.unwrap(); // VERSION
        lines.next_line().await.unwrap(); // CPID
        lines.next_line().await.unwrap(); // AUTH
        wr.write_all(b"FAIL\t1\tuser=foxcpp\tcode=user_disabled\treason=Account disabled\n")
            .await
            .unwrap();
        lines.next_line().await.unwrap()
    });

    let mut cl = Client::connect(addr).await.unwrap();
    let res = cl
        .authenticate("smtp", &mut PlainClient::new("", "foxcpp", "1234"), &[])
        .await
        .unwrap();
    assert_eq!(
        res,
        AuthRes::Failed(aero_sasl::AuthFail {
            request_id: "1".into(),
            code: Some(FailCode::UserDisabled),
            reason: Some("Account disabled".into()),
        })
    );

    cl.close().await.unwrap();
    assert_eq!(fake.await.unwrap(), None);
}

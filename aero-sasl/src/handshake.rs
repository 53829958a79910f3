use std::collections::HashMap;

use rand::prelude::*;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{Line, LineCodec};
use crate::error::{Error, Result};
use crate::types::{ConnectionInfo, Mechanism, Version};

fn version_line() -> Line {
    Line::new("VERSION")
        .param(Version::CURRENT.major.to_string())
        .param(Version::CURRENT.minor.to_string())
}

fn generate_cookie() -> String {
    let mut cookie = [0u8; 16];
    thread_rng().fill(&mut cookie);
    hex::encode(cookie)
}

/// Server side: announce ourselves and our mechanisms, then wait for the
/// client's `VERSION` and `CPID`.
pub async fn server<S>(
    codec: &mut LineCodec<S>,
    spid: &str,
    cuid: &str,
    mechanisms: &HashMap<String, Mechanism>,
) -> Result<ConnectionInfo>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    codec.write(&version_line()).await?;
    codec.write(&Line::new("SPID").param(spid)).await?;
    codec.write(&Line::new("CUID").param(cuid)).await?;

    let cookie = generate_cookie();
    codec.write(&Line::new("COOKIE").param(&cookie)).await?;

    for (name, mech) in mechanisms.iter() {
        codec.write(&Line::new("MECH").params(mech.format(name))).await?;
    }
    codec.write(&Line::new("DONE")).await?;

    let version = Version::negotiate(&codec.read_expect("VERSION", 2).await?, "client")?;
    let cpid = codec.read_expect("CPID", 1).await?.swap_remove(0);
    tracing::debug!(client_version=%version, cpid=%cpid, cuid=%cuid, "Handshake done");

    Ok(ConnectionInfo {
        version,
        cpid,
        spid: spid.to_string(),
        cuid: cuid.to_string(),
        cookie: Some(cookie),
        mechanisms: mechanisms.clone(),
    })
}

fn first(command: &str, params: Vec<String>) -> Result<String> {
    Line {
        command: command.to_string(),
        params,
    }
    .expect(command, 1)
    .map(|mut p| p.swap_remove(0))
}

/// Client side: send our `VERSION` and `CPID` right away, then accept the
/// server's announcements in whatever order they come, up to `DONE`.
pub async fn client<S>(codec: &mut LineCodec<S>, cpid: &str) -> Result<ConnectionInfo>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    codec.write(&version_line()).await?;
    codec.write(&Line::new("CPID").param(cpid)).await?;

    let mut version = None;
    let mut spid = None;
    let mut cuid = None;
    let mut cookie = None;
    let mut mechanisms = HashMap::new();

    loop {
        let Line { command, params } = codec.read().await?;
        match command.as_str() {
            "DONE" => break,
            "VERSION" => version = Some(Version::negotiate(&params, "server")?),
            "SPID" => spid = Some(first(&command, params)?),
            "CUID" => cuid = Some(first(&command, params)?),
            "COOKIE" => cookie = Some(first(&command, params)?),
            "MECH" => {
                let (name, mech) = Mechanism::parse(&params)?;
                mechanisms.insert(name, mech);
            }
            _ => return Err(Error::UnexpectedCommand(command)),
        }
    }

    let version: Version = version.ok_or(Error::MissingHandshakeField("VERSION"))?;
    // Cookies were introduced with protocol 1.1
    if version.minor != 0 && cookie.is_none() {
        return Err(Error::MissingHandshakeField("COOKIE"));
    }
    let info = ConnectionInfo {
        version,
        cpid: cpid.to_string(),
        spid: spid.ok_or(Error::MissingHandshakeField("SPID"))?,
        cuid: cuid.ok_or(Error::MissingHandshakeField("CUID"))?,
        cookie,
        mechanisms,
    };
    tracing::debug!(server_version=%info.version, spid=%info.spid, mechanisms=info.mechanisms.len(), "Handshake done");

    Ok(info)
}

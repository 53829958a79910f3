use tokio_util::bytes::{BufMut, BytesMut};

use crate::codec::Line;
use crate::error::{Error, Result};

pub trait Encode {
    fn encode(&self, out: &mut BytesMut) -> Result<()>;
}

fn tab_enc(out: &mut BytesMut) {
    out.put(&[0x09][..])
}

fn lf_enc(out: &mut BytesMut) {
    out.put(&[0x0A][..])
}

fn is_delimiter(c: u8) -> bool {
    c == 0x09 || c == 0x0a // TAB or LF
}

fn token_enc(token: &str, out: &mut BytesMut) -> Result<()> {
    if token.bytes().any(is_delimiter) {
        return Err(Error::MalformedLine(format!(
            "{:?} contains a framing delimiter",
            token
        )));
    }
    out.put(token.as_bytes());
    Ok(())
}

impl Encode for Line {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        if self.command.is_empty() {
            return Err(Error::MalformedLine("empty command".into()));
        }
        token_enc(&self.command, out)?;
        for p in self.params.iter() {
            tab_enc(out);
            token_enc(p, out)?;
        }
        lf_enc(out);
        Ok(())
    }
}

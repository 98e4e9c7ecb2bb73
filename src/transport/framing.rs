//! JSON-per-newline framing, shared by the name broker, the `Receiver`
//! reader loop, and `Sender`.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::message::Message;

/// Frames larger than this are rejected rather than buffered without bound.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Read one newline-terminated frame. Returns `Ok(None)` on a clean EOF
/// with no partial data (the peer closed the connection).
///
/// Bytes are checked against [`MAX_FRAME_BYTES`] as each chunk arrives
/// rather than after the whole line has been buffered, so an unterminated
/// oversized line is rejected without first accumulating it in memory.
pub async fn read_message<R: AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<Option<Message>> {
    let mut line: Vec<u8> = Vec::new();
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            if line.is_empty() {
                return Ok(None);
            }
            break;
        }
        let newline_at = buf.iter().position(|&b| b == b'\n');
        let take = newline_at.unwrap_or(buf.len());
        let consumed = newline_at.map(|pos| pos + 1).unwrap_or(buf.len());
        if line.len() + take > MAX_FRAME_BYTES {
            reader.consume(consumed);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "frame too large"));
        }
        line.extend_from_slice(&buf[..take]);
        reader.consume(consumed);
        if newline_at.is_some() {
            break;
        }
    }

    let value: serde_json::Value = match serde_json::from_slice(&line) {
        Ok(v) => v,
        Err(e) => return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
    };
    match Message::from_value(value) {
        Some(msg) => Ok(Some(msg)),
        None => Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "frame missing tag")),
    }
}

pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, msg: &Message) -> std::io::Result<()> {
    let mut body = serde_json::to_string(&msg.clone().into_value())?;
    body.push('\n');
    writer.write_all(body.as_bytes()).await
}

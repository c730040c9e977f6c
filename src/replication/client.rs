//! Replica-side handshake client: dials the configured master and performs
//! the `PING` / `REPLCONF` / `PSYNC` sequence before the caller ever
//! accepts a client connection. Runs as one more cooperatively-scheduled
//! task on the single-threaded runtime rather than a dedicated OS thread.

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::resp::{self, Message, ParseError};

use super::rdb::{parse_rdb_frame, RdbFrameError};

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("failed to connect to master {0}:{1}: {2}")]
    Connect(String, u16, std::io::Error),
    #[error("io error during replication handshake: {0}")]
    Io(#[from] std::io::Error),
    #[error("master sent a malformed reply during handshake: {0}")]
    Protocol(String),
}

pub struct ReplicationClientConfig {
    pub master_host: String,
    pub master_port: u16,
    pub my_listening_port: u16,
}

/// The result of a successful handshake: the live stream (already past
/// PSYNC and the RDB transfer, ready to be folded into the event loop as
/// an upstream-master connection), the RDB payload (accepted but not
/// loaded into the keyspace), and any bytes the master had already
/// pipelined past the RDB frame in the same read.
pub struct HandshakeOutcome {
    pub stream: TcpStream,
    pub rdb: Vec<u8>,
    pub leftover: Vec<u8>,
}

async fn send_array(stream: &mut TcpStream, parts: &[&[u8]]) -> Result<(), HandshakeError> {
    let items = parts
        .iter()
        .map(|p| Message::bulk_string(p.to_vec()))
        .collect();
    let msg = Message::array(items);
    stream.write_all(&resp::serialize(&msg)).await?;
    Ok(())
}

async fn read_message(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
) -> Result<Message<'static>, HandshakeError> {
    loop {
        if !buf.is_empty() {
            match resp::parse(buf) {
                Ok((msg, consumed)) => {
                    let owned = msg.into_owned();
                    let _ = buf.split_to(consumed);
                    return Ok(owned);
                }
                Err(ParseError::Truncated) => {}
                Err(e) => return Err(HandshakeError::Protocol(e.to_string())),
            }
        }
        let mut chunk = [0u8; 512];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HandshakeError::Protocol(
                "master closed the connection mid-handshake".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn expect_simple_string(msg: &Message<'_>, expected_prefix: &str) -> Result<(), HandshakeError> {
    match msg.as_simple_str() {
        Some(s) if s.to_ascii_lowercase().starts_with(&expected_prefix.to_ascii_lowercase()) => {
            Ok(())
        }
        Some(s) => Err(HandshakeError::Protocol(format!(
            "expected a reply starting with {expected_prefix:?}, got {s:?}"
        ))),
        None => Err(HandshakeError::Protocol(
            "expected a simple-string reply".to_string(),
        )),
    }
}

/// Performs `PING` → `REPLCONF listening-port` → `REPLCONF capa psync2` →
/// `PSYNC ? -1` against the configured master, synchronously with respect
/// to the caller (the caller must finish this before accepting client
/// connections), then receives the RDB frame. Any deviation from the
/// expected replies is a protocol error and the caller should treat it as
/// a startup error.
pub async fn connect_and_handshake(
    cfg: &ReplicationClientConfig,
) -> Result<HandshakeOutcome, HandshakeError> {
    let mut stream = TcpStream::connect((cfg.master_host.as_str(), cfg.master_port))
        .await
        .map_err(|e| HandshakeError::Connect(cfg.master_host.clone(), cfg.master_port, e))?;
    let mut buf = BytesMut::with_capacity(512);

    send_array(&mut stream, &[b"PING"]).await?;
    let reply = read_message(&mut stream, &mut buf).await?;
    expect_simple_string(&reply, "PONG")?;

    let port_str = cfg.my_listening_port.to_string();
    send_array(
        &mut stream,
        &[b"REPLCONF", b"listening-port", port_str.as_bytes()],
    )
    .await?;
    let reply = read_message(&mut stream, &mut buf).await?;
    expect_simple_string(&reply, "OK")?;

    send_array(&mut stream, &[b"REPLCONF", b"capa", b"psync2"]).await?;
    let reply = read_message(&mut stream, &mut buf).await?;
    expect_simple_string(&reply, "OK")?;

    send_array(&mut stream, &[b"PSYNC", b"?", b"-1"]).await?;
    let reply = read_message(&mut stream, &mut buf).await?;
    expect_simple_string(&reply, "FULLRESYNC")?;

    let rdb = loop {
        match parse_rdb_frame(&buf) {
            Ok((rdb, consumed)) => {
                let _ = buf.split_to(consumed);
                break rdb;
            }
            Err(RdbFrameError::Truncated) => {
                let mut chunk = [0u8; 4096];
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(HandshakeError::Protocol(
                        "master closed the connection while sending the RDB payload".to_string(),
                    ));
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            Err(RdbFrameError::BadLengthHeader) => {
                return Err(HandshakeError::Protocol(
                    "malformed RDB frame after FULLRESYNC".to_string(),
                ));
            }
        }
    };

    Ok(HandshakeOutcome {
        stream,
        rdb,
        leftover: buf.to_vec(),
    })
}

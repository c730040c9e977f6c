//! The event loop core (component C5): a single `mpsc`-fed actor task owns
//! every connection and all server state; "edge" tasks (accept, one reader
//! per connection) never touch shared state, they only move bytes. Ground:
//! `SmallzooDev-codecrafters-redis-rust`'s `event.rs`/`event_handler.rs`/
//! `main.rs` pattern, generalized so the actor holds `ServerState` and the
//! connection registry directly instead of `Arc<RwLock<_>>` fields shared
//! with the edge tasks -- here nothing outside the actor task ever reaches
//! into server state, so no lock is needed at all.

use std::collections::HashMap;
use std::net::SocketAddr;

use anyhow::Context;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc;

use crate::clock::now_ms;
use crate::config::StartupConfig;
use crate::protocol::{command, resp};
use crate::replication::client::{connect_and_handshake, ReplicationClientConfig};
use crate::replication::manager::select_propagation_targets;
use crate::{log_info, log_warn};

use super::connection::{Connection, ConnectionError, MAX_READ_BUFFER_BYTES};
use super::dispatcher;
use super::state::ServerState;

const READ_CHUNK_BYTES: usize = 4096;

enum LoopEvent {
    Accepted {
        stream: TcpStream,
        is_upstream_master: bool,
        leftover: Vec<u8>,
    },
    Data {
        id: u64,
        bytes: Vec<u8>,
    },
    Closed {
        id: u64,
    },
}

/// Runs the server to completion. Never returns under normal operation
/// (graceful shutdown is out of scope); returns `Err` only for startup
/// failures (bind failure, or a failed replica handshake).
pub async fn run(config: StartupConfig) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::channel::<LoopEvent>(256);
    let mut server = ServerState::new(&config);
    let mut connections: HashMap<u64, Connection> = HashMap::new();

    if let Some(master) = config.replicaof.clone() {
        log_info!("connecting to master at {}:{}", master.host, master.port);
        let outcome = connect_and_handshake(&ReplicationClientConfig {
            master_host: master.host.clone(),
            master_port: master.port,
            my_listening_port: config.listen_port,
        })
        .await
        .with_context(|| format!("replica handshake with {}:{} failed", master.host, master.port))?;
        log_info!("full resync with {}:{} complete", master.host, master.port);
        tx.send(LoopEvent::Accepted {
            stream: outcome.stream,
            is_upstream_master: true,
            leftover: outcome.leftover,
        })
        .await
        .context("actor channel closed before startup finished")?;
    }

    let listener = bind_with_reuseaddr(config.listen_port)
        .await
        .with_context(|| format!("failed to bind 127.0.0.1:{}", config.listen_port))?;
    log_info!("listening on 127.0.0.1:{}", config.listen_port);

    tokio::spawn(accept_task(listener, tx.clone()));

    while let Some(event) = rx.recv().await {
        handle_event(&mut server, &mut connections, event, &tx).await;
    }

    Ok(())
}

async fn bind_with_reuseaddr(port: u16) -> std::io::Result<TcpListener> {
    let addr: SocketAddr = format!("127.0.0.1:{port}")
        .parse()
        .expect("127.0.0.1:<port> is always a valid socket address");
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(1024)
}

async fn accept_task(listener: TcpListener, tx: mpsc::Sender<LoopEvent>) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let sent = tx
                    .send(LoopEvent::Accepted {
                        stream,
                        is_upstream_master: false,
                        leftover: Vec::new(),
                    })
                    .await;
                if sent.is_err() {
                    return;
                }
            }
            Err(e) => log_warn!("accept failed: {e}"),
        }
    }
}

async fn reader_task(id: u64, mut read_half: OwnedReadHalf, tx: mpsc::Sender<LoopEvent>) {
    let mut chunk = [0u8; READ_CHUNK_BYTES];
    loop {
        match read_half.read(&mut chunk).await {
            Ok(0) | Err(_) => {
                let _ = tx.send(LoopEvent::Closed { id }).await;
                return;
            }
            Ok(n) => {
                if tx
                    .send(LoopEvent::Data {
                        id,
                        bytes: chunk[..n].to_vec(),
                    })
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }
    }
}

async fn handle_event(
    server: &mut ServerState,
    connections: &mut HashMap<u64, Connection>,
    event: LoopEvent,
    tx: &mpsc::Sender<LoopEvent>,
) {
    match event {
        LoopEvent::Accepted {
            stream,
            is_upstream_master,
            leftover,
        } => {
            let id = server.next_connection_id();
            let (read_half, write_half) = stream.into_split();
            let mut conn = Connection::new(id, write_half, is_upstream_master);
            let has_leftover = !leftover.is_empty();
            if has_leftover {
                conn.read_buffer.extend_from_slice(&leftover);
            }
            connections.insert(id, conn);
            tokio::spawn(reader_task(id, read_half, tx.clone()));
            if has_leftover {
                drain_connection(server, connections, id).await;
            }
        }
        LoopEvent::Data { id, bytes } => {
            match connections.get_mut(&id) {
                Some(conn) => {
                    conn.read_buffer.extend_from_slice(&bytes);
                    if conn.read_buffer.len() > MAX_READ_BUFFER_BYTES {
                        log_warn!("connection {id}: {}", ConnectionError::MessageTooLarge);
                        close_connection(connections, id).await;
                        return;
                    }
                }
                None => return,
            }
            drain_connection(server, connections, id).await;
        }
        LoopEvent::Closed { id } => close_connection(connections, id).await,
    }
}

/// Parses and dispatches every complete message currently sitting in a
/// connection's read buffer, performing the resulting writes in order,
/// stopping as soon as the buffer holds only a partial message.
async fn drain_connection(
    server: &mut ServerState,
    connections: &mut HashMap<u64, Connection>,
    id: u64,
) {
    loop {
        let now = now_ms();

        let parsed = {
            let conn = match connections.get(&id) {
                Some(c) => c,
                None => return,
            };
            match resp::parse(&conn.read_buffer) {
                Ok((msg, consumed)) => match command::from_message(&msg, now) {
                    Ok(request) => Ok((conn.read_buffer[..consumed].to_vec(), request, consumed)),
                    Err(e) => Err(ConnectionError::from(e)),
                },
                Err(resp::ParseError::Truncated) => return,
                Err(e) => Err(ConnectionError::from(e)),
            }
        };

        let (raw, request, consumed) = match parsed {
            Ok(triple) => triple,
            Err(err) => {
                log_warn!("connection {id}: {err}");
                close_connection(connections, id).await;
                return;
            }
        };

        let conn = match connections.get_mut(&id) {
            Some(c) => c,
            None => return,
        };
        let _ = conn.read_buffer.split_to(consumed);
        let outcome = dispatcher::dispatch(server, conn, request, &raw, now);

        if let Some(reply) = &outcome.reply {
            if conn.write_half.write_all(reply).await.is_err() {
                close_connection(connections, id).await;
                return;
            }
        }

        if let Some(extra) = &outcome.extra_send {
            let conn = match connections.get_mut(&id) {
                Some(c) => c,
                None => return,
            };
            if conn.write_half.write_all(extra).await.is_err() {
                close_connection(connections, id).await;
                return;
            }
        }

        if let Some(bytes) = outcome.propagate {
            propagate(connections, id, &bytes).await;
        }

        if outcome.close {
            close_connection(connections, id).await;
            return;
        }
    }
}

async fn propagate(connections: &mut HashMap<u64, Connection>, source_id: u64, bytes: &[u8]) {
    let candidates: Vec<(u64, bool)> = connections
        .iter()
        .map(|(id, conn)| (*id, conn.is_connected_replica()))
        .collect();
    let mut targets = select_propagation_targets(candidates);
    targets.retain(|id| *id != source_id);

    for id in targets {
        let failed = match connections.get_mut(&id) {
            Some(conn) => conn.write_half.write_all(bytes).await.is_err(),
            None => false,
        };
        if failed {
            close_connection(connections, id).await;
        }
    }
}

async fn close_connection(connections: &mut HashMap<u64, Connection>, id: u64) {
    if let Some(mut conn) = connections.remove(&id) {
        let _ = conn.write_half.shutdown().await;
    }
}

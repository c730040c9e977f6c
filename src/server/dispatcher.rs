//! The request dispatcher (component C6). A synchronous function: applies
//! a request to the keyspace and connection replication state, and returns
//! what the event loop must do next. Runs to completion between I/O
//! yields, per SPEC_FULL.md §4.5/§4.6. Ground: teacher's scattered
//! `handle_*` functions in `server/handler.rs`, consolidated into one
//! dispatch point so the upstream-master reply-suppression rule
//! (SPEC_FULL.md §4.7) lives in a single place instead of at each handler.

use crate::protocol::command::{is_write_command, Request};
use crate::protocol::resp::{self, Message};
use crate::replication::rdb::{empty_rdb, frame_rdb};
use crate::replication::state::HandshakeViolation;

use super::connection::Connection;
use super::state::{ServerRole, ServerState};

/// What the actor task must do after a synchronous dispatch call returns.
pub struct DispatchOutcome {
    /// Serialized reply to write back on the originating connection, if
    /// any (suppressed entirely for `UpstreamMaster`-role connections).
    pub reply: Option<Vec<u8>>,
    /// Raw bytes (the exact bytes the master parsed) to fan out verbatim
    /// to every currently `ConnectedReplica` connection.
    pub propagate: Option<Vec<u8>>,
    /// A follow-up send on the same connection, written immediately after
    /// `reply` (the RDB frame after `+FULLRESYNC`).
    pub extra_send: Option<Vec<u8>>,
    /// The connection must be closed after any sends above complete.
    pub close: bool,
}

impl DispatchOutcome {
    fn reply_only(msg: Message<'static>) -> Self {
        DispatchOutcome {
            reply: Some(resp::serialize(&msg)),
            propagate: None,
            extra_send: None,
            close: false,
        }
    }

    fn violation(detail: impl std::fmt::Display) -> Self {
        DispatchOutcome {
            reply: Some(resp::serialize(&Message::simple_string(format!(
                "ERR {detail}"
            )))),
            propagate: None,
            extra_send: None,
            close: true,
        }
    }
}

pub fn dispatch(
    server: &mut ServerState,
    conn: &mut Connection,
    request: Request,
    raw_bytes: &[u8],
    now_ms: i64,
) -> DispatchOutcome {
    let mut outcome = dispatch_inner(server, conn, request, raw_bytes, now_ms);
    if conn.is_upstream_master {
        // A replica's connection to its own master never talks back.
        outcome.reply = None;
        outcome.extra_send = None;
    }
    outcome
}

fn dispatch_inner(
    server: &mut ServerState,
    conn: &mut Connection,
    request: Request,
    raw_bytes: &[u8],
    now_ms: i64,
) -> DispatchOutcome {
    let is_write = is_write_command(&request);

    match request {
        Request::Ping(arg) => {
            if conn.replication_state == crate::replication::state::ReplicationState::None {
                conn.replication_state = conn
                    .replication_state
                    .on_ping()
                    .expect("ReplicationState::None always permits on_ping");
            }
            let reply = match arg {
                Some(bytes) => Message::bulk_string(bytes),
                None => Message::simple_string("PONG"),
            };
            DispatchOutcome::reply_only(reply)
        }
        Request::Echo(bytes) => DispatchOutcome::reply_only(Message::bulk_string(bytes)),
        Request::Get(key) => {
            let reply = match server.keyspace.get(&key, now_ms) {
                Some(value) => Message::bulk_string(value.to_vec()),
                None => Message::NullBulkString,
            };
            DispatchOutcome::reply_only(reply)
        }
        Request::Set {
            key,
            value,
            expire_at_ms,
        } => {
            match expire_at_ms {
                Some(deadline) => server.keyspace.put_with_expiry(&key, &value, deadline),
                None => server.keyspace.put(&key, &value),
            }
            let propagate = if is_write && server.role == ServerRole::Master {
                Some(raw_bytes.to_vec())
            } else {
                None
            };
            DispatchOutcome {
                reply: Some(resp::serialize(&Message::simple_string("OK"))),
                propagate,
                extra_send: None,
                close: false,
            }
        }
        Request::Info(sections) => {
            let wants_replication =
                sections.is_empty() || sections.iter().any(|s| s.eq_ignore_ascii_case("replication"));
            let body = if wants_replication {
                server.replication_info()
            } else {
                String::new()
            };
            DispatchOutcome::reply_only(Message::bulk_string(body.into_bytes()))
        }
        Request::Replconf(args) => {
            if server.role != ServerRole::Master {
                DispatchOutcome::violation(HandshakeViolation::NotMaster)
            } else {
                dispatch_replconf(conn, &args)
            }
        }
        Request::Psync { .. } => {
            if server.role != ServerRole::Master {
                DispatchOutcome::violation(HandshakeViolation::NotMaster)
            } else {
                dispatch_psync(server, conn)
            }
        }
        Request::Unknown => DispatchOutcome::reply_only(Message::simple_string("OK")),
    }
}

fn dispatch_replconf(conn: &mut Connection, args: &[Vec<u8>]) -> DispatchOutcome {
    let sub = match args.first() {
        Some(bytes) => String::from_utf8_lossy(bytes).to_ascii_lowercase(),
        None => return DispatchOutcome::reply_only(Message::simple_string("OK")),
    };

    match sub.as_str() {
        "listening-port" => {
            let port = match args
                .get(1)
                .and_then(|b| std::str::from_utf8(b).ok())
                .and_then(|s| s.parse::<u16>().ok())
            {
                Some(port) => port,
                None => {
                    return DispatchOutcome::violation("invalid listening-port value");
                }
            };
            match conn.replication_state.on_replconf_listening_port(port) {
                Ok(next) => {
                    conn.replication_state = next;
                    DispatchOutcome::reply_only(Message::simple_string("OK"))
                }
                Err(violation) => DispatchOutcome::violation(violation),
            }
        }
        "capa" => {
            let capa = args
                .get(1)
                .map(|b| String::from_utf8_lossy(b).to_string())
                .unwrap_or_default();
            match conn.replication_state.on_replconf_capa(capa) {
                Ok(next) => {
                    conn.replication_state = next;
                    DispatchOutcome::reply_only(Message::simple_string("OK"))
                }
                Err(violation) => DispatchOutcome::violation(violation),
            }
        }
        _ => DispatchOutcome::reply_only(Message::simple_string("OK")),
    }
}

/// Only ever called once the caller has confirmed `server.role ==
/// ServerRole::Master` -- a replica has no `master_replid` to hand out
/// (spec.md §3: `master_replid` is `Some` iff `role == master`).
fn dispatch_psync(server: &mut ServerState, conn: &mut Connection) -> DispatchOutcome {
    match conn.replication_state.on_psync() {
        Ok(next) => {
            conn.replication_state = next;
            let replid = server
                .master_replid
                .clone()
                .expect("server.role == Master implies master_replid is Some");
            let fullresync = Message::simple_string(format!("FULLRESYNC {replid} 0"));
            let rdb = frame_rdb(&empty_rdb());
            // The send of `reply` then `extra_send` happens synchronously,
            // back to back, before the actor processes this connection's
            // next event, so the "RDB send completes" transition can be
            // taken immediately rather than deferred to a completion
            // callback.
            conn.replication_state = conn
                .replication_state
                .on_rdb_sent()
                .expect("ReceivingSync always permits on_rdb_sent");
            DispatchOutcome {
                reply: Some(resp::serialize(&fullresync)),
                propagate: None,
                extra_send: Some(rdb),
                close: false,
            }
        }
        Err(violation) => DispatchOutcome::violation(violation),
    }
}

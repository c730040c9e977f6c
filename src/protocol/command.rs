//! The command model (component C2): lifts a parsed [`Message`] into a
//! typed, validated [`Request`]. Arity and value validation happen here so
//! that everything downstream can assume well-formed input.

use super::resp::Message;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("request arity does not match any supported form for this command")]
    InvalidRequestArity,
    #[error("request argument is invalid: {0}")]
    InvalidArgument(String),
    #[error("top-level message must be an array of simple/bulk strings")]
    MalformedRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Ping(Option<Vec<u8>>),
    Echo(Vec<u8>),
    Get(Vec<u8>),
    Set {
        key: Vec<u8>,
        value: Vec<u8>,
        expire_at_ms: Option<i64>,
    },
    Info(Vec<String>),
    Replconf(Vec<Vec<u8>>),
    Psync {
        replid: String,
        offset: i64,
    },
    Unknown,
}

fn bulk_bytes<'a>(msg: &'a Message<'_>) -> Result<&'a [u8], RequestError> {
    msg.as_bulk_bytes().ok_or(RequestError::MalformedRequest)
}

fn bulk_str<'a>(msg: &'a Message<'_>, what: &str) -> Result<&'a str, RequestError> {
    std::str::from_utf8(bulk_bytes(msg)?)
        .map_err(|_| RequestError::InvalidArgument(format!("{what} must be valid utf-8")))
}

/// Lifts a parsed top-level message into a [`Request`]. `now_ms` is the
/// wall-clock time at which the request's bytes finished arriving: `SET ...
/// PX n`'s absolute deadline is computed here, at parse time, not later at
/// dispatch time (spec-pinned so conformance timers that start at the `+OK`
/// reply see the deadline they expect).
pub fn from_message(msg: &Message<'_>, now_ms: i64) -> Result<Request, RequestError> {
    let items = match msg {
        Message::Array(items) => items,
        _ => return Err(RequestError::MalformedRequest),
    };

    let mut iter = items.iter();
    let head = iter.next().ok_or(RequestError::InvalidRequestArity)?;
    let name = bulk_str(head, "command name")?.to_ascii_uppercase();
    let rest: Vec<&Message<'_>> = iter.collect();

    match name.as_str() {
        "PING" => match rest.len() {
            0 => Ok(Request::Ping(None)),
            1 => Ok(Request::Ping(Some(bulk_bytes(rest[0])?.to_vec()))),
            _ => Err(RequestError::InvalidRequestArity),
        },
        "ECHO" => match rest.len() {
            1 => Ok(Request::Echo(bulk_bytes(rest[0])?.to_vec())),
            _ => Err(RequestError::InvalidRequestArity),
        },
        "GET" => match rest.len() {
            1 => {
                let key = bulk_bytes(rest[0])?;
                if key.is_empty() {
                    return Err(RequestError::InvalidArgument(
                        "GET key must not be empty".to_string(),
                    ));
                }
                Ok(Request::Get(key.to_vec()))
            }
            _ => Err(RequestError::InvalidRequestArity),
        },
        "SET" => match rest.len() {
            2 => Ok(Request::Set {
                key: bulk_bytes(rest[0])?.to_vec(),
                value: bulk_bytes(rest[1])?.to_vec(),
                expire_at_ms: None,
            }),
            4 => {
                let option = bulk_str(rest[2], "SET option")?;
                if !option.eq_ignore_ascii_case("px") {
                    return Err(RequestError::InvalidArgument(format!(
                        "unsupported SET option {option:?}"
                    )));
                }
                let millis_str = bulk_str(rest[3], "PX value")?;
                let millis: i64 = millis_str.parse().map_err(|_| {
                    RequestError::InvalidArgument(format!(
                        "PX value {millis_str:?} is not a signed 64-bit decimal"
                    ))
                })?;
                Ok(Request::Set {
                    key: bulk_bytes(rest[0])?.to_vec(),
                    value: bulk_bytes(rest[1])?.to_vec(),
                    expire_at_ms: Some(now_ms.saturating_add(millis)),
                })
            }
            _ => Err(RequestError::InvalidRequestArity),
        },
        "INFO" => {
            let mut sections = Vec::with_capacity(rest.len());
            for item in &rest {
                sections.push(bulk_str(item, "INFO section")?.to_string());
            }
            Ok(Request::Info(sections))
        }
        "REPLCONF" => {
            if rest.len() < 2 {
                return Err(RequestError::InvalidRequestArity);
            }
            let mut args = Vec::with_capacity(rest.len());
            for item in &rest {
                args.push(bulk_bytes(item)?.to_vec());
            }
            Ok(Request::Replconf(args))
        }
        "PSYNC" => match rest.len() {
            2 => {
                let replid = bulk_str(rest[0], "PSYNC replid")?.to_string();
                let offset_str = bulk_str(rest[1], "PSYNC offset")?;
                let offset: i64 = offset_str.parse().map_err(|_| {
                    RequestError::InvalidArgument(format!(
                        "PSYNC offset {offset_str:?} is not a signed 64-bit decimal"
                    ))
                })?;
                Ok(Request::Psync { replid, offset })
            }
            _ => Err(RequestError::InvalidRequestArity),
        },
        _ => Ok(Request::Unknown),
    }
}

/// True for requests that mutate the keyspace and must be propagated to
/// connected replicas when received by a master.
pub fn is_write_command(request: &Request) -> bool {
    matches!(request, Request::Set { .. })
}

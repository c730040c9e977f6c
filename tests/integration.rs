//! End-to-end scenarios driven over real loopback sockets against the
//! library's `run()` entry point, covering spec.md §8's literal scenarios.
//! Ground: the teacher has no `tests/` directory; this is the ambient test
//! tooling a socket-driven server calls for (SPEC_FULL.md §13).

use std::time::Duration;

use respd::config::StartupConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn spawn_server(config: StartupConfig) {
    tokio::spawn(async move {
        let _ = respd::run(config).await;
    });
    // Give the listener a moment to bind before tests connect.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn connect(port: u16) -> TcpStream {
    for _ in 0..20 {
        if let Ok(stream) = TcpStream::connect(("127.0.0.1", port)).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("could not connect to 127.0.0.1:{port}");
}

async fn read_exact_timeout(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for a reply")
        .expect("connection closed unexpectedly");
    buf
}

#[tokio::test]
async fn ping_replies_pong() {
    let port = free_port().await;
    spawn_server(StartupConfig {
        listen_port: port,
        replicaof: None,
    })
    .await;

    let mut stream = connect(port).await;
    stream.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
    let reply = read_exact_timeout(&mut stream, 7).await;
    assert_eq!(&reply, b"+PONG\r\n");
}

#[tokio::test]
async fn echo_returns_the_argument_as_a_bulk_string() {
    let port = free_port().await;
    spawn_server(StartupConfig {
        listen_port: port,
        replicaof: None,
    })
    .await;

    let mut stream = connect(port).await;
    stream
        .write_all(b"*2\r\n$4\r\nECHO\r\n$13\r\nHello, world!\r\n")
        .await
        .unwrap();
    let reply = read_exact_timeout(&mut stream, 20).await;
    assert_eq!(&reply, b"$13\r\nHello, world!\r\n");
}

#[tokio::test]
async fn set_then_get_round_trips() {
    let port = free_port().await;
    spawn_server(StartupConfig {
        listen_port: port,
        replicaof: None,
    })
    .await;

    let mut stream = connect(port).await;
    stream
        .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n")
        .await
        .unwrap();
    assert_eq!(&read_exact_timeout(&mut stream, 5).await, b"+OK\r\n");

    stream
        .write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
        .await
        .unwrap();
    assert_eq!(&read_exact_timeout(&mut stream, 7).await, b"$1\r\nv\r\n");
}

#[tokio::test]
async fn set_with_px_expires_the_key() {
    let port = free_port().await;
    spawn_server(StartupConfig {
        listen_port: port,
        replicaof: None,
    })
    .await;

    let mut stream = connect(port).await;
    stream
        .write_all(b"*5\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n$2\r\nPX\r\n$3\r\n100\r\n")
        .await
        .unwrap();
    assert_eq!(&read_exact_timeout(&mut stream, 5).await, b"+OK\r\n");

    tokio::time::sleep(Duration::from_millis(250)).await;

    stream
        .write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
        .await
        .unwrap();
    assert_eq!(&read_exact_timeout(&mut stream, 5).await, b"$-1\r\n");
}

#[tokio::test]
async fn info_replication_reports_master_role_and_replid() {
    let port = free_port().await;
    spawn_server(StartupConfig {
        listen_port: port,
        replicaof: None,
    })
    .await;

    let mut stream = connect(port).await;
    stream
        .write_all(b"*2\r\n$4\r\nINFO\r\n$11\r\nreplication\r\n")
        .await
        .unwrap();

    // Read the bulk-string header to learn the body length, then the body.
    let mut header = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        timeout(Duration::from_secs(2), stream.read_exact(&mut byte))
            .await
            .unwrap()
            .unwrap();
        header.push(byte[0]);
        if header.ends_with(b"\r\n") {
            break;
        }
    }
    let header_str = std::str::from_utf8(&header).unwrap();
    let len: usize = header_str
        .trim_start_matches('$')
        .trim_end()
        .parse()
        .unwrap();
    let body = read_exact_timeout(&mut stream, len + 2).await;
    let body = std::str::from_utf8(&body[..len]).unwrap();

    assert!(body.contains("role:master\n"));
    assert!(body.contains("master_repl_offset:0\n"));
    let replid_line = body
        .lines()
        .find(|l| l.starts_with("master_replid:"))
        .expect("replid line present");
    let replid = replid_line.trim_start_matches("master_replid:");
    assert_eq!(replid.len(), 40);
    assert!(replid.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn full_replica_handshake_yields_fullresync_and_empty_rdb() {
    let port = free_port().await;
    spawn_server(StartupConfig {
        listen_port: port,
        replicaof: None,
    })
    .await;

    let mut stream = connect(port).await;

    stream.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
    assert_eq!(&read_exact_timeout(&mut stream, 7).await, b"+PONG\r\n");

    stream
        .write_all(b"*3\r\n$8\r\nREPLCONF\r\n$14\r\nlistening-port\r\n$4\r\n6380\r\n")
        .await
        .unwrap();
    assert_eq!(&read_exact_timeout(&mut stream, 5).await, b"+OK\r\n");

    stream
        .write_all(b"*3\r\n$8\r\nREPLCONF\r\n$4\r\ncapa\r\n$6\r\npsync2\r\n")
        .await
        .unwrap();
    assert_eq!(&read_exact_timeout(&mut stream, 5).await, b"+OK\r\n");

    stream
        .write_all(b"*3\r\n$5\r\nPSYNC\r\n$1\r\n?\r\n$2\r\n-1\r\n")
        .await
        .unwrap();

    // +FULLRESYNC <40-hex-replid> 0\r\n
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        timeout(Duration::from_secs(2), stream.read_exact(&mut byte))
            .await
            .unwrap()
            .unwrap();
        line.push(byte[0]);
        if line.ends_with(b"\r\n") {
            break;
        }
    }
    let line = std::str::from_utf8(&line).unwrap();
    assert!(line.starts_with("+FULLRESYNC "));
    assert!(line.trim_end().ends_with(" 0"));

    // $88\r\n<88 bytes, no trailing CRLF>
    let mut rdb_header = Vec::new();
    loop {
        timeout(Duration::from_secs(2), stream.read_exact(&mut byte))
            .await
            .unwrap()
            .unwrap();
        rdb_header.push(byte[0]);
        if rdb_header.ends_with(b"\r\n") {
            break;
        }
    }
    assert_eq!(&rdb_header, b"$88\r\n");
    let rdb = read_exact_timeout(&mut stream, 88).await;
    assert_eq!(&rdb[0..5], b"REDIS");
}

#[tokio::test]
async fn unknown_command_is_accepted_with_ok() {
    let port = free_port().await;
    spawn_server(StartupConfig {
        listen_port: port,
        replicaof: None,
    })
    .await;

    let mut stream = connect(port).await;
    stream.write_all(b"*1\r\n$4\r\nNOOP\r\n").await.unwrap();
    assert_eq!(&read_exact_timeout(&mut stream, 5).await, b"+OK\r\n");
}

#[tokio::test]
async fn writes_on_a_master_propagate_to_a_connected_replica() {
    let port = free_port().await;
    spawn_server(StartupConfig {
        listen_port: port,
        replicaof: None,
    })
    .await;

    let mut replica = connect(port).await;
    replica.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
    read_exact_timeout(&mut replica, 7).await;
    replica
        .write_all(b"*3\r\n$8\r\nREPLCONF\r\n$14\r\nlistening-port\r\n$4\r\n6380\r\n")
        .await
        .unwrap();
    read_exact_timeout(&mut replica, 5).await;
    replica
        .write_all(b"*3\r\n$8\r\nREPLCONF\r\n$4\r\ncapa\r\n$6\r\npsync2\r\n")
        .await
        .unwrap();
    read_exact_timeout(&mut replica, 5).await;
    replica
        .write_all(b"*3\r\n$5\r\nPSYNC\r\n$1\r\n?\r\n$2\r\n-1\r\n")
        .await
        .unwrap();
    // Drain the +FULLRESYNC line and the 88-byte RDB frame.
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        timeout(Duration::from_secs(2), replica.read_exact(&mut byte))
            .await
            .unwrap()
            .unwrap();
        line.push(byte[0]);
        if line.ends_with(b"\r\n") {
            break;
        }
    }
    let mut rdb_header = Vec::new();
    loop {
        timeout(Duration::from_secs(2), replica.read_exact(&mut byte))
            .await
            .unwrap()
            .unwrap();
        rdb_header.push(byte[0]);
        if rdb_header.ends_with(b"\r\n") {
            break;
        }
    }
    read_exact_timeout(&mut replica, 88).await;

    let mut client = connect(port).await;
    client
        .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n")
        .await
        .unwrap();
    assert_eq!(&read_exact_timeout(&mut client, 5).await, b"+OK\r\n");

    let propagated = read_exact_timeout(&mut replica, 27).await;
    assert_eq!(&propagated, b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n");
}

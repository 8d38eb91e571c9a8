//! End-to-end tests over real loopback sockets.

use bytes::Bytes;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use turnstile::config::{Config, ConfigError};
use turnstile::gateway::{Application, Body, Environment, HelloWorld, StartResponse, chunks};
use turnstile::server::{Server, ShutdownHandle};

struct Running {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    join: JoinHandle<anyhow::Result<()>>,
}

impl Running {
    fn stop(self) {
        self.shutdown.shutdown();
        self.join.join().unwrap().unwrap();
    }
}

fn start<A: Application + Send + 'static>(app: A) -> Running {
    let cfg = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        poll_timeout_ms: 50,
        inherit_env: false,
        ..Config::default()
    };
    let server = Server::bind(&cfg, app).unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_handle();
    let join = thread::spawn(move || server.run());
    Running { addr, shutdown, join }
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

/// Reads until the server closes; a reset counts as a close.
fn read_all(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return out,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => return out,
            Err(e) => panic!("read failed: {}", e),
        }
    }
}

fn exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = connect(addr);
    stream.write_all(request).unwrap();
    read_all(&mut stream)
}

/// Echoes the request body and counts invocations.
#[derive(Clone, Default)]
struct Echo {
    calls: Arc<AtomicUsize>,
}

impl Application for Echo {
    fn call(&self, environ: &Environment, start: &mut StartResponse) -> anyhow::Result<Body> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let length = environ.body.len().to_string();
        start.start("200 OK", [("Content-Length", length.as_str())], None)?;
        Ok(chunks([environ.body.clone()]))
    }
}

/// Starts the response twice for "/bad", behaves otherwise.
struct Picky;

impl Application for Picky {
    fn call(&self, environ: &Environment, start: &mut StartResponse) -> anyhow::Result<Body> {
        if environ.path == "/bad" {
            start.start("200 OK", Vec::<(String, String)>::new(), None)?;
            start.start("200 OK", Vec::<(String, String)>::new(), None)?;
        }
        HelloWorld.call(environ, start)
    }
}

#[test]
fn test_get_request_round_trip() {
    let server = start(HelloWorld);

    let response = exchange(server.addr, b"GET /hello?x=1 HTTP/1.1\r\nHost: test\r\n\r\n");

    let text = String::from_utf8(response).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\nStatus: 200 OK\r\n"), "{}", text);
    assert!(text.ends_with("Content-Length: 14\r\n\r\nHello, World!\n"), "{}", text);
    server.stop();
}

#[test]
fn test_post_split_across_reads_dispatches_once_body_arrives() {
    let app = Echo::default();
    let calls = Arc::clone(&app.calls);
    let server = start(app);

    let mut stream = connect(server.addr);
    stream.write_all(b"POST / HTTP/1.1\r\nContent-Leng").unwrap();
    thread::sleep(Duration::from_millis(150));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    stream.write_all(b"th: 5\r\n\r\nhel").unwrap();
    thread::sleep(Duration::from_millis(150));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "dispatch waits for the whole body");

    stream.write_all(b"lo").unwrap();
    let response = read_all(&mut stream);

    assert!(response.ends_with(b"\r\n\r\nhello"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    server.stop();
}

#[test]
fn test_post_without_content_length_gets_no_response() {
    let app = Echo::default();
    let calls = Arc::clone(&app.calls);
    let server = start(app);

    let response = exchange(server.addr, b"POST /submit HTTP/1.1\r\nHost: test\r\n\r\n");

    assert!(response.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    server.stop();
}

#[test]
fn test_malformed_request_is_dropped() {
    let app = Echo::default();
    let calls = Arc::clone(&app.calls);
    let server = start(app);

    let response = exchange(server.addr, b"NONSENSE\r\n\r\n");

    assert!(response.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    server.stop();
}

#[test]
fn test_application_violation_only_affects_its_connection() {
    let server = start(Picky);

    let bad = exchange(server.addr, b"GET /bad HTTP/1.1\r\n\r\n");
    let good = exchange(server.addr, b"GET /good HTTP/1.1\r\n\r\n");

    assert!(bad.is_empty());
    assert!(good.ends_with(b"Hello, World!\n"));
    server.stop();
}

#[test]
fn test_concurrent_clients_are_each_served_once() {
    let app = Echo::default();
    let calls = Arc::clone(&app.calls);
    let server = start(app);
    let addr = server.addr;

    let clients: Vec<_> = (0..8)
        .map(|i| {
            thread::spawn(move || {
                let body = format!("client-{}", i);
                let request = format!(
                    "PUT /item/{} HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
                    i,
                    body.len(),
                    body
                );
                let response = exchange(addr, request.as_bytes());
                assert!(response.ends_with(body.as_bytes()));
            })
        })
        .collect();
    for client in clients {
        client.join().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 8);
    server.stop();
}

#[test]
fn test_peer_closing_early_does_not_disturb_others() {
    let server = start(HelloWorld);

    {
        let mut early = connect(server.addr);
        early.write_all(b"GET / HT").unwrap();
    }
    drop(connect(server.addr));

    let response = exchange(server.addr, b"GET / HTTP/1.1\r\n\r\n");
    assert!(response.ends_with(b"Hello, World!\n"));
    server.stop();
}

/// There is no per-request deadline: a client that stops mid-head keeps its
/// connection open indefinitely. This pins down that known gap while
/// checking that the stalled client does not block anyone else.
#[test]
fn test_incomplete_request_has_no_deadline() {
    let server = start(HelloWorld);

    let mut slow = connect(server.addr);
    slow.write_all(b"GET /slow HTTP/1.1\r\nHost: te").unwrap();

    let response = exchange(server.addr, b"GET /fast HTTP/1.1\r\n\r\n");
    assert!(response.ends_with(b"Hello, World!\n"));

    slow.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
    let mut buf = [0u8; 16];
    let err = slow.read(&mut buf).unwrap_err();
    assert!(matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    ));

    slow.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    slow.write_all(b"st\r\n\r\n").unwrap();
    assert!(read_all(&mut slow).ends_with(b"Hello, World!\n"));
    server.stop();
}

#[test]
fn test_large_response_is_drained_completely() {
    struct Big;

    impl Application for Big {
        fn call(&self, _environ: &Environment, start: &mut StartResponse) -> anyhow::Result<Body> {
            start.start("200 OK", [("Content-Length", "4194304")], None)?;
            Ok(chunks((0..64).map(|_| Bytes::from(vec![b'z'; 64 * 1024]))))
        }
    }

    let server = start(Big);

    let response = exchange(server.addr, b"GET /big HTTP/1.1\r\n\r\n");

    let body_start = response
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .unwrap()
        + 4;
    assert_eq!(response.len() - body_start, 4 * 1024 * 1024);
    assert!(response[body_start..].iter().all(|&b| b == b'z'));
    server.stop();
}

#[test]
fn test_shutdown_stops_the_reactor() {
    let server = start(HelloWorld);
    let _idle = connect(server.addr);

    server.stop();
}

#[test]
fn test_bind_rejects_unusable_config() {
    let zero_chunk = Config {
        port: 0,
        read_chunk: 0,
        inherit_env: false,
        ..Config::default()
    };
    let err = Server::bind(&zero_chunk, HelloWorld).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::Invalid { .. })
    ));

    let zero_head = Config {
        port: 0,
        max_head_bytes: 0,
        inherit_env: false,
        ..Config::default()
    };
    assert!(Server::bind(&zero_head, HelloWorld).is_err());
}

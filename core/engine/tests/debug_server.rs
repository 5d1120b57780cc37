//! Integration tests for the TCP debugger server.

#![allow(unused_crate_dependencies)]

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use boa_eval::debugger::{ConnectionState, DebugCallback, DebugServer, Debuggee, ServerState};
use boa_eval::{Error, Result, Runtime, RuntimeOptions};
use serde_json::{Value, json};

const TIMEOUT: Duration = Duration::from_secs(5);

/// A line based echo engine.
///
/// Commands are newline terminated. `ping` answers `pong`, `burst <n>`
/// answers `msg-0` .. `msg-<n-1>`, `flood <n>` answers `n` messages of 1 MiB,
/// anything else is echoed back.
#[derive(Default)]
struct EchoEngine {
    callback: Mutex<Option<DebugCallback>>,
    pending: Mutex<String>,
    commands: Mutex<VecDeque<String>>,
}

impl EchoEngine {
    fn emit(&self, message: String) {
        let callback = self.callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(message);
        }
    }

    fn attached(&self) -> bool {
        self.callback.lock().unwrap().is_some()
    }
}

impl Debuggee for EchoEngine {
    fn attach_debug_callback(&self, callback: DebugCallback) -> Result<()> {
        let mut slot = self.callback.lock().unwrap();
        if slot.is_some() {
            return Err(Error::CallbackAlreadyAttached);
        }
        *slot = Some(callback);
        Ok(())
    }

    fn detach_debug_callback(&self) {
        self.callback.lock().unwrap().take();
    }

    fn process_pending_debug_messages(&self) {
        let commands: Vec<_> = self.commands.lock().unwrap().drain(..).collect();
        for command in commands {
            match command.split_once(' ') {
                Some(("burst", count)) => {
                    for n in 0..count.parse::<usize>().unwrap() {
                        self.emit(format!("msg-{n}\n"));
                    }
                }
                Some(("flood", count)) => {
                    for _ in 0..count.parse::<usize>().unwrap() {
                        self.emit("x".repeat(1024 * 1024));
                    }
                }
                _ if command == "ping" => self.emit("pong\n".to_owned()),
                _ => self.emit(format!("{command}\n")),
            }
        }
    }

    fn send_debug_command(&self, command: &[u8]) -> Result<()> {
        if !self.attached() {
            return Err(Error::NotAttached);
        }
        let mut pending = self.pending.lock().unwrap();
        pending.push_str(std::str::from_utf8(command).unwrap());
        while let Some(end) = pending.find('\n') {
            let line = pending[..end].to_owned();
            pending.drain(..=end);
            self.commands.lock().unwrap().push_back(line);
        }
        Ok(())
    }
}

fn connect(port: u16) -> TcpStream {
    let stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    stream
}

fn read_line(reader: &mut BufReader<TcpStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    line.trim_end().to_owned()
}

fn wait_for(server: &DebugServer, state: ConnectionState) {
    let deadline = Instant::now() + TIMEOUT;
    while server.connection_state() != state {
        assert!(
            Instant::now() < deadline,
            "server never reached {state:?}, still {:?}",
            server.connection_state()
        );
        thread::sleep(Duration::from_millis(5));
    }
}

fn ping(stream: &TcpStream) -> String {
    let mut writer = stream;
    writer.write_all(b"ping\n").unwrap();
    read_line(&mut BufReader::new(stream.try_clone().unwrap()))
}

#[test]
fn start_on_ephemeral_port() {
    let mut server = DebugServer::new(Arc::new(EchoEngine::default()));
    assert_eq!(server.port(), 0);

    let port = server.start(0).unwrap();
    assert_ne!(port, 0);
    assert_eq!(server.port(), port);
    assert_eq!(server.state(), ServerState::Running);
    assert_eq!(server.connection_state(), ConnectionState::Listening);
}

#[test]
fn start_twice_fails() {
    let mut server = DebugServer::new(Arc::new(EchoEngine::default()));
    let port = server.start(0).unwrap();

    assert!(matches!(server.start(0), Err(Error::CallbackAlreadyAttached)));
    assert_eq!(server.port(), port);
    assert_eq!(server.state(), ServerState::Running);
}

#[test]
fn start_fails_when_callback_slot_is_taken() {
    let engine = Arc::new(EchoEngine::default());
    engine
        .attach_debug_callback(Arc::new(|_message: String| {}))
        .unwrap();

    let mut server = DebugServer::new(engine.clone());
    assert!(matches!(server.start(0), Err(Error::CallbackAlreadyAttached)));
    assert_eq!(server.state(), ServerState::Idle);
    assert_eq!(server.connection_state(), ConnectionState::Offline);
    assert_eq!(server.port(), 0);

    // The first callback stays registered, and the server can retry.
    assert!(engine.attached());
    engine.detach_debug_callback();
    assert_ne!(server.start(0).unwrap(), 0);
}

#[test]
fn start_fails_on_occupied_port() {
    let occupied = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = occupied.local_addr().unwrap().port();
    let engine = Arc::new(EchoEngine::default());

    let mut server = DebugServer::new(engine.clone());
    match server.start(port) {
        Err(Error::Bind { port: requested, .. }) => assert_eq!(requested, port),
        other => panic!("expected a bind error, got {other:?}"),
    }
    assert_eq!(server.state(), ServerState::Idle);
    assert_eq!(server.port(), 0);
    assert!(!engine.attached());
}

#[test]
fn ping_pong_delivers_exactly_once() {
    let mut server = DebugServer::new(Arc::new(EchoEngine::default()));
    let port = server.start(0).unwrap();

    let stream = connect(port);
    assert_eq!(ping(&stream), "pong");
    wait_for(&server, ConnectionState::Connected);

    // Nothing else arrives.
    stream
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    let mut rest = [0; 16];
    assert!((&stream).read(&mut rest).is_err());
}

#[test]
fn messages_arrive_in_production_order() {
    let mut server = DebugServer::new(Arc::new(EchoEngine::default()));
    let port = server.start(0).unwrap();

    let mut stream = connect(port);
    stream.write_all(b"burst 200\n").unwrap();

    let mut reader = BufReader::new(stream);
    for n in 0..200 {
        assert_eq!(read_line(&mut reader), format!("msg-{n}"));
    }
}

#[test]
fn concurrent_producers_keep_their_order() {
    const PRODUCERS: usize = 4;
    const MESSAGES: usize = 100;

    let engine = Arc::new(EchoEngine::default());
    let mut server = DebugServer::new(engine.clone());
    let port = server.start(0).unwrap();

    let stream = connect(port);
    wait_for(&server, ConnectionState::Connected);

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let engine = engine.clone();
            thread::spawn(move || {
                for n in 0..MESSAGES {
                    engine.emit(format!("{producer}:{n}\n"));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let mut reader = BufReader::new(stream);
    let mut next = [0; PRODUCERS];
    for _ in 0..PRODUCERS * MESSAGES {
        let line = read_line(&mut reader);
        let (producer, n) = line.split_once(':').unwrap();
        let producer: usize = producer.parse().unwrap();
        assert_eq!(n.parse::<usize>().unwrap(), next[producer], "{line}");
        next[producer] += 1;
    }
    assert_eq!(next, [MESSAGES; PRODUCERS]);
}

#[test]
fn reconnect_after_disconnect() {
    let mut server = DebugServer::new(Arc::new(EchoEngine::default()));
    let port = server.start(0).unwrap();

    let first = connect(port);
    assert_eq!(ping(&first), "pong");
    drop(first);
    wait_for(&server, ConnectionState::Listening);

    let second = connect(port);
    assert_eq!(ping(&second), "pong");
    assert_eq!(server.port(), port);
}

#[test]
fn second_client_is_closed_while_first_is_connected() {
    let mut server = DebugServer::new(Arc::new(EchoEngine::default()));
    let port = server.start(0).unwrap();

    let first = connect(port);
    wait_for(&server, ConnectionState::Connected);

    let mut second = connect(port);
    let mut buf = [0; 16];
    match second.read(&mut buf) {
        Ok(0) | Err(_) => {}
        Ok(n) => panic!("second client received {n} bytes"),
    }

    assert_eq!(ping(&first), "pong");
    assert_eq!(server.connection_state(), ConnectionState::Connected);
}

#[test]
fn messages_without_client_are_discarded() {
    let engine = Arc::new(EchoEngine::default());
    let mut server = DebugServer::new(engine.clone());
    let port = server.start(0).unwrap();

    engine.emit("stale\n".to_owned());

    let stream = connect(port);
    wait_for(&server, ConnectionState::Connected);
    assert_eq!(ping(&stream), "pong");
}

#[test]
fn stop_is_idempotent() {
    let engine = Arc::new(EchoEngine::default());
    let mut server = DebugServer::new(engine.clone());
    let port = server.start(0).unwrap();
    let _client = connect(port);

    server.stop();
    assert_eq!(server.state(), ServerState::Stopped);
    assert_eq!(server.connection_state(), ConnectionState::Offline);
    assert_eq!(server.port(), 0);
    assert!(!engine.attached());

    server.stop();
    assert_eq!(server.state(), ServerState::Stopped);
    drop(server);

    assert!(TcpStream::connect((Ipv4Addr::LOCALHOST, port)).is_err());
}

#[test]
fn send_after_stop_fails() {
    let runtime = Runtime::new(RuntimeOptions::default());
    let engine = Arc::new(runtime.create_engine().unwrap());
    let mut server = DebugServer::new(engine.clone());
    server.start(0).unwrap();
    server.stop();

    assert!(matches!(
        engine.send_debug_command(b"{}"),
        Err(Error::NotAttached)
    ));
    assert_eq!(engine.eval("1 + 1").unwrap(), "2");
}

#[test]
fn engine_answers_evaluate_over_tcp() {
    let runtime = Runtime::new(RuntimeOptions::default());
    let engine = Arc::new(runtime.create_engine().unwrap());
    engine.eval("var counter = 0;").unwrap();

    let mut server = DebugServer::new(engine.clone());
    let port = server.start(0).unwrap();

    let host = {
        let engine = engine.clone();
        thread::spawn(move || {
            for _ in 0..50 {
                engine.eval("counter += 1").unwrap();
            }
        })
    };

    let mut stream = connect(port);
    let request = json!({
        "seq": 7,
        "type": "request",
        "command": "evaluate",
        "arguments": {"expression": "({ double: 21 * 2 })"}
    });
    stream.write_all(request.to_string().as_bytes()).unwrap();

    let response: Value = serde_json::Deserializer::from_reader(&stream)
        .into_iter::<Value>()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(response["type"], "response");
    assert_eq!(response["request_seq"], 7);
    assert_eq!(response["success"], true);
    assert_eq!(response["body"]["result"], r#"{"double":42}"#);

    host.join().unwrap();
    assert_eq!(engine.eval("counter").unwrap(), "50");
}

#[test]
fn stop_returns_while_client_is_not_reading() {
    let mut server = DebugServer::new(Arc::new(EchoEngine::default()));
    let port = server.start(0).unwrap();

    // Far more than the socket buffers hold; the client never reads.
    let mut stream = connect(port);
    stream.write_all(b"flood 64\n").unwrap();
    thread::sleep(Duration::from_millis(300));

    let (done_tx, done_rx) = mpsc::channel();
    let stopper = thread::spawn(move || {
        server.stop();
        done_tx.send(server.state()).unwrap();
    });

    assert_eq!(done_rx.recv_timeout(TIMEOUT), Ok(ServerState::Stopped));
    stopper.join().unwrap();
    drop(stream);
}

#[test]
fn peer_reset_returns_to_listening() {
    let mut server = DebugServer::new(Arc::new(EchoEngine::default()));
    let port = server.start(0).unwrap();

    // Close with responses still in flight, so writes to the gone peer fail.
    let mut stream = connect(port);
    stream.write_all(b"burst 5000\n").unwrap();
    wait_for(&server, ConnectionState::Connected);
    drop(stream);
    wait_for(&server, ConnectionState::Listening);
    // Let the engine finish the burst so none of it trails into the next
    // session's queue.
    thread::sleep(Duration::from_millis(200));

    let stream = connect(port);
    assert_eq!(ping(&stream), "pong");
    assert_eq!(server.state(), ServerState::Running);
}

fn read_json(stream: &TcpStream) -> Value {
    serde_json::Deserializer::from_reader(stream)
        .into_iter::<Value>()
        .next()
        .unwrap()
        .unwrap()
}

fn evaluate_request(seq: i64, expression: &str) -> String {
    json!({
        "seq": seq,
        "type": "request",
        "command": "evaluate",
        "arguments": {"expression": expression}
    })
    .to_string()
}

#[test]
fn oversized_content_length_does_not_break_engine() {
    let runtime = Runtime::new(RuntimeOptions::default());
    let engine = Arc::new(runtime.create_engine().unwrap());
    let mut server = DebugServer::new(engine.clone());
    let port = server.start(0).unwrap();

    let mut stream = connect(port);
    let hostile = format!("Content-Length: {}\r\n\r\n{{}}", usize::MAX);
    stream.write_all(hostile.as_bytes()).unwrap();

    let response = read_json(&stream);
    assert_eq!(response["request_seq"], 0);
    assert_eq!(response["success"], false);

    assert_eq!(engine.eval("1 + 1").unwrap(), "2");
    stream
        .write_all(evaluate_request(2, "3 * 3").as_bytes())
        .unwrap();
    assert_eq!(read_json(&stream)["body"]["result"], "9");
}

#[test]
fn partial_message_does_not_reach_next_client() {
    let runtime = Runtime::new(RuntimeOptions::default());
    let engine = Arc::new(runtime.create_engine().unwrap());
    let mut server = DebugServer::new(engine.clone());
    let port = server.start(0).unwrap();

    let mut first = connect(port);
    first.write_all(br#"{"seq":1,"type":"requ"#).unwrap();
    wait_for(&server, ConnectionState::Connected);
    thread::sleep(Duration::from_millis(100));
    drop(first);
    wait_for(&server, ConnectionState::Listening);

    let mut second = connect(port);
    second
        .write_all(evaluate_request(7, "'fresh'").as_bytes())
        .unwrap();

    let response = read_json(&second);
    assert_eq!(response["request_seq"], 7);
    assert_eq!(response["success"], true);
    assert_eq!(response["body"]["result"], r#""fresh""#);
}

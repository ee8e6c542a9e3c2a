//! Minimal HTTP collector that records each request and answers from a
//! scripted list of statuses.

use std::{
    io::{BufRead, BufReader, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::mpsc,
    thread,
    time::Duration,
};

#[derive(Debug)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedRequest {
    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        405 => "Method Not Allowed",
        500 => "Server Error",
        503 => "Unavailable",
        _ => "Status",
    }
}

/// Read the request head up to the blank line, then exactly
/// `content-length` body bytes.
fn capture(stream: &TcpStream) -> CapturedRequest {
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("collector read timeout");
    let mut reader = BufReader::new(stream);
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        let read = reader
            .read_until(b'\n', &mut head)
            .expect("collector reads head");
        assert!(read > 0, "client closed before the head ended");
    }
    let head = String::from_utf8_lossy(&head).into_owned();
    let mut lines = head.lines();
    let (method, path) = lines
        .next()
        .and_then(|first| {
            let mut words = first.split(' ');
            Some((words.next()?.to_owned(), words.next()?.to_owned()))
        })
        .unwrap_or_default();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_owned()))
        .collect();
    let length = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = String::new();
    reader
        .take(length as u64)
        .read_to_string(&mut body)
        .expect("collector reads body");
    CapturedRequest {
        method,
        path,
        headers,
        body,
    }
}

/// Serve one request per scripted `(status, body)` pair, then stop
/// listening so later connections are refused.
pub fn spawn_collector(
    responses: Vec<(u16, &'static str)>,
) -> (SocketAddr, mpsc::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("collector binds");
    let addr = listener.local_addr().expect("collector address");
    let (requests, received) = mpsc::channel();

    thread::spawn(move || {
        for (status, reply) in responses {
            let Some(Ok(mut stream)) = listener.incoming().next() else {
                return;
            };
            let request = capture(&stream);
            let reply = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
                reason(status),
                reply.len()
            );
            if stream.write_all(reply.as_bytes()).is_err() || requests.send(request).is_err() {
                return;
            }
        }
    });

    (addr, received)
}

/// Collect requests until `count` have arrived or `timeout` elapses.
pub fn collect(
    rx: &mpsc::Receiver<CapturedRequest>,
    count: usize,
    timeout: Duration,
) -> Vec<CapturedRequest> {
    let mut requests = Vec::new();
    while requests.len() < count {
        match rx.recv_timeout(timeout) {
            Ok(request) => requests.push(request),
            Err(_) => break,
        }
    }
    requests
}

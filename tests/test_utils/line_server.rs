//! Raw TCP listener that hands back each CRLF-terminated line it reads.

use std::{
    io::{BufRead, BufReader},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    thread,
    time::Duration,
};

/// Accept connections one after another on `listener`, sending
/// `(connection index, line)` for every line received.
pub fn spawn_line_server(listener: TcpListener) -> mpsc::Receiver<(usize, String)> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for (index, stream) in listener.incoming().enumerate() {
            let Ok(stream) = stream else {
                break;
            };
            if !forward_lines(stream, index, &tx) {
                break;
            }
        }
    });
    rx
}

fn forward_lines(stream: TcpStream, index: usize, tx: &mpsc::Sender<(usize, String)>) -> bool {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(10)));
    let reader = BufReader::new(stream);
    for line in reader.split(b'\n') {
        let Ok(line) = line else {
            return true;
        };
        let line = String::from_utf8_lossy(&line).into_owned();
        if tx.send((index, line)).is_err() {
            return false;
        }
    }
    true
}

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

/// A request as seen by the test server.
#[derive(Debug)]
pub struct Recorded {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decoded-enough view of the query string: raw `key=value` pairs.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        pairs(self.target.split_once('?').map_or("", |(_, q)| q))
    }
}

pub fn pairs(query: &str) -> Vec<(String, String)> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (p.to_string(), String::new()),
        })
        .collect()
}

pub struct Reply {
    pub status: u16,
    pub body: String,
    /// When set, the body is sent with `Transfer-Encoding: chunked`, one
    /// flushed write per piece.
    pub chunks: Option<Vec<String>>,
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            chunks: None,
        }
    }

    pub fn with_body(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            chunks: None,
        }
    }

    pub fn chunked(status: u16, pieces: &[&str]) -> Self {
        Self {
            status,
            body: String::new(),
            chunks: Some(pieces.iter().map(|p| p.to_string()).collect()),
        }
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    requests: Receiver<Recorded>,
}

impl TestServer {
    /// Serve one connection per reply, in order.
    pub fn start(replies: Vec<Reply>) -> Self {
        Self::start_gated(replies, None)
    }

    /// Like `start`, but hold every reply until `gate` yields.
    pub fn start_gated(replies: Vec<Reply>, gate: Option<Receiver<()>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            for reply in replies {
                let (mut stream, _) = match listener.accept() {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                let recorded = read_request(&mut stream);
                let _ = tx.send(recorded);
                if let Some(ref gate) = gate {
                    let _ = gate.recv();
                }
                write_reply(&mut stream, &reply);
            }
        });

        Self { addr, requests: rx }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn next_request(&self) -> Recorded {
        self.requests
            .recv_timeout(Duration::from_secs(5))
            .expect("server received no request")
    }

    pub fn try_next_request(&self, wait: Duration) -> Option<Recorded> {
        self.requests.recv_timeout(wait).ok()
    }
}

/// An address nothing listens on.
pub fn refused_url(path: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}{path}")
}

fn read_request(stream: &mut TcpStream) -> Recorded {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).unwrap();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap() == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.push((k.trim().to_string(), v.trim().to_string()));
        }
    }

    let length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).unwrap();

    Recorded {
        method,
        target,
        headers,
        body: String::from_utf8(body).unwrap(),
    }
}

fn write_reply(stream: &mut TcpStream, reply: &Reply) {
    if let Some(ref chunks) = reply.chunks {
        write_chunked(stream, reply.status, chunks);
        return;
    }
    let location = if (300..400).contains(&reply.status) {
        "Location: http://127.0.0.1:1/elsewhere\r\n"
    } else {
        ""
    };
    let response = format!(
        "HTTP/1.1 {} Test\r\n{location}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reply.body.len(),
        reply.body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

fn write_chunked(stream: &mut TcpStream, status: u16, chunks: &[String]) {
    let head = format!(
        "HTTP/1.1 {status} Test\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.flush();
    for chunk in chunks {
        let _ = write!(stream, "{:x}\r\n{chunk}\r\n", chunk.len());
        let _ = stream.flush();
        std::thread::sleep(Duration::from_millis(50));
    }
    let _ = stream.write_all(b"0\r\n\r\n");
    let _ = stream.flush();
}

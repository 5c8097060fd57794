//! Minimal HTTP/1.1 server for connector tests.
//!
//! Each route is a path prefix with a script of canned responses. Requests
//! walk the script in order; once it runs out the last response repeats.
//! Every connection is answered once and closed.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone)]
pub(crate) struct Canned {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl Canned {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

struct Route {
    prefix: String,
    script: Vec<Canned>,
    served: usize,
}

pub(crate) struct TestServer {
    base: String,
    hits: Arc<AtomicUsize>,
}

impl TestServer {
    pub fn start(routes: Vec<(&str, Vec<Canned>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let routes = Arc::new(Mutex::new(
            routes
                .into_iter()
                .map(|(prefix, script)| Route {
                    prefix: prefix.to_string(),
                    script,
                    served: 0,
                })
                .collect::<Vec<_>>(),
        ));

        let counter = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                counter.fetch_add(1, Ordering::SeqCst);
                serve(stream, &routes);
            }
        });

        Self { base, hits }
    }

    /// One route answering every path.
    pub fn single(script: Vec<Canned>) -> Self {
        Self::start(vec![("/", script)])
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn serve(mut stream: TcpStream, routes: &Mutex<Vec<Route>>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    let head = String::from_utf8_lossy(&buf);
    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();

    let canned = {
        let mut routes = routes.lock().unwrap();
        routes
            .iter_mut()
            .find(|r| path.starts_with(&r.prefix))
            .and_then(|r| {
                let idx = r.served.min(r.script.len().saturating_sub(1));
                r.served += 1;
                r.script.get(idx).cloned()
            })
            .unwrap_or_else(|| Canned::new(404, "{}"))
    };

    let mut response = format!(
        "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
        canned.status,
        canned.body.len()
    );
    for (name, value) in &canned.headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str("\r\n");
    response.push_str(&canned.body);
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

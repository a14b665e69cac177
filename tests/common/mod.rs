//! Shared fixtures: an in-memory remote transport and a one-endpoint
//! OAuth token server, so the remote paths run without a real service.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use durastore::{
    CredentialBroker, RemoteConfig, RemoteObjectRef, RemoteStore, RemoteTransport, Session,
    TransportError, TransportResult,
};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

// ============================================================================
// Mock transport
// ============================================================================

struct MockObject {
    bytes: Vec<u8>,
    seq: u64,
}

#[derive(Default)]
struct MockInner {
    objects: Mutex<BTreeMap<String, MockObject>>,
    next_seq: AtomicU64,
    /// Reject this many calls with AuthRejected before behaving normally
    auth_failures: AtomicUsize,
    fail_all: AtomicBool,
    upload_calls: AtomicUsize,
    download_calls: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_auth_failures(&self, n: usize) {
        self.inner.auth_failures.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.inner.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn upload_calls(&self) -> usize {
        self.inner.upload_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.inner.download_calls.load(Ordering::SeqCst)
    }

    pub fn object_names(&self) -> Vec<String> {
        self.inner.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn object_count(&self) -> usize {
        self.inner.objects.lock().unwrap().len()
    }

    pub fn object_bytes(&self, name: &str) -> Option<Vec<u8>> {
        self.inner
            .objects
            .lock()
            .unwrap()
            .get(name)
            .map(|o| o.bytes.clone())
    }

    pub fn seed_object(&self, name: &str, bytes: &[u8]) {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        self.inner.objects.lock().unwrap().insert(
            name.to_string(),
            MockObject {
                bytes: bytes.to_vec(),
                seq,
            },
        );
    }

    fn gate(&self) -> TransportResult<()> {
        if self.inner.fail_all.load(Ordering::SeqCst) {
            return Err(TransportError::Failed("mock transport down".to_string()));
        }
        let remaining = self.inner.auth_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.inner.auth_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TransportError::AuthRejected("mock 401".to_string()));
        }
        Ok(())
    }

    fn modified_for(seq: u64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + seq as i64, 0).unwrap()
    }
}

impl RemoteTransport for MockTransport {
    fn upload(&self, _session: &Session, name: &str, bytes: &[u8]) -> TransportResult<()> {
        self.inner.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.gate()?;
        self.seed_object(name, bytes);
        Ok(())
    }

    fn download(&self, _session: &Session, name: &str) -> TransportResult<Vec<u8>> {
        self.inner.download_calls.fetch_add(1, Ordering::SeqCst);
        self.gate()?;
        self.inner
            .objects
            .lock()
            .unwrap()
            .get(name)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| TransportError::NotFound(name.to_string()))
    }

    fn list(&self, _session: &Session) -> TransportResult<Vec<RemoteObjectRef>> {
        self.gate()?;
        let objects = self.inner.objects.lock().unwrap();
        let mut refs: Vec<RemoteObjectRef> = objects
            .iter()
            .map(|(name, object)| RemoteObjectRef {
                name: name.clone(),
                size: object.bytes.len() as u64,
                modified: Self::modified_for(object.seq),
            })
            .collect();
        refs.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(refs)
    }

    fn delete(&self, _session: &Session, name: &str) -> TransportResult<()> {
        self.gate()?;
        match self.inner.objects.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(TransportError::NotFound(name.to_string())),
        }
    }
}

// ============================================================================
// Broker & store helpers
// ============================================================================

pub fn static_remote_config(token: &str) -> RemoteConfig {
    RemoteConfig::new("https://blobs.example.invalid").access_token(token)
}

pub fn static_broker(token: &str) -> Arc<CredentialBroker> {
    Arc::new(CredentialBroker::new(&static_remote_config(token)).unwrap())
}

pub fn mock_remote_store(transport: &MockTransport) -> RemoteStore {
    RemoteStore::new(static_broker("test-token"), Box::new(transport.clone()))
}

// ============================================================================
// Token endpoint server
// ============================================================================

pub struct TokenServer {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl TokenServer {
    pub fn token_url(&self) -> String {
        format!("http://{}/oauth2/token", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Serves `{"access_token": "<token>"}` to every request and counts them.
pub fn spawn_token_server(access_token: &str) -> TokenServer {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let token = access_token.to_string();
    let hit_counter = hits.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        request.extend_from_slice(&buf[..n]);
                        if request_complete(&request) {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            hit_counter.fetch_add(1, Ordering::SeqCst);
            let body = format!("{{\"access_token\":\"{}\"}}", token);
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });

    TokenServer { addr, hits }
}

fn request_complete(data: &[u8]) -> bool {
    let Some(head_end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&data[..head_end]);
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    data.len() >= head_end + 4 + content_length
}

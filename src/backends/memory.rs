//! In-memory object store for tests
//!
//! Supports per-object fault injection (denied opens, transient failures,
//! panics, broken reads), an open delay and an open gate for back-pressure
//! tests. Tracks how many streams are alive at once.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::Semaphore;

use super::{ListEntry, ListPage, ObjectStore, ObjectStream, StoreError};
use crate::core::paths::is_folder_marker;

#[derive(Debug, Clone, Copy)]
enum Fault {
    Deny,
    Panic,
    BrokenRead,
}

#[derive(Default)]
struct StreamGauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

pub struct MemoryStore {
    namespace: String,
    objects: BTreeMap<String, Vec<u8>>,
    faults: HashMap<String, Fault>,
    flaky: Mutex<HashMap<String, u32>>,
    open_delay: Option<Duration>,
    open_gate: Option<Arc<Semaphore>>,
    fail_listing: bool,
    gauge: Arc<StreamGauge>,
    opens: AtomicUsize,
}

impl MemoryStore {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            objects: BTreeMap::new(),
            faults: HashMap::new(),
            flaky: Mutex::new(HashMap::new()),
            open_delay: None,
            open_gate: None,
            fail_listing: false,
            gauge: Arc::new(StreamGauge::default()),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn insert(&mut self, path: &str, content: impl Into<Vec<u8>>) {
        self.objects.insert(path.to_string(), content.into());
    }

    /// Add a folder marker entry
    pub fn folder(&mut self, path: &str) {
        self.objects.insert(path.to_string(), Vec::new());
    }

    pub fn deny(&mut self, path: &str) {
        self.faults.insert(path.to_string(), Fault::Deny);
    }

    pub fn panic_on(&mut self, path: &str) {
        self.faults.insert(path.to_string(), Fault::Panic);
    }

    /// The stream yields the object's bytes and then an I/O error
    pub fn break_read(&mut self, path: &str) {
        self.faults.insert(path.to_string(), Fault::BrokenRead);
    }

    /// Fail the first `times` opens with a transient error
    pub fn flaky(&mut self, path: &str, times: u32) {
        if let Ok(flaky) = self.flaky.get_mut() {
            flaky.insert(path.to_string(), times);
        }
    }

    pub fn delay_opens(&mut self, delay: Duration) {
        self.open_delay = Some(delay);
    }

    /// Hold every open until the returned gate hands out a permit for it
    pub fn gate_opens(&mut self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.open_gate = Some(Arc::clone(&gate));
        gate
    }

    pub fn fail_listing(&mut self) {
        self.fail_listing = true;
    }

    /// Most streams alive at the same time
    pub fn peak_streams(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }

    pub fn active_streams(&self) -> usize {
        self.gauge.active.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn check_namespace(&self, namespace: &str) -> Result<(), StoreError> {
        if namespace != self.namespace {
            return Err(StoreError::NamespaceNotFound(namespace.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(
        &self,
        namespace: &str,
        prefix: &str,
        token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, StoreError> {
        self.check_namespace(namespace)?;
        if self.fail_listing {
            return Err(StoreError::AccessDenied(format!("list {}", namespace)));
        }

        let entries: Vec<ListEntry> = self
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| token.map_or(true, |t| k.as_str() > t))
            .take(max_keys.max(1))
            .map(|k| ListEntry {
                path: k.clone(),
                is_folder_marker: is_folder_marker(k),
            })
            .collect();

        let next_token = entries.last().and_then(|last| {
            let more = self
                .objects
                .keys()
                .any(|k| k.starts_with(prefix) && *k > last.path);
            more.then(|| last.path.clone())
        });

        Ok(ListPage {
            entries,
            next_token,
        })
    }

    async fn open_object(&self, namespace: &str, path: &str) -> Result<ObjectStream, StoreError> {
        self.check_namespace(namespace)?;
        self.opens.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gate) = &self.open_gate {
            gate.acquire()
                .await
                .map_err(|_| StoreError::Transient("gate closed".to_string()))?
                .forget();
        }

        let transient = {
            let mut flaky = self.flaky.lock().unwrap();
            match flaky.get_mut(path) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        };
        if transient {
            return Err(StoreError::Transient(format!("{}: slow down", path)));
        }

        let data = self
            .objects
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;

        let body: ObjectStream = match self.faults.get(path) {
            Some(Fault::Deny) => return Err(StoreError::AccessDenied(path.to_string())),
            Some(Fault::Panic) => panic!("injected panic opening {}", path),
            Some(Fault::BrokenRead) => Box::new(io::Cursor::new(data).chain(BrokenReader)),
            None => Box::new(io::Cursor::new(data)),
        };

        let active = self.gauge.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(active, Ordering::SeqCst);

        Ok(Box::new(TrackedStream {
            inner: body,
            gauge: Arc::clone(&self.gauge),
        }))
    }
}

struct BrokenReader;

impl AsyncRead for BrokenReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )))
    }
}

struct TrackedStream {
    inner: ObjectStream,
    gauge: Arc<StreamGauge>,
}

impl AsyncRead for TrackedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.gauge.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pagination_by_last_key() {
        let mut store = MemoryStore::new("b");
        for name in ["a.txt", "b.txt", "c.txt"] {
            store.insert(name, "x");
        }

        let first = store.list_page("b", "", None, 2).await.unwrap();
        assert_eq!(first.entries.len(), 2);
        assert_eq!(first.next_token.as_deref(), Some("b.txt"));

        let second = store
            .list_page("b", "", first.next_token.as_deref(), 2)
            .await
            .unwrap();
        assert_eq!(second.entries[0].path, "c.txt");
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn test_stream_gauge() {
        let mut store = MemoryStore::new("b");
        store.insert("a.txt", "x");

        let first = store.open_object("b", "a.txt").await.unwrap();
        let second = store.open_object("b", "a.txt").await.unwrap();
        assert_eq!(store.active_streams(), 2);
        drop(first);
        drop(second);
        assert_eq!(store.active_streams(), 0);
        assert_eq!(store.peak_streams(), 2);
        assert_eq!(store.opens(), 2);
    }
}

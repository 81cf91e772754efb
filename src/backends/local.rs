//! Local filesystem object store
//!
//! Each first-level directory under the store root is a bucket. Object paths
//! are '/'-separated and relative to the bucket directory. Directories show
//! up in listings as folder markers (`dir/`), the way console-created prefixes
//! do in hosted stores.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use walkdir::WalkDir;

use super::{ListEntry, ListPage, ObjectStore, ObjectStream, StoreError};
use crate::core::paths::{make_relative, resolve_within, SEPARATOR};

/// Object store backed by a directory tree
pub struct LocalStore {
    root: PathBuf,
    pool: Arc<Semaphore>,
}

impl LocalStore {
    /// Create a store rooted at `root` handing out at most `pool_size` open streams
    pub fn new(root: impl Into<PathBuf>, pool_size: usize) -> Self {
        Self {
            root: root.into(),
            pool: Arc::new(Semaphore::new(pool_size.max(1))),
        }
    }

    fn bucket_dir(&self, namespace: &str) -> Result<PathBuf, StoreError> {
        let dir = resolve_within(&self.root, namespace)
            .filter(|_| !namespace.contains(SEPARATOR))
            .ok_or_else(|| StoreError::NamespaceNotFound(namespace.to_string()))?;
        if !dir.is_dir() {
            return Err(StoreError::NamespaceNotFound(namespace.to_string()));
        }
        Ok(dir)
    }
}

/// One listing page plus how many walk entries it took to produce it
struct WalkPage {
    entries: Vec<ListEntry>,
    next_token: Option<String>,
    visited: usize,
}

/// Position of a listed path in walk order.
///
/// `sort_by_file_name` yields a directory before its contents and siblings by
/// name, which is the lexicographic order of the path components.
fn walk_key(path: &str) -> Vec<&str> {
    path.trim_end_matches(SEPARATOR).split(SEPARATOR).collect()
}

/// List up to `max_keys` entries under `prefix` that come after `token`.
///
/// The walk starts at the directory the prefix points into, skips subtrees
/// that lie wholly before the token and stops at the first entry past the page.
fn walk_page(
    bucket: &Path,
    prefix: &str,
    token: Option<&str>,
    max_keys: usize,
) -> Result<WalkPage, StoreError> {
    let mut page = WalkPage {
        entries: Vec::new(),
        next_token: None,
        visited: 0,
    };

    let start = match prefix.rfind(SEPARATOR) {
        Some(i) => match resolve_within(bucket, &prefix[..i]) {
            Some(dir) if dir.is_dir() => dir,
            _ => return Ok(page),
        },
        None => bucket.to_path_buf(),
    };
    let after = token.map(walk_key);

    let walker = WalkDir::new(&start)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() {
                return true;
            }
            let relative = match make_relative(entry.path(), bucket) {
                Some(r) => r,
                None => return false,
            };
            if relative.is_empty() {
                return true;
            }
            let dir = format!("{}{}", relative, SEPARATOR);
            if !dir.starts_with(prefix) && !prefix.starts_with(&dir) {
                return false;
            }
            match &after {
                Some(t) => {
                    let key = walk_key(&dir);
                    key.as_slice() > t.as_slice() || t.starts_with(&key)
                }
                None => true,
            }
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .and_then(|p| make_relative(p, bucket))
                .unwrap_or_default();
            match e.into_io_error() {
                Some(io) => StoreError::from_io(path, io),
                None => StoreError::Transient(format!("filesystem loop at {}", path)),
            }
        })?;
        page.visited += 1;

        let relative = match make_relative(entry.path(), bucket) {
            Some(r) if !r.is_empty() => r,
            _ => continue,
        };

        let listed = if entry.file_type().is_dir() {
            ListEntry::folder(format!("{}{}", relative, SEPARATOR))
        } else {
            ListEntry::object(relative)
        };

        if !listed.path.starts_with(prefix) {
            continue;
        }
        if let Some(t) = &after {
            if walk_key(&listed.path).as_slice() <= t.as_slice() {
                continue;
            }
        }
        if page.entries.len() == max_keys {
            page.next_token = page.entries.last().map(|e| e.path.clone());
            break;
        }
        page.entries.push(listed);
    }

    Ok(page)
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn list_page(
        &self,
        namespace: &str,
        prefix: &str,
        token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, StoreError> {
        let bucket = self.bucket_dir(namespace)?;
        if let Some(t) = token.filter(|t| !t.starts_with(prefix)) {
            return Err(StoreError::InvalidToken(t.to_string()));
        }

        let prefix_owned = prefix.to_string();
        let token_owned = token.map(str::to_string);
        let max_keys = max_keys.max(1);
        let page = tokio::task::spawn_blocking(move || {
            walk_page(&bucket, &prefix_owned, token_owned.as_deref(), max_keys)
        })
        .await
        .map_err(|e| StoreError::Transient(format!("listing task failed: {}", e)))??;

        tracing::debug!(
            namespace,
            prefix,
            token,
            returned = page.entries.len(),
            visited = page.visited,
            "listed page"
        );

        Ok(ListPage {
            entries: page.entries,
            next_token: page.next_token,
        })
    }

    async fn open_object(&self, namespace: &str, path: &str) -> Result<ObjectStream, StoreError> {
        let bucket = self.bucket_dir(namespace)?;
        let file_path = resolve_within(&bucket, path)
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;

        let permit = Arc::clone(&self.pool)
            .acquire_owned()
            .await
            .map_err(|_| StoreError::Transient("connection pool closed".to_string()))?;

        let file = tokio::fs::File::open(&file_path)
            .await
            .map_err(|e| StoreError::from_io(path, e))?;
        if file
            .metadata()
            .await
            .map_err(|e| StoreError::from_io(path, e))?
            .is_dir()
        {
            return Err(StoreError::InvalidPath(path.to_string()));
        }

        Ok(Box::new(PooledStream {
            inner: file,
            _permit: permit,
        }))
    }
}

/// Holds a pool slot for as long as the stream is alive
struct PooledStream<R> {
    inner: R,
    _permit: OwnedSemaphorePermit,
}

impl<R: AsyncRead + Unpin> AsyncRead for PooledStream<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tokio::io::AsyncReadExt;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn sample_store() -> (tempfile::TempDir, LocalStore) {
        let temp = tempfile::tempdir().unwrap();
        let bucket = temp.path().join("bucket");
        write_file(&bucket.join("a.txt"), "a");
        write_file(&bucket.join("in/b.txt"), "b");
        write_file(&bucket.join("in/c.csv"), "c");
        write_file(&bucket.join("out/d.txt"), "d");
        let store = LocalStore::new(temp.path(), 4);
        (temp, store)
    }

    fn paths(page: &ListPage) -> Vec<&str> {
        page.entries.iter().map(|e| e.path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_list_whole_bucket() {
        let (_temp, store) = sample_store();
        let page = store.list_page("bucket", "", None, 100).await.unwrap();
        assert_eq!(
            paths(&page),
            vec!["a.txt", "in/", "in/b.txt", "in/c.csv", "out/", "out/d.txt"]
        );
        assert!(page.entries[1].is_folder_marker);
        assert!(page.next_token.is_none());
    }

    #[tokio::test]
    async fn test_list_prefix() {
        let (_temp, store) = sample_store();
        let page = store.list_page("bucket", "in/", None, 100).await.unwrap();
        assert_eq!(paths(&page), vec!["in/", "in/b.txt", "in/c.csv"]);
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let (_temp, store) = sample_store();
        let first = store.list_page("bucket", "", None, 4).await.unwrap();
        assert_eq!(paths(&first), vec!["a.txt", "in/", "in/b.txt", "in/c.csv"]);
        assert_eq!(first.next_token.as_deref(), Some("in/c.csv"));

        let second = store
            .list_page("bucket", "", first.next_token.as_deref(), 4)
            .await
            .unwrap();
        assert_eq!(paths(&second), vec!["out/", "out/d.txt"]);
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn test_list_last_page_exactly_full() {
        let (_temp, store) = sample_store();
        let first = store.list_page("bucket", "", None, 3).await.unwrap();
        assert_eq!(first.next_token.as_deref(), Some("in/b.txt"));

        let second = store
            .list_page("bucket", "", first.next_token.as_deref(), 3)
            .await
            .unwrap();
        assert_eq!(paths(&second), vec!["in/c.csv", "out/", "out/d.txt"]);
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn test_list_follows_walk_order_not_string_order() {
        // '-' sorts before '/', so string order would put "a-b/x.txt" before "a/"
        let temp = tempfile::tempdir().unwrap();
        let bucket = temp.path().join("bucket");
        write_file(&bucket.join("a/x.txt"), "x");
        write_file(&bucket.join("a-b/x.txt"), "x");
        let store = LocalStore::new(temp.path(), 1);

        let mut listed = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = store
                .list_page("bucket", "", token.as_deref(), 1)
                .await
                .unwrap();
            listed.extend(page.entries.into_iter().map(|e| e.path));
            token = page.next_token;
            if token.is_none() {
                break;
            }
        }
        assert_eq!(listed, vec!["a/", "a/x.txt", "a-b/", "a-b/x.txt"]);
    }

    #[test]
    fn test_walk_stays_inside_prefix() {
        let temp = tempfile::tempdir().unwrap();
        let bucket = temp.path().join("bucket");
        for i in 0..50 {
            write_file(&bucket.join(format!("other/f{:02}.txt", i)), "x");
        }
        write_file(&bucket.join("in/a.txt"), "a");
        write_file(&bucket.join("in/b.txt"), "b");
        write_file(&bucket.join("in/c.txt"), "c");

        let page = walk_page(&bucket, "in/", None, 100).unwrap();
        let listed: Vec<&str> = page.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(listed, vec!["in/", "in/a.txt", "in/b.txt", "in/c.txt"]);
        assert_eq!(page.visited, 4);

        let mut token: Option<String> = None;
        let mut pages = 0;
        loop {
            let page = walk_page(&bucket, "in/", token.as_deref(), 1).unwrap();
            assert!(page.visited <= 4, "visited {}", page.visited);
            assert!(page.entries.iter().all(|e| e.path.starts_with("in/")));
            pages += 1;
            token = page.next_token;
            if token.is_none() {
                break;
            }
        }
        assert_eq!(pages, 4);
    }

    #[test]
    fn test_walk_skips_subtrees_before_token() {
        let temp = tempfile::tempdir().unwrap();
        let bucket = temp.path().join("bucket");
        for i in 0..10 {
            write_file(&bucket.join(format!("in/a/f{}.txt", i)), "x");
        }
        write_file(&bucket.join("in/b/f.txt"), "x");
        write_file(&bucket.join("in/c.txt"), "x");

        let page = walk_page(&bucket, "in/", Some("in/b/"), 100).unwrap();
        let listed: Vec<&str> = page.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(listed, vec!["in/b/f.txt", "in/c.txt"]);
        // in/, in/b/, in/b/f.txt, in/c.txt; nothing under in/a/
        assert_eq!(page.visited, 4);
    }

    #[test]
    fn test_walk_partial_name_prefix() {
        let (temp, _store) = sample_store();
        let page = walk_page(&temp.path().join("bucket"), "in/b", None, 100).unwrap();
        let listed: Vec<&str> = page.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(listed, vec!["in/b.txt"]);

        let page = walk_page(&temp.path().join("bucket"), "nope/", None, 100).unwrap();
        assert!(page.entries.is_empty());
    }

    #[tokio::test]
    async fn test_list_missing_bucket() {
        let (_temp, store) = sample_store();
        let err = store.list_page("nope", "", None, 10).await.unwrap_err();
        assert!(matches!(err, StoreError::NamespaceNotFound(_)));

        let err = store.list_page("../bucket", "", None, 10).await.unwrap_err();
        assert!(matches!(err, StoreError::NamespaceNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_bad_token() {
        let (_temp, store) = sample_store();
        let err = store
            .list_page("bucket", "in/", Some("out/d.txt"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_open_object() {
        let (_temp, store) = sample_store();
        let mut stream = store.open_object("bucket", "in/b.txt").await.unwrap();
        let mut content = String::new();
        stream.read_to_string(&mut content).await.unwrap();
        assert_eq!(content, "b");
    }

    #[tokio::test]
    async fn test_open_errors() {
        let (_temp, store) = sample_store();
        let err = store.open_object("bucket", "missing.txt").await.err().unwrap();
        assert!(matches!(err, StoreError::NotFound(_)));

        let err = store.open_object("bucket", "../x.txt").await.err().unwrap();
        assert!(matches!(err, StoreError::InvalidPath(_)));

        let err = store.open_object("bucket", "in").await.err().unwrap();
        assert!(matches!(err, StoreError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_pool_slot_released_on_drop() {
        let (_temp, store) = sample_store();
        let store = LocalStore {
            pool: Arc::new(Semaphore::new(1)),
            ..store
        };

        let first = store.open_object("bucket", "a.txt").await.unwrap();
        assert_eq!(store.pool.available_permits(), 0);
        drop(first);
        assert_eq!(store.pool.available_permits(), 1);

        let _second = store.open_object("bucket", "a.txt").await.unwrap();
    }
}

//! Lazy object enumeration over a paginated listing

use std::collections::VecDeque;
use std::sync::Arc;

use crate::backends::{ListEntry, ObjectStore, StoreError, DEFAULT_PAGE_SIZE};
use crate::core::model::ObjectHandle;
use crate::core::paths::{has_suffix, normalize_prefix};

/// Default object name suffix
pub const DEFAULT_SUFFIX: &str = ".txt";

/// Forward-only sequence of candidate objects under a prefix.
///
/// Pages are fetched only when the buffered page is exhausted, so a huge
/// namespace never sits in memory at once.
pub struct ObjectEnumerator {
    store: Arc<dyn ObjectStore>,
    namespace: String,
    prefix: String,
    suffix: String,
    page_size: usize,
    buffered: VecDeque<ListEntry>,
    next_token: Option<String>,
    exhausted: bool,
    pages: usize,
}

impl ObjectEnumerator {
    pub fn new(store: Arc<dyn ObjectStore>, namespace: &str, prefix: &str, suffix: &str) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
            prefix: normalize_prefix(prefix),
            suffix: suffix.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            buffered: VecDeque::new(),
            next_token: None,
            exhausted: false,
            pages: 0,
        }
    }

    #[allow(dead_code)]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The normalized prefix actually listed
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Listing pages fetched so far
    #[allow(dead_code)]
    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    fn accepts(&self, entry: &ListEntry) -> bool {
        !entry.is_folder_marker
            && !entry.path.ends_with('/')
            && has_suffix(&entry.path, &self.suffix)
    }

    /// Next candidate object, or `None` once the listing is exhausted.
    ///
    /// Listing failures are returned as-is; there is nothing to scan without them.
    pub async fn next_object(&mut self) -> Result<Option<ObjectHandle>, StoreError> {
        loop {
            while let Some(entry) = self.buffered.pop_front() {
                if self.accepts(&entry) {
                    return Ok(Some(ObjectHandle::new(&self.namespace, entry.path)));
                }
            }

            if self.exhausted {
                return Ok(None);
            }

            let page = self
                .store
                .list_page(
                    &self.namespace,
                    &self.prefix,
                    self.next_token.as_deref(),
                    self.page_size,
                )
                .await?;
            self.pages += 1;

            tracing::debug!(
                namespace = %self.namespace,
                page = self.pages,
                entries = page.entries.len(),
                "fetched listing page"
            );

            self.buffered.extend(page.entries);
            self.next_token = page.next_token;
            self.exhausted = self.next_token.is_none();
        }
    }

    /// Drain the remaining objects
    pub async fn collect_all(&mut self) -> Result<Vec<ObjectHandle>, StoreError> {
        let mut handles = Vec::new();
        while let Some(handle) = self.next_object().await? {
            handles.push(handle);
        }
        Ok(handles)
    }
}

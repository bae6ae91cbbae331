//! Store and folder lifecycle.
//!
//! A [`Store`] owns the connection [`Pool`]. Folders borrow a connection
//! per request (not for their open lifetime), re-selecting their mailbox
//! when the borrowed connection last served another folder. Fetched body
//! sections are cached on the folder and immutable once loaded.

#![allow(clippy::missing_errors_doc)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use mailwire_net::ProtocolConfig;
use mailwire_sasl::Credentials;

use crate::command::{FetchAttribute, FetchItems, SearchCriteria, StatusQuery, StoreAction};
use crate::engine::{ImapConnection, MailboxStatus};
use crate::parser::{FetchItem, StatusItem};
use crate::pool::Pool;
use crate::types::{Flags, ListResponse, Mailbox, SeqNum, SequenceSet};
use crate::{Error, Result};

/// Folder open mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// EXAMINE: no flag changes, no expunge on close.
    ReadOnly,
    /// SELECT: flags may change; close may expunge \Deleted messages.
    ReadWrite,
}

struct StoreInner {
    config: ProtocolConfig,
    factory: Option<Arc<dyn mailwire_net::StreamFactory>>,
    pool: Mutex<Option<Arc<Pool>>>,
    open_folders: Mutex<Vec<Arc<FolderInner>>>,
    closed_for_business: AtomicBool,
    connected: AtomicBool,
}

/// An IMAP message store.
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Creates a disconnected store over the given configuration.
    #[must_use]
    pub fn new(config: ProtocolConfig) -> Self {
        Self::with_factory(config, None)
    }

    /// Creates a store whose connections go through a caller-supplied
    /// stream factory.
    #[must_use]
    pub fn with_factory(
        config: ProtocolConfig,
        factory: Option<Arc<dyn mailwire_net::StreamFactory>>,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config,
                factory,
                pool: Mutex::new(None),
                open_folders: Mutex::new(Vec::new()),
                closed_for_business: AtomicBool::new(false),
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// Connects and authenticates the first pooled connection.
    ///
    /// On failure the store stays disconnected and the error is returned.
    pub async fn connect(&self, username: &str, password: &str) -> Result<()> {
        if self.inner.closed_for_business.load(Ordering::SeqCst) {
            return Err(Error::StoreClosed);
        }

        let mut credentials = Credentials::new(username, password);
        credentials.authzid = self
            .inner
            .config
            .get("sasl.authorizationid")
            .map(str::to_string);

        let pool = Arc::new(Pool::new(
            self.inner.config.clone(),
            credentials,
            self.inner.factory.clone(),
        ));

        // Prove the handshake and authentication now, then pool the
        // connection for the first folder to use.
        let conn = pool.checkout().await?;
        pool.release(conn).await;

        *self.lock_pool() = Some(pool);
        self.inner.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Returns true while the store is connected and usable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
            && !self.inner.closed_for_business.load(Ordering::SeqCst)
    }

    /// Lists folders matching the pattern.
    pub async fn list(&self, pattern: &str) -> Result<Vec<ListResponse>> {
        let pool = self.pool()?;
        let mut conn = pool.checkout().await?;
        let result = conn.list("", pattern).await;
        finish(&pool, conn, result).await
    }

    /// Lists subscribed folders matching the pattern.
    pub async fn lsub(&self, pattern: &str) -> Result<Vec<ListResponse>> {
        let pool = self.pool()?;
        let mut conn = pool.checkout().await?;
        let result = conn.lsub("", pattern).await;
        finish(&pool, conn, result).await
    }

    /// Queries folder status without selecting it.
    pub async fn status(&self, name: &str, items: &[StatusQuery]) -> Result<Vec<StatusItem>> {
        let pool = self.pool()?;
        let mailbox = Mailbox::new(name);
        let mut conn = pool.checkout().await?;
        let result = conn.status(&mailbox, items).await;
        finish(&pool, conn, result).await
    }

    /// Opens a folder, selecting it on a borrowed connection to verify it
    /// exists and capture its counts.
    pub async fn open_folder(&self, name: &str, mode: OpenMode) -> Result<Folder> {
        let pool = self.pool()?;
        let mailbox = Mailbox::new(name);

        let mut conn = pool.checkout().await?;
        let result = match mode {
            OpenMode::ReadOnly => conn.examine(&mailbox).await,
            OpenMode::ReadWrite => conn.select(&mailbox).await,
        };
        let status = finish(&pool, conn, result).await?;

        let folder = Arc::new(FolderInner {
            store: Arc::downgrade(&self.inner),
            name: mailbox,
            mode,
            state: tokio::sync::Mutex::new(FolderState {
                open: true,
                exists: status.exists,
                recent: status.recent,
                delimiter: None,
                body_cache: HashMap::new(),
            }),
        });

        self.inner
            .open_folders
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Arc::clone(&folder));

        Ok(Folder { inner: folder })
    }

    /// Closes the store: rejects new work, closes every open folder,
    /// then closes the pooled connections.
    pub async fn close(&self) -> Result<()> {
        self.inner.closed_for_business.store(true, Ordering::SeqCst);

        // Folders may race opens against close; drain repeatedly until
        // the list stays empty.
        loop {
            let batch: Vec<Arc<FolderInner>> = {
                let mut folders = self
                    .inner
                    .open_folders
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                std::mem::take(&mut *folders)
            };
            if batch.is_empty() {
                break;
            }
            for folder in batch {
                if let Err(err) = folder.close_internal(false).await {
                    tracing::debug!(%err, "folder close during store close failed");
                }
            }
        }

        let pool = self.lock_pool().take();
        if let Some(pool) = pool {
            pool.close().await;
        }
        self.inner.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn pool(&self) -> Result<Arc<Pool>> {
        if self.inner.closed_for_business.load(Ordering::SeqCst) {
            return Err(Error::StoreClosed);
        }
        self.lock_pool().clone().ok_or(Error::StoreClosed)
    }

    fn lock_pool(&self) -> std::sync::MutexGuard<'_, Option<Arc<Pool>>> {
        self.inner
            .pool
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("host", &self.inner.config.host())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

struct FolderState {
    open: bool,
    exists: u32,
    recent: u32,
    delimiter: Option<char>,
    body_cache: HashMap<(u32, String), Arc<Vec<u8>>>,
}

struct FolderInner {
    store: Weak<StoreInner>,
    name: Mailbox,
    mode: OpenMode,
    state: tokio::sync::Mutex<FolderState>,
}

impl FolderInner {
    fn pool(&self) -> Result<Arc<Pool>> {
        let store = self.store.upgrade().ok_or(Error::StoreClosed)?;
        if store.closed_for_business.load(Ordering::SeqCst) {
            return Err(Error::StoreClosed);
        }
        store
            .pool
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
            .ok_or(Error::StoreClosed)
    }

    /// Borrows a connection with this folder's mailbox selected in the
    /// right mode.
    async fn borrow_selected(&self) -> Result<(Arc<Pool>, ImapConnection)> {
        let pool = self.pool()?;
        let mut conn = pool.checkout().await?;

        let needs_select = match conn.selected() {
            Some((mailbox, read_only)) => {
                mailbox != &self.name || read_only != (self.mode == OpenMode::ReadOnly)
            }
            None => true,
        };
        if needs_select {
            let result = match self.mode {
                OpenMode::ReadOnly => conn.examine(&self.name).await,
                OpenMode::ReadWrite => conn.select(&self.name).await,
            };
            match result {
                Ok(status) => {
                    let mut state = self.state.lock().await;
                    state.exists = status.exists;
                    state.recent = status.recent;
                }
                Err(err) => {
                    if err.poisons_connection() {
                        pool.discard(conn);
                    } else {
                        pool.release(conn).await;
                    }
                    return Err(err);
                }
            }
        }

        Ok((pool, conn))
    }

    async fn ensure_open(&self) -> Result<()> {
        if self.state.lock().await.open {
            Ok(())
        } else {
            Err(Error::FolderClosed)
        }
    }

    async fn close_internal(&self, expunge: bool) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if !state.open {
                return Ok(());
            }
            state.open = false;
        }

        // CLOSE expunges \Deleted messages in a read-write mailbox. To
        // close without expunging, re-open read-only first.
        let Ok(pool) = self.pool() else { return Ok(()) };
        let mut conn = pool.checkout().await?;
        let result = async {
            let selected_here = conn
                .selected()
                .is_some_and(|(mailbox, _)| mailbox == &self.name);
            if !selected_here {
                if !expunge {
                    // Nothing selected on this connection; nothing to do.
                    return Ok(());
                }
                conn.select(&self.name).await?;
            }
            if self.mode == OpenMode::ReadWrite && !expunge {
                conn.examine(&self.name).await?;
            }
            conn.close_mailbox().await
        }
        .await;
        finish(&pool, conn, result).await
    }
}

/// An open IMAP folder.
pub struct Folder {
    inner: Arc<FolderInner>,
}

impl Folder {
    /// The folder's decoded full name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name.as_str()
    }

    /// The open mode.
    #[must_use]
    pub fn mode(&self) -> OpenMode {
        self.inner.mode
    }

    /// Message count from the most recent SELECT/EXAMINE on this folder.
    pub async fn message_count(&self) -> u32 {
        self.inner.state.lock().await.exists
    }

    /// Recent count from the most recent SELECT/EXAMINE on this folder.
    pub async fn recent_count(&self) -> u32 {
        self.inner.state.lock().await.recent
    }

    /// The hierarchy delimiter, discovered lazily with LIST.
    pub async fn delimiter(&self) -> Result<Option<char>> {
        self.inner.ensure_open().await?;

        if let Some(delim) = self.inner.state.lock().await.delimiter {
            return Ok(Some(delim));
        }

        let pool = self.inner.pool()?;
        let mut conn = pool.checkout().await?;
        let result = conn.list("", self.inner.name.as_str()).await;
        let lists = finish(&pool, conn, result).await?;

        let delimiter = lists.first().and_then(|l| l.delimiter);
        if let Some(delim) = delimiter {
            self.inner.state.lock().await.delimiter = Some(delim);
        }
        Ok(delimiter)
    }

    /// Re-selects the folder and returns fresh mailbox state.
    pub async fn refresh(&self) -> Result<MailboxStatus> {
        self.inner.ensure_open().await?;
        let pool = self.inner.pool()?;
        let mut conn = pool.checkout().await?;
        let result = match self.inner.mode {
            OpenMode::ReadOnly => conn.examine(&self.inner.name).await,
            OpenMode::ReadWrite => conn.select(&self.inner.name).await,
        };
        let status = finish(&pool, conn, result).await?;

        let mut state = self.inner.state.lock().await;
        state.exists = status.exists;
        state.recent = status.recent;
        Ok(status)
    }

    /// Fetches items for a message range.
    pub async fn fetch(
        &self,
        set: &SequenceSet,
        items: FetchItems,
    ) -> Result<Vec<(SeqNum, Vec<FetchItem>)>> {
        self.inner.ensure_open().await?;
        let (pool, mut conn) = self.inner.borrow_selected().await?;
        let result = conn.fetch(set, items, false).await;
        finish(&pool, conn, result).await
    }

    /// Fetches items by UID.
    pub async fn uid_fetch(
        &self,
        set: &SequenceSet,
        items: FetchItems,
    ) -> Result<Vec<(SeqNum, Vec<FetchItem>)>> {
        self.inner.ensure_open().await?;
        let (pool, mut conn) = self.inner.borrow_selected().await?;
        let result = conn.fetch(set, items, true).await;
        finish(&pool, conn, result).await
    }

    /// Fetches one body section with BODY.PEEK (does not set \Seen) and
    /// caches it. Cached content is immutable once loaded.
    pub async fn fetch_body(&self, seq: SeqNum, section: &str) -> Result<Arc<Vec<u8>>> {
        self.inner.ensure_open().await?;

        let key = (seq.get(), section.to_uppercase());
        if let Some(cached) = self.inner.state.lock().await.body_cache.get(&key) {
            return Ok(Arc::clone(cached));
        }

        let set = SequenceSet::single(seq.get())
            .ok_or_else(|| Error::Protocol("sequence number 0".to_string()))?;
        let items = FetchItems::Items(vec![FetchAttribute::Body {
            section: (!section.is_empty()).then(|| section.to_string()),
            peek: true,
            partial: None,
        }]);

        let fetched = {
            let (pool, mut conn) = self.inner.borrow_selected().await?;
            let result = conn.fetch(&set, items, false).await;
            finish(&pool, conn, result).await?
        };

        for (got, items) in fetched {
            if got != seq {
                continue;
            }
            for item in items {
                if let FetchItem::Body { data: Some(data), .. } = item {
                    let body = Arc::new(data);
                    self.inner
                        .state
                        .lock()
                        .await
                        .body_cache
                        .insert(key, Arc::clone(&body));
                    return Ok(body);
                }
            }
        }

        Err(Error::Protocol("no body data in FETCH response".to_string()))
    }

    /// Searches the folder.
    pub async fn search(&self, criteria: SearchCriteria) -> Result<Vec<SeqNum>> {
        self.inner.ensure_open().await?;
        let (pool, mut conn) = self.inner.borrow_selected().await?;
        let result = conn.search(criteria, false).await;
        finish(&pool, conn, result).await
    }

    /// Changes flags on messages. Requires a read-write folder.
    pub async fn store_flags(
        &self,
        set: &SequenceSet,
        action: StoreAction,
        silent: bool,
    ) -> Result<Vec<(SeqNum, Vec<FetchItem>)>> {
        self.inner.ensure_open().await?;
        if self.inner.mode == OpenMode::ReadOnly {
            return Err(Error::InvalidState("folder is read-only".to_string()));
        }
        let (pool, mut conn) = self.inner.borrow_selected().await?;
        let result = conn.store(set, action, silent, false).await;
        finish(&pool, conn, result).await
    }

    /// Copies messages to another folder.
    pub async fn copy_to(&self, set: &SequenceSet, destination: &str) -> Result<()> {
        self.inner.ensure_open().await?;
        let (pool, mut conn) = self.inner.borrow_selected().await?;
        let result = conn.copy(set, &Mailbox::new(destination), false).await;
        finish(&pool, conn, result).await
    }

    /// Appends a message to this folder. The borrow spans the whole
    /// multi-step literal exchange.
    pub async fn append(&self, flags: Option<Flags>, message: Vec<u8>) -> Result<()> {
        self.inner.ensure_open().await?;
        let pool = self.inner.pool()?;
        let mut conn = pool.checkout().await?;
        let result = conn.append(&self.inner.name, flags, message).await;
        finish(&pool, conn, result).await
    }

    /// Expunges \Deleted messages. Requires a read-write folder.
    pub async fn expunge(&self) -> Result<Vec<SeqNum>> {
        self.inner.ensure_open().await?;
        if self.inner.mode == OpenMode::ReadOnly {
            return Err(Error::InvalidState("folder is read-only".to_string()));
        }
        let (pool, mut conn) = self.inner.borrow_selected().await?;
        let result = conn.expunge().await;
        finish(&pool, conn, result).await
    }

    /// Closes the folder. With `expunge` and a read-write folder, the
    /// server removes \Deleted messages.
    pub async fn close(&self, expunge: bool) -> Result<()> {
        let result = self.inner.close_internal(expunge).await;

        if let Some(store) = self.inner.store.upgrade() {
            let mut folders = store
                .open_folders
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            folders.retain(|f| !Arc::ptr_eq(f, &self.inner));
        }

        result
    }
}

impl std::fmt::Debug for Folder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Folder")
            .field("name", &self.inner.name.as_str())
            .field("mode", &self.inner.mode)
            .finish_non_exhaustive()
    }
}

/// Releases or discards the connection depending on the error, then
/// propagates the result.
async fn finish<T>(pool: &Arc<Pool>, conn: ImapConnection, result: Result<T>) -> Result<T> {
    match &result {
        Err(err) if err.poisons_connection() => pool.discard(conn),
        _ => pool.release(conn).await,
    }
    result
}

//! POP3 store, folder, and message model.
//!
//! POP3 has exactly one real folder (INBOX) below a dummy root. The
//! store keeps at most one idle connection: checkout hands it out when
//! present, otherwise a new connection is opened and authenticated
//! (exactly once per connection); release caches the connection iff the
//! idle slot is empty, else closes it.

#![allow(clippy::missing_errors_doc)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mailwire_net::ProtocolConfig;
use mailwire_sasl::Credentials;
use tokio::sync::Mutex;

use crate::engine::Pop3Connection;
use crate::{Error, Result};

/// Folder open mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Deletes are not committed; RSET precedes QUIT when configured.
    ReadOnly,
    /// QUIT at close commits staged deletes.
    ReadWrite,
}

struct StoreInner {
    config: ProtocolConfig,
    factory: Option<Arc<dyn mailwire_net::StreamFactory>>,
    credentials: Mutex<Option<Credentials>>,
    idle: Mutex<Option<Pop3Connection>>,
    connected: AtomicBool,
    closed: AtomicBool,
}

/// A POP3 message store.
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
                credentials: Mutex::new(None),
                idle: Mutex::new(None),
                connected: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Connects and authenticates one connection, then caches it for the
    /// first folder open.
    pub async fn connect(&self, username: &str, password: &str) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::StoreClosed);
        }

        let mut credentials = Credentials::new(username, password);
        credentials.authzid = self
            .inner
            .config
            .get("sasl.authorizationid")
            .map(str::to_string);
        *self.inner.credentials.lock().await = Some(credentials);

        let conn = self.checkout().await?;
        self.release(conn).await;
        self.inner.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Returns true while the store is connected and usable.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst) && !self.inner.closed.load(Ordering::SeqCst)
    }

    /// Checks out the idle connection or creates a new one.
    async fn checkout(&self) -> Result<Pop3Connection> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::StoreClosed);
        }

        if let Some(mut conn) = self.inner.idle.lock().await.take() {
            if conn.noop().await.is_ok() {
                return Ok(conn);
            }
            tracing::debug!("cached POP3 connection is dead, reconnecting");
        }

        let credentials = self
            .inner
            .credentials
            .lock()
            .await
            .clone()
            .ok_or_else(|| Error::Auth("store is not connected".to_string()))?;

        let mut conn =
            Pop3Connection::connect_with(&self.inner.config, self.inner.factory.as_ref()).await?;
        conn.login(&self.inner.config, &credentials).await?;
        Ok(conn)
    }

    /// Returns a connection to the idle slot, or closes it when the slot
    /// is taken or the store is closed.
    async fn release(&self, mut conn: Pop3Connection) {
        if !conn.is_open() {
            return;
        }
        if self.inner.closed.load(Ordering::SeqCst) {
            let _ = conn.quit().await;
            return;
        }

        let mut slot = self.inner.idle.lock().await;
        if slot.is_none() {
            *slot = Some(conn);
        } else {
            drop(slot);
            let _ = conn.quit().await;
        }
    }

    /// The dummy root folder, which holds no messages.
    #[must_use]
    pub fn root_folder(&self) -> Folder {
        Folder {
            store: Arc::clone(&self.inner),
            name: String::new(),
            state: None,
        }
    }

    /// Opens INBOX, the only real POP3 folder.
    pub async fn open_folder(&self, name: &str, mode: OpenMode) -> Result<Folder> {
        if !name.eq_ignore_ascii_case("INBOX") {
            return Err(Error::Protocol(format!(
                "POP3 has no folder named {name}"
            )));
        }

        let mut conn = self.checkout().await?;
        let (count, total_bytes) = match conn.stat().await {
            Ok(stat) => stat,
            Err(err) => {
                if !err.poisons_connection() {
                    self.release(conn).await;
                }
                return Err(err);
            }
        };

        Ok(Folder {
            store: Arc::clone(&self.inner),
            name: "INBOX".to_string(),
            state: Some(FolderState {
                conn,
                mode,
                open: true,
                count,
                total_bytes,
                messages: (0..count).map(|i| Pop3Message::new(i + 1)).collect(),
            }),
        })
    }

    /// Closes the store and the idle connection.
    pub async fn close(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.connected.store(false, Ordering::SeqCst);

        if let Some(mut conn) = self.inner.idle.lock().await.take() {
            let _ = conn.quit().await;
        }
        Ok(())
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

/// One message slot, populated lazily from the server.
#[derive(Debug)]
pub struct Pop3Message {
    seq: u32,
    size: Option<u64>,
    uid: Option<String>,
    headers: Option<Arc<Vec<u8>>>,
    content: Option<Arc<Vec<u8>>>,
    deleted: bool,
}

impl Pop3Message {
    const fn new(seq: u32) -> Self {
        Self {
            seq,
            size: None,
            uid: None,
            headers: None,
            content: None,
            deleted: false,
        }
    }

    /// The 1-based message number.
    #[must_use]
    pub const fn seq(&self) -> u32 {
        self.seq
    }

    /// True once DELE has been staged for this message.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted
    }
}

struct FolderState {
    conn: Pop3Connection,
    mode: OpenMode,
    open: bool,
    count: u32,
    total_bytes: u64,
    messages: Vec<Pop3Message>,
}

/// A POP3 folder: either the dummy root or the open INBOX.
///
/// The folder owns its connection for its whole open lifetime; staged
/// deletes are per-session state that only QUIT commits.
pub struct Folder {
    store: Arc<StoreInner>,
    name: String,
    state: Option<FolderState>,
}

impl Folder {
    /// The folder name: empty for the root, `INBOX` otherwise.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Message count from the opening STAT. The root reports zero.
    #[must_use]
    pub fn message_count(&self) -> u32 {
        self.state.as_ref().map_or(0, |s| s.count)
    }

    /// Total mailbox size in bytes from the opening STAT.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.state.as_ref().map_or(0, |s| s.total_bytes)
    }

    fn state_mut(&mut self) -> Result<&mut FolderState> {
        match &mut self.state {
            Some(state) if state.open => Ok(state),
            Some(_) => Err(Error::FolderClosed),
            None => Err(Error::Protocol(
                "the root folder holds no messages".to_string(),
            )),
        }
    }

    fn check_seq(state: &FolderState, seq: u32) -> Result<usize> {
        if seq == 0 || seq > state.count {
            return Err(Error::Protocol(format!(
                "message number {seq} out of range 1..={}",
                state.count
            )));
        }
        Ok((seq - 1) as usize)
    }

    /// The unique id of a message (UIDL), cached after the first call.
    pub async fn uid(&mut self, seq: u32) -> Result<String> {
        let state = self.state_mut()?;
        let idx = Self::check_seq(state, seq)?;

        if let Some(uid) = &state.messages[idx].uid {
            return Ok(uid.clone());
        }
        let uid = state.conn.uidl(seq).await?;
        state.messages[idx].uid = Some(uid.clone());
        Ok(uid)
    }

    /// The message headers, ending at the first blank line.
    ///
    /// Uses `TOP n 0`; with `disabletop=true` the whole message is
    /// retrieved with RETR instead and cut at the blank line.
    pub async fn headers(&mut self, seq: u32) -> Result<Arc<Vec<u8>>> {
        let disabletop = self.store.config.get_bool("disabletop", false);
        let state = self.state_mut()?;
        let idx = Self::check_seq(state, seq)?;

        if let Some(headers) = &state.messages[idx].headers {
            return Ok(Arc::clone(headers));
        }

        let headers = if disabletop {
            let content = state.conn.retr(seq).await?;
            let headers = header_block(&content).to_vec();
            state.messages[idx].content = Some(Arc::new(content));
            Arc::new(headers)
        } else {
            Arc::new(state.conn.top(seq, 0).await?)
        };

        state.messages[idx].headers = Some(Arc::clone(&headers));
        Ok(headers)
    }

    /// The full message content (RETR), cached once loaded.
    pub async fn content(&mut self, seq: u32) -> Result<Arc<Vec<u8>>> {
        let forget_top = self.store.config.get_bool("forgettopheaders", false);
        let state = self.state_mut()?;
        let idx = Self::check_seq(state, seq)?;

        if let Some(content) = &state.messages[idx].content {
            return Ok(Arc::clone(content));
        }

        let content = Arc::new(state.conn.retr(seq).await?);
        state.messages[idx].content = Some(Arc::clone(&content));

        // Headers cut from TOP may differ from the RETR rendition on some
        // servers; re-derive them from the authoritative content.
        if forget_top {
            state.messages[idx].headers = Some(Arc::new(header_block(&content).to_vec()));
        }

        Ok(content)
    }

    /// The message size as reported to callers: total server size minus
    /// the header byte count.
    pub async fn size(&mut self, seq: u32) -> Result<u64> {
        {
            let state = self.state_mut()?;
            let idx = Self::check_seq(state, seq)?;
            if let Some(size) = state.messages[idx].size {
                return Ok(size);
            }
        }

        let headers_len = self.headers(seq).await?.len() as u64;

        let state = self.state_mut()?;
        let idx = Self::check_seq(state, seq)?;
        let total = state.conn.list(seq).await?;
        let size = total.saturating_sub(headers_len);
        state.messages[idx].size = Some(size);
        Ok(size)
    }

    /// Stages a delete (DELE). Committed by closing the folder read-write.
    pub async fn delete(&mut self, seq: u32) -> Result<()> {
        let state = self.state_mut()?;
        if state.mode == OpenMode::ReadOnly {
            return Err(Error::ReadOnly);
        }
        let idx = Self::check_seq(state, seq)?;

        state.conn.dele(seq).await?;
        state.messages[idx].deleted = true;
        Ok(())
    }

    /// Unstages every delete (RSET).
    pub async fn reset_deletes(&mut self) -> Result<()> {
        let state = self.state_mut()?;
        state.conn.rset().await?;
        for message in &mut state.messages {
            message.deleted = false;
        }
        Ok(())
    }

    /// Returns the lazily populated message slots.
    #[must_use]
    pub fn messages(&self) -> &[Pop3Message] {
        self.state.as_ref().map_or(&[], |s| s.messages.as_slice())
    }

    /// Closes the folder.
    ///
    /// Read-write folders commit staged deletes with QUIT. Read-only
    /// folders issue RSET before QUIT when `rsetbeforequit=true`, so a
    /// server that staged deletes anyway cannot commit them.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut state) = self.state.take() else {
            return Ok(());
        };
        if !state.open {
            return Ok(());
        }
        state.open = false;

        let commit = state.mode == OpenMode::ReadWrite;
        if !commit && self.store.config.get_bool("rsetbeforequit", false) {
            if let Err(err) = state.conn.rset().await {
                tracing::debug!(%err, "RSET before QUIT failed");
            }
        }

        // QUIT ends the session either way; the connection is spent.
        state.conn.quit().await
    }
}

impl std::fmt::Debug for Folder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Folder")
            .field("name", &self.name)
            .field("open", &self.state.is_some())
            .finish_non_exhaustive()
    }
}

/// Cuts a message at the first blank line, returning the header block
/// including its terminating CRLF CRLF.
fn header_block(content: &[u8]) -> &[u8] {
    let mut i = 0;
    while i + 3 < content.len() {
        if &content[i..i + 4] == b"\r\n\r\n" {
            return &content[..i + 4];
        }
        i += 1;
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_block_cut_at_blank_line() {
        let msg = b"Subject: hi\r\nFrom: a@b\r\n\r\nbody text\r\n";
        assert_eq!(header_block(msg), b"Subject: hi\r\nFrom: a@b\r\n\r\n");
    }

    #[test]
    fn test_header_block_without_body() {
        let msg = b"Subject: hi\r\n";
        assert_eq!(header_block(msg), msg);
    }
}

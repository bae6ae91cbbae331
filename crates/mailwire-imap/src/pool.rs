//! Connection pool.
//!
//! The pool owns every live connection for one store. Checkout hands out
//! an idle connection after validating it with NOOP (dead ones are
//! discarded and replaced); release returns the connection to the idle
//! set or closes it. A connection the server has closed is never pooled
//! again. Total live connections are capped by `connectionpoolsize`.

#![allow(clippy::missing_errors_doc)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mailwire_net::ProtocolConfig;
use mailwire_sasl::Credentials;
use tokio::sync::{Mutex, Semaphore};

use crate::engine::ImapConnection;
use crate::{Error, Result};

/// Bounded pool of authenticated connections.
pub struct Pool {
    config: ProtocolConfig,
    credentials: Credentials,
    factory: Option<Arc<dyn mailwire_net::StreamFactory>>,
    idle: Mutex<Vec<ImapConnection>>,
    slots: Arc<Semaphore>,
    closed: AtomicBool,
}

impl Pool {
    /// Creates a pool. The live-connection cap comes from
    /// `connectionpoolsize` (default 1).
    #[must_use]
    pub fn new(
        config: ProtocolConfig,
        credentials: Credentials,
        factory: Option<Arc<dyn mailwire_net::StreamFactory>>,
    ) -> Self {
        let size = usize::try_from(config.get_int("connectionpoolsize", 1).max(1)).unwrap_or(1);
        Self {
            config,
            credentials,
            factory,
            idle: Mutex::new(Vec::new()),
            slots: Arc::new(Semaphore::new(size)),
            closed: AtomicBool::new(false),
        }
    }

    /// Checks out a connection for exclusive use.
    ///
    /// Prefers an idle connection (validated with NOOP); otherwise opens,
    /// handshakes, and authenticates a new one. Blocks while the pool is
    /// at its live-connection cap.
    pub async fn checkout(&self) -> Result<ImapConnection> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::StoreClosed);
        }

        let permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| Error::StoreClosed)?;
        permit.forget();

        loop {
            let candidate = self.idle.lock().await.pop();
            let Some(mut conn) = candidate else { break };

            if conn.noop().await.is_ok() {
                return Ok(conn);
            }
            tracing::debug!("discarding dead pooled connection");
            // The slot stays ours; try the next idle connection.
        }

        match self.create().await {
            Ok(conn) => Ok(conn),
            Err(err) => {
                self.slots.add_permits(1);
                Err(err)
            }
        }
    }

    /// Opens and authenticates a fresh connection. Authentication happens
    /// exactly once per connection.
    async fn create(&self) -> Result<ImapConnection> {
        let mut conn = ImapConnection::connect_with(&self.config, self.factory.as_ref()).await?;

        if !conn.is_authenticated() {
            if conn.capabilities().is_empty() {
                conn.capability().await?;
            }

            let allowed: Option<Vec<String>> = self.config.get("sasl.mechanisms").map(|list| {
                list.split_whitespace()
                    .map(str::to_uppercase)
                    .collect()
            });
            let realm = self.config.get("sasl.realm").map(str::to_string);

            let advertised =
                crate::types::auth_mechanisms(conn.capabilities());
            if advertised.is_empty() {
                conn.login(&self.credentials.username, &self.credentials.password)
                    .await?;
            } else {
                match conn
                    .authenticate(&self.credentials, allowed.as_deref(), realm.as_deref())
                    .await
                {
                    Ok(()) => {}
                    Err(Error::Auth(reason)) => {
                        tracing::debug!(%reason, "AUTHENTICATE failed, falling back to LOGIN");
                        conn.login(&self.credentials.username, &self.credentials.password)
                            .await?;
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        Ok(conn)
    }

    /// Returns a connection to the pool, or closes it when it is dead or
    /// the pool is closed.
    pub async fn release(&self, mut conn: ImapConnection) {
        self.slots.add_permits(1);

        if conn.is_closed_by_server() || !conn.is_open() {
            return;
        }
        if self.closed.load(Ordering::SeqCst) {
            let _ = conn.logout().await;
            return;
        }

        self.idle.lock().await.push(conn);
    }

    /// Drops a connection without pooling it (after a poisoning error).
    pub fn discard(&self, conn: ImapConnection) {
        self.slots.add_permits(1);
        drop(conn);
    }

    /// Closes the pool: rejects new checkouts and logs out every idle
    /// connection.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let mut idle = self.idle.lock().await;
        for mut conn in idle.drain(..) {
            if let Err(err) = conn.logout().await {
                tracing::debug!(%err, "logout during pool close failed");
            }
        }
    }

    /// Returns true once the pool is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("host", &self.config.host())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

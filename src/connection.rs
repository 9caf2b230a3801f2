//! Connection Manager
//!
//! Owns the single logical connection to the database. It is not a pool:
//! there is at most one live handle, and an absent handle means "connect
//! before use". Serialization of concurrent callers is the executor's job.

use std::time::Instant;

use crate::engine::{Connection, Connector};
use crate::error::Result;

/// Holds at most one live connection produced by `C`
pub struct ConnectionManager<C: Connector> {
    connector: C,
    handle: Option<C::Connection>,
    connects: u64,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager with no live connection (lazy connect)
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            handle: None,
            connects: 0,
        }
    }

    /// Whether a handle is currently held
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    /// Number of successful connects so far (initial connect included)
    #[must_use]
    pub fn connect_count(&self) -> u64 {
        self.connects
    }

    /// Return the live handle, connecting first if there is none
    pub async fn ensure_connection(&mut self) -> Result<&mut C::Connection> {
        match self.handle {
            Some(ref mut handle) => Ok(handle),
            None => self.open().await,
        }
    }

    /// Establish a new connection in place of whatever is held
    pub async fn connect(&mut self) -> Result<()> {
        self.open().await.map(|_| ())
    }

    async fn open(&mut self) -> Result<&mut C::Connection> {
        let started = Instant::now();
        let handle = self.connector.connect().await?;
        self.connects += 1;

        tracing::info!(
            target_db = %self.connector.target(),
            dialect = %self.connector.dialect(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "connected"
        );
        Ok(self.handle.insert(handle))
    }

    /// Drop the current handle (best-effort close) and connect again
    pub async fn reconnect(&mut self) -> Result<()> {
        tracing::warn!(target_db = %self.connector.target(), "reconnecting");
        self.discard().await;
        self.connect().await
    }

    /// Close and forget the current handle; close errors are swallowed
    pub async fn discard(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.close().await {
                tracing::debug!(error = %e, "ignoring error while closing connection");
            }
        }
    }
}

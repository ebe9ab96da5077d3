//! Bounded pool of SQLite connections
//!
//! Every connection is a `tokio_rusqlite::Connection` configured once at creation (WAL,
//! synchronous=NORMAL, page cache, memory temp store, mmap, busy timeout) and migrated to the
//! current schema. Borrowed connections are returned to the pool when the
//! [`PooledConnection`] guard is dropped.
//!
//! Invariants held under the state mutex:
//! - `tracked + creating <= max_connections`
//! - a connection is either in the idle queue or borrowed by exactly one guard
//! - a connection older than `max_connection_age` is never handed out

use crate::error::{Error, Result};
use crate::migration::MigrationManager;

use parking_lot::Mutex;
use pocket_core::PoolConfig;
use rusqlite::OptionalExtension;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_rusqlite::Connection;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

const CACHE_SIZE_PAGES: i64 = 2000;
const MMAP_SIZE_BYTES: i64 = 268_435_456;

/// Counters exposed for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub created: u64,
    pub borrowed: u64,
    pub returned: u64,
    pub closed: u64,
    pub failed: u64,
    pub in_use: usize,
    pub idle: usize,
    pub total: usize,
    pub max_connections: usize,
}

#[derive(Debug, Clone, Copy)]
struct ConnMeta {
    created_at: Instant,
    last_used: Instant,
    in_use: bool,
    use_count: u64,
}

impl ConnMeta {
    fn new() -> Self {
        let now = Instant::now();
        Self { created_at: now, last_used: now, in_use: false, use_count: 0 }
    }

    fn is_expired(&self, max_age: Duration) -> bool {
        self.created_at.elapsed() > max_age
    }
}

#[derive(Default)]
struct Counters {
    created: u64,
    borrowed: u64,
    returned: u64,
    closed: u64,
    failed: u64,
}

#[derive(Default)]
struct PoolState {
    tracked: HashMap<u64, ConnMeta>,
    idle: VecDeque<(u64, Connection)>,
    /// Slots reserved for connections currently being opened
    creating: usize,
    counters: Counters,
    closed: bool,
}

enum Checkout {
    Ready(u64, Connection),
    /// A slot was reserved; open a connection, closing the expired one first if any
    Create(Option<Connection>),
    Wait,
    Closed,
}

struct PoolInner {
    path: PathBuf,
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Notify,
    next_id: AtomicU64,
    shutdown: CancellationToken,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// A bounded, shareable pool of store connections
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Open a pool for the database at `path`, warm `min_connections` and start the reaper
    #[instrument(skip_all, fields(db_path = %path.display(), max = config.max_connections))]
    pub async fn open(path: &Path, config: PoolConfig) -> Result<Self> {
        let pool = Self {
            inner: Arc::new(PoolInner {
                path: path.to_path_buf(),
                config,
                state: Mutex::new(PoolState::default()),
                available: Notify::new(),
                next_id: AtomicU64::new(1),
                shutdown: CancellationToken::new(),
                reaper: Mutex::new(None),
            }),
        };

        pool.prefill().await?;

        let reaper = spawn_reaper(Arc::downgrade(&pool.inner), pool.inner.config.reap_interval());
        *pool.inner.reaper.lock() = Some(reaper);

        debug!("Connection pool ready");
        Ok(pool)
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    async fn prefill(&self) -> Result<()> {
        for _ in 0..self.inner.config.min_connections {
            let slot = {
                let mut state = self.inner.state.lock();
                if state.tracked.len() + state.creating >= self.inner.config.max_connections {
                    break;
                }
                state.creating += 1;
                CreationSlot::new(&self.inner)
            };

            let conn = match self.inner.open_connection().await {
                Ok(conn) => conn,
                Err(e) => {
                    slot.fail();
                    return Err(e);
                }
            };

            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            let mut state = self.inner.state.lock();
            slot.fill(&mut state);
            state.counters.created += 1;
            state.tracked.insert(id, ConnMeta::new());
            state.idle.push_back((id, conn));
        }
        Ok(())
    }

    /// Borrow a connection, waiting up to the configured `connection_timeout`
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.acquire_timeout(self.inner.config.connection_timeout()).await
    }

    /// Borrow a connection, waiting up to `timeout` for one to become free
    ///
    /// Fails with [`Error::PoolExhausted`] when the pool stays at capacity for the whole
    /// timeout, and with [`Error::StoreUnavailable`] when a new connection cannot be opened.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.inner.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(conn) = self.try_checkout().await? {
                return Ok(conn);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                // A release may have landed just as the deadline fired.
                if let Some(conn) = self.try_checkout().await? {
                    return Ok(conn);
                }
                debug!(?timeout, "Connection pool exhausted");
                return Err(Error::PoolExhausted { timeout });
            }
        }
    }

    async fn try_checkout(&self) -> Result<Option<PooledConnection>> {
        match self.inner.checkout() {
            Checkout::Ready(id, conn) => Ok(Some(PooledConnection::new(id, conn, &self.inner))),
            Checkout::Wait => Ok(None),
            Checkout::Closed => Err(Error::unavailable("connection pool is closed")),
            Checkout::Create(expired) => {
                let slot = CreationSlot::new(&self.inner);
                if let Some(expired) = expired {
                    close_quietly(expired).await;
                }

                match self.inner.open_connection().await {
                    Ok(conn) => {
                        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                        let mut state = self.inner.state.lock();
                        slot.fill(&mut state);
                        state.counters.created += 1;
                        state.counters.borrowed += 1;
                        let mut meta = ConnMeta::new();
                        meta.in_use = true;
                        meta.use_count = 1;
                        state.tracked.insert(id, meta);
                        drop(state);

                        trace!(conn_id = id, "Opened pooled connection");
                        Ok(Some(PooledConnection::new(id, conn, &self.inner)))
                    }
                    Err(e) => {
                        slot.fail();
                        Err(e)
                    }
                }
            }
        }
    }

    /// Return a connection to the pool (equivalent to dropping the guard)
    pub fn release(&self, conn: PooledConnection) {
        drop(conn);
    }

    /// Close idle connections that exceeded `max_idle` or `max_connection_age`
    ///
    /// Called periodically by the reaper; returns the number of connections closed.
    pub fn reap_idle(&self) -> usize {
        self.inner.reap_idle()
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.stats()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Stop the reaper and close idle connections
    ///
    /// Connections still borrowed are closed when their guards drop. Later acquires fail.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        let reaper = self.inner.reaper.lock().take();
        if let Some(handle) = reaper
            && let Err(e) = handle.await
        {
            warn!("Connection reaper ended abnormally: {e}");
        }

        let idle: Vec<(u64, Connection)> = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            let idle: Vec<_> = state.idle.drain(..).collect();
            for (id, _) in &idle {
                state.tracked.remove(id);
            }
            state.counters.closed += idle.len() as u64;
            idle
        };

        debug!(closed = idle.len(), "Closing connection pool");
        for (_, conn) in idle {
            close_quietly(conn).await;
        }

        self.inner.available.notify_waiters();
    }

    #[cfg(test)]
    fn backdate(&self, by: Duration) {
        let mut state = self.inner.state.lock();
        for meta in state.tracked.values_mut() {
            if let Some(created_at) = meta.created_at.checked_sub(by) {
                meta.created_at = created_at;
            }
        }
    }
}

impl PoolInner {
    fn checkout(&self) -> Checkout {
        let mut state = self.state.lock();
        if state.closed {
            return Checkout::Closed;
        }

        let max_age = self.config.max_connection_age();
        if let Some((id, conn)) = state.idle.pop_front() {
            let expired = state.tracked.get(&id).is_none_or(|meta| meta.is_expired(max_age));
            if expired {
                state.tracked.remove(&id);
                state.counters.closed += 1;
                state.creating += 1;
                trace!(conn_id = id, "Replacing expired connection");
                return Checkout::Create(Some(conn));
            }

            state.counters.borrowed += 1;
            if let Some(meta) = state.tracked.get_mut(&id) {
                meta.in_use = true;
                meta.last_used = Instant::now();
                meta.use_count += 1;
            }
            return Checkout::Ready(id, conn);
        }

        if state.tracked.len() + state.creating < self.config.max_connections {
            state.creating += 1;
            return Checkout::Create(None);
        }

        Checkout::Wait
    }

    fn release(&self, id: u64, conn: Connection) {
        let mut state = self.state.lock();
        state.counters.returned += 1;

        let max_age = self.config.max_connection_age();
        let keep = match state.tracked.get_mut(&id) {
            Some(meta) => {
                meta.in_use = false;
                meta.last_used = Instant::now();
                !meta.is_expired(max_age)
            }
            None => false,
        };

        let keep = keep && !state.closed && state.idle.len() < self.config.max_connections;
        if keep {
            state.idle.push_back((id, conn));
            drop(state);
        } else {
            let uses = state.tracked.remove(&id).map(|meta| meta.use_count);
            if uses.is_some() {
                state.counters.closed += 1;
            }
            drop(state);
            trace!(conn_id = id, ?uses, "Closing connection on release");
            drop(conn);
        }

        self.available.notify_one();
    }

    fn reap_idle(&self) -> usize {
        let max_idle = self.config.max_idle();
        let max_age = self.config.max_connection_age();

        let reaped: Vec<Connection> = {
            let mut state = self.state.lock();
            let mut kept = VecDeque::with_capacity(state.idle.len());
            let mut reaped = Vec::new();

            while let Some((id, conn)) = state.idle.pop_front() {
                let stale = state
                    .tracked
                    .get(&id)
                    .is_none_or(|meta| !meta.in_use && (meta.last_used.elapsed() > max_idle || meta.is_expired(max_age)));
                if stale {
                    state.tracked.remove(&id);
                    reaped.push(conn);
                } else {
                    kept.push_back((id, conn));
                }
            }

            state.idle = kept;
            state.counters.closed += reaped.len() as u64;
            reaped
        };

        let count = reaped.len();
        if count > 0 {
            debug!(count, "Reaped idle connections");
            self.available.notify_waiters();
        }
        count
    }

    fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let in_use = state.tracked.values().filter(|meta| meta.in_use).count();
        PoolStats {
            created: state.counters.created,
            borrowed: state.counters.borrowed,
            returned: state.counters.returned,
            closed: state.counters.closed,
            failed: state.counters.failed,
            in_use,
            idle: state.idle.len(),
            total: state.tracked.len(),
            max_connections: self.config.max_connections,
        }
    }

    async fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)
            .await
            .map_err(|e| Error::unavailable(format!("Failed to open {}: {e}", self.path.display())))?;

        let busy_timeout = self.config.busy_timeout();
        conn.call(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "cache_size", CACHE_SIZE_PAGES)?;
            conn.pragma_update(None, "temp_store", "MEMORY")?;
            conn.query_row(&format!("PRAGMA mmap_size = {MMAP_SIZE_BYTES}"), [], |_| Ok(()))
                .optional()?;
            MigrationManager::migrate(conn).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            Ok::<_, rusqlite::Error>(())
        })
        .await
        .map_err(|e| Error::unavailable(format!("Failed to initialize connection: {e}")))?;

        Ok(conn)
    }
}

/// A slot reserved in `PoolState::creating` while a connection is opened
///
/// Dropping the slot unfilled (the acquiring future was cancelled, or opening failed) gives the
/// slot back and wakes a waiter.
struct CreationSlot<'a> {
    pool: &'a PoolInner,
    armed: bool,
}

impl<'a> CreationSlot<'a> {
    /// Wrap a reservation already counted in `creating`
    fn new(pool: &'a PoolInner) -> Self {
        Self { pool, armed: true }
    }

    /// The connection is now tracked; the caller holds the state lock
    fn fill(mut self, state: &mut PoolState) {
        self.armed = false;
        state.creating -= 1;
    }

    fn fail(self) {
        self.pool.state.lock().counters.failed += 1;
    }
}

impl Drop for CreationSlot<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.pool.state.lock().creating -= 1;
        trace!("Released connection slot");
        self.pool.available.notify_one();
    }
}

fn spawn_reaper(pool: Weak<PoolInner>, period: Duration) -> JoinHandle<()> {
    let shutdown = match pool.upgrade() {
        Some(inner) => inner.shutdown.clone(),
        None => CancellationToken::new(),
    };

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let Some(inner) = pool.upgrade() else { break };
                    inner.reap_idle();
                }
            }
        }
        trace!("Connection reaper stopped");
    })
}

async fn close_quietly(conn: Connection) {
    if let Err(e) = conn.close().await {
        warn!("Failed to close connection cleanly: {e}");
    }
}

/// A borrowed connection; returned to its pool on drop
pub struct PooledConnection {
    id: u64,
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    fn new(id: u64, conn: Connection, pool: &Arc<PoolInner>) -> Self {
        Self { id, conn: Some(conn), pool: Arc::clone(pool) }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Run `function` on the connection's worker thread
    pub async fn call<F, R>(&self, function: F) -> Result<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> std::result::Result<R, rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| Error::unavailable("connection already released"))?;
        Ok(conn.call(function).await?)
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(self.id, conn);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection").field("id", &self.id).finish()
    }
}

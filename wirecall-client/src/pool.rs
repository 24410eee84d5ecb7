//! Bounded connection pool with idle expiry and a FIFO wait queue.
//!
//! The pool owns every connection it ever created. A caller borrows one
//! through [`Pool::get`], which hands back a [`Lease`]; calling
//! [`Lease::release`] returns the connection for reuse, while dropping the
//! lease without releasing closes it — the right default for a connection
//! whose stream position is no longer known (a cancelled or failed call).

use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::io;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Sizing knobs for a [`Pool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    /// Connections opened eagerly at construction. Must not exceed
    /// `max_idle`.
    pub init: usize,
    /// Capacity of the idle queue.
    pub max_idle: usize,
    /// Cap on live connections: leased out plus idle.
    pub max_live: usize,
    /// An idle connection older than this is closed instead of reused.
    pub max_idle_time: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            init: 1,
            max_idle: 10,
            max_live: 30,
            max_idle_time: Duration::from_secs(60),
        }
    }
}

/// Pool-level failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    /// The option set is self-contradictory.
    #[error("pool configuration: {0}")]
    Config(String),

    /// The caller's deadline fired before a connection became available.
    #[error("gave up waiting for a pooled connection")]
    Cancelled,

    /// The factory failed to open a connection.
    #[error("failed to open a connection: {0}")]
    Connect(String),
}

impl From<PoolError> for wirecall_core::RpcError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Cancelled => wirecall_core::RpcError::Cancelled,
            PoolError::Config(msg) => wirecall_core::RpcError::InvalidInput(msg),
            PoolError::Connect(msg) => wirecall_core::RpcError::Transport(msg),
        }
    }
}

type Factory<C> = dyn Fn() -> BoxFuture<'static, io::Result<C>> + Send + Sync;

struct IdleConn<C> {
    conn: C,
    since: Instant,
}

struct State<C> {
    idle: VecDeque<IdleConn<C>>,
    waiters: VecDeque<oneshot::Sender<C>>,
    live: usize,
}

struct Shared<C: Send + 'static> {
    options: PoolOptions,
    factory: Box<Factory<C>>,
    state: Mutex<State<C>>,
}

impl<C: Send + 'static> Shared<C> {
    fn state(&self) -> MutexGuard<'_, State<C>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hand the connection to the oldest live waiter, else park it on the
    /// idle queue, else close it.
    fn release(&self, conn: C) {
        let mut conn = conn;
        let mut state = self.state();
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(conn) {
                Ok(()) => return,
                // That waiter gave up and nothing is catching its channel;
                // try the next one.
                Err(returned) => conn = returned,
            }
        }
        if state.idle.len() < self.options.max_idle {
            state.idle.push_back(IdleConn {
                conn,
                since: Instant::now(),
            });
        } else {
            state.live -= 1;
            drop(state);
            drop(conn);
        }
    }

    /// Close a connection that must not be reused. If waiters are queued,
    /// the slot is kept and a replacement is opened for them; otherwise the
    /// live count shrinks.
    fn discard(shared: &Arc<Shared<C>>, conn: C) {
        drop(conn);
        let mut state = shared.state();
        if state.waiters.is_empty() {
            state.live -= 1;
            return;
        }
        drop(state);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let shared = Arc::clone(shared);
            handle.spawn(async move {
                match (shared.factory)().await {
                    Ok(conn) => shared.release(conn),
                    Err(e) => {
                        shared.state().live -= 1;
                        tracing::warn!(error = %e, "failed to replace a discarded pooled connection");
                    }
                }
            });
        } else {
            shared.state().live -= 1;
        }
    }
}

/// A bounded pool of live connections.
///
/// Cloning is cheap and shares the pool.
pub struct Pool<C: Send + 'static> {
    shared: Arc<Shared<C>>,
}

impl<C: Send + 'static> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

enum Acquire<C> {
    Ready(C),
    Create,
    Wait(oneshot::Receiver<C>),
}

impl<C: Send + 'static> Pool<C> {
    /// Build a pool and eagerly open the configured number of connections.
    pub async fn connect<F, Fut>(options: PoolOptions, factory: F) -> Result<Pool<C>, PoolError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<C>> + Send + 'static,
    {
        if options.max_live == 0 {
            return Err(PoolError::Config("max_live must be at least 1".to_string()));
        }
        if options.init > options.max_idle {
            return Err(PoolError::Config(format!(
                "init {} exceeds max_idle {}",
                options.init, options.max_idle
            )));
        }
        if options.max_idle > options.max_live {
            return Err(PoolError::Config(format!(
                "max_idle {} exceeds max_live {}",
                options.max_idle, options.max_live
            )));
        }

        let shared = Arc::new(Shared {
            options,
            factory: Box::new(move || -> BoxFuture<'static, io::Result<C>> {
                Box::pin(factory())
            }),
            state: Mutex::new(State {
                idle: VecDeque::new(),
                waiters: VecDeque::new(),
                live: 0,
            }),
        });
        for _ in 0..options.init {
            let conn = (shared.factory)()
                .await
                .map_err(|e| PoolError::Connect(e.to_string()))?;
            let mut state = shared.state();
            state.idle.push_back(IdleConn {
                conn,
                since: Instant::now(),
            });
            state.live += 1;
        }
        Ok(Pool { shared })
    }

    /// Borrow a connection, waiting until one is available or `deadline`
    /// fires.
    ///
    /// Fresh idle connections are reused first (stale ones are closed and
    /// replaced by new capacity); below the live cap a new connection is
    /// opened; at the cap the caller queues FIFO behind earlier waiters.
    /// A waiter whose deadline fires gets [`PoolError::Cancelled`], and any
    /// connection later handed to its queue slot is quietly put back into
    /// circulation.
    pub async fn get(&self, deadline: Option<Instant>) -> Result<Lease<C>, PoolError> {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(PoolError::Cancelled);
        }
        loop {
            let acquire = {
                let mut state = self.shared.state();
                if let Some(entry) = state.idle.pop_front() {
                    if entry.since.elapsed() >= self.shared.options.max_idle_time {
                        state.live -= 1;
                        drop(state);
                        drop(entry);
                        continue;
                    }
                    Acquire::Ready(entry.conn)
                } else if state.live < self.shared.options.max_live {
                    state.live += 1;
                    Acquire::Create
                } else {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    Acquire::Wait(rx)
                }
            };

            return match acquire {
                Acquire::Ready(conn) => Ok(self.lease(conn)),
                Acquire::Create => match (self.shared.factory)().await {
                    Ok(conn) => Ok(self.lease(conn)),
                    Err(e) => {
                        self.shared.state().live -= 1;
                        Err(PoolError::Connect(e.to_string()))
                    }
                },
                Acquire::Wait(mut rx) => {
                    let conn = match deadline {
                        None => rx.await.map_err(|_| PoolError::Cancelled)?,
                        Some(d) => match tokio::time::timeout_at(d, &mut rx).await {
                            Ok(Ok(conn)) => conn,
                            Ok(Err(_)) => return Err(PoolError::Cancelled),
                            Err(_) => {
                                // A connection may still land in our queue
                                // slot; catch it and put it back so it is
                                // not leaked.
                                let shared = Arc::clone(&self.shared);
                                tokio::spawn(async move {
                                    if let Ok(conn) = rx.await {
                                        shared.release(conn);
                                    }
                                });
                                return Err(PoolError::Cancelled);
                            }
                        },
                    };
                    Ok(self.lease(conn))
                }
            };
        }
    }

    fn lease(&self, conn: C) -> Lease<C> {
        Lease {
            conn: Some(conn),
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Exclusive borrow of one pooled connection.
///
/// Derefs to the connection. [`release`](Lease::release) returns it to the
/// pool; dropping without releasing closes it (and, when callers are
/// queued, opens a replacement in the background so they are not stranded).
pub struct Lease<C: Send + 'static> {
    conn: Option<C>,
    shared: Arc<Shared<C>>,
}

impl<C: Send + 'static> Lease<C> {
    /// Return the connection to the pool for reuse.
    pub fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.release(conn);
        }
    }
}

impl<C: Send + 'static> Deref for Lease<C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn.as_ref().expect("lease used after release")
    }
}

impl<C: Send + 'static> DerefMut for Lease<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("lease used after release")
    }
}

impl<C: Send + 'static> Drop for Lease<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            Shared::discard(&self.shared, conn);
        }
    }
}

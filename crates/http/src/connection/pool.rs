use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::connection::Connection;
use crate::protocol::HttpError;
use crate::timeout::ShutdownSwitch;
use crate::transport::{Destination, TransportFactory};

/// Connections to a set of destinations, keyed by `host:port`.
///
/// Every connection handed out stays registered until it is released, so
/// [`ConnectionPool::shutdown_all`] can reach in-flight requests through their
/// shutdown switches. Released connections are parked as idle only while the
/// destination has no other idle spare.
#[derive(Debug)]
pub struct ConnectionPool {
    factory: Arc<dyn TransportFactory>,
    idle_timeout: Option<Duration>,
    state: Mutex<PoolState>,
}

#[derive(Debug, Default)]
struct PoolState {
    next_id: u64,
    destinations: HashMap<Destination, Vec<PoolEntry>>,
}

#[derive(Debug)]
struct PoolEntry {
    id: u64,
    switch: ShutdownSwitch,
    idle: Option<(Connection, Instant)>,
}

impl ConnectionPool {
    pub fn new(factory: Arc<dyn TransportFactory>, idle_timeout: Option<Duration>) -> Self {
        Self { factory, idle_timeout, state: Mutex::new(PoolState::default()) }
    }

    /// Hands out an idle connection for `destination`, or registers a fresh unconnected one.
    pub fn acquire(&self, destination: &Destination) -> Result<Connection, HttpError> {
        let mut state = self.lock();
        let PoolState { next_id, destinations } = &mut *state;
        let entries = destinations.entry(destination.clone()).or_default();

        let now = Instant::now();
        entries.retain(|entry| match &entry.idle {
            Some((connection, since)) => {
                let fresh = self.idle_timeout.is_none_or(|timeout| now.duration_since(*since) < timeout);
                connection.is_open() && fresh
            }
            None => true,
        });

        if let Some((mut connection, _)) = entries.iter_mut().find_map(|entry| entry.idle.take()) {
            trace!(connection = connection.id(), %destination, "reusing idle connection");
            connection.set_reused(true);
            return Ok(connection);
        }

        let transport = self.factory.create(destination)?;
        *next_id += 1;
        let connection = Connection::new(*next_id, transport);
        entries.push(PoolEntry { id: connection.id(), switch: connection.shutdown_switch().clone(), idle: None });
        debug!(connection = connection.id(), %destination, size = entries.len(), "created connection");
        Ok(connection)
    }

    /// Returns a connection after an exchange.
    ///
    /// It is kept as the idle spare when `reusable` holds, it is still open
    /// with nothing unread, and the destination has no spare yet. Otherwise it
    /// is closed and forgotten.
    pub fn release(&self, destination: &Destination, mut connection: Connection, reusable: bool) {
        let mut state = self.lock();
        let Some(entries) = state.destinations.get_mut(destination) else {
            connection.close();
            return;
        };
        let Some(position) = entries.iter().position(|entry| entry.id == connection.id()) else {
            connection.close();
            return;
        };

        let has_spare = entries.iter().any(|entry| entry.idle.is_some());
        if reusable && !has_spare && connection.is_open() && connection.buffer().is_empty() {
            entries[position].idle = Some((connection, Instant::now()));
        } else {
            trace!(connection = connection.id(), %destination, "dropping connection");
            entries.swap_remove(position);
            connection.close();
        }
    }

    /// Trips every connection's shutdown switch and forgets them all.
    pub fn shutdown_all(&self) {
        let mut state = self.lock();
        for entries in state.destinations.values() {
            for entry in entries {
                entry.switch.trip();
            }
        }
        state.destinations.clear();
    }

    /// Connections currently registered, in use or idle.
    pub fn len(&self) -> usize {
        self.lock().destinations.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len_for(&self, destination: &Destination) -> usize {
        self.lock().destinations.get(destination).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::PlainFactory;
    use tokio::net::TcpListener;

    fn pool(idle_timeout: Option<Duration>) -> ConnectionPool {
        ConnectionPool::new(Arc::new(PlainFactory), idle_timeout)
    }

    async fn connected(pool: &ConnectionPool, listener: &TcpListener, destination: &Destination) -> Connection {
        let mut connection = pool.acquire(destination).unwrap();
        let authority = destination.authority();
        let (connected, _) = tokio::join!(connection.connect(&authority, Duration::ZERO), listener.accept());
        connected.unwrap();
        connection
    }

    #[tokio::test]
    async fn keeps_one_idle_spare() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let destination = Destination::new("127.0.0.1", listener.local_addr().unwrap().port());
        let pool = pool(None);

        let first = connected(&pool, &listener, &destination).await;
        let second = connected(&pool, &listener, &destination).await;
        let third = connected(&pool, &listener, &destination).await;
        assert_eq!(pool.len_for(&destination), 3);

        pool.release(&destination, first, true);
        pool.release(&destination, second, true);
        pool.release(&destination, third, true);
        assert_eq!(pool.len_for(&destination), 1);

        let reused = pool.acquire(&destination).unwrap();
        assert!(reused.is_reused());
        assert!(reused.is_open());
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn failed_connection_is_evicted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let destination = Destination::new("127.0.0.1", listener.local_addr().unwrap().port());
        let pool = pool(None);

        let connection = connected(&pool, &listener, &destination).await;
        pool.release(&destination, connection, false);
        assert!(pool.is_empty());

        let fresh = pool.acquire(&destination).unwrap();
        assert!(!fresh.is_reused());
        assert!(!fresh.is_open());
    }

    #[tokio::test]
    async fn expired_spare_is_replaced() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let destination = Destination::new("127.0.0.1", listener.local_addr().unwrap().port());
        let pool = pool(Some(Duration::from_millis(10)));

        let connection = connected(&pool, &listener, &destination).await;
        let id = connection.id();
        pool.release(&destination, connection, true);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let fresh = pool.acquire(&destination).unwrap();
        assert_ne!(fresh.id(), id);
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_trips_in_flight_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let destination = Destination::new("127.0.0.1", listener.local_addr().unwrap().port());
        let pool = pool(None);

        let connection = connected(&pool, &listener, &destination).await;
        pool.shutdown_all();

        assert!(connection.shutdown_switch().is_tripped());
        assert!(!connection.is_open());
        assert!(pool.is_empty());

        pool.release(&destination, connection, true);
        assert!(pool.is_empty());
    }
}

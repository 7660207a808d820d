//! Session-scoped carts.
//!
//! Each session owns one cart behind its own async mutex, so requests on the
//! same session are serialized while different sessions never contend.
//! A session idle for longer than the store's TTL is gone: lookups treat it
//! as unknown and [`SessionStore::purge_idle`] reclaims it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::aggregates::Cart;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

struct Session {
    cart: Arc<Mutex<Cart>>,
    last_seen: Instant,
}

impl Session {
    fn is_idle(&self, ttl: Duration, now: Instant) -> bool {
        now.duration_since(self.last_seen) >= ttl
    }
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self { Self::new(DEFAULT_SESSION_TTL) }
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { sessions: Arc::default(), ttl }
    }

    pub fn ttl(&self) -> Duration { self.ttl }

    /// Starts a session with an empty cart.
    pub async fn create(&self) -> Uuid {
        let id = Uuid::now_v7();
        let session = Session { cart: Arc::new(Mutex::new(Cart::new())), last_seen: Instant::now() };
        self.sessions.write().await.insert(id, session);
        id
    }

    /// Locks the session's cart for the duration of one request and marks
    /// the session as active.
    pub async fn lock_cart(&self, id: Uuid) -> Option<OwnedMutexGuard<Cart>> {
        let cart = {
            let mut sessions = self.sessions.write().await;
            let now = Instant::now();
            let session = sessions.get_mut(&id)?;
            if session.is_idle(self.ttl, now) {
                sessions.remove(&id);
                return None;
            }
            session.last_seen = now;
            Arc::clone(&session.cart)
        };
        Some(cart.lock_owned().await)
    }

    pub async fn end(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    /// Drops every session idle past the TTL; returns how many went.
    pub async fn purge_idle(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_idle(self.ttl, now));
        before - sessions.len()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

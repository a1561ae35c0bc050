use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

use ember_types::events::{EventSink, GatewayEvent};

/// Maps a user id to that user's set of open gateway connections and fans
/// targeted events out to all of them. A user may be connected from zero,
/// one, or several devices; with none open the event is silently dropped:
/// at-most-once, no queueing, no retry.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// user_id -> open connections for that user
    rooms: RwLock<HashMap<Uuid, Vec<(Uuid, mpsc::UnboundedSender<GatewayEvent>)>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                rooms: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a new connection under a user's key. Returns the connection
    /// id and the receiver the connection loop drains.
    pub fn join(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .rooms
            .write()
            .expect("dispatcher lock poisoned")
            .entry(user_id)
            .or_default()
            .push((conn_id, tx));
        (conn_id, rx)
    }

    /// Deregister one connection. Other connections of the same user are
    /// untouched, so a stale disconnect never tears down a newer device.
    pub fn leave(&self, user_id: Uuid, conn_id: Uuid) {
        let mut rooms = self.inner.rooms.write().expect("dispatcher lock poisoned");
        if let Some(conns) = rooms.get_mut(&user_id) {
            conns.retain(|(id, _)| *id != conn_id);
            if conns.is_empty() {
                rooms.remove(&user_id);
            }
        }
    }

    /// Push an event to every open connection for a user.
    pub fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let rooms = self.inner.rooms.read().expect("dispatcher lock poisoned");
        match rooms.get(&user_id) {
            Some(conns) => {
                for (_, tx) in conns {
                    let _ = tx.send(event.clone());
                }
            }
            None => trace!("No open connection for {}, dropping event", user_id),
        }
    }

    pub fn connection_count(&self, user_id: Uuid) -> usize {
        self.inner
            .rooms
            .read()
            .expect("dispatcher lock poisoned")
            .get(&user_id)
            .map_or(0, |conns| conns.len())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for Dispatcher {
    fn send(&self, user_id: Uuid, event: GatewayEvent) {
        self.send_to_user(user_id, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(user_id: Uuid) -> GatewayEvent {
        GatewayEvent::Ready { user_id }
    }

    #[test]
    fn join_then_send_delivers() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (_conn, mut rx) = dispatcher.join(user);
        dispatcher.send_to_user(user, ready(user));

        assert!(matches!(rx.try_recv(), Ok(GatewayEvent::Ready { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_without_connection_drops_silently() {
        let dispatcher = Dispatcher::new();
        // No join happened; must be a no-op, not an error
        dispatcher.send_to_user(Uuid::new_v4(), ready(Uuid::new_v4()));
    }

    #[test]
    fn every_device_of_a_user_receives() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (_c1, mut rx1) = dispatcher.join(user);
        let (_c2, mut rx2) = dispatcher.join(user);
        assert_eq!(dispatcher.connection_count(user), 2);

        dispatcher.send_to_user(user, ready(user));
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn events_are_not_delivered_to_other_users() {
        let dispatcher = Dispatcher::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let (_ca, mut rx_a) = dispatcher.join(a);
        let (_cb, mut rx_b) = dispatcher.join(b);

        dispatcher.send_to_user(a, ready(a));
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn leave_removes_only_that_connection() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (c1, mut rx1) = dispatcher.join(user);
        let (_c2, mut rx2) = dispatcher.join(user);

        dispatcher.leave(user, c1);
        assert_eq!(dispatcher.connection_count(user), 1);

        dispatcher.send_to_user(user, ready(user));
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }
}

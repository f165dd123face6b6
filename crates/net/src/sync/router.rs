use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::net::MessageContext;
use crate::protocol::{Packet, PacketError};

type Handler = Arc<dyn Fn(&[u8], &MessageContext) -> Result<(), PacketError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Routes inbound packets to typed handlers by their leading tag byte.
///
/// A tag may have several subscribers; they are called in registration
/// order. Each handler receives the decoded packet; a malformed body is
/// reported to the caller and reaches no handler.
#[derive(Default)]
pub struct PacketRouter {
    handlers: HashMap<u8, Vec<(HandlerId, Handler)>>,
    next_id: u64,
}

pub type SharedRouter = Arc<RwLock<PacketRouter>>;

impl PacketRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRouter {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn register<P, F>(&mut self, handler: F) -> HandlerId
    where
        P: Packet + 'static,
        F: Fn(P, &MessageContext) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id);
        self.next_id += 1;

        let handler: Handler = Arc::new(move |raw: &[u8], context: &MessageContext| {
            let packet = P::decode(raw)?;
            handler(packet, context);
            Ok(())
        });
        self.handlers.entry(P::TYPE).or_default().push((id, handler));
        id
    }

    /// Removes every handler registered for `P`.
    pub fn remove_callback<P: Packet>(&mut self) -> usize {
        self.handlers.remove(&P::TYPE).map_or(0, |list| list.len())
    }

    pub fn remove_handler(&mut self, id: HandlerId) -> bool {
        for list in self.handlers.values_mut() {
            if let Some(position) = list.iter().position(|(handler_id, _)| *handler_id == id) {
                list.remove(position);
                return true;
            }
        }
        false
    }

    pub fn handler_count(&self, tag: u8) -> usize {
        self.handlers.get(&tag).map_or(0, Vec::len)
    }

    /// Returns `Ok(false)` for empty payloads and tags nobody subscribed to.
    pub fn dispatch(&self, raw: &[u8], context: &MessageContext) -> Result<bool, PacketError> {
        let Some(&tag) = raw.first() else {
            return Ok(false);
        };
        let Some(list) = self.handlers.get(&tag).filter(|list| !list.is_empty()) else {
            return Ok(false);
        };

        // Decoding is deterministic, so a bad body already fails for the first
        // subscriber before it runs.
        for (_, handler) in list {
            handler(raw, context)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ConnectionId;
    use crate::protocol::{DestroyRemotePlayer, RemotePlayerDied};
    use parking_lot::Mutex;

    fn context() -> MessageContext {
        MessageContext {
            connection: ConnectionId(1),
            round_trip_time: 0.05,
        }
    }

    #[test]
    fn subscribers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = PacketRouter::new();

        for name in ["first", "second"] {
            let log = Arc::clone(&log);
            router.register::<DestroyRemotePlayer, _>(move |packet, _| {
                log.lock().push((name, packet.index));
            });
        }

        let raw = DestroyRemotePlayer { index: 4 }.encode();
        assert_eq!(router.dispatch(&raw, &context()), Ok(true));
        assert_eq!(*log.lock(), vec![("first", 4), ("second", 4)]);
    }

    #[test]
    fn unknown_tag_is_ignored() {
        let router = PacketRouter::new();
        assert_eq!(router.dispatch(&[200, 1, 2], &context()), Ok(false));
        assert_eq!(router.dispatch(&[], &context()), Ok(false));
    }

    #[test]
    fn malformed_body_reaches_no_handler() {
        let calls = Arc::new(Mutex::new(0));
        let mut router = PacketRouter::new();
        let counter = Arc::clone(&calls);
        router.register::<DestroyRemotePlayer, _>(move |_, _| *counter.lock() += 1);

        let tag_only = [DestroyRemotePlayer::TYPE];
        assert!(matches!(
            router.dispatch(&tag_only, &context()),
            Err(PacketError::Truncated { .. })
        ));
        assert_eq!(*calls.lock(), 0);
    }

    #[test]
    fn remove_by_type_and_by_id() {
        let mut router = PacketRouter::new();
        let keep = router.register::<RemotePlayerDied, _>(|_, _| {});
        let dropped = router.register::<RemotePlayerDied, _>(|_, _| {});
        router.register::<DestroyRemotePlayer, _>(|_, _| {});

        assert!(router.remove_handler(dropped));
        assert!(!router.remove_handler(dropped));
        assert_eq!(router.handler_count(RemotePlayerDied::TYPE), 1);

        assert_eq!(router.remove_callback::<DestroyRemotePlayer>(), 1);
        assert_eq!(router.handler_count(DestroyRemotePlayer::TYPE), 0);

        assert!(router.remove_handler(keep));
        let raw = RemotePlayerDied { index: 1 }.encode();
        assert_eq!(router.dispatch(&raw, &context()), Ok(false));
    }

    #[test]
    fn context_carries_round_trip_time() {
        let seen = Arc::new(Mutex::new(None));
        let mut router = PacketRouter::new();
        let slot = Arc::clone(&seen);
        router.register::<RemotePlayerDied, _>(move |_, ctx| {
            *slot.lock() = Some(ctx.round_trip_time);
        });

        router
            .dispatch(&RemotePlayerDied { index: 2 }.encode(), &context())
            .unwrap();
        assert_eq!(*seen.lock(), Some(0.05));
    }
}

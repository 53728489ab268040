use super::OutboundQueue;
use crate::instrument;
use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use parking_lot::RwLock;
use smol_str::SmolStr;
use std::{collections::HashSet, str::FromStr, sync::Arc};

pub type ClientId = u64;

/// What kind of consumer is on the other end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum ClientKind {
    #[display("bot")]
    Bot,
    #[display("web")]
    Web,
    #[display("unknown")]
    Unknown,
}

impl FromStr for ClientKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "bot" => ClientKind::Bot,
            "web" => ClientKind::Web,
            _ => ClientKind::Unknown,
        })
    }
}

/// Symbol filter of a subscription: everything, or an explicit set.
///
/// New connections start on `All`; a `subscribe` narrows to the given set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolFilter {
    All,
    Symbols(HashSet<SmolStr>),
}

impl SymbolFilter {
    pub fn matches(&self, symbol: &str) -> bool {
        match self {
            SymbolFilter::All => true,
            SymbolFilter::Symbols(set) => set.contains(symbol),
        }
    }
}

/// Which outbound channels a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFilter {
    pub prices: bool,
    pub alerts: bool,
}

impl ChannelFilter {
    /// Bots receive alert deliveries by default; other clients only prices.
    fn default_for(kind: ClientKind) -> Self {
        Self {
            prices: true,
            alerts: kind == ClientKind::Bot,
        }
    }
}

/// One connected client's filter state. Lifetime = connection lifetime.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: ClientId,
    pub kind: ClientKind,
    pub symbols: SymbolFilter,
    pub channels: ChannelFilter,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug)]
struct RegisteredClient {
    subscription: Subscription,
    queue: Arc<OutboundQueue>,
}

/// Tracks connected clients and their filters.
///
/// Reads (broadcast matching) and writes (connect/filter changes) share a
/// `parking_lot::RwLock` with strictly bounded critical sections.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    next_id: RwLock<ClientId>,
    inner: RwLock<FnvHashMap<ClientId, RegisteredClient>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client. `preload` runs against the client's queue
    /// while the registry write lock is held, so nothing published between
    /// the preload (snapshot) and the registration can be missed.
    pub fn register(
        &self,
        kind: ClientKind,
        queue_capacity: usize,
        preload: impl FnOnce(&OutboundQueue),
    ) -> (ClientId, Arc<OutboundQueue>) {
        let id = {
            let mut next = self.next_id.write();
            *next += 1;
            *next
        };
        let queue = Arc::new(OutboundQueue::new(queue_capacity));

        let mut inner = self.inner.write();
        preload(&queue);
        inner.insert(
            id,
            RegisteredClient {
                subscription: Subscription {
                    id,
                    kind,
                    symbols: SymbolFilter::All,
                    channels: ChannelFilter::default_for(kind),
                    connected_at: Utc::now(),
                },
                queue: queue.clone(),
            },
        );
        (id, queue)
    }

    /// Remove a client and close its queue. No enqueue can happen after
    /// this returns.
    pub fn unregister(&self, id: ClientId) -> bool {
        match self.inner.write().remove(&id) {
            Some(client) => {
                client.queue.close();
                true
            }
            None => false,
        }
    }

    pub fn subscribe_all(&self, id: ClientId) {
        if let Some(client) = self.inner.write().get_mut(&id) {
            client.subscription.symbols = SymbolFilter::All;
        }
    }

    /// Narrow the client to an explicit symbol set.
    pub fn subscribe(&self, id: ClientId, symbols: &[String]) {
        let set: HashSet<SmolStr> = symbols.iter().map(|s| instrument::normalise(s)).collect();
        if let Some(client) = self.inner.write().get_mut(&id) {
            client.subscription.symbols = SymbolFilter::Symbols(set);
        }
    }

    /// Remove symbols from an explicit set. A client on `All` is left
    /// unchanged, matching the reference behaviour.
    pub fn unsubscribe(&self, id: ClientId, symbols: &[String]) {
        if let Some(client) = self.inner.write().get_mut(&id) {
            if let SymbolFilter::Symbols(set) = &mut client.subscription.symbols {
                for symbol in symbols {
                    set.remove(&instrument::normalise(symbol));
                }
            }
        }
    }

    pub fn set_channels(&self, id: ClientId, channels: ChannelFilter) {
        if let Some(client) = self.inner.write().get_mut(&id) {
            client.subscription.channels = channels;
        }
    }

    pub fn subscription(&self, id: ClientId) -> Option<Subscription> {
        self.inner.read().get(&id).map(|c| c.subscription.clone())
    }

    pub fn queue(&self, id: ClientId) -> Option<Arc<OutboundQueue>> {
        self.inner.read().get(&id).map(|c| c.queue.clone())
    }

    /// Queues of every client whose symbol filter matches and which has
    /// the prices channel enabled.
    pub fn price_targets(&self, symbol: &str) -> Vec<Arc<OutboundQueue>> {
        self.inner
            .read()
            .values()
            .filter(|c| c.subscription.channels.prices && c.subscription.symbols.matches(symbol))
            .map(|c| c.queue.clone())
            .collect()
    }

    /// Clients receiving alert deliveries. Alert routing ignores symbol
    /// filters: a subscriber of alert notifications gets all of them.
    pub fn alert_targets(&self) -> Vec<(ClientId, Arc<OutboundQueue>)> {
        self.inner
            .read()
            .values()
            .filter(|c| c.subscription.channels.alerts)
            .map(|c| (c.subscription.id, c.queue.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SubscriptionRegistry {
        SubscriptionRegistry::new()
    }

    #[test]
    fn test_register_defaults() {
        let reg = registry();
        let (bot, _) = reg.register(ClientKind::Bot, 8, |_| {});
        let (web, _) = reg.register(ClientKind::Web, 8, |_| {});

        let bot_sub = reg.subscription(bot).unwrap();
        assert_eq!(bot_sub.symbols, SymbolFilter::All);
        assert!(bot_sub.channels.alerts);

        let web_sub = reg.subscription(web).unwrap();
        assert!(web_sub.channels.prices);
        assert!(!web_sub.channels.alerts);
    }

    #[test]
    fn test_symbol_filtering() {
        let reg = registry();
        let (id, _) = reg.register(ClientKind::Web, 8, |_| {});

        assert_eq!(reg.price_targets("EURUSD").len(), 1);

        reg.subscribe(id, &["eurusd".to_string(), "GBP/USD".to_string()]);
        assert_eq!(reg.price_targets("EURUSD").len(), 1);
        assert_eq!(reg.price_targets("GBPUSD").len(), 1);
        assert_eq!(reg.price_targets("USDJPY").len(), 0);

        reg.unsubscribe(id, &["eurusd".to_string()]);
        assert_eq!(reg.price_targets("EURUSD").len(), 0);

        reg.subscribe_all(id);
        assert_eq!(reg.price_targets("USDJPY").len(), 1);
    }

    #[test]
    fn test_unregister_closes_queue() {
        let reg = registry();
        let (id, queue) = reg.register(ClientKind::Bot, 8, |_| {});

        assert!(reg.unregister(id));
        assert!(!reg.unregister(id));
        assert!(reg.subscription(id).is_none());
        assert!(queue.is_closed());
        assert_eq!(reg.price_targets("EURUSD").len(), 0);
    }

    #[test]
    fn test_alert_targets_ignore_symbol_filter() {
        let reg = registry();
        let (bot, _) = reg.register(ClientKind::Bot, 8, |_| {});
        reg.subscribe(bot, &["eurusd".to_string()]);

        assert_eq!(reg.alert_targets().len(), 1);
        reg.set_channels(
            bot,
            ChannelFilter {
                prices: true,
                alerts: false,
            },
        );
        assert!(reg.alert_targets().is_empty());
    }
}

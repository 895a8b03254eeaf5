//! Subscriber registry and event fan-out
//!
//! Every subscriber gets a private unbounded queue drained by its own
//! forwarding task. `dispatch` only ever pushes onto those queues, so a slow
//! or full subscriber channel never holds up the receive loop or any other
//! subscriber, and each subscriber sees events in dispatch order.

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};

use super::kinds::{Event, EventFilter};

/// The channel a subscriber receives events on
pub type EventsChannel = mpsc::Sender<Event>;

struct Subscriber {
    channel: EventsChannel,
    filter: EventFilter,
    queue: mpsc::UnboundedSender<Event>,
}

/// Registry of event subscribers
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `channel` for the kinds in `filter`.
    ///
    /// Returns false when the channel is already registered; the existing
    /// registration is kept as is. Must be called from within a tokio runtime.
    pub async fn add(&self, channel: EventsChannel, filter: EventFilter) -> bool {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.iter().any(|s| s.channel.same_channel(&channel)) {
            return false;
        }

        let (queue, mut pending) = mpsc::unbounded_channel::<Event>();
        let target = channel.clone();
        tokio::spawn(async move {
            while let Some(event) = pending.recv().await {
                if target.send(event).await.is_err() {
                    debug!("Event subscriber went away, stopping its forwarder");
                    break;
                }
            }
        });

        subscribers.push(Subscriber {
            channel,
            filter,
            queue,
        });
        debug!("Added event subscriber ({} total)", subscribers.len());
        true
    }

    /// Remove `channel` from the registry.
    ///
    /// Returns `None` when the channel was not registered, otherwise whether
    /// the registry is now empty.
    pub async fn remove(&self, channel: &EventsChannel) -> Option<bool> {
        let mut subscribers = self.subscribers.write().await;
        let index = subscribers
            .iter()
            .position(|s| s.channel.same_channel(channel))?;

        // dropping the queue sender ends the forwarder once it has drained
        subscribers.remove(index);
        debug!("Removed event subscriber ({} left)", subscribers.len());
        Some(subscribers.is_empty())
    }

    /// Hand `event` to every subscriber whose filter includes its kind
    pub async fn dispatch(&self, event: Event) {
        let subscribers = self.subscribers.read().await;
        let mut delivered = 0;

        for subscriber in subscribers.iter() {
            if subscriber.filter.matches(event.kind) && subscriber.queue.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }

        trace!("Dispatched {} to {} subscriber(s)", event.name(), delivered);
    }

    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::kinds::{decode_event, EventKind};
    use std::time::Duration;
    use tokio::time::timeout;

    fn event(kind: EventKind) -> Event {
        decode_event(format!(r#"{{"eventType": "{}"}}"#, kind.name()).as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let dispatcher = EventDispatcher::new();
        let (tx, _rx) = mpsc::channel(4);

        assert!(dispatcher.add(tx.clone(), EventFilter::ALL).await);
        assert!(!dispatcher.add(tx.clone(), EventFilter::APPLICATIONS).await);
        assert_eq!(dispatcher.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_reports_empty_registry() {
        let dispatcher = EventDispatcher::new();
        let (tx1, _rx1) = mpsc::channel(4);
        let (tx2, _rx2) = mpsc::channel(4);

        dispatcher.add(tx1.clone(), EventFilter::ALL).await;
        dispatcher.add(tx2.clone(), EventFilter::ALL).await;

        assert_eq!(dispatcher.remove(&tx1).await, Some(false));
        assert_eq!(dispatcher.remove(&tx1).await, None);
        assert_eq!(dispatcher.remove(&tx2).await, Some(true));
        assert!(dispatcher.is_empty().await);
    }

    #[tokio::test]
    async fn test_overlapping_filters() {
        let dispatcher = EventDispatcher::new();
        let (apps_tx, mut apps_rx) = mpsc::channel(4);
        let (deploy_tx, mut deploy_rx) = mpsc::channel(4);

        dispatcher
            .add(apps_tx, EventFilter::APPLICATIONS | EventKind::DeploymentSuccess)
            .await;
        dispatcher.add(deploy_tx, EventFilter::DEPLOYMENTS).await;

        dispatcher.dispatch(event(EventKind::DeploymentSuccess)).await;
        dispatcher.dispatch(event(EventKind::StatusUpdate)).await;
        dispatcher.dispatch(event(EventKind::ApiRequest)).await;

        let wait = Duration::from_secs(1);
        assert_eq!(timeout(wait, apps_rx.recv()).await.unwrap().unwrap().kind, EventKind::DeploymentSuccess);
        assert_eq!(timeout(wait, apps_rx.recv()).await.unwrap().unwrap().kind, EventKind::StatusUpdate);
        assert_eq!(timeout(wait, deploy_rx.recv()).await.unwrap().unwrap().kind, EventKind::DeploymentSuccess);

        // nobody subscribed to api requests
        assert!(timeout(Duration::from_millis(50), deploy_rx.recv()).await.is_err());
        assert!(timeout(Duration::from_millis(50), apps_rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_full_channel_does_not_block_others() {
        let dispatcher = EventDispatcher::new();
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(16);

        dispatcher.add(slow_tx, EventFilter::ALL).await;
        dispatcher.add(fast_tx, EventFilter::ALL).await;

        let kinds = [
            EventKind::StatusUpdate,
            EventKind::DeploymentInfo,
            EventKind::AppTerminated,
            EventKind::GroupChangeSuccess,
        ];
        for kind in kinds {
            timeout(Duration::from_secs(1), dispatcher.dispatch(event(kind)))
                .await
                .expect("dispatch must not wait on a full subscriber");
        }

        for kind in kinds {
            let received = timeout(Duration::from_secs(1), fast_rx.recv()).await.unwrap().unwrap();
            assert_eq!(received.kind, kind);
        }

        // the slow subscriber still gets everything, in order
        for kind in kinds {
            let received = timeout(Duration::from_secs(1), slow_rx.recv()).await.unwrap().unwrap();
            assert_eq!(received.kind, kind);
        }
    }
}

// In-process broker (dev mode, tests)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pulseboard_core::{PulseError, Result};
use tracing::trace;

use super::{Broker, Subscription, SubscriptionHandle, SubscriberRegistry};

pub struct InMemoryBroker {
    registry: SubscriberRegistry,
    closed: AtomicBool,
}

impl InMemoryBroker {
    pub fn new(buffer: usize) -> Self {
        Self {
            registry: SubscriberRegistry::new(buffer),
            closed: AtomicBool::new(false),
        }
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.registry.subscriber_count(channel)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(super::DEFAULT_SUBSCRIBER_BUFFER)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, channel: &str, message: String) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PulseError::delivery("broker is closed"));
        }
        let delivered = self.registry.dispatch(channel, Arc::from(message));
        trace!(channel, delivered, "Published");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PulseError::delivery("broker is closed"));
        }
        let (subscription, _) = self.registry.register(channel);
        Ok(subscription)
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        self.registry.unregister(handle);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.registry.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulseboard_core::project_channel;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_messages_after_subscribe_in_order() {
        let broker = InMemoryBroker::default();
        broker.publish("c", "before".to_string()).await.unwrap();

        let mut sub = broker.subscribe("c").await.unwrap();
        for i in 0..5 {
            broker.publish("c", format!("m{i}")).await.unwrap();
        }

        for i in 0..5 {
            assert_eq!(&*sub.receiver.recv().await.unwrap(), format!("m{i}"));
        }
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_no_cross_talk_between_projects() {
        let broker = Arc::new(InMemoryBroker::default());
        let projects: Vec<Uuid> = (0..8).map(|_| Uuid::now_v7()).collect();

        let mut subs = Vec::new();
        for project in &projects {
            for _ in 0..3 {
                subs.push((*project, broker.subscribe(&project_channel(*project)).await.unwrap()));
            }
        }

        let mut publishers = Vec::new();
        for project in projects.clone() {
            let broker = Arc::clone(&broker);
            publishers.push(tokio::spawn(async move {
                for i in 0..20 {
                    broker
                        .publish(&project_channel(project), format!("{project}:{i}"))
                        .await
                        .unwrap();
                }
            }));
        }
        for p in publishers {
            p.await.unwrap();
        }

        for (project, mut sub) in subs {
            for i in 0..20 {
                let msg = sub.receiver.recv().await.unwrap();
                assert_eq!(&*msg, format!("{project}:{i}"));
            }
            assert!(sub.receiver.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery_and_is_idempotent() {
        let broker = InMemoryBroker::default();
        let mut sub = broker.subscribe("c").await.unwrap();

        broker.unsubscribe(&sub.handle).await.unwrap();
        broker.unsubscribe(&sub.handle).await.unwrap();

        broker.publish("c", "late".to_string()).await.unwrap();
        assert!(sub.receiver.recv().await.is_none());
        assert_eq!(broker.subscriber_count("c"), 0);
    }

    #[tokio::test]
    async fn test_publish_after_close_fails() {
        let broker = InMemoryBroker::default();
        let mut sub = broker.subscribe("c").await.unwrap();
        broker.close().await.unwrap();

        let err = broker.publish("c", "x".to_string()).await.unwrap_err();
        assert!(matches!(err, PulseError::Delivery(_)));
        assert!(sub.receiver.recv().await.is_none());
    }
}

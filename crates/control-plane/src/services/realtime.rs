// Realtime service
//
// Connection lifecycle: Connecting -> Authorizing -> Subscribed -> Streaming -> Closed.
// A LiveSubscription owns its broker handle; it is released exactly once,
// by `close()` or, failing that, when the subscription is dropped.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use pulseboard_core::{project_channel, ProjectDirectory, PulseError, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::{Broker, BrokerMessage, SubscriptionHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authorizing,
    Subscribed,
    Streaming,
    Closed,
}

impl ConnectionState {
    fn can_advance_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Authorizing)
                | (Authorizing, Subscribed)
                | (Subscribed, Streaming)
                | (_, Closed)
        ) && self != Closed
    }
}

/// Per-connection state tracking, shared by the WebSocket and SSE handlers
#[derive(Debug)]
pub struct Connection {
    pub project_id: Uuid,
    pub user_id: Uuid,
    state: ConnectionState,
}

impl Connection {
    pub fn new(project_id: Uuid, user_id: Uuid) -> Self {
        debug!(%project_id, %user_id, "Connection accepted");
        Self {
            project_id,
            user_id,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move to `next`. Illegal transitions are ignored and return false.
    pub fn advance(&mut self, next: ConnectionState) -> bool {
        if !self.state.can_advance_to(next) {
            warn!(project_id = %self.project_id, from = ?self.state, to = ?next, "Ignored connection transition");
            return false;
        }
        debug!(project_id = %self.project_id, user_id = %self.user_id, from = ?self.state, to = ?next, "Connection state");
        self.state = next;
        true
    }
}

pub struct RealtimeService {
    projects: Arc<dyn ProjectDirectory>,
    broker: Arc<dyn Broker>,
}

impl RealtimeService {
    pub fn new(projects: Arc<dyn ProjectDirectory>, broker: Arc<dyn Broker>) -> Self {
        Self { projects, broker }
    }

    /// `Unauthorized` unless `user_id` owns `project_id`. A failed lookup is
    /// treated as a refusal.
    pub async fn authorize(&self, project_id: Uuid, user_id: Uuid) -> Result<()> {
        match self.projects.is_project_owner(project_id, user_id).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                info!(%project_id, %user_id, "Unauthorized realtime connection");
                Err(PulseError::Unauthorized)
            }
            Err(e) => {
                warn!(%project_id, %user_id, error = %e, "Ownership lookup failed");
                Err(PulseError::Unauthorized)
            }
        }
    }

    /// Subscribe to the project's channel
    pub async fn open(&self, project_id: Uuid) -> Result<LiveSubscription> {
        let subscription = self.broker.subscribe(&project_channel(project_id)).await?;
        Ok(LiveSubscription {
            project_id,
            handle: Some(subscription.handle),
            receiver: subscription.receiver,
            broker: Arc::clone(&self.broker),
        })
    }
}

/// Messages of one project channel for one connection
pub struct LiveSubscription {
    project_id: Uuid,
    handle: Option<SubscriptionHandle>,
    receiver: mpsc::Receiver<BrokerMessage>,
    broker: Arc<dyn Broker>,
}

impl LiveSubscription {
    pub fn project_id(&self) -> Uuid {
        self.project_id
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Next message; `None` once the subscription or the broker is closed
    pub async fn next_message(&mut self) -> Option<BrokerMessage> {
        self.receiver.recv().await
    }

    /// Release the broker handle. Further calls do nothing.
    pub async fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.receiver.close();
        if let Err(e) = self.broker.unsubscribe(&handle).await {
            warn!(project_id = %self.project_id, error = %e, "Unsubscribe failed");
        }
        debug!(project_id = %self.project_id, "Live subscription closed");
    }
}

impl Stream for LiveSubscription {
    type Item = BrokerMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let broker = Arc::clone(&self.broker);
        let project_id = self.project_id;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = broker.unsubscribe(&handle).await {
                        warn!(%project_id, error = %e, "Unsubscribe on drop failed");
                    }
                    debug!(%project_id, "Live subscription released on drop");
                });
            }
            Err(_) => warn!(%project_id, "Live subscription dropped outside a runtime"),
        }
    }
}

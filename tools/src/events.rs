//! Transport seams to the caller: a sink for status events and a channel
//! that runs direct tools out of band.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use toolrelay_types::{StatusEvent, ToolCallEvent};

pub type EventFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, EventError>> + Send + 'a>>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum EventError {
    #[error("event channel closed")]
    Closed,
    #[error("event channel full")]
    Full,
    #[error("caller dropped the reply")]
    NoReply,
    #[error("no event-call channel attached")]
    Unavailable,
    #[error("caller rejected the call: {0}")]
    Rejected(String),
}

/// Receives status events.
pub trait EventSink: Send + Sync {
    fn emit<'a>(&'a self, event: &'a StatusEvent) -> EventFut<'a, ()>;
}

/// Runs a direct tool on the caller's side and returns its result.
pub trait EventCaller: Send + Sync {
    fn call<'a>(&'a self, event: &'a ToolCallEvent) -> EventFut<'a, Value>;
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit<'a>(&'a self, _event: &'a StatusEvent) -> EventFut<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// Sink backed by a bounded channel.
///
/// Never waits for room: when the consumer falls behind, the event is
/// dropped with [`EventError::Full`].
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<StatusEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(tx: mpsc::Sender<StatusEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn emit<'a>(&'a self, event: &'a StatusEvent) -> EventFut<'a, ()> {
        let sent = self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EventError::Full,
            mpsc::error::TrySendError::Closed(_) => EventError::Closed,
        });
        Box::pin(async move { sent })
    }
}

/// One direct-tool call waiting for the caller's answer.
#[derive(Debug)]
pub struct CallRequest {
    pub event: ToolCallEvent,
    pub reply: oneshot::Sender<Result<Value, String>>,
}

/// Event caller backed by a channel of [`CallRequest`]s.
#[derive(Debug, Clone)]
pub struct ChannelCaller {
    tx: mpsc::Sender<CallRequest>,
}

impl ChannelCaller {
    #[must_use]
    pub fn new(tx: mpsc::Sender<CallRequest>) -> Self {
        Self { tx }
    }
}

impl EventCaller for ChannelCaller {
    fn call<'a>(&'a self, event: &'a ToolCallEvent) -> EventFut<'a, Value> {
        Box::pin(async move {
            let (reply, answer) = oneshot::channel();
            self.tx
                .send(CallRequest {
                    event: event.clone(),
                    reply,
                })
                .await
                .map_err(|_| EventError::Closed)?;
            answer
                .await
                .map_err(|_| EventError::NoReply)?
                .map_err(EventError::Rejected)
        })
    }
}

/// Caller for runs without an event-call channel. Every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedCaller;

impl EventCaller for DetachedCaller {
    fn call<'a>(&'a self, _event: &'a ToolCallEvent) -> EventFut<'a, Value> {
        Box::pin(async { Err(EventError::Unavailable) })
    }
}

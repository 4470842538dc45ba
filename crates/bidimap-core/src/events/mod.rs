//! Event manager: per-channel, per-context subscription tracking with
//! bounded event buffering and ordered replay on subscribe.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::browsing_context::ContextId;
use crate::error::BidiError;

#[cfg(test)]
mod tests;

/// A subscription channel. `None` is the default (unlabelled) channel.
pub type Channel = Option<String>;

/// Default per-event buffer capacity. Only `log.entryAdded` is retained; every
/// other recognized event is a pure fan-out with no replay history.
fn default_buffer_capacity(event: &str) -> usize {
    match event {
        "log.entryAdded" => 100,
        _ => 0,
    }
}

#[derive(Clone)]
struct Subscription {
    event: String,
    context: Option<ContextId>,
    channel: Channel,
}

#[derive(Clone)]
struct BufferedEvent {
    id: u64,
    params: Value,
}

/// Subscription graph, per-event buffers, and ordered fan-out to channels.
#[derive(Default)]
pub struct EventManager {
    subscriptions: RwLock<Vec<Subscription>>,
    buffers: RwLock<HashMap<(String, Option<ContextId>), VecDeque<BufferedEvent>>>,
    last_sent: RwLock<HashMap<(String, Option<ContextId>, Channel), u64>>,
    next_event_id: AtomicU64,
    /// Overrides `default_buffer_capacity` for the events named here,
    /// per [`crate::session::MapperSessionOptions::event_buffer_capacity`].
    capacity_overrides: HashMap<String, usize>,
}

impl EventManager {
    /// Create an empty event manager using the default capacity table
    /// (`log.entryAdded` = 100, everything else unbuffered).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty event manager with per-event buffer capacities
    /// overriding the default table.
    #[must_use]
    pub fn with_capacity_overrides(capacity_overrides: HashMap<String, usize>) -> Self {
        Self {
            capacity_overrides,
            ..Self::default()
        }
    }

    fn buffer_capacity(&self, event: &str) -> usize {
        self.capacity_overrides
            .get(event)
            .copied()
            .unwrap_or_else(|| default_buffer_capacity(event))
    }

    /// Whether any channel is currently subscribed to `event` for
    /// `context` (or globally). Callers should check this before doing
    /// expensive work to build an event's `params` (e.g. serializing
    /// console call arguments for `log.entryAdded`) when nobody would
    /// receive it.
    pub async fn has_subscriber(&self, event: &str, context: Option<&str>) -> bool {
        let subs = self.subscriptions.read().await;
        subs.iter()
            .any(|s| s.event == event && (s.context.is_none() || s.context.as_deref() == context))
    }

    /// Register a new occurrence of `event` for `context`, returning the
    /// finalized BiDi event envelopes (one per subscribed channel, with
    /// `channel` embedded when non-default) to emit immediately.
    ///
    /// If the event family is buffer-able, it is also stored in the
    /// per-`(event, context)` ring buffer for later replay.
    pub async fn register_event(
        &self,
        event: &str,
        context: Option<&str>,
        params: Value,
    ) -> Vec<Value> {
        let id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        let context_owned = context.map(ToString::to_string);

        let channels = self.matching_channels(event, context).await;
        let mut out = Vec::with_capacity(channels.len());
        {
            let mut last_sent = self.last_sent.write().await;
            for channel in &channels {
                out.push(envelope(event, &params, channel.clone()));
                last_sent.insert((event.to_string(), context_owned.clone(), channel.clone()), id);
            }
        }

        let capacity = self.buffer_capacity(event);
        if capacity > 0 {
            let mut buffers = self.buffers.write().await;
            let buf = buffers
                .entry((event.to_string(), context_owned))
                .or_default();
            buf.push_back(BufferedEvent { id, params });
            while buf.len() > capacity {
                buf.pop_front();
            }
        }

        out
    }

    /// The channels currently subscribed to `(event, context)`, in
    /// subscription-registration order, deduplicated.
    async fn matching_channels(&self, event: &str, context: Option<&str>) -> Vec<Channel> {
        let subs = self.subscriptions.read().await;
        let mut seen = Vec::new();
        for s in subs.iter() {
            if s.event == event
                && (s.context.is_none() || s.context.as_deref() == context)
                && !seen.contains(&s.channel)
            {
                seen.push(s.channel.clone());
            }
        }
        seen
    }

    /// Subscribe `channel` to every `(event, context)` pair in the
    /// cartesian product of `events` × `contexts`, validating each context
    /// id via `validate_context` first. An empty `contexts` is treated as
    /// a single global (`None`) subscription.
    ///
    /// Returns the buffered events that must be replayed to `channel`
    /// immediately, in ascending id order per `(event, context)`.
    ///
    /// # Errors
    ///
    /// Propagates whatever `validate_context` returns for the first
    /// invalid context id (normally [`BidiError::NoSuchFrame`]).
    pub async fn subscribe<F, Fut>(
        &self,
        events: &[String],
        contexts: &[String],
        channel: Channel,
        mut validate_context: F,
    ) -> Result<Vec<Value>, BidiError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<(), BidiError>>,
    {
        for ctx in contexts {
            validate_context(ctx.clone()).await?;
        }

        let targets: Vec<Option<ContextId>> = if contexts.is_empty() {
            vec![None]
        } else {
            contexts.iter().cloned().map(Some).collect()
        };

        {
            let mut subs = self.subscriptions.write().await;
            for event in events {
                for ctx in &targets {
                    subs.push(Subscription {
                        event: event.clone(),
                        context: ctx.clone(),
                        channel: channel.clone(),
                    });
                }
            }
        }
        debug!(?events, ?contexts, channel = ?channel, "subscribed");

        let mut replay = Vec::new();
        for event in events {
            for ctx in &targets {
                replay.extend(self.replay_for(event, ctx.as_deref(), &channel).await);
            }
        }
        Ok(replay)
    }

    /// Replay buffered events with `id > lastSent` for `(event, context,
    /// channel)`, updating `lastSent` to the highest id replayed. A `None`
    /// context merges buffered events across every known context for
    /// `event`, ordered by id.
    async fn replay_for(&self, event: &str, context: Option<&str>, channel: &Channel) -> Vec<Value> {
        let key = (event.to_string(), context.map(ToString::to_string), channel.clone());
        let last = self.last_sent.read().await.get(&key).copied().unwrap_or(0);

        let mut collected: Vec<BufferedEvent> = {
            let buffers = self.buffers.read().await;
            match context {
                Some(ctx) => buffers
                    .get(&(event.to_string(), Some(ctx.to_string())))
                    .map(|buf| buf.iter().cloned().collect())
                    .unwrap_or_default(),
                None => buffers
                    .iter()
                    .filter(|((name, _), _)| name == event)
                    .flat_map(|(_, buf)| buf.iter().cloned())
                    .collect(),
            }
        };
        collected.retain(|e| e.id > last);
        collected.sort_by_key(|e| e.id);

        let mut out = Vec::with_capacity(collected.len());
        let mut max_id = last;
        for e in &collected {
            out.push(envelope(event, &e.params, channel.clone()));
            max_id = max_id.max(e.id);
        }
        if max_id > last {
            self.last_sent.write().await.insert(key, max_id);
        }
        out
    }

    /// Remove every `(event, context, channel)` subscription matching the
    /// cartesian product of `events` × `contexts`. Does not disable any
    /// backing CDP domain (other subscribers may still rely on it).
    pub async fn unsubscribe(&self, events: &[String], contexts: &[String], channel: &Channel) {
        let targets: Vec<Option<ContextId>> = if contexts.is_empty() {
            vec![None]
        } else {
            contexts.iter().cloned().map(Some).collect()
        };
        self.subscriptions.write().await.retain(|s| {
            !(events.contains(&s.event) && targets.contains(&s.context) && &s.channel == channel)
        });
    }
}

fn envelope(event: &str, params: &Value, channel: Channel) -> Value {
    let mut value = serde_json::json!({ "method": event, "params": params });
    if let Some(ch) = channel {
        if let Value::Object(map) = &mut value {
            map.insert("channel".to_string(), Value::String(ch));
        }
    }
    value
}

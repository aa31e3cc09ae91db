//! The NDJSON hook loop behind `kbridge serve`.
//!
//! One JSON event per input line. Events are routed into per-key lanes: a lane
//! is a task that handles its key's events one at a time, in arrival order, so
//! a `message_received` sent right after `session_start` always sees the new
//! mapping. Different keys run concurrently. A subagent's events share its
//! parent's lane from `subagent_spawned` until `subagent_ended`.
//!
//! `before_agent_start` only recalls and never touches the tracker, so it runs
//! outside the lanes and its reply isn't held up by a slow flush or compile.
//! Replies are written as single JSON lines in completion order; hosts
//! correlate them by `id`.
//!
//! At end of input every lane is drained and any snapshot sync they started
//! is awaited before returning.

use anyhow::Result;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::bridge::Bridge;
use crate::lifecycle::{dispatch, EventEnvelope, HostEvent};

/// Read events from `input` until it closes, writing replies to `output`.
pub async fn serve<R, W>(bridge: Arc<Bridge>, input: R, output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (reply_tx, reply_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_replies(output, reply_rx));

    let mut router = EventRouter::new(Arc::clone(&bridge), reply_tx);
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<EventEnvelope>(line) {
            Ok(envelope) => router.route(envelope),
            Err(e) => warn!(error = %e, "skipping malformed event line"),
        }
    }

    router.shutdown().await;
    bridge.snapshot().wait_idle().await;
    writer.await?;
    info!("hook input closed, all events handled");
    Ok(())
}

async fn write_replies<W>(mut output: W, mut replies: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = replies.recv().await {
        if output.write_all(line.as_bytes()).await.is_err()
            || output.write_all(b"\n").await.is_err()
            || output.flush().await.is_err()
        {
            warn!("reply output closed, dropping replies");
            break;
        }
    }
}

struct Lane {
    events: mpsc::UnboundedSender<EventEnvelope>,
    done: JoinHandle<()>,
}

/// Assigns each event to a lane and owns the lanes' lifetimes.
struct EventRouter {
    bridge: Arc<Bridge>,
    replies: mpsc::UnboundedSender<String>,
    lanes: HashMap<String, Lane>,
    /// Subagent key to the lane key of the parent it was spawned from.
    aliases: HashMap<String, String>,
    /// Lanes closed by `session_end` that may still be draining. A new lane
    /// for the same key waits for its predecessor.
    retired: HashMap<String, JoinHandle<()>>,
    /// `before_agent_start` tasks.
    unordered: JoinSet<()>,
}

impl EventRouter {
    fn new(bridge: Arc<Bridge>, replies: mpsc::UnboundedSender<String>) -> Self {
        Self {
            bridge,
            replies,
            lanes: HashMap::new(),
            aliases: HashMap::new(),
            retired: HashMap::new(),
            unordered: JoinSet::new(),
        }
    }

    fn route(&mut self, envelope: EventEnvelope) {
        self.reap();

        if matches!(envelope.event, HostEvent::BeforeAgentStart { .. }) {
            let bridge = Arc::clone(&self.bridge);
            let replies = self.replies.clone();
            self.unordered
                .spawn(async move { handle(&bridge, &replies, envelope).await });
            return;
        }

        let key = envelope.event.ordering_key();
        let lane_key = self.aliases.get(&key).cloned().unwrap_or_else(|| key.clone());

        let mut ends_lane = false;
        match &envelope.event {
            HostEvent::SubagentSpawned {
                child_session_key, ..
            } => {
                self.aliases
                    .insert(child_session_key.clone(), lane_key.clone());
            }
            HostEvent::SubagentEnded { .. } => {
                self.aliases.remove(&key);
            }
            HostEvent::SessionEnd { .. } => ends_lane = key == lane_key,
            _ => {}
        }

        self.send(&lane_key, envelope);

        if ends_lane {
            if let Some(lane) = self.lanes.remove(&lane_key) {
                debug!(local_key = %lane_key, "session ended, retiring lane");
                self.retired.insert(lane_key, lane.done);
            }
        }
    }

    fn send(&mut self, lane_key: &str, envelope: EventEnvelope) {
        let mut envelope = envelope;
        // A lane whose task died (it panicked) is replaced once.
        for _ in 0..2 {
            let lane = match self.lanes.entry(lane_key.to_string()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let previous = self.retired.remove(entry.key());
                    entry.insert(spawn_lane(
                        Arc::clone(&self.bridge),
                        self.replies.clone(),
                        previous,
                    ))
                }
            };
            match lane.events.send(envelope) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    warn!(local_key = %lane_key, "event lane stopped, restarting it");
                    self.lanes.remove(lane_key);
                    envelope = returned;
                }
            }
        }
        warn!(local_key = %lane_key, event = envelope.event.name(), "event dropped");
    }

    /// Forget finished work so long sessions don't accumulate handles.
    fn reap(&mut self) {
        self.retired.retain(|_, done| !done.is_finished());
        while let Some(joined) = self.unordered.try_join_next() {
            if let Err(e) = joined {
                warn!(error = %e, "event task panicked");
            }
        }
    }

    /// Close every lane and wait for all queued events to be handled.
    async fn shutdown(mut self) {
        info!(
            lanes = self.lanes.len(),
            retiring = self.retired.len(),
            "draining event lanes"
        );
        let handles: Vec<JoinHandle<()>> = self
            .lanes
            .drain()
            .map(|(_, lane)| lane.done)
            .chain(self.retired.drain().map(|(_, done)| done))
            .collect();
        for done in handles {
            if let Err(e) = done.await {
                warn!(error = %e, "event lane panicked");
            }
        }
        while let Some(joined) = self.unordered.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "event task panicked");
            }
        }
    }
}

fn spawn_lane(
    bridge: Arc<Bridge>,
    replies: mpsc::UnboundedSender<String>,
    previous: Option<JoinHandle<()>>,
) -> Lane {
    let (events, mut queue) = mpsc::unbounded_channel::<EventEnvelope>();
    let done = tokio::spawn(async move {
        if let Some(previous) = previous {
            if let Err(e) = previous.await {
                warn!(error = %e, "previous event lane panicked");
            }
        }
        while let Some(envelope) = queue.recv().await {
            handle(&bridge, &replies, envelope).await;
        }
    });
    Lane { events, done }
}

async fn handle(bridge: &Bridge, replies: &mpsc::UnboundedSender<String>, envelope: EventEnvelope) {
    let event = envelope.event.name();
    let Some(reply) = dispatch(bridge, envelope).await else {
        return;
    };
    match serde_json::to_string(&reply) {
        Ok(line) => {
            let _ = replies.send(line);
        }
        Err(e) => warn!(event, error = %e, "failed to encode reply"),
    }
}

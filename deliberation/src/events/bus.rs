//! Event bus and per-sub-problem bridge.
//!
//! The bus is a Tokio broadcast channel: a one-way observability sink the
//! orchestration layer never reads back. Publishing with no subscribers is
//! not an error.
//!
//! The `EventBridge` is pre-tagged with one sub-problem's identity, so a
//! deliberator running as a detached concurrent task emits fully
//! attributable events without knowing about delivery mechanics. Events
//! from one bridge arrive in emission order; there is no cross-sub-problem
//! ordering guarantee.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::DeliberationEvent;
use crate::persona::{DeliberationPhase, PersonaProfile};

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to the bus.
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast-backed progress event bus.
pub struct EventBus {
    sender: broadcast::Sender<DeliberationEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish to all subscribers. No receivers is fine.
    pub fn publish(&self, event: DeliberationEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "event published"),
            Err(_) => debug!(event_type, "event published (no receivers)"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeliberationEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Filter for selective subscription.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub sub_problem_index: Option<usize>,
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sub_problem(mut self, index: usize) -> Self {
        self.sub_problem_index = Some(index);
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    pub fn matches(&self, event: &DeliberationEvent) -> bool {
        if let Some(index) = self.sub_problem_index {
            if event.sub_problem_index() != Some(index) {
                return false;
            }
        }
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }
        true
    }
}

/// Receiver that only yields events matching a filter.
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<DeliberationEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<DeliberationEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    pub async fn recv(&mut self) -> Result<DeliberationEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

/// Extension for filtered subscriptions.
pub trait EventBusExt {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver;
}

impl EventBusExt for EventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

/// Publisher pre-tagged with one sub-problem's identity.
#[derive(Clone)]
pub struct EventBridge {
    bus: SharedEventBus,
    sub_problem_index: usize,
    sub_problem_id: String,
}

impl EventBridge {
    pub fn new(bus: SharedEventBus, sub_problem_index: usize, sub_problem_id: &str) -> Self {
        Self {
            bus,
            sub_problem_index,
            sub_problem_id: sub_problem_id.to_string(),
        }
    }

    pub fn sub_problem_index(&self) -> usize {
        self.sub_problem_index
    }

    pub fn persona_selected(&self, panel: &[PersonaProfile], phase: DeliberationPhase) {
        self.bus.publish(DeliberationEvent::PersonaSelected {
            sub_problem_index: self.sub_problem_index,
            sub_problem_id: self.sub_problem_id.clone(),
            persona_codes: panel.iter().map(|p| p.code.clone()).collect(),
            phase: phase.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn round_started(&self, round: u32, panel_size: usize) {
        self.bus.publish(DeliberationEvent::RoundStarted {
            sub_problem_index: self.sub_problem_index,
            sub_problem_id: self.sub_problem_id.clone(),
            round,
            panel_size,
            timestamp: Utc::now(),
        });
    }

    pub fn round_complete(&self, round: u32, contributions: usize) {
        self.bus.publish(DeliberationEvent::RoundComplete {
            sub_problem_index: self.sub_problem_index,
            sub_problem_id: self.sub_problem_id.clone(),
            round,
            contributions,
            timestamp: Utc::now(),
        });
    }

    pub fn voting_started(&self) {
        self.bus.publish(DeliberationEvent::VotingStarted {
            sub_problem_index: self.sub_problem_index,
            sub_problem_id: self.sub_problem_id.clone(),
            timestamp: Utc::now(),
        });
    }

    pub fn voting_complete(&self, votes: usize) {
        self.bus.publish(DeliberationEvent::VotingComplete {
            sub_problem_index: self.sub_problem_index,
            sub_problem_id: self.sub_problem_id.clone(),
            votes,
            timestamp: Utc::now(),
        });
    }

    pub fn synthesis_started(&self) {
        self.bus.publish(DeliberationEvent::SynthesisStarted {
            sub_problem_index: self.sub_problem_index,
            sub_problem_id: self.sub_problem_id.clone(),
            timestamp: Utc::now(),
        });
    }

    pub fn synthesis_complete(&self) {
        self.bus.publish(DeliberationEvent::SynthesisComplete {
            sub_problem_index: self.sub_problem_index,
            sub_problem_id: self.sub_problem_id.clone(),
            timestamp: Utc::now(),
        });
    }

    pub fn sub_problem_failed(&self, reason: &str) {
        self.bus.publish(DeliberationEvent::SubProblemFailed {
            sub_problem_index: self.sub_problem_index,
            sub_problem_id: self.sub_problem_id.clone(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn sub_problem_complete(&self, rounds: u32) {
        self.bus.publish(DeliberationEvent::SubProblemComplete {
            sub_problem_index: self.sub_problem_index,
            sub_problem_id: self.sub_problem_id.clone(),
            rounds,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(DeliberationEvent::SessionStarted {
            session_id: "s-1".into(),
            total_sub_problems: 2,
            timestamp: Utc::now(),
        });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_type(), "session_started");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(DeliberationEvent::SessionStarted {
            session_id: "s-1".into(),
            total_sub_problems: 1,
            timestamp: Utc::now(),
        });
    }

    #[tokio::test]
    async fn test_bridge_tags_index() {
        let bus = EventBus::new().shared();
        let mut receiver = bus.subscribe();
        let bridge = EventBridge::new(bus.clone(), 3, "sp-4");

        bridge.round_started(1, 4);
        bridge.round_complete(1, 4);

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.sub_problem_index(), Some(3));
        assert_eq!(first.event_type(), "round_started");

        let second = receiver.recv().await.unwrap();
        assert_eq!(second.sub_problem_index(), Some(3));
        assert_eq!(second.event_type(), "round_complete");
    }

    #[tokio::test]
    async fn test_bridge_fifo_order() {
        let bus = EventBus::new().shared();
        let mut receiver = bus.subscribe();
        let bridge = EventBridge::new(bus.clone(), 0, "sp-1");

        for round in 1..=3 {
            bridge.round_started(round, 3);
            bridge.round_complete(round, 3);
        }

        let mut rounds_seen = Vec::new();
        for _ in 0..6 {
            if let DeliberationEvent::RoundStarted { round, .. }
            | DeliberationEvent::RoundComplete { round, .. } = receiver.recv().await.unwrap()
            {
                rounds_seen.push(round);
            }
        }
        assert_eq!(rounds_seen, vec![1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_filter_matching() {
        let filter = EventFilter::new()
            .sub_problem(1)
            .types(vec!["round_started"]);

        let matching = DeliberationEvent::RoundStarted {
            sub_problem_index: 1,
            sub_problem_id: "sp-2".into(),
            round: 1,
            panel_size: 3,
            timestamp: Utc::now(),
        };
        let wrong_index = DeliberationEvent::RoundStarted {
            sub_problem_index: 2,
            sub_problem_id: "sp-3".into(),
            round: 1,
            panel_size: 3,
            timestamp: Utc::now(),
        };
        let wrong_type = DeliberationEvent::VotingStarted {
            sub_problem_index: 1,
            sub_problem_id: "sp-2".into(),
            timestamp: Utc::now(),
        };

        assert!(filter.matches(&matching));
        assert!(!filter.matches(&wrong_index));
        assert!(!filter.matches(&wrong_type));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new().shared();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().sub_problem(1));

        let bridge0 = EventBridge::new(bus.clone(), 0, "sp-1");
        let bridge1 = EventBridge::new(bus.clone(), 1, "sp-2");

        bridge0.round_started(1, 3);
        bridge1.round_started(1, 3);

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.sub_problem_index(), Some(1));
    }
}

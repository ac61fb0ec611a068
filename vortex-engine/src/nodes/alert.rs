//! `alert` node (§4.2, §4.4): per-series level tracking, deduplication,
//! rate-limiting, cross-topic inhibition, and publication to the topic bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use vortex_grammar::{Evaluator, Expr};
use vortex_shared::edge::{EdgeMessage, EdgeReceiver};
use vortex_shared::model::{Point, Value};
use vortex_shared::{Clock, VortexError};

use crate::alerting::{AlertEvent, AlertLevel, AlertSeriesState, InhibitorRegistry, RateLimiter, TopicBus};
use crate::kernel::{Node, NodeId, NodeStats};
use crate::nodes::filter::point_vars;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AlertNodeSnapshot {
    states: HashMap<String, AlertSeriesState>,
}

/// One severity level's predicate, evaluated highest-to-lowest severity
/// (§4.4 step 1): the first predicate that evaluates `true` wins.
pub struct LevelPredicate {
    pub level: AlertLevel,
    pub expr: Expr,
}

pub struct AlertNode {
    id: NodeId,
    topic: String,
    /// Highest severity first: Critical, Warning, Info.
    predicates: Vec<LevelPredicate>,
    id_template: String,
    history_cap: usize,
    state_changes_only: bool,
    inhibit_topics: Vec<String>,
    evaluators: HashMap<String, Evaluator>,
    states: HashMap<String, AlertSeriesState>,
    rate_limiter: RateLimiter,
    bus: Arc<TopicBus>,
    registry: Arc<InhibitorRegistry>,
    clock: Arc<dyn Clock>,
    input: EdgeReceiver<Point>,
    stats: Arc<NodeStats>,
    live_state: Arc<Mutex<Option<Vec<u8>>>>,
}

impl AlertNode {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: NodeId,
        topic: String,
        predicates: Vec<LevelPredicate>,
        id_template: String,
        history_cap: usize,
        state_changes_only: bool,
        rate_limit_ns: i64,
        inhibit_topics: Vec<String>,
        bus: Arc<TopicBus>,
        registry: Arc<InhibitorRegistry>,
        clock: Arc<dyn Clock>,
        input: EdgeReceiver<Point>,
    ) -> Result<Self, VortexError> {
        for p in &predicates {
            vortex_grammar::static_check(&p.expr).map_err(|e| VortexError::ValidationError(e.to_string()))?;
        }
        Ok(Self {
            id,
            topic,
            predicates,
            id_template,
            history_cap,
            state_changes_only,
            inhibit_topics,
            evaluators: HashMap::new(),
            states: HashMap::new(),
            rate_limiter: RateLimiter::new(rate_limit_ns),
            bus,
            registry,
            clock,
            input,
            stats: NodeStats::new(),
            live_state: Arc::new(Mutex::new(None)),
        })
    }

    fn series_id(&self, group_key: &str) -> String {
        self.id_template.replace("{{group}}", group_key)
    }

    fn compute_level(&mut self, group: &str, p: &Point) -> AlertLevel {
        let vars = point_vars(p);
        let evaluator = self.evaluators.entry(group.to_string()).or_default();
        for pred in &self.predicates {
            match evaluator.eval(&pred.expr, &vars) {
                Ok(Value::Bool(true)) => return pred.level,
                // NaN propagates through comparisons as `false` already (§4.2); any
                // other non-matching result (including a non-bool predicate) just
                // falls through to the next, lower-severity predicate.
                Ok(_) => continue,
                Err(e) => {
                    debug!(node = self.id, error = %e, "alert predicate eval error");
                    self.stats.record_eval_error();
                    continue;
                }
            }
        }
        AlertLevel::Ok
    }
}

#[async_trait]
impl Node for AlertNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> &'static str {
        "alert"
    }

    async fn run(mut self: Box<Self>, cancel: CancellationToken) -> Result<(), VortexError> {
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = self.input.recv() => msg,
            };
            match msg {
                Some(EdgeMessage::Data(p)) => {
                    let group = p.group_key();
                    let computed = self.compute_level(&group, &p);
                    let series_id = self.series_id(&group);
                    let now = self.clock.now_nanos();

                    let state = self
                        .states
                        .entry(series_id.clone())
                        .or_insert_with(|| AlertSeriesState::new(self.history_cap));
                    let previous = state.level;
                    let (state_changed, _duration) = state.transition(computed, now);
                    self.registry.set(&self.topic, computed);

                    if state_changed {
                        self.rate_limiter.record_transition(&series_id, now);
                    }

                    let suppressed_by_state_changes_only = !state_changed && self.state_changes_only;
                    let suppressed_by_rate_limit =
                        !state_changed && !suppressed_by_state_changes_only && !self.rate_limiter.allow(&series_id, now);
                    let suppressed_by_inhibitor = self.registry.any_critical(&self.inhibit_topics);

                    self.stats.record_processed();

                    if suppressed_by_state_changes_only || suppressed_by_rate_limit || suppressed_by_inhibitor {
                        continue;
                    }

                    let event = AlertEvent {
                        topic: self.topic.clone(),
                        series_id,
                        level: computed,
                        previous_level: previous,
                        timestamp: now,
                        message: format!("{} is {computed}", self.topic),
                        state_changed,
                    };
                    self.bus.publish(event).await;
                }
                Some(EdgeMessage::Barrier(_)) => {}
                None => break,
            }
        }
        *self.live_state.lock().unwrap() = Some(self.snapshot());
        Ok(())
    }

    fn snapshot(&self) -> Vec<u8> {
        serde_json::to_vec(&AlertNodeSnapshot { states: self.states.clone() }).unwrap_or_default()
    }

    fn restore(&mut self, bytes: &[u8]) {
        if let Ok(snap) = serde_json::from_slice::<AlertNodeSnapshot>(bytes) {
            self.states = snap.states;
        }
    }

    fn stats(&self) -> Arc<NodeStats> {
        self.stats.clone()
    }

    fn live_state(&self) -> Option<Arc<Mutex<Option<Vec<u8>>>>> {
        Some(self.live_state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vortex_shared::edge::edge;
    use vortex_shared::LogicalClock;

    fn crit_below(threshold: f64) -> LevelPredicate {
        LevelPredicate {
            level: AlertLevel::Critical,
            expr: vortex_grammar::parse(&format!("usage_idle < {threshold}")).unwrap(),
        }
    }

    async fn drain_events(bus: &TopicBus, topic: &str, n: usize) -> Vec<AlertEvent> {
        let mut sub = bus.subscribe(topic, 16).await;
        let mut events = Vec::new();
        for _ in 0..n {
            events.push(sub.receiver.recv().await.unwrap());
        }
        events
    }

    #[tokio::test]
    async fn stream_threshold_scenario_emits_crit_then_ok() {
        // §8 scenario 1: CRIT at t=2, OK at t=4 — two state transitions.
        let (tx, rx) = edge::<Point>(8);
        let bus = TopicBus::new();
        let registry = InhibitorRegistry::new();
        let clock = Arc::new(LogicalClock::new(0));
        let node = Box::new(
            AlertNode::new(
                1,
                "cpu".to_string(),
                vec![crit_below(10.0)],
                "{{group}}".to_string(),
                0,
                false,
                0,
                Vec::new(),
                bus.clone(),
                registry,
                clock.clone(),
                rx,
            )
            .unwrap(),
        );
        let cancel = CancellationToken::new();
        let events_task = {
            let bus = bus.clone();
            tokio::spawn(async move { drain_events(&bus, "cpu", 2).await })
        };
        let handle = tokio::spawn(node.run(cancel.clone()));

        for (t, v) in [(1i64, 50.0), (2, 5.0), (3, 6.0), (4, 20.0)] {
            clock.advance_to(t);
            tx.send(Point::new("cpu", t).with_field("usage_idle", Value::Float(v)))
                .await
                .unwrap();
        }
        drop(tx);

        let events = events_task.await.unwrap();
        handle.await.unwrap().unwrap();

        assert_eq!(events[0].level, AlertLevel::Critical);
        assert_eq!(events[1].level, AlertLevel::Ok);
    }

    #[tokio::test]
    async fn state_changes_only_suppresses_constant_level_stream() {
        let (tx, rx) = edge::<Point>(8);
        let bus = TopicBus::new();
        let registry = InhibitorRegistry::new();
        let clock = Arc::new(LogicalClock::new(0));
        let node = Box::new(
            AlertNode::new(
                1,
                "always-crit".to_string(),
                vec![LevelPredicate { level: AlertLevel::Critical, expr: vortex_grammar::parse("TRUE").unwrap() }],
                "{{group}}".to_string(),
                0,
                true,
                0,
                Vec::new(),
                bus.clone(),
                registry,
                clock,
                rx,
            )
            .unwrap(),
        );
        let mut sub = bus.subscribe("always-crit", 16).await;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(node.run(cancel.clone()));

        for t in 0..20i64 {
            tx.send(Point::new("cpu", t)).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap().unwrap();

        assert_eq!(sub.receiver.try_recv().unwrap().level, AlertLevel::Critical);
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn inhibited_topic_updates_state_without_publishing() {
        let (tx, rx) = edge::<Point>(8);
        let bus = TopicBus::new();
        let registry = InhibitorRegistry::new();
        registry.set("parent", AlertLevel::Critical);
        let clock = Arc::new(LogicalClock::new(0));
        let node = Box::new(
            AlertNode::new(
                1,
                "child".to_string(),
                vec![LevelPredicate { level: AlertLevel::Critical, expr: vortex_grammar::parse("TRUE").unwrap() }],
                "{{group}}".to_string(),
                0,
                false,
                0,
                vec!["parent".to_string()],
                bus.clone(),
                registry,
                clock,
                rx,
            )
            .unwrap(),
        );
        let mut sub = bus.subscribe("child", 16).await;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(node.run(cancel.clone()));

        tx.send(Point::new("cpu", 1)).await.unwrap();
        drop(tx);
        handle.await.unwrap().unwrap();

        assert!(sub.receiver.try_recv().is_err());
    }
}

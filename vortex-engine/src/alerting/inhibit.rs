//! Cross-topic inhibition (§4.4): "if inhibitors match (e.g. parent topic
//! in CRITICAL), suppress publication but still update state." Every alert
//! node publishes its current level here on each message; an inhibiting
//! node reads a parent topic's last-known level before deciding to
//! publish.

use dashmap::DashMap;

use super::state::AlertLevel;

#[derive(Debug, Default)]
pub struct InhibitorRegistry {
    levels: DashMap<String, AlertLevel>,
}

impl InhibitorRegistry {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::default())
    }

    pub fn set(&self, topic: &str, level: AlertLevel) {
        self.levels.insert(topic.to_string(), level);
    }

    pub fn level_of(&self, topic: &str) -> AlertLevel {
        self.levels.get(topic).map(|l| *l).unwrap_or(AlertLevel::Ok)
    }

    /// Whether any of `topics` is currently at or above `AlertLevel::Critical`.
    pub fn any_critical(&self, topics: &[String]) -> bool {
        topics.iter().any(|t| self.level_of(t) == AlertLevel::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_topic_defaults_to_ok() {
        let reg = InhibitorRegistry::new();
        assert_eq!(reg.level_of("unknown"), AlertLevel::Ok);
    }

    #[test]
    fn any_critical_detects_parent_topic() {
        let reg = InhibitorRegistry::new();
        reg.set("parent", AlertLevel::Critical);
        assert!(reg.any_critical(&["parent".to_string()]));
        assert!(!reg.any_critical(&["sibling".to_string()]));
    }
}

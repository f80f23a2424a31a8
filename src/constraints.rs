use crate::models::{BrokerId, TopicKind};
use std::collections::BTreeSet;

/// Options that control how plans are scoped and generated
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    /// Brokers that must not receive any replica in a reassignment plan
    pub excluded_brokers: BTreeSet<BrokerId>,

    /// Topics to leave out of the plan even when the filter matches them
    pub excluded_topics: BTreeSet<String>,

    /// Whether internal topics (reserved name prefix) are in scope
    pub include_internal_topics: bool,

    /// Seed for the replica shuffle; a fresh one is drawn when unset
    pub seed: Option<u64>,

    /// Redraw a partition whose new replica set equals its current one,
    /// as long as the candidate pool is larger than the replication factor
    pub require_move: bool,

    /// Prefer replicas on distinct racks when rack labels are known
    pub prefer_rack_spread: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            excluded_brokers: BTreeSet::new(),
            excluded_topics: BTreeSet::new(),
            include_internal_topics: true,
            seed: None,
            require_move: false,
            prefer_rack_spread: true,
        }
    }
}

impl GenerationOptions {
    /// Options for draining replicas off brokers that are being removed
    pub fn for_decommission(broker_ids: Vec<BrokerId>) -> Self {
        Self {
            excluded_brokers: broker_ids.into_iter().collect(),
            require_move: true,
            ..Default::default()
        }
    }

    /// Options scoped to custom topics only
    pub fn custom_topics_only() -> Self {
        Self {
            include_internal_topics: false,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check if a broker can receive replicas
    pub fn can_assign_to_broker(&self, broker_id: BrokerId) -> bool {
        !self.excluded_brokers.contains(&broker_id)
    }

    /// Check if a topic may appear in a plan
    pub fn can_plan_topic(&self, topic: &str) -> bool {
        if self.excluded_topics.contains(topic) {
            return false;
        }
        self.include_internal_topics || TopicKind::classify(topic) == TopicKind::Custom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_scope() {
        let mut options = GenerationOptions::default();
        assert!(options.can_plan_topic("__consumer_offsets"));
        assert!(options.can_plan_topic("orders"));

        options.excluded_topics.insert("orders".to_string());
        assert!(!options.can_plan_topic("orders"));

        let options = GenerationOptions::custom_topics_only();
        assert!(!options.can_plan_topic("__consumer_offsets"));
        assert!(options.can_plan_topic("payments"));
    }

    #[test]
    fn test_decommission_excludes_brokers() {
        let options = GenerationOptions::for_decommission(vec![4, 5]);
        assert!(!options.can_assign_to_broker(4));
        assert!(!options.can_assign_to_broker(5));
        assert!(options.can_assign_to_broker(1));
        assert!(options.require_move);
    }
}

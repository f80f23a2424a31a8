use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use super::{BrokerId, PartitionId, TopicName};

/// Name prefixes reserved for cluster-internal topics (`__consumer_offsets`, `_schemas`, ...)
pub const INTERNAL_TOPIC_PREFIXES: &[&str] = &["_"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicKind {
    Internal,
    Custom,
}

impl TopicKind {
    /// Classify a topic purely from its name. Every name maps to exactly one kind.
    pub fn classify(name: &str) -> Self {
        if INTERNAL_TOPIC_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
        {
            TopicKind::Internal
        } else {
            TopicKind::Custom
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub name: TopicName,
    pub partitions: BTreeMap<PartitionId, Partition>,
}

impl Topic {
    pub fn new(name: impl Into<TopicName>) -> Self {
        Self {
            name: name.into(),
            partitions: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> TopicKind {
        TopicKind::classify(&self.name)
    }

    pub fn is_internal(&self) -> bool {
        self.kind() == TopicKind::Internal
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub topic: TopicName,
    pub id: PartitionId,
    /// Ordered replica list; position 0 is the current (preferred) leader
    pub replicas: Vec<BrokerId>,
}

impl Partition {
    pub fn new(topic: impl Into<TopicName>, id: PartitionId, replicas: Vec<BrokerId>) -> Self {
        Self {
            topic: topic.into(),
            id,
            replicas,
        }
    }

    pub fn replication_factor(&self) -> usize {
        self.replicas.len()
    }

    pub fn leader(&self) -> Option<BrokerId> {
        self.replicas.first().copied()
    }

    pub fn has_replica_on(&self, broker_id: BrokerId) -> bool {
        self.replicas.contains(&broker_id)
    }

    /// Broker ids that appear more than once in the replica list
    pub fn duplicate_replicas(&self) -> Vec<BrokerId> {
        duplicates(&self.replicas)
    }

    pub fn key(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.id)
    }
}

/// Returns each broker id that occurs more than once, in first-repeat order.
pub(crate) fn duplicates(replicas: &[BrokerId]) -> Vec<BrokerId> {
    let mut seen = HashSet::new();
    let mut repeated = Vec::new();
    for id in replicas {
        if !seen.insert(*id) && !repeated.contains(id) {
            repeated.push(*id);
        }
    }
    repeated
}

/// A (topic, partition) reference resolved against a metadata snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: TopicName,
    pub partition: PartitionId,
}

impl TopicPartition {
    pub fn new(topic: impl Into<TopicName>, partition: PartitionId) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_classification() {
        assert_eq!(TopicKind::classify("__consumer_offsets"), TopicKind::Internal);
        assert_eq!(TopicKind::classify("_schemas"), TopicKind::Internal);
        assert_eq!(TopicKind::classify("orders"), TopicKind::Custom);
        assert_eq!(TopicKind::classify("orders_"), TopicKind::Custom);
        assert_eq!(TopicKind::classify(""), TopicKind::Custom);
    }

    #[test]
    fn test_duplicate_replicas() {
        let partition = Partition::new("t", 0, vec![1, 2, 1, 3, 2, 1]);
        assert_eq!(partition.duplicate_replicas(), vec![1, 2]);

        let partition = Partition::new("t", 0, vec![1, 2, 3]);
        assert!(partition.duplicate_replicas().is_empty());
        assert_eq!(partition.leader(), Some(1));
        assert_eq!(partition.replication_factor(), 3);
    }

    #[test]
    fn test_topic_partition_display() {
        assert_eq!(TopicPartition::new("orders", 7).to_string(), "orders-7");
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;
use crate::PlanError;
use super::{Broker, BrokerId, Partition, PartitionId, Topic, TopicKind, TopicName};

/// Read-only snapshot of the brokers and topic layout of a Kafka cluster.
///
/// A snapshot is never patched in place once loaded; a refresh builds a new one
/// and replaces the old value wholesale.
#[derive(Debug, Clone, Default)]
pub struct ClusterMetadata {
    pub brokers: BTreeMap<BrokerId, Broker>,
    pub topics: BTreeMap<TopicName, Topic>,
    pub rack_mapping: BTreeMap<String, Vec<BrokerId>>,
}

impl ClusterMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and check a snapshot in one go
    pub fn from_parts(
        brokers: impl IntoIterator<Item = Broker>,
        partitions: impl IntoIterator<Item = Partition>,
    ) -> Result<Self, PlanError> {
        let mut metadata = Self::new();
        for broker in brokers {
            metadata.add_broker(broker);
        }
        for partition in partitions {
            metadata.add_partition(partition);
        }
        metadata.check_consistency()?;
        Ok(metadata)
    }

    pub fn add_broker(&mut self, broker: Broker) {
        let broker_id = broker.id;
        if let Some(previous) = self.brokers.insert(broker_id, broker.clone()) {
            if let Some(rack_name) = previous.rack {
                if let Some(members) = self.rack_mapping.get_mut(&rack_name) {
                    members.retain(|id| *id != broker_id);
                }
            }
        }

        // Update rack mapping
        if let Some(rack_name) = broker.rack {
            self.rack_mapping
                .entry(rack_name)
                .or_insert_with(Vec::new)
                .push(broker_id);
        }
        self.rack_mapping.retain(|_, members| !members.is_empty());
    }

    pub fn add_partition(&mut self, partition: Partition) {
        self.topics
            .entry(partition.topic.clone())
            .or_insert_with(|| Topic::new(partition.topic.clone()))
            .partitions
            .insert(partition.id, partition);
    }

    /// Verify the structural invariants every loaded partition must satisfy
    pub fn check_consistency(&self) -> Result<(), PlanError> {
        let broker_count = self.brokers.len();

        for partition in self.all_partitions() {
            let rf = partition.replication_factor();
            if rf == 0 {
                return Err(PlanError::InvalidClusterState(format!(
                    "Partition {}/{} has an empty replica list",
                    partition.topic, partition.id
                )));
            }
            if rf > broker_count {
                return Err(PlanError::InvalidClusterState(format!(
                    "Partition {}/{} has replication factor {} but the cluster has {} brokers",
                    partition.topic, partition.id, rf, broker_count
                )));
            }
            let repeated = partition.duplicate_replicas();
            if !repeated.is_empty() {
                return Err(PlanError::InvalidClusterState(format!(
                    "Partition {}/{} lists brokers {:?} more than once",
                    partition.topic, partition.id, repeated
                )));
            }
            if let Some(unknown) = partition
                .replicas
                .iter()
                .find(|id| !self.brokers.contains_key(id))
            {
                return Err(PlanError::InvalidClusterState(format!(
                    "Partition {}/{} references unknown broker {}",
                    partition.topic, partition.id, unknown
                )));
            }
        }

        Ok(())
    }

    pub fn get_broker(&self, id: BrokerId) -> Option<&Broker> {
        self.brokers.get(&id)
    }

    pub fn has_broker(&self, id: BrokerId) -> bool {
        self.brokers.contains_key(&id)
    }

    /// Broker ids in ascending order
    pub fn broker_ids(&self) -> Vec<BrokerId> {
        self.brokers.keys().copied().collect()
    }

    pub fn rack_of(&self, id: BrokerId) -> Option<&str> {
        self.brokers.get(&id).and_then(|b| b.rack.as_deref())
    }

    pub fn partition(&self, topic: &str, id: PartitionId) -> Option<&Partition> {
        self.topics.get(topic)?.partitions.get(&id)
    }

    /// Get all partitions across all topics, ordered by topic name then partition id
    pub fn all_partitions(&self) -> impl Iterator<Item = &Partition> + '_ {
        self.topics.values().flat_map(|t| t.partitions.values())
    }

    pub fn topics_of_kind(&self, kind: TopicKind) -> impl Iterator<Item = &Topic> + '_ {
        self.topics.values().filter(move |t| t.kind() == kind)
    }

    pub fn stats(&self) -> ClusterStats {
        ClusterStats {
            broker_count: self.brokers.len(),
            topic_count: self.topics.len(),
            custom_topic_count: self.topics_of_kind(TopicKind::Custom).count(),
            internal_topic_count: self.topics_of_kind(TopicKind::Internal).count(),
            partition_count: self.all_partitions().count(),
            replica_count: self.all_partitions().map(|p| p.replicas.len()).sum(),
            rack_count: self.rack_mapping.len(),
        }
    }

    /// Emit the full topic listing at debug level, grouped by kind
    pub fn log_topic_listing(&self) {
        for kind in [TopicKind::Custom, TopicKind::Internal] {
            let names: Vec<&str> = self.topics_of_kind(kind).map(|t| t.name.as_str()).collect();
            debug!(?kind, count = names.len(), "Topic listing");
            for name in names {
                debug!(?kind, topic = name, "  - topic");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStats {
    pub broker_count: usize,
    pub topic_count: usize,
    pub custom_topic_count: usize,
    pub internal_topic_count: usize,
    pub partition_count: usize,
    pub replica_count: usize,
    pub rack_count: usize,
}

impl fmt::Display for ClusterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Brokers: {}, Topics: {} ({} custom, {} internal), Partitions: {}, Replicas: {}",
            self.broker_count,
            self.topic_count,
            self.custom_topic_count,
            self.internal_topic_count,
            self.partition_count,
            self.replica_count
        )
    }
}

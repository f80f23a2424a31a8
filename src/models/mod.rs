// Type aliases used across models
pub type BrokerId = u32;
pub type TopicName = String;
pub type PartitionId = u32;

// Module declarations
mod broker;
mod topic;
mod cluster;

// Re-exports
pub use broker::Broker;
pub use topic::{Partition, Topic, TopicKind, TopicPartition, INTERNAL_TOPIC_PREFIXES};
pub(crate) use topic::duplicates;
pub use cluster::{ClusterMetadata, ClusterStats};

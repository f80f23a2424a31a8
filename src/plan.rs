use crate::models::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Plan file format version understood by `kafka-reassign-partitions`
pub const REASSIGNMENT_FORMAT_VERSION: u32 = 1;

/// What a plan asks the cluster to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PlanKind {
    /// New replica sets, replication factor preserved
    Reassignment,
    /// Same replica sets reordered so `leader` comes first
    LeaderElection { leader: BrokerId },
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanKind::Reassignment => write!(f, "reassignment"),
            PlanKind::LeaderElection { leader } => write!(f, "leader-election (broker {})", leader),
        }
    }
}

/// Target replica list for one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub topic: TopicName,
    pub partition: PartitionId,
    pub replicas: Vec<BrokerId>,
}

impl PlanEntry {
    pub fn new(topic: impl Into<TopicName>, partition: PartitionId, replicas: Vec<BrokerId>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            replicas,
        }
    }

    pub fn key(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }

    /// Whether the entry places a replica on a broker that does not hold one today
    pub fn moves_replicas(&self, current: &Partition) -> bool {
        self.replicas.iter().any(|b| !current.has_replica_on(*b))
            || current.replicas.iter().any(|b| !self.replicas.contains(b))
    }

    pub fn changes_leader(&self, current: &Partition) -> bool {
        self.replicas.first().copied() != current.leader()
    }

    /// Get a human-readable description
    pub fn description(&self, current: Option<&Partition>) -> String {
        match current {
            Some(current) => format!(
                "{}/{}: {:?} -> {:?}",
                self.topic, self.partition, current.replicas, self.replicas
            ),
            None => format!("{}/{}: -> {:?}", self.topic, self.partition, self.replicas),
        }
    }
}

/// An ordered set of plan entries of one kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub kind: PlanKind,
    pub entries: Vec<PlanEntry>,
    pub metadata: PlanMetadata,
}

impl Plan {
    pub fn new(kind: PlanKind, entries: Vec<PlanEntry>) -> Self {
        Self {
            kind,
            entries,
            metadata: PlanMetadata::default(),
        }
    }

    /// Check if this plan is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn partitions(&self) -> Vec<TopicPartition> {
        self.entries.iter().map(PlanEntry::key).collect()
    }

    /// Get summary statistics against the snapshot the plan was built from
    pub fn summary(&self, metadata: &ClusterMetadata) -> PlanSummary {
        let mut moved_partitions = 0;
        let mut leader_changes = 0;
        let mut brokers_used = BTreeSet::new();

        for entry in &self.entries {
            brokers_used.extend(entry.replicas.iter().copied());
            if let Some(current) = metadata.partition(&entry.topic, entry.partition) {
                if entry.moves_replicas(current) {
                    moved_partitions += 1;
                }
                if entry.changes_leader(current) {
                    leader_changes += 1;
                }
            }
        }

        PlanSummary {
            kind: self.kind,
            total_entries: self.entries.len(),
            moved_partitions,
            leader_changes,
            brokers_used: brokers_used.into_iter().collect(),
        }
    }

    /// Render the reassignment file with each replica list on one line
    pub fn to_reassignment_json(&self) -> String {
        let mut out = String::from("{\n");
        out.push_str(&format!("  \"version\": {},\n", REASSIGNMENT_FORMAT_VERSION));
        out.push_str("  \"partitions\": [\n");

        let rendered: Vec<String> = self
            .entries
            .iter()
            .map(|entry| {
                let replicas: Vec<String> = entry.replicas.iter().map(|b| b.to_string()).collect();
                format!(
                    "    {{\n      \"topic\": {},\n      \"partition\": {},\n      \"replicas\": [{}]\n    }}",
                    quote_json(&entry.topic),
                    entry.partition,
                    replicas.join(", ")
                )
            })
            .collect();
        out.push_str(&rendered.join(",\n"));
        if !rendered.is_empty() {
            out.push('\n');
        }

        out.push_str("  ]\n}");
        out
    }

    /// Render the election-only file (`topic`/`partition` pairs)
    pub fn to_election_json(&self) -> Result<String, serde_json::Error> {
        let file = ElectionFile {
            partitions: self.partitions(),
        };
        serde_json::to_string_pretty(&file)
    }

    /// Read a reassignment file back into a plan of the given kind
    pub fn from_reassignment_json(text: &str, kind: PlanKind) -> Result<Self, serde_json::Error> {
        let file: ReassignmentFile = serde_json::from_str(text)?;
        Ok(Plan::new(kind, file.partitions))
    }
}

fn quote_json(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub seed: Option<u64>,
    pub cluster_stats: Option<ClusterStats>,
}

impl Default for PlanMetadata {
    fn default() -> Self {
        Self {
            created_at: Some(chrono::Utc::now()),
            seed: None,
            cluster_stats: None,
        }
    }
}

/// On-disk reassignment file shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignmentFile {
    pub version: u32,
    pub partitions: Vec<PlanEntry>,
}

/// On-disk election file shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionFile {
    pub partitions: Vec<TopicPartition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub kind: PlanKind,
    pub total_entries: usize,
    pub moved_partitions: usize,
    pub leader_changes: usize,
    pub brokers_used: Vec<BrokerId>,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Kind: {}, Partitions: {}, Moved: {}, Leader Changes: {}, Brokers: {:?}",
            self.kind, self.total_entries, self.moved_partitions, self.leader_changes, self.brokers_used
        )
    }
}

/// A plan that passed validation against a metadata snapshot.
///
/// Only the validator can build one, and it exposes no mutable access.
#[derive(Debug, Clone)]
pub struct ValidatedPlan {
    plan: Plan,
    snapshot: Option<u64>,
}

impl ValidatedPlan {
    pub(crate) fn new(plan: Plan) -> Self {
        Self { plan, snapshot: None }
    }

    pub(crate) fn for_snapshot(mut self, snapshot: u64) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Generation of the snapshot this plan was validated against, when known
    pub fn snapshot(&self) -> Option<u64> {
        self.snapshot
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn into_inner(self) -> Plan {
        self.plan
    }
}

impl std::ops::Deref for ValidatedPlan {
    type Target = Plan;

    fn deref(&self) -> &Plan {
        &self.plan
    }
}

use crate::models::{duplicates, BrokerId, ClusterMetadata, Partition, PartitionId, TopicName, TopicPartition};
use crate::plan::{Plan, PlanEntry, PlanKind, ValidatedPlan};
use crate::PlanError;
use std::collections::HashSet;
use std::fmt;
use tracing::{info, warn};

/// A single rule a plan entry broke
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationRule {
    UnknownPartition,
    DuplicateEntry,
    EmptyReplicaList,
    DuplicateBroker { broker: BrokerId },
    UnknownBroker { broker: BrokerId },
    ReplicationFactorChanged { expected: usize, actual: usize },
    MembershipChanged { expected: Vec<BrokerId>, actual: Vec<BrokerId> },
    LeaderNotFirst { expected: BrokerId, actual: Option<BrokerId> },
}

impl fmt::Display for ViolationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationRule::UnknownPartition => write!(f, "partition does not exist in cluster metadata"),
            ViolationRule::DuplicateEntry => write!(f, "partition appears more than once in the plan"),
            ViolationRule::EmptyReplicaList => write!(f, "replica list is empty"),
            ViolationRule::DuplicateBroker { broker } => {
                write!(f, "broker {} appears more than once in the replica list", broker)
            }
            ViolationRule::UnknownBroker { broker } => write!(f, "broker {} is not part of the cluster", broker),
            ViolationRule::ReplicationFactorChanged { expected, actual } => write!(
                f,
                "replication factor changed from {} to {}",
                expected, actual
            ),
            ViolationRule::MembershipChanged { expected, actual } => write!(
                f,
                "replica set {:?} is not a reordering of {:?}",
                actual, expected
            ),
            ViolationRule::LeaderNotFirst { expected, actual } => match actual {
                Some(actual) => write!(f, "broker {} is first instead of leader {}", actual, expected),
                None => write!(f, "leader {} is missing from position 0", expected),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub check: String,
    pub topic: TopicName,
    pub partition: PartitionId,
    pub rule: ViolationRule,
}

impl Violation {
    pub fn key(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}/{}: {}", self.check, self.topic, self.partition, self.rule)
    }
}

/// Every violation found in a plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Partitions with at least one violation, deduplicated, in report order
    pub fn offending_partitions(&self) -> Vec<TopicPartition> {
        let mut seen = HashSet::new();
        self.violations
            .iter()
            .map(Violation::key)
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }

    pub fn has_rule(&self, predicate: impl Fn(&ViolationRule) -> bool) -> bool {
        self.violations.iter().any(|v| predicate(&v.rule))
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} violation(s):", self.violations.len())?;
        for violation in &self.violations {
            writeln!(f, "  {}", violation)?;
        }
        Ok(())
    }
}

/// One structural rule applied to every plan entry
pub trait PlanCheck: Send + Sync {
    /// Name of this check
    fn name(&self) -> &str;

    /// Rules the entry breaks. `current` is the partition as it exists in the
    /// snapshot, absent when the plan references an unknown partition.
    fn check(
        &self,
        entry: &PlanEntry,
        current: Option<&Partition>,
        kind: PlanKind,
        metadata: &ClusterMetadata,
    ) -> Vec<ViolationRule>;
}

/// Replica lists must be non-empty and free of repeated brokers
pub struct DistinctReplicasCheck;

impl PlanCheck for DistinctReplicasCheck {
    fn name(&self) -> &str {
        "DistinctReplicas"
    }

    fn check(&self, entry: &PlanEntry, _: Option<&Partition>, _: PlanKind, _: &ClusterMetadata) -> Vec<ViolationRule> {
        if entry.replicas.is_empty() {
            return vec![ViolationRule::EmptyReplicaList];
        }
        duplicates(&entry.replicas)
            .into_iter()
            .map(|broker| ViolationRule::DuplicateBroker { broker })
            .collect()
    }
}

/// Every broker in a replica list must exist in the snapshot
pub struct KnownBrokersCheck;

impl PlanCheck for KnownBrokersCheck {
    fn name(&self) -> &str {
        "KnownBrokers"
    }

    fn check(
        &self,
        entry: &PlanEntry,
        _: Option<&Partition>,
        _: PlanKind,
        metadata: &ClusterMetadata,
    ) -> Vec<ViolationRule> {
        let mut reported = HashSet::new();
        entry
            .replicas
            .iter()
            .filter(|b| !metadata.has_broker(**b) && reported.insert(**b))
            .map(|b| ViolationRule::UnknownBroker { broker: *b })
            .collect()
    }
}

/// Reassignments keep the replication factor
pub struct ReplicationFactorCheck;

impl PlanCheck for ReplicationFactorCheck {
    fn name(&self) -> &str {
        "ReplicationFactor"
    }

    fn check(
        &self,
        entry: &PlanEntry,
        current: Option<&Partition>,
        kind: PlanKind,
        _: &ClusterMetadata,
    ) -> Vec<ViolationRule> {
        match (kind, current) {
            (PlanKind::Reassignment, Some(current))
                if current.replication_factor() != entry.replicas.len() =>
            {
                vec![ViolationRule::ReplicationFactorChanged {
                    expected: current.replication_factor(),
                    actual: entry.replicas.len(),
                }]
            }
            _ => Vec::new(),
        }
    }
}

/// Leader elections only reorder the current replicas and put the leader first
pub struct ReorderOnlyCheck;

impl PlanCheck for ReorderOnlyCheck {
    fn name(&self) -> &str {
        "ReorderOnly"
    }

    fn check(
        &self,
        entry: &PlanEntry,
        current: Option<&Partition>,
        kind: PlanKind,
        _: &ClusterMetadata,
    ) -> Vec<ViolationRule> {
        let leader = match kind {
            PlanKind::LeaderElection { leader } => leader,
            PlanKind::Reassignment => return Vec::new(),
        };

        let mut violations = Vec::new();
        if let Some(current) = current {
            let mut expected = current.replicas.clone();
            let mut actual = entry.replicas.clone();
            expected.sort_unstable();
            actual.sort_unstable();
            if expected != actual {
                violations.push(ViolationRule::MembershipChanged {
                    expected: current.replicas.clone(),
                    actual: entry.replicas.clone(),
                });
            }
        }

        let first = entry.replicas.first().copied();
        if first != Some(leader) {
            violations.push(ViolationRule::LeaderNotFirst {
                expected: leader,
                actual: first,
            });
        }
        violations
    }
}

/// Runs every check against every entry of a plan
pub struct PlanValidator {
    checks: Vec<Box<dyn PlanCheck>>,
}

impl Default for PlanValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanValidator {
    pub fn new() -> Self {
        Self {
            checks: vec![
                Box::new(DistinctReplicasCheck),
                Box::new(KnownBrokersCheck),
                Box::new(ReplicationFactorCheck),
                Box::new(ReorderOnlyCheck),
            ],
        }
    }

    pub fn with_check(mut self, check: Box<dyn PlanCheck>) -> Self {
        self.checks.push(check);
        self
    }

    /// Collect every violation in the plan without consuming it
    pub fn check(&self, plan: &Plan, metadata: &ClusterMetadata) -> ValidationReport {
        let mut report = ValidationReport::default();
        let mut seen = HashSet::new();

        for entry in &plan.entries {
            let current = metadata.partition(&entry.topic, entry.partition);
            let mut push = |check: &str, rule: ViolationRule| {
                report.violations.push(Violation {
                    check: check.to_string(),
                    topic: entry.topic.clone(),
                    partition: entry.partition,
                    rule,
                })
            };

            if current.is_none() {
                push("PartitionExists", ViolationRule::UnknownPartition);
            }
            if !seen.insert(entry.key()) {
                push("UniqueEntries", ViolationRule::DuplicateEntry);
            }
            for check in &self.checks {
                for rule in check.check(entry, current, plan.kind, metadata) {
                    push(check.name(), rule);
                }
            }
        }

        report
    }

    /// Validate a plan, handing it back as a [`ValidatedPlan`] only if no rule is broken
    pub fn validate(&self, plan: Plan, metadata: &ClusterMetadata) -> Result<ValidatedPlan, PlanError> {
        let report = self.check(&plan, metadata);
        if !report.is_ok() {
            for violation in &report.violations {
                warn!(%violation, "Plan violation");
            }
            return Err(PlanError::Validation(report));
        }

        info!(kind = %plan.kind, entries = plan.len(), "Plan passed validation");
        Ok(ValidatedPlan::new(plan))
    }
}

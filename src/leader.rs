use crate::models::{BrokerId, Partition, TopicPartition};
use crate::plan::{Plan, PlanEntry, PlanKind};
use crate::PlanError;
use tracing::{info, warn};

/// Reorders replica lists so one broker becomes the preferred leader.
///
/// Replica membership never changes; the target moves to the front and the other
/// replicas keep their relative order.
#[derive(Debug, Clone, Copy)]
pub struct LeaderElectionPlanGenerator {
    leader: BrokerId,
}

impl LeaderElectionPlanGenerator {
    pub fn new(leader: BrokerId) -> Self {
        Self { leader }
    }

    pub fn leader(&self) -> BrokerId {
        self.leader
    }

    /// Generate an entry for every partition, failing with every partition that
    /// does not already replicate the target broker
    pub fn generate(&self, partitions: &[&Partition]) -> Result<Plan, PlanError> {
        let (plan, missing) = self.generate_partial(partitions);
        if !missing.is_empty() {
            return Err(PlanError::BrokerNotInReplicaSet {
                broker: self.leader,
                partitions: missing,
            });
        }
        Ok(plan)
    }

    /// Generate entries for the partitions that replicate the target broker and
    /// return the ones that were left out
    pub fn generate_partial(&self, partitions: &[&Partition]) -> (Plan, Vec<TopicPartition>) {
        let mut entries = Vec::with_capacity(partitions.len());
        let mut missing = Vec::new();

        for partition in partitions {
            match promote(&partition.replicas, self.leader) {
                Some(replicas) => {
                    entries.push(PlanEntry::new(partition.topic.clone(), partition.id, replicas))
                }
                None => {
                    warn!(
                        topic = %partition.topic,
                        partition = partition.id,
                        broker = self.leader,
                        replicas = ?partition.replicas,
                        "Broker does not replicate partition"
                    );
                    missing.push(partition.key());
                }
            }
        }

        info!(
            broker = self.leader,
            partitions = entries.len(),
            skipped = missing.len(),
            "Generated leader election plan"
        );

        (Plan::new(PlanKind::LeaderElection { leader: self.leader }, entries), missing)
    }
}

/// Move `leader` to the front of `replicas`, or `None` if it is not a member
pub fn promote(replicas: &[BrokerId], leader: BrokerId) -> Option<Vec<BrokerId>> {
    if !replicas.contains(&leader) {
        return None;
    }
    let mut reordered = Vec::with_capacity(replicas.len());
    reordered.push(leader);
    reordered.extend(replicas.iter().copied().filter(|b| *b != leader));
    Some(reordered)
}

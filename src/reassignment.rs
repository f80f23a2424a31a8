use crate::constraints::GenerationOptions;
use crate::models::{Broker, BrokerId, Partition};
use crate::plan::{Plan, PlanEntry, PlanKind};
use crate::PlanError;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info};

/// Upper bound on redraws when a partition must land on a different replica set
const MAX_REDRAWS: usize = 64;

/// Draws a fresh replica set for every partition in scope.
///
/// Each partition gets its own RNG derived from the generator seed and the partition's
/// position in the input, so partitions are independent of each other and a fixed seed
/// reproduces the same plan.
#[derive(Debug, Clone)]
pub struct ReassignmentPlanGenerator {
    seed: u64,
    prefer_rack_spread: bool,
    require_move: bool,
}

impl ReassignmentPlanGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            prefer_rack_spread: true,
            require_move: false,
        }
    }

    /// Build a generator from options, drawing a random seed when none is set
    pub fn from_options(options: &GenerationOptions) -> Self {
        Self {
            seed: options.seed.unwrap_or_else(rand::random),
            prefer_rack_spread: options.prefer_rack_spread,
            require_move: options.require_move,
        }
    }

    pub fn with_rack_spread(mut self, enabled: bool) -> Self {
        self.prefer_rack_spread = enabled;
        self
    }

    pub fn with_require_move(mut self, enabled: bool) -> Self {
        self.require_move = enabled;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generate one entry per partition, preserving each replication factor
    pub fn generate(
        &self,
        partitions: &[&Partition],
        brokers: &BTreeMap<BrokerId, Broker>,
        excluded: &BTreeSet<BrokerId>,
    ) -> Result<Plan, PlanError> {
        let pool: Vec<&Broker> = brokers
            .values()
            .filter(|b| !excluded.contains(&b.id))
            .collect();

        info!(
            seed = self.seed,
            partitions = partitions.len(),
            candidates = pool.len(),
            excluded = excluded.len(),
            "Generating reassignment plan"
        );

        let mut entries = Vec::with_capacity(partitions.len());
        for (index, partition) in partitions.iter().enumerate() {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(index as u64));
            let replicas = self.assign_partition(partition, &pool, &mut rng)?;
            debug!(
                topic = %partition.topic,
                partition = partition.id,
                current = ?partition.replicas,
                proposed = ?replicas,
                "Drew replica set"
            );
            entries.push(PlanEntry::new(partition.topic.clone(), partition.id, replicas));
        }

        let mut plan = Plan::new(PlanKind::Reassignment, entries);
        plan.metadata.seed = Some(self.seed);
        Ok(plan)
    }

    fn assign_partition(
        &self,
        partition: &Partition,
        pool: &[&Broker],
        rng: &mut StdRng,
    ) -> Result<Vec<BrokerId>, PlanError> {
        let rf = partition.replication_factor();
        if pool.len() < rf {
            return Err(PlanError::InsufficientBrokers {
                topic: partition.topic.clone(),
                partition: partition.id,
                required: rf,
                available: pool.len(),
            });
        }

        let mut replicas = draw_replicas(pool, rf, self.prefer_rack_spread, rng);

        // With a pool no larger than the factor the only possible set is the current one
        if self.require_move && pool.len() > rf {
            let current: HashSet<BrokerId> = partition.replicas.iter().copied().collect();
            let unchanged = |drawn: &[BrokerId]| drawn.iter().copied().collect::<HashSet<_>>() == current;
            let mut attempts = 0;
            while attempts < MAX_REDRAWS && unchanged(&replicas) {
                replicas = draw_replicas(pool, rf, self.prefer_rack_spread, rng);
                attempts += 1;
            }
            if unchanged(&replicas) {
                debug!(
                    topic = %partition.topic,
                    partition = partition.id,
                    "Kept current replica set after exhausting redraws"
                );
            }
        }

        Ok(replicas)
    }
}

/// Pick `count` distinct brokers from a uniform shuffle of the pool.
///
/// With rack spread preferred, brokers on a rack already used are deferred and only
/// taken once no broker on a fresh rack (or without a rack label) remains.
fn draw_replicas(
    pool: &[&Broker],
    count: usize,
    prefer_rack_spread: bool,
    rng: &mut StdRng,
) -> Vec<BrokerId> {
    let mut order: Vec<&Broker> = pool.to_vec();
    order.shuffle(rng);

    if !prefer_rack_spread {
        return order.iter().take(count).map(|b| b.id).collect();
    }

    let mut chosen = Vec::with_capacity(count);
    let mut deferred = Vec::new();
    let mut used_racks: HashSet<&str> = HashSet::new();

    for broker in order {
        if chosen.len() == count {
            break;
        }
        match broker.rack.as_deref() {
            Some(rack) if used_racks.contains(rack) => deferred.push(broker.id),
            Some(rack) => {
                used_racks.insert(rack);
                chosen.push(broker.id);
            }
            None => chosen.push(broker.id),
        }
    }

    let missing = count - chosen.len();
    chosen.extend(deferred.into_iter().take(missing));
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClusterMetadata;

    fn three_brokers() -> ClusterMetadata {
        ClusterMetadata::from_parts(
            vec![Broker::new(1), Broker::new(2), Broker::new(3)],
            vec![Partition::new("t", 0, vec![1, 2])],
        )
        .unwrap()
    }

    fn scope(metadata: &ClusterMetadata) -> Vec<&Partition> {
        metadata.all_partitions().collect()
    }

    fn assert_valid(replicas: &[BrokerId], rf: usize, allowed: &[BrokerId]) {
        assert_eq!(replicas.len(), rf);
        let unique: HashSet<_> = replicas.iter().collect();
        assert_eq!(unique.len(), rf, "duplicate broker in {:?}", replicas);
        assert!(replicas.iter().all(|b| allowed.contains(b)), "{:?} outside {:?}", replicas, allowed);
    }

    #[test]
    fn test_three_broker_scenario() {
        let metadata = three_brokers();
        for seed in 0..50 {
            let plan = ReassignmentPlanGenerator::new(seed)
                .generate(&scope(&metadata), &metadata.brokers, &BTreeSet::new())
                .unwrap();
            assert_eq!(plan.kind, PlanKind::Reassignment);
            assert_eq!(plan.len(), 1);
            assert_eq!(plan.entries[0].topic, "t");
            assert_eq!(plan.entries[0].partition, 0);
            assert_valid(&plan.entries[0].replicas, 2, &[1, 2, 3]);
        }
    }

    #[test]
    fn test_same_seed_same_plan() {
        let metadata = ClusterMetadata::from_parts(
            (1..=6).map(Broker::new),
            (0..20).map(|p| Partition::new("t", p, vec![1, 2, 3])),
        )
        .unwrap();
        let generator = ReassignmentPlanGenerator::new(42);
        let first = generator
            .generate(&scope(&metadata), &metadata.brokers, &BTreeSet::new())
            .unwrap();
        let second = generator
            .generate(&scope(&metadata), &metadata.brokers, &BTreeSet::new())
            .unwrap();
        assert_eq!(first.entries, second.entries);
        assert_eq!(first.metadata.seed, Some(42));
    }

    #[test]
    fn test_excluded_brokers_are_never_used() {
        let metadata = ClusterMetadata::from_parts(
            (1..=5).map(Broker::new),
            (0..10).map(|p| Partition::new("t", p, vec![4, 5])),
        )
        .unwrap();
        let excluded: BTreeSet<BrokerId> = [4, 5].into_iter().collect();
        for seed in 0..20 {
            let plan = ReassignmentPlanGenerator::new(seed)
                .generate(&scope(&metadata), &metadata.brokers, &excluded)
                .unwrap();
            for entry in &plan.entries {
                assert_valid(&entry.replicas, 2, &[1, 2, 3]);
            }
        }
    }

    #[test]
    fn test_insufficient_brokers() {
        let metadata = ClusterMetadata::from_parts(
            vec![Broker::new(1), Broker::new(2), Broker::new(3)],
            vec![Partition::new("t", 0, vec![1, 2, 3])],
        )
        .unwrap();
        let excluded: BTreeSet<BrokerId> = [3].into_iter().collect();
        let err = ReassignmentPlanGenerator::new(7)
            .generate(&scope(&metadata), &metadata.brokers, &excluded)
            .unwrap_err();
        match err {
            PlanError::InsufficientBrokers {
                topic,
                partition,
                required,
                available,
            } => {
                assert_eq!(topic, "t");
                assert_eq!(partition, 0);
                assert_eq!(required, 3);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_every_subset_and_leader_is_reachable() {
        let metadata = three_brokers();
        let mut sets = HashSet::new();
        let mut leaders = HashSet::new();
        for seed in 0..300 {
            let plan = ReassignmentPlanGenerator::new(seed)
                .generate(&scope(&metadata), &metadata.brokers, &BTreeSet::new())
                .unwrap();
            let mut set = plan.entries[0].replicas.clone();
            leaders.insert(set[0]);
            set.sort_unstable();
            sets.insert(set);
        }
        assert_eq!(sets.len(), 3);
        assert_eq!(leaders.len(), 3);
    }

    #[test]
    fn test_prefers_distinct_racks() {
        let metadata = ClusterMetadata::from_parts(
            vec![
                Broker::with_rack(1, "a"),
                Broker::with_rack(2, "a"),
                Broker::with_rack(3, "b"),
                Broker::with_rack(4, "b"),
            ],
            (0..10).map(|p| Partition::new("t", p, vec![1, 2])),
        )
        .unwrap();
        for seed in 0..50 {
            let plan = ReassignmentPlanGenerator::new(seed)
                .generate(&scope(&metadata), &metadata.brokers, &BTreeSet::new())
                .unwrap();
            for entry in &plan.entries {
                let racks: HashSet<_> = entry.replicas.iter().map(|b| metadata.rack_of(*b)).collect();
                assert_eq!(racks.len(), 2, "replicas {:?} share a rack", entry.replicas);
            }
        }
    }

    #[test]
    fn test_rack_spread_is_best_effort() {
        let metadata = ClusterMetadata::from_parts(
            vec![
                Broker::with_rack(1, "a"),
                Broker::with_rack(2, "a"),
                Broker::with_rack(3, "a"),
            ],
            vec![Partition::new("t", 0, vec![1, 2, 3])],
        )
        .unwrap();
        let plan = ReassignmentPlanGenerator::new(3)
            .generate(&scope(&metadata), &metadata.brokers, &BTreeSet::new())
            .unwrap();
        assert_valid(&plan.entries[0].replicas, 3, &[1, 2, 3]);
    }

    #[test]
    fn test_require_move_avoids_current_set() {
        let metadata = three_brokers();
        for seed in 0..100 {
            let plan = ReassignmentPlanGenerator::new(seed)
                .with_require_move(true)
                .generate(&scope(&metadata), &metadata.brokers, &BTreeSet::new())
                .unwrap();
            let mut set = plan.entries[0].replicas.clone();
            set.sort_unstable();
            assert_ne!(set, vec![1, 2]);
        }
    }

    #[test]
    fn test_empty_scope_yields_empty_plan() {
        let metadata = three_brokers();
        let plan = ReassignmentPlanGenerator::new(1)
            .generate(&[], &metadata.brokers, &BTreeSet::new())
            .unwrap();
        assert!(plan.is_empty());
    }
}

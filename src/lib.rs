// Kafka Partition Reassignment & Leader Election Plan Tool
// Computes proposed replica assignments from a cluster snapshot; never touches the cluster itself.

pub mod models;
pub mod metadata;
pub mod filter;
pub mod constraints;
pub mod plan;
pub mod reassignment;
pub mod leader;
pub mod validator;
pub mod export;

pub use models::{Broker, BrokerId, ClusterMetadata, Partition, Topic, TopicKind, TopicPartition};
pub use metadata::{DescribeFile, KafkaTopicsCommand, MetadataSource, SnapshotFile};
pub use filter::TopicFilter;
pub use constraints::GenerationOptions;
pub use plan::{Plan, PlanEntry, PlanKind, PlanSummary, ValidatedPlan};
pub use reassignment::ReassignmentPlanGenerator;
pub use leader::LeaderElectionPlanGenerator;
pub use validator::{PlanValidator, ValidationReport, Violation, ViolationRule};
pub use export::{ExportedFiles, NextSteps, PlanExporter};

use export::join_partitions;
use tracing::info;

/// Main entry point tying a metadata snapshot to plan generation and validation
pub struct PlanTool {
    metadata: ClusterMetadata,
    options: GenerationOptions,
    validator: PlanValidator,
    generation: u64,
}

impl PlanTool {
    pub fn new(metadata: ClusterMetadata, options: GenerationOptions) -> Self {
        Self {
            metadata,
            options,
            validator: PlanValidator::new(),
            generation: 0,
        }
    }

    /// Load the initial snapshot from a source
    pub fn load(source: &dyn MetadataSource, options: GenerationOptions) -> Result<Self, PlanError> {
        info!(source = %source.describe(), "Loading cluster metadata");
        let metadata = source.load()?;
        info!(stats = %metadata.stats(), "Loaded cluster metadata");
        metadata.log_topic_listing();
        Ok(Self::new(metadata, options))
    }

    pub fn metadata(&self) -> &ClusterMetadata {
        &self.metadata
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// Replace the snapshot wholesale. On failure the current snapshot is kept.
    /// Plans validated before a refresh must be validated again before export.
    pub fn refresh(&mut self, source: &dyn MetadataSource) -> Result<(), PlanError> {
        let metadata = source.load()?;
        self.metadata = metadata;
        self.generation += 1;
        info!(generation = self.generation, stats = %self.metadata.stats(), "Refreshed cluster metadata");
        Ok(())
    }

    /// Partitions in scope for the filter under the current options
    pub fn scope(&self, filter: &TopicFilter) -> Result<Vec<&Partition>, PlanError> {
        filter.select_with(&self.metadata, &self.options)
    }

    /// Generate and validate a reassignment plan for every partition in scope
    pub fn reassignment_plan(&self, filter: &TopicFilter) -> Result<ValidatedPlan, PlanError> {
        let partitions = self.scope(filter)?;
        let generator = ReassignmentPlanGenerator::from_options(&self.options);
        let mut plan = generator.generate(
            &partitions,
            &self.metadata.brokers,
            &self.options.excluded_brokers,
        )?;
        plan.metadata.cluster_stats = Some(self.metadata.stats());
        self.validate(plan)
    }

    /// Generate and validate a leader election plan; every partition in scope must
    /// already replicate `leader`
    pub fn leader_election_plan(
        &self,
        filter: &TopicFilter,
        leader: BrokerId,
    ) -> Result<ValidatedPlan, PlanError> {
        let partitions = self.scope(filter)?;
        let mut plan = LeaderElectionPlanGenerator::new(leader).generate(&partitions)?;
        plan.metadata.cluster_stats = Some(self.metadata.stats());
        self.validate(plan)
    }

    /// Like [`PlanTool::leader_election_plan`] but leaves out partitions that do not
    /// replicate `leader`, returning them alongside the plan
    pub fn leader_election_plan_skipping(
        &self,
        filter: &TopicFilter,
        leader: BrokerId,
    ) -> Result<(ValidatedPlan, Vec<TopicPartition>), PlanError> {
        let partitions = self.scope(filter)?;
        let (mut plan, skipped) = LeaderElectionPlanGenerator::new(leader).generate_partial(&partitions);
        if plan.is_empty() {
            return Err(PlanError::BrokerNotInReplicaSet {
                broker: leader,
                partitions: skipped,
            });
        }
        plan.metadata.cluster_stats = Some(self.metadata.stats());
        Ok((self.validate(plan)?, skipped))
    }

    /// Check a plan against the current snapshot
    pub fn validate(&self, plan: Plan) -> Result<ValidatedPlan, PlanError> {
        Ok(self
            .validator
            .validate(plan, &self.metadata)?
            .for_snapshot(self.generation))
    }

    /// Write a plan validated against the current snapshot.
    ///
    /// Only plans from [`PlanTool::validate`] are accepted. A plan checked directly with
    /// [`PlanValidator::validate`] carries no snapshot and fails with
    /// [`PlanError::UnboundSnapshot`]; write it with [`PlanExporter::write`] instead.
    pub fn export(&self, plan: &ValidatedPlan, exporter: &PlanExporter) -> Result<ExportedFiles, PlanError> {
        match plan.snapshot() {
            None => Err(PlanError::UnboundSnapshot),
            Some(generation) if generation != self.generation => Err(PlanError::StaleSnapshot),
            Some(_) => exporter.write(plan),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Cannot load metadata from {bootstrap_server}: {reason}")]
    Connection {
        bootstrap_server: String,
        reason: String,
    },

    #[error("Invalid topic filter '{pattern}': {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("No topics match filter '{pattern}'")]
    NoMatch { pattern: String },

    #[error("Partition {topic}/{partition} needs {required} brokers but only {available} are eligible")]
    InsufficientBrokers {
        topic: String,
        partition: u32,
        required: usize,
        available: usize,
    },

    #[error(
        "Broker {} is not a replica of {} partition(s): {}",
        .broker,
        .partitions.len(),
        join_partitions(.partitions)
    )]
    BrokerNotInReplicaSet {
        broker: BrokerId,
        partitions: Vec<TopicPartition>,
    },

    #[error("Plan failed validation with {} violation(s)", .0.len())]
    Validation(ValidationReport),

    #[error("Plan was validated against a superseded metadata snapshot")]
    StaleSnapshot,

    #[error("Plan was not validated against this tool's metadata snapshot")]
    UnboundSnapshot,

    #[error("Invalid cluster state: {0}")]
    InvalidClusterState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(options: GenerationOptions) -> PlanTool {
        let metadata = ClusterMetadata::from_parts(
            vec![Broker::new(1), Broker::new(2), Broker::new(3)],
            vec![
                Partition::new("t", 0, vec![1, 2]),
                Partition::new("t", 1, vec![3, 1]),
                Partition::new("__consumer_offsets", 0, vec![1, 2, 3]),
            ],
        )
        .unwrap();
        PlanTool::new(metadata, options)
    }

    struct FixedSource(ClusterMetadata);

    impl MetadataSource for FixedSource {
        fn describe(&self) -> String {
            "fixed".to_string()
        }

        fn load(&self) -> Result<ClusterMetadata, PlanError> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    impl MetadataSource for FailingSource {
        fn describe(&self) -> String {
            "failing".to_string()
        }

        fn load(&self) -> Result<ClusterMetadata, PlanError> {
            Err(PlanError::Connection {
                bootstrap_server: "nowhere:9092".to_string(),
                reason: "refused".to_string(),
            })
        }
    }

    #[test]
    fn test_reassignment_plan_is_validated() {
        let tool = tool(GenerationOptions::default().with_seed(11));
        let plan = tool.reassignment_plan(&TopicFilter::All).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.metadata.seed, Some(11));
        assert_eq!(plan.snapshot(), Some(0));
    }

    #[test]
    fn test_leader_election_plan_requires_membership() {
        let tool = tool(GenerationOptions::default());
        let filter = TopicFilter::parse("^t$").unwrap();

        let plan = tool.leader_election_plan(&filter, 1).unwrap();
        assert!(plan.entries.iter().all(|e| e.replicas[0] == 1));

        let err = tool.leader_election_plan(&filter, 2).unwrap_err();
        assert_eq!(err.to_string(), "Broker 2 is not a replica of 1 partition(s): t-1");

        let (plan, skipped) = tool.leader_election_plan_skipping(&filter, 2).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(skipped, vec![TopicPartition::new("t", 1)]);
    }

    #[test]
    fn test_refresh_marks_old_plans_stale() {
        let mut tool = tool(GenerationOptions::default().with_seed(5));
        let plan = tool.reassignment_plan(&TopicFilter::All).unwrap();

        let replacement = ClusterMetadata::from_parts(
            vec![Broker::new(1), Broker::new(2)],
            vec![Partition::new("t", 0, vec![1, 2])],
        )
        .unwrap();
        tool.refresh(&FixedSource(replacement)).unwrap();
        assert_eq!(tool.metadata().stats().broker_count, 2);

        let exporter = PlanExporter::new(std::env::temp_dir());
        assert!(matches!(tool.export(&plan, &exporter), Err(PlanError::StaleSnapshot)));

        // The old plan references partitions and brokers that no longer exist
        assert!(matches!(
            tool.validate(plan.into_inner()),
            Err(PlanError::Validation(_))
        ));
    }

    #[test]
    fn test_export_needs_a_plan_validated_by_the_tool() {
        let tool = tool(GenerationOptions::default());
        let plan = Plan::new(PlanKind::Reassignment, vec![PlanEntry::new("t", 0, vec![2, 1])]);
        let checked = PlanValidator::new().validate(plan, tool.metadata()).unwrap();
        assert_eq!(checked.snapshot(), None);

        let dir = tempfile::tempdir().unwrap();
        let exporter = PlanExporter::new(dir.path());
        assert!(matches!(
            tool.export(&checked, &exporter),
            Err(PlanError::UnboundSnapshot)
        ));
        assert!(!dir.path().join(export::REASSIGNMENT_PLAN_FILE).exists());

        exporter.write(&checked).unwrap();
        assert!(dir.path().join(export::REASSIGNMENT_PLAN_FILE).is_file());
    }

    #[test]
    fn test_failed_refresh_keeps_snapshot() {
        let mut tool = tool(GenerationOptions::default());
        assert!(matches!(tool.refresh(&FailingSource), Err(PlanError::Connection { .. })));
        assert_eq!(tool.metadata().stats().partition_count, 3);
    }

    #[test]
    fn test_internal_topics_can_be_scoped_out() {
        let tool = tool(GenerationOptions::custom_topics_only());
        let scope = tool.scope(&TopicFilter::All).unwrap();
        assert!(scope.iter().all(|p| p.topic == "t"));
    }
}

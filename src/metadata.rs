//! Loading cluster metadata snapshots.
//!
//! The live source shells out to `kafka-topics --describe` and parses its text output;
//! file sources read a saved describe output or a JSON snapshot.

use crate::models::{Broker, BrokerId, ClusterMetadata, Partition, PartitionId, Topic};
use crate::PlanError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_KAFKA_TOPICS_BINARY: &str = "kafka-topics";
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

static TOPIC_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Topic:\s*(\S+).*ReplicationFactor:\s*(\d+)").unwrap());
static PARTITION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*Topic:\s*(\S+).*Partition:\s*(\d+).*Replicas:\s*([0-9,]+)").unwrap()
});

/// Anything that can produce a fresh metadata snapshot
pub trait MetadataSource {
    /// Short description for logs
    fn describe(&self) -> String;

    /// Load a complete snapshot. Refreshing means calling this again and
    /// replacing the previous snapshot.
    fn load(&self) -> Result<ClusterMetadata, PlanError>;
}

/// Parse `kafka-topics --describe` output.
///
/// Partition lines are only kept for topics whose header line was seen. The broker set
/// is the union of every replica id, since this output carries no rack information.
pub fn parse_describe_output(text: &str) -> Result<ClusterMetadata, PlanError> {
    let mut metadata = ClusterMetadata::new();
    let mut broker_ids = BTreeSet::new();

    for line in text.lines() {
        if let Some(caps) = TOPIC_HEADER.captures(line) {
            let name = &caps[1];
            debug!(topic = name, replication_factor = &caps[2], "Parsed topic header");
            metadata
                .topics
                .entry(name.to_string())
                .or_insert_with(|| Topic::new(name));
        } else if let Some(caps) = PARTITION_LINE.captures(line) {
            let name = &caps[1];
            if !metadata.topics.contains_key(name) {
                continue;
            }
            let id: PartitionId = caps[2].parse().map_err(|_| {
                PlanError::InvalidClusterState(format!("Bad partition number in line: {}", line.trim()))
            })?;
            let replicas = parse_broker_list(&caps[3]).ok_or_else(|| {
                PlanError::InvalidClusterState(format!("Bad replica list in line: {}", line.trim()))
            })?;
            broker_ids.extend(replicas.iter().copied());
            metadata.add_partition(Partition::new(name, id, replicas));
        }
    }

    for id in broker_ids {
        metadata.add_broker(Broker::new(id));
    }
    metadata.check_consistency()?;
    Ok(metadata)
}

fn parse_broker_list(text: &str) -> Option<Vec<BrokerId>> {
    text.split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.trim().parse().ok())
        .collect()
}

/// Runs `kafka-topics --describe` against a live cluster
#[derive(Debug, Clone)]
pub struct KafkaTopicsCommand {
    pub bootstrap_server: String,
    /// Client properties file for SASL/SSL clusters
    pub command_config: Option<PathBuf>,
    pub binary: PathBuf,
    pub timeout: Duration,
}

impl KafkaTopicsCommand {
    pub fn new(bootstrap_server: impl Into<String>) -> Self {
        Self {
            bootstrap_server: bootstrap_server.into(),
            command_config: None,
            binary: PathBuf::from(DEFAULT_KAFKA_TOPICS_BINARY),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_command_config(mut self, path: Option<PathBuf>) -> Self {
        self.command_config = path;
        self
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--describe".to_string(),
            "--bootstrap-server".to_string(),
            self.bootstrap_server.clone(),
        ];
        if let Some(config) = &self.command_config {
            args.push("--command-config".to_string());
            args.push(config.display().to_string());
        }
        args
    }

    fn run(&self) -> Result<String, PlanError> {
        let connection_error = |reason: String| PlanError::Connection {
            bootstrap_server: self.bootstrap_server.clone(),
            reason,
        };

        let mut child = Command::new(&self.binary)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| connection_error(format!("failed to run {}: {}", self.binary.display(), e)))?;

        // Drain both pipes while waiting so a chatty process cannot block on a full pipe
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    if let Err(e) = child.kill() {
                        warn!(error = %e, "Failed to kill timed out kafka-topics process");
                    }
                    child.wait().ok();
                    return Err(connection_error(format!(
                        "kafka-topics did not finish within {}s",
                        self.timeout.as_secs()
                    )));
                }
                Ok(None) => thread::sleep(Duration::from_millis(50)),
                Err(e) => return Err(connection_error(format!("failed to wait for kafka-topics: {}", e))),
            }
        };

        let stdout = join_reader(stdout);
        let stderr = join_reader(stderr);

        if !status.success() {
            return Err(connection_error(format!(
                "kafka-topics exited with {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(stdout)
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Err(e) = pipe.read_to_string(&mut buf) {
            warn!(error = %e, "Failed to read kafka-topics output");
        }
        buf
    })
}

fn join_reader(handle: Option<thread::JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

impl MetadataSource for KafkaTopicsCommand {
    fn describe(&self) -> String {
        format!("{} ({})", self.bootstrap_server, self.binary.display())
    }

    fn load(&self) -> Result<ClusterMetadata, PlanError> {
        info!(bootstrap_server = %self.bootstrap_server, "Fetching topic metadata from Kafka cluster");
        let output = self.run()?;
        debug!(bytes = output.len(), "Raw kafka-topics output received");
        parse_describe_output(&output)
    }
}

/// A saved `kafka-topics --describe` output
#[derive(Debug, Clone)]
pub struct DescribeFile {
    pub path: PathBuf,
}

impl DescribeFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetadataSource for DescribeFile {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<ClusterMetadata, PlanError> {
        let text = std::fs::read_to_string(&self.path)?;
        parse_describe_output(&text)
    }
}

/// JSON snapshot with rack labels
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// Brokers; when empty they are derived from the replica lists
    #[serde(default)]
    pub brokers: Vec<Broker>,
    pub topics: Vec<TopicSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSnapshot {
    pub name: String,
    pub partitions: Vec<PartitionSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionSnapshot {
    pub partition: PartitionId,
    pub replicas: Vec<BrokerId>,
}

impl ClusterSnapshot {
    pub fn into_metadata(self) -> Result<ClusterMetadata, PlanError> {
        let mut brokers = self.brokers;
        if brokers.is_empty() {
            let ids: BTreeSet<BrokerId> = self
                .topics
                .iter()
                .flat_map(|t| t.partitions.iter())
                .flat_map(|p| p.replicas.iter().copied())
                .collect();
            brokers = ids.into_iter().map(Broker::new).collect();
        }

        let partitions: Vec<Partition> = self
            .topics
            .iter()
            .flat_map(|t| {
                t.partitions
                    .iter()
                    .map(move |p| Partition::new(t.name.clone(), p.partition, p.replicas.clone()))
            })
            .collect();

        let mut metadata = ClusterMetadata::from_parts(brokers, partitions)?;
        for topic in &self.topics {
            metadata
                .topics
                .entry(topic.name.clone())
                .or_insert_with(|| Topic::new(topic.name.clone()));
        }
        Ok(metadata)
    }
}

impl From<&ClusterMetadata> for ClusterSnapshot {
    fn from(metadata: &ClusterMetadata) -> Self {
        Self {
            brokers: metadata.brokers.values().cloned().collect(),
            topics: metadata
                .topics
                .values()
                .map(|t| TopicSnapshot {
                    name: t.name.clone(),
                    partitions: t
                        .partitions
                        .values()
                        .map(|p| PartitionSnapshot {
                            partition: p.id,
                            replicas: p.replicas.clone(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

/// A JSON [`ClusterSnapshot`] on disk
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    pub path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn save(path: &Path, metadata: &ClusterMetadata) -> Result<(), PlanError> {
        let text = serde_json::to_string_pretty(&ClusterSnapshot::from(metadata))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

impl MetadataSource for SnapshotFile {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<ClusterMetadata, PlanError> {
        let text = std::fs::read_to_string(&self.path)?;
        let snapshot: ClusterSnapshot = serde_json::from_str(&text)?;
        snapshot.into_metadata()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIBE: &str = "\
Topic: orders\tTopicId: 3Yb0\tPartitionCount: 2\tReplicationFactor: 2\tConfigs: segment.bytes=1073741824
\tTopic: orders\tPartition: 0\tLeader: 1\tReplicas: 1,2\tIsr: 1,2
\tTopic: orders\tPartition: 1\tLeader: 3\tReplicas: 3,1\tIsr: 3,1
Topic: __consumer_offsets\tTopicId: q1\tPartitionCount: 1\tReplicationFactor: 3\tConfigs: cleanup.policy=compact
\tTopic: __consumer_offsets\tPartition: 0\tLeader: 2\tReplicas: 2,3,4\tIsr: 2,3,4
\tTopic: orphan\tPartition: 0\tLeader: 9\tReplicas: 9\tIsr: 9
";

    #[test]
    fn test_parse_describe_output() {
        let metadata = parse_describe_output(DESCRIBE).unwrap();
        assert_eq!(metadata.broker_ids(), vec![1, 2, 3, 4]);
        assert_eq!(metadata.topics.len(), 2);
        assert_eq!(metadata.partition("orders", 1).unwrap().replicas, vec![3, 1]);
        assert_eq!(metadata.partition("__consumer_offsets", 0).unwrap().replicas, vec![2, 3, 4]);
        assert!(metadata.partition("orphan", 0).is_none());

        let stats = metadata.stats();
        assert_eq!(stats.internal_topic_count, 1);
        assert_eq!(stats.custom_topic_count, 1);
        assert_eq!(stats.partition_count, 3);
    }

    #[test]
    fn test_parse_empty_output() {
        let metadata = parse_describe_output("").unwrap();
        assert!(metadata.topics.is_empty());
        assert!(metadata.brokers.is_empty());
    }

    #[test]
    fn test_snapshot_derives_brokers_and_keeps_racks() {
        let json = r#"{
            "topics": [{"name": "t", "partitions": [{"partition": 0, "replicas": [1, 2]}]}]
        }"#;
        let snapshot: ClusterSnapshot = serde_json::from_str(json).unwrap();
        let metadata = snapshot.into_metadata().unwrap();
        assert_eq!(metadata.broker_ids(), vec![1, 2]);

        let json = r#"{
            "brokers": [{"id": 1, "rack": "a"}, {"id": 2, "rack": "b"}, {"id": 3}],
            "topics": [{"name": "t", "partitions": [{"partition": 0, "replicas": [1, 2]}]}]
        }"#;
        let snapshot: ClusterSnapshot = serde_json::from_str(json).unwrap();
        let metadata = snapshot.into_metadata().unwrap();
        assert_eq!(metadata.broker_ids(), vec![1, 2, 3]);
        assert_eq!(metadata.rack_of(2), Some("b"));
    }

    #[test]
    fn test_snapshot_rejects_unknown_replica_broker() {
        let json = r#"{
            "brokers": [{"id": 1}],
            "topics": [{"name": "t", "partitions": [{"partition": 0, "replicas": [2]}]}]
        }"#;
        let snapshot: ClusterSnapshot = serde_json::from_str(json).unwrap();
        assert!(matches!(snapshot.into_metadata(), Err(PlanError::InvalidClusterState(_))));
    }

    #[test]
    fn test_command_args() {
        let command = KafkaTopicsCommand::new("kafka:9092")
            .with_command_config(Some(PathBuf::from("/etc/kafka/client.properties")));
        assert_eq!(
            command.args(),
            vec![
                "--describe",
                "--bootstrap-server",
                "kafka:9092",
                "--command-config",
                "/etc/kafka/client.properties"
            ]
        );
    }

    #[test]
    fn test_missing_binary_is_a_connection_error() {
        let command = KafkaTopicsCommand::new("kafka:9092").with_binary("/nonexistent/kafka-topics");
        assert!(matches!(command.load(), Err(PlanError::Connection { .. })));
    }
}

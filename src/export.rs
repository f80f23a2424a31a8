use crate::models::TopicPartition;
use crate::plan::{PlanKind, ValidatedPlan};
use crate::PlanError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const REASSIGNMENT_PLAN_FILE: &str = "reassign-partitions-plan.json";
pub const LEADER_REASSIGNMENT_PLAN_FILE: &str = "reassign-partitions-for-leader-plan.json";
pub const LEADER_ELECTION_PLAN_FILE: &str = "leader-election-plan.json";

/// Files written for one plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFiles {
    pub reassignment: PathBuf,
    pub election: Option<PathBuf>,
    pub partitions: usize,
}

/// Writes validated plans in the format the Kafka admin tools read
#[derive(Debug, Clone)]
pub struct PlanExporter {
    output_dir: PathBuf,
}

impl PlanExporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Render every file first, then stage them all, then move them into place.
    /// A failure at any step removes whatever this call put on disk.
    pub fn write(&self, plan: &ValidatedPlan) -> Result<ExportedFiles, PlanError> {
        let reassignment_json = plan.to_reassignment_json();

        let files = match plan.kind {
            PlanKind::Reassignment => {
                let reassignment = self.output_dir.join(REASSIGNMENT_PLAN_FILE);
                write_staged(&[(reassignment.as_path(), reassignment_json.as_str())])?;
                ExportedFiles {
                    reassignment,
                    election: None,
                    partitions: plan.len(),
                }
            }
            PlanKind::LeaderElection { .. } => {
                let election_json = plan.to_election_json()?;
                let reassignment = self.output_dir.join(LEADER_REASSIGNMENT_PLAN_FILE);
                let election = self.output_dir.join(LEADER_ELECTION_PLAN_FILE);
                write_staged(&[
                    (reassignment.as_path(), reassignment_json.as_str()),
                    (election.as_path(), election_json.as_str()),
                ])?;
                ExportedFiles {
                    reassignment,
                    election: Some(election),
                    partitions: plan.len(),
                }
            }
        };

        info!(
            kind = %plan.kind,
            partitions = files.partitions,
            reassignment = %files.reassignment.display(),
            election = ?files.election,
            "Wrote plan files"
        );
        Ok(files)
    }
}

fn staging_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

/// Writes every file or none of them
fn write_staged(files: &[(&Path, &str)]) -> Result<(), PlanError> {
    let mut placed = Vec::new();
    if let Err(err) = stage_and_place(files, &mut placed) {
        for (path, _) in files {
            let _ = fs::remove_file(staging_path(path));
        }
        for path in placed {
            let _ = fs::remove_file(path);
        }
        warn!(error = %err, "Plan export failed, removed partial files");
        return Err(err);
    }
    Ok(())
}

fn stage_and_place<'a>(
    files: &[(&'a Path, &str)],
    placed: &mut Vec<&'a Path>,
) -> Result<(), PlanError> {
    for (path, contents) in files {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(staging_path(path), contents)?;
    }
    for (path, _) in files {
        fs::rename(staging_path(path), path)?;
        placed.push(*path);
    }
    Ok(())
}

/// Commands an operator runs after a plan is written
#[derive(Debug, Clone)]
pub struct NextSteps {
    pub bootstrap_server: String,
    pub command_config: Option<String>,
}

impl NextSteps {
    pub fn new(bootstrap_server: impl Into<String>, command_config: Option<String>) -> Self {
        Self {
            bootstrap_server: bootstrap_server.into(),
            command_config,
        }
    }

    fn base(&self, tool: &str) -> String {
        let mut cmd = format!("{} --bootstrap-server {}", tool, self.bootstrap_server);
        if let Some(config) = &self.command_config {
            cmd.push_str(" --command-config ");
            cmd.push_str(&shell_quote(config));
        }
        cmd
    }

    pub fn execute_command(&self, plan_file: &Path) -> String {
        format!(
            "{} --reassignment-json-file {} --execute",
            self.base("kafka-reassign-partitions"),
            shell_quote(&plan_file.display().to_string())
        )
    }

    pub fn verify_command(&self, plan_file: &Path) -> String {
        format!(
            "{} --reassignment-json-file {} --verify",
            self.base("kafka-reassign-partitions"),
            shell_quote(&plan_file.display().to_string())
        )
    }

    pub fn describe_command(&self) -> String {
        format!("{} --describe --topic <YOUR_TOPIC>", self.base("kafka-topics"))
    }

    pub fn election_command(&self, election_file: &Path) -> String {
        format!(
            "{} --path-to-json-file {} --election-type preferred",
            self.base("kafka-leader-election"),
            shell_quote(&election_file.display().to_string())
        )
    }

    /// Numbered instructions for the written files
    pub fn render(&self, files: &ExportedFiles) -> Vec<String> {
        let mut lines = vec![
            "NEXT STEPS".to_string(),
            String::new(),
            " 1. To execute, run:".to_string(),
            format!("    {}", self.execute_command(&files.reassignment)),
            String::new(),
            " 2. To verify, run:".to_string(),
            format!("    {}", self.verify_command(&files.reassignment)),
            String::new(),
            " 3. To inspect assignments:".to_string(),
            format!("    {}", self.describe_command()),
        ];

        if let Some(election) = &files.election {
            lines.extend([
                String::new(),
                " 4. After partitions sync, run preferred leader election:".to_string(),
                format!("    {}", self.election_command(election)),
                String::new(),
                " 5. Inspect assignments post-election to confirm leader.".to_string(),
            ]);
        }
        lines
    }
}

/// Quote for a POSIX shell, leaving plain words untouched
pub fn shell_quote(text: &str) -> String {
    let plain = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if plain {
        text.to_string()
    } else {
        format!("'{}'", text.replace('\'', r"'\''"))
    }
}

/// Comma-separated `topic-partition` list for messages
pub fn join_partitions(partitions: &[TopicPartition]) -> String {
    partitions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Plan, PlanEntry};

    fn leader_plan() -> ValidatedPlan {
        ValidatedPlan::new(Plan::new(
            PlanKind::LeaderElection { leader: 2 },
            vec![PlanEntry::new("t", 0, vec![2, 1])],
        ))
    }

    fn leftover_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_write_leader_plan_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = PlanExporter::new(dir.path()).write(&leader_plan()).unwrap();

        assert_eq!(files.partitions, 1);
        assert!(files.reassignment.is_file());
        assert!(files.election.as_deref().is_some_and(Path::is_file));
        assert_eq!(
            leftover_files(dir.path()),
            vec![LEADER_ELECTION_PLAN_FILE, LEADER_REASSIGNMENT_PLAN_FILE]
        );
    }

    #[test]
    fn test_failed_second_file_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join(LEADER_ELECTION_PLAN_FILE);
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), "x").unwrap();

        let result = PlanExporter::new(dir.path()).write(&leader_plan());

        assert!(matches!(result, Err(PlanError::Io(_))));
        assert!(!dir.path().join(LEADER_REASSIGNMENT_PLAN_FILE).exists());
        assert_eq!(leftover_files(dir.path()), vec![LEADER_ELECTION_PLAN_FILE]);
        assert!(blocker.join("keep").is_file());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/etc/kafka/client.properties"), "/etc/kafka/client.properties");
        assert_eq!(shell_quote("/tmp/my config"), "'/tmp/my config'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_next_steps_for_reassignment() {
        let steps = NextSteps::new("kafka:9092", Some("/etc/kafka/client.properties".to_string()));
        let files = ExportedFiles {
            reassignment: PathBuf::from(REASSIGNMENT_PLAN_FILE),
            election: None,
            partitions: 1,
        };
        let lines = steps.render(&files);
        assert!(lines.contains(
            &"    kafka-reassign-partitions --bootstrap-server kafka:9092 --command-config /etc/kafka/client.properties --reassignment-json-file reassign-partitions-plan.json --execute"
                .to_string()
        ));
        assert!(lines.iter().any(|l| l.ends_with("--verify")));
        assert!(!lines.iter().any(|l| l.contains("kafka-leader-election")));
    }

    #[test]
    fn test_next_steps_for_leader_election() {
        let steps = NextSteps::new("kafka:9092", None);
        let files = ExportedFiles {
            reassignment: PathBuf::from(LEADER_REASSIGNMENT_PLAN_FILE),
            election: Some(PathBuf::from(LEADER_ELECTION_PLAN_FILE)),
            partitions: 1,
        };
        let lines = steps.render(&files);
        assert!(lines.contains(
            &"    kafka-leader-election --bootstrap-server kafka:9092 --path-to-json-file leader-election-plan.json --election-type preferred"
                .to_string()
        ));
    }

    #[test]
    fn test_join_partitions() {
        let list = vec![TopicPartition::new("a", 0), TopicPartition::new("b", 3)];
        assert_eq!(join_partitions(&list), "a-0, b-3");
    }
}

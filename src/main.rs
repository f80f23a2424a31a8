use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use kafka_plan_tool::metadata::DEFAULT_KAFKA_TOPICS_BINARY;
use kafka_plan_tool::models::BrokerId;
use kafka_plan_tool::*;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DIVIDER_WIDTH: usize = 90;

#[derive(Parser)]
#[command(
    name = "kafka-plan-tool",
    about = "Builds Kafka partition reassignment and preferred leader election plans"
)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,

    /// Log file written alongside stderr output
    #[arg(long, global = true, default_value = "kafka_plan_tool.log")]
    log_file: PathBuf,

    /// Only log to stderr
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct SourceArgs {
    /// Kafka bootstrap server (host:port)
    #[arg(long, global = true, env = "KAFKA_BOOTSTRAP_SERVER")]
    bootstrap_server: Option<String>,

    /// Client properties file for SASL/SSL clusters
    #[arg(long, global = true, env = "KAFKA_COMMAND_CONFIG")]
    command_config: Option<PathBuf>,

    /// Read saved `kafka-topics --describe` output instead of contacting the cluster
    #[arg(long, global = true, conflicts_with = "snapshot")]
    describe_file: Option<PathBuf>,

    /// Read a JSON cluster snapshot (supports rack labels)
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Path to the kafka-topics executable
    #[arg(long, global = true, default_value = DEFAULT_KAFKA_TOPICS_BINARY)]
    kafka_topics_bin: PathBuf,

    /// Seconds to wait for kafka-topics
    #[arg(long, global = true, default_value = "120")]
    timeout_secs: u64,
}

#[derive(Args)]
struct ScopeArgs {
    /// Topic filter: substring, comma list, regex, or * for all
    #[arg(long, default_value = "*")]
    filter: String,

    /// Topic to leave out (repeatable)
    #[arg(long = "exclude-topic")]
    exclude_topics: Vec<String>,

    /// Leave internal topics out of scope
    #[arg(long)]
    no_internal: bool,
}

#[derive(Args)]
struct OutputArgs {
    /// Directory for the plan files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Validate and print the plan without writing files
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Show broker and topic counts for the loaded metadata
    Summary {
        /// Save the loaded metadata as a JSON snapshot
        #[arg(long)]
        save_snapshot: Option<PathBuf>,
    },
    /// Build a reassign partitions plan
    Reassign {
        #[command(flatten)]
        scope: ScopeArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Broker that must not receive replicas (repeatable)
        #[arg(long = "exclude-broker")]
        exclude_brokers: Vec<BrokerId>,

        /// PRNG seed for reproducibility (random if omitted)
        #[arg(long)]
        seed: Option<u64>,

        /// Redraw partitions that would keep their current replica set
        #[arg(long)]
        require_move: bool,

        /// Ignore rack labels when drawing replicas
        #[arg(long)]
        no_rack_spread: bool,
    },
    /// Build a preferred leader election plan
    ElectLeader {
        #[command(flatten)]
        scope: ScopeArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Broker to become the preferred leader
        #[arg(long)]
        leader: BrokerId,

        /// Leave out partitions the leader does not replicate instead of failing
        #[arg(long)]
        skip_missing: bool,
    },
    /// Validate an existing reassignment file against the loaded metadata
    Validate {
        /// Reassignment JSON file
        plan_file: PathBuf,

        /// Treat the file as a leader election plan for this broker
        #[arg(long)]
        leader: Option<BrokerId>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(if cli.no_log_file { None } else { Some(&cli.log_file) })?;

    print_banner();
    let source = metadata_source(&cli.source)?;

    match cli.command {
        Command::Summary { save_snapshot } => {
            let tool = PlanTool::load(source.as_ref(), GenerationOptions::default())?;
            print_totals(tool.metadata());
            if let Some(path) = save_snapshot {
                SnapshotFile::save(&path, tool.metadata())
                    .with_context(|| format!("writing snapshot to {}", path.display()))?;
                println!("Saved snapshot to '{}'", path.display());
            }
        }
        Command::Reassign {
            scope,
            output,
            exclude_brokers,
            seed,
            require_move,
            no_rack_spread,
        } => {
            let mut options = scope_options(&scope);
            options.excluded_brokers = exclude_brokers.into_iter().collect();
            options.seed = seed;
            options.require_move = require_move;
            options.prefer_rack_spread = !no_rack_spread;

            let tool = PlanTool::load(source.as_ref(), options)?;
            print_totals(tool.metadata());
            let filter = TopicFilter::parse(&scope.filter)?;

            print_block(&[
                "Action: Build a reassign partitions plan".to_string(),
                format!("Brokers available for assignment: {:?}", eligible_brokers(&tool)),
            ]);
            let plan = finish(tool.reassignment_plan(&filter))?;
            emit(&tool, &plan, &output, &cli.source)?;
        }
        Command::ElectLeader {
            scope,
            output,
            leader,
            skip_missing,
        } => {
            let tool = PlanTool::load(source.as_ref(), scope_options(&scope))?;
            print_totals(tool.metadata());
            if !tool.metadata().has_broker(leader) {
                bail!(
                    "Broker ID {} is not in the list of available brokers: {:?}",
                    leader,
                    tool.metadata().broker_ids()
                );
            }
            let filter = TopicFilter::parse(&scope.filter)?;

            print_block(&[
                "Action: Build a preferred leader election plan".to_string(),
                format!("Set Broker {} as the preferred leader.", leader),
            ]);
            let plan = if skip_missing {
                let (plan, skipped) = finish(tool.leader_election_plan_skipping(&filter, leader))?;
                if !skipped.is_empty() {
                    warn!(count = skipped.len(), broker = leader, "Skipped partitions the broker does not replicate");
                }
                plan
            } else {
                finish(tool.leader_election_plan(&filter, leader))?
            };
            emit(&tool, &plan, &output, &cli.source)?;
        }
        Command::Validate { plan_file, leader } => {
            let tool = PlanTool::load(source.as_ref(), GenerationOptions::default())?;
            let text = std::fs::read_to_string(&plan_file)
                .with_context(|| format!("reading {}", plan_file.display()))?;
            let kind = match leader {
                Some(leader) => PlanKind::LeaderElection { leader },
                None => PlanKind::Reassignment,
            };
            let plan = Plan::from_reassignment_json(&text, kind)?;
            let plan = finish(tool.validate(plan))?;
            println!("{}", plan.summary(tool.metadata()));
            println!("Plan '{}' is valid.", plan_file.display());
        }
    }

    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true);

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
        return Ok(None);
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .with_context(|| format!("invalid log file path {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .init();
    Ok(Some(guard))
}

fn metadata_source(args: &SourceArgs) -> anyhow::Result<Box<dyn MetadataSource>> {
    if let Some(path) = &args.snapshot {
        return Ok(Box::new(SnapshotFile::new(path)));
    }
    if let Some(path) = &args.describe_file {
        return Ok(Box::new(DescribeFile::new(path)));
    }
    match &args.bootstrap_server {
        Some(server) => Ok(Box::new(
            KafkaTopicsCommand::new(server.clone())
                .with_command_config(args.command_config.clone())
                .with_binary(args.kafka_topics_bin.clone())
                .with_timeout(Duration::from_secs(args.timeout_secs)),
        )),
        None => bail!("one of --bootstrap-server, --describe-file or --snapshot is required"),
    }
}

fn scope_options(scope: &ScopeArgs) -> GenerationOptions {
    GenerationOptions {
        excluded_topics: scope.exclude_topics.iter().cloned().collect(),
        include_internal_topics: !scope.no_internal,
        ..Default::default()
    }
}

fn eligible_brokers(tool: &PlanTool) -> Vec<BrokerId> {
    tool.metadata()
        .broker_ids()
        .into_iter()
        .filter(|id| tool.options().can_assign_to_broker(*id))
        .collect()
}

/// Print the full violation list before turning a validation failure into an error
fn finish<T>(result: Result<T, PlanError>) -> anyhow::Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(PlanError::Validation(report)) => {
            error!(violations = report.len(), "Plan failed validation; nothing was written");
            eprintln!("{}", report);
            Err(PlanError::Validation(report).into())
        }
        Err(e) => Err(e.into()),
    }
}

fn emit(tool: &PlanTool, plan: &ValidatedPlan, output: &OutputArgs, source: &SourceArgs) -> anyhow::Result<()> {
    println!("{}", plan.summary(tool.metadata()));

    if output.dry_run {
        for entry in plan.entries.iter().take(20) {
            let current = tool.metadata().partition(&entry.topic, entry.partition);
            println!("  {}", entry.description(current));
        }
        if plan.len() > 20 {
            println!("  ... and {} more partitions", plan.len() - 20);
        }
        return Ok(());
    }

    let files = tool.export(plan, &PlanExporter::new(&output.output_dir))?;
    println!("{}", "-".repeat(DIVIDER_WIDTH));
    match &files.election {
        Some(election) => println!(
            "[SUCCESS] Wrote reassignment plan to '{}' and leader election plan to '{}'.",
            files.reassignment.display(),
            election.display()
        ),
        None => println!(
            "[SUCCESS] Wrote rebalance plan to '{}' for {} partition(s).",
            files.reassignment.display(),
            files.partitions
        ),
    }

    let steps = NextSteps::new(
        source
            .bootstrap_server
            .clone()
            .unwrap_or_else(|| "<BOOTSTRAP_SERVER>".to_string()),
        source.command_config.as_ref().map(|p| p.display().to_string()),
    );
    print_block(&steps.render(&files));
    Ok(())
}

fn print_banner() {
    let title = "Kafka Partition Reassignment & Leader Election Plan Tool";
    let width = title.chars().count() + 4;
    println!("┌{}┐", "─".repeat(width));
    println!("│  {}  │", title);
    println!("└{}┘", "─".repeat(width));
}

fn print_totals(metadata: &ClusterMetadata) {
    println!("{}", "-".repeat(DIVIDER_WIDTH));
    for line in totals_lines(metadata) {
        println!("{}", line);
    }
}

/// Counts over the whole snapshot, before any topic filter is applied
fn totals_lines(metadata: &ClusterMetadata) -> Vec<String> {
    let stats = metadata.stats();
    vec![
        format!(
            "Loaded {} Custom Topics and {} Internal Topics.",
            stats.custom_topic_count, stats.internal_topic_count
        ),
        format!(" Total Topics Loaded: {}", stats.topic_count),
        format!(" Total Partitions Loaded: {}", stats.partition_count),
        format!(" Brokers: {:?}", metadata.broker_ids()),
    ]
}

fn print_block(lines: &[String]) {
    println!("{}", "-".repeat(DIVIDER_WIDTH));
    for line in lines {
        if line.is_empty() {
            println!();
        } else {
            println!("  {}", line);
        }
    }
    println!("{}", "-".repeat(DIVIDER_WIDTH));
}

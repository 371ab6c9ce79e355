// Replay binary - drives one output queue with a synthetic workload
//
// The binary builds a queue from configuration, replays a seeded admit/serve sequence against it,
// and prints the resulting metrics snapshot as JSON on stdout. Logs go to stderr.

use appifo::metrics::MetricsCollector;
use appifo::observer::ChannelObserver;
use appifo::packet::Packet;
use appifo::scheduler;
use appifo::workload::{self, WorkloadConfig};
use appifo::{ConfigError, DiagnosticsConfig, QueueConfig, SchedulerKind};
use std::process::ExitCode;

/// Diagnostic events buffered between the queue and the collector.
const DIAGNOSTICS_CHANNEL_CAPACITY: usize = 65_536;

/// Command-line options parsed from program arguments.
struct CliOptions {
    /// JSON queue configuration to start from (defaults apply when absent)
    config_path: Option<String>,
    /// Overrides applied on top of the loaded configuration
    scheduler: Option<SchedulerKind>,
    buckets: Option<usize>,
    capacity: Option<usize>,
    /// Workload parameters
    workload: WorkloadConfig,
}

/// Parse command-line arguments into `CliOptions`.
///
/// Every option accepts both `--key=value` and `--key value`.
///
/// # Supported Options
/// - `--config <path>`: JSON file holding a `QueueConfig`
/// - `--scheduler <tree|array>`: Bucket-management algorithm
/// - `--buckets <n>`, `--capacity <n>`: Queue shape
/// - `--ops <n>`, `--seed <n>`, `--admit-ratio <p>`, `--max-rank <r>`: Workload
fn parse_cli_options() -> Result<CliOptions, ConfigError> {
    let mut options = CliOptions {
        config_path: None,
        scheduler: None,
        buckets: None,
        capacity: None,
        workload: WorkloadConfig::default(),
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let (key, value) = match arg.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => {
                let value = args
                    .next()
                    .ok_or_else(|| ConfigError::Parse(format!("missing value for `{arg}`")))?;
                (arg, value)
            }
        };
        match key.as_str() {
            "--config" => options.config_path = Some(value),
            "--scheduler" => options.scheduler = Some(value.parse()?),
            "--buckets" => options.buckets = Some(parse_value(&key, &value)?),
            "--capacity" => options.capacity = Some(parse_value(&key, &value)?),
            "--ops" => options.workload.operations = parse_value(&key, &value)?,
            "--seed" => options.workload.seed = parse_value(&key, &value)?,
            "--admit-ratio" => options.workload.admit_ratio = parse_value(&key, &value)?,
            "--max-rank" => options.workload.max_rank = parse_value(&key, &value)?,
            _ => return Err(ConfigError::Parse(format!("unknown option `{key}`"))),
        }
    }
    Ok(options)
}

fn parse_value<V: std::str::FromStr>(key: &str, value: &str) -> Result<V, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Parse(format!("invalid value `{value}` for `{key}`")))
}

fn run(options: CliOptions) -> Result<String, Box<dyn std::error::Error>> {
    let mut config = match &options.config_path {
        Some(path) => QueueConfig::from_path(path)?,
        None => QueueConfig {
            diagnostics: DiagnosticsConfig::all(),
            ..QueueConfig::default()
        },
    };
    if let Some(kind) = options.scheduler {
        config.kind = kind;
    }
    if let Some(buckets) = options.buckets {
        config.buckets = buckets;
    }
    if let Some(capacity) = options.capacity {
        config.capacity = capacity;
    }

    let mut queue = scheduler::build::<Packet>(&config)?;
    let (observer, events_rx) = ChannelObserver::bounded(DIAGNOSTICS_CHANNEL_CAPACITY);
    let collector = MetricsCollector::new(events_rx);
    queue.attach_observer(Box::new(observer.clone()));

    let ops = options.workload.generate()?;
    tracing::info!(
        operations = ops.len(),
        seed = options.workload.seed,
        "replaying workload"
    );

    // Drain periodically so a long replay never overflows the diagnostics channel
    let chunk_len = DIAGNOSTICS_CHANNEL_CAPACITY / 4;
    let mut report = workload::ReplayReport::default();
    for (index, chunk) in ops.chunks(chunk_len).enumerate() {
        let partial = workload::replay_from(
            &mut queue,
            chunk,
            (index * chunk_len) as u64,
            options.workload.flows,
            Some((&collector, config.queue_id)),
        );
        report.outcomes.extend(partial.outcomes);
        report.served.extend(partial.served);
        report.remaining = partial.remaining;
        collector.drain();
    }

    tracing::info!(
        accepted = report.accepted(),
        dropped = report.dropped(),
        served = report.served.len(),
        remaining = report.remaining,
        out_of_order = report.out_of_order(),
        lost_events = observer.lost(),
        "replay finished"
    );

    let snapshots = collector.snapshots();
    Ok(serde_json::to_string_pretty(&snapshots)?)
}

fn main() -> ExitCode {
    appifo::logging::init("info");

    let options = match parse_cli_options() {
        Ok(options) => options,
        Err(err) => {
            tracing::error!(%err, "invalid arguments");
            return ExitCode::from(2);
        }
    };

    match run(options) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(%err, "replay failed");
            ExitCode::FAILURE
        }
    }
}

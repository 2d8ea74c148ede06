//! `driftscan` agent CLI: runs drift detection cycles over a TOML config.

use std::{
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use driftscan::{
    app_dirs,
    changeset::{Category, ChangeSetStore, DirChangeSetStore},
    config::{self, AgentConfig, DriftDetectionSchedule},
    detect::{DetectionSummary, DriftDetector, SnapshotGenerator, StaticResourceLocator},
    logging,
    sender::{ContentSource, FilesSender, OutboxTransport, content_hashes},
};
use tracing::{error, info, warn};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        return Ok(());
    };
    let config = load_config(&options)?;
    if let Some(data_dir) = &config.agent.data_dir {
        app_dirs::set_home_override(data_dir.clone()).map_err(|err| err.to_string())?;
    }
    if let Err(err) = logging::init() {
        logging::init_stderr_only();
        warn!("File logging unavailable: {err}");
    }

    let agent = Agent::new(&config)?;
    let schedules: Vec<_> = config
        .schedules()
        .into_iter()
        .filter(|schedule| options.matches(schedule))
        .collect();
    if schedules.is_empty() && !matches!(options.command, Command::Send { .. }) {
        return Err("No enabled drift definitions match the selection".to_string());
    }

    match &options.command {
        Command::Snapshot => {
            for schedule in &schedules {
                agent.snapshot(schedule)?;
            }
            Ok(())
        }
        Command::Detect => {
            let mut failures = 0;
            for schedule in &schedules {
                if !agent.detect(schedule) {
                    failures += 1;
                }
            }
            if failures > 0 {
                return Err(format!("{failures} detection cycle(s) failed"));
            }
            Ok(())
        }
        Command::Run => {
            agent.run_forever(schedules);
            Ok(())
        }
        Command::Send { hashes } => {
            let resource_id = options
                .resource_id
                .ok_or_else(|| "send requires --resource".to_string())?;
            let definition = options
                .definition
                .as_deref()
                .ok_or_else(|| "send requires --definition".to_string())?;
            agent.send(resource_id, definition, hashes)
        }
    }
}

fn load_config(options: &Options) -> Result<AgentConfig, String> {
    match &options.config_path {
        Some(path) => config::load_from_path(path).map_err(|err| err.to_string()),
        None => {
            let home = app_dirs::home_dir().map_err(|err| err.to_string())?;
            config::load_or_default(&home).map_err(|err| err.to_string())
        }
    }
}

/// Detection and content hand-off wired to the on-disk store.
struct Agent {
    detector: DriftDetector,
    outbox: PathBuf,
    send_content: bool,
}

impl Agent {
    fn new(config: &AgentConfig) -> Result<Self, String> {
        let changesets = app_dirs::changesets_dir().map_err(|err| err.to_string())?;
        let outbox = app_dirs::outbox_dir().map_err(|err| err.to_string())?;
        let detector = DriftDetector::new(
            Arc::new(DirChangeSetStore::new(changesets)),
            Arc::new(StaticResourceLocator::from_config(config)),
        )
        .with_lock_timeout(Duration::from_millis(config.agent.lock_timeout_ms));
        Ok(Self {
            detector,
            outbox,
            send_content: config.agent.send_content,
        })
    }

    /// Write the first coverage snapshot (and pinned baseline); refused once one exists.
    fn snapshot(&self, schedule: &DriftDetectionSchedule) -> Result<(), String> {
        let base_dir = self
            .detector
            .locator()
            .base_directory(schedule.resource_id, &schedule.definition)
            .map_err(|err| err.to_string())?;
        let strategy = self.detector.strategy_for(schedule.resource_id);
        let generator = SnapshotGenerator::new(self.detector.store().as_ref(), strategy.as_ref());
        let summary = generator
            .generate_snapshot(schedule, &base_dir)
            .map_err(|err| format!("{schedule}: {err}"))?;
        match &summary.new_snapshot {
            Some(path) => println!("{schedule}: snapshot written to {}", path.display()),
            None => println!("{schedule}: base directory {} not found", base_dir.display()),
        }
        Ok(())
    }

    /// One cycle plus content hand-off; returns whether the cycle succeeded.
    fn detect(&self, schedule: &DriftDetectionSchedule) -> bool {
        let Ok(summary) = self.detector.detect(schedule) else {
            return false;
        };
        if self.send_content && summary.upload_due() {
            self.upload(&summary);
        }
        true
    }

    /// Hand off the content introduced by a cycle; failures are only logged.
    fn upload(&self, summary: &DetectionSummary) {
        let schedule = &summary.schedule;
        let Some(changeset) = &summary.drift_changeset else {
            return;
        };
        let store = self.detector.store();
        let result = content_hashes(store.as_ref(), changeset).and_then(|hashes| {
            let headers = store.reader(changeset)?.headers().clone();
            self.sender(schedule.resource_id)
                .send(schedule.resource_id, &headers, &hashes)
        });
        if let Err(err) = result {
            error!(
                resource_id = schedule.resource_id,
                definition = %schedule.definition.name,
                error = %err,
                "Failed to send content for {schedule}"
            );
        }
    }

    fn sender(&self, resource_id: i32) -> FilesSender {
        let source = ContentSource::for_resource(
            self.detector.locator().as_ref(),
            self.detector.locks(),
            resource_id,
            self.detector.lock_timeout(),
        );
        FilesSender::new(
            Arc::clone(self.detector.store()),
            source,
            Arc::new(OutboxTransport::new(&self.outbox)),
        )
    }

    fn send(&self, resource_id: i32, definition: &str, hashes: &[String]) -> Result<(), String> {
        let store = self.detector.store();
        let coverage = store
            .find_changeset(resource_id, definition, Category::Coverage)
            .map_err(|err| err.to_string())?;
        if !store.exists(&coverage) {
            return Err(format!(
                "No coverage snapshot for resource {resource_id}, definition {definition}"
            ));
        }
        let headers = store
            .reader(&coverage)
            .map_err(|err| err.to_string())?
            .headers()
            .clone();
        let outcome = self
            .sender(resource_id)
            .send(resource_id, &headers, hashes)
            .map_err(|err| err.to_string())?;
        println!(
            "Packaged {} file(s), skipped {}.",
            outcome.packaged, outcome.skipped
        );
        Ok(())
    }

    /// Run due schedules until the process is stopped.
    fn run_forever(&self, mut schedules: Vec<DriftDetectionSchedule>) {
        info!(schedules = schedules.len(), "Drift detection agent started");
        loop {
            let now = now_millis();
            for schedule in schedules.iter_mut().filter(|s| s.next_scan <= now) {
                self.detect(schedule);
                schedule.update_next_scan();
            }
            let next = schedules
                .iter()
                .map(|schedule| schedule.next_scan)
                .min()
                .unwrap_or(now);
            let wait = (next - now_millis()).clamp(1_000, 60_000);
            thread::sleep(Duration::from_millis(wait as u64));
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

enum Command {
    Snapshot,
    Detect,
    Run,
    Send { hashes: Vec<String> },
}

struct Options {
    command: Command,
    config_path: Option<PathBuf>,
    resource_id: Option<i32>,
    definition: Option<String>,
}

impl Options {
    fn matches(&self, schedule: &DriftDetectionSchedule) -> bool {
        self.resource_id.is_none_or(|id| id == schedule.resource_id)
            && self
                .definition
                .as_deref()
                .is_none_or(|name| name == schedule.definition.name)
    }
}

fn parse_args(args: Vec<String>) -> Result<Option<Options>, String> {
    let mut command = None;
    let mut config_path = None;
    let mut resource_id = None;
    let mut definition = None;
    let mut hashes = Vec::new();
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                return Ok(None);
            }
            "--config" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            "--resource" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--resource requires a value".to_string())?;
                let id = value
                    .parse::<i32>()
                    .map_err(|_| format!("Invalid resource id: {value}"))?;
                resource_id = Some(id);
            }
            "--definition" => {
                idx += 1;
                let value = args
                    .get(idx)
                    .ok_or_else(|| "--definition requires a value".to_string())?;
                definition = Some(value.to_string());
            }
            "snapshot" | "detect" | "run" | "send" if command.is_none() => {
                command = Some(args[idx].clone());
            }
            value if command.as_deref() == Some("send") && !value.starts_with('-') => {
                hashes.push(value.to_string());
            }
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }

    let command = match command.as_deref() {
        Some("snapshot") => Command::Snapshot,
        Some("detect") => Command::Detect,
        Some("run") => Command::Run,
        Some("send") => {
            if hashes.is_empty() {
                return Err("send requires at least one content hash".to_string());
            }
            Command::Send { hashes }
        }
        _ => return Err(format!("Missing command\n\n{}", help_text())),
    };
    Ok(Some(Options {
        command,
        config_path,
        resource_id,
        definition,
    }))
}

fn help_text() -> String {
    [
        "driftscan",
        "",
        "Detects configuration drift in managed file trees.",
        "",
        "Usage:",
        "  driftscan [--config <path>] snapshot [--resource <id>] [--definition <name>]",
        "  driftscan [--config <path>] detect [--resource <id>] [--definition <name>]",
        "  driftscan [--config <path>] run",
        "  driftscan [--config <path>] send --resource <id> --definition <name> <hash>...",
        "",
        "Commands:",
        "  snapshot        Record the first coverage snapshot (and pinned baseline).",
        "  detect          Run one detection cycle per definition.",
        "  run             Run detection cycles on each definition's interval.",
        "  send            Package content for the given hashes into the outbox.",
        "",
        "Options:",
        "  --config <path>      Path to driftscan.toml (defaults to the agent home).",
        "  --resource <id>      Restrict to one resource.",
        "  --definition <name>  Restrict to one drift definition.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parses_detect_with_filters() {
        let options = parse_args(args(&[
            "--config",
            "agent.toml",
            "detect",
            "--resource",
            "10001",
            "--definition",
            "conf",
        ]))
        .unwrap()
        .unwrap();
        assert!(matches!(options.command, Command::Detect));
        assert_eq!(options.config_path, Some(PathBuf::from("agent.toml")));
        assert_eq!(options.resource_id, Some(10001));
        assert_eq!(options.definition.as_deref(), Some("conf"));
    }

    #[test]
    fn send_collects_hashes() {
        let options = parse_args(args(&["send", "--resource", "1", "aa", "bb"]))
            .unwrap()
            .unwrap();
        match options.command {
            Command::Send { hashes } => assert_eq!(hashes, vec!["aa", "bb"]),
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn rejects_missing_command_and_unknown_flags() {
        assert!(parse_args(args(&["--config", "a.toml"])).is_err());
        assert!(parse_args(args(&["detect", "--bogus"])).is_err());
        assert!(parse_args(args(&["send"])).is_err());
        assert!(parse_args(args(&["--resource", "x", "detect"])).is_err());
    }
}

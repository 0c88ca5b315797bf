//! Mailbox bridge CLI.
//!
//! Generates content for each task, hands it to the executor through the
//! shared mailbox file and self-corrects from the executor's error text.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use bridge::cancel::StopFlag;
use bridge::core::types::{Task, Verdict};
use bridge::events::{ConsoleSink, Sender, emit};
use bridge::exit_codes;
use bridge::io::config::{BridgeConfig, DEFAULT_CONFIG_PATH, load_config, write_config};
use bridge::io::evidence::{EvidenceRecorder, NoEvidence, ReportRecorder, display_name};
use bridge::io::generator::CommandGenerator;
use bridge::io::mailbox::FileMailbox;
use bridge::io::tasks::TaskFile;
use bridge::logging;
use bridge::queue::{QueueRunner, QueueStop, QueueSummary};
use bridge::retry::RetryController;
use bridge::session::Session;

/// Category given to prompts entered with `bridge ask`.
const ASK_CATEGORY: &str = "Interactive";

#[derive(Parser)]
#[command(
    name = "bridge",
    version,
    about = "Self-correcting command bridge between a code generator and a remote executor"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config if missing and reset the mailbox to idle.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Run every task from the task file. Type `stop` + Enter to cancel.
    Run {
        /// Task file (defaults to `tasks_path` from the config).
        #[arg(long)]
        tasks: Option<PathBuf>,
    },
    /// Run a single prompt through the retry loop.
    Ask { prompt: String },
    /// Print the current mailbox record.
    Status,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Run { tasks } => cmd_run(&load_config(&cli.config)?, tasks),
        Command::Ask { prompt } => cmd_ask(&load_config(&cli.config)?, &prompt),
        Command::Status => cmd_status(&load_config(&cli.config)?),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if force || !config_path.exists() {
        write_config(config_path, &BridgeConfig::default())?;
        println!("wrote {}", config_path.display());
    }
    let cfg = load_config(config_path)?;
    FileMailbox::new(&cfg.mailbox_path)
        .reset()
        .context("reset mailbox")?;
    println!("mailbox idle at {}", cfg.mailbox_path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(cfg: &BridgeConfig, tasks: Option<PathBuf>) -> Result<i32> {
    let source = TaskFile::new(tasks.unwrap_or_else(|| cfg.tasks_path.clone()));
    let runner = QueueRunner::new(controller(cfg)?, cfg.cooldown(), recorder(cfg));

    let session = Session::new();
    session.start(runner, source, ConsoleSink)?;
    watch_stdin_for_stop(session.stop_flag());
    let summary = session.wait()?;
    Ok(summary_exit_code(&summary))
}

fn cmd_ask(cfg: &BridgeConfig, prompt: &str) -> Result<i32> {
    let controller = controller(cfg)?;
    let stop = StopFlag::new();
    watch_stdin_for_stop(stop.clone());

    let task = Task::new(ASK_CATEGORY, prompt);
    let run = controller.run_task(&task, &stop, &ConsoleSink);
    if let Some(path) = recorder(cfg).record(&task, &run) {
        emit(
            &ConsoleSink,
            Sender::System,
            format!("Report saved: {}", display_name(&path)),
        );
    }
    Ok(match run.verdict {
        Verdict::Pass => exit_codes::OK,
        Verdict::Fail => exit_codes::FAILED,
    })
}

fn cmd_status(cfg: &BridgeConfig) -> Result<i32> {
    let record = FileMailbox::new(&cfg.mailbox_path)
        .read_record()
        .context("read mailbox")?;
    println!(
        "{}",
        serde_json::to_string_pretty(&record).context("serialize mailbox record")?
    );
    Ok(exit_codes::OK)
}

fn controller(cfg: &BridgeConfig) -> Result<RetryController<FileMailbox, CommandGenerator>> {
    let mailbox = FileMailbox::open(&cfg.mailbox_path).context("open mailbox")?;
    let generator = CommandGenerator::new(&cfg.generator).context("configure generator")?;
    Ok(RetryController::new(
        Arc::new(mailbox),
        &cfg.action,
        generator,
        cfg.policy(),
    ))
}

fn recorder(cfg: &BridgeConfig) -> Box<dyn EvidenceRecorder> {
    match &cfg.report_dir {
        Some(dir) => Box::new(ReportRecorder::new(dir)),
        None => Box::new(NoEvidence),
    }
}

/// Request a stop when `stop` is typed on stdin. The thread ends at EOF.
fn watch_stdin_for_stop(stop: StopFlag) {
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().eq_ignore_ascii_case("stop") {
                stop.request();
                break;
            }
        }
    });
}

fn summary_exit_code(summary: &QueueSummary) -> i32 {
    match summary.stop {
        QueueStop::NoTasks => exit_codes::INVALID,
        QueueStop::Stopped => exit_codes::STOPPED,
        QueueStop::Completed if summary.failed() > 0 => exit_codes::FAILED,
        QueueStop::Completed => exit_codes::OK,
    }
}

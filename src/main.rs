use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::{Args, Parser, Subcommand};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{error, info};

use hostlog::collectors::{PowerReportProvider, PowertopCollector, SysinfoCollector, ToolStatus};
use hostlog::config::{Config, LogMode};
use hostlog::node::{Network, NodeLauncher};
use hostlog::sampler::{self, RunOptions, Sampler};
use hostlog::{Error, Result, logfile, logging};

#[derive(Parser)]
#[command(name = "hostlog", version, about = "Sample host resources to CSV and launch local node consoles")]
struct Cli {
    /// JSON config file; command-line flags override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for diagnostic logs.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log CPU, memory, swap and disk usage every second until Ctrl+C.
    Log(SampleArgs),
    /// Log host metrics plus a PowerTOP report every five seconds (needs root).
    Power(PowerArgs),
    /// Bootstrap a node data directory and open its console in a new terminal.
    Node(NodeArgs),
}

#[derive(Args)]
struct SampleArgs {
    /// CSV file to create (truncated if it exists).
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Seconds between samples.
    #[arg(short, long)]
    interval: Option<f64>,
    /// Path on the filesystem whose usage is logged.
    #[arg(long)]
    disk_root: Option<PathBuf>,
    /// Seconds of sampling between progress messages.
    #[arg(long)]
    progress_every: Option<f64>,
}

#[derive(Args)]
struct PowerArgs {
    #[command(flatten)]
    sample: SampleArgs,
    /// Process whose power contribution is logged.
    #[arg(long)]
    subsystem: Option<String>,
    /// PowerTOP binary.
    #[arg(long)]
    powertop: Option<PathBuf>,
}

#[derive(Args)]
struct NodeArgs {
    #[arg(short, long, value_enum)]
    network: Option<Network>,
    /// HTTP RPC port, also used to name the data directory.
    #[arg(short, long)]
    port: Option<u16>,
    /// Node executable.
    #[arg(long)]
    binary: Option<PathBuf>,
    #[arg(long)]
    datadir: Option<PathBuf>,
}

impl SampleArgs {
    fn apply(self, config: &mut Config) {
        let sampler = &mut config.sampler;
        if let Some(output) = self.output {
            sampler.output = Some(output);
        }
        if let Some(interval) = self.interval {
            sampler.interval_secs = Some(interval);
        }
        if let Some(root) = self.disk_root {
            sampler.disk_root = root;
        }
        if let Some(every) = self.progress_every {
            sampler.progress_every_secs = every;
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let log_dir = cli.log_dir.clone().unwrap_or_else(|| {
        dirs::data_local_dir()
            .map(|dir| dir.join("hostlog").join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"))
    });
    let _guard = logging::init(&log_dir);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "fatal");
            eprintln!("\nError: {err}\n");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    match cli.command {
        Command::Log(args) => {
            args.apply(&mut config);
            sample(&config, LogMode::Base)
        }
        Command::Power(args) => {
            args.sample.apply(&mut config);
            if let Some(subsystem) = args.subsystem {
                config.powertop.subsystem = subsystem;
            }
            if let Some(binary) = args.powertop {
                config.powertop.binary = binary;
            }
            sample(&config, LogMode::Power)
        }
        Command::Node(args) => {
            let node = &mut config.node;
            if let Some(network) = args.network {
                node.network = network;
            }
            if let Some(port) = args.port {
                node.port = port;
            }
            if let Some(binary) = args.binary {
                node.binary = binary;
            }
            if args.datadir.is_some() {
                node.datadir = args.datadir;
            }
            launch_node(&config)
        }
    }
}

fn sample(config: &Config, mode: LogMode) -> Result<()> {
    let settings = &config.sampler;
    let options = RunOptions {
        interval: settings.interval(mode)?,
        progress_every: settings.progress_every()?,
        announce_samples: settings.announce_samples(mode),
    };

    let mut sampler = Sampler::new(SysinfoCollector::new(), settings.disk_root.clone());
    if mode.include_power() {
        let mut provider = PowertopCollector::new(config.powertop.clone())?;
        if provider.ensure_tool_running()? == ToolStatus::Started {
            println!("Started {} in a new terminal.", config.powertop.binary.display());
        }
        sampler = sampler.with_power(Box::new(provider), config.powertop.capture());
        if let Some(report) = sampler.power_report() {
            println!("{}", report.to_json());
        }
    }

    let cancel = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&cancel))
            .map_err(|err| Error::io(err, "failed to install signal handler"))?;
    }

    let path = settings.output_path(mode);
    let log = logfile::open_log(&path, mode.include_power())?;
    println!("Logging to {} every {:?}. Press Ctrl+C to stop.", path.display(), options.interval);

    let summary = sampler::run(&mut sampler, log, &options, &cancel, &mut io::stdout())?;
    println!("\nStopped after {} samples. {} closed.", summary.rows, summary.path.display());
    Ok(())
}

fn launch_node(config: &Config) -> Result<()> {
    let launcher = NodeLauncher::new(config.node.clone());
    let node = launcher.config();
    println!("Starting console...\n");
    let account = launcher.launch()?;
    if let Some(account) = account {
        println!("Address: {}", account.address);
        println!("Hosted at:\n\n\t\t127.0.0.1:{}\n", node.port);
    }
    info!(network = %node.network, "console launched");
    println!("If this errored, make sure that another node console is not running.");
    Ok(())
}

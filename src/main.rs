use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::Parser;
use log::info;

use netbatch::config::BatchConfig;
use netbatch::dispatch::BoundedDispatcher;
use netbatch::inventory;
use netbatch::profile::DeviceKind;
use netbatch::report::BatchReport;
use netbatch::runner::{RunnerOptions, SessionRunner};
use netbatch::session::{ConnectionSecurityOptions, SecurityLevel, SshConnector};
use netbatch::target::{Credentials, DeviceTarget, TargetSet};

const PASSWORD_ENV: &str = "NETBATCH_PASSWORD";

const EXIT_DEVICE_FAILURE: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;

/// Save the configuration of every listed device and collect its flash status.
#[derive(Parser, Debug)]
#[command(name = "netbatch", version)]
#[command(about = "Save configs and collect status output from network devices over SSH.")]
struct Cli {
    /// File with one device address per line
    #[arg(short, long, default_value = "addresses.txt")]
    inventory: PathBuf,

    /// Maximum number of devices worked on at the same time
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Device dialect (hp_procurve, cisco_ios, huawei, h3c, hillstone)
    #[arg(short, long)]
    profile: Option<DeviceKind>,

    /// Command run after saving, instead of the dialect default
    #[arg(long)]
    status_command: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Seconds allowed to open a session
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Seconds allowed for each command
    #[arg(long)]
    command_timeout: Option<u64>,

    /// Directory for the <host>_output.txt logs
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// SSH algorithm policy (secure, balanced, legacy)
    #[arg(long)]
    security: Option<SecurityLevel>,

    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the batch report as JSON to this file
    #[arg(long)]
    json_report: Option<PathBuf>,

    /// Login name, defaults to the current user
    #[arg(short, long)]
    username: Option<String>,

    /// Print the configuration file JSON schema and exit
    #[arg(long)]
    print_config_schema: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// File values first, then flags on top.
    fn resolve_config(&self) -> anyhow::Result<BatchConfig> {
        let mut config = match &self.config {
            Some(path) => BatchConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => BatchConfig::default(),
        };

        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(profile) = self.profile {
            config.profile = profile;
        }
        if let Some(command) = &self.status_command {
            config.status_command = Some(command.clone());
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(secs) = self.connect_timeout {
            config.connect_timeout_secs = secs;
        }
        if let Some(secs) = self.command_timeout {
            config.command_timeout_secs = secs;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(level) = self.security {
            config.security = level;
        }

        config.validate()?;
        Ok(config)
    }

    fn credentials(&self) -> anyhow::Result<Credentials> {
        let username = match &self.username {
            Some(name) => name.clone(),
            None => match std::env::var("USER").or_else(|_| std::env::var("USERNAME")) {
                Ok(name) => name,
                Err(_) => bail!("no --username given and the current user is unknown"),
            },
        };

        let password = match std::env::var(PASSWORD_ENV) {
            Ok(password) => password,
            Err(_) => rpassword::prompt_password(format!("Password for {username}: "))
                .context("reading password")?,
        };

        Ok(Credentials::new(username, password))
    }
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

struct Prepared {
    config: BatchConfig,
    dispatcher: BoundedDispatcher<SshConnector>,
    targets: Vec<DeviceTarget>,
}

/// Everything that can fail before a device is contacted.
fn prepare(cli: &Cli) -> anyhow::Result<Prepared> {
    let config = cli.resolve_config()?;

    let hosts = inventory::load_addresses(&cli.inventory)?;
    if hosts.is_empty() {
        info!("{} lists no devices", cli.inventory.display());
    }
    if !config.output_dir.is_dir() {
        bail!(
            "output directory {} does not exist",
            config.output_dir.display()
        );
    }

    let targets = TargetSet::new(cli.credentials()?, config.profile)
        .with_port(config.port)
        .with_output_dir(config.output_dir.clone())
        .build(hosts)?;

    let connector = SshConnector::new(ConnectionSecurityOptions::for_level(config.security));
    let runner = SessionRunner::new(connector, RunnerOptions::from_config(&config));
    let dispatcher = BoundedDispatcher::new(runner, config.concurrency)?;

    Ok(Prepared {
        config,
        dispatcher,
        targets,
    })
}

fn print_report(report: &BatchReport) {
    for result in report.results() {
        println!("{}: {}", result.host(), result.status());
    }
    println!("{}", report.summary());
}

/// 0 when every device succeeded and the report (if any) was written, 1 otherwise.
fn exit_status(report: &BatchReport, report_written: bool) -> u8 {
    if report.all_succeeded() && report_written {
        0
    } else {
        EXIT_DEVICE_FAILURE
    }
}

fn write_json_report(report: &BatchReport, path: &Path) -> anyhow::Result<()> {
    let json = report.to_json_pretty()?;
    std::fs::write(path, json).with_context(|| format!("writing report {}", path.display()))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.print_config_schema {
        return match BatchConfig::json_schema() {
            Ok(schema) => {
                println!("{schema}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::from(EXIT_CONFIG_ERROR)
            }
        };
    }

    let prepared = match prepare(&cli) {
        Ok(prepared) => prepared,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    info!(
        "Running {} with status command '{}'",
        prepared.config.profile,
        prepared.config.effective_status_command()
    );

    let report = prepared.dispatcher.run_batch(prepared.targets).await;
    print_report(&report);

    let report_written = match &cli.json_report {
        Some(path) => match write_json_report(&report, path) {
            Ok(()) => true,
            Err(err) => {
                eprintln!("error: {err:#}");
                false
            }
        },
        None => true,
    };
    ExitCode::from(exit_status(&report, report_written))
}

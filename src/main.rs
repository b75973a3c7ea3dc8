use anyhow::bail;
use clap::{CommandFactory, Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use vcd_autoscale::config::{Config, Options};
use vcd_autoscale::driver::{actions, table, Response};
use vcd_autoscale::vcd::http::format_vcd_error;
use vcd_autoscale::vcd::VcdError;

/// vCloud Director autoscaling driver
///
/// Options may also be given in the vApp config file (`key value` per
/// line); command line values take precedence.
#[derive(Parser, Debug)]
#[command(name = "vcd-autoscale", version = vcd_autoscale::VERSION, about, long_about = None)]
struct Args {
    /// Action to perform
    #[arg(value_enum, ignore_case = true)]
    action: Option<Action>,

    /// VCD API root, e.g. https://vcd.example.com/api
    #[arg(long = "apiHost")]
    api_host: Option<String>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    pass: Option<String>,

    #[arg(long)]
    org: Option<String>,

    #[arg(long)]
    vdc: Option<String>,

    #[arg(long)]
    vapp: Option<String>,

    /// Comma separated networks to connect new nodes to
    #[arg(long)]
    networks: Option<String>,

    /// Network carrying the public address
    #[arg(long = "pubNet")]
    pub_net: Option<String>,

    /// Network carrying the private address
    #[arg(long = "privNet")]
    priv_net: Option<String>,

    /// IP allocation mode for new nodes: POOL or DHCP
    #[arg(long = "ipMode")]
    ip_mode: Option<String>,

    /// Size reported for every node
    #[arg(long)]
    sizeid: Option<String>,

    /// Node name (createnode, destroynode, status)
    #[arg(long)]
    name: Option<String>,

    /// Template to create nodes from
    #[arg(long)]
    imageid: Option<String>,

    /// Unique ID of the node to destroy
    #[arg(long)]
    id: Option<String>,

    /// Only report nodes changed since this epoch second
    #[arg(long)]
    deltasince: Option<String>,

    /// Request guest customization on new nodes (true/false)
    #[arg(long)]
    customize: Option<String>,

    /// Seconds to wait for a VCD task
    #[arg(long)]
    timeout: Option<String>,

    #[arg(long)]
    statefile: Option<String>,

    /// Wrap get-vdc-info output to the terminal width
    #[arg(long)]
    wrap: bool,

    /// Cloud credentials name, looked up under $ZEUSHOME
    #[arg(long)]
    cloudcreds: Option<String>,

    /// VApp config file, bypassing the cloud credentials lookup
    #[arg(long)]
    cred1: Option<String>,

    /// Print debug logging to stderr
    #[arg(long)]
    verbose: bool,

    /// Log level for the log file
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,
}

impl Args {
    fn options(&self) -> Options {
        let values = [
            ("apiHost", &self.api_host),
            ("user", &self.user),
            ("pass", &self.pass),
            ("org", &self.org),
            ("vdc", &self.vdc),
            ("vapp", &self.vapp),
            ("networks", &self.networks),
            ("pubNet", &self.pub_net),
            ("privNet", &self.priv_net),
            ("ipMode", &self.ip_mode),
            ("sizeid", &self.sizeid),
            ("name", &self.name),
            ("imageid", &self.imageid),
            ("id", &self.id),
            ("deltasince", &self.deltasince),
            ("customize", &self.customize),
            ("timeout", &self.timeout),
            ("statefile", &self.statefile),
            ("cloudcreds", &self.cloudcreds),
            ("cred1", &self.cred1),
        ];

        let mut opts: Options = values
            .into_iter()
            .filter_map(|(key, value)| value.clone().map(|v| (key.to_string(), v)))
            .collect();
        if self.wrap {
            opts.insert("wrap".to_string(), String::new());
        }
        opts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Action {
    /// Report node status
    Status,
    /// Add a node to the vApp
    Createnode,
    /// Remove a node from the vApp
    Destroynode,
    /// List the resources visible in the vdc
    GetVdcInfo,
    Help,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()))
}

fn setup_logging(
    level: LogLevel,
    verbose: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    if verbose {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter(Level::DEBUG))
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
        return None;
    }

    let tracing_level = level.to_tracing_level()?;
    let log_path = get_log_path();

    let (non_blocking, guard) = match log_writer(&log_path) {
        Ok(writer) => writer,
        Err(e) => {
            eprintln!("Failed to open log file {}: {}", log_path.display(), e);
            return None;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(tracing_level))
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("vcd-autoscale started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

/// Non-blocking appender on `path`; records reach the file once the guard drops
fn log_writer(
    path: &Path,
) -> std::io::Result<(
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
)> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(tracing_appender::non_blocking(file))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("vcd-autoscale").join("vcd-autoscale.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".vcd-autoscale").join("vcd-autoscale.log");
    }
    PathBuf::from("vcd-autoscale.log")
}

fn usage() -> ExitCode {
    eprintln!("{}", Args::command().render_long_help());
    ExitCode::FAILURE
}

fn describe(err: &anyhow::Error) -> String {
    match err.downcast_ref::<VcdError>() {
        Some(vcd) => format_vcd_error(vcd),
        None => format!("{err:#}"),
    }
}

async fn run(action: Action, config: &Config) -> anyhow::Result<()> {
    let mut manager = actions::setup(config).await?;

    let response: Response = match action {
        Action::Status => actions::status(&mut manager, config).await?,
        Action::Createnode => actions::create_node(&mut manager, config).await?,
        Action::Destroynode => actions::destroy_node(&mut manager, config).await?,
        Action::GetVdcInfo => {
            let sections = actions::vdc_info(&mut manager, config).await?;
            let width = if config.wrap {
                table::terminal_width()
            } else {
                None
            };
            print!("{}", table::render(&sections, width));
            manager.close_session();
            return Ok(());
        }
        Action::Help => bail!("help does not talk to VCD"),
    };

    println!("{}", response.to_json()?);
    manager.close_session();
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Dropped when main returns, which flushes the file appender
    let _log_guard = setup_logging(args.log_level, args.verbose);

    let action = match args.action {
        Some(Action::Help) | None => return usage(),
        Some(action) => action,
    };

    let config = match Config::load(args.options()) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Invalid configuration: {:#}", err);
            eprintln!("ERROR - {err:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(statefile) = &config.statefile {
        tracing::debug!(
            "State file {:?} is not used; history is kept in vApp metadata",
            statefile
        );
    }

    match run(action, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{} failed: {:#}", format!("{action:?}").to_lowercase(), err);
            eprintln!("Error: {}", describe(&err));
            ExitCode::FAILURE
        }
    }
}

//! qrc - command-line client for the Core control protocol
//!
//! Reads and sets component controls, pushes script code and runs the
//! script/plugin diagnostics and remediation pass. Results are printed as
//! JSON on stdout or written to `--output`.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use qrc_core::config::{Config, Directories};
use qrc_core::{DiagnosticsEngine, DiagnosticsPolicy, SiteLabels};
use qrc_rpc::RpcClient;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Core control client
#[derive(Parser)]
#[command(name = "qrc")]
#[command(about = "Control and diagnose a Core over its JSON-RPC interface")]
#[command(version)]
#[command(after_help = "\
Examples:
  qrc --host 10.0.0.5 components              List components
  qrc -c 'Gain 1' get gain mute               Read two controls
  qrc -c 'Gain 1' set gain -12 --ramp 2       Ramp gain to -12 over 2s
  qrc -c 'Main Script' push-code main.lua     Replace a script's code
  qrc scan                                    Find faulted scripts and plugins
  qrc remediate --system AV --site HQ --host-label core-01 -o report.json
  qrc --host 10.0.0.5 -u admin config init    Save connection settings

Connection settings are read from ~/.config/qrc/config.json and can be
overridden with the flags below.
")]
struct Cli {
    /// Config file (default: ~/.config/qrc/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Core hostname or IP address
    #[arg(long, global = true, env = "QRC_HOST")]
    host: Option<String>,

    /// Control protocol port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Logon username
    #[arg(long, short = 'u', global = true, env = "QRC_USER")]
    user: Option<String>,

    /// Logon password
    #[arg(long, global = true, env = "QRC_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Component to address (default: connection.defaultComponent)
    #[arg(long, short = 'c', global = true)]
    component: Option<String>,

    /// Write the result to this file instead of stdout
    #[arg(long, short = 'o', global = true)]
    output: Option<PathBuf>,

    /// Log every frame received from the Core
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the configured credentials are accepted
    Logon,

    /// Show platform and engine status
    Status,

    /// Read controls on the component
    Get {
        /// Control names
        #[arg(required = true)]
        controls: Vec<String>,
    },

    /// Set a control on the component
    Set {
        control: String,

        /// New value; parsed as JSON if possible, otherwise sent as a string
        #[arg(allow_hyphen_values = true)]
        value: String,

        /// Ramp time in seconds
        #[arg(long)]
        ramp: Option<f64>,
    },

    /// List every control on the component
    Controls,

    /// List all components on the Core
    Components,

    /// Replace the component's script code with a file's contents
    PushCode { file: PathBuf },

    /// Scan scripts and plugins for errors and faulted status controls
    Scan {
        /// Only scan the component with this name
        #[arg(long)]
        filter: Option<String>,
    },

    /// Reload the component
    Restart,

    /// Scan, restart affected components and report what persists
    Remediate {
        /// System label for audit events
        #[arg(long)]
        system: String,

        /// Site label for audit events
        #[arg(long)]
        site: String,

        /// Host label for audit events
        #[arg(long)]
        host_label: String,
    },

    /// Config file management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write the effective settings, flags included, to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show which config file is used
    Path,
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose || cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("qrc={default_level}")));

    if cfg!(debug_assertions) {
        let temp_dir = std::env::temp_dir();
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_filename = format!("qrc-{timestamp}.log");
        let log_path = temp_dir.join(&log_filename);

        #[cfg(unix)]
        {
            let symlink_path = temp_dir.join("qrc.log");
            let _ = std::fs::remove_file(&symlink_path);
            let _ = std::os::unix::fs::symlink(&log_path, &symlink_path);
        }

        let file_appender = tracing_appender::rolling::never(&temp_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        std::mem::forget(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true);

        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer)
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(verbose))
            .with(filter)
            .init();
    }
}

/// `--config` if given, else the per-user default.
fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(Directories::new()
            .context("Failed to determine config directory")?
            .config_file),
    }
}

/// File settings with command-line overrides applied.
fn load_config(cli: &Cli) -> Result<Config> {
    let path = config_path(cli.config.as_deref())?;

    let mut config = Config::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    apply_overrides(&mut config, cli);
    Ok(config)
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    let connection = &mut config.connection;
    if let Some(host) = &cli.host {
        connection.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        connection.port = port;
    }
    if let Some(user) = &cli.user {
        connection.username = Some(user.clone());
    }
    if let Some(password) = &cli.password {
        connection.password = Some(password.clone());
    }
    if let Some(component) = &cli.component {
        connection.default_component = Some(component.clone());
    }
    connection.verbose |= cli.verbose;
}

/// JSON if it parses, otherwise the raw string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn write_output(output: Option<&Path>, value: &impl serde::Serialize) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{content}"),
    }
    Ok(())
}

/// Save `config` to `path`, creating its directory. Refuses to replace an
/// existing file unless `force` is set.
fn init_config(path: &Path, config: &Config, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, pass --force to overwrite", path.display());
    }

    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    Directories::with_base(dir)
        .ensure_exists()
        .context("Failed to create config directory")?;
    config
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {}", path.display());
    Ok(())
}

fn connect(config: &Config) -> Result<RpcClient> {
    let connection = config
        .connection_config()
        .context("Set --host or connection.host in the config file")?;
    info!(address = %connection.address(), user = ?connection.username(), "Using Core");
    RpcClient::new(connection).context("Invalid connection settings")
}

fn component(client: &RpcClient) -> Result<String> {
    Ok(client
        .resolve_component(None)
        .context("Pass --component or set connection.defaultComponent")?
        .to_string())
}

async fn run(cli: Cli, config: Config) -> Result<ExitCode> {
    let output = cli.output.as_deref();

    match cli.command {
        Commands::Config { command } => {
            let path = config_path(cli.config.as_deref())?;
            if let ConfigCommand::Init { force } = command {
                init_config(&path, &config, force)?;
            }
            write_output(output, &json!({ "path": path }))?;
        }
        Commands::Logon => {
            let client = connect(&config)?;
            let authenticated = client.logon().await.context("Logon failed")?;
            write_output(output, &json!({ "authenticated": authenticated }))?;
        }
        Commands::Status => {
            let client = connect(&config)?;
            let status = client.status_get().await.context("StatusGet failed")?;
            write_output(output, &status)?;
        }
        Commands::Get { controls } => {
            let client = connect(&config)?;
            let name = component(&client)?;
            let result = client
                .component_get(&name, &controls)
                .await
                .with_context(|| format!("Failed to read controls on '{name}'"))?;
            write_output(output, &result)?;
        }
        Commands::Set {
            control,
            value,
            ramp,
        } => {
            let client = connect(&config)?;
            let name = component(&client)?;
            let result = client
                .update(&name, &control, parse_value(&value), ramp)
                .await
                .with_context(|| format!("Failed to set '{control}' on '{name}'"))?;
            write_output(output, &result)?;
        }
        Commands::Controls => {
            let client = connect(&config)?;
            let name = component(&client)?;
            let result = client
                .get_controls(&name)
                .await
                .with_context(|| format!("Failed to list controls on '{name}'"))?;
            write_output(output, &result)?;
        }
        Commands::Components => {
            let components = connect(&config)?
                .get_components()
                .await
                .context("Failed to list components")?;
            write_output(output, &components)?;
        }
        Commands::PushCode { file } => {
            let client = connect(&config)?;
            let name = component(&client)?;
            let code = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let result = client
                .push_code(&name, &code)
                .await
                .with_context(|| format!("Failed to push code to '{name}'"))?;
            write_output(output, &result)?;
        }
        Commands::Scan { filter } => {
            let engine = engine(connect(&config)?, &config)?;
            let report = engine.scan(filter.as_deref()).await.context("Scan failed")?;
            write_output(output, &report)?;
            if !report.is_healthy() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Restart => {
            let client = connect(&config)?;
            let name = component(&client)?;
            let engine = engine(client, &config)?;
            let restarted = engine.restart(&name).await;
            write_output(output, &json!({ "component": name, "restarted": restarted }))?;
            if !restarted {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Remediate {
            system,
            site,
            host_label,
        } => {
            let engine = engine(connect(&config)?, &config)?;
            let report = engine
                .remediate(&SiteLabels::new(system, site, host_label))
                .await;
            write_output(output, &report)?;
            if report.has_persistent_issues() {
                warn!(
                    errors = report.persistent_errors.len(),
                    statuses = report.persistent_statuses.len(),
                    "Issues persist after remediation"
                );
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn engine(client: RpcClient, config: &Config) -> Result<DiagnosticsEngine<RpcClient>> {
    let policy = DiagnosticsPolicy::from_config(&config.diagnostics)
        .context("Invalid diagnostics settings")?;
    Ok(DiagnosticsEngine::with_policy(client, policy))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    setup_logging(config.connection.verbose);

    run(cli, config).await
}

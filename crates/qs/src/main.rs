mod flows;
mod terminal;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use flows::{rpc, Backend, Flows, ListMode, SocketBackend};
use quick_switch_core::{
    client, default_socket_path, Response, StatusDisplay, StatusParams, METHOD_PING,
    METHOD_RELOAD, METHOD_SHUTDOWN, METHOD_STATUS,
};
use serde_json::{json, Value};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;
use terminal::TerminalPrompter;

#[derive(Debug, Parser)]
#[command(name = "qs", version, about = "Quick project and workspace switcher")]
struct Cli {
    #[arg(long)]
    socket: Option<PathBuf>,
    /// Config file handed to an autostarted daemon.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(flatten)]
    autostart: AutostartArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Args)]
struct AutostartArgs {
    #[arg(long = "autostart", default_value_t = true, action = ArgAction::Set, global = true)]
    autostart: bool,
    #[arg(long = "no-autostart", global = true)]
    no_autostart: bool,
}

impl AutostartArgs {
    fn resolve(&self) -> bool {
        self.autostart && !self.no_autostart
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Add the current folder to the current workspace.
    AddProject {
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Folder to add instead of the working directory.
        #[arg(long, value_name = "PATH")]
        path: Option<PathBuf>,
    },
    /// Pick a project of the current workspace and print or open it.
    SwitchProject {
        /// Command to run with the picked path appended.
        #[arg(long, value_name = "CMD")]
        open: Option<String>,
    },
    /// Remove projects from the current workspace, or reorder them.
    ListProjects {
        #[arg(long, default_value_t = false)]
        reorder: bool,
    },
    AddWorkspace {
        name: Option<String>,
    },
    SwitchWorkspace,
    /// Pick a workspace to remove.
    ListWorkspaces,
    /// Change the status template.
    SetStatusFormat {
        format: Option<String>,
    },
    /// Re-read the config file now.
    Reload,
    /// Print the status bar text.
    Status {
        /// Project to render the status for instead of the working directory.
        #[arg(long, value_name = "PATH")]
        path: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        json: bool,
        #[arg(long, default_value_t = false)]
        watch: bool,
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
    /// Ping daemon health.
    Ping,
    /// Manage daemon lifecycle.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

#[derive(Debug, Subcommand)]
enum DaemonCommand {
    Start,
    Stop,
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let socket_path = cli
        .socket
        .or_else(|| std::env::var_os("QUICK_SWITCH_SOCKET").map(PathBuf::from))
        .unwrap_or_else(default_socket_path);
    let daemon_args = daemon_args(cli.config.as_deref());
    let mut backend = SocketBackend::new(&socket_path, cli.autostart.resolve(), daemon_args.clone());

    match cli.command {
        Commands::AddProject { force, path } => {
            let open_project = resolve_open_project(path)?;
            let picked = with_flows(&mut backend, open_project, |flows| flows.add_project(force))?;
            if let Some(project) = picked {
                open_project_path(&project, None)?;
            }
            Ok(())
        }
        Commands::SwitchProject { open } => {
            let picked = with_flows(&mut backend, current_folder(), |flows| flows.switch_project())?;
            if let Some(project) = picked {
                open_project_path(&project, open.as_deref())?;
            }
            Ok(())
        }
        Commands::ListProjects { reorder } => {
            let mode = if reorder {
                ListMode::Reorder
            } else {
                ListMode::Remove
            };
            let picked = with_flows(&mut backend, current_folder(), |flows| flows.list_projects(mode))?;
            if let Some(project) = picked {
                open_project_path(&project, None)?;
            }
            Ok(())
        }
        Commands::AddWorkspace { name } => {
            with_flows(&mut backend, None, |flows| flows.add_workspace(name))
        }
        Commands::SwitchWorkspace => with_flows(&mut backend, None, |flows| flows.switch_workspace()),
        Commands::ListWorkspaces => with_flows(&mut backend, None, |flows| flows.list_workspaces()),
        Commands::SetStatusFormat { format } => {
            with_flows(&mut backend, None, |flows| flows.set_status_format(format))
        }
        Commands::Reload => {
            let display: StatusDisplay = rpc(&mut backend, METHOD_RELOAD, &Value::Null)?;
            println!("{}", format_status_line(&display));
            Ok(())
        }
        Commands::Status {
            path,
            json,
            watch,
            interval_ms,
        } => {
            let project = resolve_open_project(path)?;
            cmd_status(&mut backend, project, json, watch, interval_ms)
        }
        Commands::Ping => cmd_ping(&mut backend),
        Commands::Daemon { command } => match command {
            DaemonCommand::Start => cmd_start(&socket_path, &daemon_args),
            DaemonCommand::Stop => cmd_stop(&socket_path),
            DaemonCommand::Status => cmd_daemon_status(&socket_path),
        },
    }
}

fn with_flows<T>(
    backend: &mut dyn Backend,
    open_project: Option<String>,
    run: impl FnOnce(&mut Flows<'_>) -> Result<T>,
) -> Result<T> {
    let stdin = io::stdin();
    let mut prompter = TerminalPrompter::new(stdin.lock(), io::stderr());
    let mut flows = Flows::new(backend, &mut prompter, open_project);
    run(&mut flows)
}

fn daemon_args(config: Option<&Path>) -> Vec<String> {
    match config {
        Some(config) => vec!["--config".to_string(), config.to_string_lossy().to_string()],
        None => Vec::new(),
    }
}

/// The folder the user is working in, if it can be determined.
fn current_folder() -> Option<String> {
    let cwd = std::env::current_dir().ok()?;
    let cwd = fs::canonicalize(&cwd).unwrap_or(cwd);
    Some(cwd.to_string_lossy().to_string())
}

fn resolve_open_project(path: Option<PathBuf>) -> Result<Option<String>> {
    match path {
        Some(path) => {
            let canonical = canonicalize_existing_dir(&path)?;
            Ok(Some(canonical.to_string_lossy().to_string()))
        }
        None => Ok(current_folder()),
    }
}

fn canonicalize_existing_dir(path: &Path) -> Result<PathBuf> {
    let canonical = fs::canonicalize(path)
        .with_context(|| format!("failed to resolve path {}", path.display()))?;
    if !canonical.is_dir() {
        bail!("not a directory: {}", canonical.display());
    }
    Ok(canonical)
}

/// Prints the project path, or runs `open` with the path appended.
fn open_project_path(project: &str, open: Option<&str>) -> Result<()> {
    let Some((program, args)) = open.and_then(split_command) else {
        println!("{project}");
        return Ok(());
    };

    let status = Command::new(program)
        .args(args)
        .arg(project)
        .status()
        .with_context(|| format!("failed to run {program}"))?;
    if !status.success() {
        bail!("{program} exited with {status}");
    }
    Ok(())
}

fn split_command(raw: &str) -> Option<(&str, Vec<&str>)> {
    let mut parts = raw.split_whitespace();
    let program = parts.next()?;
    Some((program, parts.collect()))
}

fn cmd_status(
    backend: &mut dyn Backend,
    project: Option<String>,
    json_output: bool,
    watch: bool,
    interval_ms: u64,
) -> Result<()> {
    let params = StatusParams { project };
    if !watch {
        let display: StatusDisplay = rpc(backend, METHOD_STATUS, &params)?;
        println!("{}", format_status_output(&display, json_output)?);
        return Ok(());
    }

    let interval = Duration::from_millis(interval_ms.max(200));
    loop {
        let display: StatusDisplay = rpc(backend, METHOD_STATUS, &params)?;
        println!("{}", format_status_output(&display, json_output)?);
        io::stdout()
            .flush()
            .context("failed to flush status watch output")?;
        thread::sleep(interval);
    }
}

fn format_status_output(display: &StatusDisplay, json_output: bool) -> Result<String> {
    if json_output {
        return serde_json::to_string(display).context("failed to serialize status JSON");
    }
    Ok(format_status_line(display))
}

fn format_status_line(display: &StatusDisplay) -> String {
    display.text.clone()
}

fn cmd_ping(backend: &mut dyn Backend) -> Result<()> {
    let response = backend.call(METHOD_PING, Value::Null)?;
    print_ping(response)
}

fn cmd_start(socket_path: &Path, daemon_args: &[String]) -> Result<()> {
    client::start_daemon(socket_path, daemon_args)?;
    let _ = client::wait_for_ping(socket_path, Duration::from_secs(3))?;
    println!("quick-switchd started ({})", socket_path.display());
    Ok(())
}

fn cmd_stop(socket_path: &Path) -> Result<()> {
    let response = client::request(socket_path, METHOD_SHUTDOWN, Value::Null)
        .with_context(|| format!("failed to stop daemon at {}", socket_path.display()))?;
    if !response.ok {
        bail!(
            "daemon returned error: {}",
            response.error.unwrap_or_else(|| "unknown".to_string())
        );
    }
    println!("quick-switchd stopping");
    Ok(())
}

fn cmd_daemon_status(socket_path: &Path) -> Result<()> {
    match client::request(socket_path, METHOD_PING, Value::Null) {
        Ok(_) => println!("running ({})", socket_path.display()),
        Err(_) => println!("stopped ({})", socket_path.display()),
    }
    Ok(())
}

fn print_ping(response: Response) -> Result<()> {
    if !response.ok {
        bail!(
            "daemon returned error: {}",
            response.error.unwrap_or_else(|| "unknown".to_string())
        );
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&response.result.unwrap_or_else(|| json!({})))
            .context("failed to format ping response")?
    );
    Ok(())
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use crate::core::auth::LaunchIdentity;
use crate::core::downloader::Downloader;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::build_http_client;
use crate::core::java::{DownloadProgress, RuntimeLocator, RuntimePaths, RuntimeProvisioner};
use crate::core::launch::{
    LaunchEvent, LaunchOptions, LaunchOrchestrator, LaunchServices, LoaderKind, LogLevel,
    MemoryBounds, ProcessBackend, ServerAddress, WindowSize,
};

/// How long a cancelled attempt gets to wind down before the CLI returns.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "blocklaunch", version, about = "Loader-aware game launcher")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Prepare a version (and its mod loader) and start the game.
    Launch(LaunchArgs),
    /// Inspect or install Java runtimes.
    #[command(subcommand)]
    Java(JavaCommand),
}

#[derive(Debug, Args)]
pub struct LaunchArgs {
    /// Base game version, e.g. 1.20.1
    pub version: String,
    #[arg(long, default_value = "vanilla")]
    pub loader: LoaderKind,
    #[arg(long)]
    pub loader_version: Option<String>,
    /// Game root; defaults to the platform's .minecraft directory
    #[arg(long)]
    pub root: Option<PathBuf>,
    #[arg(long, short = 'u', default_value = "Player")]
    pub username: String,
    #[arg(long, default_value_t = 1024)]
    pub min_memory: u32,
    #[arg(long, default_value_t = 4096)]
    pub max_memory: u32,
    /// Java executable; auto-detected when omitted
    #[arg(long)]
    pub java: Option<PathBuf>,
    #[arg(long = "jvm-arg", allow_hyphen_values = true)]
    pub jvm_args: Vec<String>,
    #[arg(long = "game-arg", allow_hyphen_values = true)]
    pub game_args: Vec<String>,
    /// Join a server on start: host[:port]
    #[arg(long, value_parser = parse_server)]
    pub server: Option<ServerAddress>,
    /// Window size: WIDTHxHEIGHT
    #[arg(long, value_parser = parse_window)]
    pub window: Option<WindowSize>,
    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl LaunchArgs {
    fn into_options(self) -> LaunchOptions {
        LaunchOptions {
            version: self.version,
            loader: self.loader,
            loader_version: self.loader_version,
            root: self.root,
            identity: LaunchIdentity::offline(&self.username),
            memory: MemoryBounds {
                min_mb: self.min_memory,
                max_mb: self.max_memory,
            },
            java_path: self.java,
            jvm_args: self.jvm_args,
            game_args: self.game_args,
            server: self.server,
            window: self.window,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum JavaCommand {
    /// List every runtime found on this machine.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Print the runtime that would be used for a Java major.
    Find { major: u32 },
    /// Download a managed runtime for a Java major.
    Install { major: u32 },
}

fn parse_server(raw: &str) -> Result<ServerAddress, String> {
    let raw = raw.trim();
    match raw.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("invalid port in {raw:?}"))?;
            Ok(ServerAddress {
                host: host.to_string(),
                port,
            })
        }
        None => Ok(ServerAddress {
            host: raw.to_string(),
            port: 25565,
        }),
    }
}

fn parse_window(raw: &str) -> Result<WindowSize, String> {
    let (width, height) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {raw:?}"))?;
    let parse = |value: &str| {
        value
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid window dimension {value:?}"))
    };
    Ok(WindowSize {
        width: parse(width)?,
        height: parse(height)?,
    })
}

/// Run a parsed command. Returns the process exit code.
pub async fn dispatch(cli: Cli) -> LauncherResult<i32> {
    match cli.command {
        Command::Launch(args) => launch(args).await,
        Command::Java(JavaCommand::List { json }) => java_list(json),
        Command::Java(JavaCommand::Find { major }) => java_find(major),
        Command::Java(JavaCommand::Install { major }) => java_install(major).await,
    }
}

fn runtime_locator() -> LauncherResult<RuntimeLocator> {
    let paths = RuntimePaths::discover()?;
    Ok(RuntimeLocator::new(&paths))
}

async fn launch(args: LaunchArgs) -> LauncherResult<i32> {
    let json = args.json;
    let options = args.into_options();
    options.validate()?;

    let downloader = Downloader::new(build_http_client()?);
    let services = LaunchServices {
        downloader: downloader.clone(),
        locator: Arc::new(runtime_locator()?),
        backend: Arc::new(ProcessBackend::new(downloader)),
    };

    let (orchestrator, mut events) = LaunchOrchestrator::new(services);
    let task = orchestrator.launch(options);

    let mut exit_code = None;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(&event, json);
                if let LaunchEvent::Exit { code } = event {
                    exit_code = Some(code);
                    break;
                }
            }
            _ = tokio::signal::ctrl_c(), if !orchestrator.is_cancelled() => {
                info!("Interrupted; stopping the game");
                orchestrator.kill().await;
            }
        }
    }

    if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
        warn!("Launch task still running after exit; abandoning it");
    }
    Ok(exit_code.unwrap_or(1))
}

fn print_event(event: &LaunchEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!("Could not serialize event: {}", err),
        }
        return;
    }

    match event {
        LaunchEvent::Log { level, message } => {
            let tag = match level {
                LogLevel::Debug => "debug",
                LogLevel::Info => "info",
                LogLevel::Warn => "warn",
                LogLevel::Error => "error",
            };
            println!("[{tag}] {message}");
        }
        LaunchEvent::Progress {
            task,
            total,
            percent,
        } => println!("[{task}] {percent:.0}% of {total}"),
        LaunchEvent::ProcessStarted { pid: Some(pid) } => println!("Game started (pid {pid})"),
        LaunchEvent::ProcessStarted { pid: None } => println!("Game started"),
        LaunchEvent::Exit { code } => println!("Game exited with code {code}"),
        LaunchEvent::LaunchError { summary, advice } => {
            eprintln!("error: {summary}");
            eprintln!("  {advice}");
        }
    }
}

fn java_list(json: bool) -> LauncherResult<i32> {
    let runtimes = runtime_locator()?.scan_all();
    if json {
        println!("{}", serde_json::to_string_pretty(&runtimes)?);
        return Ok(0);
    }
    if runtimes.is_empty() {
        println!("No Java runtimes found");
    }
    for runtime in &runtimes {
        println!(
            "{:>3}  {:<8} {}",
            runtime.major,
            format!("{:?}", runtime.source).to_lowercase(),
            runtime.path.display()
        );
    }
    Ok(0)
}

fn java_find(major: u32) -> LauncherResult<i32> {
    let runtime = runtime_locator()?
        .find_compatible(major)
        .ok_or(LauncherError::JavaNotFound(major))?;
    println!("{}", runtime.path.display());
    Ok(0)
}

async fn java_install(major: u32) -> LauncherResult<i32> {
    let downloader = Downloader::new(build_http_client()?);
    let provisioner = RuntimeProvisioner::new(downloader, runtime_locator()?);

    let download = provisioner.download(major, |progress: DownloadProgress| {
        match progress.total {
            Some(total) => eprintln!(
                "Java {}: {:.1}% ({} / {} bytes)",
                progress.major, progress.percent, progress.downloaded, total
            ),
            None => eprintln!("Java {}: {} bytes", progress.major, progress.downloaded),
        }
    });
    tokio::pin!(download);

    let result = tokio::select! {
        result = &mut download => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted; cancelling runtime download");
            provisioner.cancel();
            download.await
        }
    };

    let java = result?;
    println!("{}", java.display());
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_flags_become_options() {
        let cli = Cli::try_parse_from([
            "blocklaunch",
            "launch",
            "1.20.1",
            "--loader",
            "fabric",
            "--loader-version",
            "0.15.7",
            "-u",
            "Steve",
            "--jvm-arg",
            "-XX:+UseG1GC",
            "--server",
            "play.example.org:25570",
            "--window",
            "1280x720",
        ])
        .unwrap();

        let Command::Launch(args) = cli.command else {
            panic!("expected launch");
        };
        let options = args.into_options();
        assert_eq!(options.loader, LoaderKind::Fabric);
        assert_eq!(options.loader_version.as_deref(), Some("0.15.7"));
        assert_eq!(options.identity.username, "Steve");
        assert_eq!(options.jvm_args, vec!["-XX:+UseG1GC".to_string()]);
        assert_eq!(
            options.server,
            Some(ServerAddress {
                host: "play.example.org".into(),
                port: 25570
            })
        );
        assert_eq!(
            options.window,
            Some(WindowSize {
                width: 1280,
                height: 720
            })
        );
        assert!(options.validate().is_ok());
    }

    #[test]
    fn unknown_loader_is_rejected() {
        assert!(Cli::try_parse_from(["blocklaunch", "launch", "1.20.1", "--loader", "rift"]).is_err());
    }

    #[test]
    fn server_without_port_uses_default() {
        assert_eq!(parse_server("localhost").unwrap().port, 25565);
        assert!(parse_server("localhost:notaport").is_err());
    }

    #[test]
    fn window_requires_two_numbers() {
        assert!(parse_window("800x600").is_ok());
        assert!(parse_window("800").is_err());
        assert!(parse_window("wide x 600").is_err());
    }

    #[test]
    fn java_subcommands_parse() {
        let cli = Cli::try_parse_from(["blocklaunch", "java", "install", "21"]).unwrap();
        assert!(matches!(cli.command, Command::Java(JavaCommand::Install { major: 21 })));
    }
}

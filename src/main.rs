use anyhow::Context;
use clap::{Parser, Subcommand};
use draekz_api::RestApi;
use draekz_core::{link_fixer, WorkflowGraph};
use draekz_storage::UserConfigFile;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Config server and workflow link fixer for the draekz extension
#[derive(Parser, Debug)]
#[command(name = "draekz")]
#[command(about = "Serves draekz config and repairs workflow links", long_about = None)]
struct Args {
    /// Directory holding draekz_config.json
    #[arg(short, long, default_value = "./config")]
    config_dir: PathBuf,

    /// HTTP API port
    #[arg(long, default_value_t = 8189)]
    http_port: u16,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Report link problems in a workflow file
    Check {
        workflow: PathBuf,
    },
    /// Repair link problems in a workflow file
    Fix {
        workflow: PathBuf,
        /// Where to write the repaired workflow; defaults to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn read_workflow(path: &PathBuf) -> anyhow::Result<WorkflowGraph> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow {}", path.display()))?;
    WorkflowGraph::from_json(&text)
        .with_context(|| format!("Failed to parse workflow {}", path.display()))
}

fn run_check(path: &PathBuf) -> anyhow::Result<bool> {
    let report = link_fixer::check(&read_workflow(path)?);
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.has_bad_links {
        warn!("{} link problem(s) found in {}", report.details.len(), path.display());
    } else {
        info!("No link problems found in {}", path.display());
    }
    Ok(!report.has_bad_links)
}

fn run_fix(path: &PathBuf, output: Option<&PathBuf>) -> anyhow::Result<bool> {
    let result = link_fixer::fix(&read_workflow(path)?);
    info!(
        "Patched {} and deleted {} link entries in {}",
        result.patched,
        result.deleted,
        path.display()
    );
    let json = serde_json::to_string_pretty(&result.graph)?;
    match output {
        Some(output) => std::fs::write(output, json)
            .with_context(|| format!("Failed to write {}", output.display()))?,
        None => println!("{}", json),
    }
    if result.has_bad_links {
        warn!("{} link problem(s) could not be fixed", result.remaining.len());
    }
    Ok(!result.has_bad_links)
}

async fn serve(args: &Args) -> anyhow::Result<()> {
    info!("Starting draekz v{}", env!("CARGO_PKG_VERSION"));
    info!("Config directory: {:?}", args.config_dir);

    let config = Arc::new(UserConfigFile::open(&args.config_dir)?);
    info!("User config loaded from {:?}", config.path());

    let http_port = args.http_port;
    let http_handle = std::thread::spawn(move || {
        info!("Starting HTTP server on port {}", http_port);
        let sys = actix_web::rt::System::new();
        sys.block_on(async {
            if let Err(e) = RestApi::start(config, http_port).await {
                eprintln!("HTTP server error: {}", e);
            }
        })
    });

    info!("draekz started successfully");
    info!("HTTP API: http://localhost:{}/draekz/api/config", args.http_port);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        _ = tokio::task::spawn_blocking(move || {
            http_handle.join().ok();
        }) => {
            info!("HTTP server stopped");
        }
    }

    info!("Shutting down...");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let clean = match &args.command {
        None | Some(Command::Serve) => {
            serve(&args).await?;
            true
        }
        Some(Command::Check { workflow }) => run_check(workflow)?,
        Some(Command::Fix { workflow, output }) => run_fix(workflow, output.as_ref())?,
    };

    if !clean {
        std::process::exit(1);
    }
    Ok(())
}

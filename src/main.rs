mod api;
mod cli;
mod codec;
mod config;
mod console;
mod error;
mod models;
mod session;
mod token_store;
mod transcript;
mod view;

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "adminctl", about = "Admin console for the song request backend")]
pub struct Args {
    #[arg(
        short = 'c',
        long = "command",
        value_name = "LINE",
        action = clap::ArgAction::Append,
        help = "Run a console command and exit (repeatable, e.g. -c '/search zhang')"
    )]
    pub commands: Vec<String>,

    #[arg(
        long,
        env = "ADMIN_PANEL_TOKEN",
        hide_env_values = true,
        help = "Admin panel token; starts the session logged in"
    )]
    pub token: Option<String>,

    #[arg(long, env = "ADMIN_API_BASE_URL", help = "Backend base URL")]
    pub base_url: Option<String>,

    #[arg(long, help = "Header that carries the admin token")]
    pub token_header: Option<String>,

    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Audit log directory")]
    pub audit_dir: Option<PathBuf>,

    #[arg(long, help = "Disable the audit log")]
    pub no_audit: bool,

    #[arg(long, help = "Verbose output (log requests)")]
    pub verbose: bool,

    #[arg(long, help = "Debug output (log request details and settings)")]
    pub debug: bool,
}

fn init_logging(args: &Args) {
    let default_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(&args);

    let mut cfg = if let Some(config_path) = &args.config {
        config::Config::load_from(config_path)?
    } else {
        config::Config::load()?
    };

    // CLI flags win over every config layer
    if let Some(base_url) = &args.base_url {
        cfg.server.base_url = Some(base_url.clone());
    }
    if let Some(header) = &args.token_header {
        cfg.server.token_header = Some(header.clone());
    }
    if let Some(dir) = &args.audit_dir {
        cfg.audit.dir = Some(dir.clone());
    }
    if args.no_audit {
        cfg.audit.enabled = Some(false);
    }

    if let Err(errors) = cfg.validate() {
        for e in &errors {
            eprintln!("Config error {}", e);
        }
        return Err(anyhow!("invalid configuration ({} errors)", errors.len()));
    }
    debug!(?cfg, "configuration loaded");

    let tokens = token_store::TokenStore::new(
        args.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from),
    );
    let session = Arc::new(session::SessionController::new(tokens));

    let transport = api::HttpTransport::new(
        cfg.server.base_url(),
        cfg.server.api_prefix(),
        cfg.server.token_header(),
        cfg.server.timeout_ms,
    );
    info!(endpoint = transport.endpoint(), "admin API");

    let client = api::ResourceClient::new(
        transport,
        session,
        api::ClientOptions {
            max_keyword_chars: cfg.search.max_keyword_chars(),
            discard_stale: cfg.search.discard_stale(),
        },
    );
    let mut console = console::Console::new(client, view::TerminalPresenter::new(std::io::stdout()));

    if cfg.audit.enabled() {
        let session_id = uuid::Uuid::new_v4().to_string();
        let path = cfg.audit.dir().join(format!("{}.jsonl", session_id));
        match transcript::Transcript::new(&path, &session_id) {
            Ok(t) => {
                info!(path = %t.path.display(), "audit log");
                console = console.with_audit(t);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "audit log disabled"),
        }
    }

    if args.commands.is_empty() {
        cli::run_repl(&mut console)
    } else {
        cli::run_once(&mut console, &args.commands)
    }
}

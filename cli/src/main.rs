mod routes;
mod views;

use clap::Parser;
use colored::*;
use std::io::Write;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use fyzzdash_core::{DashboardConfig, LogSink, MySqlReportStore, ScanBridge};

use crate::routes::AppState;

#[derive(Parser, Debug, Default)]
#[command(
    name = "fyzzdash",
    version,
    about = "Web dashboard for PyFyzz fuzzing reports",
    after_help = "\x1b[1;36mEXAMPLES:\x1b[0m
  Local database:                 fyzzdash --db-user fuzz --db-password secret
  Connection URL:                 fyzzdash --database-url mysql://fuzz:secret@db/pyfyzz
  Config file + port override:    fyzzdash -c dashboard.json --port 8080
  Custom tool, two scans at once: fyzzdash --tool ./tools/pyfyzz --max-scans 2
  Check configuration:            fyzzdash --dry-run"
)]
pub struct Args {
    #[arg(short = 'c', long, help = "JSON config file; flags and env vars override it")]
    pub config: Option<String>,

    #[arg(long, help = "Listen address (e.g. 0.0.0.0:3000)")]
    pub listen: Option<String>,

    #[arg(long, env = "PORT", help = "Listen port; keeps the configured host")]
    pub port: Option<u16>,

    #[arg(long, env = "DATABASE_URL", hide_env_values = true, help = "Full MySQL connection URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "DB_HOST")]
    pub db_host: Option<String>,

    #[arg(long, env = "DB_PORT")]
    pub db_port: Option<u16>,

    #[arg(long, env = "DB_USER")]
    pub db_user: Option<String>,

    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    #[arg(long, env = "DB_NAME")]
    pub db_name: Option<String>,

    #[arg(long, help = "Maximum pooled database connections")]
    pub db_pool_size: Option<u32>,

    #[arg(long, env = "FYZZDASH_TOOL", help = "Name or path of the fuzzer executable")]
    pub tool: Option<String>,

    #[arg(long, env = "FYZZDASH_SCAN_TIMEOUT", help = "Seconds before a scan is killed")]
    pub scan_timeout: Option<u64>,

    #[arg(long, env = "FYZZDASH_MAX_SCANS", help = "Scans allowed to run at once")]
    pub max_scans: Option<usize>,

    #[arg(short = 'v', long, default_value_t = false, help = "Debug logging")]
    pub verbose: bool,

    #[arg(long, help = "Print the resolved configuration and exit")]
    pub dry_run: bool,
}

/// Layers flags and environment over the config file (or the defaults).
fn resolve_config(args: &Args) -> anyhow::Result<DashboardConfig> {
    let mut config = match &args.config {
        Some(path) => DashboardConfig::load(path)?,
        None => DashboardConfig::default(),
    };

    if let Some(listen) = &args.listen {
        config.listen = listen.clone();
    }
    if let Some(port) = args.port {
        let host = config
            .listen
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listen = format!("{}:{}", host, port);
    }

    let db = &mut config.database;
    if let Some(url) = &args.database_url {
        db.url = Some(url.clone());
    }
    if let Some(host) = &args.db_host {
        db.host = host.clone();
    }
    if let Some(port) = args.db_port {
        db.port = port;
    }
    if let Some(user) = &args.db_user {
        db.user = user.clone();
    }
    if let Some(password) = &args.db_password {
        db.password = password.clone();
    }
    if let Some(name) = &args.db_name {
        db.database = name.clone();
    }
    if let Some(size) = args.db_pool_size {
        db.max_connections = size;
    }

    let scan = &mut config.scan;
    if let Some(tool) = &args.tool {
        scan.tool = tool.clone();
    }
    if let Some(secs) = args.scan_timeout {
        scan.timeout_secs = secs;
    }
    if let Some(max) = args.max_scans {
        scan.max_concurrent = max;
    }

    config.verbose |= args.verbose;
    Ok(config)
}

#[tokio::main]
async fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let args = Args::parse();

    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprint!("{}\r\n", format!("[!] {:#}", e).red());
            process::exit(1);
        }
    };

    let default_level = if config.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if args.dry_run {
        print_config(&config);
        println!("[DRY RUN] Would serve on {}", config.listen);
        return;
    }

    print_banner();
    print_config(&config);

    if let Err(e) = serve(config).await {
        eprint!("{}\r\n", format!("[!] {:#}", e).red());
        process::exit(1);
    }
}

/// Prints the fyzzdash ASCII banner.
fn print_banner() {
    let banner = r#"
    ___                 _           _
   / __)               | |         | |
  | |__ _   _ _____ _____| | ____ ___| |__
  |  __) | | (___  |___  ) |/ _  |/___)  _ \
  | |  | |_| |/ __/ / __/| ( ( | |___ | | | |
  |_|   \__  (_____|_____)_|\_||_(___/|_| |_|
       (____/
    "#;
    print!("{}\r\n", banner.bright_cyan().bold());
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}

/// Prints the resolved configuration with secrets masked.
fn print_config(config: &DashboardConfig) {
    let db = &config.database;
    let database = match &db.url {
        Some(url) => mask_url(url),
        None => format!(
            "{}@{}:{}/{}{}",
            db.user,
            db.host,
            db.port,
            db.database,
            if db.password.is_empty() { "" } else { " (password set)" }
        ),
    };

    print!("{}\r\n", format!("[+] Listen:     {}", config.listen).green().bold());
    print!("{}\r\n", format!("[+] Database:   {}", database).blue());
    print!("{}\r\n", format!("[+] Pool size:  {}", db.max_connections).blue());
    print!("{}\r\n", format!("[+] Tool:       {}", config.scan.tool).magenta().bold());
    print!("{}\r\n", format!("[+] Scan limit: {} at once, {}s timeout", config.scan.max_concurrent, config.scan.timeout_secs).magenta());
    print!("{}\r\n", format!("[+] Verbose:    {}", if config.verbose { "ON" } else { "OFF" }).yellow());
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}

/// Replaces the password of a connection URL with `***`.
fn mask_url(raw: &str) -> String {
    let Ok(mut url) = url::Url::parse(raw) else {
        return raw.to_string();
    };
    if url.password().is_some() && url.set_password(Some("***")).is_err() {
        return "(connection URL hidden)".to_string();
    }
    url.to_string()
}

async fn serve(config: DashboardConfig) -> anyhow::Result<()> {
    let store = MySqlReportStore::connect(&config.database)
        .await
        .context("failed to connect to the database")?;
    let scans = ScanBridge::new(&config.scan, LogSink::new_ref());
    log::info!("Scan tool resolved to {}", scans.program().display());

    let state = AppState { reports: Arc::new(store.clone()), scans: Arc::new(scans) };
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    log::info!("Listening on http://{}", config.listen);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error");

    store.close().await;
    served
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        log::warn!("Ctrl-C handler unavailable; shutting down");
    }
    log::info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_keeps_configured_host() {
        let args = Args { listen: Some("127.0.0.1:3000".into()), port: Some(8080), ..Default::default() };
        assert_eq!(resolve_config(&args).unwrap().listen, "127.0.0.1:8080");
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = Args {
            db_host: Some("db".into()),
            db_pool_size: Some(3),
            max_scans: Some(1),
            verbose: true,
            ..Default::default()
        };
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.database.host, "db");
        assert_eq!(config.database.max_connections, 3);
        assert_eq!(config.database.database, "pyfyzz");
        assert_eq!(config.scan.max_concurrent, 1);
        assert!(config.verbose);
    }

    #[test]
    fn test_mask_url_hides_password() {
        assert_eq!(mask_url("mysql://fuzz:s3cr@t@db:3306/pyfyzz"), "mysql://fuzz:***@db:3306/pyfyzz");
        assert_eq!(mask_url("mysql://db/pyfyzz"), "mysql://db/pyfyzz");
        assert_eq!(mask_url("mysql://fuzz@db/pyfyzz"), "mysql://fuzz@db/pyfyzz");
    }
}

//! kemono: browse and search a Kemono Discord server catalog from the terminal.
//!
//! Thin driver over `kemono-core`: every subcommand builds a `ServerScreen`
//! over a JSON catalog and feeds it input the way the UI would.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use kemono_core::catalog::load_servers;
use kemono_core::config::LogFormat;
use kemono_core::error::{CatalogError, ConfigError, Remediation, SearchError};
use kemono_core::logging::{LogConfig, init_logging};
use kemono_core::{
    BackingList, Config, DiscordServer, LocalSearch, PagingMode, ScreenSettings, SearchOutcome,
    ServerScreen,
};

type Screen = ServerScreen<DiscordServer, LocalSearch<DiscordServer>>;

#[derive(Parser, Debug)]
#[command(name = "kemono", version)]
#[command(about = "Browse and search a Kemono Discord server catalog", long_about = None)]
struct Cli {
    /// Config file (defaults to <config_dir>/kemono/kemono.toml)
    #[arg(long, global = true, env = "KEMONO_CONFIG")]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format override (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Walk the catalog in infinite-scroll mode
    Browse {
        /// JSON array of {"id", "name"} objects
        #[arg(long)]
        catalog: PathBuf,
        /// Scroll-to-end reveal steps to perform
        #[arg(long, default_value_t = 0)]
        steps: usize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },
    /// Submit a query and print one page of results
    Search {
        #[arg(long)]
        catalog: PathBuf,
        /// 1-based result page, clamped to the last page
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
        query: String,
    },
    /// Treat each stdin line as a keystroke-level text change
    Watch {
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Print built-in defaults instead
        #[arg(long)]
        default: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

// =============================================================================
// Reports
// =============================================================================

#[derive(Debug, Serialize)]
struct BrowseReport {
    mode: PagingMode,
    backing_len: usize,
    visible_count: usize,
    reveals: u64,
    servers: Vec<DiscordServer>,
}

#[derive(Debug, Serialize)]
struct SearchReport {
    query: String,
    /// 1-based
    page: usize,
    total_pages: usize,
    total_results: usize,
    servers: Vec<DiscordServer>,
}

#[derive(Debug, Serialize)]
struct WatchRecord {
    event: &'static str,
    query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    total: usize,
    servers: Vec<DiscordServer>,
}

fn print_servers(out: &mut impl Write, servers: &[DiscordServer]) -> std::io::Result<()> {
    for server in servers {
        writeln!(out, "  {}\t{}", server.id, server.name)?;
    }
    Ok(())
}

fn print_json(out: &mut impl Write, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

// =============================================================================
// Commands
// =============================================================================

fn open_screen(config: &Config, catalog: &Path, mode: PagingMode) -> Result<Screen> {
    let servers = load_servers(catalog)
        .with_context(|| format!("loading catalog {}", catalog.display()))?;
    let mut settings = ScreenSettings::from(config);
    settings.pager.mode = mode;
    let browse = BackingList::from_items(servers.clone()).snapshot();
    Ok(ServerScreen::new(settings, browse, LocalSearch::new(servers))?)
}

async fn browse(config: &Config, catalog: &Path, steps: usize, format: OutputFormat) -> Result<()> {
    let screen = open_screen(config, catalog, PagingMode::InfiniteScroll)?;
    for step in 0..steps {
        if !screen.on_scroll(f64::MAX, f64::MAX) {
            tracing::debug!(step, "Nothing left to reveal");
            break;
        }
        screen.wait_until_settled().await;
    }

    let page = screen.page();
    let report = BrowseReport {
        mode: page.mode,
        backing_len: page.backing_len,
        visible_count: page.visible_count(),
        reveals: page.reveals,
        servers: screen.visible(),
    };
    screen.teardown();

    let mut out = std::io::stdout().lock();
    match format {
        OutputFormat::Json => print_json(&mut out, &report)?,
        OutputFormat::Plain => {
            writeln!(out, "Showing {} of {} servers", report.visible_count, report.backing_len)?;
            print_servers(&mut out, &report.servers)?;
        }
    }
    Ok(())
}

async fn search(
    config: &Config,
    catalog: &Path,
    query: &str,
    page: usize,
    format: OutputFormat,
) -> Result<()> {
    let screen = open_screen(config, catalog, PagingMode::Windowed)?;
    screen.on_submit(query);
    match screen.wait_for_outcome().await {
        SearchOutcome::Failed { error, .. } => {
            return Err(kemono_core::Error::from(error)).context(format!("searching for {query:?}"));
        }
        SearchOutcome::Idle => {
            anyhow::bail!(
                "search query is blank, nothing was searched (use `kemono browse` to list the catalog)"
            );
        }
        SearchOutcome::Loading { .. } | SearchOutcome::Ready { .. } => {}
    }
    screen.go_to_page(page.saturating_sub(1));

    let snapshot = screen.page();
    let report = SearchReport {
        query: query.trim().to_string(),
        page: snapshot.current_page + 1,
        total_pages: snapshot.total_pages,
        total_results: snapshot.backing_len,
        servers: screen.visible(),
    };
    screen.teardown();

    let mut out = std::io::stdout().lock();
    match format {
        OutputFormat::Json => print_json(&mut out, &report)?,
        OutputFormat::Plain => {
            if report.total_results == 0 {
                writeln!(out, "No servers match {:?}", report.query)?;
            } else {
                writeln!(
                    out,
                    "{} result(s) for {:?}, page {} of {}",
                    report.total_results,
                    report.query,
                    report.page,
                    report.total_pages.max(1)
                )?;
                print_servers(&mut out, &report.servers)?;
            }
        }
    }
    Ok(())
}

fn watch_record(screen: &Screen, outcome: &SearchOutcome<DiscordServer>) -> Option<WatchRecord> {
    let page = screen.page();
    let (event, error) = match outcome {
        SearchOutcome::Loading { .. } => return None,
        SearchOutcome::Idle => ("cleared", None),
        SearchOutcome::Ready { .. } => ("commit", None),
        SearchOutcome::Failed { error, .. } => ("failed", Some(error.message().to_string())),
    };
    Some(WatchRecord {
        event,
        query: outcome.query().map(str::to_string),
        error,
        total: page.backing_len,
        servers: screen.visible(),
    })
}

fn emit_watch_record(record: &WatchRecord, format: OutputFormat) -> Result<()> {
    let mut out = std::io::stdout().lock();
    match format {
        OutputFormat::Json => print_json(&mut out, record)?,
        OutputFormat::Plain => {
            match (&record.query, &record.error) {
                (Some(query), Some(error)) => writeln!(out, "failed {query:?}: {error}")?,
                (Some(query), None) => writeln!(out, "commit {query:?}: {} result(s)", record.total)?,
                (None, _) => writeln!(out, "cleared: {} server(s)", record.total)?,
            }
            print_servers(&mut out, &record.servers)?;
        }
    }
    out.flush()?;
    Ok(())
}

async fn watch(config: &Config, catalog: &Path, format: OutputFormat) -> Result<()> {
    let screen = open_screen(config, catalog, config.paging.mode)?;
    let mut outcomes = screen.watch_outcome();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(text) => screen.on_text_changed(text),
                None => break,
            },
            changed = outcomes.changed() => {
                if changed.is_err() {
                    break;
                }
                let outcome = outcomes.borrow_and_update().clone();
                if let Some(record) = watch_record(&screen, &outcome) {
                    emit_watch_record(&record, format)?;
                }
            }
        }
    }

    // Input closed: let the last pending commit land.
    screen.wait_for_outcome().await;
    if outcomes.has_changed().unwrap_or(false) {
        let outcome = outcomes.borrow_and_update().clone();
        if let Some(record) = watch_record(&screen, &outcome) {
            emit_watch_record(&record, format)?;
        }
    }
    screen.teardown();
    Ok(())
}

fn show_config(config: &Config, default: bool) -> Result<()> {
    let text = if default {
        Config::default().to_toml_string()?
    } else {
        config.to_toml_string()?
    };
    print!("{text}");
    Ok(())
}

// =============================================================================
// Entry point
// =============================================================================

fn effective_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::read_or_default(cli.config.as_deref()).context("loading config")?;
    if let Some(level) = &cli.log_level {
        config.general.log_level.clone_from(level);
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }
    config.validate().context("validating config")?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = effective_config(&cli)?;
    init_logging(&LogConfig::from(&config.general)).context("initializing logging")?;
    tracing::debug!(command = ?cli.command, "Starting");

    match cli.command {
        Commands::Browse {
            catalog,
            steps,
            format,
        } => browse(&config, &catalog, steps, format).await,
        Commands::Search {
            catalog,
            page,
            format,
            query,
        } => search(&config, &catalog, &query, page, format).await,
        Commands::Watch { catalog, format } => watch(&config, &catalog, format).await,
        Commands::Config { default } => show_config(&config, default),
    }
}

/// Remediation for the first domain error in the chain.
fn remediation_for(err: &anyhow::Error) -> Option<Remediation> {
    err.chain().find_map(|cause| {
        if let Some(err) = cause.downcast_ref::<kemono_core::Error>() {
            err.remediation()
        } else if let Some(err) = cause.downcast_ref::<ConfigError>() {
            Some(err.remediation())
        } else if let Some(err) = cause.downcast_ref::<CatalogError>() {
            Some(err.remediation())
        } else {
            cause.downcast_ref::<SearchError>().map(SearchError::remediation)
        }
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(remediation) = remediation_for(&err) {
                eprint!("\n{}", remediation.render_plain());
            }
            ExitCode::FAILURE
        }
    }
}

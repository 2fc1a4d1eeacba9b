//! CLI entry point for `mboxscope`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use mboxscope::config::{self, Config};
use mboxscope::index::{FilterCriteria, FolderCounts, FolderFilter, LiveIndex};
use mboxscope::model::record::{HeaderRecord, MessageKey};
use mboxscope::render;
use mboxscope::scan::{ScanCoordinator, ScanEvent};
use mboxscope::store::archive::ArchiveStore;

/// Browse large MBOX archives while they load.
#[derive(Parser)]
#[command(name = "mboxscope", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// MBOX file to open in the interactive viewer
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a file in the interactive viewer
    Open { path: PathBuf },
    /// Scan all headers and print the filtered message list
    Scan {
        path: PathBuf,
        /// Folder to list: All, Inbox, Sent, Drafts, Spam, Trash, Archived
        #[arg(short, long)]
        folder: Option<FolderFilter>,
        /// Case-insensitive text matched against sender and subject
        #[arg(short, long)]
        search: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Render one message by its position in the file
    Show {
        path: PathBuf,
        /// Zero-based message number, as printed by `scan`
        key: u64,
        /// Print the HTML document instead of text
        #[arg(long)]
        html: bool,
    },
    /// Show the config file location, or write the defaults there
    Config {
        /// Write the current settings to the config file
        #[arg(long)]
        init: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let interactive = matches!(cli.command, None | Some(Commands::Open { .. }));
    setup_logging(log_level, &config, interactive);

    match cli.command {
        Some(Commands::Open { path }) => cmd_open(&path, &config),
        None => match cli.file {
            Some(path) => cmd_open(&path, &config),
            None => {
                Cli::command().print_help()?;
                Ok(())
            }
        },
        Some(Commands::Scan {
            path,
            folder,
            search,
            json,
        }) => cmd_scan(&path, folder, search, json, &config),
        Some(Commands::Show { path, key, html }) => cmd_show(&path, key, html, &config),
        Some(Commands::Config { init }) => cmd_config(init, &config),
        Some(Commands::Completions { shell }) => cmd_completions(shell),
        Some(Commands::Manpage) => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and file logging.
///
/// The interactive viewer owns the terminal, so it logs to the file only.
fn setup_logging(level: &str, config: &Config, interactive: bool) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = (!interactive)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    let log_file = config::log_file_path(config);
    let file_layer = log_file.parent().and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        let name = log_file.file_name()?;
        let appender = tracing_appender::rolling::never(dir, name);
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(appender),
        )
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

fn cmd_open(path: &Path, config: &Config) -> anyhow::Result<()> {
    mboxscope::tui::run_tui(path, config)
}

/// Run the background scan to completion with a progress bar, then print.
fn cmd_scan(
    path: &Path,
    folder: Option<FolderFilter>,
    search: Option<String>,
    json: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let folder = match folder {
        Some(folder) => folder,
        None => config
            .general
            .default_folder
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?,
    };

    let store = Arc::new(ArchiveStore::new(&config.performance));
    let total = store.open(path)?;
    let index = Arc::new(LiveIndex::with_criteria(FilterCriteria {
        folder,
        search: search.unwrap_or_default(),
    }));

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} Scanning {total} emails [{{bar:40.cyan/blue}}] {{pos}}% ({{elapsed}})"
            ))?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let mut scanner = ScanCoordinator::new(config.scan.batch_size);
    let events = scanner.start(Arc::clone(&store), total, index.clone());
    let mut processed = 0;
    let mut skipped = 0;
    for event in events {
        match event {
            ScanEvent::Progress(pct) => pb.set_position(u64::from(pct)),
            ScanEvent::Finished {
                processed: p,
                skipped: s,
            } => {
                processed = p;
                skipped = s;
            }
            ScanEvent::Cancelled { processed: p } => processed = p,
            ScanEvent::Batch(_) => {}
        }
    }
    scanner.wait();
    pb.finish_and_clear();

    let report = ScanReport {
        path,
        file_size: store.file_size(),
        total,
        processed,
        skipped,
        elapsed: start.elapsed(),
        counts: index.folder_counts(),
        criteria: index.criteria(),
        records: index.display_records(),
    };
    if json {
        report.print_json()
    } else {
        report.print_table();
        Ok(())
    }
}

struct ScanReport<'a> {
    path: &'a Path,
    file_size: u64,
    total: usize,
    processed: usize,
    skipped: usize,
    elapsed: std::time::Duration,
    counts: FolderCounts,
    criteria: FilterCriteria,
    records: Vec<HeaderRecord>,
}

impl ScanReport<'_> {
    fn print_table(&self) {
        println!();
        println!("  {:<14} {}", "File", self.path.display());
        println!("  {:<14} {}", "Size", format_size(self.file_size, BINARY));
        println!(
            "  {:<14} {} of {} ({} unreadable)",
            "Loaded", self.processed, self.total, self.skipped
        );
        println!("  {:<14} {:.2?}", "Scan time", self.elapsed);
        println!();
        println!("  {:<14} {}", "All", self.counts.total());
        for (folder, count) in self.counts.non_empty() {
            println!("  {:<14} {}", folder.name(), count);
        }
        println!();

        let mut view = format!("Viewing: {}", self.criteria.folder);
        if !self.criteria.search.is_empty() {
            view.push_str(&format!(", matching \"{}\"", self.criteria.search));
        }
        println!("  {view} ({} messages)", self.records.len());
        if self.records.is_empty() {
            println!();
            return;
        }
        println!();
        println!("  {:>6} {:<16} {:<30} {}", "#", "Date", "From", "Subject");
        println!("  {}", "-".repeat(100));
        for record in &self.records {
            let from: String = record.sender.chars().take(29).collect();
            let subject: String = record.subject.chars().take(45).collect();
            println!(
                "  {:>6} {:<16} {:<30} {}",
                record.key.index, record.timestamp, from, subject
            );
        }
        println!();
    }

    fn print_json(&self) -> anyhow::Result<()> {
        let folders: serde_json::Map<String, serde_json::Value> = self
            .counts
            .non_empty()
            .into_iter()
            .map(|(folder, count)| (folder.name().to_string(), count.into()))
            .collect();
        let output = serde_json::json!({
            "file": self.path.to_string_lossy(),
            "file_size": self.file_size,
            "message_count": self.total,
            "processed": self.processed,
            "skipped": self.skipped,
            "scan_time_ms": self.elapsed.as_millis(),
            "folder_counts": folders,
            "filter": {
                "folder": self.criteria.folder.to_string(),
                "search": self.criteria.search,
            },
            "result_count": self.records.len(),
            "results": self.records,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}

/// Render one message to stdout.
fn cmd_show(path: &Path, index: u64, html: bool, config: &Config) -> anyhow::Result<()> {
    let store = ArchiveStore::new(&config.performance);
    let count = store.open(path)?;
    if index >= count as u64 {
        anyhow::bail!("{}: message {index} out of range (archive has {count})", path.display());
    }
    let generation = store
        .generation()
        .ok_or_else(|| anyhow::anyhow!("archive closed unexpectedly"))?;
    let key = MessageKey::new(generation, index);

    let raw = store.fetch_raw(key)?;
    let record = mboxscope::parser::header::extract_record(key, &raw);
    let document = render::render_document(&raw)?;

    if html {
        println!("{document}");
    } else {
        println!("Date:    {}", record.timestamp);
        println!("From:    {}", record.sender);
        println!("Subject: {}", record.subject);
        println!("Folder:  {}", record.folder);
        println!();
        println!("{}", render::html_to_text(&document));
    }
    Ok(())
}

fn cmd_config(init: bool, config: &Config) -> anyhow::Result<()> {
    let path = config::config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;
    if init {
        config::save_config(config)?;
        println!("Wrote {}", path.display());
    } else {
        println!("{}", path.display());
        print!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mboxscope", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use exception_archiver::layout::parse_compact_date;
use exception_archiver::{
    ArchiveContainer, ArchiveOutcome, Archiver, ArchiverConfig, RotatingStorage, ThrowableReport,
};

#[derive(Parser)]
#[command(name = "exception-archiver", version)]
#[command(about = "Roll old exception reports into daily zip archives")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// JSON config file; flags below override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Live directory holding exception records
    #[arg(long, global = true)]
    live: Option<PathBuf>,

    /// Directory for the daily archives (default: the live directory)
    #[arg(long, global = true)]
    archive: Option<PathBuf>,

    /// Newest records to keep live
    #[arg(long, global = true)]
    keep: Option<usize>,

    /// Extra records tolerated before archiving runs
    #[arg(long, global = true)]
    threshold: Option<usize>,

    /// Record file suffix
    #[arg(long, global = true)]
    extension: Option<String>,

    /// Serialize passes with an advisory lock in the live directory
    #[arg(long, global = true)]
    lock: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single archiving pass
    Run,
    /// List live records, newest first
    List,
    /// List the entries of one day's archive
    Entries {
        /// Day as YYYYMMDD (default: today, UTC)
        #[arg(long)]
        date: Option<String>,
    },
    /// List all daily archives
    Containers,
    /// Write a record, then run an archiving pass
    Record {
        #[arg(long, default_value = "Exception")]
        kind: String,
        #[arg(long)]
        message: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = resolve_config(&cli.config)?;
    let mut out = io::BufWriter::new(io::stdout());
    match cli.command {
        Commands::Run => cmd_run(config, &mut out)?,
        Commands::List => cmd_list(config, &mut out)?,
        Commands::Entries { date } => cmd_entries(config, date.as_deref(), &mut out)?,
        Commands::Containers => cmd_containers(config, &mut out)?,
        Commands::Record { kind, message } => cmd_record(config, kind, message, &mut out)?,
    }
    out.flush()?;
    Ok(())
}

fn resolve_config(args: &ConfigArgs) -> Result<ArchiverConfig> {
    let mut config = match (&args.config, &args.live) {
        (Some(path), _) => ArchiverConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        (None, Some(live)) => ArchiverConfig::new(live),
        (None, None) => return Err(anyhow!("either --config or --live is required")),
    };
    if let Some(live) = &args.live {
        config.live_path = live.clone();
    }
    if let Some(archive) = &args.archive {
        config.archive_path = Some(archive.clone());
    }
    if let Some(keep) = args.keep {
        config.keep_count = keep;
    }
    if let Some(threshold) = args.threshold {
        config.archive_threshold = threshold;
    }
    if let Some(extension) = &args.extension {
        config.extension = extension.clone();
    }
    if args.lock {
        config.lock = true;
    }
    config.validate()?;
    Ok(config)
}

fn cmd_run(config: ArchiverConfig, out: &mut dyn Write) -> Result<()> {
    let archiver = Archiver::new(config)?;
    match archiver.maybe_archive()? {
        ArchiveOutcome::Idle { live } => {
            let policy = archiver.config().policy();
            writeln!(
                out,
                "idle: {live} live records (archiving starts above {})",
                policy.trigger_level()
            )?;
        }
        ArchiveOutcome::Contended => {
            writeln!(out, "skipped: another process holds the archive lock")?;
        }
        ArchiveOutcome::Archived(report) => {
            writeln!(
                out,
                "archived {} records into {} ({} live)",
                report.entries.len(),
                report.container.display(),
                report.live_after()
            )?;
            for entry in &report.entries {
                let note = if entry.reused { " (already archived)" } else { "" };
                writeln!(out, "  {}{note}", entry.entry_name)?;
            }
        }
    }
    Ok(())
}

fn cmd_list(config: ArchiverConfig, out: &mut dyn Write) -> Result<()> {
    let archiver = Archiver::new(config)?;
    for record in archiver.live_records()? {
        let secs = record
            .modified
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        writeln!(out, "{secs}\t{}", record.path.display())?;
    }
    Ok(())
}

fn cmd_entries(config: ArchiverConfig, date: Option<&str>, out: &mut dyn Write) -> Result<()> {
    let archiver = Archiver::new(config)?;
    let container = match date {
        Some(raw) => {
            let date = parse_compact_date(raw)
                .ok_or_else(|| anyhow!("invalid date {raw}, expected YYYYMMDD"))?;
            ArchiveContainer::new(archiver.layout().container_path(date))
        }
        None => archiver.todays_container()?,
    };
    if !container.exists() {
        writeln!(out, "no archive at {}", container.path().display())?;
        return Ok(());
    }
    for entry in container.entries()? {
        writeln!(out, "{:>10}  {:08x}  {}", entry.size, entry.crc32, entry.name)?;
    }
    Ok(())
}

fn cmd_containers(config: ArchiverConfig, out: &mut dyn Write) -> Result<()> {
    let archiver = Archiver::new(config)?;
    for found in archiver.layout().containers()? {
        let entries = ArchiveContainer::new(&found.path).entries()?.len();
        writeln!(out, "{}\t{entries}\t{}", found.date, found.path.display())?;
    }
    Ok(())
}

fn cmd_record(
    config: ArchiverConfig,
    kind: String,
    message: String,
    out: &mut dyn Write,
) -> Result<()> {
    let storage = RotatingStorage::from_config(config)?;
    let report = ThrowableReport::new(kind, message).with_data(
        "recorded_at",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string(),
    );
    let written = storage.record_and_maybe_archive(&report)?;
    info!("wrote {}", written.path.display());
    writeln!(out, "{}", written.identifier)?;
    Ok(())
}

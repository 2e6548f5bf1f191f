/*!
TalentDB CLI - operator interface for the blob-backed candidate database.

Covers the sync, backup and candidate surfaces for inspection and recovery
work. The primary write path in production is the application embedding the
core; this binary is the seam where environment configuration is read and
handed to it.
*/

use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand, ValueEnum};
use tabled::{Table, Tabled};
use tracing::warn;

use talentdb_core::{
    AppConfig, BackupInfo, BackupKind, Candidate, OpResponse, SearchCriteria, SessionContext,
    StoreBackend,
};

#[derive(Parser)]
#[command(name = "talentdb")]
#[command(about = "CLI for the TalentDB blob-backed candidate database")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Storage backend to use (defaults to environment configuration)
    #[arg(short, long, global = true, value_enum)]
    storage: Option<StorageType>,

    /// Base path for local storage
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Debug)]
enum StorageType {
    Disk,
    S3,
    Memory,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync operations against the canonical database blob
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Backup catalogue operations
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
    /// Candidate record operations
    Candidate {
        #[command(subcommand)]
        command: CandidateCommands,
    },
    /// Print the effective configuration (no secrets)
    Config,
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Show sync engine status
    Status,
    /// Upload the local cache file to the canonical blob
    Push {
        /// Proceed even if another upload is in flight
        #[arg(short, long)]
        force: bool,
    },
    /// Download the canonical blob over the local cache file
    Pull {
        /// Ignore the freshness window
        #[arg(short, long)]
        force: bool,
    },
    /// Discard the local cache file and re-download
    Refresh,
}

#[derive(Subcommand)]
enum BackupCommands {
    /// Create a backup now
    Create {
        #[arg(long, value_enum, default_value = "manual")]
        kind: BackupKindArg,
        /// Skip gzip compression
        #[arg(long)]
        no_compress: bool,
        /// Skip the metadata envelope
        #[arg(long)]
        no_metadata: bool,
    },
    /// List stored backups, newest first
    List {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Restore the database from a backup (defaults to the latest alias)
    Restore {
        name: Option<String>,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Delete a backup
    Delete { name: String },
    /// Delete backups older than the retention window
    Cleanup,
    /// Show catalogue statistics
    Stats,
    /// Show backup system health
    Health,
    /// List restore points
    Points,
    /// Show recent rows from the backup audit log
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum CandidateCommands {
    /// List candidates matching optional filters
    List {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        industry: Option<String>,
        #[arg(long)]
        role: Option<String>,
        /// Minimum number of experience entries
        #[arg(long)]
        experience_years: Option<usize>,
    },
    /// Show one candidate as JSON
    Show { email: String },
    /// Import a candidate from a JSON file
    Import { file: PathBuf },
    /// Delete a candidate by email
    Delete { email: String },
    /// Dashboard statistics
    Stats,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackupKindArg {
    Manual,
    Auto,
    Scheduled,
}

impl From<BackupKindArg> for BackupKind {
    fn from(kind: BackupKindArg) -> Self {
        match kind {
            BackupKindArg::Manual => BackupKind::Manual,
            BackupKindArg::Auto => BackupKind::Auto,
            BackupKindArg::Scheduled => BackupKind::Scheduled,
        }
    }
}

#[derive(Tabled)]
struct CandidateRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Industry")]
    industry: String,
    #[tabled(rename = "Experience")]
    experience: String,
}

impl From<&Candidate> for CandidateRow {
    fn from(candidate: &Candidate) -> Self {
        CandidateRow {
            name: candidate.name.clone(),
            email: candidate.email.clone(),
            role: candidate.current_role.clone().unwrap_or_default(),
            industry: candidate.industry.clone().unwrap_or_default(),
            experience: format!("{} roles", candidate.experience.len()),
        }
    }
}

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Compressed")]
    compressed: String,
}

impl From<&BackupInfo> for BackupRow {
    fn from(info: &BackupInfo) -> Self {
        BackupRow {
            name: info.name.clone(),
            kind: info.kind.to_string(),
            created: info.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            size: format_size(info.size_bytes),
            compressed: if info.compressed { "yes" } else { "no" }.to_string(),
        }
    }
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = build_config(&cli)?;

    if let Commands::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(&config.summary())?);
        return Ok(());
    }

    let engines = talentdb_core::open(&config)?;
    let session = SessionContext::new(engines.sync, engines.records, engines.backups);

    match cli.command {
        Commands::Sync { command } => run_sync(&session, command),
        Commands::Backup { command } => run_backup(&session, command),
        Commands::Candidate { command } => run_candidate(&session, command),
        Commands::Config => unreachable!("handled above"),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_config(cli: &Cli) -> Result<AppConfig, anyhow::Error> {
    let mut config = AppConfig::from_env();

    if let Some(storage) = &cli.storage {
        config.store.backend = match storage {
            StorageType::Disk => StoreBackend::Local,
            StorageType::S3 => StoreBackend::S3,
            StorageType::Memory => StoreBackend::Memory,
        };
    }
    if let Some(path) = &cli.path {
        config.store.local_base_path = Some(path.clone());
    }

    config.validate()?;
    Ok(config)
}

fn finish(response: OpResponse) -> Result<(), anyhow::Error> {
    if response.ok {
        println!("{}", response.message);
        Ok(())
    } else {
        bail!("{}", response.message)
    }
}

fn run_sync(session: &SessionContext, command: SyncCommands) -> Result<(), anyhow::Error> {
    match command {
        SyncCommands::Status => {
            let status = session.get_sync_status();
            println!(
                "last sync:      {}",
                status
                    .last_sync_time
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                    .unwrap_or_else(|| "never".to_string())
            );
            println!("syncing now:    {}", status.is_syncing);
            println!("local file:     {}", status.local_db_exists);
            println!("local size:     {}", format_size(status.local_db_size));
            println!("refresh queued: {}", status.force_download_flagged);
            Ok(())
        }
        SyncCommands::Push { force } => {
            if session.sync_to_blob(force) {
                println!("Database uploaded to the canonical blob");
                Ok(())
            } else {
                bail!("upload not performed (in progress elsewhere, or failed; see logs)")
            }
        }
        SyncCommands::Pull { force } => {
            if session.sync_from_blob(force) {
                println!("Local database refreshed from the canonical blob");
                Ok(())
            } else {
                bail!("download failed; see logs")
            }
        }
        SyncCommands::Refresh => {
            if session.force_refresh() {
                println!("Local database discarded and re-downloaded");
                Ok(())
            } else {
                bail!("force refresh failed; see logs")
            }
        }
    }
}

fn run_backup(session: &SessionContext, command: BackupCommands) -> Result<(), anyhow::Error> {
    match command {
        BackupCommands::Create {
            kind,
            no_compress,
            no_metadata,
        } => {
            let (response, info) =
                session.create_backup(kind.into(), !no_compress, !no_metadata);
            if let Some(info) = info {
                println!("{}", Table::new([BackupRow::from(&info)]));
            }
            finish(response)
        }
        BackupCommands::List { limit } => {
            let backups = session.list_backups(limit);
            if backups.is_empty() {
                println!("No backups found");
            } else {
                let rows: Vec<BackupRow> = backups.iter().map(BackupRow::from).collect();
                println!("{}", Table::new(rows));
            }
            Ok(())
        }
        BackupCommands::Restore { name, force } => {
            if !force && !confirm("Overwrite the local database from this backup?")? {
                println!("Restore cancelled");
                return Ok(());
            }
            finish(session.restore_from_backup(name.as_deref()))
        }
        BackupCommands::Delete { name } => finish(session.delete_backup(&name)),
        BackupCommands::Cleanup => {
            let (count, names) = session.cleanup_old_backups();
            println!("Deleted {count} expired backups");
            for name in names {
                println!("  {name}");
            }
            Ok(())
        }
        BackupCommands::Stats => match session.get_backup_stats() {
            Some(stats) => {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                Ok(())
            }
            None => bail!("failed to collect backup statistics; see logs"),
        },
        BackupCommands::Health => {
            let health = session.get_backup_health();
            println!("status: {:?}", health.status);
            for issue in &health.issues {
                println!("  - {issue}");
            }
            Ok(())
        }
        BackupCommands::Points => {
            for point in session.get_restore_points() {
                println!(
                    "{:<40} {:<10} {:>10}  {}",
                    point.name,
                    point.kind,
                    format_size(point.size_bytes),
                    point
                        .timestamp
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default()
                );
            }
            Ok(())
        }
        BackupCommands::History { limit } => {
            for row in session.get_backup_history(limit) {
                println!(
                    "{:<40} {:<8} {:>10}  {}",
                    row.backup_name,
                    row.status,
                    row.file_size.map(format_size).unwrap_or_default(),
                    row.backup_time
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default()
                );
            }
            Ok(())
        }
    }
}

fn run_candidate(
    session: &SessionContext,
    command: CandidateCommands,
) -> Result<(), anyhow::Error> {
    match command {
        CandidateCommands::List {
            name,
            industry,
            role,
            experience_years,
        } => {
            let criteria = SearchCriteria {
                name,
                industry,
                current_role: role,
                experience_years,
                ..Default::default()
            };
            let candidates = session.search_candidates(&criteria);
            if candidates.is_empty() {
                println!("No candidates found");
            } else {
                let rows: Vec<CandidateRow> = candidates.iter().map(CandidateRow::from).collect();
                println!("{}", Table::new(rows));
            }
            Ok(())
        }
        CandidateCommands::Show { email } => match session.get_candidate_by_email(&email) {
            Some(candidate) => {
                println!("{}", serde_json::to_string_pretty(&candidate)?);
                Ok(())
            }
            None => bail!("no candidate with email '{email}'"),
        },
        CandidateCommands::Import { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let candidate: Candidate = serde_json::from_str(&raw)?;
            finish(session.insert_candidate(&candidate))
        }
        CandidateCommands::Delete { email } => finish(session.delete_candidate(&email)),
        CandidateCommands::Stats => {
            let stats = session.get_dashboard_stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

fn confirm(prompt: &str) -> Result<bool, anyhow::Error> {
    use std::io::Write;

    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        warn!("could not read confirmation, refusing to proceed");
        return Ok(false);
    }
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let bytes = bytes as f64;
    if bytes >= MB {
        format!("{:.1} MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes / KB)
    } else {
        format!("{bytes:.0} B")
    }
}

//! # sitediff CLI - Compare a site copy against its remote
//!
//! Command-line front end for the sitediff library.
//!
//! ## Features
//! - Compare a working copy, or a second environment, against a remote site
//! - Browse differences as a tree or a list
//! - Revert files and folders to the remote state
//! - Share comparisons as packages and render HTML reports
//!
//! ## Usage
//! ```bash
//! # Compare ./site against a mirror of the production environment
//! sitediff compare --remote contoso/prod --remote-dir /mnt/mirror/contoso --local ./site
//!
//! # Browse the result as a tree sorted by status
//! sitediff sort status
//! sitediff view tree
//! sitediff show contoso/prod
//!
//! # Revert a folder, then re-check
//! sitediff discard contoso/prod web/css --folder
//! sitediff resync contoso/prod
//!
//! # Share and report
//! sitediff export contoso/prod contoso.json
//! sitediff report contoso/prod report.html
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use sitediff::utils::format_bytes;
use sitediff::{
    ComparisonKey, ConflictDecision, DirectorySnapshotProvider, FileComparisonRecord, FileStatus,
    FolderNode, ImportOutcome, Projection, SiteDiff, SiteId, SiteNames, SortMode, TreeNode, ViewMode,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// File in the state directory mapping sites to the directories serving them
const SOURCES_FILE: &str = "sources.json";

/// sitediff CLI - compare, revert, share and report on site differences
#[derive(Parser)]
#[command(name = "sitediff")]
#[command(author = "Mufeed VH <mufeed@asterisk.so>")]
#[command(version)]
#[command(about = "Compare a local copy of a site against its remote snapshot")]
#[command(long_about = None)]
struct Cli {
    /// State directory (defaults to .sitediff)
    #[arg(short, long, global = true)]
    state: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare a local directory or environment against a remote site
    Compare {
        /// Remote site as WEBSITE/ENVIRONMENT
        #[arg(long)]
        remote: String,

        /// Directory serving the remote site's content
        #[arg(long)]
        remote_dir: Option<PathBuf>,

        /// Local working copy
        #[arg(long, conflicts_with = "local_env")]
        local: Option<PathBuf>,

        /// Compare against another environment (WEBSITE/ENVIRONMENT) instead
        #[arg(long)]
        local_env: Option<String>,

        /// Directory serving the local environment's content
        #[arg(long, requires = "local_env")]
        local_env_dir: Option<PathBuf>,

        /// Display name of the remote site
        #[arg(long)]
        remote_name: Option<String>,

        /// Display name of the local site
        #[arg(long)]
        local_name: Option<String>,

        /// Display name of the environment
        #[arg(long)]
        env_name: Option<String>,

        /// Show progress spinner
        #[arg(short, long)]
        progress: bool,
    },

    /// List active comparisons
    List,

    /// Show the differences of a comparison
    Show {
        /// Comparison key (WEBSITE/ENVIRONMENT or imported:REMOTE/ENVIRONMENT)
        key: String,
    },

    /// Set the sort mode
    Sort {
        #[arg(value_enum)]
        mode: SortArg,
    },

    /// Set the view mode
    View {
        #[arg(value_enum)]
        mode: ViewArg,
    },

    /// Revert a file or folder to the remote state
    Discard {
        /// Comparison key
        key: String,

        /// Relative path of the file or folder
        path: String,

        /// Treat PATH as a folder and revert everything beneath it
        #[arg(short, long)]
        folder: bool,
    },

    /// Export a comparison to a package file
    Export {
        /// Comparison key
        key: String,

        /// Output package file
        output: PathBuf,
    },

    /// Import a package file
    Import {
        /// Package file
        input: PathBuf,

        /// Replace an existing comparison with the same key
        #[arg(long)]
        replace: bool,
    },

    /// Recompute a live comparison from a fresh snapshot
    Resync {
        /// Comparison key
        key: String,

        /// Show progress spinner
        #[arg(short, long)]
        progress: bool,
    },

    /// Write an HTML report
    Report {
        /// Comparison key
        key: String,

        /// Output HTML file
        output: PathBuf,
    },

    /// Remove a comparison
    Remove {
        /// Comparison key
        key: String,
    },

    /// Remove every comparison
    Clear,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SortArg {
    Name,
    Path,
    Status,
}

impl From<SortArg> for SortMode {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortMode::Name,
            SortArg::Path => SortMode::Path,
            SortArg::Status => SortMode::Status,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ViewArg {
    Tree,
    List,
}

impl From<ViewArg> for ViewMode {
    fn from(arg: ViewArg) -> Self {
        match arg {
            ViewArg::Tree => ViewMode::Tree,
            ViewArg::List => ViewMode::List,
        }
    }
}

/// One persisted site-to-directory mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SourceEntry {
    site: SiteId,
    dir: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        if let Some(lib) = e.downcast_ref::<sitediff::SiteDiffError>() {
            eprintln!("  {}", lib.user_message().dimmed());
        }
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> anyhow::Result<()> {
    let state = cli.state.unwrap_or_else(|| PathBuf::from(".sitediff"));

    match cli.command {
        Commands::Compare {
            remote,
            remote_dir,
            local,
            local_env,
            local_env_dir,
            remote_name,
            local_name,
            env_name,
            progress,
        } => {
            let remote = parse_site(&remote)?;
            let local_env = local_env.as_deref().map(parse_site).transpose()?;
            let mut sources = load_sources(&state)?;
            if let Some(dir) = remote_dir {
                set_source(&mut sources, remote.clone(), dir)?;
            }
            if let (Some(site), Some(dir)) = (&local_env, local_env_dir) {
                set_source(&mut sources, site.clone(), dir)?;
            }
            save_sources(&state, &sources)?;

            let names = SiteNames::new(
                remote_name.unwrap_or_else(|| remote.website_id.clone()),
                local_name.unwrap_or_else(|| "local".to_string()),
                env_name.unwrap_or_else(|| remote.environment_id.clone()),
            );
            cmd_compare(&state, sources, remote, local, local_env, names, progress)
        }
        Commands::List => cmd_list(&state),
        Commands::Show { key } => cmd_show(&state, &key),
        Commands::Sort { mode } => {
            let mut sitediff = open(&state)?;
            sitediff.set_sort_mode(mode.into());
            println!("{} Sort mode: {}", "✓".green().bold(), sitediff.sort_mode().as_str().cyan());
            Ok(())
        }
        Commands::View { mode } => {
            let mut sitediff = open(&state)?;
            sitediff.set_view_mode(mode.into());
            println!("{} View mode: {}", "✓".green().bold(), sitediff.view_mode().as_str().cyan());
            Ok(())
        }
        Commands::Discard { key, path, folder } => cmd_discard(&state, &key, &path, folder),
        Commands::Export { key, output } => {
            let sitediff = open(&state)?;
            let key = parse_key(&key)?;
            let package = sitediff.export(&key, &output)?;
            let unavailable = package.records.iter().filter(|r| r.content_unavailable).count();
            println!(
                "{} Exported {} records to {}",
                "✓".green().bold(),
                package.records.len().to_string().cyan(),
                output.display().to_string().cyan()
            );
            if unavailable > 0 {
                println!("  Without content: {}", unavailable.to_string().yellow());
            }
            Ok(())
        }
        Commands::Import { input, replace } => cmd_import(&state, &input, replace),
        Commands::Resync { key, progress } => cmd_resync(&state, &key, progress),
        Commands::Report { key, output } => {
            let sitediff = open(&state)?;
            let key = parse_key(&key)?;
            sitediff.write_report(&key, &output)?;
            let size = fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
            println!(
                "{} Wrote report {} ({})",
                "✓".green().bold(),
                output.display().to_string().cyan(),
                format_bytes(size)
            );
            Ok(())
        }
        Commands::Remove { key } => {
            let mut sitediff = open(&state)?;
            let key = parse_key(&key)?;
            if !sitediff.registry().contains(&key) {
                bail!("Comparison not found: {}", key);
            }
            sitediff.remove_comparison(&key);
            println!("{} Removed {}", "✓".green().bold(), key.to_string().yellow());
            Ok(())
        }
        Commands::Clear => {
            let mut sitediff = open(&state)?;
            let count = sitediff.registry().len();
            sitediff.clear_all();
            println!("{} Removed {} comparisons", "✓".green().bold(), count);
            Ok(())
        }
    }
}

/// Compare and register the result
fn cmd_compare(
    state: &Path,
    sources: Vec<SourceEntry>,
    remote: SiteId,
    local: Option<PathBuf>,
    local_env: Option<SiteId>,
    names: SiteNames,
    show_progress: bool,
) -> anyhow::Result<()> {
    let mut sitediff = SiteDiff::open(state.to_path_buf(), provider_from(sources))?;

    println!("{} {}", "Comparing against".blue().bold(), remote.to_string().yellow());
    let start = Instant::now();
    let progress = spinner(show_progress, "Fetching snapshot and scanning...");

    let key = match (local, local_env) {
        (_, Some(local_env)) => sitediff.compare_with_environment(remote, local_env, names)?,
        (Some(local), None) => {
            let local = local
                .canonicalize()
                .with_context(|| format!("local directory {} not found", local.display()))?;
            sitediff.compare_with_local(remote, local, names)?
        }
        (None, None) => bail!("either --local or --local-env is required"),
    };

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    print_summary(&sitediff, &key)?;
    println!("  Time: {}", format_duration(start.elapsed()).to_string().cyan());
    Ok(())
}

/// List every comparison with its counts
fn cmd_list(state: &Path) -> anyhow::Result<()> {
    let sitediff = open(state)?;
    if sitediff.registry().is_empty() {
        println!("{}", "No comparisons".dimmed());
        return Ok(());
    }

    println!("{}", "Comparisons:".blue().bold());
    for comparison in sitediff.comparisons() {
        let counts = comparison.counts();
        let origin = match comparison.imported_at {
            Some(at) => format!("imported {}", at.format("%Y-%m-%d %H:%M")),
            None => format!("created {}", comparison.created_at.format("%Y-%m-%d %H:%M")),
        };
        println!(
            "  {} {} ~{} +{} -{} {}",
            comparison.key.to_string().yellow().bold(),
            format!("({} vs {})", comparison.local_site_name, comparison.remote_site_name).dimmed(),
            counts.modified.to_string().yellow(),
            counts.added_locally.to_string().green(),
            counts.deleted_locally.to_string().red(),
            origin.dimmed()
        );
    }
    Ok(())
}

/// Print a comparison using the current view and sort modes
fn cmd_show(state: &Path, key: &str) -> anyhow::Result<()> {
    let sitediff = open(state)?;
    let key = parse_key(key)?;
    print_summary(&sitediff, &key)?;

    match sitediff.projection(&key)? {
        Projection::Tree(root) => print_folder(&root, 1),
        Projection::List(records) => {
            for record in &records {
                println!("  {} {}", status_marker(record.status), record.relative_path);
            }
        }
    }
    Ok(())
}

/// Revert one file or a folder
fn cmd_discard(state: &Path, key: &str, path: &str, folder: bool) -> anyhow::Result<()> {
    let mut sitediff = open(state)?;
    let key = parse_key(key)?;

    if !folder {
        sitediff.discard_path(&key, path)?;
        println!("{} Reverted {}", "✓".green().bold(), path.cyan());
        return Ok(());
    }

    let summary = sitediff.discard_folder_path(&key, path.trim_matches('/'))?;
    if summary.is_partial_failure() {
        println!(
            "{} Reverted {}/{} files",
            "⚠".yellow().bold(),
            summary.success_count,
            summary.total_count
        );
        for failure in &summary.errors {
            println!("  {} {}: {}", "✗".red(), failure.relative_path, failure.error);
        }
    } else {
        println!(
            "{} Reverted {} files",
            "✓".green().bold(),
            summary.success_count.to_string().cyan()
        );
    }
    Ok(())
}

fn cmd_import(state: &Path, input: &Path, replace: bool) -> anyhow::Result<()> {
    let mut sitediff = open(state)?;
    let outcome = sitediff
        .import(input, |existing| {
            if replace {
                ConflictDecision::Replace
            } else {
                println!(
                    "{} {} already exists ({} records); pass --replace to overwrite",
                    "⚠".yellow().bold(),
                    existing.key,
                    existing.records.len()
                );
                ConflictDecision::Keep
            }
        })
        .with_context(|| format!("failed to import {}", input.display()))?;

    match outcome {
        ImportOutcome::Imported(key) => {
            println!("{} Imported {}", "✓".green().bold(), key.to_string().yellow());
            print_summary(&sitediff, &key)?;
        }
        ImportOutcome::Kept(key) => {
            println!("  Kept existing {}", key.to_string().yellow());
        }
    }
    Ok(())
}

fn cmd_resync(state: &Path, key: &str, show_progress: bool) -> anyhow::Result<()> {
    let sources = load_sources(state)?;
    let mut sitediff = SiteDiff::open(state.to_path_buf(), provider_from(sources))?;
    let key = parse_key(key)?;

    let start = Instant::now();
    let progress = spinner(show_progress, "Refreshing snapshot...");
    let result = sitediff.resync(&key);
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    result?;

    println!("{} Resynced {}", "✓".green().bold(), key.to_string().yellow());
    print_summary(&sitediff, &key)?;
    println!("  Time: {}", format_duration(start.elapsed()).to_string().cyan());
    Ok(())
}

fn print_summary(sitediff: &SiteDiff, key: &ComparisonKey) -> anyhow::Result<()> {
    let comparison = sitediff
        .get_comparison(key)
        .with_context(|| format!("comparison {} not found", key))?;
    let counts = comparison.counts();
    println!(
        "  {} vs {} ({})",
        comparison.local_site_name.cyan(),
        comparison.remote_site_name.cyan(),
        comparison.environment_name
    );
    if counts.total() == 0 {
        println!("  {}", "No differences".green());
        return Ok(());
    }
    println!("  Modified: {}", counts.modified.to_string().yellow());
    println!("  Added locally: {}", counts.added_locally.to_string().green());
    println!("  Deleted locally: {}", counts.deleted_locally.to_string().red());
    Ok(())
}

fn print_folder(folder: &FolderNode, depth: usize) {
    let indent = "  ".repeat(depth);
    for node in folder.children() {
        match node {
            TreeNode::Folder(child) => {
                println!("{}{}/ {}", indent, child.name.blue().bold(), format!("({})", child.file_count()).dimmed());
                print_folder(child, depth + 1);
            }
            TreeNode::File(record) => print_file(record, &indent),
        }
    }
}

fn print_file(record: &FileComparisonRecord, indent: &str) {
    let mut line = format!("{}{} {}", indent, status_marker(record.status), record.file_name());
    if record.is_binary {
        line.push_str(&" (binary)".dimmed().to_string());
    }
    println!("{}", line);
}

fn status_marker(status: FileStatus) -> ColoredString {
    match status {
        FileStatus::Modified => "~".yellow().bold(),
        FileStatus::AddedLocally => "+".green().bold(),
        FileStatus::DeletedLocally => "-".red().bold(),
    }
}

fn spinner(enabled: bool, message: &'static str) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Some(pb)
}

fn open(state: &Path) -> anyhow::Result<SiteDiff> {
    let sources = load_sources(state)?;
    Ok(SiteDiff::open(state.to_path_buf(), provider_from(sources))?)
}

fn provider_from(sources: Vec<SourceEntry>) -> DirectorySnapshotProvider {
    let mut provider = DirectorySnapshotProvider::new();
    for entry in sources {
        provider.add_site(entry.site, entry.dir);
    }
    provider
}

fn load_sources(state: &Path) -> anyhow::Result<Vec<SourceEntry>> {
    let path = state.join(SOURCES_FILE);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn save_sources(state: &Path, sources: &[SourceEntry]) -> anyhow::Result<()> {
    fs::create_dir_all(state)?;
    let path = state.join(SOURCES_FILE);
    let json = serde_json::to_vec_pretty(sources)?;
    sitediff::utils::atomic_write(&path, &json)?;
    Ok(())
}

fn set_source(sources: &mut Vec<SourceEntry>, site: SiteId, dir: PathBuf) -> anyhow::Result<()> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("source directory {} not found", dir.display()))?;
    sources.retain(|entry| entry.site != site);
    sources.push(SourceEntry { site, dir });
    Ok(())
}

fn parse_site(value: &str) -> anyhow::Result<SiteId> {
    match value.split_once('/') {
        Some((website, environment)) if !website.is_empty() && !environment.is_empty() => {
            Ok(SiteId::new(website, environment))
        }
        _ => bail!("expected WEBSITE/ENVIRONMENT, got `{}`", value),
    }
}

fn parse_key(value: &str) -> anyhow::Result<ComparisonKey> {
    match value.strip_prefix("imported:") {
        Some(rest) => {
            let (remote_site_name, environment_name) = rest
                .split_once('/')
                .with_context(|| format!("expected imported:REMOTE/ENVIRONMENT, got `{}`", value))?;
            Ok(ComparisonKey::Imported {
                remote_site_name: remote_site_name.to_string(),
                environment_name: environment_name.to_string(),
            })
        }
        None => Ok(ComparisonKey::Live(parse_site(value)?)),
    }
}

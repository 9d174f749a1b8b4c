//! MediaMirror - command-line interface for the mirror engine.
//!
//! Thin presentation layer: argument parsing, TOML configuration, console
//! progress output, and the interactive prompts for discrepancy
//! resolution. All mirror logic lives in the engine crate.

use clap::{Parser, Subcommand};
use engine::{
    ChecksumAlgorithm, LocalResolution, MirrorResolution, OrphanResolution, ScanReport,
    SyncConfig, SyncEngine, SyncProgress,
};
use serde::Deserialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// MediaMirror - checksum-verified media mirror maintenance
#[derive(Parser, Debug)]
#[command(name = "mediamirror")]
#[command(version = "0.1.0")]
#[command(about = "Keep a source and backup media tree in sync with cached checksums")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, value_name = "PATH", default_value = "mediamirror.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Back up new source media only
    QuickScan,
    /// Back up new media, re-verify stale cache records, drop orphan sidecars
    Scan,
    /// Like scan, but re-verify every cache record regardless of age
    FullScan,
    /// Print drift counts and flagged files without changing anything
    Report,
    /// Delete empty directories and orphan cache files on both mirrors
    Cleanup,
    /// Walk through flagged problems interactively
    Resolve,
}

/// On-disk configuration, deserialized from TOML.
#[derive(Debug, Deserialize)]
struct Config {
    source: PathBuf,
    backup: PathBuf,
    libraries: Vec<String>,
    #[serde(default = "default_stale_days")]
    stale_after_days: i64,
    #[serde(default)]
    algorithm: Option<String>,
}

fn default_stale_days() -> i64 {
    90
}

impl Config {
    fn load(path: &Path) -> Result<Config, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read config file {}: {}", path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| format!("Cannot parse config file {}: {}", path.display(), e))
    }

    fn to_sync_config(&self) -> Result<SyncConfig, String> {
        let algorithm = match self.algorithm {
            Some(ref name) => ChecksumAlgorithm::parse(name)
                .ok_or_else(|| format!("Unknown checksum algorithm '{}'", name))?,
            None => ChecksumAlgorithm::default(),
        };
        Ok(SyncConfig {
            source_root: self.source.clone(),
            backup_root: self.backup.clone(),
            libraries: self.libraries.clone(),
            stale_after_days: self.stale_after_days,
            algorithm,
        })
    }
}

/// Console implementation of the engine's progress callbacks.
struct ConsoleProgress;

impl ConsoleProgress {
    fn side(is_source: bool) -> &'static str {
        if is_source {
            "source"
        } else {
            "backup"
        }
    }
}

impl SyncProgress for ConsoleProgress {
    fn on_library_loading(&self, is_source: bool, library: &str, media_count: usize) {
        eprint!(
            "\rLoading {} library \"{}\": {}",
            Self::side(is_source),
            library,
            media_count
        );
        let _ = io::stderr().flush();
    }

    fn on_backup_start(&self, library: &str, total: usize) {
        eprintln!();
        eprintln!("{} new media files in library \"{}\"", total, library);
    }

    fn on_backup_progress(&self, library: &str, index: usize, total: usize, path: &Path) {
        eprintln!(
            "Backing up {}/{}: [{}: {}]",
            index,
            total,
            library,
            path.display()
        );
    }

    fn on_backup_error(&self, library: &str, path: &Path, message: &str) {
        eprintln!(
            "Backup failed: [{}: {}]: {}",
            library,
            path.display(),
            message
        );
    }

    fn on_refresh_start(&self, is_source: bool, library: &str, total: usize) {
        eprintln!();
        eprintln!(
            "{} media files with stale cache records in {} library \"{}\"",
            total,
            Self::side(is_source),
            library
        );
    }

    fn on_refresh_progress(
        &self,
        is_source: bool,
        library: &str,
        index: usize,
        total: usize,
        path: &Path,
    ) {
        eprint!(
            "\r > Refreshing cache record {}/{}: [{}/{}: {}]",
            index,
            total,
            Self::side(is_source),
            library,
            path.display()
        );
        let _ = io::stderr().flush();
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let exit_code = match run_cli(&args) {
        Ok(()) => 0,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run_cli(args: &Args) -> Result<(), String> {
    let config = Config::load(&args.config)?;
    let mut engine = SyncEngine::new(config.to_sync_config()?).map_err(|e| e.to_string())?;

    let progress = ConsoleProgress;
    engine.load_mirrors().map_err(|e| e.to_string())?;
    engine
        .load_libraries(Some(&progress))
        .map_err(|e| e.to_string())?;
    eprintln!();

    match args.command {
        Command::QuickScan => {
            let copied = engine.quick_scan(Some(&progress)).map_err(|e| e.to_string())?;
            eprintln!();
            eprintln!("Backed up {} new media files", copied);
        }
        Command::Scan => {
            let report = engine.scan(Some(&progress)).map_err(|e| e.to_string())?;
            print_scan_report(&report);
        }
        Command::FullScan => {
            let report = engine.full_scan(Some(&progress)).map_err(|e| e.to_string())?;
            print_scan_report(&report);
        }
        Command::Report => report(&mut engine)?,
        Command::Cleanup => cleanup(&mut engine)?,
        Command::Resolve => resolve(&mut engine)?,
    }

    Ok(())
}

fn print_scan_report(report: &ScanReport) {
    eprintln!();
    eprintln!("Scan complete!");
    eprintln!("  Backed up: {} files", report.backed_up);
    eprintln!(
        "  Orphan cache files removed: {}",
        report.orphan_cache_files_removed
    );
    if report.discrepancies.is_empty() {
        eprintln!("  Checksum discrepancies: none");
    } else {
        eprintln!(
            "  Checksum discrepancies: {} (run 'resolve' to review)",
            report.discrepancies.len()
        );
        for media in &report.discrepancies {
            eprintln!(
                "    [{}/{}: {}]",
                ConsoleProgress::side(media.is_source),
                media.library,
                media.path_in_library.display()
            );
        }
    }
}

fn report(engine: &mut SyncEngine) -> Result<(), String> {
    let summary = engine.drift_summary().map_err(|e| e.to_string())?;

    println!("Drift report");
    println!("  New source media:              {}", summary.new_source_media);
    println!("  Orphan backup media:           {}", summary.orphan_backup_media);
    println!("  Stale cache records:           {}", summary.stale_cache_media);
    println!("  Local checksum discrepancies:  {}", summary.local_checksum_discrepancies);
    println!("  Mirror checksum discrepancies: {}", summary.mirror_checksum_discrepancies);
    println!("  Orphan cache files:            {}", summary.orphan_cache_files);
    println!("  Empty directories:             {}", summary.empty_directories);
    println!();
    println!(
        "{} total ({} automatic, {} need a decision)",
        summary.total(),
        summary.automatic(),
        summary.manual()
    );

    if summary.manual() > 0 {
        println!();
        for (library, path) in engine.orphan_backup_media().map_err(|e| e.to_string())? {
            println!("  orphan backup: [{}: {}]", library, path.display());
        }
        for media in engine
            .local_checksum_discrepancies()
            .map_err(|e| e.to_string())?
        {
            println!(
                "  local discrepancy: [{}/{}: {}]",
                ConsoleProgress::side(media.is_source),
                media.library,
                media.path_in_library.display()
            );
        }
        for (library, path) in engine
            .mirror_checksum_discrepancies()
            .map_err(|e| e.to_string())?
        {
            println!("  mirror discrepancy: [{}: {}]", library, path.display());
        }
    }

    Ok(())
}

fn cleanup(engine: &mut SyncEngine) -> Result<(), String> {
    let cache_files = engine
        .delete_orphan_cache_files()
        .map_err(|e| e.to_string())?;
    let directories = engine
        .delete_empty_directories()
        .map_err(|e| e.to_string())?;

    eprintln!("Removed {} orphan cache files", cache_files.len());
    eprintln!("Removed {} empty directories", directories.len());
    Ok(())
}

/// Read one line from stdin after printing a prompt.
fn prompt(text: &str) -> String {
    print!("{}", text);
    let _ = io::stdout().flush();
    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_err() {
        return String::new();
    }
    line.trim().to_string()
}

fn resolve(engine: &mut SyncEngine) -> Result<(), String> {
    resolve_orphan_backup_media(engine)?;
    resolve_local_discrepancies(engine)?;
    resolve_mirror_discrepancies(engine)?;
    Ok(())
}

fn resolve_orphan_backup_media(engine: &mut SyncEngine) -> Result<(), String> {
    // Snapshot first: resolving mutates the collection being reviewed
    let orphans = engine.orphan_backup_media().map_err(|e| e.to_string())?;
    for (library, path) in orphans {
        println!("> Orphaned backup file: [{}: {}]", library, path.display());
        let choice = loop {
            let answer = prompt(
                "1. Delete the file\n2. Restore the file to source\n3. Skip\nChoose an option: ",
            );
            match answer.as_str() {
                "1" => break OrphanResolution::Delete,
                "2" => break OrphanResolution::RestoreToSource,
                "3" => break OrphanResolution::Skip,
                _ => continue,
            }
        };
        if let Err(e) = engine.resolve_orphan_backup_media(&library, &path, choice) {
            eprintln!("Failed to resolve [{}: {}]: {}", library, path.display(), e);
        }
    }
    Ok(())
}

fn resolve_local_discrepancies(engine: &mut SyncEngine) -> Result<(), String> {
    let discrepancies = engine
        .local_checksum_discrepancies()
        .map_err(|e| e.to_string())?;
    for media in discrepancies {
        println!(
            "> Local checksum discrepancy: [{}/{}: {}]",
            ConsoleProgress::side(media.is_source),
            media.library,
            media.path_in_library.display()
        );
        let choice = loop {
            let answer = prompt(
                "1. File is valid. Update the cache record\n\
                 2. File is corrupt. Restore from the mirror\n\
                 3. Skip\nChoose an option: ",
            );
            match answer.as_str() {
                "1" => break LocalResolution::AcceptLocal,
                "2" => break LocalResolution::RestoreFromMirror,
                "3" => break LocalResolution::Skip,
                _ => continue,
            }
        };
        if let Err(e) = engine.resolve_local_discrepancy(&media, choice) {
            eprintln!(
                "Failed to resolve [{}: {}]: {}",
                media.library,
                media.path_in_library.display(),
                e
            );
        }
    }
    Ok(())
}

fn resolve_mirror_discrepancies(engine: &mut SyncEngine) -> Result<(), String> {
    let discrepancies = engine
        .mirror_checksum_discrepancies()
        .map_err(|e| e.to_string())?;
    for (library, path) in discrepancies {
        println!(
            "> Mirror checksum discrepancy: [{}: {}]",
            library,
            path.display()
        );
        let choice = loop {
            let answer = prompt(
                "1. Source file is correct. Overwrite the backup file\n\
                 2. Backup file is correct. Overwrite the source file\n\
                 3. Skip\nChoose an option: ",
            );
            match answer.as_str() {
                "1" => break MirrorResolution::SourceWins,
                "2" => break MirrorResolution::BackupWins,
                "3" => break MirrorResolution::Skip,
                _ => continue,
            }
        };
        if let Err(e) = engine.resolve_mirror_discrepancy(&library, &path, choice) {
            eprintln!("Failed to resolve [{}: {}]: {}", library, path.display(), e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_config_parses_minimal_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("mediamirror.toml");
        fs::write(
            &path,
            r#"
source = "/media/source"
backup = "/media/backup"
libraries = ["Videos", "Music"]
"#,
        )
        .expect("Failed to write config");

        let config = Config::load(&path).expect("Failed to load config");
        assert_eq!(config.libraries, vec!["Videos", "Music"]);
        assert_eq!(config.stale_after_days, 90);

        let sync = config.to_sync_config().expect("Failed to convert config");
        assert_eq!(sync.algorithm, ChecksumAlgorithm::Sha1);
    }

    #[test]
    fn test_config_rejects_unknown_algorithm() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("mediamirror.toml");
        fs::write(
            &path,
            r#"
source = "/media/source"
backup = "/media/backup"
libraries = ["Videos"]
algorithm = "rot13"
"#,
        )
        .expect("Failed to write config");

        let config = Config::load(&path).expect("Failed to load config");
        assert!(config.to_sync_config().is_err());
    }

    #[test]
    fn test_config_honors_overrides() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("mediamirror.toml");
        fs::write(
            &path,
            r#"
source = "/media/source"
backup = "/media/backup"
libraries = ["Videos"]
stale_after_days = 30
algorithm = "blake3"
"#,
        )
        .expect("Failed to write config");

        let config = Config::load(&path).expect("Failed to load config");
        let sync = config.to_sync_config().expect("Failed to convert config");
        assert_eq!(sync.stale_after_days, 30);
        assert_eq!(sync.algorithm, ChecksumAlgorithm::Blake3);
    }

    #[test]
    fn test_missing_config_file_reports_path() {
        let result = Config::load(Path::new("/nonexistent/mediamirror.toml"));
        let message = result.expect_err("Load should fail");
        assert!(message.contains("/nonexistent/mediamirror.toml"));
    }
}

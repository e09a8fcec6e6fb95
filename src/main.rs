use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use lexmerge::config::LexmergeConfig;
use lexmerge::document::RecordMergePolicy;
use lexmerge::fold::fold_updates;
use lexmerge::interfaces::NoValidator;
use lexmerge::merge::CollectSink;
use lexmerge::telemetry;

/// Three-way merge for keyed lexicon XML documents
///
/// Records (the element children of the document root) pair across
/// revisions by their identifier attribute, never by position. Divergent
/// records merge field by field; every divergence resolves deterministically
/// to the local side and is reported as a conflict record, never as an
/// error.
///
/// Logging goes to stderr and is controlled by LEXMERGE_LOG (an EnvFilter
/// directive, default 'warn') and LEXMERGE_LOG_FORMAT ('json' for JSON
/// lines).
#[derive(Parser)]
#[command(name = "lexmerge")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(
    after_help = "See 'lexmerge <command> --help' for more information on a specific command."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge two revisions of a document against their common ancestor.
    ///
    /// Reads three revisions, pairs their records by identifier, and writes
    /// the merged document to OUTPUT. Conflicts resolve to the local side
    /// and can be captured as JSON with --conflicts.
    ///
    /// Examples:
    ///   lexmerge merge base.lex ours.lex theirs.lex merged.lex
    ///   lexmerge merge base.lex ours.lex theirs.lex merged.lex --conflicts report.json
    #[command(verbatim_doc_comment)]
    Merge {
        /// The common ancestor revision.
        ancestor: PathBuf,

        /// The local revision (wins all ties).
        local: PathBuf,

        /// The incoming revision.
        other: PathBuf,

        /// Where to write the merged document.
        output: PathBuf,

        /// Write the resolved conflicts as JSON to this file.
        #[arg(long, value_name = "PATH")]
        conflicts: Option<PathBuf>,

        /// Merge policy configuration (TOML). Missing file means defaults.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Keep divergent local records verbatim, attaching the incoming
        /// revision as a marker child instead of merging field by field.
        #[arg(long)]
        keep_ours: bool,
    },

    /// Fold pending update files into a base document.
    ///
    /// Finds every sibling named <BASE>.update-*, folds them into the base
    /// oldest first (a later update wins whole records), backs up the
    /// previous base, and deletes the consumed update files.
    ///
    /// Examples:
    ///   lexmerge fold project.lex
    #[command(verbatim_doc_comment)]
    Fold {
        /// The base document to fold updates into.
        base: PathBuf,

        /// Merge policy configuration (TOML). Missing file means defaults.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Merge {
            ancestor,
            local,
            other,
            output,
            conflicts,
            config,
            keep_ours,
        } => merge(
            &ancestor,
            &local,
            &other,
            &output,
            conflicts.as_deref(),
            config.as_deref(),
            keep_ours,
        ),
        Commands::Fold { base, config } => fold(&base, config.as_deref()),
    }
}

// ---------------------------------------------------------------------------
// merge
// ---------------------------------------------------------------------------

fn merge(
    ancestor: &Path,
    local: &Path,
    other: &Path,
    output: &Path,
    conflicts: Option<&Path>,
    config: Option<&Path>,
    keep_ours: bool,
) -> Result<()> {
    let config = load_config(config)?;

    let mut merger = config.document_merger()?;
    if keep_ours {
        merger = merger.with_policy(RecordMergePolicy::KeepOursWithMarker);
    }

    let ancestor_xml = fs::read_to_string(ancestor)
        .with_context(|| format!("read ancestor {}", ancestor.display()))?;
    let local_xml =
        fs::read_to_string(local).with_context(|| format!("read local {}", local.display()))?;
    let other_xml = fs::read_to_string(other)
        .with_context(|| format!("read incoming {}", other.display()))?;

    let mut sink = CollectSink::new();
    let merged = merger.merge_documents(&local_xml, &other_xml, Some(&ancestor_xml), &mut sink)?;

    fs::write(output, merged.as_bytes())
        .with_context(|| format!("write merged document {}", output.display()))?;

    if let Some(path) = conflicts {
        let json = serde_json::to_string_pretty(sink.conflicts())
            .context("serialize conflict report")?;
        fs::write(path, json)
            .with_context(|| format!("write conflict report {}", path.display()))?;
    }

    if sink.is_empty() {
        println!("Merged cleanly into {}", output.display());
    } else {
        println!(
            "Merged into {} with {} conflict(s) resolved toward the local side.",
            output.display(),
            sink.len()
        );
        if conflicts.is_none() {
            println!("  (re-run with --conflicts <path> to capture them as JSON)");
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// fold
// ---------------------------------------------------------------------------

fn fold(base: &Path, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let options = config.fold_options();

    match fold_updates(base, &options, &NoValidator)? {
        None => println!("No update files found for {}", base.display()),
        Some(report) => {
            println!(
                "Folded {} update file(s) into {}",
                report.folded,
                base.display()
            );
            if report.discarded > 0 {
                println!("  Discarded {} empty update file(s).", report.discarded);
            }
            if let Some(backup) = &report.backup {
                println!("  Previous contents saved to {}", backup.display());
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<LexmergeConfig> {
    match path {
        Some(path) => {
            LexmergeConfig::load(path).with_context(|| format!("load {}", path.display()))
        }
        None => Ok(LexmergeConfig::default()),
    }
}

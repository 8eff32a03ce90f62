//! Packtrack CLI - register releases and regenerate the delivery server's JSON

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use packtrack::artifact::FileStore;
use packtrack::config::{self, PacktrackConfig, Settings};
use packtrack::export::{self, ExportLayout};
use packtrack::prompt::ConsolePrompter;
use packtrack::release;
use packtrack::storage::ReleaseStore;
use packtrack::ui::{self, Icons, TableBuilder};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "packtrack")]
#[command(version)]
#[command(about = "Release bookkeeping for Packs, Apks and Known Bugs")]
#[command(long_about = r#"
Packtrack records every released Pack and Apk, tracks which Known Bugs affect
which Pack, and regenerates the JSON files the delivery server serves.

Example usage:
  packtrack pack ./build/Pack_v2.jar
  packtrack apk ./app/build/outputs/apk/release/output-metadata.json
  packtrack export
  packtrack --test seed
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to packtrack.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file
    #[arg(long = "db", global = true)]
    database: Option<PathBuf>,

    /// Use the test database instead of the release database
    #[arg(short, long, global = true)]
    test: bool,

    /// Directory holding Packs/ and Apks/
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter packtrack.toml
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Register a new Pack from a .jar
    Pack {
        /// Path to the pack jar
        jar: PathBuf,

        /// Store and register the pack under this file name
        #[arg(short, long)]
        name: Option<String>,

        /// Do not regenerate the exported files afterwards
        #[arg(long)]
        no_export: bool,
    },

    /// Register a new Apk from an output-metadata.json build descriptor
    Apk {
        /// Path to output-metadata.json
        descriptor: PathBuf,

        /// Store and register the apk under this file name
        #[arg(short, long)]
        name: Option<String>,

        /// Do not regenerate the exported files afterwards
        #[arg(long)]
        no_export: bool,
    },

    /// Regenerate every exported JSON file
    Export,

    /// Show lineages, latest releases and database statistics
    Status,

    /// List the known bugs of a pack
    Bugs {
        /// Pack name or id
        pack: String,
    },

    /// Fill the database with sample releases
    Seed,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(cli) {
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Init { force } = cli.command {
        let path = cli.config.clone().unwrap_or_else(config::default_config_path);
        config::write_config(&path, &PacktrackConfig::starter(), force)?;
        ui::success(&format!("Wrote {}", path.display()));
        return Ok(());
    }

    let file_config = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    let settings = file_config.resolve(cli.database.as_deref(), cli.test, cli.root.as_deref());
    config::ensure_db_dir(&settings.database)?;

    let mut store = ReleaseStore::open(&settings.database)
        .with_context(|| format!("opening {}", settings.database.display()))?;
    tracing::debug!("Using database {:?} with root {:?}", settings.database, settings.root);

    match cli.command {
        Commands::Init { .. } => unreachable!("handled before the database is opened"),

        Commands::Pack { jar, name, no_export } => {
            ui::header(Icons::PACKAGE, &format!("Adding new Pack {}", jar.display()));
            let files = FileStore::new(&settings.root);
            let mut prompter = ConsolePrompter::new();
            let id = release::register_pack(&mut store, &files, &mut prompter, &jar, name.as_deref())?;
            ui::success(&format!("Registered pack #{}", id));
            if !no_export {
                run_export(&store, &settings)?;
            }
        }

        Commands::Apk { descriptor, name, no_export } => {
            ui::header(Icons::PHONE, &format!("Adding new Apk from {}", descriptor.display()));
            let files = FileStore::new(&settings.root);
            let mut prompter = ConsolePrompter::new();
            let id = release::register_apk(&mut store, &files, &mut prompter, &descriptor, name.as_deref())?;
            ui::success(&format!("Registered apk #{}", id));
            if !no_export {
                run_export(&store, &settings)?;
            }
        }

        Commands::Export => run_export(&store, &settings)?,

        Commands::Status => show_status(&store, &settings)?,

        Commands::Bugs { pack } => {
            let found = match pack.parse::<i64>() {
                Ok(id) => store.get_pack(id)?,
                Err(_) => store.get_pack_by_name(&pack)?,
            };
            let Some(found) = found else {
                anyhow::bail!("No pack named or numbered '{}'", pack);
            };
            ui::header(Icons::BUG, &format!("Known bugs of {}", found));
            let linked = store.get_linked_bugs(found.id)?;
            if linked.is_empty() {
                ui::success("No known bugs recorded for this pack");
            } else {
                println!("{}", ui::bugs_table(&linked));
            }
        }

        Commands::Seed => {
            if store.stats()?.packs > 0 {
                anyhow::bail!(
                    "{} already has packs; seed a fresh database (e.g. --test)",
                    settings.database.display()
                );
            }
            store.in_transaction(|s| s.seed_sample_data())?;
            ui::success(&format!("Seeded sample data into {}", settings.database.display()));
        }
    }

    Ok(())
}

fn run_export(store: &ReleaseStore, settings: &Settings) -> anyhow::Result<()> {
    ui::header(Icons::GEAR, "Regenerating Files");
    let layout = ExportLayout::new(&settings.root);
    let report = export::export_all(store, &layout)
        .with_context(|| format!("exporting into {}", settings.root.display()))?;
    for path in &report.files_written {
        ui::summary_row("wrote", &display_relative(path, &settings.root));
    }
    if !report.apk_written {
        ui::warn("No apk registered yet, ServerApks.json not written");
    }
    ui::success(&format!("Exported {} lineage(s)", report.lineages));
    Ok(())
}

fn show_status(store: &ReleaseStore, settings: &Settings) -> anyhow::Result<()> {
    ui::header(Icons::STATS, "Packtrack Status");
    ui::info("Database", &settings.database.display().to_string());
    ui::info("Root", &settings.root.display().to_string());

    for sc_version in store.get_sc_versions()? {
        ui::section(&format!(" ScVersion {} ", sc_version));
        println!("{}", ui::packs_table(&store.get_packs_for_sc(&sc_version)?));
    }

    ui::section(" Latest ");
    for pack in store.get_latest_packs()? {
        ui::summary_row(&format!("{}:", pack.sc_version), &pack.to_string());
    }
    match store.get_latest_apk()? {
        Some(apk) => ui::summary_row(
            "apk:",
            &format!("{} ({}, code {})", apk.name, apk.apk_v_name, apk.apk_v_code),
        ),
        None => ui::summary_row("apk:", &ui::muted("none")),
    }

    let stats = store.stats()?;
    let mut table = TableBuilder::new();
    table.add_row("Packs", &stats.packs.to_string());
    table.add_row("Lineages", &stats.lineages.to_string());
    table.add_row("Apks", &stats.apks.to_string());
    table.add_row("Known bugs", &stats.bugs.to_string());
    table.add_row("Open bugs", &stats.open_bugs.to_string());
    println!();
    println!("{}", table.build());
    Ok(())
}

fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

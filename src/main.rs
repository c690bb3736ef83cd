use anyhow::{Context, Result};
use cadence_beats::cadence::zones::ZoneModel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "cadence-beats", version, about = "Running-cadence playlists from your music library")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive cadence zones from a directory of exported runs
    AnalyzeRuns {
        /// Activity directory (defaults to config file activity_dir)
        dir: Option<PathBuf>,
    },

    /// Show the current cadence zones
    Zones,

    /// Import a library export (JSON), replacing the stored library
    ImportLibrary {
        /// Library file (defaults to config file library_file)
        file: Option<PathBuf>,
    },

    /// Look up tempos for library tracks not yet in the cache
    ScanLibrary {
        /// Maximum number of lookups this run
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Milliseconds between API requests (defaults to config)
        #[arg(long)]
        rate_limit_ms: Option<u64>,
    },

    /// Group the library into per-zone playlists and write them out
    GeneratePlaylists {
        /// Output file (defaults to config output_path, then the data dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Show the grouping without writing a file
        #[arg(long)]
        dry_run: bool,
    },

    /// Show library and cache statistics
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = cadence_beats::config::AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .unwrap_or_else(cadence_beats::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = cadence_beats::db::Database::open(&db_path).context("Failed to open database")?;

    match cli.command {
        Commands::AnalyzeRuns { dir } => {
            let Some(dir) = dir.or(config.activity_dir.clone()) else {
                anyhow::bail!(
                    "No activity directory. Pass one as an argument or set activity_dir in config."
                );
            };
            let policy = config.zones.policy().context("Invalid fallback zones in config")?;

            let load = cadence_beats::cadence::activity::load_activities(&dir)
                .context("Failed to load activities")?;
            println!(
                "Loaded {} runs ({} cadence samples), {} skipped, {} errors",
                load.runs.len(),
                load.samples.len(),
                load.skipped,
                load.errors
            );
            for run in &load.runs {
                log::debug!("  {:<24} {:>6} samples  {:>6.1} spm", run.run_id, run.samples, run.mean_spm);
            }

            let model = cadence_beats::cadence::derive_zones(&load.samples, &policy);
            db.save_zone_model(&model).context("Failed to save zone model")?;
            println!();
            print_zones(&model);
        }

        Commands::Zones => {
            match db.latest_zone_model().context("Failed to load zone model")? {
                Some(snapshot) => {
                    println!("Zones from {}", snapshot.created_at.format("%Y-%m-%d %H:%M UTC"));
                    print_zones(&snapshot.model);
                }
                None => println!("No cadence zones yet. Run `cadence-beats analyze-runs` first."),
            }
        }

        Commands::ImportLibrary { file } => {
            let Some(file) = file.or(config.library_file.clone()) else {
                anyhow::bail!("No library file. Pass one as an argument or set library_file in config.");
            };
            let tracks = cadence_beats::library::load_library(&file).context("Failed to read library")?;
            let stored = db.replace_library(&tracks).context("Failed to store library")?;
            println!("Imported {} tracks from {}", stored, file.display());
        }

        Commands::ScanLibrary { limit, rate_limit_ms } => {
            let lookup_config = &config.tempo_lookup;
            let Some(api_key) = lookup_config.resolve_api_key() else {
                anyhow::bail!(
                    "No GetSongBPM API key. Set {} or tempo_lookup.api_key in config.",
                    cadence_beats::config::API_KEY_ENV
                );
            };

            let tracks = db.get_library().context("Failed to load library")?;
            if tracks.is_empty() {
                anyhow::bail!("Library is empty. Run `cadence-beats import-library` first.");
            }

            let client = cadence_beats::tempo::lookup::GetSongBpm::new(
                api_key,
                lookup_config.base_url.clone(),
                Duration::from_secs(lookup_config.timeout_secs),
            );
            let options = cadence_beats::tempo::scan::ScanOptions {
                rate_limit: Duration::from_millis(rate_limit_ms.unwrap_or(lookup_config.rate_limit_ms)),
                limit,
            };

            let result = cadence_beats::tempo::scan::scan_tempos(&db, &client, &tracks, &options)
                .context("Tempo scan failed")?;
            println!();
            println!(
                "Scan complete: {} unique tracks, {} already cached, {} found, {} not found, {} failed",
                result.unique_keys, result.cached, result.found, result.not_found, result.failed
            );
            if result.quota_exhausted {
                println!("API quota exhausted. Re-run later to continue.");
            }
            if result.remaining > 0 {
                println!("{} tracks still to look up.", result.remaining);
            }
            if !result.missing.is_empty() {
                log::info!("Not found:");
                for m in &result.missing {
                    log::info!("  {m}");
                }
            }
        }

        Commands::GeneratePlaylists { output, dry_run } => {
            let generation = cadence_beats::playlist::generate::generate_playlists(&db)?;
            let playlists = cadence_beats::playlist::export::build_playlists(
                &generation.model,
                &generation.grouping,
                &config.playlists,
            );

            if generation.model.is_fallback() {
                let needed = config
                    .zones
                    .policy()
                    .map(|p| p.min_runs())
                    .unwrap_or(cadence_beats::MIN_RUNS);
                println!(
                    "Using default zones ({} runs analyzed, need {}).",
                    generation.model.sample_count(),
                    needed
                );
            }
            for p in &playlists {
                println!("  {:<40} {:>5} tracks", p.name, p.track_ids.len());
            }

            let r = &generation.report;
            println!();
            println!(
                "{} of {} tracks matched: {} not yet looked up, {} without tempo, {} outside all zones",
                r.matched, r.tracks, r.never_looked_up, r.not_found, r.outside_zones
            );

            if dry_run {
                println!("(dry run, no file written)");
            } else {
                let path = output
                    .or(config.output_path.clone())
                    .unwrap_or_else(cadence_beats::config::default_output_path);
                cadence_beats::playlist::export::write_playlists(
                    &path,
                    &generation.model,
                    &playlists,
                    &generation.grouping.unmatched,
                )
                .context("Failed to write playlists")?;
                println!("Wrote {} playlists to {}", playlists.len(), path.display());
            }
        }

        Commands::Stats => {
            let stats = db.stats().context("Failed to get stats")?;
            println!("Library Statistics");
            println!("==================");
            println!("Library tracks:     {}", stats.library_tracks);
            println!("Tempos known:       {}", stats.tempos_known);
            println!("Tempos not found:   {}", stats.tempos_not_found);
            println!("Zone snapshots:     {}", stats.zone_snapshots);

            if !stats.sources.is_empty() {
                println!();
                println!("Tempo sources:");
                for (source, count) in &stats.sources {
                    println!("  {:<16} {}", source, count);
                }
            }
        }
    }

    Ok(())
}

fn print_zones(model: &ZoneModel) {
    let origin = if model.is_fallback() {
        format!("default table ({} runs, need more for personal zones)", model.sample_count())
    } else {
        format!("{} runs, {} samples", model.sample_count(), model.observation_count())
    };
    println!("Cadence zones: {origin}");
    println!("{}", "-".repeat(36));
    for zone in model.zones() {
        println!(
            "  {:<12} {:>6.1} - {:>6.1} spm",
            zone.label, zone.lower_bound_spm, zone.upper_bound_spm
        );
    }
    if model.is_degenerate() {
        println!("All runs had the same cadence; only exact tempo matches will fit.");
    }
}

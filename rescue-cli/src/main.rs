//! Rescue Triage CLI
//!
//! Disaster-response triage: score, rank and dispatch from polled snapshots.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use rescue_core::{Profile, Snapshot};
use rescue_runtime::{Dashboard, DashboardConfig, DashboardView};
use rescue_source::{check_api_connection, ApiConfig, ApiSource, StaticSource, ZoneGenerator};

#[derive(Parser)]
#[command(name = "rescue-triage")]
#[command(author, version, about = "Rescue Triage: disaster-response scoring and dispatch", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,

    /// Custom profile TOML (overrides the embedded profile)
    #[arg(long, global = true)]
    profile: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the zone demo with generated signals
    Zones {
        /// Number of zones to generate
        #[arg(long, default_value = "150")]
        zones: usize,

        /// Refresh cycles to run
        #[arg(long, default_value = "3")]
        cycles: u64,

        /// Refresh interval in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Seed for reproducible zones and signals
        #[arg(long)]
        seed: Option<u64>,

        /// Zone to boost after the first refresh (repeatable)
        #[arg(long)]
        boost: Vec<String>,

        /// Zone to mark rescued after the first refresh (repeatable)
        #[arg(long)]
        resolve: Vec<String>,

        /// Print the final view as JSON
        #[arg(long)]
        json: bool,
    },

    /// Poll the triage backend and show the live priority list
    Watch {
        /// Backend base URL
        #[arg(long, env = "RESCUE_API_URL", default_value = "http://localhost:5000")]
        api_url: String,

        /// Refresh interval in milliseconds
        #[arg(long, default_value = "5000")]
        interval_ms: u64,

        /// Maximum runtime in seconds (0 = unlimited)
        #[arg(long, default_value = "60")]
        timeout: u64,

        /// Refresh cycles to run (0 = unlimited)
        #[arg(long, default_value = "0")]
        cycles: u64,

        /// Victim to dispatch an ambulance to after the first refresh (repeatable)
        #[arg(long)]
        assign: Vec<String>,

        /// Print each view as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rank a recorded snapshot (JSON) offline
    Replay {
        /// Snapshot file (JSON entities, optional clusters/ambulances/hospitals)
        file: PathBuf,

        /// Embedded profile to score with
        #[arg(long, default_value = "dashboard")]
        embedded: String,

        /// Entity to boost before ranking (repeatable)
        #[arg(long)]
        boost: Vec<String>,

        /// Entity to resolve before ranking (repeatable)
        #[arg(long)]
        resolve: Vec<String>,

        /// Print the view as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check backend API status
    Status {
        /// Backend base URL
        #[arg(long, env = "RESCUE_API_URL", default_value = "http://localhost:5000")]
        api_url: String,
    },

    /// Show a resolved scoring profile
    Profile {
        /// Embedded profile name
        #[arg(default_value = "zones")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match cli.command {
        Commands::Zones {
            zones,
            cycles,
            interval_ms,
            seed,
            boost,
            resolve,
            json,
        } => {
            let profile = load_profile(cli.profile.as_ref(), "zones")?;
            run_zones(profile, zones, cycles, interval_ms, seed, &boost, &resolve, json).await?;
        }
        Commands::Watch {
            api_url,
            interval_ms,
            timeout,
            cycles,
            assign,
            json,
        } => {
            let profile = load_profile(cli.profile.as_ref(), "dashboard")?;
            run_watch(profile, &api_url, interval_ms, timeout, cycles, &assign, json).await?;
        }
        Commands::Replay {
            file,
            embedded,
            boost,
            resolve,
            json,
        } => {
            let profile = load_profile(cli.profile.as_ref(), &embedded)?;
            run_replay(profile, &file, &boost, &resolve, json).await?;
        }
        Commands::Status { api_url } => {
            check_status(&api_url).await?;
        }
        Commands::Profile { name } => {
            let profile = load_profile(cli.profile.as_ref(), &name)?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
    }

    Ok(())
}

fn load_profile(path: Option<&PathBuf>, fallback: &str) -> Result<Profile> {
    match path {
        Some(path) => Profile::load(path)
            .with_context(|| format!("loading profile {}", path.display())),
        None => Profile::embedded(fallback).with_context(|| {
            format!(
                "unknown profile '{}' (available: {})",
                fallback,
                Profile::embedded_names().join(", ")
            )
        }),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_zones(
    profile: Profile,
    zones: usize,
    cycles: u64,
    interval_ms: u64,
    seed: Option<u64>,
    boost: &[String],
    resolve: &[String],
    json: bool,
) -> Result<()> {
    println!("🗺️  Rescue Triage - Zone Demo\n");
    println!("📋 Profile: {} | Zones: {} | Cycles: {}", profile.name(), zones, cycles);

    let generator = match seed {
        Some(seed) => ZoneGenerator::seeded(zones, seed),
        None => ZoneGenerator::random(zones),
    };

    let mut dashboard = Dashboard::new(DashboardConfig {
        source: Box::new(generator),
        profile,
        refresh_interval_ms: interval_ms,
        max_runtime_secs: 0,
        max_cycles: cycles.saturating_sub(1),
    })?;

    // First refresh populates the store so operator actions have targets
    dashboard.refresh_once().await?;
    apply_operator_actions(&mut dashboard, boost, resolve, true).await?;

    if cycles > 1 {
        dashboard.run().await?;
    }

    let view = dashboard.view();
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_view(&view);
    }

    Ok(())
}

async fn run_watch(
    profile: Profile,
    api_url: &str,
    interval_ms: u64,
    timeout: u64,
    cycles: u64,
    assign: &[String],
    json: bool,
) -> Result<()> {
    println!("🚑 Rescue Triage - Live Dashboard\n");
    println!("📡 Backend: {} | Profile: {}", api_url, profile.name());
    println!("⏱️  Refresh: {}ms | Timeout: {}s\n", interval_ms, timeout);

    let source = ApiSource::new(ApiConfig::default().with_base_url(api_url))?;

    let mut dashboard = Dashboard::new(DashboardConfig {
        source: Box::new(source),
        profile,
        refresh_interval_ms: interval_ms,
        max_runtime_secs: timeout,
        max_cycles: cycles,
    })?;

    if !assign.is_empty() {
        dashboard.refresh_once().await?;
        apply_operator_actions(&mut dashboard, &[], assign, false).await?;
    }

    let report = dashboard
        .run_with(|dash| {
            let view = dash.view();
            if json {
                match serde_json::to_string(&view) {
                    Ok(line) => println!("{}", line),
                    Err(e) => eprintln!("Failed to encode view: {}", e),
                }
            } else {
                print_view(&view);
            }
        })
        .await?;

    println!("\n📊 Final stats:");
    println!("   Refresh cycles: {}", report.cycles);
    println!("   Failed refreshes: {}", report.failures);
    println!("   Entities: {} ({} resolved)", report.stats.total, report.stats.resolved);

    Ok(())
}

async fn run_replay(
    profile: Profile,
    file: &Path,
    boost: &[String],
    resolve: &[String],
    json: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("reading snapshot {}", file.display()))?;
    let snapshot: Snapshot = serde_json::from_str(&content)
        .with_context(|| format!("parsing snapshot {}", file.display()))?;

    if !json {
        println!("🗂️  Rescue Triage - Replay\n");
        println!(
            "📋 Profile: {} | Entities: {} | File: {}",
            profile.name(),
            snapshot.entities.len(),
            file.display()
        );
    }

    let mut dashboard = Dashboard::new(DashboardConfig {
        source: Box::new(StaticSource::new("replay", snapshot)),
        profile,
        refresh_interval_ms: 0,
        max_runtime_secs: 0,
        max_cycles: 1,
    })?;

    dashboard.refresh_once().await?;
    apply_operator_actions(&mut dashboard, boost, resolve, true).await?;

    let view = dashboard.view();
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_view(&view);
    }

    Ok(())
}

async fn check_status(api_url: &str) -> Result<()> {
    println!("🔍 Checking backend API...\n");

    let config = ApiConfig::default().with_base_url(api_url);
    println!("📡 Endpoint: {}", config.base_url);

    if !check_api_connection(&config).await? {
        println!("❌ Backend unreachable");
        println!("\n💡 Tips:");
        println!("   - Start the triage backend on {}", config.base_url);
        println!("   - Or set RESCUE_API_URL to its address");
        println!("   - The zone demo needs no backend: rescue-triage zones");
        return Ok(());
    }

    println!("✅ Connection OK");

    let source = ApiSource::new(config)?;
    match source.fetch_stats().await {
        Ok(stats) => {
            println!("\n📊 Backend stats:");
            println!("   Total victims: {}", stats.total);
            println!("   Critical: {}", stats.critical);
            println!("   Assigned: {}", stats.assigned);
        }
        Err(e) => println!("⚠️  Could not read stats: {}", e),
    }

    Ok(())
}

async fn apply_operator_actions(
    dashboard: &mut Dashboard,
    boost: &[String],
    resolve: &[String],
    strict: bool,
) -> Result<()> {
    for id in boost {
        match dashboard.boost(id) {
            Ok(score) => println!("⬆️  Boosted {} → score {:.1}", id, score),
            Err(e) if !strict => println!("⚠️  Could not boost {}: {}", id, e),
            Err(e) => return Err(e.into()),
        }
    }
    for id in resolve {
        match dashboard.resolve(id).await {
            Ok(status) => println!("✅ {} marked {:?}", id, status),
            Err(e) if !strict => println!("⚠️  Could not resolve {}: {}", id, e),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn print_view(view: &DashboardView) {
    println!("\n{}", "=".repeat(60));
    if view.stale {
        println!("⚠️  Showing last-known-good data (backend unreachable)");
    }

    match &view.summary.top {
        Some(top) => println!("🔥 Top priority: {} (Score: {:.1})", top.id, top.score),
        None => println!("🔥 Top priority: none"),
    }
    println!("🧭 Advisory: {}", view.summary.advisory.message());
    println!(
        "👥 Population at risk: {} | Critical estimate: {}",
        view.summary.total_population, view.summary.total_critical
    );
    println!(
        "📈 Total: {} | Critical: {} | Assigned: {}",
        view.stats.total, view.stats.critical, view.stats.assigned
    );
    if view.fleet.ambulances > 0 || view.fleet.hospitals > 0 {
        println!(
            "🚑 Ambulances: {} available / {} busy | 🏥 Free beds: {} across {} hospitals",
            view.fleet.available, view.fleet.busy, view.fleet.beds_available, view.fleet.hospitals
        );
    }

    println!("\n🏁 Ranking:");
    if view.top.is_empty() {
        println!("   (no active entities)");
    }
    for entry in &view.top {
        println!(
            "   {:>2}. {:<12} {:>6.1}  {:<10} {:?}",
            entry.rank, entry.id, entry.score, entry.bucket, entry.status
        );
        if let Some(hospital) = &entry.hospital_assigned {
            println!("       🏥 {}", hospital);
        }
        if let Some(unit) = &entry.nearest_ambulance {
            println!("       🚑 nearest available: {}", unit);
        }
    }

    let buckets = view
        .buckets
        .iter()
        .map(|b| format!("{}={}", b.label, b.count))
        .collect::<Vec<_>>()
        .join(", ");
    println!("\n🎯 Buckets: {}", buckets);

    if !view.zones.is_empty() {
        let zones = view
            .zones
            .iter()
            .map(|z| format!("{}:{}", z.name, z.count))
            .collect::<Vec<_>>()
            .join(" ");
        println!("📍 Victims per cluster: {}", zones);
    }

    if !view.priority.is_empty() {
        println!("📌 Manual priority: {}", view.priority.join(" → "));
    }
    if !view.unconfirmed.is_empty() {
        println!("⏳ Awaiting backend confirmation: {}", view.unconfirmed.join(", "));
    }
}

use std::{
    fs::File,
    io::{BufReader, Read},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use flate2::bufread::GzDecoder;
use steppe::NoProgress;
use sweepsync::{Feature, FeatureSync, Handlers, LocalBackend, SyncConfig, feature, schedule};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Load a street-sweeping layer into a local store and query it like the map would.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory of the LMDB environment, created if missing
    #[arg(long, default_value = "sweepsync.mdb", global = true)]
    db: PathBuf,

    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log everything the controller does
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a geojson feature collection, gzipped or not
    Import { file: PathBuf },
    /// Print the segments around a point
    Query {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Overrides the radius of the configuration
        #[arg(long)]
        radius_km: Option<f64>,
        /// Print the features as geojson instead of a summary
        #[arg(long)]
        json: bool,
        /// How long to wait for the fetch to complete, in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },
    /// Print the size of the store
    Stats,
}

fn main() -> sweepsync::Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let mut config = match &args.config {
        Some(path) => SyncConfig::from_path(path)?,
        None => SyncConfig::default(),
    };
    std::fs::create_dir_all(&args.db)?;

    match args.command {
        Command::Import { file } => import(&args.db, config, &file),
        Command::Query {
            lat,
            lng,
            radius_km,
            json,
            timeout,
        } => {
            if let Some(radius_km) = radius_km {
                config.radius_km = radius_km;
            }
            query(&args.db, config, lat, lng, json, Duration::from_secs(timeout))
        }
        Command::Stats => stats(&args.db, config),
    }
}

fn open(db: &Path, config: SyncConfig, handlers: Handlers) -> sweepsync::Result<FeatureSync<LocalBackend>> {
    let backend_config = config.clone();
    FeatureSync::new(config, handlers, |sink| LocalBackend::open(db, &backend_config, sink))
}

fn import(db: &Path, config: SyncConfig, file: &Path) -> sweepsync::Result<()> {
    let time = Instant::now();
    let reader = BufReader::new(File::open(file)?);
    let reader: Box<dyn Read> = if file.extension().is_some_and(|ext| ext == "gz") {
        Box::new(GzDecoder::new(reader))
    } else {
        Box::new(reader)
    };
    let features = feature::features_from_reader(reader)?;
    info!("Deserialized {} features in {:?}", features.len(), time.elapsed());

    let sync = open(db, config, Handlers::new())?;
    let time = Instant::now();
    let report = sync.import_all(&features, &|| false, &NoProgress)?;
    println!(
        "Wrote {} records and {} locations in {:.2?}",
        report.records_written,
        report.locations_written,
        time.elapsed()
    );
    if report.records_failed + report.locations_failed + report.missing_key != 0 {
        println!(
            "{} records and {} locations failed, {} features had no key",
            report.records_failed, report.locations_failed, report.missing_key
        );
    }
    Ok(())
}

fn query(
    db: &Path,
    config: SyncConfig,
    lat: f64,
    lng: f64,
    json: bool,
    timeout: Duration,
) -> sweepsync::Result<()> {
    let found = Arc::new(Mutex::new(Vec::<Feature>::new()));
    let handlers = Handlers::new().on_feature_found({
        let found = found.clone();
        move |feature| found.lock().unwrap_or_else(|e| e.into_inner()).push(feature)
    });

    let time = Instant::now();
    let mut sync = open(db, config, handlers)?;
    sync.set_query_center(lat, lng)?;
    if !sync.wait_until_done(timeout) {
        println!("Gave up waiting after {timeout:?}, the results are partial");
    }
    let elapsed = time.elapsed();

    let mut features = std::mem::take(&mut *found.lock().unwrap_or_else(|e| e.into_inner()));
    features.sort_by(|a, b| schedule::block_side_key(a).cmp(&schedule::block_side_key(b)));

    if json {
        for feature in &features {
            println!("{}", serde_json::to_string(&feature.to_geojson())?);
        }
        return Ok(());
    }

    for (side, segments) in group_by_side(&features) {
        let hours: Vec<_> = schedule::cluster_by_time(segments.iter().copied())
            .into_keys()
            .collect();
        let weeks = if segments.iter().any(|f| schedule::any_weeks_off(f)) {
            " (some weeks off)"
        } else {
            ""
        };
        println!(
            "{side}: {} {}{weeks}",
            schedule::days_summary(segments.iter().copied()),
            hours.join(", ")
        );
    }
    println!(
        "Found {} segments in {elapsed:.2?}, skipped {} unreadable records",
        features.len(),
        sync.tracker().skipped()
    );
    Ok(())
}

fn group_by_side(features: &[Feature]) -> Vec<(String, Vec<&Feature>)> {
    let mut groups: Vec<(String, Vec<&Feature>)> = Vec::new();
    for feature in features {
        let side = schedule::block_side_key(feature);
        match groups.last_mut() {
            Some((last, segments)) if *last == side => segments.push(feature),
            _ => groups.push((side, vec![feature])),
        }
    }
    groups
}

fn stats(db: &Path, config: SyncConfig) -> sweepsync::Result<()> {
    let sync = open(db, config, Handlers::new())?;
    let backend = sync.backend();
    let rtxn = backend.env().read_txn()?;
    let stats = backend.store().stats(&rtxn)?;
    println!("{stats:#?}");
    println!("Cells of resolution {}", backend.store().resolution);
    Ok(())
}

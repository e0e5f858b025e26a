//! course-photo-cli - Debug tool for course loading and photo placement
//!
//! Usage:
//!   course-photo-cli course <gpx> [--distance <km>]
//!   course-photo-cli assign <gpx> --photos <n> --start <datetime> [--distance <km>] [--pace <min/km>]
//!
//! Prints JSON to stdout so the output can be piped into other tools or
//! compared against what the map view shows.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use course_photo_matcher::{
    Course, CourseOverview, DistanceModel, MatcherConfig, PositionAssigner, Result, MARATHON_KM,
};
use log::info;

#[derive(Parser)]
#[command(name = "course-photo-cli")]
#[command(about = "Debug tool for race courses and photo placement", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print centroid, start, finish, bounds and waypoints of a course
    Course {
        /// GPX file with the route track
        gpx: PathBuf,

        /// Nominal route distance in km
        #[arg(short, long, default_value_t = MARATHON_KM)]
        distance: f64,
    },

    /// Print estimated positions and times for a batch of photos
    Assign {
        /// GPX file with the route track
        gpx: PathBuf,

        /// Number of photos in the batch
        #[arg(short, long)]
        photos: usize,

        /// Event start, e.g. 2025-11-02T08:00:00
        #[arg(short, long, value_parser = parse_start)]
        start: NaiveDateTime,

        /// Nominal route distance in km
        #[arg(short, long, default_value_t = MARATHON_KM)]
        distance: f64,

        /// Assumed pace in minutes per km
        #[arg(long, default_value_t = 6.0)]
        pace: f64,

        /// Use measured along-track distance instead of the point index
        #[arg(long)]
        arc_length: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let outcome = match cli.command {
        Commands::Course { gpx, distance } => run_course(&gpx, distance),
        Commands::Assign {
            gpx,
            photos,
            start,
            distance,
            pace,
            arc_length,
        } => {
            let config = MatcherConfig {
                pace_min_per_km: pace,
                distance_model: if arc_length {
                    DistanceModel::ArcLength
                } else {
                    DistanceModel::PointIndex
                },
                ..MatcherConfig::default()
            };
            run_assign(&gpx, distance, photos, start, &config)
        }
    };

    match outcome {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn parse_start(value: &str) -> std::result::Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| format!("expected YYYY-MM-DDTHH:MM:SS: {}", e))
}

/// Read a GPX file, using its file stem as the event id.
fn load_course(path: &Path, distance_km: f64) -> Result<Course> {
    let event_id = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "course".to_string());
    let file = File::open(path).map_err(|e| {
        course_photo_matcher::PhotoMatchError::route_unavailable(&event_id, e)
    })?;
    let course = Course::from_gpx_reader(&event_id, BufReader::new(file), distance_km)?;
    info!(
        "Loaded {} ({} points, {:.2} km measured)",
        path.display(),
        course.point_count(),
        course.measured_length_km()
    );
    Ok(course)
}

fn run_course(path: &Path, distance_km: f64) -> Result<String> {
    let course = load_course(path, distance_km)?;
    let overview = CourseOverview::from_course(&course, course.event_id());
    Ok(serde_json::to_string_pretty(&overview).unwrap_or_else(|_| "{}".to_string()))
}

fn run_assign(
    path: &Path,
    distance_km: f64,
    photos: usize,
    start: NaiveDateTime,
    config: &MatcherConfig,
) -> Result<String> {
    config.validate()?;
    let course = load_course(path, distance_km)?;
    let placements = PositionAssigner::new(&course, config).assign_all(photos, start);
    info!("Placed {} photos", placements.len());
    Ok(serde_json::to_string_pretty(&placements).unwrap_or_else(|_| "[]".to_string()))
}

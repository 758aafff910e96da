use barpath::{
    config::{ConfigStore, FileConfigStore},
    exercise::Exercise,
    report::{CsvReportSink, JsonReportSink, ReportSink},
    runtime::{
        drive, write_detections, Clock, FixedTicker, ManualClock, ReaderDetectionSource, Runner,
    },
    session::Session,
    simulate::{generate, SimulationConfig},
};
use clap::{Parser, Subcommand, ValueEnum};
use std::{error::Error, io, path::PathBuf, time::Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

const TICK_RATE_MS: u64 = 100;

/// barbell path tracking and rep analysis from detection logs
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "Tracks a barbell through per-frame detections, segments repetitions against an overlay line, scores each rep and exports a session report."
)]
pub struct Cli {
    /// enable debug logging (RUST_LOG overrides)
    #[clap(short = 'v', long, global = true)]
    verbose: bool,

    /// config file to use instead of the per-user one
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// replay a detection log (`timestamp_ms,left,top,right,bottom`) through a session
    Replay {
        /// detection log, or `-` for stdin
        input: String,

        #[clap(short = 'e', long, value_enum)]
        exercise: Option<Exercise>,

        /// tempo prescription such as 3-1-2
        #[clap(short = 't', long)]
        tempo: Option<String>,

        #[clap(long)]
        phase: Option<String>,

        /// overlay line offset from the top of the canvas, in dp
        #[clap(long)]
        line_height: Option<f64>,

        /// acceptance band height around the line, in dp
        #[clap(long)]
        range_of_motion: Option<f64>,

        #[clap(long)]
        canvas_height: Option<f64>,

        /// directory to write the report to
        #[clap(short = 'o', long, default_value = ".")]
        out_dir: PathBuf,

        #[clap(short = 'f', long, value_enum, default_value_t = ReportFormat::Csv)]
        format: ReportFormat,

        /// skip writing a report
        #[clap(long)]
        no_report: bool,

        /// persist the effective overlay settings
        #[clap(long)]
        save_config: bool,
    },
    /// print a synthetic detection log to stdout
    Simulate {
        #[clap(short = 'n', long, default_value_t = 5)]
        reps: u32,

        #[clap(short = 'e', long, value_enum, default_value_t = Exercise::Squat)]
        exercise: Exercise,

        #[clap(long, default_value_t = 42)]
        seed: u64,

        #[clap(long, default_value_t = 105)]
        frame_interval_ms: u64,

        #[clap(long, default_value_t = 0)]
        start_ms: u64,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Csv,
    Json,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let store = match &cli.config {
        Some(path) => FileConfigStore::with_path(path),
        None => FileConfigStore::new(),
    };

    match cli.command {
        Commands::Replay {
            input,
            exercise,
            tempo,
            phase,
            line_height,
            range_of_motion,
            canvas_height,
            out_dir,
            format,
            no_report,
            save_config,
        } => {
            let mut config = store.load();
            let overlay = &mut config.overlay;
            if let Some(exercise) = exercise {
                overlay.exercise = exercise;
            }
            if let Some(tempo) = tempo {
                overlay.tempo = tempo;
            }
            if let Some(phase) = phase {
                overlay.phase = phase;
            }
            if let Some(h) = line_height {
                overlay.line_height_dp = h;
            }
            if let Some(rom) = range_of_motion {
                overlay.range_of_motion = rom;
            }
            if let Some(h) = canvas_height {
                overlay.canvas_height = h;
            }

            let mut session = Session::new(&config)?;
            if save_config {
                store.save(&config)?;
                info!(path = %store.path().display(), "Saved config");
            }

            let report_sink: Option<Box<dyn ReportSink>> = match (no_report, format) {
                (true, _) => None,
                (false, ReportFormat::Csv) => {
                    Some(Box::new(CsvReportSink::new(&out_dir)) as Box<dyn ReportSink>)
                }
                (false, ReportFormat::Json) => {
                    Some(Box::new(JsonReportSink::new(&out_dir)) as Box<dyn ReportSink>)
                }
            };

            replay(&mut session, &input, report_sink.as_deref())?;
        }
        Commands::Simulate {
            reps,
            exercise,
            seed,
            frame_interval_ms,
            start_ms,
        } => {
            let detections = generate(&SimulationConfig {
                reps,
                exercise,
                seed,
                frame_interval_ms,
                start_ms,
                ..Default::default()
            });
            write_detections(io::stdout().lock(), &detections)?;
        }
    }

    Ok(())
}

fn replay(
    session: &mut Session,
    input: &str,
    sink: Option<&dyn ReportSink>,
) -> Result<(), Box<dyn Error>> {
    let source = if input == "-" {
        ReaderDetectionSource::new(io::stdin())
    } else {
        ReaderDetectionSource::from_path(input)?
    };
    let runner = Runner::new(source, FixedTicker::new(Duration::from_millis(TICK_RATE_MS)));
    let clock = ManualClock::default();

    let summary = drive(session, &runner, &clock);
    let now_ms = clock.now_ms();
    info!(
        detections = summary.detections,
        reps = summary.reps_completed,
        "Replay finished"
    );

    let exercise = session.overlay().exercise;
    let tempo = session.overlay().tempo.clone();
    for rep in session.rep_data(exercise, &tempo) {
        println!(
            "Rep {:>2}: quality {:>3.0} ({})  range {:>5.1} cm  deviation {:>5.2} cm  {:.1}s",
            rep.rep_number,
            rep.quality_score,
            rep.grade(),
            rep.metrics.vertical_range_cm,
            rep.metrics.path_deviation_cm,
            rep.metrics.duration_secs,
        );
    }

    let stats = session.session_stats(now_ms);
    println!(
        "{}: {} reps, average quality {:.1}, {:.1}s",
        exercise, stats.total_reps, stats.average_quality, stats.session_duration_secs
    );

    if let Some(sink) = sink {
        let handle = session
            .generate_report(sink, exercise, &tempo, now_ms)
            .ok_or("failed to write report")?;
        println!("Report: {}", handle.location);
    }

    Ok(())
}

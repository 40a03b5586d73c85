//! CLI entry point for the SafeDrive traffic-intensity predictor.
//!
//! Provides subcommands for training regression models on historical
//! traffic datasets, batch prediction from CSV input, live forecasting
//! with scraped weather data, and algorithm comparison.

use anyhow::Result;
use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use safedrive::classify::TrafficLevel;
use safedrive::dataset::{self, DATE_COLUMN, ZONE_COLUMN};
use safedrive::features::temporal::parse_day_first;
use safedrive::frame::Frame;
use safedrive::model::{Algorithm, TrainedModelPackage, TrainingReport, train};
use safedrive::output::{PredictionRecord, append_records, print_json};
use safedrive::weather::{AemetScraper, WeatherSample};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "safedrive")]
#[command(about = "Predict Madrid road-traffic intensity from weather and history", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a regression model on a historical traffic dataset
    Train {
        /// Semicolon-separated training CSV
        #[arg(value_name = "DATASET")]
        dataset: String,

        /// Model family to train
        #[arg(short, long, value_enum, default_value_t = Algorithm::RandomForest)]
        algorithm: Algorithm,

        /// File to write the trained model package to
        #[arg(short, long, default_value = "safedrive_model.bin")]
        output: String,

        /// Fraction of rows held out for evaluation
        #[arg(long, default_value_t = 0.2)]
        test_fraction: f64,

        /// Seed for the train/test shuffle and the estimators
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Predict intensities for a batch of request rows from a CSV file
    Predict {
        /// Trained model package
        #[arg(value_name = "MODEL")]
        model: String,

        /// Prediction-input CSV (same shape as training data, no target)
        #[arg(value_name = "INPUT")]
        input: String,

        /// CSV file to append prediction records to
        #[arg(short, long, default_value = "predictions.csv")]
        output: String,

        /// Optional zone catalog CSV (id;nombre;...) to label results
        #[arg(long)]
        zones_file: Option<String>,
    },
    /// Forecast selected zones at a date/hour using scraped AEMET weather
    Forecast {
        /// Trained model package
        #[arg(value_name = "MODEL")]
        model: String,

        /// Zone ids to forecast, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        zones: Vec<i64>,

        /// Day-first date (DD/MM/YYYY); defaults to today
        #[arg(short, long)]
        date: Option<String>,

        /// Hour of day (0-23)
        #[arg(long, default_value_t = 12)]
        hour: u8,

        /// Optional zone catalog CSV (id;nombre;...) to label results
        #[arg(long)]
        zones_file: Option<String>,

        /// Optional CSV file to append prediction records to
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Train every algorithm on one dataset and compare their metrics
    Evaluate {
        /// Semicolon-separated training CSV
        #[arg(value_name = "DATASET")]
        dataset: String,

        /// Fraction of rows held out for evaluation
        #[arg(long, default_value_t = 0.2)]
        test_fraction: f64,

        /// Seed for the train/test shuffle and the estimators
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/safedrive.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("safedrive.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            dataset,
            algorithm,
            output,
            test_fraction,
            seed,
        } => {
            let frame = dataset::load_training_frame(&dataset)?;
            let (package, report) = train(&frame, algorithm, test_fraction, seed)?;
            print_json(&report)?;
            package.save(&output)?;
        }
        Commands::Predict {
            model,
            input,
            output,
            zones_file,
        } => {
            let package = TrainedModelPackage::load(&model)?;
            let frame = dataset::load_frame(&input)?;
            let zone_names = load_zone_names(zones_file.as_deref());

            let records = predict_batch(&package, frame, &zone_names)?;
            summarize(&records);
            append_records(&output, &records)?;
            info!(%output, records = records.len(), "Predictions written");
        }
        Commands::Forecast {
            model,
            zones,
            date,
            hour,
            zones_file,
            output,
        } => {
            forecast(model, zones, date, hour, zones_file, output).await?;
        }
        Commands::Evaluate {
            dataset,
            test_fraction,
            seed,
        } => {
            let frame = dataset::load_training_frame(&dataset)?;
            let mut reports: Vec<TrainingReport> = Vec::new();
            for algorithm in Algorithm::ALL {
                let (_, report) = train(&frame, algorithm, test_fraction, seed)?;
                reports.push(report);
            }
            for report in &reports {
                info!(
                    algorithm = %report.algorithm,
                    rmse = report.rmse,
                    mae = report.mae,
                    r2 = report.r2,
                    "Result"
                );
            }
            print_json(&reports)?;
        }
    }

    Ok(())
}

/// Runs a loaded package over a raw request frame and builds one record
/// per input row.
fn predict_batch(
    package: &TrainedModelPackage,
    frame: Frame,
    zone_names: &HashMap<i64, String>,
) -> Result<Vec<PredictionRecord>> {
    // Capture request metadata before assembly rewrites the frame.
    let zones = dataset::zone_ids(&frame);
    let dates: Vec<Option<String>> = match frame.categorical(DATE_COLUMN) {
        Some(cells) => cells.to_vec(),
        None => vec![None; frame.rows()],
    };

    let mut working = frame;
    let (predictions, _report) = package.predict(&mut working)?;

    let records = predictions
        .iter()
        .enumerate()
        .map(|(row, &predicted)| PredictionRecord {
            timestamp: Utc::now(),
            zone_id: zones[row],
            zone_name: zones[row].and_then(|z| zone_names.get(&z).cloned()),
            fecha: dates[row].clone(),
            predicted_intensity: predicted,
            traffic_level: package.classify(predicted, zones[row]),
        })
        .collect();
    Ok(records)
}

/// The live-forecast flow: weather from AEMET (or documented defaults),
/// one prediction per requested zone.
async fn forecast(
    model: String,
    zones: Vec<i64>,
    date: Option<String>,
    hour: u8,
    zones_file: Option<String>,
    output: Option<String>,
) -> Result<()> {
    let package = TrainedModelPackage::load(&model)?;
    let zone_names = load_zone_names(zones_file.as_deref());

    let date = date.unwrap_or_else(|| Local::now().format("%d/%m/%Y").to_string());
    if hour > 23 {
        anyhow::bail!("hour must be in 0-23, got {hour}");
    }
    let fecha = format!("{date} {hour:02}:00");
    let requested = parse_day_first(&fecha)?;

    let sample = fetch_weather(requested.date(), hour).await;
    info!(
        %fecha,
        temp = sample.temp,
        humidity = sample.humidity,
        conditions = %sample.conditions,
        "Weather covariates ready"
    );

    let started = std::time::Instant::now();

    let mut frame = Frame::with_rows(zones.len());
    frame.insert_numeric(ZONE_COLUMN, zones.iter().map(|&z| z as f64).collect())?;
    frame.insert_categorical(DATE_COLUMN, vec![fecha.clone(); zones.len()])?;
    sample.fill_frame(&mut frame)?;

    let records = predict_batch(&package, frame, &zone_names)?;
    let elapsed = started.elapsed();

    for record in &records {
        info!(
            zone = record.zone_id.unwrap_or_default(),
            name = record.zone_name.as_deref().unwrap_or("-"),
            prediction = record.predicted_intensity,
            level = %record.traffic_level,
            "Forecast"
        );
    }
    summarize(&records);
    info!(elapsed_ms = elapsed.as_millis() as u64, "Forecast complete");

    if let Some(output) = output {
        append_records(&output, &records)?;
        info!(%output, "Forecast records written");
    }
    Ok(())
}

/// Weather for the requested date and hour: scraped when AEMET covers the
/// date, otherwise the documented fallback sample. Never fails a forecast.
async fn fetch_weather(date: NaiveDate, hour: u8) -> WeatherSample {
    let today = Local::now().date_naive();
    let days_ahead = (date - today).num_days();
    if !(0..=7).contains(&days_ahead) {
        warn!(
            %date,
            "AEMET only covers today through 7 days ahead; using default weather"
        );
        return WeatherSample::fallback();
    }

    let scraper = AemetScraper::new();
    match scraper.hourly_forecast().await {
        Ok(table) => match table.get(&hour) {
            Some(forecast) => WeatherSample::from_forecast(forecast),
            None => {
                warn!(hour, "AEMET has no data for the requested hour; using default weather");
                WeatherSample::fallback()
            }
        },
        Err(error) => {
            warn!(%error, "AEMET fetch failed; using default weather");
            WeatherSample::fallback()
        }
    }
}

fn load_zone_names(path: Option<&str>) -> HashMap<i64, String> {
    let Some(path) = path else {
        return HashMap::new();
    };
    match dataset::load_zone_catalog(path) {
        Ok(zones) => zones,
        Err(error) => {
            warn!(%error, path, "Zone catalog unavailable; results stay unlabeled");
            HashMap::new()
        }
    }
}

fn summarize(records: &[PredictionRecord]) {
    let count = |level: TrafficLevel| {
        records
            .iter()
            .filter(|r| r.traffic_level == level)
            .count()
    };
    info!(
        total = records.len(),
        low = count(TrafficLevel::Low),
        medium = count(TrafficLevel::Medium),
        high = count(TrafficLevel::High),
        "Prediction summary"
    );
}

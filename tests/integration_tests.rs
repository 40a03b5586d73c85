use safedrive::classify::TrafficLevel;
use safedrive::dataset::load_training_frame;
use safedrive::frame::Frame;
use safedrive::model::{Algorithm, TrainedModelPackage, train};
use std::env;
use std::fs;

fn write_training_csv(name: &str) -> String {
    let path = format!("{}/{}", env::temp_dir().display(), name);
    fs::write(
        &path,
        "id;fecha;intensidad;temp;humidity;conditionsDay\n\
         1;01/01/2024 08:00;100;10;80;clear\n\
         1;02/01/2024 08:00;120;12;75;cloudy\n\
         1;03/01/2024 08:00;140;14;70;clear\n\
         2;01/01/2024 09:00;50;10;80;rain\n",
    )
    .unwrap();
    path
}

fn request_frame(zone: f64) -> Frame {
    let mut frame = Frame::with_rows(1);
    frame.insert_numeric("id", vec![zone]).unwrap();
    frame
        .insert_categorical("fecha", vec!["04/01/2024 08:00".to_string()])
        .unwrap();
    frame.insert_numeric("temp", vec![12.0]).unwrap();
    frame.insert_numeric("humidity", vec![75.0]).unwrap();
    frame
        .insert_categorical("conditions", vec!["clear".to_string()])
        .unwrap();
    frame
}

#[test]
fn test_full_pipeline() {
    let csv_path = write_training_csv("safedrive_it_pipeline.csv");
    let frame = load_training_frame(&csv_path).unwrap();

    let (package, report) = train(&frame, Algorithm::DecisionTree, 0.0, 42).unwrap();
    assert!(report.rmse.is_finite());

    // Zone 1: intensities [100, 120, 140] -> mean 120, std 20.
    let zone1 = package.stats.zones[&1];
    assert_eq!(zone1.mean, 120.0);
    assert_eq!(zone1.std, 20.0);

    // Zone 2 has a single observation; its std is coerced to 0.
    let zone2 = package.stats.zones[&2];
    assert_eq!(zone2.mean, 50.0);
    assert_eq!(zone2.std, 0.0);

    // Prediction 150 for zone 1: z = (150 - 120) / 20 = 1.5 -> High.
    assert_eq!(package.classify(150.0, Some(1)), TrafficLevel::High);

    // Zone 2's std is 0, so the global default std (median of {20, 0} = 10)
    // applies; a prediction at the zone mean sits at z = 0 -> Medium.
    assert_eq!(package.classify(50.0, Some(2)), TrafficLevel::Medium);

    // Unseen zone: global defaults (mean = median of {120, 50} = 85).
    assert_eq!(package.classify(85.0, Some(999)), TrafficLevel::Medium);
    assert_eq!(package.classify(120.0, Some(999)), TrafficLevel::High);

    fs::remove_file(csv_path).unwrap();
}

#[test]
fn test_package_round_trip_preserves_predictions() {
    let csv_path = write_training_csv("safedrive_it_roundtrip.csv");
    let frame = load_training_frame(&csv_path).unwrap();
    let (package, _) = train(&frame, Algorithm::GradientBoosting, 0.0, 42).unwrap();

    let model_path = format!("{}/safedrive_it_model.bin", env::temp_dir().display());
    package.save(&model_path).unwrap();
    let restored = TrainedModelPackage::load(&model_path).unwrap();

    let (fresh, _) = package.predict(&mut request_frame(1.0)).unwrap();
    let (loaded, _) = restored.predict(&mut request_frame(1.0)).unwrap();
    assert_eq!(fresh, loaded);

    fs::remove_file(csv_path).unwrap();
    fs::remove_file(model_path).unwrap();
}

#[test]
fn test_unseen_zone_predicts_without_error() {
    let csv_path = write_training_csv("safedrive_it_unseen.csv");
    let frame = load_training_frame(&csv_path).unwrap();
    let (package, _) = train(&frame, Algorithm::DecisionTree, 0.0, 42).unwrap();

    let (predictions, report) = package.predict(&mut request_frame(999.0)).unwrap();
    assert_eq!(predictions.len(), 1);
    assert!(predictions[0].is_finite());
    assert_eq!(report.unseen_zones, 1);

    let level = package.classify(predictions[0], Some(999));
    assert!(matches!(
        level,
        TrafficLevel::Low | TrafficLevel::Medium | TrafficLevel::High
    ));

    fs::remove_file(csv_path).unwrap();
}

#[test]
fn test_prediction_columns_match_training() {
    let csv_path = write_training_csv("safedrive_it_columns.csv");
    let frame = load_training_frame(&csv_path).unwrap();
    let (package, _) = train(&frame, Algorithm::DecisionTree, 0.0, 42).unwrap();

    // A request missing every weather column still assembles to the
    // persisted shape and predicts.
    let mut sparse = Frame::with_rows(2);
    sparse.insert_numeric("id", vec![1.0, 2.0]).unwrap();
    sparse
        .insert_categorical(
            "fecha",
            vec!["05/01/2024 08:00".to_string(), "05/01/2024 09:00".to_string()],
        )
        .unwrap();

    let (predictions, report) = package.predict(&mut sparse).unwrap();
    assert_eq!(predictions.len(), 2);
    assert!(report.columns_created > 0);

    fs::remove_file(csv_path).unwrap();
}

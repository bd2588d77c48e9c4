mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use support::{
    FIXTURE_LOGIT_A_VS_ZEROS, FIXTURE_LOGIT_ZEROS_VS_A, artifacts_with, default_artifacts,
    fighter_a, meta_json,
};
use utracker::config::ModelArtifacts;
use utracker::feature_store::{FeatureStore, InMemoryFeatureStore};
use utracker::features::{FeatureStats, assemble};
use utracker::prediction::{FightPredictionRequest, PredictionError, PredictionService};
use utracker::predictor::{FightPredictor, LazyPredictor, ModelError, sigmoid};
use utracker::{Corner, FighterId};

const RED: FighterId = FighterId(1);
const BLUE: FighterId = FighterId(2);

/// Loader that counts how often the artifacts are read from disk.
fn counting_predictor(artifacts: ModelArtifacts) -> (Arc<LazyPredictor>, Arc<AtomicUsize>) {
    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let predictor = LazyPredictor::with_loader(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        FightPredictor::load(&artifacts)
    });
    (Arc::new(predictor), loads)
}

fn seeded_store() -> Arc<InMemoryFeatureStore> {
    let store = Arc::new(InMemoryFeatureStore::new());
    store.upsert_features(RED, &fighter_a()).unwrap();
    store.upsert_features(BLUE, &FeatureStats::zeros()).unwrap();
    store
}

#[test]
fn probabilities_are_complementary() {
    let dir = tempfile::tempdir().unwrap();
    let (predictor, _) = counting_predictor(default_artifacts(dir.path()));
    let service = PredictionService::new(seeded_store(), predictor);

    let result = service.predict_fight(RED, BLUE).unwrap();
    assert_eq!(result.red_corner_id, RED);
    assert_eq!(result.blue_corner_id, BLUE);
    assert!(result.red_win_probability > 0.0 && result.red_win_probability < 1.0);
    assert_eq!(result.blue_win_probability, 1.0 - result.red_win_probability);
    assert!(
        (result.red_win_probability + result.blue_win_probability - 1.0).abs() <= f64::EPSILON
    );
}

#[test]
fn repeated_predictions_are_bit_identical() {
    let dir = tempfile::tempdir().unwrap();
    let (predictor, _) = counting_predictor(default_artifacts(dir.path()));
    let service = PredictionService::new(seeded_store(), predictor);

    let first = service.predict_fight(RED, BLUE).unwrap();
    for _ in 0..5 {
        let again = service.predict_fight(RED, BLUE).unwrap();
        assert_eq!(
            again.red_win_probability.to_bits(),
            first.red_win_probability.to_bits()
        );
    }
}

#[test]
fn missing_features_skip_model_load() {
    let dir = tempfile::tempdir().unwrap();
    let (predictor, loads) = counting_predictor(default_artifacts(dir.path()));
    let store = Arc::new(InMemoryFeatureStore::new());
    store.upsert_features(RED, &fighter_a()).unwrap();
    let service = PredictionService::new(store, Arc::clone(&predictor));

    let err = service.predict_fight(RED, BLUE).unwrap_err();
    assert!(matches!(
        err,
        PredictionError::MissingFeatures {
            corner: Corner::Blue,
            fighter_id: BLUE
        }
    ));
    assert!(err.is_client_error());

    let err = service.predict_fight(FighterId(77), RED).unwrap_err();
    assert!(matches!(
        err,
        PredictionError::MissingFeatures {
            corner: Corner::Red,
            ..
        }
    ));

    assert_eq!(loads.load(Ordering::SeqCst), 0);
    assert!(!predictor.is_loaded());
}

#[test]
fn concurrent_first_calls_load_once() {
    let dir = tempfile::tempdir().unwrap();
    let (predictor, loads) = counting_predictor(default_artifacts(dir.path()));
    let service = PredictionService::new(seeded_store(), predictor);

    let results = thread::scope(|scope| {
        let handles = (0..8)
            .map(|_| scope.spawn(|| service.predict_fight(RED, BLUE).unwrap()))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>()
    });

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn missing_artifacts_surface_as_model_errors() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = ModelArtifacts {
        meta_path: dir.path().join("absent_meta.json"),
        weights_path: dir.path().join("absent_weights.json"),
    };
    let service = PredictionService::new(
        seeded_store(),
        Arc::new(LazyPredictor::from_artifacts(artifacts)),
    );

    let err = service.predict_fight(RED, BLUE).unwrap_err();
    assert!(matches!(err, PredictionError::Model(ModelError::Io { .. })));
    assert!(!err.is_client_error());
}

#[test]
fn checkpoint_loads_from_torch_save_layout() {
    let dir = tempfile::tempdir().unwrap();
    let predictor = FightPredictor::load(&default_artifacts(dir.path())).unwrap();

    let forward = predictor
        .logit(assemble(&fighter_a(), &FeatureStats::zeros()).as_slice())
        .unwrap() as f64;
    let swapped = predictor
        .logit(assemble(&FeatureStats::zeros(), &fighter_a()).as_slice())
        .unwrap() as f64;
    assert!((forward - FIXTURE_LOGIT_A_VS_ZEROS).abs() < 1e-5, "{forward}");
    assert!((swapped - FIXTURE_LOGIT_ZEROS_VS_A).abs() < 1e-5, "{swapped}");

    let probs = predictor
        .predict(&assemble(&fighter_a(), &FeatureStats::zeros()))
        .unwrap();
    assert_eq!(probs.red, sigmoid(forward));
}

#[test]
fn checkpoint_disagreeing_with_metadata_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = artifacts_with(dir.path(), &meta_json(14), "predictor_dim12.pt");
    assert!(matches!(
        FightPredictor::load(&artifacts),
        Err(ModelError::Checkpoint { .. })
    ));
}

#[test]
fn checkpoint_missing_a_parameter_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = artifacts_with(dir.path(), &meta_json(14), "predictor_no_out_bias.pt");
    match FightPredictor::load(&artifacts) {
        Err(ModelError::Checkpoint { message, .. }) => {
            assert!(message.contains("out.bias"), "{message}")
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn wrong_input_dim_is_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = artifacts_with(dir.path(), &meta_json(12), "predictor_dim12.pt");
    let (predictor, loads) = counting_predictor(artifacts);
    assert!(matches!(
        predictor.get(),
        Err(ModelError::InputDim {
            expected: 14,
            found: 12
        })
    ));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(!predictor.is_loaded());

    let service = PredictionService::new(seeded_store(), predictor);
    assert!(matches!(
        service.predict_fight(RED, BLUE),
        Err(PredictionError::Model(ModelError::InputDim { .. }))
    ));
}

#[test]
fn handle_maps_request_to_response() {
    let dir = tempfile::tempdir().unwrap();
    let (predictor, _) = counting_predictor(default_artifacts(dir.path()));
    let service = PredictionService::new(seeded_store(), predictor);

    let response = service
        .handle(FightPredictionRequest {
            red_corner_id: RED,
            blue_corner_id: BLUE,
        })
        .unwrap();
    let direct = service.predict_fight(RED, BLUE).unwrap();
    assert_eq!(response.red_corner_id, RED);
    assert_eq!(response.red_corner_win_probability, direct.red_win_probability);
    assert_eq!(response.blue_corner_win_probability, direct.blue_win_probability);
}

#[test]
fn swapping_corners_reorders_the_vector() {
    let dir = tempfile::tempdir().unwrap();
    let (predictor, _) = counting_predictor(default_artifacts(dir.path()));
    let service = PredictionService::new(seeded_store(), predictor);

    let forward = service.predict_fight(RED, BLUE).unwrap();
    let swapped = service.predict_fight(BLUE, RED).unwrap();
    assert_eq!(swapped.red_corner_id, BLUE);
    assert_ne!(
        forward.red_win_probability.to_bits(),
        swapped.red_win_probability.to_bits()
    );
}

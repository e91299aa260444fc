use std::fs;
use std::path::Path;

use react_pinn::cli::{InferArgs, TrainArgs};
use react_pinn::error::PinnError;
use react_pinn::inference::Predictor;
use react_pinn::{
    COMPONENT_LOSSES_TRAIN, COST_PER_EPOCH, LOG_FILENAME, MODEL_FILENAME, NORM_FILENAME, inference,
    training,
};

fn args(data_dir: &Path, output_dir: &Path) -> TrainArgs {
    TrainArgs {
        data_dir: data_dir.to_path_buf(),
        input_prefix: "react_inputs_*".to_string(),
        output_prefix: "react_outputs_*".to_string(),
        output_dir: output_dir.to_path_buf(),
        debug: false,
        no_plot: true,
        no_save: false,
        optimizer: "adam".to_string(),
        learning_rate: Some(1e-3),
        epochs: Some(2),
        batch_size: 4,
        seed: 3,
    }
}

/// nnuc = 2 のデータを2ファイルに分けて書き出します。
fn write_dataset(dir: &Path) {
    for file in 0..2 {
        let mut inputs = String::new();
        let mut outputs = String::new();
        for i in 0..6 {
            let x = 0.2 + 0.1 * i as f32;
            let dens = 1e7 * (1 + i + file) as f32;
            let temp = 3e8 + 1e7 * i as f32;
            inputs.push_str(&format!("1e-6 {} {} {:e} {:e}\n", x, 1.0 - x, dens, temp));
            outputs.push_str(&format!(
                "{} {} {:e} -0.01 0.01 {:e}\n",
                x - 0.01,
                1.01 - x,
                1e16 * (i + 1) as f32,
                1e22 * (i + 1) as f32
            ));
        }
        fs::write(dir.join(format!("react_inputs_{:05}", file)), inputs).unwrap();
        fs::write(dir.join(format!("react_outputs_{:05}", file)), outputs).unwrap();
    }
}

#[test]
fn non_empty_output_dir_stops_the_run() {
    let data = tempfile::tempdir().unwrap();
    write_dataset(data.path());
    let out = tempfile::tempdir().unwrap();
    fs::write(out.path().join("previous.txt"), "old run").unwrap();

    let result = training::run(&args(data.path(), out.path()));
    assert!(matches!(result, Err(PinnError::OutputDirNotEmpty(_))));

    let names: Vec<String> = fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["previous.txt".to_string()]);
    assert_eq!(fs::read_to_string(out.path().join("previous.txt")).unwrap(), "old run");
}

#[test]
fn unsupported_optimizer_stops_the_run() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let output_dir = out.path().join("run");
    let mut args = args(data.path(), &output_dir);
    args.optimizer = "adagrad".to_string();

    let result = training::run(&args);
    assert!(matches!(result, Err(PinnError::UnsupportedOptimizer(_))));
    assert!(!output_dir.exists());
}

#[test]
fn full_run_writes_artifacts_that_inference_can_load() {
    let data = tempfile::tempdir().unwrap();
    write_dataset(data.path());
    let out = tempfile::tempdir().unwrap();
    let output_dir = out.path().join("run");

    training::run(&args(data.path(), &output_dir)).unwrap();

    for name in [LOG_FILENAME, MODEL_FILENAME, NORM_FILENAME, COST_PER_EPOCH, COMPONENT_LOSSES_TRAIN] {
        assert!(output_dir.join(name).is_file(), "{} is missing", name);
    }
    let cost = fs::read_to_string(output_dir.join(COST_PER_EPOCH)).unwrap();
    assert_eq!(cost.lines().count(), 2);
    let components = fs::read_to_string(output_dir.join(COMPONENT_LOSSES_TRAIN)).unwrap();
    assert!(components.lines().all(|l| l.split_whitespace().count() == 3));
    let log = fs::read_to_string(output_dir.join(LOG_FILENAME)).unwrap();
    assert!(log.contains("Cost at epoch 1"));

    let predictor = Predictor::load(&output_dir).unwrap();
    let predictions = predictor
        .predict(&[vec![1e-6, 0.3, 0.7, 2e7, 3.1e8]])
        .unwrap();
    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0].state.len(), 3);
    assert_eq!(predictions[0].rates.len(), 3);

    let input = out.path().join("cells.txt");
    fs::write(&input, "1e-6 0.3 0.7 2e7 3.1e8\n").unwrap();
    inference::run(&InferArgs {
        model_dir: output_dir,
        input,
    })
    .unwrap();
}

#[test]
fn inference_without_checkpoint_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        Predictor::load(dir.path()),
        Err(PinnError::ModelNotFound(_))
    ));
}

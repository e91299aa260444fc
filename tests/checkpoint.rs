use burn::backend::{Autodiff, NdArray};
use react_pinn::metrics::{checkpoint_path, save_checkpoint};
use react_pinn::model::ModelConfig;

type TestBackend = Autodiff<NdArray<f32>>;

#[test]
fn second_save_keeps_first_weights_as_backup() {
    let dir = tempfile::tempdir().unwrap();
    let path = checkpoint_path(dir.path());
    let device = Default::default();
    let config = ModelConfig::new(6, 4).with_hidden_sizes(vec![5]);

    save_checkpoint(config.init::<TestBackend>(&device), &path).unwrap();
    let first = std::fs::read(&path).unwrap();

    save_checkpoint(config.init::<TestBackend>(&device), &path).unwrap();
    let second = std::fs::read(&path).unwrap();

    let backup = dir.path().join("my_model_pinn.mpk.backup");
    assert_eq!(std::fs::read(&backup).unwrap(), first);
    assert_ne!(second, first);

    let backups = std::fs::read_dir(dir.path())
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .ends_with(".backup")
        })
        .count();
    assert_eq!(backups, 1);
}

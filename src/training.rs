//! # 学習ループ
//!
//! データの読み込み・正規化・分割から、エポックごとの学習と評価、
//! 履歴とモデルの保存までを順番に実行します。

use std::fs;
use std::path::Path;
use std::time::Instant;

use burn::backend::{Autodiff, NdArray};
use burn::config::Config;
use burn::optim::{AdamConfig, GradientsParams, Optimizer, RmsPropConfig, SgdConfig};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::cli::TrainArgs;
use crate::dataset::{ReactBatch, ReactDataset, ReactSample};
use crate::error::PinnError;
use crate::logging::LogSession;
use crate::loss::{PinnLoss, component_loss, component_loss_l1, plotting_loss, split_targets};
use crate::metrics::{
    BreakdownAccumulator, ComponentAccumulator, LossHistory, checkpoint_path, save_checkpoint,
};
use crate::model::{Model, ModelConfig};
use crate::normalize::NormFactors;
use crate::optim::OptimizerKind;
use crate::pinn::time_derivatives;
use crate::plot::plot_loss_history;
use crate::{CONFIG_FILENAME, LOG_FILENAME, LOSS_GRAPH_FILENAME, MODEL_CONFIG_FILENAME, NORM_FILENAME};

type MyBackend = Autodiff<NdArray<f32>>;

/// 学習設定
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// 使用するオプティマイザ
    #[config(default = "OptimizerKind::Adam")]
    pub optimizer: OptimizerKind,
    /// 学習率
    #[config(default = 1e-6)]
    pub learning_rate: f64,
    /// 学習エポック数
    #[config(default = 100)]
    pub num_epochs: usize,
    /// バッチサイズ
    #[config(default = 16)]
    pub batch_size: usize,
    /// テストに回すデータの割合 (%)
    #[config(default = 10)]
    pub percent_test: usize,
    /// 分割とシャッフルの乱数シード
    #[config(default = 42)]
    pub seed: u64,
    /// 隠れ層の幅
    #[config(default = "vec![32; 7]")]
    pub hidden_sizes: Vec<usize>,
    /// 各エポック後にテストデータで評価するか
    #[config(default = true)]
    pub evaluate: bool,
    /// 相対損失を逆伝播する合計に含めるか
    #[config(default = false)]
    pub include_relative_loss: bool,
    /// チャンネル別損失をバッチ数ではなく最後のバッチ番号で割るか
    #[config(default = false)]
    pub legacy_batch_index_average: bool,
}

/// 1エポック分のチャンネル別損失の集計結果。
struct EpochComponents {
    cost: f32,
    component: Vec<f32>,
    d_component: Vec<f32>,
}

/// 学習ループ本体。モデルとオプティマイザを所有し、パラメータを更新するのは `train_epoch` だけです。
pub struct Trainer<B: AutodiffBackend, O: Optimizer<Model<B>, B>> {
    model: Model<B>,
    optim: O,
    config: TrainingConfig,
    loss: PinnLoss,
    nnuc: usize,
    device: B::Device,
    rng: StdRng,
}

impl<B: AutodiffBackend, O: Optimizer<Model<B>, B>> Trainer<B, O> {
    pub fn new(model: Model<B>, optim: O, config: TrainingConfig, nnuc: usize, device: B::Device) -> Self {
        let loss = PinnLoss::new(nnuc, config.include_relative_loss);
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            model,
            optim,
            config,
            loss,
            nnuc,
            device,
            rng,
        }
    }

    /// 全エポックを実行し、学習済みモデルと損失履歴を返します。
    pub fn fit(
        mut self,
        train: &[ReactSample],
        test: &[ReactSample],
    ) -> Result<(Model<B>, LossHistory), PinnError> {
        let mut history = LossHistory::default();
        let evaluate = self.config.evaluate && !test.is_empty();
        if self.config.evaluate && test.is_empty() {
            warn!("テストデータが空のため評価をスキップします");
        }

        for epoch in 0..self.config.num_epochs {
            self.train_epoch(epoch, train, &mut history)?;

            if evaluate {
                let result = self.evaluate(test)?;
                history.cost_per_epoch_test.push(result.cost);
                history.component_losses_test.push(result.component);
                history.d_component_losses_test.push(result.d_component);
            }
        }

        Ok((self.model, history))
    }

    fn train_epoch(
        &mut self,
        epoch: usize,
        train: &[ReactSample],
        history: &mut LossHistory,
    ) -> Result<(), PinnError> {
        let k = self.nnuc + 1;
        let mut order: Vec<usize> = (0..train.len()).collect();
        order.shuffle(&mut self.rng);

        let mut losses = Vec::new();
        let mut plotting_losses = Vec::new();
        let mut breakdowns = BreakdownAccumulator::default();
        let mut component = ComponentAccumulator::new(k);
        let mut d_component = ComponentAccumulator::new(k);

        for (batch_idx, indices) in order.chunks(self.config.batch_size.max(1)).enumerate() {
            let samples: Vec<&ReactSample> = indices.iter().map(|&i| &train[i]).collect();
            let batch = ReactBatch::<B>::from_samples(&samples, &self.device);

            let d_xdt = Tensor::<B, 2>::from_inner(time_derivatives(
                &self.model,
                batch.inputs.clone(),
                k,
            )?);
            // 微分に使ったグラフは消費済みなので、損失用に改めて順伝播する
            let prediction = self.model.forward(batch.inputs.clone());

            let output = self
                .loss
                .forward(prediction.clone(), d_xdt.clone(), batch.targets.clone());
            let loss_value = output.total.clone().into_scalar().elem::<f32>();
            if !loss_value.is_finite() {
                return Err(PinnError::NonFiniteLoss {
                    epoch,
                    batch: batch_idx,
                });
            }
            losses.push(loss_value);
            breakdowns.add(&output.breakdown);

            let grads = output.total.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = self
                .optim
                .step(self.config.learning_rate, self.model.clone(), grads);

            // ここから先はログ用で、学習には影響しない
            let prediction = prediction.inner();
            let targets = batch.targets.inner();
            plotting_losses.push(plotting_loss(prediction.clone(), targets.clone(), self.nnuc));
            let (state_targets, rate_targets) = split_targets(targets, self.nnuc);
            component.add(&component_loss(prediction, state_targets));
            d_component.add(&component_loss_l1(d_xdt.inner(), rate_targets));
        }

        info!("Cost at epoch {} is {}", epoch, mean(&losses));
        history.cost_per_epoch.push(mean(&plotting_losses));
        let legacy = self.config.legacy_batch_index_average;
        history.component_losses_train.push(component.average(legacy));
        history.d_component_losses_train.push(d_component.average(legacy));
        history.loss_metrics.push(breakdowns.mean());
        Ok(())
    }

    /// テストデータで評価します。微分のために勾配は追跡しますが、オプティマイザには触れません。
    fn evaluate(&mut self, test: &[ReactSample]) -> Result<EpochComponents, PinnError> {
        let k = self.nnuc + 1;
        let mut order: Vec<usize> = (0..test.len()).collect();
        order.shuffle(&mut self.rng);

        let mut plotting_losses = Vec::new();
        let mut component = ComponentAccumulator::new(k);
        let mut d_component = ComponentAccumulator::new(k);

        for indices in order.chunks(self.config.batch_size.max(1)) {
            let samples: Vec<&ReactSample> = indices.iter().map(|&i| &test[i]).collect();
            let batch = ReactBatch::<B>::from_samples(&samples, &self.device);

            let d_xdt = time_derivatives(&self.model, batch.inputs.clone(), k)?;
            let prediction = self.model.forward(batch.inputs).inner();
            let targets = batch.targets.inner();
            plotting_losses.push(plotting_loss(prediction.clone(), targets.clone(), self.nnuc));
            let (state_targets, rate_targets) = split_targets(targets, self.nnuc);
            component.add(&component_loss(prediction, state_targets));
            d_component.add(&component_loss_l1(d_xdt, rate_targets));
        }

        let legacy = self.config.legacy_batch_index_average;
        Ok(EpochComponents {
            cost: mean(&plotting_losses),
            component: component.average(legacy),
            d_component: d_component.average(legacy),
        })
    }
}

fn mean(values: &[f32]) -> f32 {
    values.iter().sum::<f32>() / values.len().max(1) as f32
}

/// 設定されたオプティマイザで学習します。
pub fn train<B: AutodiffBackend>(
    model: Model<B>,
    config: TrainingConfig,
    nnuc: usize,
    train: &[ReactSample],
    test: &[ReactSample],
    device: B::Device,
) -> Result<(Model<B>, LossHistory), PinnError> {
    match config.optimizer {
        OptimizerKind::Adam => {
            Trainer::new(model, AdamConfig::new().init(), config, nnuc, device).fit(train, test)
        }
        OptimizerKind::RmsProp => {
            Trainer::new(model, RmsPropConfig::new().init(), config, nnuc, device).fit(train, test)
        }
        OptimizerKind::Sgd => {
            Trainer::new(model, SgdConfig::new().init(), config, nnuc, device).fit(train, test)
        }
    }
}

/// 出力ディレクトリが空でなければ何もせずにエラーを返し、存在しなければ作成します。
pub fn prepare_output_dir(output_dir: &Path) -> Result<(), PinnError> {
    if output_dir.is_dir() && fs::read_dir(output_dir)?.next().is_some() {
        return Err(PinnError::OutputDirNotEmpty(output_dir.to_path_buf()));
    }
    fs::create_dir_all(output_dir)?;
    Ok(())
}

/// `train`サブコマンドを実行します。
pub fn run(args: &TrainArgs) -> Result<(), PinnError> {
    let config = args.to_config()?;
    let output_dir = args.output_dir.as_path();
    prepare_output_dir(output_dir)?;

    let session = LogSession::init(&output_dir.join(LOG_FILENAME))?;
    let result = run_session(args, config, output_dir);
    if let Err(e) = &result {
        tracing::error!("{}", e);
    }
    session.shutdown();
    result
}

fn run_session(args: &TrainArgs, config: TrainingConfig, output_dir: &Path) -> Result<(), PinnError> {
    let device = Default::default();

    info!("学習を開始します - バックエンド: NdArray (CPU)");
    info!("data_dir {}", args.data_dir.display());
    info!("input_prefix {}", args.input_prefix);
    info!("output_prefix {}", args.output_prefix);
    info!("output_dir {}", output_dir.display());
    info!("DEBUG_MODE {}", args.debug);
    info!("DO_PLOTTING {}", config.evaluate);
    info!("SAVE_MODEL {}", !args.no_save);
    info!("config {}", config);

    let mut dataset = ReactDataset::load(&args.data_dir, &args.input_prefix, &args.output_prefix)?;
    let nnuc = dataset.nnuc();
    info!(
        "{} 個の出力ファイルから {} サンプルを読み込みました (nnuc = {})",
        dataset.output_files().len(),
        dataset.samples().len(),
        nnuc
    );

    let factors = NormFactors::from_dataset(&dataset);
    factors.apply(&mut dataset);
    info!(
        "正規化係数: dens {:e}, temp {:e}, enuc {:e}, enuc_dot {:e}",
        factors.dens, factors.temp, factors.enuc, factors.enuc_dot
    );

    let model_config = ModelConfig::new(dataset.input_width(), nnuc + 1)
        .with_hidden_sizes(config.hidden_sizes.clone());
    let mut rng = StdRng::seed_from_u64(config.seed);
    let (train_set, test_set) = dataset.random_split(config.percent_test, &mut rng);
    info!("学習データ {} 件, テストデータ {} 件", train_set.len(), test_set.len());

    let model = model_config.init::<MyBackend>(&device);
    info!("オプティマイザ: {}, 学習率 {:e}", config.optimizer.name(), config.learning_rate);

    let training_start = Instant::now();
    let (model, history) = train(model, config.clone(), nnuc, &train_set, &test_set, device)?;
    info!("学習が完了しました。");
    info!("=> 学習時間: {:.2?}", training_start.elapsed());

    if !args.no_save {
        info!("保存中...");
        save_checkpoint(model, &checkpoint_path(output_dir))?;
        history.save(output_dir)?;
        config.save(output_dir.join(CONFIG_FILENAME))?;
        model_config.save(output_dir.join(MODEL_CONFIG_FILENAME))?;
        factors.save(output_dir.join(NORM_FILENAME))?;
    }

    if config.evaluate {
        let graph_path = output_dir.join(LOSS_GRAPH_FILENAME);
        match plot_loss_history(&graph_path, &history.cost_per_epoch, &history.cost_per_epoch_test) {
            Ok(()) => info!("=> 損失グラフを '{}' に保存しました。", graph_path.display()),
            Err(e) => warn!("グラフの描画に失敗しました: {}", e),
        }
    }

    info!("Success! :)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn samples(n: usize) -> Vec<ReactSample> {
        (0..n)
            .map(|i| {
                let x = 0.1 + 0.05 * (i % 5) as f32;
                ReactSample {
                    input: vec![1.0, x, 1.0 - x, 0.5, 0.8],
                    output: vec![x * 0.9, 1.0 - x * 0.9, 0.3, -0.1, 0.1, 0.5],
                }
            })
            .collect()
    }

    fn config() -> TrainingConfig {
        TrainingConfig::new()
            .with_num_epochs(2)
            .with_batch_size(4)
            .with_hidden_sizes(vec![8])
            .with_learning_rate(1e-3)
    }

    #[test]
    fn histories_have_one_row_per_epoch() {
        let device = Default::default();
        let nnuc = 2;
        let model = ModelConfig::new(5, 3).with_hidden_sizes(vec![8]).init::<TestBackend>(&device);
        let data = samples(10);
        let (model_out, history) = train(model, config(), nnuc, &data[..8], &data[8..], device).unwrap();

        assert_eq!(history.cost_per_epoch.len(), 2);
        assert_eq!(history.cost_per_epoch_test.len(), 2);
        assert_eq!(history.loss_metrics.len(), 2);
        for rows in [
            &history.component_losses_train,
            &history.component_losses_test,
            &history.d_component_losses_train,
            &history.d_component_losses_test,
        ] {
            assert_eq!(rows.len(), 2);
            assert!(rows.iter().all(|row| row.len() == nnuc + 1));
        }
        assert_eq!(model_out.forward(Tensor::zeros([1, 5], &Default::default())).dims(), [1, 3]);
    }

    #[test]
    fn every_optimizer_kind_trains() {
        for kind in [OptimizerKind::Adam, OptimizerKind::RmsProp, OptimizerKind::Sgd] {
            let device = Default::default();
            let model = ModelConfig::new(5, 3).with_hidden_sizes(vec![4]).init::<TestBackend>(&device);
            let data = samples(6);
            let (_, history) =
                train(model, config().with_optimizer(kind), 2, &data, &[], device).unwrap();
            assert_eq!(history.cost_per_epoch.len(), 2);
            assert!(history.cost_per_epoch_test.is_empty());
        }
    }

    #[test]
    fn non_finite_loss_stops_training() {
        let device = Default::default();
        let model = ModelConfig::new(5, 3).with_hidden_sizes(vec![4]).init::<TestBackend>(&device);
        let mut data = samples(4);
        data[0].output[3] = f32::NAN;

        let result = train(model, config(), 2, &data, &[], device);
        assert!(matches!(
            result,
            Err(PinnError::NonFiniteLoss { epoch: 0, batch: 0 })
        ));
    }

    #[test]
    fn output_dir_with_files_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.txt"), "keep").unwrap();
        assert!(matches!(
            prepare_output_dir(dir.path()),
            Err(PinnError::OutputDirNotEmpty(_))
        ));

        let empty = dir.path().join("new");
        prepare_output_dir(&empty).unwrap();
        assert!(empty.is_dir());
        prepare_output_dir(&empty).unwrap();
    }
}

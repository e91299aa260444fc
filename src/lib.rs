//! # 反応ネットワーク PINN ライブラリ
//!
//! `burn` フレームワークを使用して、天体物理の火炎シミュレーションで使う核反応ネットワークの
//! 時間発展を近似する物理情報ニューラルネットワーク（PINN）を学習します。
//!
//! セルの初期組成・密度・温度からステップ後の組成を予測し、その時間微分 (反応率) を
//! 自動微分で求め、質量保存や反応率の符号といった物理的な制約を損失に加えます。

pub mod cli;
pub mod dataset;
pub mod error;
pub mod inference;
pub mod logging;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod optim;
pub mod pinn;
pub mod plot;
pub mod training;

/// モデルを保存するファイル名
pub const MODEL_FILENAME: &str = "my_model_pinn.mpk";
pub const LOG_FILENAME: &str = "log.txt";
pub const CONFIG_FILENAME: &str = "config.json";
pub const MODEL_CONFIG_FILENAME: &str = "model_config.json";
pub const NORM_FILENAME: &str = "norm_factors.json";
pub const LOSS_GRAPH_FILENAME: &str = "loss_graph.png";

// 損失履歴のファイル名
pub const COST_PER_EPOCH: &str = "cost_per_epoch.txt";
pub const COST_PER_EPOCH_TEST: &str = "cost_per_epoch_test.txt";
pub const COMPONENT_LOSSES_TEST: &str = "component_losses_test.txt";
pub const COMPONENT_LOSSES_TRAIN: &str = "component_losses_train.txt";
pub const D_COMPONENT_LOSSES_TEST: &str = "d_component_losses_test.txt";
pub const D_COMPONENT_LOSSES_TRAIN: &str = "d_component_losses_train.txt";
pub const LOSS_METRICS: &str = "loss_metrics.txt";

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::error::PinnError;
use crate::optim::OptimizerKind;
use crate::training::TrainingConfig;

/// デバッグモードでのエポック数
const DEBUG_EPOCHS: usize = 3;

/// clapでコマンドラインの構造を定義します。
#[derive(Parser, Debug)]
#[command(author, version, about = "A physics-informed neural network for nuclear reaction networks, built with Burn", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 実行するサブコマンドを定義します（train または infer）。
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// PINNモデルを学習し、結果をファイルに保存します
    Train(TrainArgs),
    /// 保存されたPINNモデルを使い、推論を実行します
    Infer(InferArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// 反応データのディレクトリ
    #[arg(long, default_value = "data/data3/flame")]
    pub data_dir: PathBuf,
    /// 入力ファイル名の接頭辞
    #[arg(long, default_value = "react_inputs_*")]
    pub input_prefix: String,
    /// 出力ファイル名の接頭辞
    #[arg(long, default_value = "react_outputs_*")]
    pub output_prefix: String,
    /// 結果を書き出すディレクトリ。空でなければ実行を拒否します
    #[arg(long, default_value = "fix_plot")]
    pub output_dir: PathBuf,
    /// エポック数を3に減らして動作確認します
    #[arg(long)]
    pub debug: bool,
    /// テストデータでの評価と損失グラフの描画を行いません
    #[arg(long)]
    pub no_plot: bool,
    /// モデルと損失履歴を保存しません
    #[arg(long)]
    pub no_save: bool,
    /// adam, rmsprop, sgd
    #[arg(long, default_value = "adam")]
    pub optimizer: String,
    #[arg(long)]
    pub learning_rate: Option<f64>,
    /// エポック数 (--debug より優先)
    #[arg(long)]
    pub epochs: Option<usize>,
    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl TrainArgs {
    /// コマンドライン引数から学習設定を組み立てます。
    pub fn to_config(&self) -> Result<TrainingConfig, PinnError> {
        let optimizer: OptimizerKind = self.optimizer.parse()?;
        let mut config = TrainingConfig::new()
            .with_optimizer(optimizer)
            .with_batch_size(self.batch_size)
            .with_seed(self.seed)
            .with_evaluate(!self.no_plot);

        if self.debug {
            config = config.with_num_epochs(DEBUG_EPOCHS);
        }
        if let Some(epochs) = self.epochs {
            config = config.with_num_epochs(epochs);
        }
        if let Some(learning_rate) = self.learning_rate {
            config = config.with_learning_rate(learning_rate);
        }
        Ok(config)
    }
}

#[derive(Args, Debug, Clone)]
pub struct InferArgs {
    /// `train` の出力ディレクトリ
    #[arg(long, default_value = "fix_plot")]
    pub model_dir: PathBuf,
    /// 入力ファイル (学習データと同じ形式)
    #[arg(long)]
    pub input: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> TrainArgs {
        let cli = Cli::parse_from(std::iter::once("react-pinn").chain(args.iter().copied()));
        match cli.command {
            Commands::Train(args) => args,
            Commands::Infer(_) => panic!("expected train"),
        }
    }

    #[test]
    fn debug_mode_runs_three_epochs() {
        let config = parse(&["train", "--debug"]).to_config().unwrap();
        assert_eq!(config.num_epochs, 3);
        assert_eq!(config.optimizer, OptimizerKind::Adam);

        let config = parse(&["train"]).to_config().unwrap();
        assert_eq!(config.num_epochs, 100);
        assert_eq!(config.learning_rate, 1e-6);
        assert_eq!(config.batch_size, 16);
    }

    #[test]
    fn unsupported_optimizer_is_reported() {
        let result = parse(&["train", "--optimizer", "adagrad"]).to_config();
        assert!(matches!(result, Err(PinnError::UnsupportedOptimizer(_))));
    }

    #[test]
    fn no_plot_disables_evaluation() {
        let config = parse(&["train", "--no-plot", "--optimizer", "SGD"]).to_config().unwrap();
        assert!(!config.evaluate);
        assert_eq!(config.optimizer, OptimizerKind::Sgd);
    }
}

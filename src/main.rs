//! # 反応ネットワーク PINN
//!
//! `clap` クレートを利用して、コマンドラインから`train`（学習）と`infer`（推論）の
//! 機能を個別に実行できます。
//!
//! ## 使い方
//!
//! ### 学習
//! ```bash
//! cargo run --release -- train --data-dir data/data3/flame --output-dir fix_plot
//! ```
//!
//! ### 推論
//! ```bash
//! cargo run --release -- infer --model-dir fix_plot --input inputs.txt
//! ```

use clap::Parser;
use react_pinn::cli::{Cli, Commands};
use react_pinn::{inference, training};

/// プログラムのエントリーポイント。
///
/// コマンドライン引数を解析し、`train`または`infer`の処理に振り分けます。
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Train(args) => training::run(args)?,
        Commands::Infer(args) => {
            tracing_subscriber::fmt().with_target(false).init();
            inference::run(args)?;
        }
    }
    Ok(())
}

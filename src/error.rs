use std::path::PathBuf;

use burn::record::RecorderError;

/// 学習・推論ドライバ全体で使うエラー型。
#[derive(Debug, thiserror::Error)]
pub enum PinnError {
    /// 出力ディレクトリが既に存在し、空ではない。
    #[error(
        "ディレクトリ '{0}' は既に存在し、空ではありません。上書きを防ぐため output_dir を変更するか削除してください。"
    )]
    OutputDirNotEmpty(PathBuf),
    #[error("未対応のオプティマイザです: '{0}' (adam, rmsprop, sgd のいずれかを指定してください)")]
    UnsupportedOptimizer(String),
    #[error("データセットエラー: {0}")]
    Dataset(String),
    /// 損失が NaN または無限大になった。
    #[error("エポック {epoch} のバッチ {batch} で損失が有限値ではなくなりました")]
    NonFiniteLoss { epoch: usize, batch: usize },
    /// 予測が入力に依存しておらず、時間微分を取れない。
    #[error("入力に対する勾配がありません (モデルの出力が入力に依存していません)")]
    NoInputGradient,
    #[error(
        "モデルファイル '{0}' が見つかりません。最初に 'train' コマンドでモデルを学習・保存してください。"
    )]
    ModelNotFound(PathBuf),
    #[error("設定ファイルの読み込みに失敗しました: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::info;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

use crate::error::PinnError;

/// 実行中のログをコンソールとログファイルの両方へ書き出すセッション。
///
/// `init` から `shutdown` までの間、このスレッドで出力したログはすべて
/// 標準出力と追記モードのログファイルに複製されます。
pub struct LogSession {
    path: PathBuf,
    _guard: DefaultGuard,
}

impl LogSession {
    pub fn init(log_path: &Path) -> Result<Self, PinnError> {
        let file = OpenOptions::new().create(true).append(true).open(log_path)?;

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let stdout_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);
        let file_layer = fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file));

        let subscriber = Registry::default()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer);
        let guard = tracing::subscriber::set_default(subscriber);

        Ok(Self {
            path: log_path.to_path_buf(),
            _guard: guard,
        })
    }

    /// ログファイルを閉じます。
    pub fn shutdown(self) {
        info!("ログを '{}' に保存しました。", self.path.display());
    }
}

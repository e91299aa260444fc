//! # 学習履歴と保存
//!
//! エポックごとの損失履歴を蓄積し、学習終了後に空白区切りのテキストファイルと
//! モデルのチェックポイントを書き出します。

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use tracing::info;

use crate::error::PinnError;
use crate::loss::LossBreakdown;
use crate::{
    COMPONENT_LOSSES_TEST, COMPONENT_LOSSES_TRAIN, COST_PER_EPOCH, COST_PER_EPOCH_TEST,
    D_COMPONENT_LOSSES_TEST, D_COMPONENT_LOSSES_TRAIN, LOSS_METRICS, MODEL_FILENAME,
};

/// エポックごとに1要素ずつ追加される損失履歴。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LossHistory {
    /// 学習データに対するプロット用損失の平均
    pub cost_per_epoch: Vec<f32>,
    /// テストデータに対するプロット用損失の平均
    pub cost_per_epoch_test: Vec<f32>,
    pub component_losses_train: Vec<Vec<f32>>,
    pub component_losses_test: Vec<Vec<f32>>,
    pub d_component_losses_train: Vec<Vec<f32>>,
    pub d_component_losses_test: Vec<Vec<f32>>,
    /// 損失の内訳 (`LossBreakdown`) のバッチ平均
    pub loss_metrics: Vec<[f32; LossBreakdown::LEN]>,
}

impl LossHistory {
    /// すべての履歴を `output_dir` に書き出します。
    pub fn save(&self, output_dir: &Path) -> Result<(), PinnError> {
        write_vector(&output_dir.join(COST_PER_EPOCH), &self.cost_per_epoch)?;
        write_vector(&output_dir.join(COST_PER_EPOCH_TEST), &self.cost_per_epoch_test)?;
        write_matrix(&output_dir.join(COMPONENT_LOSSES_TEST), &self.component_losses_test)?;
        write_matrix(&output_dir.join(COMPONENT_LOSSES_TRAIN), &self.component_losses_train)?;
        write_matrix(&output_dir.join(D_COMPONENT_LOSSES_TEST), &self.d_component_losses_test)?;
        write_matrix(&output_dir.join(D_COMPONENT_LOSSES_TRAIN), &self.d_component_losses_train)?;
        write_matrix(&output_dir.join(LOSS_METRICS), &self.loss_metrics)?;
        Ok(())
    }
}

/// バッチごとのチャンネル別損失を合計し、エポック末に平均します。
#[derive(Debug, Clone)]
pub struct ComponentAccumulator {
    sum: Vec<f32>,
    batches: usize,
}

impl ComponentAccumulator {
    pub fn new(width: usize) -> Self {
        Self {
            sum: vec![0.0; width],
            batches: 0,
        }
    }

    pub fn add(&mut self, values: &[f32]) {
        for (acc, v) in self.sum.iter_mut().zip(values) {
            *acc += v;
        }
        self.batches += 1;
    }

    /// バッチ数で割った平均。
    ///
    /// `legacy_batch_index` が真の場合は、最後に処理したバッチの番号 (バッチ数 - 1) で割ります。
    /// 以前の実行結果と数値を揃えるためのもので、バッチが1つのときは 0 で割ることになります。
    pub fn average(&self, legacy_batch_index: bool) -> Vec<f32> {
        let divisor = if legacy_batch_index {
            self.batches.saturating_sub(1)
        } else {
            self.batches
        } as f32;
        self.sum.iter().map(|v| v / divisor).collect()
    }
}

/// 損失の内訳をエポック単位で平均します。
#[derive(Debug, Clone, Default)]
pub struct BreakdownAccumulator {
    sum: [f32; LossBreakdown::LEN],
    count: usize,
}

impl BreakdownAccumulator {
    pub fn add(&mut self, breakdown: &LossBreakdown) {
        for (acc, v) in self.sum.iter_mut().zip(breakdown.to_array()) {
            *acc += v;
        }
        self.count += 1;
    }

    pub fn mean(&self) -> [f32; LossBreakdown::LEN] {
        let count = self.count.max(1) as f32;
        self.sum.map(|v| v / count)
    }
}

pub fn checkpoint_path(output_dir: &Path) -> PathBuf {
    output_dir.join(MODEL_FILENAME)
}

/// 学習済みパラメータを保存します。
///
/// 既にファイルがある場合は `<path>.backup` に名前を変えてから書き込みます。
pub fn save_checkpoint<B: Backend, M: Module<B>>(model: M, path: &Path) -> Result<(), PinnError> {
    if path.exists() {
        let mut backup = path.as_os_str().to_owned();
        backup.push(".backup");
        info!("既存のファイルを上書きします: {}", path.display());
        fs::rename(path, &backup)?;
    }

    model.save_file(
        path.to_path_buf(),
        &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
    )?;
    info!("=> モデルを '{}' に保存しました。", path.display());
    Ok(())
}

/// 1次元配列を1行1要素で書き出します。
pub fn write_vector(path: &Path, values: &[f32]) -> Result<(), PinnError> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    for v in values {
        writeln!(writer, "{:.18e}", v)?;
    }
    writer.flush()?;
    Ok(())
}

/// 2次元配列を1行1エポックで書き出します。
pub fn write_matrix<R: AsRef<[f32]>>(path: &Path, rows: &[R]) -> Result<(), PinnError> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    for row in rows {
        let line = row
            .as_ref()
            .iter()
            .map(|v| format!("{:.18e}", v))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(writer, "{}", line)?;
    }
    writer.flush()?;
    Ok(())
}

//! # 反応データセット
//!
//! 反応ネットワークの入力 (`dt`, 質量分率, 密度, 温度) と出力
//! (ステップ後の状態とその時間微分) の組を、空白区切りのテキスト行列から読み込みます。

use std::fs;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::PinnError;

/// 1サンプル分の入力特徴量と教師データ。
#[derive(Debug, Clone, PartialEq)]
pub struct ReactSample {
    /// `[dt, X_1..X_nnuc, 密度, 温度]`
    pub input: Vec<f32>,
    /// `[X_1..X_nnuc, enuc, dX_1/dt..dX_nnuc/dt, denuc/dt]`
    pub output: Vec<f32>,
}

/// 出力チャンネル幅から核種数 `nnuc` を求めます。
///
/// 出力は状態 `nnuc+1` チャンネルとその時間微分 `nnuc+1` チャンネルで構成されるため、
/// 幅は4以上の偶数でなければなりません。
pub fn nnuc_from_output_width(output_width: usize) -> Result<usize, PinnError> {
    if output_width < 4 || output_width % 2 != 0 {
        return Err(PinnError::Dataset(format!(
            "出力チャンネル幅 {} は4以上の偶数である必要があります",
            output_width
        )));
    }
    Ok(output_width / 2 - 1)
}

/// 全サンプルが同じチャンネル構成を持つ反応データセット。
#[derive(Debug, Clone)]
pub struct ReactDataset {
    samples: Vec<ReactSample>,
    nnuc: usize,
    output_files: Vec<PathBuf>,
}

impl ReactDataset {
    /// サンプル列からデータセットを構築し、チャンネル構成を検証します。
    pub fn from_samples(samples: Vec<ReactSample>) -> Result<Self, PinnError> {
        let first = samples
            .first()
            .ok_or_else(|| PinnError::Dataset("サンプルが1つもありません".to_string()))?;
        let nnuc = nnuc_from_output_width(first.output.len())?;
        let input_width = nnuc + 3;
        let output_width = first.output.len();

        for (i, sample) in samples.iter().enumerate() {
            if sample.input.len() != input_width || sample.output.len() != output_width {
                return Err(PinnError::Dataset(format!(
                    "サンプル {} の形状 ({}, {}) が期待値 ({}, {}) と一致しません",
                    i,
                    sample.input.len(),
                    sample.output.len(),
                    input_width,
                    output_width
                )));
            }
        }

        Ok(Self {
            samples,
            nnuc,
            output_files: Vec::new(),
        })
    }

    /// `data_dir` 以下の入力・出力ファイル群を読み込みます。
    ///
    /// ファイル名がそれぞれ `input_prefix`, `output_prefix` で始まるものを名前順に並べ、
    /// 同じ順番同士を組にします。接頭辞末尾の `*` は無視されます。
    pub fn load(data_dir: &Path, input_prefix: &str, output_prefix: &str) -> Result<Self, PinnError> {
        let input_files = list_files(data_dir, input_prefix)?;
        let output_files = list_files(data_dir, output_prefix)?;

        if input_files.is_empty() {
            return Err(PinnError::Dataset(format!(
                "'{}' に '{}' で始まるファイルがありません",
                data_dir.display(),
                input_prefix
            )));
        }
        if input_files.len() != output_files.len() {
            return Err(PinnError::Dataset(format!(
                "入力ファイル数 {} と出力ファイル数 {} が一致しません",
                input_files.len(),
                output_files.len()
            )));
        }

        let mut samples = Vec::new();
        for (input_file, output_file) in input_files.iter().zip(&output_files) {
            let inputs = read_matrix(input_file)?;
            let outputs = read_matrix(output_file)?;
            if inputs.len() != outputs.len() {
                return Err(PinnError::Dataset(format!(
                    "'{}' ({} 行) と '{}' ({} 行) の行数が一致しません",
                    input_file.display(),
                    inputs.len(),
                    output_file.display(),
                    outputs.len()
                )));
            }
            samples.extend(
                inputs
                    .into_iter()
                    .zip(outputs)
                    .map(|(input, output)| ReactSample { input, output }),
            );
        }

        let mut dataset = Self::from_samples(samples)?;
        dataset.output_files = output_files;
        Ok(dataset)
    }

    pub fn nnuc(&self) -> usize {
        self.nnuc
    }

    pub fn input_width(&self) -> usize {
        self.nnuc + 3
    }

    pub fn samples(&self) -> &[ReactSample] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [ReactSample] {
        &mut self.samples
    }

    /// 読み込んだ出力ファイルの一覧。
    pub fn output_files(&self) -> &[PathBuf] {
        &self.output_files
    }

    /// データセットを一度だけランダムに学習用・テスト用へ分割します。
    pub fn random_split<R: Rng + ?Sized>(
        self,
        percent_test: usize,
        rng: &mut R,
    ) -> (Vec<ReactSample>, Vec<ReactSample>) {
        let (num_train, _) = split_sizes(self.samples.len(), percent_test);
        let mut samples = self.samples;
        samples.shuffle(rng);
        let test = samples.split_off(num_train);
        (samples, test)
    }
}

/// `(Num_train, Num_test)` を返します。`Num_test = floor(N * percent / 100)`。
///
/// 100 を超える割合は 100 として扱います。
pub fn split_sizes(n: usize, percent_test: usize) -> (usize, usize) {
    let num_test = n * percent_test.min(100) / 100;
    (n - num_test, num_test)
}

/// 学習ループが扱う1バッチ分のテンソル。
#[derive(Debug, Clone)]
pub struct ReactBatch<B: Backend> {
    pub inputs: Tensor<B, 2>,
    pub targets: Tensor<B, 2>,
}

impl<B: Backend> ReactBatch<B> {
    /// 指定したサンプル群を行方向に積み重ねてバッチを作ります。
    pub fn from_samples(samples: &[&ReactSample], device: &B::Device) -> Self {
        let n = samples.len();
        let input_width = samples.first().map_or(0, |s| s.input.len());
        let output_width = samples.first().map_or(0, |s| s.output.len());

        let inputs: Vec<f32> = samples.iter().flat_map(|s| s.input.iter().copied()).collect();
        let targets: Vec<f32> = samples.iter().flat_map(|s| s.output.iter().copied()).collect();

        Self {
            inputs: Tensor::from_data(TensorData::new(inputs, [n, input_width]), device),
            targets: Tensor::from_data(TensorData::new(targets, [n, output_width]), device),
        }
    }
}

fn list_files(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, PinnError> {
    let prefix = prefix.trim_end_matches('*');
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(prefix));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// 空白区切りの数値行列を読み込みます。空行と `#` で始まる行は読み飛ばします。
pub(crate) fn read_matrix(path: &Path) -> Result<Vec<Vec<f32>>, PinnError> {
    let text = fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .split_whitespace()
            .map(|token| token.parse::<f32>())
            .collect::<Result<Vec<f32>, _>>()
            .map_err(|e| {
                PinnError::Dataset(format!("{}:{}: {}", path.display(), line_no + 1, e))
            })?;
        rows.push(row);
    }
    Ok(rows)
}

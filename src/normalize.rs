use burn::config::Config;
use tracing::warn;

use crate::dataset::{ReactDataset, ReactSample};

/// データセット全体の最大値から求めた正規化係数。
///
/// 分割前に一度だけ計算し、学習・テスト・推論のすべてで同じ値を使います。
#[derive(Config, Debug, PartialEq)]
pub struct NormFactors {
    /// 密度
    pub dens: f32,
    /// 温度
    pub temp: f32,
    /// エネルギー生成量 enuc
    pub enuc: f32,
    /// エネルギー生成率 d(enuc)/dt
    pub enuc_dot: f32,
}

impl NormFactors {
    /// 全サンプルを走査して各チャンネルの最大値を求めます。
    pub fn from_dataset(dataset: &ReactDataset) -> Self {
        let nnuc = dataset.nnuc();
        let samples = dataset.samples();
        let max_of = |name: &str, pick: &dyn Fn(&ReactSample) -> f32| {
            let max = samples.iter().map(pick).fold(f32::NEG_INFINITY, f32::max);
            if max == 0.0 || !max.is_finite() {
                warn!("{} の最大値が {} のため正規化しません", name, max);
                1.0
            } else {
                max
            }
        };

        Self::new(
            max_of("density", &|s| s.input[nnuc + 1]),
            max_of("temperature", &|s| s.input[nnuc + 2]),
            max_of("enuc", &|s| s.output[nnuc]),
            max_of("enuc_dot", &|s| s.output[2 * (nnuc + 1) - 1]),
        )
    }

    /// 入力の密度・温度チャンネルを正規化します。
    pub fn normalize_input(&self, input: &mut [f32], nnuc: usize) {
        input[nnuc + 1] /= self.dens;
        input[nnuc + 2] /= self.temp;
    }

    /// 出力の enuc と enuc の時間微分チャンネルを正規化します。
    pub fn normalize_output(&self, output: &mut [f32], nnuc: usize) {
        output[nnuc] /= self.enuc;
        output[2 * (nnuc + 1) - 1] /= self.enuc_dot;
    }

    pub fn apply(&self, dataset: &mut ReactDataset) {
        let nnuc = dataset.nnuc();
        for sample in dataset.samples_mut() {
            self.normalize_input(&mut sample.input, nnuc);
            self.normalize_output(&mut sample.output, nnuc);
        }
    }
}

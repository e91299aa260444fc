use std::path::Path;
use std::time::Instant;

use burn::backend::{Autodiff, NdArray};
use burn::config::Config;
use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::{Tensor, TensorData};
use tracing::info;

use crate::cli::InferArgs;
use crate::dataset::read_matrix;
use crate::error::PinnError;
use crate::metrics::checkpoint_path;
use crate::model::{Model, ModelConfig};
use crate::normalize::NormFactors;
use crate::pinn::time_derivatives;
use crate::{MODEL_CONFIG_FILENAME, NORM_FILENAME};

type MyBackend = Autodiff<NdArray<f32>>;

/// 1サンプル分の推論結果。どちらも物理単位です。
///
/// 質量分率と時間刻みは正規化しないので、質量分率とその時間微分はそのままの値です。
/// enuc は `NormFactors::enuc` を、enuc の時間微分は学習時の教師データに合わせて
/// `NormFactors::enuc_dot` を掛けて戻します。
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// `[X_1..X_nnuc, enuc]`
    pub state: Vec<f32>,
    /// `[dX_1/dt..dX_nnuc/dt, denuc/dt]`
    pub rates: Vec<f32>,
}

/// 学習済みモデルと学習時の正規化係数の組。
pub struct Predictor {
    model: Model<MyBackend>,
    factors: NormFactors,
    nnuc: usize,
}

impl Predictor {
    /// `train` の出力ディレクトリからモデル構成・正規化係数・重みを読み込みます。
    pub fn load(model_dir: &Path) -> Result<Self, PinnError> {
        let model_file = checkpoint_path(model_dir);
        if !model_file.exists() {
            return Err(PinnError::ModelNotFound(model_file));
        }

        let model_config = ModelConfig::load(model_dir.join(MODEL_CONFIG_FILENAME))
            .map_err(|e| PinnError::Config(e.to_string()))?;
        let factors = NormFactors::load(model_dir.join(NORM_FILENAME))
            .map_err(|e| PinnError::Config(e.to_string()))?;

        let device = Default::default();
        info!("保存済みモデルを '{}' からロード中...", model_file.display());
        let model = model_config.init::<MyBackend>(&device).load_file(
            model_file,
            &NamedMpkFileRecorder::<FullPrecisionSettings>::new(),
            &device,
        )?;

        Ok(Self {
            model,
            factors,
            nnuc: model_config.d_output - 1,
        })
    }

    /// 正規化前の入力行 `[dt, X_1..X_nnuc, 密度, 温度]` から状態と反応率を予測します。
    pub fn predict(&self, rows: &[Vec<f32>]) -> Result<Vec<Prediction>, PinnError> {
        let nnuc = self.nnuc;
        let width = nnuc + 3;
        let k = nnuc + 1;

        let mut values = Vec::with_capacity(rows.len() * width);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(PinnError::Dataset(format!(
                    "入力 {} 行目の幅 {} が期待値 {} と一致しません",
                    i + 1,
                    row.len(),
                    width
                )));
            }
            let mut row = row.clone();
            self.factors.normalize_input(&mut row, nnuc);
            values.extend(row);
        }

        let device = Default::default();
        let inputs =
            Tensor::<MyBackend, 2>::from_data(TensorData::new(values, [rows.len(), width]), &device);
        let d_xdt = time_derivatives(&self.model, inputs.clone(), k)?;
        let prediction = self.model.forward(inputs);

        let states: Vec<f32> = prediction.inner().into_data().iter::<f32>().collect();
        let rates: Vec<f32> = d_xdt.into_data().iter::<f32>().collect();

        Ok(states
            .chunks(k)
            .zip(rates.chunks(k))
            .map(|(state, rates)| {
                let mut state = state.to_vec();
                let mut rates = rates.to_vec();
                state[nnuc] *= self.factors.enuc;
                rates[nnuc] *= self.factors.enuc_dot;
                Prediction { state, rates }
            })
            .collect())
    }
}

/// `infer`サブコマンドを実行します。
pub fn run(args: &InferArgs) -> Result<(), PinnError> {
    info!("推論を実行します - バックエンド: NdArray (CPU)");
    let inference_start = Instant::now();

    let predictor = Predictor::load(&args.model_dir)?;
    let rows = read_matrix(&args.input)?;
    let predictions = predictor.predict(&rows)?;

    for (i, p) in predictions.iter().enumerate() {
        info!("[{}] state {:?} rates {:?}", i, p.state, p.rates);
    }
    info!(
        "推論が完了しました。入力サンプル数: {}",
        predictions.len()
    );
    info!("=> 推論時間: {:.2?}", inference_start.elapsed());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::module::Param;
    use burn::nn::{Initializer, LinearConfig};

    /// 出力が `dt * [1, 2, 3]` になる、nnuc = 2 の予測器。
    fn predictor() -> Predictor {
        let device = Default::default();
        let mut linear = LinearConfig::new(5, 3)
            .with_bias(false)
            .with_initializer(Initializer::Zeros)
            .init::<MyBackend>(&device);
        let mut weight = vec![0.0f32; 15];
        weight[..3].copy_from_slice(&[1.0, 2.0, 3.0]);
        linear.weight = Param::from_tensor(Tensor::from_data(TensorData::new(weight, [5, 3]), &device));

        Predictor {
            model: Model::from_linears(vec![linear]),
            factors: NormFactors::new(2e7, 3.1e8, 4.0, 10.0),
            nnuc: 2,
        }
    }

    #[test]
    fn energy_channels_are_returned_in_physical_units() {
        let predictions = predictor()
            .predict(&[vec![0.5, 0.3, 0.7, 2e7, 3.1e8]])
            .unwrap();
        let p = &predictions[0];

        assert_eq!(p.state, vec![0.5, 1.0, 6.0]);
        assert_eq!(p.rates, vec![1.0, 2.0, 30.0]);
    }

    #[test]
    fn row_of_wrong_width_is_rejected() {
        let err = predictor().predict(&[vec![0.5, 0.3, 0.7]]).unwrap_err();
        assert!(matches!(err, PinnError::Dataset(_)));
    }
}

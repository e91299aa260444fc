//! # 損失関数
//!
//! 状態量の予測誤差と、自動微分で得た反応率に対する物理的な制約を組み合わせた損失を定義します。
//! すべて正規化済みのテンソルに対して計算します。

use burn::nn::loss::{MseLoss, Reduction};
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};

/// log(0) と0除算を避けるための下駄。
const EPS: f64 = 1e-10;

/// 損失の内訳。ログ出力用で、逆伝播には使いません。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossBreakdown {
    pub state: f32,
    pub derivative: f32,
    pub sign: f32,
    pub relative: f32,
    pub mass: f32,
}

impl LossBreakdown {
    pub const LEN: usize = 5;

    pub fn to_array(&self) -> [f32; Self::LEN] {
        [self.state, self.derivative, self.sign, self.relative, self.mass]
    }
}

/// 合成した損失。`total` だけが逆伝播の対象です。
#[derive(Debug)]
pub struct PinnLossOutput<B: Backend> {
    pub total: Tensor<B, 1>,
    pub breakdown: LossBreakdown,
}

/// 状態損失・微分損失・符号損失・(相対損失)・質量保存損失を合成します。
#[derive(Debug, Clone)]
pub struct PinnLoss {
    nnuc: usize,
    include_relative: bool,
}

impl PinnLoss {
    pub fn new(nnuc: usize, include_relative: bool) -> Self {
        Self {
            nnuc,
            include_relative,
        }
    }

    /// `prediction` は `[batch, nnuc+1]`、`d_xdt` は `[batch, nnuc+1]`、
    /// `targets` は `[batch, 2*(nnuc+1)]` です。
    pub fn forward<B: Backend>(
        &self,
        prediction: Tensor<B, 2>,
        d_xdt: Tensor<B, 2>,
        targets: Tensor<B, 2>,
    ) -> PinnLossOutput<B> {
        let (state_targets, rate_targets) = split_targets(targets, self.nnuc);

        let state = log_loss(prediction.clone(), state_targets.clone());
        // 学習初期の大きな誤差を二乗すると発散するため L1
        let derivative = l1_loss(d_xdt.clone(), rate_targets.clone());
        let sign = sign_loss(d_xdt, rate_targets);
        let relative = relative_loss(prediction.clone(), state_targets);
        let mass = mass_fraction_loss(prediction, self.nnuc);

        let breakdown = LossBreakdown {
            state: scalar(&state),
            derivative: scalar(&derivative),
            sign: scalar(&sign),
            relative: scalar(&relative),
            mass: scalar(&mass),
        };

        let mut total = state + derivative + sign + mass;
        if self.include_relative {
            total = total + relative;
        }

        PinnLossOutput { total, breakdown }
    }
}

/// 教師データを状態量 `[:, ..nnuc+1]` と反応率 `[:, nnuc+1..]` に分けます。
pub fn split_targets<B: Backend>(targets: Tensor<B, 2>, nnuc: usize) -> (Tensor<B, 2>, Tensor<B, 2>) {
    let [batch, width] = targets.dims();
    let state = targets.clone().slice([0..batch, 0..nnuc + 1]);
    let rates = targets.slice([0..batch, nnuc + 1..width]);
    (state, rates)
}

/// 多桁にわたる質量分率の相対的な誤差を見るための対数差分の二乗平均。
pub fn log_loss<B: Backend>(prediction: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
    let log_pred = prediction.abs().add_scalar(EPS).log();
    let log_target = target.abs().add_scalar(EPS).log();
    (log_pred - log_target).powf_scalar(2.0).mean()
}

pub fn l1_loss<B: Backend>(prediction: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
    (prediction - target).abs().mean()
}

/// 反応率の符号の不一致率。大きさには依存しません。
pub fn sign_loss<B: Backend>(d_xdt: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
    (d_xdt.sign() - target.sign()).abs().mean().div_scalar(2.0)
}

/// 教師データの大きさで割った誤差。
pub fn relative_loss<B: Backend>(prediction: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
    let scale = target.clone().abs().add_scalar(EPS);
    ((prediction - target).abs() / scale).mean()
}

/// 予測した質量分率の和の 1 からのずれ。
pub fn mass_fraction_loss<B: Backend>(prediction: Tensor<B, 2>, nnuc: usize) -> Tensor<B, 1> {
    let [batch, _] = prediction.dims();
    prediction
        .slice([0..batch, 0..nnuc])
        .sum_dim(1)
        .sub_scalar(1.0)
        .abs()
        .mean()
}

/// 実験ごとに学習用の損失を変えても比較できるよう、常に同じ形で計算するプロット用損失。
pub fn plotting_loss<B: Backend>(prediction: Tensor<B, 2>, targets: Tensor<B, 2>, nnuc: usize) -> f32 {
    let (state_targets, _) = split_targets(targets, nnuc);
    let loss = MseLoss::new().forward(prediction, state_targets, Reduction::Mean);
    scalar(&loss)
}

/// チャンネルごとの状態量の二乗平均誤差。
pub fn component_loss<B: Backend>(prediction: Tensor<B, 2>, target: Tensor<B, 2>) -> Vec<f32> {
    column_values((prediction - target).powf_scalar(2.0).mean_dim(0))
}

/// チャンネルごとの反応率の平均絶対誤差。
pub fn component_loss_l1<B: Backend>(d_xdt: Tensor<B, 2>, target: Tensor<B, 2>) -> Vec<f32> {
    column_values((d_xdt - target).abs().mean_dim(0))
}

fn column_values<B: Backend>(row: Tensor<B, 2>) -> Vec<f32> {
    row.into_data().iter::<f32>().collect()
}

fn scalar<B: Backend>(loss: &Tensor<B, 1>) -> f32 {
    loss.clone().into_scalar().elem::<f32>()
}

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig, Tanh};
use burn::prelude::Backend;
use burn::tensor::Tensor;

/// ネットワーク構成。入力幅 `nnuc+3`、出力幅 `nnuc+1` はデータセットから決まります。
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 入力チャンネル数
    pub d_input: usize,
    /// 出力チャンネル数 (状態量のみ)
    pub d_output: usize,
    /// 隠れ層の幅。空にすると線形モデルになります。
    #[config(default = "vec![32; 7]")]
    pub hidden_sizes: Vec<usize>,
}

impl ModelConfig {
    /// 新しいモデルを初期化します。
    pub fn init<B: Backend>(&self, device: &B::Device) -> Model<B> {
        let mut linears = Vec::with_capacity(self.hidden_sizes.len() + 1);
        let mut d_in = self.d_input;
        for &d_hidden in &self.hidden_sizes {
            linears.push(LinearConfig::new(d_in, d_hidden).init(device));
            d_in = d_hidden;
        }
        linears.push(LinearConfig::new(d_in, self.d_output).init(device));
        Model::from_linears(linears)
    }
}

/// PINNの本体となるニューラルネットワークモデル。
///
/// セルの初期組成・密度・温度・時間刻みを入力とし、ステップ後の質量分率と
/// エネルギー生成量を予測する多層パーセプトロン（MLP）です。
/// 時間微分は入力の0番チャンネルに対する自動微分で得ます。
#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    linears: Vec<Linear<B>>,
    activation: Tanh,
}

impl<B: Backend> Model<B> {
    /// 線形層の列からモデルを組み立てます。層の間には tanh を挟みます。
    pub fn from_linears(linears: Vec<Linear<B>>) -> Self {
        Self {
            linears,
            activation: Tanh::new(),
        }
    }

    /// モデルの順伝播を実行します。
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let Some((output, hidden)) = self.linears.split_last() else {
            return input;
        };
        let mut x = input;
        for linear in hidden {
            x = linear.forward(x);
            x = self.activation.forward(x);
        }
        output.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn output_shape_follows_config() {
        let device = Default::default();
        let model = ModelConfig::new(6, 4).init::<TestBackend>(&device);
        let output = model.forward(Tensor::zeros([5, 6], &device));
        assert_eq!(output.dims(), [5, 4]);
    }

    #[test]
    fn empty_hidden_sizes_give_a_single_linear_layer() {
        let device = Default::default();
        let model = ModelConfig::new(6, 4)
            .with_hidden_sizes(vec![])
            .init::<TestBackend>(&device);
        // 重み 6x4 + バイアス 4
        assert_eq!(model.num_params(), 28);
    }
}

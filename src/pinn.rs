use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Tensor, TensorData};

use crate::error::PinnError;
use crate::model::Model;

/// 予測値の各チャンネルを入力の0番チャンネル (時間刻み) で微分します。
///
/// burn の計算グラフは一度の逆伝播で消費されるため、チャンネルごとに逆伝播を繰り返す代わりに、
/// バッチを `n_channels` 個縦に並べた入力で一度だけ順伝播します。
/// `n` 番目のブロックではチャンネル `n` だけに 1 を置いた種を与えて一度だけ逆伝播すると、
/// ブロック `n` の入力勾配の0列目が `d prediction[:, n] / d dt` になります。
///
/// 内部で独自のグラフを作るので、呼び出し側は損失用に改めて順伝播する必要があります。
/// 戻り値は計算グラフから切り離された内部バックエンドのテンソル `[batch, n_channels]` です。
pub fn time_derivatives<B: AutodiffBackend>(
    model: &Model<B>,
    inputs: Tensor<B, 2>,
    n_channels: usize,
) -> Result<Tensor<B::InnerBackend, 2>, PinnError> {
    let [batch, _] = inputs.dims();
    let device = inputs.device();

    let stacked = Tensor::cat(vec![inputs.detach(); n_channels], 0).require_grad();
    let prediction = model.forward(stacked.clone());

    let mut seed = vec![0.0f32; n_channels * batch * n_channels];
    for n in 0..n_channels {
        for b in 0..batch {
            seed[(n * batch + b) * n_channels + n] = 1.0;
        }
    }
    let seed = Tensor::<B, 2>::from_data(
        TensorData::new(seed, [n_channels * batch, n_channels]),
        &device,
    );

    let grads = (prediction * seed).sum().backward();
    let grad = stacked.grad(&grads).ok_or(PinnError::NoInputGradient)?;

    Ok(grad
        .slice([0..n_channels * batch, 0..1])
        .reshape([n_channels, batch])
        .transpose())
}

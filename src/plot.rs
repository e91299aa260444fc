use std::path::Path;

use plotters::prelude::*;

/// 学習・テストのプロット用損失をエポックごとにグラフとしてPNGファイルに出力します。
pub fn plot_loss_history(
    path: &Path,
    train_loss_hist: &[f32],
    test_loss_hist: &[f32],
) -> Result<(), Box<dyn std::error::Error>> {
    let log_values = train_loss_hist
        .iter()
        .chain(test_loss_hist)
        .filter(|v| v.is_finite() && **v > 0.0)
        .map(|v| v.log10());
    let (min_log_loss, max_log_loss) = log_values.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min_log_loss.is_finite() {
        return Err("描画できる損失の値がありません".into());
    }

    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Loss History", ("sans-serif", 40).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(
            0..train_loss_hist.len().max(test_loss_hist.len()),
            (min_log_loss - 0.5)..(max_log_loss + 0.5),
        )?;
    chart
        .configure_mesh()
        .y_desc("Loss (log10 scale)")
        .x_desc("Epochs")
        .draw()?;
    chart
        .draw_series(LineSeries::new(
            train_loss_hist
                .iter()
                .enumerate()
                .map(|(i, &val)| (i, val.log10())),
            &RED,
        ))?
        .label("Train")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
    chart
        .draw_series(LineSeries::new(
            test_loss_hist
                .iter()
                .enumerate()
                .map(|(i, &val)| (i, val.log10())),
            &BLUE,
        ))?
        .label("Test")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

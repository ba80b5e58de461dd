//! SVG bar chart of per-site toxicity: slightly toxic share stacked under the
//! very toxic share, one bar per site in rank order.

use plotters::prelude::*;

use crate::error::{PipelineError, Result};
use crate::stats::SiteStat;

const SLIGHTLY: RGBColor = RGBColor(255, 165, 0);
const VERY: RGBColor = RED;

fn render_err<E: std::fmt::Display>(e: E) -> PipelineError {
    PipelineError::Render(e.to_string())
}

/// Render `stats` as a standalone SVG document. Percentages are on a 0–100 axis.
pub fn render_site_chart(stats: &[SiteStat]) -> Result<String> {
    let n = stats.len().max(1);
    let width = (160 + 90 * n as u32).max(480);
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (width, 480)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Toxicité par site", ("sans-serif", 22))
            .margin(16)
            .x_label_area_size(48)
            .y_label_area_size(56)
            .build_cartesian_2d((0..n).into_segmented(), 0f64..100f64)
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .y_desc("Pourcentage (%)")
            .x_labels(n)
            .x_label_formatter(&|v: &SegmentValue<usize>| match v {
                SegmentValue::CenterOf(i) => stats.get(*i).map(|s| s.site.clone()).unwrap_or_default(),
                _ => String::new(),
            })
            .draw()
            .map_err(render_err)?;

        let bar = |i: usize, from: f64, to: f64, color: RGBColor| {
            let mut r = Rectangle::new(
                [(SegmentValue::Exact(i), from), (SegmentValue::Exact(i + 1), to)],
                color.filled(),
            );
            r.set_margin(0, 0, 12, 12);
            r
        };

        chart
            .draw_series(stats.iter().enumerate().map(|(i, s)| {
                bar(i, 0.0, s.proportion_by_label.slightly_toxic * 100.0, SLIGHTLY)
            }))
            .map_err(render_err)?
            .label("Légèrement toxique")
            .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], SLIGHTLY.filled()));

        chart
            .draw_series(stats.iter().enumerate().map(|(i, s)| {
                let slightly = s.proportion_by_label.slightly_toxic * 100.0;
                bar(i, slightly, slightly + s.proportion_by_label.very_toxic * 100.0, VERY)
            }))
            .map_err(render_err)?
            .label("Très toxique")
            .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], VERY.filled()));

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.85))
            .border_style(BLACK)
            .draw()
            .map_err(render_err)?;

        root.present().map_err(render_err)?;
    }
    Ok(svg)
}

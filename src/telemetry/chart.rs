//! Static summary chart rendered at the end of a session.
//!
//! Produces a self-contained SVG: stress probability against session time,
//! one point per inference colored by actuator state, with the severity band
//! edges drawn as dashed guides.

use crate::actuator::ActuatorState;
use crate::core::SeverityBands;
use crate::telemetry::recorder::TelemetryRecord;
use std::path::Path;

const MARGIN_LEFT: f64 = 60.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_BOTTOM: f64 = 50.0;

/// Chart appearance.
#[derive(Debug, Clone)]
pub struct ChartOptions {
    pub title: String,
    pub bands: SeverityBands,
    pub width: u32,
    pub height: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            title: "Stress Probability vs. Actuator State".to_string(),
            bands: SeverityBands::default(),
            width: 1200,
            height: 600,
        }
    }
}

fn state_color(state: ActuatorState) -> &'static str {
    match state {
        ActuatorState::Engaged => "red",
        ActuatorState::Disengaged => "blue",
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Render the chart as an SVG document.
pub fn render_svg(records: &[TelemetryRecord], options: &ChartOptions) -> String {
    let width = f64::from(options.width);
    let height = f64::from(options.height);
    let plot_w = width - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_h = height - MARGIN_TOP - MARGIN_BOTTOM;

    let max_t = records
        .iter()
        .map(|r| r.relative_time_secs)
        .fold(0.0_f64, f64::max)
        .max(1.0);
    let x = |t: f64| MARGIN_LEFT + t / max_t * plot_w;
    let y = |pct: f64| MARGIN_TOP + (1.0 - pct.clamp(0.0, 100.0) / 100.0) * plot_h;

    let count = records.len().max(1) as f64;
    let mean_latency = records.iter().map(|r| r.latency_ms).sum::<f64>() / count;
    let mean_stress = records.iter().map(|r| r.probability_pct).sum::<f64>() / count;

    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" viewBox=\"0 0 {} {}\">\n",
        options.width, options.height, options.width, options.height
    ));
    svg.push_str("<rect width=\"100%\" height=\"100%\" fill=\"white\"/>\n");
    svg.push_str(&format!(
        "<text x=\"{:.1}\" y=\"24\" text-anchor=\"middle\" font-size=\"16\">{}</text>\n",
        width / 2.0,
        escape(&options.title)
    ));
    svg.push_str(&format!(
        "<text x=\"{:.1}\" y=\"44\" text-anchor=\"middle\" font-size=\"13\">Avg Stress: {:.2}% | Avg Latency: {:.2} ms</text>\n",
        width / 2.0,
        mean_stress,
        mean_latency
    ));

    // Grid and y-axis labels every 10%.
    for step in 0..=10 {
        let pct = f64::from(step) * 10.0;
        svg.push_str(&format!(
            "<line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"#e0e0e0\"/>\n",
            MARGIN_LEFT,
            y(pct),
            MARGIN_LEFT + plot_w,
            y(pct)
        ));
        svg.push_str(&format!(
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\" font-size=\"11\">{}</text>\n",
            MARGIN_LEFT - 6.0,
            y(pct) + 4.0,
            pct
        ));
    }

    for (pct, color) in [
        (options.bands.moderate_pct, "gold"),
        (options.bands.high_pct, "red"),
    ] {
        svg.push_str(&format!(
            "<line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"{}\" stroke-dasharray=\"6,4\"/>\n",
            MARGIN_LEFT,
            y(pct),
            MARGIN_LEFT + plot_w,
            y(pct),
            color
        ));
    }

    if !records.is_empty() {
        let points: Vec<String> = records
            .iter()
            .map(|r| format!("{:.1},{:.1}", x(r.relative_time_secs), y(r.probability_pct)))
            .collect();
        svg.push_str(&format!(
            "<polyline points=\"{}\" fill=\"none\" stroke=\"gray\" stroke-opacity=\"0.4\" stroke-dasharray=\"4,3\"/>\n",
            points.join(" ")
        ));
    }

    for record in records {
        svg.push_str(&format!(
            "<circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"3\" fill=\"{}\" fill-opacity=\"0.7\"/>\n",
            x(record.relative_time_secs),
            y(record.probability_pct),
            state_color(record.actuator_state)
        ));
    }

    svg.push_str(&format!(
        "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"12\">Time (s), 0 to {:.1}</text>\n",
        MARGIN_LEFT + plot_w / 2.0,
        height - 12.0,
        max_t
    ));
    svg.push_str(&format!(
        "<text x=\"16\" y=\"{:.1}\" transform=\"rotate(-90 16 {:.1})\" text-anchor=\"middle\" font-size=\"12\">Stress Probability (%)</text>\n",
        MARGIN_TOP + plot_h / 2.0,
        MARGIN_TOP + plot_h / 2.0
    ));
    svg.push_str("</svg>\n");
    svg
}

/// Render and write the chart.
pub fn write_svg(
    path: &Path,
    records: &[TelemetryRecord],
    options: &ChartOptions,
) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_svg(records, options))
}

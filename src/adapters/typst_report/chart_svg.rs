//! SVG chart rendering for tear-sheet reports.

use chrono::NaiveDateTime;

const CHART_WIDTH: f64 = 600.0;
const CHART_HEIGHT: f64 = 300.0;
const MARGIN_LEFT: f64 = 60.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 30.0;
const MARGIN_BOTTOM: f64 = 40.0;

const PALETTE: [&str; 8] = [
    "#2563eb", "#dc2626", "#16a34a", "#9333ea", "#ea580c", "#0891b2", "#ca8a04", "#4b5563",
];

/// A named time series for [`line_chart_svg`].
pub struct LineSeries<'a> {
    pub label: String,
    pub points: &'a [(NaiveDateTime, f64)],
}

fn svg_open(title: &str) -> String {
    let mut svg = format!(
        r##"<svg width="{}" height="{}" viewBox="0 0 {} {}" xmlns="http://www.w3.org/2000/svg">"##,
        CHART_WIDTH, CHART_HEIGHT, CHART_WIDTH, CHART_HEIGHT
    );
    svg.push_str("\n  <rect width=\"100%\" height=\"100%\" fill=\"white\"/>\n");
    svg.push_str(&format!(
        "  <text x=\"{}\" y=\"15\" text-anchor=\"end\" font-size=\"12\" fill=\"#666\">{}</text>\n",
        CHART_WIDTH,
        escape(title)
    ));
    svg.push_str(&format!(
        "  <line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" stroke=\"#ccc\" stroke-width=\"1\"/>\n",
        MARGIN_LEFT,
        MARGIN_TOP,
        MARGIN_LEFT,
        CHART_HEIGHT - MARGIN_BOTTOM
    ));
    svg
}

fn y_label(svg: &mut String, y: f64, text: &str) {
    svg.push_str(&format!(
        "  <text x=\"{}\" y=\"{:.1}\" text-anchor=\"end\" font-size=\"10\" fill=\"#666\">{}</text>\n",
        MARGIN_LEFT - 5.0,
        y,
        text
    ));
}

fn x_label(svg: &mut String, x: f64, text: &str) {
    svg.push_str(&format!(
        "  <text x=\"{:.1}\" y=\"{}\" text-anchor=\"middle\" font-size=\"10\" fill=\"#666\">{}</text>\n",
        x,
        CHART_HEIGHT - MARGIN_BOTTOM + 15.0,
        escape(text)
    ));
}

fn zero_line(svg: &mut String, y: f64) {
    svg.push_str(&format!(
        "  <line x1=\"{}\" y1=\"{:.1}\" x2=\"{}\" y2=\"{:.1}\" stroke=\"#999\" stroke-width=\"1\"/>\n",
        MARGIN_LEFT,
        y,
        CHART_WIDTH - MARGIN_RIGHT,
        y
    ));
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Value range padded to include zero; never degenerate.
fn value_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        return None;
    }
    let (lo, hi) = (lo.min(0.0), hi.max(0.0));
    if hi - lo < 1e-12 {
        Some((lo - 1.0, hi + 1.0))
    } else {
        Some((lo, hi))
    }
}

/// Multi-series line chart over time, x positioned by index of the first
/// series. Empty when no series holds a finite point.
pub fn line_chart_svg(title: &str, series: &[LineSeries], percent: bool) -> String {
    let Some((min_v, max_v)) = value_range(series.iter().flat_map(|s| s.points.iter().map(|p| p.1)))
    else {
        return String::new();
    };
    let Some(axis) = series.iter().map(|s| s.points).find(|p| !p.is_empty()) else {
        return String::new();
    };

    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let first = axis[0].0;
    let last = axis[axis.len() - 1].0;
    let span = (last - first).num_seconds().max(1) as f64;
    let x_scale = |t: NaiveDateTime| -> f64 {
        MARGIN_LEFT + ((t - first).num_seconds() as f64 / span).clamp(0.0, 1.0) * plot_width
    };
    let y_scale =
        |v: f64| -> f64 { MARGIN_TOP + plot_height - ((v - min_v) / (max_v - min_v)) * plot_height };
    let fmt = |v: f64| {
        if percent {
            format!("{:.1}%", v * 100.0)
        } else {
            format!("{:.3}", v)
        }
    };

    let mut svg = svg_open(title);
    zero_line(&mut svg, y_scale(0.0));
    y_label(&mut svg, MARGIN_TOP + 5.0, &fmt(max_v));
    y_label(&mut svg, CHART_HEIGHT - MARGIN_BOTTOM - 5.0, &fmt(min_v));
    x_label(&mut svg, MARGIN_LEFT, &first.date().to_string());
    x_label(&mut svg, CHART_WIDTH - MARGIN_RIGHT, &last.date().to_string());

    for (i, s) in series.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let mut path_data = String::new();
        for &(t, v) in s.points.iter().filter(|p| p.1.is_finite()) {
            let cmd = if path_data.is_empty() { "M" } else { " L" };
            path_data.push_str(&format!("{} {:.1} {:.1}", cmd, x_scale(t), y_scale(v)));
        }
        if path_data.is_empty() {
            continue;
        }
        svg.push_str(&format!(
            "  <path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"1.5\"/>\n",
            path_data, color
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"10\" fill=\"{}\">{}</text>\n",
            MARGIN_LEFT + 5.0 + i as f64 * 70.0,
            CHART_HEIGHT - 5.0,
            color,
            escape(&s.label)
        ));
    }
    svg.push_str("</svg>");
    svg
}

/// Vertical bars around a zero baseline. Empty when no value is finite.
pub fn bar_chart_svg(title: &str, labels: &[String], values: &[f64]) -> String {
    let Some((min_v, max_v)) = value_range(values.iter().copied()) else {
        return String::new();
    };

    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let y_scale =
        |v: f64| -> f64 { MARGIN_TOP + plot_height - ((v - min_v) / (max_v - min_v)) * plot_height };
    let slot = plot_width / values.len().max(1) as f64;
    let zero = y_scale(0.0);

    let mut svg = svg_open(title);
    zero_line(&mut svg, zero);
    y_label(&mut svg, MARGIN_TOP + 5.0, &format!("{:.2} bps", max_v * 1e4));
    y_label(&mut svg, CHART_HEIGHT - MARGIN_BOTTOM - 5.0, &format!("{:.2} bps", min_v * 1e4));

    for (i, (&v, label)) in values.iter().zip(labels).enumerate() {
        let x = MARGIN_LEFT + i as f64 * slot;
        x_label(&mut svg, x + slot / 2.0, label);
        if !v.is_finite() {
            continue;
        }
        let y = y_scale(v);
        let color = if v >= 0.0 { "#16a34a" } else { "#dc2626" };
        svg.push_str(&format!(
            "  <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"{}\"/>\n",
            x + slot * 0.15,
            y.min(zero),
            slot * 0.7,
            (y - zero).abs(),
            color
        ));
    }
    svg.push_str("</svg>");
    svg
}

/// Wrap SVG markup in a Typst `image.decode` call, or `fallback` text when
/// the chart is empty.
pub fn embed(svg: &str, fallback: &str) -> String {
    if svg.is_empty() {
        return format!("_{}_", fallback);
    }
    format!(
        "#image.decode(\n\"{}\",\n  width: 100%,\n)",
        svg.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

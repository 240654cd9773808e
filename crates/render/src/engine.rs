//! GraphDef → PNG bytes.
//!
//! All layout arithmetic is integer-pixel and every color comes from
//! constant tables, so an equal GraphDef always produces identical bytes.

use thiserror::Error;

use strata_chart::{Color, GraphDef, GraphDefError, LineDef, LineStyle, Plot, Theme};

use crate::canvas::Canvas;
use crate::font;
use crate::ticks::{self, XTick, YTick};

const MARGIN_TOP: i64 = 10;
const MARGIN_RIGHT: i64 = 10;
const MARGIN_BOTTOM: i64 = 40;
const MARGIN_LEFT: i64 = 60;
const TITLE_BAND: i64 = 24;
const LEGEND_ROW: i64 = 14;
const PLOT_GAP: i64 = 8;

pub const MIN_WIDTH: u32 = 80;
pub const MIN_HEIGHT: u32 = 40;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("canvas {width}x{height} is below the {MIN_WIDTH}x{MIN_HEIGHT} minimum")]
    InvalidCanvas { width: u32, height: u32 },
    #[error(transparent)]
    Graph(#[from] GraphDefError),
    #[error("png encoding: {0}")]
    Encode(#[from] png::EncodingError),
}

/// Rasterise a GraphDef. Completes fully or fails without output.
pub fn render(graph: &GraphDef) -> Result<Vec<u8>, RenderError> {
    if graph.width < MIN_WIDTH || graph.height < MIN_HEIGHT {
        return Err(RenderError::InvalidCanvas {
            width: graph.width,
            height: graph.height,
        });
    }
    graph.validate()?;
    tracing::debug!(
        width = graph.width,
        height = graph.height,
        plots = graph.plots.len(),
        "rendering graph"
    );

    let theme = graph.theme;
    let mut canvas = Canvas::new(graph.width, graph.height, theme.background());

    let width = i64::from(graph.width);
    let height = i64::from(graph.height);
    let title_band = if graph.title.is_some() { TITLE_BAND } else { 0 };

    let legend_entries = collect_legend(graph);
    let legend_height = if graph.legend && !legend_entries.is_empty() {
        legend_rows(&legend_entries, width) * LEGEND_ROW + 2
    } else {
        0
    };

    if let Some(title) = &graph.title {
        let tw = i64::from(font::text_width(title, 2));
        canvas.draw_text(
            (width - tw) / 2,
            (title_band - i64::from(font::GLYPH_HEIGHT) * 2) / 2,
            title,
            theme.text(),
            2,
        );
    }

    let area_top = MARGIN_TOP + title_band;
    let area_bottom = (height - MARGIN_BOTTOM - legend_height).max(area_top + 2);
    let plot_left = MARGIN_LEFT;
    let plot_right = (width - MARGIN_RIGHT).max(plot_left + 2);

    let n = graph.plots.len().max(1) as i64;
    let plot_height = ((area_bottom - area_top - PLOT_GAP * (n - 1)) / n).max(2);

    for (i, plot) in graph.plots.iter().enumerate() {
        let top = area_top + i as i64 * (plot_height + PLOT_GAP);
        let bottom = top + plot_height - 1;
        let is_last = i + 1 == graph.plots.len();
        render_plot(
            &mut canvas, graph, plot, theme, plot_left, plot_right, top, bottom, is_last,
        );
    }
    if graph.plots.is_empty() {
        // Even an empty graph shows its frame and time axis.
        let empty = Plot {
            axis_label: None,
            lines: vec![],
            vspans: vec![],
        };
        render_plot(
            &mut canvas, graph, &empty, theme, plot_left, plot_right, area_top,
            area_bottom - 1, true,
        );
    }

    if legend_height > 0 {
        draw_legend(
            &mut canvas,
            &legend_entries,
            theme,
            height - legend_height,
            width,
        );
    }

    encode(canvas)
}

#[allow(clippy::too_many_arguments)]
fn render_plot(
    canvas: &mut Canvas,
    graph: &GraphDef,
    plot: &Plot,
    theme: Theme,
    left: i64,
    right: i64,
    top: i64,
    bottom: i64,
    with_x_labels: bool,
) {
    let (lo, hi) = plot.value_range();
    let span = (graph.end_time - graph.start_time) as f64;
    let plot_w = (right - left) as f64;
    let plot_h = (bottom - top) as f64;

    let xmap = |t: i64| -> i64 {
        left + (((t - graph.start_time) as f64 / span) * (plot_w - 1.0)).round() as i64
    };
    let ymap = |v: f64| -> i64 {
        let clamped = v.clamp(lo, hi);
        bottom - (((clamped - lo) / (hi - lo)) * plot_h).round() as i64
    };

    // Background bands first so lines draw over them.
    for vspan in &plot.vspans {
        let x0 = xmap(vspan.start);
        let x1 = xmap(vspan.end);
        canvas.fill_rect(
            x0,
            top,
            (x1 - x0).max(1),
            bottom - top + 1,
            vspan.color.scale_alpha(vspan.alpha),
        );
    }

    let y_ticks = ticks::y_ticks(lo, hi);
    for YTick { value, .. } in &y_ticks {
        let y = ymap(*value);
        canvas.line(left, y, right - 1, y, 1, theme.grid());
    }

    // Stack baselines are shared across all stacked lines of the plot, in
    // layering (insertion) order, positive and negative sides apart.
    let samples = plot.lines.iter().map(|l| l.data.len()).max().unwrap_or(0);
    let mut pos = vec![0.0_f64; samples];
    let mut neg = vec![0.0_f64; samples];

    for line in &plot.lines {
        match line.style {
            LineStyle::Line => draw_line(canvas, line, &xmap, &ymap),
            LineStyle::Area => draw_area(canvas, line, &xmap, &ymap),
            LineStyle::Stack => {
                draw_stack(canvas, graph.step, line, &mut pos, &mut neg, &xmap, &ymap);
            }
        }
    }

    // Frame and ticks go over the data.
    canvas.line(left - 1, top, left - 1, bottom, 1, theme.axis());
    canvas.line(left - 1, bottom, right - 1, bottom, 1, theme.axis());

    for YTick { value, label } in &y_ticks {
        let y = ymap(*value);
        canvas.line(left - 4, y, left - 1, y, 1, theme.axis());
        let tw = i64::from(font::text_width(label, 1));
        canvas.draw_text(left - 6 - tw, y - 3, label, theme.text(), 1);
    }

    if with_x_labels {
        for XTick { time, label } in ticks::x_ticks(graph.start_time, graph.end_time, tz_of(graph))
        {
            let x = xmap(time);
            canvas.line(x, bottom, x, bottom + 3, 1, theme.axis());
            let tw = i64::from(font::text_width(&label, 1));
            canvas.draw_text(x - tw / 2, bottom + 6, &label, theme.text(), 1);
        }
    }

    if let Some(axis_label) = &plot.axis_label {
        let th = i64::from(font::text_width(axis_label, 1));
        let y = top + ((bottom - top) - th) / 2;
        canvas.draw_text_up(4, y, axis_label, theme.text(), 1);
    }
}

fn tz_of(graph: &GraphDef) -> chrono_tz::Tz {
    // Data stays in UTC milliseconds; the zone only shapes tick labels.
    graph.timezone.parse().unwrap_or(chrono_tz::UTC)
}

type Map<'a> = &'a dyn Fn(i64) -> i64;
type VMap<'a> = &'a dyn Fn(f64) -> i64;

fn draw_line(canvas: &mut Canvas, line: &LineDef, xmap: Map<'_>, ymap: VMap<'_>) {
    let color = line.color;
    let mut prev: Option<(i64, i64)> = None;
    let mut segment_len = 0_usize;
    for (t, v) in line.data.iter() {
        if v.is_nan() {
            if segment_len == 1
                && let Some((px, py)) = prev
            {
                // Isolated sample: a dot of lineWidth diameter.
                canvas.dot(px, py, line.line_width.max(1), color);
            }
            prev = None;
            segment_len = 0;
            continue;
        }
        let point = (xmap(t), ymap(v));
        if let Some((px, py)) = prev {
            canvas.line(px, py, point.0, point.1, line.line_width, color);
        }
        prev = Some(point);
        segment_len += 1;
    }
    if segment_len == 1
        && let Some((px, py)) = prev
    {
        canvas.dot(px, py, line.line_width.max(1), color);
    }
}

fn draw_area(canvas: &mut Canvas, line: &LineDef, xmap: Map<'_>, ymap: VMap<'_>) {
    let fill = line.color.scale_alpha(line.alpha);
    let base_y = ymap(0.0);
    let values = line.data.values();

    // Fill the polygon between the polyline and the zero baseline,
    // column by column with linear interpolation between samples.
    for i in 0..values.len().saturating_sub(1) {
        let (v0, v1) = (values[i], values[i + 1]);
        if v0.is_nan() || v1.is_nan() {
            continue;
        }
        let x0 = xmap(line.data.time_at(i));
        let x1 = xmap(line.data.time_at(i + 1));
        for x in x0..x1 {
            let f = if x1 > x0 {
                (x - x0) as f64 / (x1 - x0) as f64
            } else {
                0.0
            };
            let y = ymap(v0 + (v1 - v0) * f);
            fill_column(canvas, x, y, base_y, fill);
        }
    }
    // Isolated samples still get a one-column fill.
    for (i, &v) in values.iter().enumerate() {
        let before = i.checked_sub(1).map(|j| values[j]);
        let after = values.get(i + 1);
        let isolated = !v.is_nan()
            && before.is_none_or(f64::is_nan)
            && after.copied().is_none_or(f64::is_nan);
        if isolated {
            let x = xmap(line.data.time_at(i));
            fill_column(canvas, x, ymap(v), base_y, fill);
        }
    }

    draw_line(canvas, line, xmap, ymap);
}

#[allow(clippy::too_many_arguments)]
fn draw_stack(
    canvas: &mut Canvas,
    step: i64,
    line: &LineDef,
    pos: &mut [f64],
    neg: &mut [f64],
    xmap: Map<'_>,
    ymap: VMap<'_>,
) {
    let fill = line.color.scale_alpha(line.alpha);
    for (i, &v) in line.data.values().iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        let base = if v >= 0.0 { pos[i] } else { neg[i] };
        let top_value = base + v;
        let t = line.data.time_at(i);
        let x0 = xmap(t);
        let x1 = xmap(t + step);
        for x in x0..x1.max(x0 + 1) {
            fill_column(canvas, x, ymap(top_value), ymap(base), fill);
        }
        if v >= 0.0 {
            pos[i] = top_value;
        } else {
            neg[i] = top_value;
        }
    }
}

fn fill_column(canvas: &mut Canvas, x: i64, y0: i64, y1: i64, color: Color) {
    let (lo, hi) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
    for y in lo..=hi {
        canvas.blend(x, y, color);
    }
}

fn collect_legend(graph: &GraphDef) -> Vec<(Color, String)> {
    let mut entries = Vec::new();
    for plot in &graph.plots {
        for line in &plot.lines {
            entries.push((line.color, line.label.clone()));
        }
        for vspan in &plot.vspans {
            entries.push((vspan.color, vspan.label.clone()));
        }
    }
    entries
}

fn entry_width(label: &str) -> i64 {
    10 + 4 + i64::from(font::text_width(label, 1)) + 12
}

fn legend_rows(entries: &[(Color, String)], width: i64) -> i64 {
    let usable = width - MARGIN_LEFT - MARGIN_RIGHT;
    let mut rows = 1;
    let mut pen = 0;
    for (_, label) in entries {
        let w = entry_width(label);
        if pen > 0 && pen + w > usable {
            rows += 1;
            pen = 0;
        }
        pen += w;
    }
    rows
}

fn draw_legend(
    canvas: &mut Canvas,
    entries: &[(Color, String)],
    theme: Theme,
    y0: i64,
    width: i64,
) {
    let usable = width - MARGIN_LEFT - MARGIN_RIGHT;
    let mut pen = 0;
    let mut row = 0;
    for (color, label) in entries {
        let w = entry_width(label);
        if pen > 0 && pen + w > usable {
            row += 1;
            pen = 0;
        }
        let x = MARGIN_LEFT + pen;
        let y = y0 + row * LEGEND_ROW;
        canvas.fill_rect(x, y + 2, 10, 10, *color);
        canvas.draw_text(x + 14, y + 3, label, theme.text(), 1);
        pen += w;
    }
}

fn encode(canvas: Canvas) -> Result<Vec<u8>, RenderError> {
    let (width, height) = (canvas.width(), canvas.height());
    let pixels = canvas.into_rgb();
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&pixels)?;
    }
    Ok(out)
}

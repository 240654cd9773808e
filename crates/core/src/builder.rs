//! Binds evaluator output to a [`GraphDef`]: plot layout, palette
//! assignment, and vspan conversion.

use std::collections::HashSet;

use strata_chart::{
    Axis, Color, GraphDef, GraphDefError, Layout, LineDef, LineStyle, Palette, Plot, Theme,
    VSpanDef,
};

use crate::lang::eval::{Evaluated, extract_spans};
use crate::lang::expr::OutputKind;
use crate::model::context::EvalContext;

/// Presentation options for one graph request.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphOptions {
    pub width: u32,
    pub height: u32,
    pub theme: Theme,
    pub layout: Layout,
    pub palette: Palette,
    pub legend: bool,
    pub title: Option<String>,
    pub axis_label: Option<String>,
    /// Keep `:stack` members whose every sample is NaN. Off by default:
    /// an invisible layer earns a legend entry nobody can match to a
    /// pixel.
    pub keep_blank_stack_members: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            width: 700,
            height: 300,
            theme: Theme::Light,
            layout: Layout::Single,
            palette: Palette::Default,
            legend: true,
            title: None,
            axis_label: None,
            keep_blank_stack_members: false,
        }
    }
}

enum Entry {
    Line(LineDef),
    Span(Axis, VSpanDef),
}

/// Assemble the evaluated presentations into a validated GraphDef.
pub fn build_graph(
    ctx: &EvalContext,
    options: &GraphOptions,
    items: &[Evaluated],
) -> Result<GraphDef, GraphDefError> {
    // Colors named explicitly anywhere are excluded from auto-assignment.
    let explicit: HashSet<Color> = items.iter().filter_map(|e| e.color).collect();
    let palette: Vec<Color> = options
        .palette
        .colors(options.theme)
        .iter()
        .copied()
        .filter(|c| !explicit.contains(c))
        .collect();
    let full_palette = options.palette.colors(options.theme);
    let mut auto = 0_usize;
    let mut next_color = |explicit_color: Option<Color>| {
        if let Some(c) = explicit_color {
            return c;
        }
        let pool = if palette.is_empty() { full_palette } else { &palette };
        let c = pool[auto % pool.len()];
        auto += 1;
        c
    };

    let mut entries: Vec<Entry> = Vec::new();
    for item in items {
        for series in &item.series {
            let blank = series.data.values().iter().all(|v| v.is_nan());
            if blank && item.style == LineStyle::Stack && !options.keep_blank_stack_members {
                continue;
            }
            let label = item.label.clone().unwrap_or_else(|| series.label.clone());
            match item.output {
                OutputKind::Lines => {
                    entries.push(Entry::Line(LineDef {
                        label,
                        color: next_color(item.color),
                        style: item.style,
                        line_width: item.line_width,
                        alpha: item.alpha,
                        axis: item.axis,
                        data: series.data.clone(),
                    }));
                }
                OutputKind::Spans => {
                    let color = next_color(item.color);
                    for (start, end) in extract_spans(&series.data) {
                        entries.push(Entry::Span(
                            item.axis,
                            VSpanDef {
                                start,
                                end,
                                color,
                                alpha: item.alpha,
                                label: label.clone(),
                            },
                        ));
                    }
                }
            }
        }
    }

    let plots = match options.layout {
        Layout::Single => vec![collect_plot(entries, options.axis_label.clone())],
        Layout::Axes => {
            let mut left = Vec::new();
            let mut right = Vec::new();
            for entry in entries {
                let axis = match &entry {
                    Entry::Line(line) => line.axis,
                    Entry::Span(axis, _) => *axis,
                };
                match axis {
                    Axis::Left => left.push(entry),
                    Axis::Right => right.push(entry),
                }
            }
            let mut plots = vec![collect_plot(left, options.axis_label.clone())];
            if !right.is_empty() {
                plots.push(collect_plot(right, None));
            }
            plots
        }
    };

    let graph = GraphDef {
        start_time: ctx.start(),
        end_time: ctx.end(),
        step: ctx.step(),
        width: options.width,
        height: options.height,
        theme: options.theme,
        layout: options.layout,
        timezone: ctx.tz().name().to_string(),
        legend: options.legend,
        title: options.title.clone(),
        plots,
    };
    graph.validate()?;
    Ok(graph)
}

fn collect_plot(entries: Vec<Entry>, axis_label: Option<String>) -> Plot {
    let mut lines = Vec::new();
    let mut vspans = Vec::new();
    for entry in entries {
        match entry {
            Entry::Line(line) => lines.push(line),
            Entry::Span(_, span) => vspans.push(span),
        }
    }
    Plot {
        axis_label,
        lines,
        vspans,
    }
}

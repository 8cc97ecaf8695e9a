use crate::chart::config::{palette_color, ChartConfig, ChartKind};
use crate::chart::Row;
use minijinja::{context, Environment};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

pub const CHART_TEMPLATE: &str = "chart.html";

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 320.0;
const MARGIN_LEFT: f64 = 56.0;
const MARGIN_RIGHT: f64 = 16.0;
const MARGIN_TOP: f64 = 16.0;
const MARGIN_BOTTOM: f64 = 48.0;
const TICKS: u64 = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub key: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BarChart {
    pub x_key: String,
    pub x_label: String,
    pub y_label: String,
    /// One row per x value: the x value plus a count per series.
    pub data: Vec<Row>,
    pub series: Vec<Series>,
    pub legend: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartView {
    NoData,
    Unsupported(ChartKind),
    Bar(BarChart),
}

/// `"log_level"` -> `"Log Level"`
pub fn title_case(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn value_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn present<'a>(row: &'a Row, key: &str) -> Option<&'a Value> {
    row.get(key).filter(|v| !v.is_null())
}

/// Groups rows by their x value (first-seen order) and counts each distinct
/// value of the first y-key within a group.
///
/// Rows without an x value are ignored; rows without a y value still create
/// their group but add no count.
pub fn group_rows(rows: &[Row], config: &ChartConfig) -> Vec<Row> {
    let Some(y_key) = config.y_keys.first() else {
        return Vec::new();
    };

    let mut groups: Vec<Row> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let Some(x) = present(row, &config.x_key) else {
            continue;
        };
        let index = *positions.entry(value_label(x)).or_insert_with(|| {
            let mut group = Row::new();
            group.insert(config.x_key.clone(), x.clone());
            groups.push(group);
            groups.len() - 1
        });

        if let Some(label) = y_label(row, y_key, &config.x_key) {
            let count = groups[index]
                .entry(label)
                .or_insert_with(|| Value::from(0u64));
            *count = Value::from(count.as_u64().unwrap_or(0) + 1);
        }
    }

    groups
}

// A y value named like the x key would overwrite the group's own x entry
fn y_label(row: &Row, y_key: &str, x_key: &str) -> Option<String> {
    present(row, y_key)
        .map(value_label)
        .filter(|label| label != x_key)
}

/// Distinct first-y values in first-seen order, each with its color.
fn series(rows: &[Row], config: &ChartConfig) -> Vec<Series> {
    let Some(y_key) = config.y_keys.first() else {
        return Vec::new();
    };

    let mut keys: Vec<String> = Vec::new();
    for row in rows {
        if present(row, &config.x_key).is_none() {
            continue;
        }
        if let Some(label) = y_label(row, y_key, &config.x_key) {
            if !keys.contains(&label) {
                keys.push(label);
            }
        }
    }

    keys.into_iter()
        .enumerate()
        .map(|(i, key)| {
            let color = config
                .colors
                .get(&key)
                .cloned()
                .unwrap_or_else(|| palette_color(i).to_string());
            Series { key, color }
        })
        .collect()
}

pub fn render(rows: &[Row], config: &ChartConfig) -> ChartView {
    if rows.is_empty() || config.y_keys.is_empty() {
        return ChartView::NoData;
    }
    if config.kind != ChartKind::Bar {
        return ChartView::Unsupported(config.kind);
    }

    let data = group_rows(rows, config);
    if data.is_empty() {
        return ChartView::NoData;
    }

    ChartView::Bar(BarChart {
        x_key: config.x_key.clone(),
        x_label: title_case(&config.x_key),
        y_label: title_case(&config.y_keys[0]),
        series: series(rows, config),
        data,
        legend: config.legend,
    })
}

#[derive(Serialize)]
struct SvgBar {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    color: String,
    series: String,
    value: u64,
}

#[derive(Serialize)]
struct SvgGroup {
    label: String,
    center: f64,
    bars: Vec<SvgBar>,
}

#[derive(Serialize)]
struct SvgTick {
    value: u64,
    y: f64,
}

#[derive(Serialize)]
struct Plot {
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
    middle_x: f64,
    middle_y: f64,
}

fn round(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn layout(chart: &BarChart) -> (Plot, Vec<SvgTick>, Vec<SvgGroup>) {
    let plot = Plot {
        left: MARGIN_LEFT,
        right: WIDTH - MARGIN_RIGHT,
        top: MARGIN_TOP,
        bottom: HEIGHT - MARGIN_BOTTOM,
        middle_x: (MARGIN_LEFT + WIDTH - MARGIN_RIGHT) / 2.0,
        middle_y: (MARGIN_TOP + HEIGHT - MARGIN_BOTTOM) / 2.0,
    };
    let plot_width = plot.right - plot.left;
    let plot_height = plot.bottom - plot.top;

    let count = |row: &Row, key: &str| row.get(key).and_then(Value::as_u64).unwrap_or(0);
    let max = chart
        .data
        .iter()
        .flat_map(|row| chart.series.iter().map(move |s| count(row, &s.key)))
        .max()
        .unwrap_or(0)
        .max(1);
    let step = max.div_ceil(TICKS).max(1);
    let axis_max = step * max.div_ceil(step);
    let scale = |value: u64| plot_height * value as f64 / axis_max as f64;

    let ticks = (0..=axis_max)
        .step_by(step as usize)
        .map(|value| SvgTick {
            value,
            y: round(plot.bottom - scale(value)),
        })
        .collect();

    let group_width = plot_width / chart.data.len() as f64;
    let bar_width = group_width * 0.8 / chart.series.len().max(1) as f64;
    let groups = chart
        .data
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let start = plot.left + group_width * i as f64 + group_width * 0.1;
            let bars = chart
                .series
                .iter()
                .enumerate()
                .filter_map(|(j, s)| {
                    let value = count(row, &s.key);
                    (value > 0).then(|| SvgBar {
                        x: round(start + bar_width * j as f64),
                        y: round(plot.bottom - scale(value)),
                        width: round(bar_width),
                        height: round(scale(value)),
                        color: s.color.clone(),
                        series: s.key.clone(),
                        value,
                    })
                })
                .collect();
            SvgGroup {
                label: row.get(&chart.x_key).map(value_label).unwrap_or_default(),
                center: round(plot.left + group_width * (i as f64 + 0.5)),
                bars,
            }
        })
        .collect();

    (plot, ticks, groups)
}

/// HTML fragment for the chart: an inline SVG bar chart, or a placeholder.
pub fn render_html(
    env: &Environment<'_>,
    rows: &[Row],
    config: &ChartConfig,
) -> Result<String, minijinja::Error> {
    let template = env.get_template(CHART_TEMPLATE)?;
    let title = config.title.as_deref();
    let description = config.description.as_deref();
    let takeaway = config.takeaway.as_deref();

    match render(rows, config) {
        ChartView::NoData => template.render(context! {
            title, description, takeaway,
            placeholder => "No chart data",
        }),
        ChartView::Unsupported(kind) => template.render(context! {
            title, description, takeaway,
            placeholder => format!("Unsupported chart type: {}", kind),
        }),
        ChartView::Bar(chart) => {
            let (plot, ticks, groups) = layout(&chart);
            template.render(context! {
                title, description, takeaway,
                width => WIDTH,
                height => HEIGHT,
                plot,
                ticks,
                groups,
                x_label => chart.x_label,
                y_label => chart.y_label,
                legend => chart.legend,
                series => chart.series,
            })
        }
    }
}

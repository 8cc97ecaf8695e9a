use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Green, blue, red, amber, purple, brown.
pub const FALLBACK_PALETTE: [&str; 6] = [
    "#4CAF50", "#2196F3", "#F44336", "#FFC107", "#9C27B0", "#795548",
];

pub fn palette_color(index: usize) -> &'static str {
    FALLBACK_PALETTE[index % FALLBACK_PALETTE.len()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    #[default]
    Bar,
    Line,
    Area,
    Pie,
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Area => "area",
            ChartKind::Pie => "pie",
        };
        f.write_str(name)
    }
}

/// Chart description handed to clients and to the renderer.
///
/// Every entry of `y_keys` has a color in `colors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    #[serde(rename = "type", default)]
    pub kind: ChartKind,
    pub x_key: String,
    pub y_keys: Vec<String>,
    #[serde(default)]
    pub colors: BTreeMap<String, String>,
    #[serde(default = "default_legend")]
    pub legend: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub takeaway: Option<String>,
}

fn default_legend() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let config: ChartConfig = serde_json::from_value(json!({
            "type": "line",
            "xKey": "month",
            "yKeys": ["level"]
        }))
        .unwrap();

        assert_eq!(config.kind, ChartKind::Line);
        assert!(config.legend);
        assert!(config.colors.is_empty());

        let out = serde_json::to_value(&config).unwrap();
        assert_eq!(out["type"], "line");
        assert_eq!(out["yKeys"], json!(["level"]));
        assert!(out.get("title").is_none());
    }

    #[test]
    fn test_palette_cycles() {
        assert_eq!(palette_color(0), "#4CAF50");
        assert_eq!(palette_color(6), "#4CAF50");
        assert_eq!(palette_color(8), "#F44336");
    }
}

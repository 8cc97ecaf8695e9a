use crate::chart::config::{palette_color, ChartConfig, ChartKind};
use crate::chart::{ChartError, Row};
use crate::llm::{GenerationRequest, LlmManager, ObjectSchema};
use crate::prompts::{chart_config_prompt, CHART_SYSTEM_PROMPT};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// Chart config as the model returns it, before finalization.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelChartConfig {
    #[serde(rename = "type")]
    pub kind: Option<ChartKind>,
    pub x_key: String,
    pub y_keys: Vec<String>,
    pub colors: Option<BTreeMap<String, String>>,
    pub legend: Option<bool>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub takeaway: Option<String>,
}

/// Axis keys are restricted to the columns of the first row.
pub fn chart_config_schema(candidate_keys: &[&str]) -> ObjectSchema {
    ObjectSchema {
        name: "chart_config",
        schema: json!({
            "type": "object",
            "properties": {
                "type": { "enum": ["bar", "line", "area", "pie"] },
                "xKey": { "enum": candidate_keys },
                "yKeys": {
                    "type": "array",
                    "items": { "enum": candidate_keys },
                    "minItems": 1,
                    "uniqueItems": true
                },
                "colors": {
                    "type": "object",
                    "additionalProperties": { "type": "string" }
                },
                "legend": { "type": "boolean" },
                "title": { "type": "string" },
                "description": { "type": "string" },
                "takeaway": { "type": "string" }
            },
            "required": ["xKey", "yKeys"]
        }),
    }
}

/// Asks the model how to chart `rows` for `user_query`.
pub async fn generate(
    llm: &LlmManager,
    rows: &[Row],
    user_query: &str,
) -> Result<ChartConfig, ChartError> {
    let Some(first) = rows.first() else {
        return Err(ChartError::EmptyData);
    };
    let candidate_keys: Vec<&str> = first.keys().map(String::as_str).collect();

    let request =
        GenerationRequest::prompt(chart_config_prompt(rows, user_query)).with_system(CHART_SYSTEM_PROMPT);
    let raw: ModelChartConfig = llm
        .generate_object(request, &chart_config_schema(&candidate_keys))
        .await
        .map_err(|e| {
            error!("Error generating chart config: {}", e);
            ChartError::Generation(e)
        })?;

    let config = finalize(raw);
    info!(
        "Generated chart config: x={} y={:?}",
        config.x_key, config.y_keys
    );
    Ok(config)
}

/// Applies the fixed presentation rules to a model config.
///
/// The kind is always `bar` and colors always come from the fallback palette
/// by y-key index, even when the model supplied its own.
pub fn finalize(raw: ModelChartConfig) -> ChartConfig {
    if let Some(kind) = raw.kind.filter(|k| *k != ChartKind::Bar) {
        debug!("Model proposed a {} chart; only bar charts are rendered", kind);
    }
    if raw.colors.is_some() {
        debug!("Replacing model colors with the fallback palette");
    }

    let colors = raw
        .y_keys
        .iter()
        .enumerate()
        .map(|(i, key)| (key.clone(), palette_color(i).to_string()))
        .collect();

    ChartConfig {
        kind: ChartKind::Bar,
        x_key: raw.x_key,
        y_keys: raw.y_keys,
        colors,
        legend: raw.legend.unwrap_or(true),
        title: raw.title,
        description: raw.description,
        takeaway: raw.takeaway,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::config::FALLBACK_PALETTE;
    use crate::llm::LlmError;
    use crate::testing::ScriptedModel;
    use serde_json::Value;

    fn raw(kind: Option<ChartKind>, y_keys: &[&str]) -> ModelChartConfig {
        ModelChartConfig {
            kind,
            x_key: "month".to_string(),
            y_keys: y_keys.iter().map(|k| k.to_string()).collect(),
            colors: Some(BTreeMap::from([("a".to_string(), "#000000".to_string())])),
            legend: None,
            title: Some("Errors by month".to_string()),
            description: None,
            takeaway: None,
        }
    }

    fn rows() -> Vec<Row> {
        let data = json!([
            { "month": "Jan", "level": "error" },
            { "month": "Feb", "level": "info" }
        ]);
        match data {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect(),
            _ => unreachable!(),
        }
    }

    fn manager(model: ScriptedModel) -> LlmManager {
        LlmManager::with_provider(Box::new(model), "m")
    }

    #[test]
    fn test_palette_overrides_model_colors_by_index() {
        let keys = ["a", "b", "c", "d", "e", "f", "g"];
        let config = finalize(raw(Some(ChartKind::Bar), &keys));

        assert_eq!(config.colors.len(), keys.len());
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(config.colors[*key], FALLBACK_PALETTE[i % 6]);
        }
    }

    #[test]
    fn test_kind_pinned_to_bar_and_legend_defaults_on() {
        for kind in [None, Some(ChartKind::Pie), Some(ChartKind::Line), Some(ChartKind::Area)] {
            let config = finalize(raw(kind, &["level"]));
            assert_eq!(config.kind, ChartKind::Bar);
            assert!(config.legend);
            assert_eq!(config.title.as_deref(), Some("Errors by month"));
        }
    }

    #[tokio::test]
    async fn test_empty_rows_rejected_before_model_call() {
        let model = ScriptedModel::new().with_completion("{}");
        let seen = model.seen_models();

        let result = generate(&manager(model), &[], "chart it").await;

        assert!(matches!(result, Err(ChartError::EmptyData)));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generate_finalizes_model_output() {
        let model = ScriptedModel::new().with_completion(
            r##"{"type": "pie", "xKey": "month", "yKeys": ["level"], "colors": {"level": "#123456"}, "legend": false}"##,
        );
        let requests = model.seen_requests();

        let config = generate(&manager(model), &rows(), "errors per month").await.unwrap();

        assert_eq!(config.kind, ChartKind::Bar);
        assert_eq!(config.colors["level"], "#4CAF50");
        assert!(!config.legend);

        let seen = requests.lock().unwrap();
        assert_eq!(seen[0].system.as_deref(), Some(CHART_SYSTEM_PROMPT));
        assert!(seen[0].messages[0].content.contains("errors per month"));
    }

    #[tokio::test]
    async fn test_unknown_axis_key_is_a_generation_error() {
        let model = ScriptedModel::new()
            .with_completion(r#"{"xKey": "month", "yKeys": ["severity"]}"#);

        let result = generate(&manager(model), &rows(), "errors").await;
        assert!(matches!(
            result,
            Err(ChartError::Generation(LlmError::ValidationError(_)))
        ));
    }

    #[tokio::test]
    async fn test_model_failure_is_surfaced() {
        let result = generate(&manager(ScriptedModel::failing()), &rows(), "errors").await;
        assert!(matches!(result, Err(ChartError::Generation(_))));
    }
}

//! Instruction templates handed to the language model.
//!
//! Every function here is pure: interpolation only, no I/O.

use chrono::NaiveDate;
use serde_json::{Map, Value};

pub const TITLE_SYSTEM_PROMPT: &str = "
    - you will generate a short title based on the first message a user begins a conversation with
    - ensure it is not more than 80 characters long
    - the title should be a summary of the user's message
    - do not use quotes or colons";

pub const CHART_SYSTEM_PROMPT: &str = "You are a data visualization expert.";

/// Prompt that turns a user message into a search query document.
pub fn search_query_prompt(message: &str, today: NaiveDate) -> String {
    format!(
        r#" You are an expert in generating optimized Elasticsearch queries. Today's date is {today}. Your task is as follows:
1. Generate an Elasticsearch query that retrieves the most relevant documents based on the user's message: "{message}".
2. Extract only the essential keywords from the user's message that directly relate to the content being searched (e.g., "logs," "warnings," "errors"). Ignore filler words (e.g., "show me," "I want to see") as well as words like "visualization" and "dynamic chart" as they are not relevant to the query string.
3. Include a date range filter using the "@timestamp" field only if the user's message contains time-related terms: month names, explicit days, explicit ranges, or relative expressions such as "last week". Convert them into absolute ISO-8601 timestamps in UTC, starting at 00:00:00 on the first day and ending at 23:59:59 on the last day. If the user's message does not contain any time-related terms, omit "post_filter" entirely.
4. The JSON structure must strictly follow this format:
{{
  "query": {{
    "query_string": {{
      "query": "EXTRACTED_KEYWORDS"
    }}
  }},
  "post_filter": {{
    "range": {{
      "@timestamp": {{
        "gte": "START_DATE",
        "lte": "END_DATE"
      }}
    }}
  }},
  "sort": [
    {{
      "@timestamp": {{
        "order": "desc"
      }}
    }}
  ],
  "size": 100
}}
5. The "query_string.query" field must contain only the extracted keywords, and no additional fields or properties should be included.
6. Use "post_filter" for filtering by date range instead of including it in the main query, to ensure results match the query string first before applying the filter.
7. Ensure that the query structure is valid and strictly adheres to the above format without introducing any extraneous fields or invalid configurations.
8. Absolutely no explanations, comments, or text outside the JSON object should be included. Only return a valid JSON object as specified above."#,
        today = today.format("%Y-%m-%d"),
        message = message,
    )
}

/// Final answer instruction combining both enrichment sources.
///
/// Absent sources are rendered as `null` so the model can tell "nothing
/// found" from "not consulted".
pub fn answer_prompt(search_results: &str, database_results: &str, user_query: &str) -> String {
    format!(
        r#"
  You are a conversational assistant. Construct a clear and informative response to the user message: "{user_query}"

  You have access to two data sources:

  Elasticsearch results:
  "{search_results}"

  Database results:
  "{database_results}"

  Your response should:
  1. Analyze both data sources and determine which one(s) contain relevant information for the query
  2. If Elasticsearch results are relevant, use them as your primary source
  3. If database results are relevant, incorporate that information
  4. If both sources have relevant information, combine them coherently
  5. If neither source has relevant information, politely indicate that you cannot help with this specific query
  6. Present information in a user-friendly tone, avoiding technical jargon unless necessary
  7. Include links or metadata from the results when available
  8. Avoid speculating or including information not present in the results
  9. Always answer in the same language as the user's query
  10. Only provide information that is directly supported by either data source
"#
    )
}

/// Chart configuration request for tabular rows.
pub fn chart_config_prompt(rows: &[Map<String, Value>], user_query: &str) -> String {
    let data = serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string());
    let keys: Vec<&String> = rows.first().map(|r| r.keys().collect()).unwrap_or_default();
    let keys = serde_json::to_string(&keys).unwrap_or_else(|_| "[]".to_string());

    format!(
        r##"Given the following data, generate the chart config that best visualises the data and answers the users query.
      For multiple groups use multi-lines.

      The response MUST include a colors object mapping each yKey to a hex color code.

      Here is an example complete config:
      {{
      "type": "bar",
      "xKey": "month",
      "yKeys": ["sales", "profit", "expenses"],
      "colors": {{
        "sales": "#4CAF50",
        "profit": "#2196F3",
        "expenses": "#F44336"
      }},
      "legend": true
      }}

      User Query:
      {user_query}

      Data:
      {data}

      Possible y-keys are:
      {keys}

      Requirements:
      1. The config MUST include a colors object
      2. Select the appropriate yKeys from the possible y-keys above.
      3. Each yKey MUST have a corresponding color in the colors object
      4. Colors should be in hex format (e.g. #4CAF50)
      5. Choose colors that meaningfully represent the data (e.g. red for errors, green for success)
      6. If no meaningful color association exists, use any appropriate color
      7. If the xKey makes sense to be time-related, choose the best range (e.g., "month", "year", "day") based on the data provided as the xKey.
      8. Return a complete JSON object with all required fields including colors.
      "##
    )
}

/// Natural language to SQL for the relational source.
pub fn sql_prompt(question: &str, schema: &str) -> String {
    format!(
        r#"
### Instructions:
Your task is to convert a question into a SQL query for DuckDB, given a database schema.
Adhere to these rules:
- **Be careful with column names - they are case sensitive**
- **Use the exact spelling of column names as provided in the schema**
- **Deliberately go through the question and database schema word by word** to appropriately answer the question
- **Use Table Aliases** to prevent ambiguity. For example, `SELECT table1.col1, table2.col1 FROM table1 JOIN table2 ON table1.id = table2.id`.
- Only write a single read-only SELECT statement
- When creating a ratio, always cast the numerator as float

### Input:
Generate a SQL query that answers the question `{question}`.
This query will run on a DuckDB database with the following tables and columns:

{schema}

### Response:
Based on your instructions, here is the SQL query I have generated to answer the question `{question}`:
```sql
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_prompt_embeds_message_and_date() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        let prompt = search_query_prompt("errors in March", today);
        assert!(prompt.contains(r#"user's message: "errors in March""#));
        assert!(prompt.contains("Today's date is 2024-05-17"));
        assert!(prompt.contains(r#""size": 100"#));
    }

    #[test]
    fn test_answer_prompt_keeps_both_sources() {
        let prompt = answer_prompt(r#"{"hits":[]}"#, "null", "how many errors?");
        assert!(prompt.contains(r#"Elasticsearch results:
  "{"hits":[]}""#));
        assert!(prompt.contains("Database results:\n  \"null\""));
        assert!(prompt.contains("same language as the user's query"));
    }

    #[test]
    fn test_chart_prompt_lists_first_row_keys() {
        let rows = vec![
            json!({"month": "Jan", "level": "error"}).as_object().unwrap().clone(),
            json!({"month": "Feb", "extra": 1}).as_object().unwrap().clone(),
        ];
        let prompt = chart_config_prompt(&rows, "errors per month");
        let keys_section = prompt
            .split("Possible y-keys are:")
            .nth(1)
            .and_then(|rest| rest.split("Requirements:").next())
            .unwrap();
        assert!(keys_section.contains(r#""level""#));
        assert!(keys_section.contains(r#""month""#));
        assert!(!keys_section.contains("extra"));
        assert!(prompt.contains("errors per month"));
    }
}

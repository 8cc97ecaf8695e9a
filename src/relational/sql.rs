use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

static READ_ONLY_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*(select|with)\b").unwrap());

static WRITE_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(insert|update|delete|create|alter|drop|attach|copy|pragma|install|load)\b")
        .unwrap()
});

/// Pulls the SQL statement out of a model answer.
pub fn extract_sql(content: &str) -> String {
    // Try to extract SQL from between ```sql and ``` markers
    if let Some(start) = content.find("```sql") {
        let after = &content[start + 6..];
        let end = after.find("```").unwrap_or(after.len());
        let sql = after[..end].trim();
        debug!("Extracted SQL from code block: {}", sql);
        return sql.to_string();
    }

    // Try alternate syntax without a language specifier: ``` and ```
    if let Some(start) = content.find("```") {
        let content_after_first = &content[start + 3..];
        if let Some(end) = content_after_first.find("```") {
            let sql = content_after_first[..end].trim();
            debug!("Extracted SQL from plain code block: {}", sql);
            return sql.to_string();
        }
    }

    // Look for a line starting with SELECT or WITH and collect until the statement ends
    let lines: Vec<&str> = content.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if !READ_ONLY_START.is_match(line) {
            continue;
        }
        let mut sql = line.trim().to_string();
        for next_line in lines.iter().skip(i + 1).map(|l| l.trim()) {
            if next_line.starts_with("```") || sql.ends_with(';') {
                break;
            }
            sql.push(' ');
            sql.push_str(next_line);
        }
        info!("Extracted SQL using line scanning");
        return sql;
    }

    // The prompt ends inside an open ```sql block, so bare SQL is common
    content.trim().to_string()
}

/// Accepts a single read-only statement; returns it without a trailing `;`.
pub fn ensure_read_only(sql: &str) -> Result<String, String> {
    let statement = sql.trim().trim_end_matches(';').trim();
    if statement.is_empty() {
        return Err("empty SQL statement".to_string());
    }
    if statement.contains(';') {
        return Err("multiple SQL statements are not allowed".to_string());
    }
    if !READ_ONLY_START.is_match(statement) {
        return Err("only SELECT or WITH statements are allowed".to_string());
    }
    if let Some(keyword) = WRITE_KEYWORD.find(statement) {
        return Err(format!("statement contains forbidden keyword {}", keyword.as_str()));
    }
    Ok(statement.to_string())
}

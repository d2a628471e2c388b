//! Table formatting helpers for CLI output.

use comfy_table::{ContentArrangement, Table};
use serde_json::Value;
use shipwatch_core::RawConfig;

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Render a (masked) component configuration as `key=value` pairs.
pub fn format_config(config: &RawConfig) -> String {
    config
        .iter()
        .map(|(key, value)| format!("{key}={}", format_value(value)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_table() {
        let table = new_table(&["ID", "STATUS", "CONFIG"]);
        let output = table.to_string();
        assert!(output.contains("ID"));
        assert!(output.contains("STATUS"));
        assert!(output.contains("CONFIG"));
    }

    #[test]
    fn test_new_table_with_rows() {
        let mut table = new_table(&["COL1", "COL2"]);
        table.add_row(["hello", "world"]);
        let output = table.to_string();
        assert!(output.contains("hello"));
        assert!(output.contains("world"));
    }

    #[test]
    fn test_format_config() {
        let mut config = RawConfig::new();
        config.insert("url".into(), json!("https://registry.example.org"));
        config.insert("password".into(), json!("s****t"));
        config.insert("watchall".into(), json!(false));
        config.insert("port".into(), json!(2375));

        assert_eq!(
            format_config(&config),
            "password=s****t port=2375 url=https://registry.example.org watchall=false"
        );
    }

    #[test]
    fn test_format_config_empty() {
        assert_eq!(format_config(&RawConfig::new()), "");
    }
}

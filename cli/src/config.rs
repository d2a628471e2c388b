//! Configuration file loading.
//!
//! String values may reference environment variables as `${NAME}`; they are
//! expanded before the document is turned into an [`EngineConfig`], so
//! credentials can stay out of the file.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_yaml::Value;
use shipwatch_core::EngineConfig;

/// Default configuration path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "shipwatch.yml";

/// Read and expand a configuration file using the process environment.
pub fn load(path: &Path) -> Result<EngineConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration {}", path.display()))?;
    parse(&text, |name| std::env::var(name).ok())
        .with_context(|| format!("invalid configuration {}", path.display()))
}

/// Parse a YAML document, resolving `${NAME}` references through `lookup`.
pub fn parse<F>(text: &str, lookup: F) -> Result<EngineConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut document: Value = serde_yaml::from_str(text)?;
    if document.is_null() {
        return Ok(EngineConfig::default());
    }
    expand_value(&mut document, &lookup)?;

    let config: EngineConfig = serde_yaml::from_value(document)?;
    config.engine.validate()?;
    Ok(config)
}

fn expand_value<F>(value: &mut Value, lookup: &F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        Value::String(s) => {
            if s.contains("${") {
                *s = expand(s, lookup)?;
            }
        }
        Value::Sequence(items) => {
            for item in items {
                expand_value(item, lookup)?;
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                expand_value(item, lookup)?;
            }
        }
        Value::Tagged(tagged) => expand_value(&mut tagged.value, lookup)?,
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

/// Expand every `${NAME}` in `input`. An unterminated reference is kept as is.
pub fn expand<F>(input: &str, lookup: &F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = after[..end].trim();
        if name.is_empty() {
            bail!("empty environment reference in \"{input}\"");
        }
        match lookup(name) {
            Some(value) => out.push_str(&value),
            None => bail!("environment variable {name} is not set"),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_expand_replaces_references() {
        let lookup = env(&[("USER", "bot"), ("HOST", "registry.local")]);
        assert_eq!(
            expand("https://${USER}@${HOST}/v2", &lookup).unwrap(),
            "https://bot@registry.local/v2"
        );
    }

    #[test]
    fn test_expand_keeps_plain_and_unterminated_text() {
        let lookup = env(&[]);
        assert_eq!(expand("no references", &lookup).unwrap(), "no references");
        assert_eq!(expand("cost $5", &lookup).unwrap(), "cost $5");
        assert_eq!(expand("open ${NAME", &lookup).unwrap(), "open ${NAME");
    }

    #[test]
    fn test_expand_missing_variable() {
        let err = expand("${MISSING}", &env(&[])).unwrap_err();
        assert!(err.to_string().contains("MISSING"));
    }

    #[test]
    fn test_expand_empty_reference() {
        assert!(expand("${ }", &env(&[])).is_err());
    }

    #[test]
    fn test_parse_expands_nested_values() {
        let yaml = r#"
log_level: debug
engine:
  concurrency: 2
registries:
  private:
    type: custom
    url: https://registry.example.org
    login: ${REG_USER}
    password: ${REG_PASSWORD}
triggers:
  ops:
    type: webhook
    url: https://hooks.example.org/${HOOK_ID}
    headers:
      X-Team: platform
"#;
        let lookup = env(&[
            ("REG_USER", "robot"),
            ("REG_PASSWORD", "s3cret"),
            ("HOOK_ID", "42"),
        ]);
        let config = parse(yaml, lookup).unwrap();

        assert_eq!(config.log_level, shipwatch_core::LogLevel::Debug);
        assert_eq!(config.engine.concurrency, 2);

        let registries = config.registry_settings();
        assert_eq!(registries.len(), 1);
        assert_eq!(registries[0].type_name, "custom");
        assert_eq!(registries[0].config["login"], "robot");
        assert_eq!(registries[0].config["password"], "s3cret");

        let triggers = config.trigger_settings();
        assert_eq!(triggers[0].config["url"], "https://hooks.example.org/42");
        assert_eq!(triggers[0].config["headers"]["X-Team"], "platform");
    }

    #[test]
    fn test_parse_empty_document_uses_defaults() {
        let config = parse("", env(&[])).unwrap();
        assert_eq!(config.engine.concurrency, 8);
        assert!(config.watchers.is_empty());
    }

    #[test]
    fn test_parse_rejects_invalid_engine_settings() {
        let err = parse("engine:\n  concurrency: 0\n", env(&[])).unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn test_parse_missing_variable_fails() {
        let yaml = "registries:\n  hub:\n    token: ${HUB_TOKEN}\n";
        let err = parse(yaml, env(&[])).unwrap_err();
        assert!(err.to_string().contains("HUB_TOKEN"));
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipwatch.yml");
        std::fs::write(&path, "watchers:\n  local:\n    type: docker\n").unwrap();

        let config = load(&path).unwrap();
        let watchers = config.watcher_settings();
        assert_eq!(watchers.len(), 1);
        assert_eq!(watchers[0].name, "local");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("absent.yml")).unwrap_err();
        assert!(err.to_string().contains("failed to read configuration"));
    }
}

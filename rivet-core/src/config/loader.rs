use std::collections::HashMap;
use std::path::Path;

use super::value::{yaml_key, ConfigValue};
use super::ConfigError;

/// Merge a YAML file into `values`. A missing file is not an error.
pub(crate) fn merge_file(path: &Path, values: &mut HashMap<String, ConfigValue>) -> Result<bool, ConfigError> {
    if !path.is_file() {
        return Ok(false);
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
    merge_str(&content, values)
        .map_err(|e| ConfigError::Load(format!("{}: {e}", path.display())))?;
    Ok(true)
}

pub(crate) fn merge_str(content: &str, values: &mut HashMap<String, ConfigValue>) -> Result<(), ConfigError> {
    let doc: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))?;
    flatten("", &doc, values);
    Ok(())
}

/// Flatten nested mappings into dot-separated keys. Sequences are kept whole
/// under their parent key.
fn flatten(prefix: &str, node: &serde_yaml::Value, out: &mut HashMap<String, ConfigValue>) {
    match node {
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map {
                let key = yaml_key(k);
                let full = if prefix.is_empty() {
                    key
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&full, v, out);
            }
        }
        leaf if !prefix.is_empty() => {
            out.insert(prefix.to_string(), ConfigValue::from_yaml(leaf));
        }
        _ => {}
    }
}

/// `APP_JWT_SECRET` -> `app.jwt.secret`.
pub(crate) fn env_key(var: &str) -> String {
    var.to_ascii_lowercase().replace('_', ".")
}

/// Hyphens and dots compare equal, so `GUARDS_UNKNOWN_POLICY` reaches
/// `guards.unknown-policy`.
pub(crate) fn normalize(key: &str) -> String {
    key.replace('-', ".")
}

/// Overlay environment variables onto `values`, replacing a file key whose
/// normalized form matches and inserting the dotted key otherwise.
pub(crate) fn overlay_env(
    vars: impl IntoIterator<Item = (String, String)>,
    values: &mut HashMap<String, ConfigValue>,
) {
    let index: HashMap<String, String> = values
        .keys()
        .map(|k| (normalize(k), k.clone()))
        .collect();
    for (var, value) in vars {
        let dotted = env_key(&var);
        let key = index.get(&dotted).cloned().unwrap_or(dotted);
        values.insert(key, ConfigValue::String(value));
    }
}

//! Config validation - warns about unknown fields

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Validate JSON config and warn about unknown fields.
pub fn warn_unknown_fields(content: &str, config_name: &str) {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return;
    };

    let expected = expected_config_keys();
    for path in find_unknown_keys(&value, &expected, "") {
        warn!("Unknown config field in {config_name}: {path}");
    }
}

/// Find unknown keys in JSON value compared to expected keys.
/// Returns paths like "timeouts.connectMS" for unknown fields.
fn find_unknown_keys(value: &Value, expected: &ExpectedKeys, prefix: &str) -> Vec<String> {
    let mut unknowns = Vec::new();

    let Value::Object(obj) = value else {
        return unknowns;
    };

    for (key, child) in obj {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        if let Some(nested) = expected.nested.get(key.as_str()) {
            unknowns.extend(find_unknown_keys(child, nested, &path));
        } else if let Some(item) = expected.items.get(key.as_str()) {
            if let Value::Array(entries) = child {
                for (i, entry) in entries.iter().enumerate() {
                    unknowns.extend(find_unknown_keys(entry, item, &format!("{path}[{i}]")));
                }
            }
        } else if !expected.fields.contains(key.as_str()) {
            unknowns.push(path);
        }
    }

    unknowns
}

/// Expected keys for a config section.
/// `fields` are leaf fields, `nested` are nested objects and `items` are
/// arrays of objects, each with their own expected keys.
struct ExpectedKeys {
    fields: HashSet<&'static str>,
    nested: HashMap<&'static str, ExpectedKeys>,
    items: HashMap<&'static str, ExpectedKeys>,
}

impl ExpectedKeys {
    fn new(fields: &[&'static str]) -> Self {
        Self {
            fields: fields.iter().copied().collect(),
            nested: HashMap::new(),
            items: HashMap::new(),
        }
    }

    fn with_nested(mut self, key: &'static str, nested: ExpectedKeys) -> Self {
        self.nested.insert(key, nested);
        self
    }

    fn with_items(mut self, key: &'static str, item: ExpectedKeys) -> Self {
        self.items.insert(key, item);
        self
    }
}

fn expected_config_keys() -> ExpectedKeys {
    let connection_keys = ExpectedKeys::new(&[
        "host",
        "port",
        "username",
        "password",
        "defaultComponent",
        "verbose",
    ]);

    let timeout_keys = ExpectedKeys::new(&["connectMs", "operationMs", "settleMs"]);

    let exclusion_keys = ExpectedKeys::new(&["control", "stringContains", "component"]);

    let diagnostics_keys = ExpectedKeys::new(&[
        "componentTypeMarkers",
        "healthyStatuses",
        "detailMaxChars",
    ])
    .with_items("exclusions", exclusion_keys);

    ExpectedKeys::new(&[])
        .with_nested("connection", connection_keys)
        .with_nested("timeouts", timeout_keys)
        .with_nested("diagnostics", diagnostics_keys)
}

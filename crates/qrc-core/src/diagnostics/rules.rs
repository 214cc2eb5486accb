//! Detection rules applied to a component's controls.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use qrc_types::{ComponentControls, ComponentIssue, ControlSnapshot};

use crate::config::DiagnosticsConfig;
use crate::{Error, Result};

/// Script error counter
pub const ERROR_COUNT_CONTROL: &str = "script.error.count";

/// Script log, excerpted into issue details
pub const LOG_HISTORY_CONTROL: &str = "log.history";

/// A status control that is not a fault even though its value is outside
/// the healthy set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionRule {
    /// Substring of the control name
    pub control: String,

    /// Substring of the control's string value
    pub string_contains: String,

    /// Regex the component name must match; any component if absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

impl ExclusionRule {
    /// Encoder streams report a non-OK status while connected.
    #[must_use]
    pub fn stream_status_connected() -> Self {
        Self {
            control: "StreamStatus".to_string(),
            string_contains: "Connected to Encoder".to_string(),
            component: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Exclusion {
    control: String,
    string_contains: String,
    component: Option<Regex>,
}

impl Exclusion {
    fn compile(rule: &ExclusionRule) -> Result<Self> {
        let component = rule
            .component
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::Config(format!("invalid exclusion component pattern: {e}")))?;

        Ok(Self {
            control: rule.control.clone(),
            string_contains: rule.string_contains.clone(),
            component,
        })
    }

    fn excludes(&self, component: &str, control: &ControlSnapshot) -> bool {
        control.name.contains(&self.control)
            && control
                .string_value()
                .is_some_and(|s| s.contains(&self.string_contains))
            && self
                .component
                .as_ref()
                .is_none_or(|pattern| pattern.is_match(component))
    }
}

/// Compiled form of [`DiagnosticsConfig`].
#[derive(Debug, Clone)]
pub struct DiagnosticsPolicy {
    type_markers: Vec<String>,
    healthy_statuses: Vec<i32>,
    detail_max_chars: usize,
    exclusions: Vec<Exclusion>,
}

impl DiagnosticsPolicy {
    /// # Errors
    ///
    /// Returns `Error::Config` if an exclusion pattern is not a valid regex.
    pub fn from_config(config: &DiagnosticsConfig) -> Result<Self> {
        let exclusions = config
            .exclusions
            .iter()
            .map(Exclusion::compile)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::with_exclusions(config, exclusions))
    }

    fn with_exclusions(config: &DiagnosticsConfig, exclusions: Vec<Exclusion>) -> Self {
        Self {
            type_markers: config.component_type_markers.clone(),
            healthy_statuses: config.healthy_statuses.clone(),
            detail_max_chars: config.detail_max_chars,
            exclusions,
        }
    }

    #[must_use]
    pub fn type_markers(&self) -> &[String] {
        &self.type_markers
    }

    fn is_healthy(&self, status: f64) -> bool {
        self.healthy_statuses
            .iter()
            .any(|healthy| (f64::from(*healthy) - status).abs() < f64::EPSILON)
    }

    fn is_excluded(&self, component: &str, control: &ControlSnapshot) -> bool {
        self.exclusions.iter().any(|e| e.excludes(component, control))
    }

    /// An issue if the component's error counter is above zero.
    #[must_use]
    pub fn error_issue(&self, controls: &ComponentControls) -> Option<ComponentIssue> {
        let counter = controls.control(ERROR_COUNT_CONTROL)?;
        let count = counter.numeric_value()?;
        if count <= 0.0 {
            return None;
        }

        let details = controls
            .control(LOG_HISTORY_CONTROL)
            .and_then(ControlSnapshot::string_value)
            .map(|log| excerpt(log, self.detail_max_chars));

        Some(ComponentIssue {
            component: controls.name.clone(),
            control: None,
            value: counter.value.clone(),
            details,
        })
    }

    /// One issue per `Status` control outside the healthy set.
    #[must_use]
    pub fn status_issues(&self, controls: &ComponentControls) -> Vec<ComponentIssue> {
        controls
            .controls
            .iter()
            .filter(|control| control.is_status())
            .filter(|control| !control.numeric_value().is_some_and(|v| self.is_healthy(v)))
            .filter(|control| {
                let excluded = self.is_excluded(&controls.name, control);
                if excluded {
                    debug!(
                        component = %controls.name,
                        control = %control.name,
                        "Status matches an exclusion rule"
                    );
                }
                !excluded
            })
            .map(|control| ComponentIssue {
                component: controls.name.clone(),
                control: Some(control.name.clone()),
                value: control.value.clone(),
                details: control
                    .string_value()
                    .map(|s| excerpt(s, self.detail_max_chars)),
            })
            .collect()
    }
}

impl Default for DiagnosticsPolicy {
    /// Built from [`DiagnosticsConfig::default`]. A built-in rule that fails
    /// to compile is dropped with a warning.
    fn default() -> Self {
        let config = DiagnosticsConfig::default();
        let exclusions = config
            .exclusions
            .iter()
            .filter_map(|rule| match Exclusion::compile(rule) {
                Ok(exclusion) => Some(exclusion),
                Err(e) => {
                    warn!(control = %rule.control, error = %e, "Skipping default exclusion rule");
                    None
                }
            })
            .collect();

        Self::with_exclusions(&config, exclusions)
    }
}

/// The first `max_chars` characters of `text`, with `...` appended if cut.
#[must_use]
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn control(name: &str, kind: &str, value: Value, string: &str) -> ControlSnapshot {
        ControlSnapshot {
            name: name.to_string(),
            control_type: Some(kind.to_string()),
            value,
            string: Some(string.to_string()),
            position: None,
        }
    }

    fn component(name: &str, controls: Vec<ControlSnapshot>) -> ComponentControls {
        ComponentControls {
            name: name.to_string(),
            controls,
        }
    }

    #[test]
    fn test_excerpt() {
        let log = "x".repeat(50);
        let cut = excerpt(&log, 30);
        assert_eq!(cut, format!("{}...", "x".repeat(30)));

        assert_eq!(excerpt("short", 30), "short");
        assert_eq!(excerpt(&"y".repeat(30), 30), "y".repeat(30));
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo wörld", 4), "héll...");
    }

    #[test]
    fn test_error_issue_with_log_excerpt() {
        let log = "Line 12: attempt to index a nil value (global 'x')";
        let controls = component(
            "Main Script",
            vec![
                control(ERROR_COUNT_CONTROL, "Float", json!(2), "2"),
                control(LOG_HISTORY_CONTROL, "Text", json!(log), log),
            ],
        );

        let issue = DiagnosticsPolicy::default().error_issue(&controls).unwrap();
        assert_eq!(issue.component, "Main Script");
        assert_eq!(issue.value, json!(2));
        assert_eq!(issue.details.as_deref(), Some("Line 12: attempt to index a ni..."));
    }

    #[test]
    fn test_zero_error_count_is_healthy() {
        let controls = component(
            "Main Script",
            vec![control(ERROR_COUNT_CONTROL, "Float", json!(0), "0")],
        );
        assert!(DiagnosticsPolicy::default().error_issue(&controls).is_none());

        let no_counter = component("Gain", vec![]);
        assert!(DiagnosticsPolicy::default().error_issue(&no_counter).is_none());
    }

    #[test]
    fn test_status_outside_healthy_set() {
        let policy = DiagnosticsPolicy::default();

        let faulted = component(
            "Plugin",
            vec![control("Status", "Status", json!(1), "Compromised")],
        );
        let issues = policy.status_issues(&faulted);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].control.as_deref(), Some("Status"));
        assert_eq!(issues[0].value, json!(1));

        for healthy in [0, 3] {
            let ok = component("Plugin", vec![control("Status", "Status", json!(healthy), "OK")]);
            assert!(policy.status_issues(&ok).is_empty());
        }
    }

    #[test]
    fn test_non_status_controls_ignored() {
        let controls = component("Plugin", vec![control("gain", "Float", json!(1), "1")]);
        assert!(DiagnosticsPolicy::default().status_issues(&controls).is_empty());
    }

    #[test]
    fn test_stream_status_exclusion() {
        let policy = DiagnosticsPolicy::default();

        let connected = component(
            "Decoder 1",
            vec![control("StreamStatus", "Status", json!(2), "Connected to Encoder ENC-1")],
        );
        assert!(policy.status_issues(&connected).is_empty());

        let broken = component(
            "Decoder 1",
            vec![control("StreamStatus", "Status", json!(2), "No stream")],
        );
        assert_eq!(policy.status_issues(&broken).len(), 1);
    }

    #[test]
    fn test_exclusion_scoped_to_component_pattern() {
        let config = DiagnosticsConfig {
            exclusions: vec![ExclusionRule {
                component: Some("^Decoder".to_string()),
                ..ExclusionRule::stream_status_connected()
            }],
            ..DiagnosticsConfig::default()
        };
        let policy = DiagnosticsPolicy::from_config(&config).unwrap();
        let status = control("StreamStatus", "Status", json!(2), "Connected to Encoder");

        assert!(policy.status_issues(&component("Decoder 2", vec![status.clone()])).is_empty());
        assert_eq!(policy.status_issues(&component("Camera", vec![status])).len(), 1);
    }

    #[test]
    fn test_default_policy_compiles_default_rules() {
        let config = DiagnosticsConfig::default();
        let compiled = DiagnosticsPolicy::from_config(&config).unwrap();
        let default = DiagnosticsPolicy::default();

        assert_eq!(default.exclusions.len(), config.exclusions.len());
        assert_eq!(default.exclusions.len(), compiled.exclusions.len());
        assert_eq!(default.type_markers(), compiled.type_markers());
        assert_eq!(default.healthy_statuses, compiled.healthy_statuses);
    }

    #[test]
    fn test_exclusion_compile_keeps_component_pattern() {
        let rule = ExclusionRule {
            component: Some("^Decoder".to_string()),
            ..ExclusionRule::stream_status_connected()
        };
        let exclusion = Exclusion::compile(&rule).unwrap();
        let status = control("StreamStatus", "Status", json!(2), "Connected to Encoder");

        assert!(exclusion.excludes("Decoder 1", &status));
        assert!(!exclusion.excludes("Camera", &status));
    }

    #[test]
    fn test_invalid_exclusion_pattern() {
        let config = DiagnosticsConfig {
            exclusions: vec![ExclusionRule {
                component: Some("(".to_string()),
                ..ExclusionRule::stream_status_connected()
            }],
            ..DiagnosticsConfig::default()
        };
        assert!(matches!(
            DiagnosticsPolicy::from_config(&config),
            Err(Error::Config(_))
        ));
    }
}

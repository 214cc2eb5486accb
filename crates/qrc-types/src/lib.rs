//! Shared data types for the qrc Core control client.
//!
//! Field names follow the device's wire casing (`Name`, `Type`, `Controls`)
//! so these types deserialize directly from `Component.*` results. Report
//! types use camelCase since they are handed to external event sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Control type reported for health status controls.
pub const STATUS_CONTROL_TYPE: &str = "Status";

/// A named addressable unit on the Core, as listed by `Component.GetComponents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "ID", default)]
    pub id: String,

    #[serde(rename = "Type", default)]
    pub component_type: String,
}

impl ComponentDescriptor {
    /// True if the component type contains any of the given markers.
    ///
    /// Matching is case-sensitive: the device reports `script` for Lua
    /// scripts and `PLUGIN_...` for plugins.
    #[must_use]
    pub fn type_matches_any<S: AsRef<str>>(&self, markers: &[S]) -> bool {
        markers
            .iter()
            .any(|marker| self.component_type.contains(marker.as_ref()))
    }
}

/// Read-only view of one control's reported state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlSnapshot {
    #[serde(rename = "Name")]
    pub name: String,

    /// `Text`, `Float`, `Status`, `Boolean`, ... (absent in `Component.Get` results)
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub control_type: Option<String>,

    #[serde(rename = "Value", default)]
    pub value: Value,

    #[serde(rename = "String", default, skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,

    #[serde(rename = "Position", default, skip_serializing_if = "Option::is_none")]
    pub position: Option<f64>,
}

impl ControlSnapshot {
    /// Numeric interpretation of `Value`.
    ///
    /// Booleans map to 0/1 and numeric strings are parsed; anything else is `None`.
    #[must_use]
    pub fn numeric_value(&self) -> Option<f64> {
        match &self.value {
            Value::Number(n) => n.as_f64(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// String interpretation: the `String` field, falling back to a string `Value`.
    #[must_use]
    pub fn string_value(&self) -> Option<&str> {
        self.string.as_deref().or_else(|| self.value.as_str())
    }

    #[must_use]
    pub fn is_status(&self) -> bool {
        self.control_type.as_deref() == Some(STATUS_CONTROL_TYPE)
    }
}

/// Result payload of `Component.Get` and `Component.GetControls`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentControls {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Controls", default)]
    pub controls: Vec<ControlSnapshot>,
}

impl ComponentControls {
    #[must_use]
    pub fn control(&self, name: &str) -> Option<&ControlSnapshot> {
        self.controls.iter().find(|c| c.name == name)
    }
}

/// One unhealthy finding on a component.
///
/// Error-count issues carry the count in `value` and no `control`; status
/// issues name the offending control and carry its status code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentIssue {
    #[serde(rename = "Component")]
    pub component: String,

    #[serde(rename = "Control", default, skip_serializing_if = "Option::is_none")]
    pub control: Option<String>,

    #[serde(rename = "Value", default)]
    pub value: Value,

    /// Truncated log or status string excerpt
    #[serde(rename = "Details", default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Labels identifying where a diagnostics run happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteLabels {
    pub system: String,
    pub site: String,
    pub host: String,
}

impl SiteLabels {
    #[must_use]
    pub fn new(
        system: impl Into<String>,
        site: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            system: system.into(),
            site: site.into(),
            host: host.into(),
        }
    }
}

/// Audit trail entry emitted during remediation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub labels: SiteLabels,

    #[serde(flatten)]
    pub kind: AuditKind,
}

impl AuditEvent {
    #[must_use]
    pub fn now(labels: &SiteLabels, kind: AuditKind) -> Self {
        Self {
            timestamp: Utc::now(),
            labels: labels.clone(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditKind {
    /// Initial detection, emitted before any restart
    IssuesDetected {
        #[serde(rename = "errorCount")]
        error_count: usize,
        #[serde(rename = "statusCount")]
        status_count: usize,
        errors: Vec<ComponentIssue>,
        statuses: Vec<ComponentIssue>,
    },

    RestartAttempted {
        component: String,
        succeeded: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    IssuesPersisting {
        component: String,
        errors: Vec<ComponentIssue>,
        statuses: Vec<ComponentIssue>,
    },

    IssuesResolved {
        component: String,
    },
}

impl AuditKind {
    #[must_use]
    pub fn is_restart(&self) -> bool {
        matches!(self, AuditKind::RestartAttempted { .. })
    }
}

/// Outcome of one diagnostics and remediation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsReport {
    pub script_errors: Vec<ComponentIssue>,
    pub script_statuses: Vec<ComponentIssue>,
    pub persistent_errors: Vec<ComponentIssue>,
    pub persistent_statuses: Vec<ComponentIssue>,
    pub audit_events: Vec<AuditEvent>,
}

impl DiagnosticsReport {
    /// No issues were found on the initial scan.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.script_errors.is_empty() && self.script_statuses.is_empty()
    }

    /// Issues remain after remediation.
    #[must_use]
    pub fn has_persistent_issues(&self) -> bool {
        !self.persistent_errors.is_empty() || !self.persistent_statuses.is_empty()
    }

    /// Distinct component names across both initial issue lists, in first-seen order.
    #[must_use]
    pub fn affected_components(&self) -> Vec<String> {
        distinct_components(self.script_errors.iter().chain(&self.script_statuses))
    }
}

/// Distinct component names in first-seen order.
pub fn distinct_components<'a>(
    issues: impl IntoIterator<Item = &'a ComponentIssue>,
) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for issue in issues {
        if !names.iter().any(|n| n == &issue.component) {
            names.push(issue.component.clone());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]

    use super::*;
    use serde_json::json;

    fn issue(component: &str) -> ComponentIssue {
        ComponentIssue {
            component: component.to_string(),
            control: None,
            value: json!(1),
            details: None,
        }
    }

    #[test]
    fn test_component_descriptor_from_device() {
        let json = json!([
            {"Name": "Main Script", "ID": "c1", "Type": "device_controller_script", "Properties": []},
            {"Name": "Zoom Plugin", "ID": "c2", "Type": "%PLUGIN%_zoom_%FP%_abc"},
            {"Name": "Gain 1", "Type": "gain"}
        ]);
        let components: Vec<ComponentDescriptor> = serde_json::from_value(json).unwrap();

        assert_eq!(components.len(), 3);
        assert_eq!(components[0].name, "Main Script");
        assert_eq!(components[0].id, "c1");
        assert_eq!(components[2].id, "");
        assert!(components[0].type_matches_any(&["script", "PLUGIN"]));
        assert!(components[1].type_matches_any(&["script", "PLUGIN"]));
        assert!(!components[2].type_matches_any(&["script", "PLUGIN"]));
    }

    #[test]
    fn test_type_markers_are_case_sensitive() {
        let component = ComponentDescriptor {
            name: "x".to_string(),
            id: String::new(),
            component_type: "Script".to_string(),
        };
        assert!(!component.type_matches_any(&["script"]));
    }

    #[test]
    fn test_control_snapshot_numeric_value() {
        let mut control = ControlSnapshot {
            name: "script.error.count".to_string(),
            value: json!(2.0),
            ..Default::default()
        };
        assert_eq!(control.numeric_value(), Some(2.0));

        control.value = json!(true);
        assert_eq!(control.numeric_value(), Some(1.0));

        control.value = json!(" 3 ");
        assert_eq!(control.numeric_value(), Some(3.0));

        control.value = json!("OK");
        assert_eq!(control.numeric_value(), None);

        control.value = Value::Null;
        assert_eq!(control.numeric_value(), None);
    }

    #[test]
    fn test_control_snapshot_string_value_fallback() {
        let control = ControlSnapshot {
            name: "log.history".to_string(),
            value: json!("line one"),
            ..Default::default()
        };
        assert_eq!(control.string_value(), Some("line one"));

        let control = ControlSnapshot {
            name: "status".to_string(),
            value: json!(0),
            string: Some("OK".to_string()),
            ..Default::default()
        };
        assert_eq!(control.string_value(), Some("OK"));
    }

    #[test]
    fn test_component_controls_from_get_controls_result() {
        let json = json!({
            "Name": "Main Script",
            "Controls": [
                {"Name": "script.error.count", "Type": "Float", "Value": 0.0, "String": "0"},
                {"Name": "status", "Type": "Status", "Value": 0, "String": "OK", "Position": 0.0}
            ]
        });
        let controls: ComponentControls = serde_json::from_value(json).unwrap();

        assert_eq!(controls.name, "Main Script");
        assert!(controls.control("status").unwrap().is_status());
        assert!(!controls.control("script.error.count").unwrap().is_status());
        assert!(controls.control("missing").is_none());
    }

    #[test]
    fn test_component_issue_wire_casing() {
        let issue = ComponentIssue {
            component: "Main Script".to_string(),
            control: None,
            value: json!(2),
            details: Some("boom...".to_string()),
        };
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["Component"], "Main Script");
        assert_eq!(json["Value"], 2);
        assert_eq!(json["Details"], "boom...");
        assert!(json.get("Control").is_none());
    }

    #[test]
    fn test_audit_event_serialization() {
        let labels = SiteLabels::new("sys", "site-a", "core-1");
        let event = AuditEvent::now(
            &labels,
            AuditKind::RestartAttempted {
                component: "Main Script".to_string(),
                succeeded: false,
                error: Some("Connection closed".to_string()),
            },
        );
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "restart_attempted");
        assert_eq!(json["system"], "sys");
        assert_eq!(json["host"], "core-1");
        assert_eq!(json["succeeded"], false);
        assert!(json["timestamp"].is_string());
        assert!(event.kind.is_restart());
    }

    #[test]
    fn test_report_affected_components_dedupes_in_order() {
        let report = DiagnosticsReport {
            script_errors: vec![issue("b"), issue("a")],
            script_statuses: vec![issue("a"), issue("c"), issue("b")],
            ..Default::default()
        };
        assert_eq!(report.affected_components(), vec!["b", "a", "c"]);
        assert!(!report.is_healthy());
        assert!(!report.has_persistent_issues());
    }

    #[test]
    fn test_empty_report_is_healthy() {
        let report = DiagnosticsReport::default();
        assert!(report.is_healthy());
        assert!(report.affected_components().is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["scriptErrors"].as_array().unwrap().is_empty());
        assert!(json["auditEvents"].as_array().unwrap().is_empty());
    }
}

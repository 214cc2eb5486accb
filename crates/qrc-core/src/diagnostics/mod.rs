//! Detects unhealthy scripts and plugins on a Core and restarts them.
//!
//! A scan enumerates every component, keeps the scripts and plugins and
//! reads their controls. Error scans look at the script error counter,
//! status scans at every `Status` control. [`DiagnosticsEngine::remediate`]
//! runs both, restarts each affected component in turn and re-scans it to
//! tell persistent issues from resolved ones.

mod device;
mod rules;

pub use device::CoreApi;
pub use rules::{
    DiagnosticsPolicy, ERROR_COUNT_CONTROL, ExclusionRule, LOG_HISTORY_CONTROL, excerpt,
};

use qrc_types::{
    AuditEvent, AuditKind, ComponentControls, ComponentDescriptor, ComponentIssue,
    DiagnosticsReport, SiteLabels,
};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Issues still present on one component after its restart.
#[derive(Debug, Default)]
struct Remaining {
    errors: Vec<ComponentIssue>,
    statuses: Vec<ComponentIssue>,
}

impl Remaining {
    fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.statuses.is_empty()
    }
}

pub struct DiagnosticsEngine<A> {
    api: A,
    policy: DiagnosticsPolicy,
}

impl<A: CoreApi> DiagnosticsEngine<A> {
    #[must_use]
    pub fn new(api: A) -> Self {
        Self::with_policy(api, DiagnosticsPolicy::default())
    }

    #[must_use]
    pub fn with_policy(api: A, policy: DiagnosticsPolicy) -> Self {
        Self { api, policy }
    }

    #[must_use]
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Scripts and plugins, narrowed to `filter` if given.
    async fn candidates(&self, filter: Option<&str>) -> Result<Vec<ComponentDescriptor>> {
        let mut candidates: Vec<ComponentDescriptor> = self
            .api
            .components()
            .await?
            .into_iter()
            .filter(|c| c.type_matches_any(self.policy.type_markers()))
            .collect();

        if let Some(filter) = filter {
            candidates.retain(|c| c.name == filter);
            if candidates.len() > 1 {
                return Err(Error::MultipleMatch {
                    filter: filter.to_string(),
                    count: candidates.len(),
                });
            }
        }

        debug!(count = candidates.len(), ?filter, "Components to inspect");
        Ok(candidates)
    }

    /// Unreadable components are skipped on a full scan. A filtered scan
    /// names its component explicitly, so a failed read is returned.
    async fn scan_with<F>(&self, filter: Option<&str>, detect: F) -> Result<Vec<ComponentIssue>>
    where
        F: Fn(&DiagnosticsPolicy, &ComponentControls) -> Vec<ComponentIssue>,
    {
        let mut issues = Vec::new();

        for component in self.candidates(filter).await? {
            match self.api.controls(&component.name).await {
                Ok(controls) => issues.extend(detect(&self.policy, &controls)),
                Err(e) if filter.is_some() => return Err(e.into()),
                Err(e) => {
                    warn!(
                        component = %component.name,
                        error = %e,
                        "Failed to read controls, skipping"
                    );
                }
            }
        }

        Ok(issues)
    }

    /// Components whose script error counter is above zero.
    ///
    /// # Errors
    ///
    /// Returns `Error::Rpc` if components cannot be enumerated, or if
    /// `filter` names a component whose controls cannot be read, and
    /// `Error::MultipleMatch` if `filter` names more than one component.
    pub async fn scan_errors(&self, filter: Option<&str>) -> Result<Vec<ComponentIssue>> {
        self.scan_with(filter, |policy, controls| {
            policy.error_issue(controls).into_iter().collect()
        })
        .await
    }

    /// `Status` controls outside the healthy set.
    ///
    /// # Errors
    ///
    /// As [`scan_errors`](Self::scan_errors).
    pub async fn scan_statuses(&self, filter: Option<&str>) -> Result<Vec<ComponentIssue>> {
        self.scan_with(filter, DiagnosticsPolicy::status_issues).await
    }

    /// Both scans, concurrently, without remediation.
    ///
    /// # Errors
    ///
    /// The first scan failure.
    pub async fn scan(&self, filter: Option<&str>) -> Result<DiagnosticsReport> {
        let (errors, statuses) = tokio::join!(self.scan_errors(filter), self.scan_statuses(filter));

        Ok(DiagnosticsReport {
            script_errors: errors?,
            script_statuses: statuses?,
            ..DiagnosticsReport::default()
        })
    }

    async fn try_restart(&self, component: &str) -> qrc_rpc::Result<()> {
        info!(component, "Restarting component");
        let result = self.api.reload(component).await;
        if let Err(e) = &result {
            warn!(component, error = %e, "Restart failed");
        }
        result
    }

    /// Set the component's `reload` control. True if the Core accepted it.
    pub async fn restart(&self, component: &str) -> bool {
        self.try_restart(component).await.is_ok()
    }

    /// Scan, restart every affected component and verify it.
    ///
    /// Scan failures count as no issues and never abort the pass. Each
    /// component is handled in isolation: if its restart fails, or its
    /// re-scan fails or no longer lists it, its original issues are
    /// reported as persistent.
    pub async fn remediate(&self, labels: &SiteLabels) -> DiagnosticsReport {
        let (errors, statuses) =
            tokio::join!(self.scan_errors(None), self.scan_statuses(None));

        let mut report = DiagnosticsReport {
            script_errors: errors.unwrap_or_else(|e| {
                warn!(error = %e, "Error scan failed, treating as no issues");
                Vec::new()
            }),
            script_statuses: statuses.unwrap_or_else(|e| {
                warn!(error = %e, "Status scan failed, treating as no issues");
                Vec::new()
            }),
            ..DiagnosticsReport::default()
        };

        let affected = report.affected_components();
        if affected.is_empty() {
            info!(host = %labels.host, "No script or plugin issues found");
            return report;
        }

        let detected = AuditKind::IssuesDetected {
            error_count: report.script_errors.len(),
            status_count: report.script_statuses.len(),
            errors: report.script_errors.clone(),
            statuses: report.script_statuses.clone(),
        };
        emit(&mut report.audit_events, labels, detected);

        for component in &affected {
            let original = Remaining {
                errors: issues_for(&report.script_errors, component),
                statuses: issues_for(&report.script_statuses, component),
            };

            let remaining = self
                .remediate_component(component, original, labels, &mut report.audit_events)
                .await;

            report.persistent_errors.extend(remaining.errors);
            report.persistent_statuses.extend(remaining.statuses);
        }

        report
    }

    async fn remediate_component(
        &self,
        component: &str,
        original: Remaining,
        labels: &SiteLabels,
        events: &mut Vec<AuditEvent>,
    ) -> Remaining {
        let restarted = self.try_restart(component).await;
        emit(
            events,
            labels,
            AuditKind::RestartAttempted {
                component: component.to_string(),
                succeeded: restarted.is_ok(),
                error: restarted.as_ref().err().map(ToString::to_string),
            },
        );

        if restarted.is_err() {
            return original;
        }

        let remaining = match self.verify(component).await {
            Ok(remaining) => remaining,
            Err(e) => {
                warn!(component, error = %e, "Verification scan failed, keeping original issues");
                original
            }
        };

        if remaining.is_empty() {
            info!(component, "Issues resolved after restart");
            emit(
                events,
                labels,
                AuditKind::IssuesResolved {
                    component: component.to_string(),
                },
            );
        } else {
            warn!(
                component,
                errors = remaining.errors.len(),
                statuses = remaining.statuses.len(),
                "Issues persist after restart"
            );
            emit(
                events,
                labels,
                AuditKind::IssuesPersisting {
                    component: component.to_string(),
                    errors: remaining.errors.clone(),
                    statuses: remaining.statuses.clone(),
                },
            );
        }

        remaining
    }

    /// Re-scan one restarted component with a single enumeration and read.
    /// The component must still be listed and readable, otherwise it cannot
    /// be shown to be healthy.
    async fn verify(&self, component: &str) -> Result<Remaining> {
        if self.candidates(Some(component)).await?.is_empty() {
            return Err(Error::ComponentNotFound(component.to_string()));
        }

        let controls = self.api.controls(component).await?;
        Ok(Remaining {
            errors: self.policy.error_issue(&controls).into_iter().collect(),
            statuses: self.policy.status_issues(&controls),
        })
    }
}

fn issues_for(issues: &[ComponentIssue], component: &str) -> Vec<ComponentIssue> {
    issues
        .iter()
        .filter(|issue| issue.component == component)
        .cloned()
        .collect()
}

fn emit(events: &mut Vec<AuditEvent>, labels: &SiteLabels, kind: AuditKind) {
    let event = AuditEvent::now(labels, kind);
    info!(
        system = %event.labels.system,
        site = %event.labels.site,
        host = %event.labels.host,
        kind = ?event.kind,
        "Audit event"
    );
    events.push(event);
}

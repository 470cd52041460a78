//! Post-fetch content verification (§3, grounds §4.11 `VerificationEngine`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Extracted text length is within expected bounds.
    Length,
    /// Extracted content matches a JSON schema.
    Schema,
    /// Extracted content passes a `ContentValidator`.
    ContentValidator,
    /// Page still renders the structural markers expected for its
    /// template family (e.g. still has a price element on a product page).
    StructuralMarker,
    /// A learned API pattern's response still matches its recorded shape.
    ApiShapeMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckSeverity {
    /// Failure blocks acceptance of the result.
    Blocking,
    /// Failure lowers confidence but the result is still returned.
    Advisory,
}

/// One verification check and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub kind: CheckKind,
    pub severity: CheckSeverity,
    pub passed: bool,
    pub detail: Option<String>,
}

impl VerificationCheck {
    pub fn passed(kind: CheckKind, severity: CheckSeverity) -> Self {
        Self {
            kind,
            severity,
            passed: true,
            detail: None,
        }
    }

    pub fn failed(kind: CheckKind, severity: CheckSeverity, detail: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            passed: false,
            detail: Some(detail.into()),
        }
    }
}

/// Aggregate result of running a `VerificationCheck` set over one fetch.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VerificationReport {
    pub checks: Vec<VerificationCheck>,
}

impl VerificationReport {
    pub fn push(&mut self, check: VerificationCheck) {
        self.checks.push(check);
    }

    /// A report is accepted iff no `Blocking` check failed.
    pub fn accepted(&self) -> bool {
        !self
            .checks
            .iter()
            .any(|c| !c.passed && matches!(c.severity, CheckSeverity::Blocking))
    }

    /// Confidence penalty in [0,1] derived from failed `Advisory` checks,
    /// 0.05 per failure, capped so advisory failures alone can't zero out
    /// confidence the way a blocking failure would.
    pub fn advisory_penalty(&self) -> f32 {
        let failures = self
            .checks
            .iter()
            .filter(|c| !c.passed && matches!(c.severity, CheckSeverity::Advisory))
            .count();
        (failures as f32 * 0.05).min(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_rejects_on_blocking_failure() {
        let mut report = VerificationReport::default();
        report.push(VerificationCheck::passed(CheckKind::Length, CheckSeverity::Blocking));
        report.push(VerificationCheck::failed(
            CheckKind::Schema,
            CheckSeverity::Blocking,
            "missing required field",
        ));
        assert!(!report.accepted());
    }

    #[test]
    fn report_accepts_with_only_advisory_failures() {
        let mut report = VerificationReport::default();
        report.push(VerificationCheck::failed(
            CheckKind::StructuralMarker,
            CheckSeverity::Advisory,
            "price element missing",
        ));
        assert!(report.accepted());
        assert!(report.advisory_penalty() > 0.0);
    }
}

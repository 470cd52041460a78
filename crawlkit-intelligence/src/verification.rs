//! `VerificationEngine` (C12, §4.11).

use regex::Regex;
use std::sync::Arc;

use crawlkit_core::types::VerificationReport;
use crawlkit_learning::LearningEngine;

use crate::browser_driver::{ApiCaller, StateVerificationBrowser};
use crate::error::BrowseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerifyMode {
    Basic,
    Standard,
    Thorough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub severity: Severity,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SchemaValidationError {
    pub path: String,
    pub keyword: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub passed: bool,
    pub checks: Vec<CheckResult>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub confidence: f32,
    pub schema_errors: Vec<SchemaValidationError>,
}

#[derive(Debug, Clone)]
pub struct UserCheck {
    pub name: String,
    pub severity: Severity,
    pub passed: bool,
}

#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub mode: VerifyMode,
    pub user_checks: Vec<UserCheck>,
    pub validate_schema: bool,
    pub schema: Option<serde_json::Value>,
    pub check_selector: Option<String>,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            mode: VerifyMode::Basic,
            user_checks: Vec::new(),
            validate_schema: false,
            schema: None,
            check_selector: None,
        }
    }
}

/// Input the engine verifies: the fetch's raw facts, independent of
/// `BrowseResult` so this crate doesn't depend on `crawlkit-browser`.
#[derive(Debug, Clone)]
pub struct VerificationInput {
    pub status_code: u16,
    pub content: String,
    pub content_json: Option<serde_json::Value>,
    pub html: Option<String>,
    pub domain: String,
}

const EXCLUDED_PHRASES: &[&str] = &["access denied", "rate limit exceeded"];

pub struct VerificationEngine {
    engine: Arc<LearningEngine>,
    state_browser: Option<Arc<dyn StateVerificationBrowser>>,
    api_caller: Option<Arc<dyn ApiCaller>>,
}

impl VerificationEngine {
    pub fn new(engine: Arc<LearningEngine>) -> Self {
        Self { engine, state_browser: None, api_caller: None }
    }

    pub fn with_state_browser(mut self, browser: Arc<dyn StateVerificationBrowser>) -> Self {
        self.state_browser = Some(browser);
        self
    }

    pub fn with_api_caller(mut self, caller: Arc<dyn ApiCaller>) -> Self {
        self.api_caller = Some(caller);
        self
    }

    /// §4.11: build the ordered check list (built-in by mode, then
    /// learned at confidence >= 0.7, then user-supplied), then evaluate
    /// with critical-stops-everything semantics.
    pub async fn verify(&self, input: &VerificationInput, options: &VerifyOptions) -> VerificationOutcome {
        let mut checks: Vec<CheckResult> = Vec::new();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut schema_errors = Vec::new();
        let mut stopped = false;

        for check in self.builtin_checks(input, options.mode) {
            push_check(&mut checks, &mut errors, &mut warnings, check, &mut stopped);
            if stopped {
                break;
            }
        }

        if !stopped {
            for learned in self.engine.get_learned_verifications(&input.domain, 0.7) {
                let passed = learned.passed;
                let check = CheckResult {
                    name: "learned".to_string(),
                    passed,
                    severity: Severity::Warning,
                    message: learned.detail,
                };
                push_check(&mut checks, &mut errors, &mut warnings, check, &mut stopped);
                if stopped {
                    break;
                }
            }
        }

        if !stopped {
            for user_check in &options.user_checks {
                let check = CheckResult {
                    name: user_check.name.clone(),
                    passed: user_check.passed,
                    severity: user_check.severity,
                    message: None,
                };
                push_check(&mut checks, &mut errors, &mut warnings, check, &mut stopped);
                if stopped {
                    break;
                }
            }
        }

        if options.validate_schema {
            if let Some(schema) = &options.schema {
                let target = input.content_json.clone().unwrap_or(serde_json::Value::String(input.content.clone()));
                schema_errors = validate_schema(schema, &target);
            }
        }

        let any_critical = checks.iter().any(|c| !c.passed && c.severity == Severity::Critical);
        let any_error = checks.iter().any(|c| !c.passed && c.severity == Severity::Error);
        let passed = checks.iter().all(|c| c.passed || c.severity == Severity::Warning) && schema_errors.is_empty();

        let multiplier = if any_critical { 0.3 } else if any_error { 0.6 } else { 1.0 };
        let confidence = if checks.is_empty() {
            0.5
        } else {
            let passed_count = checks.iter().filter(|c| c.passed).count();
            (passed_count as f32 / checks.len() as f32 * multiplier).clamp(0.0, 1.0)
        };

        VerificationOutcome { passed, checks, errors, warnings, confidence, schema_errors }
    }

    fn builtin_checks(&self, input: &VerificationInput, mode: VerifyMode) -> Vec<CheckResult> {
        let mut checks = vec![
            CheckResult {
                name: "status_code".to_string(),
                passed: input.status_code == 200,
                severity: Severity::Critical,
                message: (input.status_code != 200).then(|| format!("status {} != 200", input.status_code)),
            },
            CheckResult {
                name: "min_length".to_string(),
                passed: input.content.len() >= 50,
                severity: Severity::Error,
                message: (input.content.len() < 50).then(|| "content shorter than 50 chars".to_string()),
            },
        ];

        if mode >= VerifyMode::Standard {
            let lower = input.content.to_lowercase();
            let hit = EXCLUDED_PHRASES.iter().find(|p| lower.contains(**p));
            checks.push(CheckResult {
                name: "excludes_text".to_string(),
                passed: hit.is_none(),
                severity: Severity::Error,
                message: hit.map(|p| format!("content contains excluded phrase: {p}")),
            });
        }

        if mode >= VerifyMode::Thorough {
            checks.push(CheckResult {
                name: "min_length_thorough".to_string(),
                passed: input.content.len() >= 100,
                severity: Severity::Warning,
                message: (input.content.len() < 100).then(|| "content shorter than 100 chars".to_string()),
            });
        }

        checks
    }

    /// §4.11 `checkUrl`: skipped with a warning, not failed, when no
    /// browser capability was injected.
    pub async fn check_url(&self, url: &str, check_selector: Option<&str>) -> CheckResult {
        let Some(browser) = &self.state_browser else {
            return CheckResult {
                name: "check_url".to_string(),
                passed: true,
                severity: Severity::Warning,
                message: Some("no StateVerificationBrowser capability injected; skipped".to_string()),
            };
        };

        match browser.fetch_for_check(url).await {
            Ok(html) => {
                let length_ok = html.len() >= 50;
                let selector_ok = check_selector.map(|sel| selector_matches(sel, &html)).unwrap_or(true);
                CheckResult {
                    name: "check_url".to_string(),
                    passed: length_ok && selector_ok,
                    severity: Severity::Error,
                    message: None,
                }
            }
            Err(e) => CheckResult {
                name: "check_url".to_string(),
                passed: false,
                severity: Severity::Error,
                message: Some(e.to_string()),
            },
        }
    }

    /// §4.11 `checkApi`.
    pub async fn check_api(&self, url: &str) -> CheckResult {
        let Some(caller) = &self.api_caller else {
            return CheckResult {
                name: "check_api".to_string(),
                passed: true,
                severity: Severity::Warning,
                message: Some("no ApiCaller capability injected; skipped".to_string()),
            };
        };

        match caller.call(url).await {
            Ok((status, body)) => CheckResult {
                name: "check_api".to_string(),
                passed: (200..300).contains(&status) && !body.is_empty(),
                severity: Severity::Error,
                message: None,
            },
            Err(e) => CheckResult {
                name: "check_api".to_string(),
                passed: false,
                severity: Severity::Error,
                message: Some(e.to_string()),
            },
        }
    }
}

fn push_check(
    checks: &mut Vec<CheckResult>,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
    check: CheckResult,
    stopped: &mut bool,
) {
    if !check.passed {
        match check.severity {
            Severity::Critical => {
                errors.push(check.message.clone().unwrap_or_else(|| format!("{} failed", check.name)));
                *stopped = true;
            }
            Severity::Error => errors.push(check.message.clone().unwrap_or_else(|| format!("{} failed", check.name))),
            Severity::Warning => warnings.push(check.message.clone().unwrap_or_else(|| format!("{} failed", check.name))),
        }
    }
    checks.push(check);
}

fn validate_schema(schema: &serde_json::Value, instance: &serde_json::Value) -> Vec<SchemaValidationError> {
    match jsonschema::JSONSchema::compile(schema) {
        Ok(validator) => match validator.validate(instance) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|e| SchemaValidationError {
                    path: e.instance_path.to_string(),
                    keyword: format!("{:?}", e.kind),
                    message: e.to_string(),
                })
                .collect(),
        },
        Err(e) => vec![SchemaValidationError {
            path: String::new(),
            keyword: "schema".to_string(),
            message: e.to_string(),
        }],
    }
}

/// §4.11 selector -> regex heuristic, used to sanity-check HTML without a
/// full parse when re-checking state.
pub fn selector_matches(selector: &str, html: &str) -> bool {
    let pattern = selector_to_pattern(selector);
    Regex::new(&pattern).map(|re| re.is_match(html)).unwrap_or(false)
}

fn selector_to_pattern(selector: &str) -> String {
    if let Some(id) = selector.strip_prefix('#') {
        return format!(r#"id=['"]{}['"]"#, regex::escape(id));
    }
    if let Some(class) = selector.strip_prefix('.') {
        let escaped = regex::escape(class);
        return format!(r#"class=['"][^'"]*(^|\s){escaped}(\s|['"])[^'"]*['"]"#);
    }
    if selector.starts_with('[') && selector.ends_with(']') {
        let inner = &selector[1..selector.len() - 1];
        if let Some((attr, value)) = inner.split_once('=') {
            let value = value.trim_matches(|c| c == '"' || c == '\'');
            return format!(r#"{}=['"]{}['"]"#, regex::escape(attr), regex::escape(value));
        }
        return format!(r#"{}="#, regex::escape(inner));
    }
    if selector.chars().all(|c| c.is_alphanumeric()) {
        return format!(r#"<{}[\s>]"#, regex::escape(selector));
    }
    regex::escape(selector)
}

impl From<BrowseError> for CheckResult {
    fn from(e: BrowseError) -> Self {
        CheckResult {
            name: "error".to_string(),
            passed: false,
            severity: Severity::Error,
            message: Some(e.to_string()),
        }
    }
}

/// Adapt this engine's [`VerificationOutcome`] into the shared
/// [`VerificationReport`] type stored on `BrowseResult`.
pub fn into_report(outcome: &VerificationOutcome) -> VerificationReport {
    use crawlkit_core::types::{CheckKind, CheckSeverity, VerificationCheck};

    let mut report = VerificationReport::default();
    for check in &outcome.checks {
        let severity = match check.severity {
            Severity::Critical | Severity::Error => CheckSeverity::Blocking,
            Severity::Warning => CheckSeverity::Advisory,
        };
        let kind = CheckKind::ContentValidator;
        report.push(if check.passed {
            VerificationCheck::passed(kind, severity)
        } else {
            VerificationCheck::failed(kind, severity, check.message.clone().unwrap_or_default())
        });
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(status: u16, content: &str) -> VerificationInput {
        VerificationInput {
            status_code: status,
            content: content.to_string(),
            content_json: None,
            html: None,
            domain: "example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn basic_mode_fails_on_short_content() {
        let engine = VerificationEngine::new(Arc::new(LearningEngine::new(Default::default())));
        let outcome = engine.verify(&input(200, "short"), &VerifyOptions::default()).await;
        assert!(!outcome.passed);
    }

    #[tokio::test]
    async fn basic_mode_stops_early_on_a_failing_status_code() {
        let engine = VerificationEngine::new(Arc::new(LearningEngine::new(Default::default())));
        let outcome = engine.verify(&input(403, "a".repeat(60).as_str()), &VerifyOptions::default()).await;
        assert!(!outcome.passed);
        assert_eq!(outcome.checks.len(), 1);
        assert_eq!(outcome.checks[0].name, "status_code");
    }

    #[tokio::test]
    async fn standard_mode_fails_on_excluded_text() {
        let engine = VerificationEngine::new(Arc::new(LearningEngine::new(Default::default())));
        let content = "a".repeat(60) + " access denied";
        let options = VerifyOptions { mode: VerifyMode::Standard, ..Default::default() };
        let outcome = engine.verify(&input(200, &content), &options).await;
        assert!(!outcome.passed);
    }

    #[tokio::test]
    async fn thorough_mode_warns_without_failing() {
        let engine = VerificationEngine::new(Arc::new(LearningEngine::new(Default::default())));
        let content = "a".repeat(60);
        let options = VerifyOptions { mode: VerifyMode::Thorough, ..Default::default() };
        let outcome = engine.verify(&input(200, &content), &options).await;
        assert!(outcome.passed);
        assert!(!outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn check_url_skips_with_warning_when_no_capability() {
        let engine = VerificationEngine::new(Arc::new(LearningEngine::new(Default::default())));
        let result = engine.check_url("https://example.com", None).await;
        assert!(result.passed);
        assert_eq!(result.severity, Severity::Warning);
    }

    #[test]
    fn selector_pattern_matches_id_and_class() {
        let html = r#"<div id="main" class="price large">$5</div>"#;
        assert!(selector_matches("#main", html));
        assert!(selector_matches(".price", html));
        assert!(!selector_matches(".missing", html));
    }
}

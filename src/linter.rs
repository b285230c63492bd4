//! Top-level lint run: setup, discovery, linting, reports, summary.
//!
//! Zero discovered plugins is "nothing to check" and ends the run early
//! with a successful empty result. Any fatal error is logged with its
//! cause chain and returned as a single [`RunError`] labelled with the
//! phase it came from.

use crate::error::{LintError, Phase, RunError};
use crate::leftover::LeftoverResourceDetector;
use crate::maven::BuildOptions;
use crate::models::result::OverallResult;
use crate::orchestrator::PluginOrchestrator;
use crate::project::{ProjectContext, ProjectInput};
use crate::report::{ReportGenerator, DEFAULT_REPORT_DIR};
use crate::resource_discovery::ResourceDiscoveryService;
use crate::validation::{BpmnValidationService, FhirValidationService};
use std::error::Error as _;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};

/// Run settings after CLI and config file are merged.
#[derive(Debug, Clone)]
pub struct LintOptions {
    /// Relative paths resolve against the project root, or against the
    /// working directory when the project lives in a temporary directory.
    pub report_dir: PathBuf,
    pub html: bool,
    pub fail_on_errors: bool,
    pub build: Option<BuildOptions>,
    pub leftover_ignore: Vec<String>,
}

impl Default for LintOptions {
    fn default() -> Self {
        Self {
            report_dir: PathBuf::from(DEFAULT_REPORT_DIR),
            html: false,
            fail_on_errors: false,
            build: None,
            leftover_ignore: Vec::new(),
        }
    }
}

pub struct DsfLinter {
    options: LintOptions,
    bpmn: BpmnValidationService,
    fhir: FhirValidationService,
}

impl DsfLinter {
    pub fn new(options: LintOptions) -> Self {
        Self {
            options,
            bpmn: BpmnValidationService::default(),
            fhir: FhirValidationService::default(),
        }
    }

    /// Set up the project described by `input`, then lint it.
    pub fn lint(&self, input: &ProjectInput) -> Result<OverallResult, RunError> {
        let started = Instant::now();
        let ctx = ProjectContext::setup(input, self.options.build.as_ref())
            .map_err(|e| fail(Phase::Setup, e))?;
        self.lint_project(&ctx, started)
    }

    /// Lint an already prepared project. `started` is the run's start time.
    pub fn lint_project(
        &self,
        ctx: &ProjectContext,
        started: Instant,
    ) -> Result<OverallResult, RunError> {
        // Discovery
        let discovery = ResourceDiscoveryService::discover(ctx);
        if discovery.is_empty() {
            info!(
                root = %ctx.project_root.display(),
                "no plugin definitions found; nothing to check"
            );
            return Ok(OverallResult::empty(started.elapsed().as_millis()));
        }
        info!(plugins = discovery.len(), "plugins discovered");

        // Linting
        let detector = LeftoverResourceDetector::new(&self.options.leftover_ignore)
            .map_err(|e| fail(Phase::Linting, e))?;
        let leftovers = detector.analyze(
            &ctx.project_root,
            &ctx.resources_dir,
            &discovery.all_referenced_bpmn(),
            &discovery.all_referenced_fhir(),
        );
        let reports = ReportGenerator::new(self.report_root(ctx), self.options.html)
            .map_err(|e| fail(Phase::Reporting, e))?;
        let orchestrator = PluginOrchestrator {
            project_root: &ctx.project_root,
            classpath: &ctx.classpath,
            bpmn: &self.bpmn,
            fhir: &self.fhir,
            reports: &reports,
        };
        let plugin_results = orchestrator
            .run_all(&discovery, &leftovers)
            .map_err(|e| fail(Phase::Linting, e))?;

        // Report generation
        let mut overall = OverallResult::aggregate(
            plugin_results,
            leftovers,
            self.options.fail_on_errors,
            started.elapsed().as_millis(),
        );
        let master = reports
            .write_master_report(&overall, &discovery)
            .map_err(|e| fail(Phase::Reporting, e))?;
        overall.master_report_path = Some(master);

        // Summary
        overall.execution_time_ms = started.elapsed().as_millis();
        info!(
            plugins = overall.plugin_count(),
            errors = overall.summary.errors,
            warnings = overall.summary.warnings,
            leftovers = overall.leftover_analysis.count(),
            success = overall.success,
            elapsed_ms = overall.execution_time_ms as u64,
            "lint run finished"
        );
        Ok(overall)
    }

    /// Where reports go for `ctx`.
    pub fn report_root(&self, ctx: &ProjectContext) -> PathBuf {
        resolve_report_root(&self.options.report_dir, ctx)
    }
}

fn resolve_report_root(dir: &Path, ctx: &ProjectContext) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else if ctx.is_temporary() {
        std::env::current_dir()
            .map(|cwd| cwd.join(dir))
            .unwrap_or_else(|_| dir.to_path_buf())
    } else {
        ctx.project_root.join(dir)
    }
}

fn fail(phase: Phase, cause: LintError) -> RunError {
    let mut chain = Vec::new();
    let mut source = cause.source();
    while let Some(s) = source {
        chain.push(s.to_string());
        source = s.source();
    }
    if cause.is_domain() {
        error!(%phase, error = %cause, causes = ?chain, "lint run aborted");
    } else {
        error!(%phase, error = %cause, causes = ?chain, "lint run aborted by unexpected fault");
    }
    RunError::new(phase, cause)
}

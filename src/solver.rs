//! Solver driver and job orchestration.
//!
//! Drives the full pipeline: validate, normalize, compile, solve, project.
//! Jobs run one pipeline each; the in-memory registry stands in for the
//! external job store and only ever sees status transitions and finished
//! result blobs.

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cp::{SolveParams, SolveStatus};
use crate::lattice::BuildError;
use crate::lower::compile;
use crate::normalize::{check_request_refs, normalize, NormalizedSpec};
use crate::schedule::{project, Projection};
use crate::spec::SpecDoc;
use crate::validate::{validate_document, Validation};

/// Collapsed solver outcome, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RosterStatus {
    Optimal,
    Feasible,
    Infeasible,
    Timeout,
    Error,
}

impl RosterStatus {
    pub fn has_schedule(self) -> bool {
        matches!(self, RosterStatus::Optimal | RosterStatus::Feasible)
    }
}

/// Time and parallelism limits for one solve.
#[derive(Debug, Clone, Copy)]
pub struct SolveSettings {
    pub max_time_seconds: u64,
    pub workers: usize,
}

impl Default for SolveSettings {
    fn default() -> Self {
        Self {
            max_time_seconds: 15,
            workers: 8,
        }
    }
}

/// The result blob written to the job store.
#[derive(Debug, Clone, Serialize)]
pub struct SolveOutput {
    pub status: RosterStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound: Option<i64>,
    #[serde(flatten)]
    pub projection: Option<Projection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Error)]
pub enum SolveError {
    /// The spec failed validation or normalization; never reaches the
    /// solver.
    #[error("spec is invalid ({} errors)", .errors.len())]
    Invalid { errors: Vec<String> },
    #[error(transparent)]
    Capacity(#[from] BuildError),
}

/// Runs both validation stages and returns the full report, never a
/// partial one.
pub fn validate_full(doc: &Value) -> Validation {
    let report = validate_document(doc);
    if !report.valid {
        return report;
    }
    match prepare_checked(doc) {
        Ok(_) => report,
        Err(errors) => Validation {
            valid: false,
            errors,
            warnings: report.warnings,
        },
    }
}

/// Structural walk, typed parse, normalization.
pub fn prepare(doc: &Value) -> Result<NormalizedSpec, Vec<String>> {
    let report = validate_document(doc);
    if !report.valid {
        return Err(report.errors);
    }
    prepare_checked(doc)
}

fn prepare_checked(doc: &Value) -> Result<NormalizedSpec, Vec<String>> {
    let spec: SpecDoc =
        serde_json::from_value(doc.clone()).map_err(|e| vec![format!("malformed spec: {e}")])?;
    let norm = normalize(spec)?;
    check_request_refs(&norm)?;
    Ok(norm)
}

/// The whole pipeline in one call: used by the synchronous endpoint and
/// by job workers after preparation.
pub fn solve_document(doc: &Value, settings: SolveSettings) -> Result<SolveOutput, SolveError> {
    let norm = prepare(doc).map_err(|errors| SolveError::Invalid { errors })?;
    solve_normalized(&norm, settings)
}

/// Compile, solve, and project an already normalized spec.
pub fn solve_normalized(
    norm: &NormalizedSpec,
    settings: SolveSettings,
) -> Result<SolveOutput, SolveError> {
    let compiled = compile(norm)?;
    info!(
        vars = compiled.lattice.model.num_vars(),
        constraints = compiled.lattice.model.num_constraints(),
        "model compiled"
    );

    let params = SolveParams {
        max_time: Duration::from_secs(settings.max_time_seconds),
        workers: settings.workers,
    };
    let outcome = match catch_unwind(AssertUnwindSafe(|| compiled.lattice.model.solve(params))) {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "engine failure".to_string());
            warn!(%message, "solver engine failed");
            return Ok(SolveOutput {
                status: RosterStatus::Error,
                objective_value: None,
                bound: None,
                projection: None,
                message: Some(message),
            });
        }
    };

    let output = match outcome.status {
        SolveStatus::Optimal | SolveStatus::Feasible => {
            let solution = outcome.assignment.as_ref().unwrap();
            SolveOutput {
                status: if outcome.status == SolveStatus::Optimal {
                    RosterStatus::Optimal
                } else {
                    RosterStatus::Feasible
                },
                objective_value: outcome.objective,
                bound: outcome.bound,
                projection: Some(project(norm, &compiled, solution)),
                message: None,
            }
        }
        SolveStatus::Infeasible => SolveOutput {
            status: RosterStatus::Infeasible,
            objective_value: None,
            bound: outcome.bound,
            projection: None,
            message: Some("no feasible schedule exists".to_string()),
        },
        SolveStatus::Timeout => SolveOutput {
            status: RosterStatus::Timeout,
            objective_value: None,
            bound: outcome.bound,
            projection: None,
            message: Some("time limit reached before a schedule was found".to_string()),
        },
    };
    Ok(output)
}

// ============================================================================
// Job orchestration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

/// One job row, as the external store would hold it.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    pub bound: Option<i64>,
    pub result: Option<SolveOutput>,
    pub error: Option<String>,
}

/// Job registry plus pipeline entry points. One instance is shared across
/// handlers; each solve owns its spec and model exclusively.
pub struct SolverService {
    jobs: RwLock<HashMap<String, JobRecord>>,
}

impl SolverService {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Allocates a job row in `queued` state.
    pub fn create_job(&self) -> String {
        let job_id = Uuid::new_v4().to_string();
        self.jobs.write().insert(
            job_id.clone(),
            JobRecord {
                job_id: job_id.clone(),
                status: JobStatus::Queued,
                bound: None,
                result: None,
                error: None,
            },
        );
        job_id
    }

    pub fn job(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.read().get(job_id).cloned()
    }

    /// Runs the compiled pipeline for a queued job. Blocking; callers put
    /// this on a blocking-capable worker.
    pub fn run_job(&self, job_id: &str, norm: NormalizedSpec, settings: SolveSettings) {
        self.update(job_id, |job| job.status = JobStatus::Running);
        info!(job_id, "job started");

        match solve_normalized(&norm, settings) {
            Ok(output) => {
                let done = output.status.has_schedule();
                self.update(job_id, |job| {
                    job.bound = output.bound;
                    if done {
                        job.status = JobStatus::Done;
                    } else {
                        job.status = JobStatus::Failed;
                        job.error = output.message.clone();
                    }
                    job.result = Some(output);
                });
                info!(job_id, done, "job finished");
            }
            Err(err) => {
                warn!(job_id, error = %err, "job failed");
                self.update(job_id, |job| {
                    job.status = JobStatus::Failed;
                    job.error = Some(err.to_string());
                });
            }
        }
    }

    fn update(&self, job_id: &str, f: impl FnOnce(&mut JobRecord)) {
        if let Some(job) = self.jobs.write().get_mut(job_id) {
            f(job);
        }
    }
}

impl Default for SolverService {
    fn default() -> Self {
        Self::new()
    }
}

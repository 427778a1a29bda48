//! Optional collaborators, each present as a real or a no-op implementation.
//!
//! A `Capabilities` value is built once by the command layer and passed by
//! reference, so components never check whether a helper exists.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

use crate::change::Change;
use crate::gates::QualityGateResult;
use crate::generate::TemplateGenerator;
use crate::lane::LaneConfig;
use crate::stage::Stage;
use crate::tracker::GitTracker;

/// Receives pipeline progress for display.
pub trait ProgressReporter: Send + Sync {
    fn run_started(&self, _change_id: &str, _lane: &LaneConfig, _first_stage: u8) {}
    fn stage_started(&self, _stage: &Stage) {}
    fn stage_skipped(&self, _stage: &Stage, _reason: &str) {}
    fn stage_finished(&self, _stage: &Stage, _success: bool, _detail: &str) {}
    fn gate_result(&self, _result: &QualityGateResult) {}
    fn run_finished(&self, _completed: bool) {}
}

/// Context handed to the document generator.
#[derive(Debug, Clone)]
pub struct DocumentContext<'a> {
    pub change: &'a Change,
    pub lane: &'a LaneConfig,
    pub revision: Option<String>,
    /// Lines describing earlier results, e.g. the quality gate summary.
    pub notes: Vec<String>,
}

/// Produces the content of a content-producing stage.
#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    async fn generate(&self, stage: &Stage, ctx: &DocumentContext<'_>) -> Result<String>;
}

/// Supplies the current revision identifier, if any.
///
/// Only `Send`: a `git2::Repository` cannot be shared between threads.
pub trait RevisionSource: Send {
    fn current_revision(&self) -> Option<String>;
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {}

pub struct NoRevision;

impl RevisionSource for NoRevision {
    fn current_revision(&self) -> Option<String> {
        None
    }
}

pub struct Capabilities {
    pub progress: Box<dyn ProgressReporter>,
    pub documents: Box<dyn DocumentGenerator>,
    pub revisions: Box<dyn RevisionSource>,
}

impl Capabilities {
    pub fn new(
        progress: Box<dyn ProgressReporter>,
        documents: Box<dyn DocumentGenerator>,
        revisions: Box<dyn RevisionSource>,
    ) -> Self {
        Self {
            progress,
            documents,
            revisions,
        }
    }

    /// Template documents, git revisions when `project_dir` is a repository,
    /// and no progress output.
    pub fn detect(project_dir: &Path) -> Self {
        let revisions: Box<dyn RevisionSource> = match GitTracker::open(project_dir) {
            Some(git) => Box::new(git),
            None => Box::new(NoRevision),
        };
        Self::new(Box::new(NoProgress), Box::new(TemplateGenerator), revisions)
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }
}

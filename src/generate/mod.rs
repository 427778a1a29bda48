//! Built-in markdown artifacts for the content-producing stages.
//!
//! The generator fills a fixed outline per stage from the change record. It
//! never inspects the working tree, so its output depends only on the
//! `DocumentContext` it is given.

use anyhow::{Result, bail};
use async_trait::async_trait;
use std::fmt::Write as _;

use crate::capabilities::{DocumentContext, DocumentGenerator};
use crate::stage::{Stage, StageKind};

pub struct TemplateGenerator;

fn outline(stage_name: &str) -> &'static [&'static str] {
    match stage_name {
        "proposal" => &["Why", "What Changes", "Impact"],
        "spec" => &["Requirements", "Scenarios"],
        "tasks" => &["Tasks"],
        "test-plan" => &["Scope", "Test Cases", "Exit Criteria"],
        "security-review" => &["Threats", "Mitigations", "Findings"],
        "docs" => &["Summary", "Usage", "Changelog"],
        "review" => &["Checklist", "Quality Gates", "Verdict"],
        "pull-request" => &["Summary", "Testing", "Rollback"],
        "merge" => &["Revision", "Follow-ups"],
        "archive" => &["Outcome", "Artifacts"],
        _ => &["Notes"],
    }
}

#[async_trait]
impl DocumentGenerator for TemplateGenerator {
    async fn generate(&self, stage: &Stage, ctx: &DocumentContext<'_>) -> Result<String> {
        let StageKind::Document { file } = stage.kind else {
            bail!("stage {} does not produce a document", stage.name);
        };

        let change = ctx.change;
        let mut out = String::new();
        writeln!(out, "# {}: {}", change.title, stage.description)?;
        writeln!(out)?;
        writeln!(out, "- Change: `{}`", change.id)?;
        if !change.owner.is_empty() {
            writeln!(out, "- Owner: {}", change.owner)?;
        }
        writeln!(out, "- Lane: {}", ctx.lane.name)?;
        writeln!(out, "- Artifact: {}", file)?;
        if let Some(rev) = &ctx.revision {
            writeln!(out, "- Revision: `{}`", rev)?;
        }

        for section in outline(stage.name) {
            writeln!(out)?;
            writeln!(out, "## {}", section)?;
            writeln!(out)?;
            match *section {
                "Why" | "Summary" if !change.description.is_empty() => {
                    writeln!(out, "{}", change.description)?;
                }
                "Quality Gates" | "Testing" if !ctx.notes.is_empty() => {
                    for note in &ctx.notes {
                        writeln!(out, "- {}", note)?;
                    }
                }
                "Revision" => match &ctx.revision {
                    Some(rev) => writeln!(out, "Merged at `{}`.", rev)?,
                    None => writeln!(out, "No revision recorded.")?,
                },
                _ => writeln!(out, "_TBD_")?,
            }
        }
        Ok(out)
    }
}

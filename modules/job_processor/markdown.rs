//! Markdown rendering of a job's result set

use chrono::Utc;
use std::fmt::Write;
use std::time::Duration;

use super::types::{Job, JobStatus, ResultSet, SummaryRecord};
use crate::summary_parser::SECTIONS;

/// A builder for creating structured markdown documents
pub struct MarkdownBuilder {
    content: String,
}

// Writing into a String cannot fail, so `writeln!` results are ignored below
impl MarkdownBuilder {
    pub fn new() -> Self {
        Self {
            content: String::with_capacity(16384),
        }
    }

    pub fn heading(&mut self, level: u8, text: &str) -> &mut Self {
        let prefix = "#".repeat(level as usize);
        let _ = writeln!(self.content, "{} {}\n", prefix, text);
        self
    }

    pub fn paragraph(&mut self, text: &str) -> &mut Self {
        let _ = writeln!(self.content, "{}\n", text);
        self
    }

    pub fn metadata(&mut self, key: &str, value: &str) -> &mut Self {
        let _ = writeln!(self.content, "**{}:** {}\n", key, value);
        self
    }

    pub fn bullet(&mut self, text: &str) -> &mut Self {
        let _ = writeln!(self.content, "- {}", text);
        self
    }

    pub fn horizontal_rule(&mut self) -> &mut Self {
        let _ = writeln!(self.content, "---\n");
        self
    }

    pub fn build(self) -> String {
        self.content
    }
}

impl Default for MarkdownBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Render the job report uploaded next to the summary outputs
pub fn render_report(job: &Job, status: &JobStatus, results: &ResultSet, duration: Duration) -> String {
    let mut builder = MarkdownBuilder::new();
    let errors: Vec<&SummaryRecord> = results.placeholders().collect();

    builder
        .heading(1, "Summarization Report")
        .metadata("Job ID", &job.id)
        .metadata("Source", &format!("s3://{}/{}", job.bucket, job.prefix))
        .metadata("Status", &status.to_string())
        .metadata("Objects", &results.len().to_string())
        .metadata("Errors", &errors.len().to_string())
        .metadata("Duration", &format!("{:.1}s", duration.as_secs_f64()))
        .horizontal_rule();

    for (key, record) in results.iter() {
        if record.is_placeholder() {
            continue;
        }
        builder.heading(2, &format!("`{}`", key));
        for section in SECTIONS {
            let content = record.sections.get(section).map(String::as_str).unwrap_or_default();
            builder.heading(3, section).paragraph(content);
        }
        builder.horizontal_rule();
    }

    if !errors.is_empty() {
        builder.heading(2, "Errors");
        for record in &errors {
            builder.bullet(&format!(
                "`{}`: {}",
                record.key,
                record.error.as_deref().unwrap_or_default()
            ));
        }
        builder.paragraph("");
    }

    let unwritten: Vec<&SummaryRecord> = results
        .iter()
        .map(|(_, record)| record)
        .filter(|record| record.output_error.is_some())
        .collect();
    if !unwritten.is_empty() {
        builder.heading(2, "Unsaved Outputs");
        for record in unwritten {
            builder.bullet(&format!(
                "`{}`: {}",
                record.key,
                record.output_error.as_deref().unwrap_or_default()
            ));
        }
        builder.paragraph("");
    }

    builder.paragraph(&format!("*Generated {}*", Utc::now().to_rfc3339()));
    builder.build()
}

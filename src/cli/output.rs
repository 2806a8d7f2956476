use serde::Serialize;

use crate::models::{IngestJob, OutputFormat, SearchResults};
use crate::utils::preview;

const PREVIEW_CHARS: usize = 200;

pub trait Formatter {
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_answer(&self, answer: &AnswerInfo) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_ingest_summary(&self, summary: &IngestSummary) -> String;
    fn format_jobs(&self, jobs: &[IngestJob]) -> String;
    fn format_job(&self, job: &IngestJob) -> String;
    fn format_collection(&self, info: &CollectionStatus) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerInfo {
    pub model: String,
    pub prompt: String,
    pub answer: String,
    /// Retrieved context, present only when the user asked to see it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub embedding_backend: String,
    pub embedding_healthy: bool,
    pub embedding_error: Option<String>,
    pub vector_store_driver: String,
    pub vector_store_url: String,
    pub vector_store_connected: bool,
    pub collection: String,
    pub collection_points: Option<u64>,
    pub generation_url: String,
    pub generation_model: String,
    pub jobs_queued: u64,
    pub jobs_running: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub collection: String,
    pub files_found: u64,
    pub files_skipped: u64,
    pub jobs: Vec<IngestJob>,
    pub duration_ms: u64,
}

impl IngestSummary {
    pub fn succeeded(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.status == crate::models::JobStatus::Succeeded)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.status == crate::models::JobStatus::Failed)
            .count()
    }

    pub fn chunks_stored(&self) -> u64 {
        self.jobs.iter().map(|j| j.chunks_stored).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStatus {
    pub name: String,
    pub exists: bool,
    pub points: u64,
    pub dimension: Option<u64>,
}

fn to_json<T: Serialize + ?Sized>(value: &T, pretty: bool) -> String {
    let encoded = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    encoded.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = format!(
            "Search results for: \"{}\" in {}\nFound {} results in {}ms\n\n",
            results.query,
            results.collection,
            results.len(),
            results.duration_ms
        );

        for (i, result) in results.results.iter().enumerate() {
            output.push_str(&format!("{}. [Score: {:.3}]\n", i + 1, result.score));
            if let Some(ref source) = result.source {
                match result.chunk_index {
                    Some(idx) => output.push_str(&format!("   Source: {source} (chunk {idx})\n")),
                    None => output.push_str(&format!("   Source: {source}\n")),
                }
            }
            output.push_str("   ---\n");

            let text = result.original_text.as_deref().unwrap_or("<no text>");
            for line in preview(text, PREVIEW_CHARS).lines() {
                output.push_str(&format!("   {line}\n"));
            }
            output.push('\n');
        }

        output
    }

    fn format_answer(&self, answer: &AnswerInfo) -> String {
        let mut output = String::new();
        if let Some(ref context) = answer.context {
            output.push_str("Context\n-------\n");
            if context.is_empty() {
                output.push_str("(none)\n");
            } else {
                output.push_str(context);
                output.push('\n');
            }
            output.push('\n');
        }
        output.push_str(&answer.answer);
        output.push('\n');
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::from("Status\n------\n");

        let embedding = if status.embedding_healthy {
            "[HEALTHY]"
        } else {
            "[UNAVAILABLE]"
        };
        output.push_str(&format!("Embedding:     {embedding}\n"));
        output.push_str(&format!("  Backend:     {}\n", status.embedding_backend));
        if let Some(ref err) = status.embedding_error {
            output.push_str(&format!("  Error:       {err}\n"));
        }
        output.push('\n');

        let vector_status = if status.vector_store_connected {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        output.push_str(&format!(
            "Vector Store:  {} ({})\n",
            status.vector_store_driver, vector_status
        ));
        output.push_str(&format!("  URL:         {}\n", status.vector_store_url));
        output.push_str(&format!("  Collection:  {}\n", status.collection));
        match status.collection_points {
            Some(points) => output.push_str(&format!("  Points:      {points}\n")),
            None if status.vector_store_connected => output.push_str("  Points:      (no collection)\n"),
            None => {}
        }
        output.push('\n');

        output.push_str(&format!("Generation:    {}\n", status.generation_model));
        output.push_str(&format!("  URL:         {}\n", status.generation_url));
        output.push('\n');

        output.push_str(&format!(
            "Jobs:          {} queued, {} running, {} succeeded, {} failed\n",
            status.jobs_queued, status.jobs_running, status.jobs_succeeded, status.jobs_failed
        ));

        output
    }

    fn format_ingest_summary(&self, summary: &IngestSummary) -> String {
        let mut output = String::from("Ingestion Complete\n------------------\n");
        output.push_str(&format!("Collection: {}\n", summary.collection));
        output.push_str(&format!("Files found: {}\n", summary.files_found));
        output.push_str(&format!("Files skipped: {}\n", summary.files_skipped));
        output.push_str(&format!("Succeeded: {}\n", summary.succeeded()));
        output.push_str(&format!("Failed: {}\n", summary.failed()));
        output.push_str(&format!("Chunks stored: {}\n", summary.chunks_stored()));
        output.push_str(&format!("Duration: {}ms\n", summary.duration_ms));

        let failures: Vec<&IngestJob> = summary
            .jobs
            .iter()
            .filter(|j| j.last_error.is_some())
            .collect();
        if !failures.is_empty() {
            output.push_str("\nFailures:\n");
            for job in failures {
                output.push_str(&format!(
                    "  {} {}: {}\n",
                    short_id(&job.id),
                    job.pdf_path.display(),
                    job.last_error.as_deref().unwrap_or_default()
                ));
            }
        }
        output
    }

    fn format_jobs(&self, jobs: &[IngestJob]) -> String {
        if jobs.is_empty() {
            return "No jobs found.\n".to_string();
        }

        let mut output = format!(
            "{:<8}  {:<9}  {:>8}  {:>6}  {}\n",
            "ID", "STATUS", "ATTEMPTS", "CHUNKS", "PDF"
        );
        for job in jobs {
            output.push_str(&format!(
                "{:<8}  {:<9}  {:>8}  {:>6}  {}\n",
                short_id(&job.id),
                job.status,
                job.attempts,
                job.chunks_stored,
                job.pdf_path.display()
            ));
        }
        output
    }

    fn format_job(&self, job: &IngestJob) -> String {
        let mut output = format!("Job {}\n", job.id);
        output.push_str(&format!("  Status:      {}\n", job.status));
        output.push_str(&format!("  PDF:         {}\n", job.pdf_path.display()));
        output.push_str(&format!("  Text:        {}\n", job.text_path.display()));
        output.push_str(&format!("  Collection:  {}\n", job.collection));
        output.push_str(&format!("  Chunk size:  {}\n", job.chunk_size));
        output.push_str(&format!("  Attempts:    {}\n", job.attempts));
        output.push_str(&format!("  Chunks:      {}\n", job.chunks_stored));
        output.push_str(&format!("  Created:     {}\n", job.created_at));
        output.push_str(&format!("  Updated:     {}\n", job.updated_at));
        if let Some(ref err) = job.last_error {
            output.push_str(&format!("  Last error:  {err}\n"));
        }
        output
    }

    fn format_collection(&self, info: &CollectionStatus) -> String {
        if !info.exists {
            return format!("Collection '{}' does not exist.\n", info.name);
        }
        let mut output = format!("Collection: {}\n", info.name);
        output.push_str(&format!("  Points:     {}\n", info.points));
        if let Some(dim) = info.dimension {
            output.push_str(&format!("  Dimension:  {dim}\n"));
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }
}

impl Formatter for JsonFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        to_json(results, self.pretty) + "\n"
    }

    fn format_answer(&self, answer: &AnswerInfo) -> String {
        to_json(answer, self.pretty) + "\n"
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let json = serde_json::json!({
            "embedding": {
                "backend": status.embedding_backend,
                "healthy": status.embedding_healthy,
                "error": status.embedding_error,
            },
            "vector_store": {
                "driver": status.vector_store_driver,
                "url": status.vector_store_url,
                "connected": status.vector_store_connected,
                "collection": status.collection,
                "points": status.collection_points,
            },
            "generation": {
                "url": status.generation_url,
                "model": status.generation_model,
            },
            "jobs": {
                "queued": status.jobs_queued,
                "running": status.jobs_running,
                "succeeded": status.jobs_succeeded,
                "failed": status.jobs_failed,
            }
        });
        to_json(&json, self.pretty) + "\n"
    }

    fn format_ingest_summary(&self, summary: &IngestSummary) -> String {
        let json = serde_json::json!({
            "collection": summary.collection,
            "files_found": summary.files_found,
            "files_skipped": summary.files_skipped,
            "succeeded": summary.succeeded(),
            "failed": summary.failed(),
            "chunks_stored": summary.chunks_stored(),
            "duration_ms": summary.duration_ms,
            "jobs": summary.jobs,
        });
        to_json(&json, self.pretty) + "\n"
    }

    fn format_jobs(&self, jobs: &[IngestJob]) -> String {
        to_json(&serde_json::json!({ "jobs": jobs }), self.pretty) + "\n"
    }

    fn format_job(&self, job: &IngestJob) -> String {
        to_json(job, self.pretty) + "\n"
    }

    fn format_collection(&self, info: &CollectionStatus) -> String {
        to_json(info, self.pretty) + "\n"
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string() + "\n"
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string() + "\n"
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("## No results found\n\nQuery: `{}`\n", results.query);
        }

        let mut output = String::from("## Search Results\n\n");
        output.push_str(&format!(
            "**Query:** `{}`  \n**Collection:** `{}`\n\n",
            results.query, results.collection
        ));
        output.push_str(&format!(
            "Found {} results in {}ms\n\n",
            results.len(),
            results.duration_ms
        ));

        for (i, result) in results.results.iter().enumerate() {
            output.push_str(&format!("### {}. Score: {:.3}\n\n", i + 1, result.score));
            if let Some(ref source) = result.source {
                output.push_str(&format!("**Source:** `{source}`"));
                if let Some(idx) = result.chunk_index {
                    output.push_str(&format!(" (chunk {idx})"));
                }
                output.push_str("\n\n");
            }
            output.push_str("```\n");
            output.push_str(result.original_text.as_deref().unwrap_or_default());
            output.push_str("\n```\n\n");
        }

        output
    }

    fn format_answer(&self, answer: &AnswerInfo) -> String {
        let mut output = format!("## Answer ({})\n\n{}\n", answer.model, answer.answer);
        if let Some(ref context) = answer.context {
            output.push_str("\n### Context\n\n");
            if context.is_empty() {
                output.push_str("*No context retrieved.*\n");
            } else {
                output.push_str(&format!("```\n{context}\n```\n"));
            }
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let tick = |ok: bool| if ok { "✅" } else { "❌" };

        let mut output = String::from("## Status\n\n");
        output.push_str(&format!(
            "### Embedding {}\n\n- **Backend:** `{}`\n",
            tick(status.embedding_healthy),
            status.embedding_backend
        ));
        if let Some(ref err) = status.embedding_error {
            output.push_str(&format!("- **Error:** {err}\n"));
        }
        output.push('\n');

        output.push_str(&format!(
            "### Vector Store ({}) {}\n\n",
            status.vector_store_driver,
            tick(status.vector_store_connected)
        ));
        output.push_str(&format!("- **URL:** `{}`\n", status.vector_store_url));
        output.push_str(&format!("- **Collection:** {}\n", status.collection));
        if let Some(points) = status.collection_points {
            output.push_str(&format!("- **Points:** {points}\n"));
        }
        output.push('\n');

        output.push_str(&format!(
            "### Generation\n\n- **Model:** {}\n- **URL:** `{}`\n\n",
            status.generation_model, status.generation_url
        ));

        output.push_str("### Jobs\n\n| Status | Count |\n|--------|-------|\n");
        output.push_str(&format!("| queued | {} |\n", status.jobs_queued));
        output.push_str(&format!("| running | {} |\n", status.jobs_running));
        output.push_str(&format!("| succeeded | {} |\n", status.jobs_succeeded));
        output.push_str(&format!("| failed | {} |\n", status.jobs_failed));
        output
    }

    fn format_ingest_summary(&self, summary: &IngestSummary) -> String {
        let mut output = String::from("## Ingestion Complete\n\n");
        output.push_str("| Metric | Value |\n|--------|-------|\n");
        output.push_str(&format!("| Collection | `{}` |\n", summary.collection));
        output.push_str(&format!("| Files found | {} |\n", summary.files_found));
        output.push_str(&format!("| Files skipped | {} |\n", summary.files_skipped));
        output.push_str(&format!("| Succeeded | {} |\n", summary.succeeded()));
        output.push_str(&format!("| Failed | {} |\n", summary.failed()));
        output.push_str(&format!("| Chunks stored | {} |\n", summary.chunks_stored()));
        output.push_str(&format!("| Duration | {}ms |\n", summary.duration_ms));
        if summary.failed() > 0 {
            output.push('\n');
            output.push_str(&self.format_jobs(&summary.jobs));
        }
        output
    }

    fn format_jobs(&self, jobs: &[IngestJob]) -> String {
        if jobs.is_empty() {
            return "## Jobs\n\n*No jobs found.*\n".to_string();
        }

        let mut output = String::from("## Jobs\n\n");
        output.push_str("| ID | Status | Attempts | Chunks | PDF | Error |\n");
        output.push_str("|----|--------|----------|--------|-----|-------|\n");
        for job in jobs {
            output.push_str(&format!(
                "| `{}` | {} | {} | {} | `{}` | {} |\n",
                short_id(&job.id),
                job.status,
                job.attempts,
                job.chunks_stored,
                job.pdf_path.display(),
                job.last_error.as_deref().unwrap_or_default()
            ));
        }
        output
    }

    fn format_job(&self, job: &IngestJob) -> String {
        let mut output = format!("## Job `{}`\n\n", job.id);
        output.push_str(&format!("- **Status:** {}\n", job.status));
        output.push_str(&format!("- **PDF:** `{}`\n", job.pdf_path.display()));
        output.push_str(&format!("- **Text:** `{}`\n", job.text_path.display()));
        output.push_str(&format!("- **Collection:** {}\n", job.collection));
        output.push_str(&format!("- **Chunk size:** {}\n", job.chunk_size));
        output.push_str(&format!("- **Attempts:** {}\n", job.attempts));
        output.push_str(&format!("- **Chunks:** {}\n", job.chunks_stored));
        output.push_str(&format!("- **Updated:** {}\n", job.updated_at));
        if let Some(ref err) = job.last_error {
            output.push_str(&format!("- **Last error:** {err}\n"));
        }
        output
    }

    fn format_collection(&self, info: &CollectionStatus) -> String {
        if !info.exists {
            return format!("## Collection `{}`\n\n*Does not exist.*\n", info.name);
        }
        let mut output = format!("## Collection `{}`\n\n", info.name);
        output.push_str(&format!("- **Points:** {}\n", info.points));
        if let Some(dim) = info.dimension {
            output.push_str(&format!("- **Dimension:** {dim}\n"));
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobStatus, SearchResult};
    use std::path::PathBuf;

    fn job(status: JobStatus, error: Option<&str>) -> IngestJob {
        IngestJob {
            id: "0123456789abcdef".to_string(),
            pdf_path: PathBuf::from("/docs/a.pdf"),
            text_path: PathBuf::from("/docs/a.txt"),
            collection: "kb".to_string(),
            chunk_size: 512,
            status,
            attempts: 1,
            chunks_stored: 4,
            last_error: error.map(String::from),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:01Z".to_string(),
        }
    }

    fn results() -> SearchResults {
        SearchResults::new(
            "refunds".to_string(),
            "kb".to_string(),
            vec![SearchResult {
                id: "p1".to_string(),
                score: 0.91,
                original_text: Some("Refunds within thirty days".to_string()),
                source: Some("policy.txt".to_string()),
                chunk_index: Some(2),
            }],
            12,
        )
    }

    #[test]
    fn test_text_search_results() {
        let out = TextFormatter.format_search_results(&results());
        assert!(out.contains("1. [Score: 0.910]"));
        assert!(out.contains("Source: policy.txt (chunk 2)"));
        assert!(out.contains("Refunds within thirty days"));
    }

    #[test]
    fn test_json_search_results_parse_back() {
        let out = JsonFormatter::new(false).format_search_results(&results());
        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["collection"], "kb");
        assert_eq!(value["results"][0]["source"], "policy.txt");
    }

    #[test]
    fn test_ingest_summary_counts() {
        let summary = IngestSummary {
            collection: "kb".to_string(),
            files_found: 2,
            jobs: vec![
                job(JobStatus::Succeeded, None),
                job(JobStatus::Failed, Some("failed to parse PDF")),
            ],
            ..Default::default()
        };
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.chunks_stored(), 8);

        let out = TextFormatter.format_ingest_summary(&summary);
        assert!(out.contains("Failures:"));
        assert!(out.contains("01234567 /docs/a.pdf: failed to parse PDF"));
    }

    #[test]
    fn test_jobs_table_uses_short_ids() {
        let out = TextFormatter.format_jobs(&[job(JobStatus::Queued, None)]);
        assert!(out.contains("01234567  queued"));
        assert_eq!(TextFormatter.format_jobs(&[]), "No jobs found.\n");
    }

    #[test]
    fn test_answer_context_only_when_requested() {
        let mut answer = AnswerInfo {
            model: "tinyllama:latest".to_string(),
            prompt: "q".to_string(),
            answer: "a".to_string(),
            context: None,
        };
        assert_eq!(TextFormatter.format_answer(&answer), "a\n");

        answer.context = Some(String::new());
        assert!(TextFormatter.format_answer(&answer).contains("(none)"));
        let json = JsonFormatter::new(false).format_answer(&answer);
        assert!(json.contains("\"context\":\"\""));
    }
}

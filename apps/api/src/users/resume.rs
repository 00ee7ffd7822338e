//! Resume analysis over text already extracted from an uploaded resume.
//!
//! Extracts live in `users/<id>/resumes/<file>/extracts`; the analysis is
//! written to the `scan` record of `users/<id>/resumes/<file>/reports`,
//! replacing any earlier scan.

use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::documents::{Document, DocumentStore};
use crate::errors::AppError;
use crate::generation::item::timestamp_now;
use crate::generation::sanitizer::parse_object;
use crate::llm_client::{CompletionService, Conversation, CHAT_MODEL};
use crate::users::user_collection;

pub const RESUME_PROMPT_KEY: &str = "resumeAnalysisPrompt";
pub const ANALYSIS_MAX_TOKENS: u32 = 4096;
pub const SCAN_REPORT: &str = "scan";

pub fn resume_collection(user_id: Uuid, file_name: &str, path: &str) -> String {
    user_collection(user_id, &format!("resumes/{file_name}/{path}"))
}

/// Stable id of a named record, derived from its full path.
pub fn named_record_id(collection: &str, name: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{collection}/{name}").as_bytes())
}

/// Text of the extract with the greatest `extractionDate`.
pub fn latest_extract(extracts: &[Document]) -> Option<&str> {
    extracts
        .iter()
        .max_by(|a, b| {
            a.str_field("extractionDate")
                .cmp(&b.str_field("extractionDate"))
        })
        .and_then(|latest| latest.str_field("extractedText"))
}

/// Analyzes the latest extract of `file_name` and stores the scan report.
/// Returns the report's name.
pub async fn analyze_resume(
    documents: &dyn DocumentStore,
    completions: &dyn CompletionService,
    prompt: &str,
    user_id: Uuid,
    file_name: &str,
) -> Result<&'static str, AppError> {
    let extracts = documents
        .list(&resume_collection(user_id, file_name, "extracts"), i64::MAX)
        .await?;
    let text = latest_extract(&extracts)
        .ok_or_else(|| AppError::NotFound("Extracted text not found.".to_string()))?;

    let conversation = Conversation::single(format!("{prompt}\n\n{text}"));
    let raw = completions
        .complete(CHAT_MODEL, &conversation, ANALYSIS_MAX_TOKENS)
        .await?;
    let analysis = parse_object(&raw)
        .map_err(|e| AppError::UnusableOutput(format!("Invalid resume analysis format: {e}")))?;

    let mut report = Map::new();
    report.insert("analysis".into(), Value::Object(analysis));
    report.insert("scanDate".into(), Value::String(timestamp_now()));

    let reports = resume_collection(user_id, file_name, "reports");
    documents
        .set(&reports, named_record_id(&reports, SCAN_REPORT), report)
        .await?;
    info!("Saved resume scan for {file_name} of user {user_id}");
    Ok(SCAN_REPORT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryDocumentStore, ScriptedCompletions};
    use serde_json::json;

    fn seeded(user: Uuid) -> MemoryDocumentStore {
        let store = MemoryDocumentStore::default();
        let extracts = resume_collection(user, "cv.pdf", "extracts");
        store.insert(
            &extracts,
            json!({ "extractionDate": "2024-05-02T10:00:00.000Z", "extractedText": "newer" }),
        );
        store.insert(
            &extracts,
            json!({ "extractionDate": "2024-05-01T10:00:00.000Z", "extractedText": "older" }),
        );
        store
    }

    #[test]
    fn test_named_record_ids_are_stable_per_path() {
        let a = named_record_id("users/1/resumes/cv.pdf/reports", "scan");
        assert_eq!(a, named_record_id("users/1/resumes/cv.pdf/reports", "scan"));
        assert_ne!(a, named_record_id("users/1/resumes/other.pdf/reports", "scan"));
    }

    #[tokio::test]
    async fn test_latest_extract_is_analyzed_and_scan_replaced() {
        let user = Uuid::new_v4();
        let store = seeded(user);
        let completions = ScriptedCompletions::new([
            r#"```json {"score": 61} ```"#,
            r#"{"score": 74}"#,
        ]);

        for _ in 0..2 {
            let report = analyze_resume(&store, &completions, "Score it.", user, "cv.pdf")
                .await
                .unwrap();
            assert_eq!(report, "scan");
        }

        let calls = completions.calls();
        assert_eq!(calls[0].messages[0].content, "Score it.\n\nnewer");
        assert_eq!(calls[0].max_tokens, 4096);

        let reports = store.documents(&resume_collection(user, "cv.pdf", "reports"));
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].data["analysis"], json!({ "score": 74 }));
        assert!(reports[0].data["scanDate"].is_string());
    }

    #[tokio::test]
    async fn test_missing_extract_is_not_found() {
        let store = MemoryDocumentStore::default();
        let completions = ScriptedCompletions::default();
        let err = analyze_resume(&store, &completions, "", Uuid::new_v4(), "cv.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(completions.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_analysis_writes_no_report() {
        let user = Uuid::new_v4();
        let store = seeded(user);
        let completions = ScriptedCompletions::new(["I can't score this."]);
        let err = analyze_resume(&store, &completions, "", user, "cv.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnusableOutput(_)));
        assert!(store
            .documents(&resume_collection(user, "cv.pdf", "reports"))
            .is_empty());
    }
}

//! Multi-stage course generator.
//!
//! `ROOT -> PER_CHAPTER(i) -> PER_TOPIC(i, j) -> DONE`, strictly sequential.
//! Each stage gets a freshly built two-message conversation carrying only the
//! parent context (course name and overview, then chapter title, subtitle and
//! overview), never the accumulated history.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::generation::domains::{Domain, DomainSpec};
use crate::generation::error::{GenerationError, Stage};
use crate::generation::item::{check_required, ItemGenerator, RecordSink};
use crate::generation::sanitizer::parse_object;
use crate::llm_client::prompts::{
    CHAPTER_CONTEXT, CHAPTER_PROMPT, COURSE_CONTEXT, COURSE_OUTLINE_PROMPT, TOPIC_PROMPT,
};
use crate::llm_client::{ChatMessage, CompletionService, Conversation, Role};
use crate::models::record::GeneratedRecord;
use crate::models::work_item::WorkItem;

pub const OUTLINE_MAX_TOKENS: u32 = 1024;
pub const CHAPTER_MAX_TOKENS: u32 = 1024;
pub const TOPIC_MAX_TOKENS: u32 = 2048;

fn text<'a>(object: &'a Map<String, Value>, field: &str) -> &'a str {
    object.get(field).and_then(Value::as_str).unwrap_or_default()
}

fn two_user_messages(context: String, prompt: String) -> Conversation {
    Conversation::new(vec![
        ChatMessage::new(Role::User, context),
        ChatMessage::new(Role::User, prompt),
    ])
}

/// Takes the array in `field` out of `object`, leaving nothing behind.
fn take_array(
    object: &mut Map<String, Value>,
    field: &str,
    stage: Stage,
) -> Result<Vec<Value>, GenerationError> {
    match object.remove(field) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(GenerationError::parse(
            stage,
            format!("missing '{field}' array"),
        )),
    }
}

fn as_object(value: Value, stage: Stage) -> Result<Map<String, Value>, GenerationError> {
    match value {
        Value::Object(object) => Ok(object),
        _ => Err(GenerationError::parse(stage, "outline entry is not an object")),
    }
}

async fn complete_stage(
    completions: &dyn CompletionService,
    model: &str,
    conversation: &Conversation,
    max_tokens: u32,
    stage: Stage,
) -> Result<Map<String, Value>, GenerationError> {
    let raw = completions
        .complete(model, conversation, max_tokens)
        .await
        .map_err(|source| GenerationError::Completion { stage, source })?;
    debug!("Completion for {stage}: {raw}");
    parse_object(&raw).map_err(|e| GenerationError::parse(stage, e.to_string()))
}

/// Expands a course outline into chapters and topics.
///
/// Any failure aborts the whole course; nothing partial is returned.
pub async fn generate_composite(
    completions: &dyn CompletionService,
    model: &str,
    course_name: &str,
) -> Result<Map<String, Value>, GenerationError> {
    let outline = Conversation::single(COURSE_OUTLINE_PROMPT.replace("{course_name}", course_name));
    let mut course =
        complete_stage(completions, model, &outline, OUTLINE_MAX_TOKENS, Stage::Record).await?;
    check_required(&course, Domain::Course.spec().required, Stage::Record)?;

    let stubs = take_array(&mut course, "chapters", Stage::Record)?;
    let overview = text(&course, "overview").to_string();
    let course_context = COURSE_CONTEXT
        .replace("{course_name}", course_name)
        .replace("{course_overview}", &overview);

    let mut chapters = Vec::with_capacity(stubs.len());
    for (i, stub) in stubs.into_iter().enumerate() {
        let stage = Stage::Chapter { chapter: i };
        let stub = as_object(stub, stage)?;
        let prompt = CHAPTER_PROMPT
            .replace("{title}", text(&stub, "title"))
            .replace("{subtitle}", text(&stub, "subtitle"));
        let conversation = two_user_messages(course_context.clone(), prompt);

        let mut chapter =
            complete_stage(completions, model, &conversation, CHAPTER_MAX_TOKENS, stage).await?;
        let topic_stubs = take_array(&mut chapter, "topics", stage)?;

        let chapter_context = CHAPTER_CONTEXT
            .replace("{course_name}", course_name)
            .replace("{course_overview}", &overview)
            .replace("{chapter_title}", text(&chapter, "title"))
            .replace("{chapter_subtitle}", text(&chapter, "subtitle"))
            .replace("{chapter_overview}", text(&chapter, "overview"));

        let mut topics = Vec::with_capacity(topic_stubs.len());
        for (j, topic_stub) in topic_stubs.into_iter().enumerate() {
            let stage = Stage::Topic { chapter: i, topic: j };
            let topic_stub = as_object(topic_stub, stage)?;
            let prompt = TOPIC_PROMPT
                .replace("{title}", text(&topic_stub, "title"))
                .replace("{subtitle}", text(&topic_stub, "subtitle"));
            let conversation = two_user_messages(chapter_context.clone(), prompt);

            let topic =
                complete_stage(completions, model, &conversation, TOPIC_MAX_TOKENS, stage).await?;
            topics.push(Value::Object(topic));
        }

        info!(
            "Expanded chapter {} of '{course_name}' with {} topics",
            i + 1,
            topics.len()
        );
        chapter.insert("topics".into(), Value::Array(topics));
        chapters.push(Value::Object(chapter));
    }

    course.insert("chapters".into(), Value::Array(chapters));
    Ok(course)
}

pub struct CourseGenerator {
    completions: Arc<dyn CompletionService>,
    sink: RecordSink,
}

impl CourseGenerator {
    pub fn new(completions: Arc<dyn CompletionService>, sink: RecordSink) -> Self {
        Self { completions, sink }
    }
}

#[async_trait]
impl ItemGenerator for CourseGenerator {
    fn spec(&self) -> &'static DomainSpec {
        Domain::Course.spec()
    }

    async fn generate(&self, item: &WorkItem) -> Result<GeneratedRecord, GenerationError> {
        let course =
            generate_composite(self.completions.as_ref(), self.spec().model, &item.name).await?;
        self.sink.persist(item, course).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryDocumentStore, ScriptedCompletions};
    use serde_json::json;

    fn rome_script() -> Vec<String> {
        let mut script = vec![json!({
            "name": "History of Rome",
            "overview": "From kings to emperors",
            "level": "Beginner",
            "tags": ["History", "Rome"],
            "chapters": [
                { "title": "Kingdom", "subtitle": "753 BC" },
                { "title": "Republic", "subtitle": "509 BC" },
                { "title": "Empire", "subtitle": "27 BC" }
            ]
        })
        .to_string()];
        for chapter in ["Kingdom", "Republic", "Empire"] {
            script.push(
                json!({
                    "title": chapter,
                    "subtitle": "era",
                    "overview": format!("{chapter} overview"),
                    "topics": [
                        { "title": "Politics", "subtitle": "" },
                        { "title": "War", "subtitle": "" }
                    ]
                })
                .to_string(),
            );
            for topic in ["Politics", "War"] {
                script.push(format!(
                    "Here you go: {{\"title\":\"{chapter} {topic}\",\"points\":[]}}"
                ));
            }
        }
        script
    }

    #[tokio::test]
    async fn test_three_chapters_two_topics_is_ten_sequential_calls() {
        let completions = ScriptedCompletions::new(rome_script());
        let course = generate_composite(&completions, "gpt-4o-mini", "History of Rome")
            .await
            .unwrap();

        let calls = completions.calls();
        assert_eq!(calls.len(), 10);
        assert_eq!(calls[0].messages.len(), 1);
        assert_eq!(calls[0].max_tokens, 1024);
        assert!(calls[1..].iter().all(|c| c.messages.len() == 2));
        assert_eq!(calls[1].max_tokens, 1024);
        assert_eq!(calls[2].max_tokens, 2048);

        let chapters = course["chapters"].as_array().unwrap();
        assert_eq!(chapters.len(), 3);
        for chapter in chapters {
            let topics = chapter["topics"].as_array().unwrap();
            assert_eq!(topics.len(), 2);
            assert!(topics.iter().all(|t| t.get("points").is_some()));
        }
        assert_eq!(chapters[2]["topics"][1]["title"], "Empire War");
    }

    #[tokio::test]
    async fn test_nested_prompts_carry_only_parent_context() {
        let completions = ScriptedCompletions::new(rome_script());
        generate_composite(&completions, "gpt-4o-mini", "History of Rome")
            .await
            .unwrap();

        let calls = completions.calls();
        assert_eq!(
            calls[1].messages[0].content,
            "Course name:History of Rome Course overview:From kings to emperors"
        );
        assert!(calls[1].messages[1].content.contains("title Kingdom and subtitle 753 BC"));
        assert_eq!(
            calls[2].messages[0].content,
            "Course name:History of Rome Course overview:From kings to emperors \
             chapter title:Kingdom chapter sub title:era chapter overview:Kingdom overview"
        );
        assert!(calls[3].messages[1].content.contains("topic with title War"));
    }

    #[tokio::test]
    async fn test_topic_parse_failure_aborts_course() {
        let mut script = rome_script();
        script[3] = "no json here".to_string();
        let completions = Arc::new(ScriptedCompletions::new(script));
        let store = Arc::new(MemoryDocumentStore::default());
        let generator = CourseGenerator::new(
            completions.clone(),
            RecordSink::new(Domain::Course.spec(), store.clone(), None),
        );

        let err = generator
            .generate(&WorkItem::named("History of Rome"))
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Topic { chapter: 0, topic: 1 });
        assert_eq!(completions.calls().len(), 4);
        assert!(store.documents("courses").is_empty());
    }

    #[tokio::test]
    async fn test_chapter_without_topics_is_a_parse_error() {
        let completions = ScriptedCompletions::new([
            r#"{"overview":"o","chapters":[{"title":"One","subtitle":"s"}]}"#,
            r#"{"title":"One","overview":"no topics"}"#,
        ]);
        let err = generate_composite(&completions, "gpt-4o-mini", "Stoicism")
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Chapter { chapter: 0 });
    }

    #[tokio::test]
    async fn test_outline_without_overview_stops_before_chapters() {
        let completions = ScriptedCompletions::new([r#"{"chapters":[{"title":"One"}]}"#]);
        let err = generate_composite(&completions, "gpt-4o-mini", "Stoicism")
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Parse { stage: Stage::Record, .. }));
        assert!(err.to_string().contains("'overview'"));
        assert_eq!(completions.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_course_is_normalized_and_persisted() {
        let completions = Arc::new(ScriptedCompletions::new(rome_script()));
        let store = Arc::new(MemoryDocumentStore::default());
        let generator = CourseGenerator::new(
            completions,
            RecordSink::new(Domain::Course.spec(), store.clone(), None),
        );

        let record = generator
            .generate(&WorkItem::named("History of Rome"))
            .await
            .unwrap();
        assert_eq!(record.data["level"], "beginner");
        assert_eq!(record.data["tags"], json!(["history", "rome"]));
        assert_eq!(record.image(), "");
        assert_eq!(store.documents("courses").len(), 1);
    }
}

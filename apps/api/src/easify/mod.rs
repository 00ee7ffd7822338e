//! "Easify": plain-language explanations of one passage of a stored record.
//!
//! A request names a content type and a record id plus locators (chapter,
//! exercise, step, industry part). The target table maps each type to its
//! collection, a field extractor and a prompt-context builder.

pub mod handlers;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const EASIFY_PROMPT_KEY: &str = "easifyRequest";
pub const RESPONSES_COLLECTION: &str = "easifyResponses";
const DEFAULT_MAX_TOKENS: u32 = 1500;
const INDUSTRY_MAX_TOKENS: u32 = 2000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EasifyError {
    #[error("Invalid type '{0}'. Must be course, workout, recipe or industry.")]
    UnknownType(String),

    #[error("item is missing '{0}'")]
    MissingLocator(&'static str),

    #[error("document has no {0}")]
    NotInDocument(String),

    #[error("Invalid industry part: {0}")]
    UnknownPart(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EasifyRequest {
    #[serde(rename = "type")]
    pub kind: String,
    /// `{ id, ...locators }`; the locators depend on the type.
    pub item: Value,
}

/// The passage a request points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    pub heading: String,
    pub text: String,
}

pub struct EasifyTarget {
    pub kind: &'static str,
    pub collection: &'static str,
    pub max_tokens: u32,
    pub extract: fn(document: &Value, item: &Value) -> Result<Excerpt, EasifyError>,
    pub context: fn(document: &Value, excerpt: &Excerpt, request: &str) -> String,
}

static TARGETS: [EasifyTarget; 4] = [
    EasifyTarget {
        kind: "course",
        collection: "courses",
        max_tokens: DEFAULT_MAX_TOKENS,
        extract: course_point,
        context: course_context,
    },
    EasifyTarget {
        kind: "workout",
        collection: "workouts",
        max_tokens: DEFAULT_MAX_TOKENS,
        extract: workout_exercise,
        context: workout_context,
    },
    EasifyTarget {
        kind: "recipe",
        collection: "recipes",
        max_tokens: DEFAULT_MAX_TOKENS,
        extract: recipe_step,
        context: recipe_context,
    },
    EasifyTarget {
        kind: "industry",
        collection: "industries",
        max_tokens: INDUSTRY_MAX_TOKENS,
        extract: industry_part,
        context: industry_context,
    },
];

impl EasifyTarget {
    pub fn for_kind(kind: &str) -> Result<&'static EasifyTarget, EasifyError> {
        TARGETS
            .iter()
            .find(|target| target.kind == kind)
            .ok_or_else(|| EasifyError::UnknownType(kind.to_string()))
    }
}

fn text<'a>(value: &'a Value, field: &str) -> &'a str {
    value.get(field).and_then(Value::as_str).unwrap_or_default()
}

/// Generated records title their sections with `title`; older ones use `name`.
fn title(value: &Value) -> &str {
    match text(value, "title") {
        "" => text(value, "name"),
        title => title,
    }
}

fn locator(item: &Value, field: &'static str) -> Result<usize, EasifyError> {
    item.get(field)
        .and_then(Value::as_u64)
        .and_then(|i| usize::try_from(i).ok())
        .ok_or(EasifyError::MissingLocator(field))
}

fn nth<'a>(list: Option<&'a Value>, index: usize, path: &str) -> Result<&'a Value, EasifyError> {
    list.and_then(|list| list.get(index))
        .ok_or_else(|| EasifyError::NotInDocument(format!("{path}[{index}]")))
}

/// Stage 1 is the warm-up or preparation list; anything else is the main one.
fn is_first_stage(item: &Value) -> bool {
    item.get("stage").and_then(Value::as_u64) == Some(1)
}

fn course_point(document: &Value, item: &Value) -> Result<Excerpt, EasifyError> {
    let (c, t, p) = (
        locator(item, "chapterNumber")?,
        locator(item, "topicNumber")?,
        locator(item, "pointIndex")?,
    );
    let chapter = nth(document.get("chapters"), c, "chapters")?;
    let topic = nth(chapter.get("topics"), t, "topics")?;
    let point = nth(topic.get("points"), p, "points")?;

    Ok(Excerpt {
        heading: format!(
            "chapter \"{}\", topic \"{}\", and point \"{}\"",
            title(chapter),
            title(topic),
            text(point, "title")
        ),
        text: format!(
            "{} - {} - {}",
            text(point, "title"),
            text(point, "desc"),
            text(point, "content")
        ),
    })
}

fn course_context(document: &Value, excerpt: &Excerpt, request: &str) -> String {
    format!(
        "I am reading the course \"{}\". In {}, it says: \"{}\". {request}",
        text(document, "name"),
        excerpt.heading,
        excerpt.text
    )
}

fn workout_exercise(document: &Value, item: &Value) -> Result<Excerpt, EasifyError> {
    let index = locator(item, "exerciseIndex")?;
    let section = if is_first_stage(item) { "warmUp" } else { "routine" };
    let exercises = document.get(section).and_then(|s| s.get("exercises"));
    let exercise = nth(exercises, index, &format!("{section}.exercises"))?;

    let name = text(exercise, "name");
    Ok(Excerpt {
        heading: name.to_string(),
        text: format!("{name} {}", text(exercise, "description")),
    })
}

fn workout_context(document: &Value, excerpt: &Excerpt, request: &str) -> String {
    format!(
        "I am doing the workout \"{}\". The exercise \"{}\" is described as: \"{}\". {request}",
        text(document, "name"),
        excerpt.heading,
        excerpt.text
    )
}

fn recipe_step(document: &Value, item: &Value) -> Result<Excerpt, EasifyError> {
    let index = locator(item, "instructionIndex")?;
    let section = if is_first_stage(item) { "prepare" } else { "instructions" };
    let step = nth(document.get(section), index, section)?;

    let name = text(step, "name");
    Ok(Excerpt {
        heading: name.to_string(),
        text: format!("{name} {}", text(step, "description")),
    })
}

fn recipe_context(document: &Value, excerpt: &Excerpt, request: &str) -> String {
    format!(
        "I am following the recipe \"{}\". In the step \"{}\", it says: \"{}\". {request}",
        text(document, "name"),
        excerpt.heading,
        excerpt.text
    )
}

/// Industry part -> record field.
const INDUSTRY_PARTS: &[(&str, &str)] = &[
    ("skillsInDemand", "skillsInDemand"),
    ("topCompany", "topCompanies"),
    ("customerBase", "customerBase"),
    ("geographicalHotspots", "geographicalHotspots"),
    ("opportunities", "futureOpportunities"),
    ("notableTechnologies", "notableTechnologies"),
    ("requiredEducation", "educationalRequirements"),
    ("workConditions", "workEnvironment"),
    ("jobProspects", "jobOutlook"),
    ("majorTrends", "majorTrends"),
    ("challenges", "challenges"),
];

fn industry_overview(document: &Value) -> String {
    let details = document.get("detailedInfo").unwrap_or(&Value::Null);
    let or = |field: &str, fallback: &str| match text(details, field) {
        "" => fallback.to_string(),
        value => value.to_string(),
    };
    let year_started = match details.get("yearStarted") {
        Some(Value::String(year)) if !year.is_empty() => format!("Established in {year}"),
        Some(Value::Number(year)) => format!("Established in {year}"),
        _ => "Year started unknown".to_string(),
    };
    format!(
        "{year_started}\nGrowth Rate: {}\nMarket Size: {}\nHistorical Significance: {}",
        or("growthRate", "Growth rate not available"),
        or("marketSize", "Market size unknown"),
        or("historicalSignificance", "No historical significance available")
    )
}

fn format_industry_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(entries)) => entries
            .iter()
            .map(|entry| match entry {
                Value::String(s) => s.clone(),
                _ if !text(entry, "name").is_empty() => {
                    format!("{}: {}", text(entry, "name"), text(entry, "description"))
                }
                _ => text(entry, "description").to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n• "),
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(object @ Value::Object(_)) => {
            serde_json::to_string_pretty(object).unwrap_or_default()
        }
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => "No data available".to_string(),
    }
}

fn industry_part(document: &Value, item: &Value) -> Result<Excerpt, EasifyError> {
    let part = item
        .get("part")
        .and_then(Value::as_str)
        .ok_or(EasifyError::MissingLocator("part"))?;

    let text = if part == "overview" {
        industry_overview(document)
    } else {
        let (_, field) = INDUSTRY_PARTS
            .iter()
            .find(|(name, _)| *name == part)
            .ok_or_else(|| EasifyError::UnknownPart(part.to_string()))?;
        format_industry_field(document.get(*field))
    };

    Ok(Excerpt {
        heading: part.to_string(),
        text,
    })
}

fn industry_context(document: &Value, excerpt: &Excerpt, request: &str) -> String {
    format!(
        "I am exploring the industry \"{}\", which falls under \"{}\". \
         I want to know more about \"{}\". Here are the details:\n{}.\n{request}",
        text(document, "name"),
        text(document, "category"),
        excerpt.heading,
        excerpt.text
    )
}

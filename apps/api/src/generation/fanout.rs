//! Fan-out dispatcher: one wide course request becomes one message per course.
//!
//! Publishing is sequential and not contained per item: the first publish
//! error aborts the dispatch, leaving earlier messages published.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::messaging::{PublishError, Publisher};
use crate::models::work_item::WorkItem;

/// Body of each published message, and of a single-course invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRequest {
    pub course_name: String,
}

/// Extracts course names from `{ courses: [string | { name }] }`.
pub fn parse_course_names(message: &Value) -> Option<Vec<String>> {
    let courses = message.get("courses")?.as_array()?;
    courses
        .iter()
        .map(|c| {
            serde_json::from_value::<WorkItem>(c.clone())
                .ok()
                .map(|item| item.name)
        })
        .collect()
}

/// Publishes one `{ courseName }` message per name, in order. Returns the
/// number of messages published.
pub async fn dispatch(
    publisher: &dyn Publisher,
    topic: &str,
    names: &[String],
) -> Result<usize, PublishError> {
    for name in names {
        let message = serde_json::to_value(CourseRequest {
            course_name: name.clone(),
        })?;
        publisher.publish(topic, &message).await?;
        info!("Published course '{name}' to '{topic}'");
    }
    Ok(names.len())
}

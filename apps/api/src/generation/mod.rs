// Generation pipeline: raw model text -> sanitized JSON -> normalized record
// -> document store, driven per work item by the batch orchestrator.

pub mod batch;
pub mod course;
pub mod domains;
pub mod enrich;
pub mod error;
pub mod fanout;
pub mod guard;
pub mod handlers;
pub mod images;
pub mod invocation;
pub mod item;
pub mod normalize;
pub mod sanitizer;

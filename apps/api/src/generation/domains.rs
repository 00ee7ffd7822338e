//! Dispatch table over the closed set of generated content domains.
//!
//! Adding a domain means adding a `Domain` variant and one `DomainSpec`
//! entry; generation code never branches on the domain directly.

use chrono::NaiveDate;

use crate::generation::normalize::NormalizedField;
use crate::llm_client::prompts::PHOTOGRAPH_STYLE_SUFFIX;
use crate::llm_client::CHAT_MODEL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Recipe,
    Workout,
    Course,
    FinancialPlan,
    Industry,
}

/// How the image prompt for a record is derived, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePrompt {
    None,
    /// The record's `description` followed by a fixed suffix.
    FromDescription { suffix: &'static str },
    /// A configured template with `{name}` replaced by the item name.
    FromTemplate { prompt_key: &'static str },
}

/// How the record body is produced.
#[derive(Debug, Clone, Copy)]
pub enum GeneratorKind {
    /// One completion call with a configured request prompt.
    SingleShot {
        prompt_key: &'static str,
        max_tokens: u32,
        build_request: fn(name: &str, prompt: &str, today: NaiveDate) -> String,
    },
    /// Nested course -> chapters -> topics expansion with fixed prompts.
    Composite,
}

#[derive(Debug, Clone, Copy)]
pub struct DomainSpec {
    pub domain: Domain,
    /// Path segment of the batch route.
    pub slug: &'static str,
    /// Plural display name used in batch summaries.
    pub label: &'static str,
    /// Key of the item array in an inbound batch message.
    pub message_key: &'static str,
    pub collection: &'static str,
    pub model: &'static str,
    pub generator: GeneratorKind,
    pub image: ImagePrompt,
    pub normalize: &'static [NormalizedField],
    /// Top-level fields a parsed record must carry before it is persisted.
    pub required: &'static [&'static str],
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::Recipe,
        Domain::Workout,
        Domain::Course,
        Domain::FinancialPlan,
        Domain::Industry,
    ];

    pub fn spec(self) -> &'static DomainSpec {
        match self {
            Domain::Recipe => &RECIPE,
            Domain::Workout => &WORKOUT,
            Domain::Course => &COURSE,
            Domain::FinancialPlan => &FINANCIAL_PLAN,
            Domain::Industry => &INDUSTRY,
        }
    }

    pub fn from_slug(slug: &str) -> Option<Domain> {
        Self::ALL.into_iter().find(|d| d.spec().slug == slug)
    }

    pub fn from_collection(collection: &str) -> Option<Domain> {
        Self::ALL.into_iter().find(|d| d.spec().collection == collection)
    }
}

static RECIPE: DomainSpec = DomainSpec {
    domain: Domain::Recipe,
    slug: "recipes",
    label: "Recipes",
    message_key: "recipes",
    collection: "recipes",
    model: CHAT_MODEL,
    generator: GeneratorKind::SingleShot {
        prompt_key: "recipeRequest",
        max_tokens: 2048,
        build_request: recipe_request,
    },
    image: ImagePrompt::FromDescription {
        suffix: PHOTOGRAPH_STYLE_SUFFIX,
    },
    normalize: &[
        NormalizedField::Tags,
        NormalizedField::IngredientNames,
        NormalizedField::Category,
        NormalizedField::Level,
        NormalizedField::Cuisine,
    ],
    required: &["description", "instructions"],
};

static WORKOUT: DomainSpec = DomainSpec {
    domain: Domain::Workout,
    slug: "workouts",
    label: "Workouts",
    message_key: "workouts",
    collection: "workouts",
    model: CHAT_MODEL,
    generator: GeneratorKind::SingleShot {
        prompt_key: "workoutRequest",
        max_tokens: 2048,
        build_request: workout_request,
    },
    image: ImagePrompt::FromTemplate {
        prompt_key: "workoutImageRequest",
    },
    normalize: &[
        NormalizedField::Tags,
        NormalizedField::Category,
        NormalizedField::Level,
    ],
    required: &["routine"],
};

static COURSE: DomainSpec = DomainSpec {
    domain: Domain::Course,
    slug: "courses",
    label: "Courses",
    message_key: "courses",
    collection: "courses",
    model: CHAT_MODEL,
    generator: GeneratorKind::Composite,
    image: ImagePrompt::FromTemplate {
        prompt_key: "courseImageRequest",
    },
    normalize: &[
        NormalizedField::Tags,
        NormalizedField::Category,
        NormalizedField::Level,
    ],
    required: &["overview", "chapters"],
};

static FINANCIAL_PLAN: DomainSpec = DomainSpec {
    domain: Domain::FinancialPlan,
    slug: "financial-plans",
    label: "Financial plans",
    message_key: "financialPlans",
    collection: "financialPlans",
    model: CHAT_MODEL,
    generator: GeneratorKind::SingleShot {
        prompt_key: "financialPlanRequest",
        max_tokens: 8212,
        build_request: financial_plan_request,
    },
    image: ImagePrompt::None,
    normalize: &[NormalizedField::Tags],
    required: &[],
};

static INDUSTRY: DomainSpec = DomainSpec {
    domain: Domain::Industry,
    slug: "industries",
    label: "Industries",
    message_key: "industries",
    collection: "industries",
    model: CHAT_MODEL,
    generator: GeneratorKind::SingleShot {
        prompt_key: "careersRequest",
        max_tokens: 4096,
        build_request: industry_request,
    },
    image: ImagePrompt::None,
    normalize: &[NormalizedField::Tags],
    required: &["category"],
};

fn recipe_request(name: &str, prompt: &str, _today: NaiveDate) -> String {
    format!("Recipe name: {name} {prompt} ")
}

fn workout_request(name: &str, prompt: &str, _today: NaiveDate) -> String {
    format!("Workout name: {name}. {prompt}")
}

fn financial_plan_request(name: &str, prompt: &str, today: NaiveDate) -> String {
    format!(
        "{prompt} Financial Plan name: {name} - Date: {}",
        today.format("%-m/%-d/%Y")
    )
}

fn industry_request(name: &str, prompt: &str, _today: NaiveDate) -> String {
    format!("Industry name: {name} {prompt}")
}

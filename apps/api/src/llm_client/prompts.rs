// Fixed prompt fragments. Domain request prompts are NOT here: they are
// configuration, fetched from the prompt store per invocation.

/// Root stage of course generation.
pub const COURSE_OUTLINE_PROMPT: &str = "Generate an interesting course about {course_name}, \
    return in valid json format {name,category,overview,level(beginner/intermediate/advanced),\
    chapters[{title,subtitle}],additionalResources[string],tags[string]}";

pub const COURSE_CONTEXT: &str = "Course name:{course_name} Course overview:{course_overview}";

pub const CHAPTER_PROMPT: &str = "Generate interesting content for chapter with title {title} \
    and subtitle {subtitle}, return in valid json format \
    {title,subtitle,overview,topics[{title,subtitle}],tasks[string]}";

pub const CHAPTER_CONTEXT: &str = "Course name:{course_name} Course overview:{course_overview} \
    chapter title:{chapter_title} chapter sub title:{chapter_subtitle} \
    chapter overview:{chapter_overview}";

pub const TOPIC_PROMPT: &str = "Generate interesting content for topic with title {title} \
    and subtitle {subtitle}, return in valid json format \
    {title,subtitle,overview,points[{title,desc,content(string)}]}";

/// Appended to a recipe description to form its image prompt.
pub const PHOTOGRAPH_STYLE_SUFFIX: &str = ". Photograph style";

/// Placeholder substituted with the item name in image prompt templates.
pub const NAME_PLACEHOLDER: &str = "{name}";

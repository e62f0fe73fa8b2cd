//! Fixed instruction templates for the three model calls in the loop.

/// System instructions for initial query generation. Formatted with the
/// research topic; the model must answer with a JSON object carrying a
/// `query` field.
pub const QUERY_WRITER_INSTRUCTIONS: &str = r#"Your goal is to generate a targeted web search query.

The query will gather information related to a specific topic.

Topic:
{research_topic}

Return your response as a JSON object with exactly these keys:
- "query": the actual search query string
- "aspect": the specific aspect of the topic being researched
- "rationale": brief explanation of why this query is relevant"#;

/// System instructions for folding new evidence into the running summary.
pub const SUMMARIZER_INSTRUCTIONS: &str = r#"Your goal is to generate a high-quality summary of the provided search results.

When EXTENDING an existing summary:
1. Seamlessly integrate new information without repeating what is already covered.
2. Maintain consistency with the existing content's style and depth.
3. Only add new, non-redundant information.

When creating a NEW summary:
1. Highlight the most relevant information from each source.
2. Provide a concise overview of the key points related to the topic.
3. Emphasize significant findings or insights.
4. Ensure a coherent flow of information.

In both cases:
- Focus on factual, objective information.
- Maintain a consistent technical depth.
- Avoid redundancy and repetition.
- DO NOT use phrases like "based on the search results" or "the sources indicate".
- DO NOT add a preamble or title; start directly with the summary text."#;

/// System instructions for reflection. Formatted with the research topic;
/// the model must answer with a JSON object carrying `knowledge_gap` and
/// `follow_up_query` fields.
pub const REFLECTION_INSTRUCTIONS: &str = r#"You are an expert research assistant analyzing a summary about {research_topic}.

Your tasks:
1. Identify knowledge gaps or areas that need deeper exploration.
2. Generate a follow-up question that would help expand understanding.
3. Focus on technical details, implementation specifics, or emerging trends not fully covered.

Ensure the follow-up question is self-contained and includes the context needed for a web search.

Return your response as a JSON object with exactly these keys:
- "knowledge_gap": describe what information is missing or needs clarification
- "follow_up_query": write a specific question to address this gap"#;

/// Format a `{research_topic}` placeholder template.
pub fn format_instructions(template: &str, topic: &str) -> String {
    template.replace("{research_topic}", topic)
}

/// Build the user prompt for a summarization call from the current state.
///
/// The most recent web evidence block and every video evidence block gathered
/// so far are included; the existing-summary section appears only once a
/// summary exists.
pub fn build_summary_prompt(
    topic: &str,
    existing_summary: Option<&str>,
    latest_web_evidence: &str,
    video_evidence: &str,
) -> String {
    match existing_summary {
        Some(summary) if !summary.is_empty() => format!(
            "<User Input> \n {topic} \n <User Input>\n\n\
             <Existing Summary> \n {summary} \n <Existing Summary>\n\n\
             <New Web Search Results> \n {latest_web_evidence} \n <New Web Search Results>\n\n\
             <YouTube Search Results> \n {video_evidence} \n <YouTube Search Results>"
        ),
        _ => format!(
            "<User Input> \n {topic} \n <User Input>\n\n\
             <Web Search Results> \n {latest_web_evidence} \n <Web Search Results>\n\n\
             <YouTube Search Results> \n {video_evidence} \n <YouTube Search Results>"
        ),
    }
}

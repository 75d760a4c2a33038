//! Prompt templates sent to the generation service.
//!
//! The description prompt's key names are read back by
//! [`ResponseParser::parse`](crate::parser::ResponseParser::parse); the two
//! must change together.

/// Prompt asking for a bare title that summarizes `content`.
pub fn title_prompt(content: &str, max_chars: usize) -> String {
    format!(
        "Create a concise, engaging title (maximum {max_chars} characters) that accurately \
represents the following content.
Provide only the title text without any additional formatting, explanations, or quotation marks.

Content: {content}

Requirements:
- Maximum {max_chars} characters
- Clear and descriptive
- No introductory phrases
- No quotation marks
- Just the title text
"
    )
}

/// Prompt asking for a single JSON object with `Title`, `Description` and
/// `Category` for the record titled `title`.
pub fn description_prompt(title: &str) -> String {
    format!(
        r#"Provide the response in EXACTLY this JSON format with NO other text:
{{
    "Title": "string",
    "Description": "string",
    "Category": "string"
}}

Title: {title}

Requirements:
- Only output the JSON object
- No additional commentary
- No markdown formatting
- No code blocks
"#
    )
}

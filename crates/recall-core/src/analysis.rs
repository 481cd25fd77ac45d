//! Analysis prompt construction and response parsing

use recall_state::PreferencesAnalysis;

use crate::error::AnalysisError;

const MESSAGE_SEPARATOR: &str = "\n---\n";

/// Build the preference-analysis prompt from user-authored message texts.
///
/// The prompt asks for a bare JSON object with exactly the seven
/// `PreferencesAnalysis` keys.
pub fn build_analysis_prompt(user_messages: &[&str]) -> String {
    let joined = user_messages.join(MESSAGE_SEPARATOR);
    format!(
        r#"Infer the communication preferences of a user from the messages they wrote below.

User messages:
{joined}

Reply with a JSON object containing exactly these keys:
{{
  "preferred_language": "language the user mostly writes in (e.g. English, Ukrainian, Spanish)",
  "formality": "one of: formal, informal, neutral",
  "verbosity": "one of: verbose, concise, balanced",
  "favorite_topics": ["topics", "the", "user", "brings", "up", "often"],
  "technical_level": "one of: beginner, intermediate, expert",
  "humor_preference": "one of: none, occasional, frequent",
  "response_length": "one of: short, medium, long"
}}

Output only the JSON object and nothing else."#
    )
}

/// Remove an optional Markdown code fence around `raw`.
///
/// Handles both ```` ``` ```` and ```` ```json ```` openers (any
/// alphanumeric language tag), with or without a closing fence.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        text = &rest[tag_len..];
        if let Some(rest) = text.trim_end().strip_suffix("```") {
            text = rest;
        }
    }
    text.trim()
}

/// Parse a completion response into a `PreferencesAnalysis`.
///
/// On failure the raw response is kept in the error for diagnosis.
pub fn parse_analysis(raw: &str) -> Result<PreferencesAnalysis, AnalysisError> {
    serde_json::from_str(strip_code_fence(raw)).map_err(|source| AnalysisError::Parse {
        source,
        response: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"preferred_language":"English","formality":"informal","verbosity":"concise","favorite_topics":["rust","chess"],"technical_level":"expert","humor_preference":"occasional","response_length":"short"}"#;

    #[test]
    fn prompt_joins_messages_with_separator() {
        let prompt = build_analysis_prompt(&["first", "second"]);
        assert!(prompt.contains("first\n---\nsecond"));
        for key in [
            "preferred_language",
            "formality",
            "verbosity",
            "favorite_topics",
            "technical_level",
            "humor_preference",
            "response_length",
        ] {
            assert!(prompt.contains(key), "missing {key}");
        }
    }

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
        assert_eq!(strip_code_fence("```JSON{}```"), "{}");
    }

    #[test]
    fn parses_fenced_response() {
        let fenced = format!("```json\n{BODY}\n```");
        let analysis = parse_analysis(&fenced).unwrap();
        assert_eq!(analysis.preferred_language, "English");
        assert_eq!(analysis.favorite_topics, vec!["rust", "chess"]);
    }

    #[test]
    fn parse_error_keeps_raw_response() {
        let err = parse_analysis("Sure! Here is the JSON you asked for").unwrap_err();
        match err {
            AnalysisError::Parse { response, .. } => {
                assert!(response.starts_with("Sure!"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_field_is_parse_error() {
        let err = parse_analysis(r#"{"preferred_language":"English"}"#).unwrap_err();
        assert!(matches!(err, AnalysisError::Parse { .. }));
    }
}

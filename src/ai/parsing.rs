// Reply parsing - model output is accepted only when it deserializes into the
// expected shape and passes validation. Anything else yields `None`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::warn;

/// First `{` through last `}`, newlines included.
static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[\s\S]*\}").unwrap());

pub const MAX_SCORE: u8 = 100;

/// Semantic checks on top of the serde shape.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

pub fn check_score(name: &str, score: u8) -> Result<(), String> {
    if score > MAX_SCORE {
        return Err(format!("{} out of range: {}", name, score));
    }
    Ok(())
}

pub fn check_not_blank(name: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is empty", name));
    }
    Ok(())
}

/// First `{` to last `}` of the text, if any.
pub fn extract_json_object(text: &str) -> Option<&str> {
    JSON_OBJECT.find(text).map(|m| m.as_str())
}

/// Parse the reply directly, then from its embedded JSON object.
pub fn parse_reply<T>(text: &str) -> Option<T>
where
    T: DeserializeOwned + Validate,
{
    if let Some(value) = try_parse(text) {
        return Some(value);
    }
    if let Some(value) = extract_json_object(text).and_then(try_parse) {
        return Some(value);
    }
    warn!(raw = %text, "could not parse model reply");
    None
}

fn try_parse<T>(text: &str) -> Option<T>
where
    T: DeserializeOwned + Validate,
{
    let value: T = serde_json::from_str(text).ok()?;
    match value.validate() {
        Ok(()) => Some(value),
        Err(reason) => {
            warn!(reason = %reason, "model reply failed validation");
            None
        }
    }
}

/// At most `max` characters of `text`.
pub fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Scored {
        score: u8,
        label: String,
    }

    impl Validate for Scored {
        fn validate(&self) -> Result<(), String> {
            check_score("score", self.score)?;
            check_not_blank("label", &self.label)
        }
    }

    #[test]
    fn test_direct_json() {
        let parsed: Option<Scored> = parse_reply(r#"{"score": 80, "label": "ok"}"#);
        assert_eq!(parsed, Some(Scored { score: 80, label: "ok".into() }));
    }

    #[test]
    fn test_embedded_json() {
        let text = "Here you go:\n```json\n{\"score\": 55, \"label\": \"fine\"}\n```";
        let parsed: Option<Scored> = parse_reply(text);
        assert_eq!(parsed.map(|s| s.score), Some(55));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert_eq!(parse_reply::<Scored>(r#"{"score": 101, "label": "x"}"#), None);
        assert_eq!(parse_reply::<Scored>(r#"{"score": 90, "label": " "}"#), None);
        assert_eq!(parse_reply::<Scored>(r#"{"score": "high", "label": "x"}"#), None);
        assert_eq!(parse_reply::<Scored>(r#"{"label": "x"}"#), None);
        assert_eq!(parse_reply::<Scored>("no json at all"), None);
    }

    #[test]
    fn test_extract_spans_lines_first_to_last_brace() {
        let text = "Sure.\n{\"a\": {\"b\": 1}\n}\nDone.";
        assert_eq!(extract_json_object(text), Some("{\"a\": {\"b\": 1}\n}"));
        assert_eq!(extract_json_object("no object here"), None);
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}

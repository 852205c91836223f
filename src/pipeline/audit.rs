//! Auditor response parsing.
//!
//! The audit model is asked for a JSON verdict but, being a language model,
//! it wraps the JSON in prose, drops fields, or returns something else
//! entirely. Parsing is forgiving about the wrapping and strict about the
//! shape: no recognizable scores means no verdict, and the caller records a
//! failed audit instead of crashing the run.

use std::collections::BTreeMap;

use crate::content::AuditRecord;

/// The closed criterion set every script is scored on, 0-10 each.
pub const CRITERIA: &[&str] = &["persona_fit", "naturalness", "brevity", "accuracy", "energy"];

/// Parse raw auditor output into an [`AuditRecord`].
///
/// Accepts a bare JSON object or one embedded in surrounding prose. The
/// object must carry a `scores` map with at least one known criterion;
/// unknown criteria are ignored. Returns `None` when nothing parseable is
/// found — the caller decides what a missing verdict means.
pub fn parse_response(raw: &str, pass_threshold: f64) -> Option<AuditRecord> {
    let json = extract_json_object(raw)?;
    let value: serde_json::Value = serde_json::from_str(json).ok()?;

    let scores_value = value.get("scores")?.as_object()?;
    let mut criteria_scores = BTreeMap::new();
    for criterion in CRITERIA {
        if let Some(score) = scores_value.get(*criterion).and_then(|v| v.as_f64()) {
            criteria_scores.insert(criterion.to_string(), score.clamp(0.0, 10.0));
        }
    }
    if criteria_scores.is_empty() {
        return None;
    }

    let overall_score =
        criteria_scores.values().sum::<f64>() / criteria_scores.len() as f64;

    let issues = value
        .get("issues")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|i| i.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let notes =
        value.get("notes").and_then(|v| v.as_str()).unwrap_or_default().to_string();

    Some(AuditRecord {
        overall_score,
        passed: overall_score >= pass_threshold,
        criteria_scores,
        issues,
        notes,
        raw_response: raw.to_string(),
    })
}

/// The outermost `{...}` span in `raw`, if braces balance.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = r#"{"scores": {"persona_fit": 8, "naturalness": 9, "brevity": 7,
        "accuracy": 8, "energy": 8}, "issues": [], "notes": "solid"}"#;

    #[test]
    fn test_parses_clean_json() {
        let record = parse_response(GOOD, 7.0).unwrap();
        assert_eq!(record.overall_score, 8.0);
        assert!(record.passed);
        assert_eq!(record.criteria_scores.len(), 5);
        assert_eq!(record.notes, "solid");
        assert_eq!(record.raw_response, GOOD);
    }

    #[test]
    fn test_parses_json_wrapped_in_prose() {
        let raw = format!("Here is my assessment:\n{}\nHope that helps!", GOOD);
        let record = parse_response(&raw, 7.0).unwrap();
        assert!(record.passed);
        // Raw response keeps the full wrapping for debugging
        assert!(record.raw_response.contains("Hope that helps"));
    }

    #[test]
    fn test_threshold_decides_pass() {
        let record = parse_response(GOOD, 8.5).unwrap();
        assert!(!record.passed);
        assert_eq!(record.overall_score, 8.0);
    }

    #[test]
    fn test_partial_criteria_average() {
        let raw = r#"{"scores": {"persona_fit": 6, "brevity": 10}}"#;
        let record = parse_response(raw, 7.0).unwrap();
        assert_eq!(record.overall_score, 8.0);
        assert_eq!(record.criteria_scores.len(), 2);
    }

    #[test]
    fn test_unknown_criteria_ignored() {
        let raw = r#"{"scores": {"persona_fit": 9, "vibes": 0}}"#;
        let record = parse_response(raw, 7.0).unwrap();
        assert_eq!(record.criteria_scores.len(), 1);
        assert_eq!(record.overall_score, 9.0);
    }

    #[test]
    fn test_scores_clamped_to_scale() {
        let raw = r#"{"scores": {"persona_fit": 99, "energy": -3}}"#;
        let record = parse_response(raw, 7.0).unwrap();
        assert_eq!(record.criteria_scores["persona_fit"], 10.0);
        assert_eq!(record.criteria_scores["energy"], 0.0);
    }

    #[test]
    fn test_garbage_is_none() {
        assert!(parse_response("I think it's great!", 7.0).is_none());
        assert!(parse_response("", 7.0).is_none());
        assert!(parse_response("{\"scores\": {}}", 7.0).is_none());
        assert!(parse_response("{\"scores\": \"high\"}", 7.0).is_none());
        assert!(parse_response("{not json}", 7.0).is_none());
    }

    #[test]
    fn test_issues_collected() {
        let raw = r#"{"scores": {"brevity": 2}, "issues": ["rambles", "breaks character"]}"#;
        let record = parse_response(raw, 7.0).unwrap();
        assert!(!record.passed);
        assert_eq!(record.issues, vec!["rambles".to_string(), "breaks character".to_string()]);
    }
}

//! Sanitizing model replies.
//!
//! Replies are parsed leniently as untyped JSON and then whitelisted field by field: a model
//! can invent types, overflow confidences or pad summaries, none of which may reach a client.

use serde_json::Value;

use super::{DataPointType, ExtractedDataPoint, ExtractionResult, ReportAnalysis, ScamType};

/// Currency assumed when the reply names none.
pub const DEFAULT_CURRENCY: &str = "MYR";
/// Confidence given to data points the model did not score.
pub const DEFAULT_POINT_CONFIDENCE: u8 = 80;
/// Confidence given to a scam type the model did not score.
pub const DEFAULT_SCAM_TYPE_CONFIDENCE: u8 = 70;

const MAX_SUMMARY_CHARS: usize = 500;
const MAX_KEY_DETAILS: usize = 5;
const MAX_KEY_DETAIL_CHARS: usize = 200;

/// Remove markdown code fences models like to wrap JSON in.
pub fn strip_code_fences(content: &str) -> String {
    content.replace("```json", "").replace("```", "").trim().to_string()
}

/// Parse an extraction reply: `{"dataPoints": [...], "suggestedScamType": "..."}`.
pub fn parse_extraction(content: &str) -> Result<ExtractionResult, serde_json::Error> {
    let parsed: Value = serde_json::from_str(&strip_code_fences(content))?;
    Ok(ExtractionResult {
        data_points: data_points(&parsed),
        suggested_scam_type: scam_type(&parsed["suggestedScamType"]),
        raw_analysis: Some(content.to_string()),
    })
}

/// Parse a report-analysis reply.
pub fn parse_analysis(content: &str) -> Result<ReportAnalysis, serde_json::Error> {
    let parsed: Value = serde_json::from_str(&strip_code_fences(content))?;
    let mut analysis = ReportAnalysis { data_points: data_points(&parsed), ..ReportAnalysis::default() };

    if let Some(scam_type) = scam_type(&parsed["scamType"]) {
        analysis.scam_type = Some(scam_type);
        analysis.scam_type_confidence =
            confidence(&parsed["scamTypeConfidence"], DEFAULT_SCAM_TYPE_CONFIDENCE);
    }
    if let Some(platform) = non_empty_str(&parsed["platform"]) {
        analysis.platform = Some(platform.to_string());
    }
    if let Some(amount) = parsed["amountLost"].as_f64().filter(|a| *a > 0.0) {
        analysis.amount_lost = Some(amount);
    }
    if let Some(currency) = non_empty_str(&parsed["currency"]) {
        analysis.currency = currency.to_uppercase();
    }
    if let Some(summary) = non_empty_str(&parsed["summary"]) {
        analysis.summary = truncate(summary, MAX_SUMMARY_CHARS);
    }
    if let Some(details) = parsed["keyDetails"].as_array() {
        analysis.key_details = details
            .iter()
            .filter_map(Value::as_str)
            .take(MAX_KEY_DETAILS)
            .map(|d| truncate(d, MAX_KEY_DETAIL_CHARS))
            .collect();
    }
    Ok(analysis)
}

fn data_points(parsed: &Value) -> Vec<ExtractedDataPoint> {
    let Some(items) = parsed["dataPoints"].as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let data_type = item["type"].as_str()?.parse::<DataPointType>().ok()?;
            let value = match &item["value"] {
                Value::String(s) if !s.is_empty() => s.trim().to_string(),
                Value::Number(n) if n.as_f64() != Some(0.0) => n.to_string(),
                _ => return None,
            };
            Some(ExtractedDataPoint {
                data_type,
                value,
                confidence: confidence(&item["confidence"], DEFAULT_POINT_CONFIDENCE),
            })
        })
        .collect()
}

fn scam_type(value: &Value) -> Option<ScamType> {
    value.as_str()?.parse().ok()
}

// Zero or missing means "unscored".
fn confidence(value: &Value, default: u8) -> u8 {
    match value.as_f64() {
        Some(c) if c != 0.0 && c.is_finite() => c.clamp(0.0, 100.0).round() as u8,
        _ => default,
    }
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_reply_is_accepted() {
        let reply = "```json\n{\"dataPoints\": [{\"type\": \"phone\", \"value\": \"0123456789\"}]}\n```";
        let result = parse_extraction(reply).unwrap();
        assert_eq!(result.data_points, vec![ExtractedDataPoint::new(DataPointType::Phone, "0123456789", 80)]);
        assert_eq!(result.suggested_scam_type, None);
    }

    #[test]
    fn unknown_types_and_empty_values_are_dropped() {
        let reply = r#"{"dataPoints": [
            {"type": "fax", "value": "123"},
            {"type": "email", "value": ""},
            {"type": "name", "value": "  Ah Seng ", "confidence": 250},
            {"type": "bank_account", "value": 1234567890, "confidence": -4}
        ], "suggestedScamType": "pyramid_scheme"}"#;
        let result = parse_extraction(reply).unwrap();
        assert_eq!(
            result.data_points,
            vec![
                ExtractedDataPoint::new(DataPointType::Name, "Ah Seng", 100),
                ExtractedDataPoint::new(DataPointType::BankAccount, "1234567890", 0),
            ]
        );
        assert_eq!(result.suggested_scam_type, None);
    }

    #[test]
    fn analysis_fields_are_bounded() {
        let long = "x".repeat(900);
        let reply = serde_json::json!({
            "dataPoints": [],
            "scamType": "love_scam",
            "platform": "Facebook",
            "amountLost": -5,
            "currency": "usd",
            "summary": long,
            "keyDetails": ["a", 7, "b", "c", "d", "e", "f", "y".repeat(300)],
        })
        .to_string();
        let analysis = parse_analysis(&reply).unwrap();
        assert_eq!(analysis.scam_type, Some(ScamType::LoveScam));
        assert_eq!(analysis.scam_type_confidence, 70);
        assert_eq!(analysis.platform.as_deref(), Some("Facebook"));
        assert_eq!(analysis.amount_lost, None);
        assert_eq!(analysis.currency, "USD");
        assert_eq!(analysis.summary.chars().count(), 500);
        assert_eq!(analysis.key_details, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn missing_fields_keep_defaults() {
        let analysis = parse_analysis("{}").unwrap();
        assert_eq!(analysis, ReportAnalysis::default());
        assert_eq!(analysis.currency, "MYR");
    }

    #[test]
    fn prose_is_an_error() {
        assert!(parse_extraction("Sure! Here are the results").is_err());
        assert!(parse_analysis("").is_err());
    }
}

//! Deterministic regex heuristics used when the model is unavailable.
//!
//! Tuned for Malaysian identifiers: local and `+60` phone formats, `RM` amounts.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

use super::{DataPointType, ExtractedDataPoint, ExtractionResult, ReportAnalysis, ScamType};

lazy_static! {
    static ref PHONE: Regex =
        Regex::new(r"(?:\+?60|0)[1-9]\d{1,2}[-\s]?\d{3,4}[-\s]?\d{4}").expect("phone pattern");
    static ref EMAIL: Regex =
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("email pattern");
    static ref BANK_ACCOUNT: Regex = Regex::new(r"\b\d{10,16}\b").expect("bank account pattern");
    static ref URL: Regex =
        Regex::new(r#"(?i)https?://[^\s<>"{}|\\^`\[\]]+"#).expect("url pattern");
    static ref TELEGRAM: Regex = Regex::new(r"@[a-zA-Z0-9_]{5,32}").expect("telegram pattern");
    static ref CRYPTO_WALLET: Regex =
        Regex::new(r"\b(0x[a-fA-F0-9]{40}|[13][a-km-zA-HJ-NP-Z1-9]{25,34})\b")
            .expect("crypto wallet pattern");
    static ref RM_AMOUNT: Regex =
        Regex::new(r"(?i)RM\s?(\d{1,3}(?:,?\d{3})*(?:\.\d{2})?)").expect("amount pattern");
}

const PLATFORMS: [&str; 7] =
    ["WhatsApp", "Telegram", "Facebook", "Instagram", "Carousell", "Shopee", "Lazada"];

const SCAM_KEYWORDS: [(&[&str], ScamType, u8); 3] = [
    (&["one piece", "pokemon", "tcg", "card"], ScamType::CollectiblesScam, 75),
    (&["gold", "silver", "emas"], ScamType::PreciousMetalsScam, 75),
    (&["shopee", "lazada", "carousell"], ScamType::EcommerceScam, 70),
];

/// Identifiers found by pattern matching, in the shape the model would return.
pub fn extract(text: &str) -> ExtractionResult {
    let mut points = contact_points(text);
    points.extend(
        TELEGRAM
            .find_iter(text)
            .map(|m| ExtractedDataPoint::new(DataPointType::Telegram, m.as_str(), 75)),
    );
    points.extend(
        CRYPTO_WALLET
            .find_iter(text)
            .map(|m| ExtractedDataPoint::new(DataPointType::CryptoWallet, m.as_str(), 85)),
    );
    ExtractionResult { data_points: dedupe(points), suggested_scam_type: None, raw_analysis: None }
}

/// Report analysis by pattern and keyword matching.
pub fn analyze(text: &str) -> ReportAnalysis {
    let lower = text.to_lowercase();
    let (scam_type, scam_type_confidence) = SCAM_KEYWORDS
        .iter()
        .find(|(keywords, _, _)| keywords.iter().any(|k| lower.contains(k)))
        .map_or((None, 0), |(_, scam_type, confidence)| (Some(*scam_type), *confidence));

    ReportAnalysis {
        data_points: dedupe(contact_points(text)),
        scam_type,
        scam_type_confidence,
        platform: PLATFORMS
            .iter()
            .find(|p| lower.contains(&p.to_lowercase()))
            .map(|p| p.to_string()),
        amount_lost: largest_amount(text),
        ..ReportAnalysis::default()
    }
}

/// Largest `RM` amount mentioned, if positive.
pub fn largest_amount(text: &str) -> Option<f64> {
    RM_AMOUNT
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().replace(',', "").parse::<f64>().ok())
        .fold(None, |max: Option<f64>, a| Some(max.map_or(a, |m| m.max(a))))
        .filter(|a| *a > 0.0)
}

// Phones, emails, bank accounts and URLs: the patterns shared by both heuristics.
fn contact_points(text: &str) -> Vec<ExtractedDataPoint> {
    let phones: Vec<&str> = PHONE.find_iter(text).map(|m| m.as_str()).collect();
    let phone_digits: Vec<String> = phones
        .iter()
        .map(|p| p.chars().filter(|c| *c != '-' && !c.is_whitespace()).collect())
        .collect();

    let mut points: Vec<ExtractedDataPoint> = phones
        .iter()
        .map(|p| ExtractedDataPoint::new(DataPointType::Phone, p.trim(), 85))
        .collect();
    points.extend(
        EMAIL
            .find_iter(text)
            .map(|m| ExtractedDataPoint::new(DataPointType::Email, m.as_str().to_lowercase(), 90)),
    );
    points.extend(
        BANK_ACCOUNT
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|account| !phone_digits.iter().any(|p| p.contains(account)))
            .map(|account| ExtractedDataPoint::new(DataPointType::BankAccount, account, 70)),
    );
    points.extend(
        URL.find_iter(text).map(|m| ExtractedDataPoint::new(DataPointType::Website, m.as_str(), 90)),
    );
    points
}

fn dedupe(points: Vec<ExtractedDataPoint>) -> Vec<ExtractedDataPoint> {
    let mut seen = HashSet::new();
    points.into_iter().filter(|p| seen.insert((p.data_type, p.value.clone()))).collect()
}

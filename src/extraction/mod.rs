//! Structured extraction of scam identifiers from free text.
//!
//! The metered `extract` and `analyze-report` actions are backed by a language model
//! ([`TextAnalyzer`]) that may be slow, down, or not configured at all. [`Extractor`] wraps it
//! so callers always get a well-formed result: model replies are sanitized, and any failure
//! falls back to the regex heuristics in [`fallback`]. Upstream faults are logged, never
//! surfaced to the client.
//!
//! ```rust
//! use scamguard_gate::extraction::{DataPointType, Extractor};
//!
//! # tokio_test();
//! # fn tokio_test() {
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let extractor = Extractor::unconfigured();
//! let result = extractor.extract("Seller phone 012-345 6789, paid to scam@mail.com").await.unwrap();
//! assert_eq!(result.data_points[0].data_type, DataPointType::Phone);
//! # });
//! # }
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod fallback;
pub mod normalize;
pub mod reply;

/// Minimum characters accepted by [`Extractor::extract`].
pub const EXTRACT_MIN_CHARS: usize = 10;
/// Maximum characters accepted by [`Extractor::extract`].
pub const EXTRACT_MAX_CHARS: usize = 10_000;
/// Minimum characters accepted by [`Extractor::analyze_report`].
pub const ANALYZE_MIN_CHARS: usize = 20;
/// Maximum characters accepted by [`Extractor::analyze_report`].
pub const ANALYZE_MAX_CHARS: usize = 15_000;

const EXTRACT_MODEL_CHARS: usize = 4_000;
const ANALYZE_MODEL_CHARS: usize = 5_000;

/// Kinds of identifiers that can be reported and searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataPointType {
    /// Phone number.
    Phone,
    /// Email address.
    Email,
    /// Bank account number.
    BankAccount,
    /// WhatsApp number.
    Whatsapp,
    /// Telegram username.
    Telegram,
    /// E-wallet account.
    Ewallet,
    /// Social media profile.
    SocialMedia,
    /// Website or URL.
    Website,
    /// Crypto wallet address.
    CryptoWallet,
    /// Name or alias.
    Name,
    /// Company or business name.
    Company,
}

impl DataPointType {
    /// Every type, in display order.
    pub const ALL: [DataPointType; 11] = [
        DataPointType::Phone,
        DataPointType::Email,
        DataPointType::BankAccount,
        DataPointType::Whatsapp,
        DataPointType::Telegram,
        DataPointType::Ewallet,
        DataPointType::SocialMedia,
        DataPointType::Website,
        DataPointType::CryptoWallet,
        DataPointType::Name,
        DataPointType::Company,
    ];

    /// Wire name (`bank_account`, `crypto_wallet`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            DataPointType::Phone => "phone",
            DataPointType::Email => "email",
            DataPointType::BankAccount => "bank_account",
            DataPointType::Whatsapp => "whatsapp",
            DataPointType::Telegram => "telegram",
            DataPointType::Ewallet => "ewallet",
            DataPointType::SocialMedia => "social_media",
            DataPointType::Website => "website",
            DataPointType::CryptoWallet => "crypto_wallet",
            DataPointType::Name => "name",
            DataPointType::Company => "company",
        }
    }
}

impl FromStr for DataPointType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|t| t.as_str() == s).ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

impl fmt::Display for DataPointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scam categories a report can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScamType {
    /// TCG cards, figurines and other collectibles.
    CollectiblesScam,
    /// Gold, silver and other precious metals.
    PreciousMetalsScam,
    /// Online shopping fraud.
    EcommerceScam,
    /// Phone impersonation of police, bank or court officials.
    MacauScam,
    /// Romance and dating scams.
    LoveScam,
    /// Forex, crypto and investment schemes.
    InvestmentScam,
    /// Fake delivery or customs fees.
    ParcelScam,
    /// Fake job offers.
    JobScam,
    /// Illegal loan schemes.
    LoanScam,
    /// Money mule recruitment.
    MuleRecruitment,
    /// Fake websites or emails.
    Phishing,
    /// Anything else.
    Other,
}

impl ScamType {
    /// Every category.
    pub const ALL: [ScamType; 12] = [
        ScamType::CollectiblesScam,
        ScamType::PreciousMetalsScam,
        ScamType::EcommerceScam,
        ScamType::MacauScam,
        ScamType::LoveScam,
        ScamType::InvestmentScam,
        ScamType::ParcelScam,
        ScamType::JobScam,
        ScamType::LoanScam,
        ScamType::MuleRecruitment,
        ScamType::Phishing,
        ScamType::Other,
    ];

    /// Wire name (`collectibles_scam`, `phishing`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            ScamType::CollectiblesScam => "collectibles_scam",
            ScamType::PreciousMetalsScam => "precious_metals_scam",
            ScamType::EcommerceScam => "ecommerce_scam",
            ScamType::MacauScam => "macau_scam",
            ScamType::LoveScam => "love_scam",
            ScamType::InvestmentScam => "investment_scam",
            ScamType::ParcelScam => "parcel_scam",
            ScamType::JobScam => "job_scam",
            ScamType::LoanScam => "loan_scam",
            ScamType::MuleRecruitment => "mule_recruitment",
            ScamType::Phishing => "phishing",
            ScamType::Other => "other",
        }
    }
}

impl FromStr for ScamType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|t| t.as_str() == s).ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

impl fmt::Display for ScamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A name that matches no known data-point type or scam type.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown variant `{0}`")]
pub struct UnknownVariant(pub String);

/// One identifier found in the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDataPoint {
    /// Identifier kind.
    #[serde(rename = "type")]
    pub data_type: DataPointType,
    /// Identifier as written (trimmed; emails lower-cased by the fallback).
    pub value: String,
    /// Confidence, 0..=100.
    pub confidence: u8,
}

impl ExtractedDataPoint {
    /// Data point with the given confidence.
    pub fn new(data_type: DataPointType, value: impl Into<String>, confidence: u8) -> Self {
        Self { data_type, value: value.into(), confidence }
    }
}

/// Output of [`Extractor::extract`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    /// Identifiers found, de-duplicated by (type, value).
    pub data_points: Vec<ExtractedDataPoint>,
    /// Most likely scam category, if one was suggested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_scam_type: Option<ScamType>,
    /// Raw model reply, when the model produced the result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_analysis: Option<String>,
}

/// Output of [`Extractor::analyze_report`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAnalysis {
    /// Identifiers found.
    pub data_points: Vec<ExtractedDataPoint>,
    /// Scam category, when recognized.
    pub scam_type: Option<ScamType>,
    /// Confidence in `scam_type`, 0 when absent.
    pub scam_type_confidence: u8,
    /// Platform where the scam happened.
    pub platform: Option<String>,
    /// Amount lost, always positive when present.
    pub amount_lost: Option<f64>,
    /// Upper-case currency code.
    pub currency: String,
    /// Short factual summary.
    pub summary: String,
    /// A handful of notable facts.
    pub key_details: Vec<String>,
}

impl Default for ReportAnalysis {
    fn default() -> Self {
        Self {
            data_points: Vec::new(),
            scam_type: None,
            scam_type_confidence: 0,
            platform: None,
            amount_lost: None,
            currency: reply::DEFAULT_CURRENCY.to_string(),
            summary: String::new(),
            key_details: Vec::new(),
        }
    }
}

/// Errors from the language-model collaborator. Never shown to clients.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnalyzerError {
    /// No credentials or endpoint configured.
    #[error("text analyzer is not configured")]
    Unconfigured,
    /// Upstream answered with a non-success status.
    #[error("text analyzer returned status {0}")]
    Status(u16),
    /// Upstream answered without content.
    #[error("text analyzer returned an empty reply")]
    EmptyReply,
    /// Network or protocol failure.
    #[error("text analyzer transport error: {0}")]
    Transport(String),
    /// Reply was not the expected JSON document.
    #[error("text analyzer reply is malformed: {0}")]
    Malformed(String),
}

/// Input rejected before any work is done.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExtractionError {
    /// Text shorter than the operation accepts.
    #[error("text too short: {actual} characters, at least {min} required")]
    TooShort {
        /// Minimum accepted.
        min: usize,
        /// Characters received.
        actual: usize,
    },
    /// Text longer than the operation accepts.
    #[error("text too long: {actual} characters, at most {max} allowed")]
    TooLong {
        /// Maximum accepted.
        max: usize,
        /// Characters received.
        actual: usize,
    },
}

/// Language-model collaborator. Implementations return the model's raw reply text; parsing
/// and sanitizing happen in [`Extractor`].
#[async_trait]
pub trait TextAnalyzer: Send + Sync + fmt::Debug {
    /// Ask for the identifiers in `text` (see [`reply::parse_extraction`] for the shape).
    async fn extract(&self, text: &str) -> Result<String, AnalyzerError>;

    /// Ask for a full report analysis of `text` (see [`reply::parse_analysis`]).
    async fn analyze_report(&self, text: &str) -> Result<String, AnalyzerError>;
}

/// Model-backed extraction with a deterministic regex fallback.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    analyzer: Option<Arc<dyn TextAnalyzer>>,
}

impl Extractor {
    /// Extractor asking `analyzer` first.
    pub fn new<A: TextAnalyzer + 'static>(analyzer: A) -> Self {
        Self { analyzer: Some(Arc::new(analyzer)) }
    }

    /// Extractor that always uses the regex heuristics.
    pub fn unconfigured() -> Self {
        Self { analyzer: None }
    }

    /// Whether a model is configured.
    pub fn has_analyzer(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Pull identifiers out of `text` (10..=10 000 characters).
    pub async fn extract(&self, text: &str) -> Result<ExtractionResult, ExtractionError> {
        check_length(text, EXTRACT_MIN_CHARS, EXTRACT_MAX_CHARS)?;
        let reply = match &self.analyzer {
            Some(analyzer) => analyzer.extract(&truncate_chars(text, EXTRACT_MODEL_CHARS)).await,
            None => Err(AnalyzerError::Unconfigured),
        };
        let parsed = reply.and_then(|content| {
            reply::parse_extraction(&content).map_err(|e| AnalyzerError::Malformed(e.to_string()))
        });
        Ok(parsed.unwrap_or_else(|e| {
            log_fallback("extract", &e);
            fallback::extract(text)
        }))
    }

    /// Analyze a scam narrative (20..=15 000 characters).
    pub async fn analyze_report(&self, text: &str) -> Result<ReportAnalysis, ExtractionError> {
        check_length(text, ANALYZE_MIN_CHARS, ANALYZE_MAX_CHARS)?;
        let reply = match &self.analyzer {
            Some(analyzer) => {
                analyzer.analyze_report(&truncate_chars(text, ANALYZE_MODEL_CHARS)).await
            }
            None => Err(AnalyzerError::Unconfigured),
        };
        let parsed = reply.and_then(|content| {
            reply::parse_analysis(&content).map_err(|e| AnalyzerError::Malformed(e.to_string()))
        });
        Ok(parsed.unwrap_or_else(|e| {
            log_fallback("analyze_report", &e);
            fallback::analyze(text)
        }))
    }
}

fn log_fallback(operation: &'static str, error: &AnalyzerError) {
    match error {
        AnalyzerError::Unconfigured => {
            tracing::debug!(operation, "text analyzer not configured; using regex fallback")
        }
        _ => tracing::warn!(operation, error = %error, "text analyzer failed; using regex fallback"),
    }
}

fn check_length(text: &str, min: usize, max: usize) -> Result<(), ExtractionError> {
    let actual = text.chars().count();
    if actual < min {
        return Err(ExtractionError::TooShort { min, actual });
    }
    if actual > max {
        return Err(ExtractionError::TooLong { max, actual });
    }
    Ok(())
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

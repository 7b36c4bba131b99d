//! Canonical forms for matching reported identifiers, and masks for display.

use super::DataPointType;

/// Digits only, with Malaysian local numbers (`0…`) rewritten to the `60…` country form.
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix('0') {
        Some(local) => format!("60{}", local),
        None => digits,
    }
}

/// Bank account without spaces or dashes.
pub fn normalize_bank_account(account: &str) -> String {
    account.chars().filter(|c| *c != '-' && !c.is_whitespace()).collect()
}

/// Lower-cased, trimmed, inner whitespace collapsed to single spaces.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical form of `value` for exact-match lookups.
pub fn normalize_data_point(data_type: DataPointType, value: &str) -> String {
    match data_type {
        DataPointType::Phone | DataPointType::Whatsapp => normalize_phone(value),
        DataPointType::BankAccount => normalize_bank_account(value),
        DataPointType::Name | DataPointType::Company => normalize_name(value),
        _ => value.trim().to_lowercase(),
    }
}

/// `+60 1X-XXX XXXX` for mobile numbers, `+60…` for other Malaysian numbers, else unchanged.
pub fn format_phone_display(phone: &str) -> String {
    let normalized = normalize_phone(phone);
    if matches!(normalized.len(), 11 | 12) && normalized.starts_with("601") {
        return format!("+60 {}-{} {}", &normalized[2..4], &normalized[4..7], &normalized[7..]);
    }
    if normalized.starts_with("60") {
        return format!("+{}", normalized);
    }
    phone.to_string()
}

/// Partially hidden form of `value` safe to show other users.
pub fn mask_value(data_type: DataPointType, value: &str) -> String {
    match data_type {
        DataPointType::Phone | DataPointType::Whatsapp => {
            let normalized = normalize_phone(value);
            if normalized.len() >= 8 {
                format!("{}****{}", &normalized[..4], &normalized[normalized.len() - 4..])
            } else {
                format!("****{}", &normalized[normalized.len().saturating_sub(4)..])
            }
        }
        DataPointType::Email => {
            let mut parts = value.split('@');
            match (parts.next(), parts.next()) {
                (Some(local), Some(domain)) if !local.is_empty() && !domain.is_empty() => {
                    format!("{}***@{}", take_chars(local, 2), domain)
                }
                _ => "***@***".to_string(),
            }
        }
        DataPointType::BankAccount => {
            let normalized = normalize_bank_account(value);
            let len = normalized.chars().count();
            if len >= 8 {
                format!("****{}", normalized.chars().skip(len - 4).collect::<String>())
            } else {
                "****".to_string()
            }
        }
        DataPointType::Name | DataPointType::Company => value
            .split(' ')
            .map(|word| format!("{}***", take_chars(word, 1)))
            .collect::<Vec<_>>()
            .join(" "),
        _ => {
            if value.chars().count() > 8 {
                format!("{}****", take_chars(value, 4))
            } else {
                "****".to_string()
            }
        }
    }
}

fn take_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

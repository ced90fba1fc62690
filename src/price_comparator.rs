//! Price string parsing and comparison.
//!
//! Prices arrive as display strings ("$1,299.99", "1.299,00 €", "£ 12"). They
//! are only ever compared numerically: two strings that parse to the same
//! amount are the same price.

use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;

use crate::models::ChangeType;

// Space-grouped thousands first ("1 299,99"), then plain runs of digits and
// separators, then a bare cent amount (".99")
const AMOUNT: &str = r"\d{1,3}(?:[ \x{00A0}\x{202F}']\d{3})+(?:[.,]\d+)?|\d[\d.,]*\d|\d|[.,]\d+";
const CURRENCY: &str = r"[$€£¥₹₩₽¢]|\b(?:USD|EUR|GBP|JPY|CAD|AUD|CHF|INR|SEK|NOK|DKK|PLN|CZK|kr|zł)\b";

fn amount_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(AMOUNT).expect("amount regex is valid"))
}

/// An amount directly before or after a currency marker.
fn currency_amount_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?:{CURRENCY})\s*({AMOUNT})|({AMOUNT})\s*(?:{CURRENCY})"))
            .expect("currency amount regex is valid")
    })
}

fn locate_amount(text: &str) -> Option<regex::Match<'_>> {
    if let Some(caps) = currency_amount_regex().captures(text) {
        if let Some(amount) = caps.get(1).or_else(|| caps.get(2)) {
            return Some(amount);
        }
    }
    amount_regex().find(text)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceChange {
    pub change_type: ChangeType,
    pub old_amount: Option<Decimal>,
    pub new_amount: Option<Decimal>,
    pub difference: Option<Decimal>,
    pub percent_change: Option<f64>,
}

impl PriceChange {
    pub fn is_drop(&self) -> bool {
        self.change_type == ChangeType::Decreased
    }

    /// Human readable difference, e.g. `-5.00 (-20.0%)`.
    pub fn describe(&self) -> String {
        match (self.difference, self.percent_change) {
            (Some(diff), Some(pct)) => format!("{:+} ({:+.1}%)", diff, pct),
            (Some(diff), None) => format!("{:+}", diff),
            _ => "n/a".to_string(),
        }
    }
}

/// Parse a displayed price into an amount, ignoring currency symbols and
/// normalizing thousands/decimal separators. An amount next to a currency
/// marker wins over other numbers in the text. Returns `None` when the text
/// carries no digits.
pub fn parse_price(text: &str) -> Option<Decimal> {
    let amount = locate_amount(text)?;
    let compact: String = amount
        .as_str()
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{00A0}' | '\u{202F}' | '\''))
        .collect();

    // "1.299,-" and "12.-" are whole amounts: every separator before the dash groups thousands
    let rest = &text[amount.end()..];
    let whole = rest.starts_with(",-") || rest.starts_with(".-");

    let normalized = if whole {
        compact.replace(['.', ','], "")
    } else {
        normalize_separators(&compact)
    };
    let normalized = if normalized.starts_with('.') {
        format!("0{}", normalized)
    } else {
        normalized
    };
    Decimal::from_str(&normalized).ok().map(|d| d.normalize())
}

fn normalize_separators(s: &str) -> String {
    let last_dot = s.rfind('.');
    let last_comma = s.rfind(',');

    match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => {
            // Whichever comes last is the decimal separator
            let (decimal, thousands) = if dot > comma { ('.', ',') } else { (',', '.') };
            s.chars()
                .filter(|c| *c != thousands)
                .map(|c| if c == decimal { '.' } else { c })
                .collect()
        }
        (None, Some(sep)) => normalize_single(s, ',', sep),
        (Some(sep), None) => normalize_single(s, '.', sep),
        (None, None) => s.to_string(),
    }
}

/// Only one kind of separator present. A single one followed by exactly three
/// digits groups thousands, unless the integer part is empty or zero ("0.125").
fn normalize_single(s: &str, separator: char, last: usize) -> String {
    let count = s.matches(separator).count();
    let integer = &s[..last];
    let decimals = s.len() - last - 1;
    let grouping = count > 1 || (decimals == 3 && !integer.is_empty() && integer != "0");

    if grouping {
        s.replace(separator, "")
    } else {
        s.replace(separator, ".")
    }
}

/// Whether `new` should be recorded after `old`. Falls back to a trimmed
/// string comparison when either side is not a number.
pub fn prices_differ(old: &str, new: &str) -> bool {
    match (parse_price(old), parse_price(new)) {
        (Some(a), Some(b)) => a != b,
        _ => old.trim() != new.trim(),
    }
}

pub fn is_price_drop(old: &str, new: &str) -> bool {
    matches!((parse_price(old), parse_price(new)), (Some(a), Some(b)) if b < a)
}

pub fn compare(old: &str, new: &str) -> PriceChange {
    let old_amount = parse_price(old);
    let new_amount = parse_price(new);

    let (old_value, new_value) = match (old_amount, new_amount) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return PriceChange {
                change_type: ChangeType::Unchanged,
                old_amount,
                new_amount,
                difference: None,
                percent_change: None,
            };
        }
    };

    let change_type = if new_value > old_value {
        ChangeType::Increased
    } else if new_value < old_value {
        ChangeType::Decreased
    } else {
        ChangeType::Unchanged
    };

    let difference = new_value - old_value;
    let percent_change = if !old_value.is_zero() {
        (difference / old_value * Decimal::from(100)).to_f64()
    } else {
        None
    };

    PriceChange {
        change_type,
        old_amount,
        new_amount,
        difference: Some(difference),
        percent_change,
    }
}

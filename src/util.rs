use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static AMOUNT_PATTERN: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^(?:\d+|\d{1,3}(?:,\d{3})+)$").expect("valid regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
  #[error("amount must be a whole number like 1000 or 1,000")]
  InvalidFormat,
  #[error("amount exceeds supported range")]
  OutOfRange,
}

/// Parses a whole-unit amount, accepting thousands separators.
pub fn parse_amount(input: &str) -> Result<i64, MoneyError> {
  let trimmed = input.trim();
  if !AMOUNT_PATTERN.is_match(trimmed) {
    return Err(MoneyError::InvalidFormat);
  }
  trimmed
    .replace(',', "")
    .parse::<i64>()
    .map_err(|_| MoneyError::OutOfRange)
}

pub fn format_amount(amount: i64, currency: &str) -> String {
  let digits = amount.unsigned_abs().to_string();
  let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
  for (index, ch) in digits.chars().enumerate() {
    if index > 0 && (digits.len() - index) % 3 == 0 {
      grouped.push(',');
    }
    grouped.push(ch);
  }
  let sign = if amount < 0 { "-" } else { "" };
  format!("{currency} {sign}{grouped}")
}

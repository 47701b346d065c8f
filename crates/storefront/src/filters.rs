//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// Formats a point count with thousands separators.
///
/// Usage in templates: `{{ balance|points }}` renders `12,345 點`.
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn points(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(format!("{} 點", group_digits(&value.to_string())))
}

fn group_digits(value: &str) -> String {
    let (sign, digits) = value
        .strip_prefix('-')
        .map_or(("", value), |rest| ("-", rest));
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return value.to_string();
    }
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    out.push_str(sign);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

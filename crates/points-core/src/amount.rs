//! Localized currency amount parsing.

use crate::Points;
use tracing::debug;

/// Normalize a localized amount such as `"3,986,400 원"` into points.
///
/// Everything except digits and commas is stripped, thousands separators are
/// removed and the rest is parsed. Empty, non-numeric or overflowing input
/// yields 0; this never fails. Every reader of a raw contract amount goes
/// through here so totals agree across aggregators.
pub fn parse_amount(raw: Option<&str>) -> Points {
    let Some(raw) = raw else {
        return 0;
    };
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return 0;
    }
    match digits.parse::<Points>() {
        Ok(n) => n,
        Err(e) => {
            debug!(raw, error = %e, "amount does not fit in points; treating as 0");
            0
        }
    }
}

/// Render points the way the contract sheet writes them: `"3,986,400 원"`.
pub fn format_amount(points: Points) -> String {
    let digits = points.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out.push_str(" 원");
    out
}

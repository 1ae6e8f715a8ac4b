//! Unit-code extraction from free-text unit fields.
//!
//! A unit field usually reads like `"A2: Structure of Matter"`; the code is
//! the leading `A<digits>` token and the title is whatever remains. Extraction
//! is total: malformed input degrades to a codeless title, never an error.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::MapError;

static LEADING_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^A(\d+)\s*:?\s*(.*)$").expect("leading unit-code pattern"));
static EMBEDDED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*A(\d+)\s*:?\s*").expect("embedded unit-code pattern"));

/// Short unit identifier (`A0`, `A2`, `A10`, ...). Ordering follows the
/// embedded number, so `A10` sorts after `A9`, not before `A2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitCode(pub u32);

impl UnitCode {
    pub fn number(self) -> u32 {
        self.0
    }
}

impl fmt::Display for UnitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}

impl FromStr for UnitCode {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .strip_prefix('A')
            .and_then(|digits| digits.parse::<u32>().ok())
            .map(UnitCode)
            .ok_or_else(|| MapError::InvalidParameter(format!("not a unit code: `{s}`")))
    }
}

fn code_from_digits(digits: &str, code_range: Option<(u32, u32)>) -> Option<UnitCode> {
    let number: u32 = digits.parse().ok()?;
    if let Some((lo, hi)) = code_range {
        if number < lo || number > hi {
            return None;
        }
    }
    Some(UnitCode(number))
}

/// Split a free-text unit field into `(code, title)`.
///
/// A leading code (with optional `:` separator) yields the trimmed remainder
/// as the title. A code embedded elsewhere is extracted and removed from the
/// title. When nothing matches, or the code falls outside `code_range`, the
/// result is `(None, trimmed_input)`.
pub fn split_unit_field(raw: &str, code_range: Option<(u32, u32)>) -> (Option<UnitCode>, String) {
    let trimmed = raw.trim();
    if let Some(caps) = LEADING_CODE.captures(trimmed) {
        if let Some(code) = code_from_digits(&caps[1], code_range) {
            let title = caps.get(2).map_or("", |m| m.as_str()).trim();
            return (Some(code), title.to_string());
        }
    }
    for caps in EMBEDDED_CODE.captures_iter(trimmed) {
        if let Some(code) = code_from_digits(&caps[1], code_range) {
            let matched = caps.get(0).expect("whole match");
            let mut title = String::with_capacity(trimmed.len());
            title.push_str(&trimmed[..matched.start()]);
            title.push(' ');
            title.push_str(&trimmed[matched.end()..]);
            let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
            return (Some(code), title);
        }
    }
    (None, trimmed.to_string())
}

/// Column ordering for pivot tables: codes numerically, the codeless bucket last.
pub fn column_order(a: &Option<UnitCode>, b: &Option<UnitCode>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_code_with_separator() {
        let (code, title) = split_unit_field("A2: Structure of Matter", None);
        assert_eq!(code, Some(UnitCode(2)));
        assert_eq!(title, "Structure of Matter");
    }

    #[test]
    fn test_leading_code_without_separator() {
        let (code, title) = split_unit_field("  A3 Waves  ", None);
        assert_eq!(code, Some(UnitCode(3)));
        assert_eq!(title, "Waves");
    }

    #[test]
    fn test_bare_code_has_empty_title() {
        let (code, title) = split_unit_field("A0", None);
        assert_eq!(code, Some(UnitCode(0)));
        assert_eq!(title, "");
    }

    #[test]
    fn test_embedded_code_removed_from_title() {
        let (code, title) = split_unit_field("Unit A4: Ecosystems", None);
        assert_eq!(code, Some(UnitCode(4)));
        assert_eq!(title, "Unit Ecosystems");
    }

    #[test]
    fn test_no_code_returns_trimmed_original() {
        let (code, title) = split_unit_field("  Energy and Motion  ", None);
        assert_eq!(code, None);
        assert_eq!(title, "Energy and Motion");
    }

    #[test]
    fn test_lowercase_prefix_is_not_a_code() {
        let (code, title) = split_unit_field("a2: Structure", None);
        assert_eq!(code, None);
        assert_eq!(title, "a2: Structure");
    }

    #[test]
    fn test_overflowing_digits_degrade_to_no_code() {
        let (code, title) = split_unit_field("A99999999999: Big", None);
        assert_eq!(code, None);
        assert_eq!(title, "A99999999999: Big");
    }

    #[test]
    fn test_code_range_rejects_out_of_range() {
        let (code, title) = split_unit_field("A9: Beyond", Some((0, 6)));
        assert_eq!(code, None);
        assert_eq!(title, "A9: Beyond");

        let (code, _) = split_unit_field("A6: Edge", Some((0, 6)));
        assert_eq!(code, Some(UnitCode(6)));
    }

    #[test]
    fn test_numeric_ordering() {
        let mut codes = vec![UnitCode(10), UnitCode(2), UnitCode(1)];
        codes.sort();
        assert_eq!(codes, vec![UnitCode(1), UnitCode(2), UnitCode(10)]);
    }

    #[test]
    fn test_codeless_column_sorts_last() {
        let mut columns = vec![None, Some(UnitCode(2)), Some(UnitCode(1))];
        columns.sort_by(column_order);
        assert_eq!(columns, vec![Some(UnitCode(1)), Some(UnitCode(2)), None]);
    }

    #[test]
    fn test_display_and_parse_round_trip() {
        let code: UnitCode = "A10".parse().expect("parse");
        assert_eq!(code, UnitCode(10));
        assert_eq!(code.to_string(), "A10");
        assert!("unit".parse::<UnitCode>().is_err());
    }
}

//! Survey form rules that live outside the store.

use std::ops::RangeInclusive;

pub const DEPARTMENTS: [&str; 7] = [
    "Administration",
    "Customer Invoicing",
    "Finance & Accounting",
    "Commercial Reporting & BI",
    "Information Technology",
    "OVA",
    "Documentation, Pricing & Legal",
];

pub const RATING_RANGE: RangeInclusive<i64> = 0..=10;

pub const STRESS_QUESTIONS: [&str; 3] = [
    "How intense do you find your daily workload? (0 = very light, 10 = too heavy)",
    "To what extent do work-related issues cause you anxiety? (0 = not at all, 10 = to a very great extent)",
    "How exhausted do you feel due to your work? (0 = not exhausted at all, 10 = extremely exhausted)",
];

pub const MOTIVATION_QUESTIONS: [&str; 3] = [
    "Rate your motivation to perform daily work tasks. (0 = not motivated at all, 10 = extremely motivated)",
    "How inspired do you feel at work? (0 = not inspired at all, 10 = extremely inspired)",
    "Rate how valued you feel for the work you do. (0 = not valued at all, 10 = extremely valued)",
];

/// Matches a department name case-insensitively and returns its canonical
/// spelling.
pub fn find_department(name: &str) -> Option<&'static str> {
    let name = name.trim();
    DEPARTMENTS
        .iter()
        .copied()
        .find(|d| d.eq_ignore_ascii_case(name))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_department() {
        assert_eq!(find_department("ova"), Some("OVA"));
        assert_eq!(find_department(" finance & accounting "), Some("Finance & Accounting"));
        assert_eq!(find_department("Select department"), None);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(14.0 / 3.0), 4.67);
        assert_eq!(round2(5.0), 5.0);
    }
}

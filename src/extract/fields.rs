//! Classification of summary detail lines.
//!
//! Every line is tested against an ordered family of label patterns; the first
//! label that matches decides the field. The value is then resolved in three
//! tiers: the text after `label:`, else the first number- or date-shaped
//! substring, else the line with the label removed.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ApprovedMedicalLeave,
    ApprovedDutyLeave,
    CombinedLeave,
    Teacher,
    SessionRange,
    Delivered,
    Attended,
    Absent,
    Percentage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Text,
    Count,
    Decimal,
    DateRange,
    LeavePair,
}

/// Which fallback produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Colon,
    Shape,
    Remainder,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Count(u32),
    Percent(f64),
    Dates(Option<NaiveDate>, Option<NaiveDate>),
    Pair(u32, u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub field: Field,
    pub tier: Tier,
    pub value: FieldValue,
}

struct FieldPattern {
    field: Field,
    shape: Shape,
    label: Regex,
    anchored: Regex,
}

fn pattern(field: Field, shape: Shape, labels: &str) -> FieldPattern {
    let label = Regex::new(&format!(r"(?i)\b(?:{labels})")).expect("label pattern compiles");
    let anchored = Regex::new(&format!(r"(?i)\b(?:{labels})[\s)\].%]*:\s*(?P<value>.*)$"))
        .expect("anchored label pattern compiles");
    FieldPattern {
        field,
        shape,
        label,
        anchored,
    }
}

// Order matters: the approved-leave labels contain the bare leave names, the
// teacher line may carry arbitrary text, and "total lectures" is a prefix of
// the attended and absent labels, as "attended" is of "attended %".
static PATTERNS: Lazy<Vec<FieldPattern>> = Lazy::new(|| {
    vec![
        pattern(
            Field::ApprovedMedicalLeave,
            Shape::Count,
            r"approved\s+(?:ml|medical(?:\s+leaves?)?)\b|(?:ml|medical\s+leaves?)\s+approved",
        ),
        pattern(
            Field::ApprovedDutyLeave,
            Shape::Count,
            r"approved\s+(?:dl|duty(?:\s+leaves?)?)\b|(?:dl|duty\s+leaves?)\s+approved",
        ),
        pattern(
            Field::CombinedLeave,
            Shape::LeavePair,
            r"leaves?\s*\(\s*dl\s*/\s*ml\s*\)|dl\s*/\s*ml|duty\s+leaves?\s*/\s*medical\s+leaves?",
        ),
        pattern(
            Field::Teacher,
            Shape::Text,
            r"teacher(?:'?s)?(?:\s+name)?|faculty(?:\s+name)?|instructor",
        ),
        pattern(
            Field::SessionRange,
            Shape::DateRange,
            r"duration|session(?:\s+dates?)?|term\s+dates?|date\s+range",
        ),
        pattern(
            Field::Percentage,
            Shape::Decimal,
            r"percentage|(?:attended|attendance)\s*\(?\s*(?:%|percent)|att\.?\s*%",
        ),
        pattern(
            Field::Attended,
            Shape::Count,
            r"(?:lectures?\s+|classes\s+)?attended|present\b",
        ),
        pattern(Field::Absent, Shape::Count, r"absent\b|absences"),
        pattern(
            Field::Delivered,
            Shape::Count,
            r"(?:lectures?\s+|classes\s+)?delivered|total\s+(?:lectures|classes)|(?:lectures?|classes)\s+held",
        ),
    ]
});

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("number pattern"));
static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("integer pattern"));
static PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?P<first>\d+)\s*/\s*(?P<second>\d+)").expect("pair pattern"));
static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\d{4}-\d{1,2}-\d{1,2}|\d{1,2}[/.\-]\d{1,2}[/.\-]\d{2,4}|\d{1,2}[\s\-][A-Za-z]{3,9}[\s\-,]+\d{4}",
    )
    .expect("date pattern")
});

const DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d", "%d/%m/%y", "%d %b %Y", "%d %B %Y",
];

/// Parse a date in any of the spellings the portal has been seen to use.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = raw.trim().replace(',', " ");
    let spaced = cleaned
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(&cleaned, fmt)
            .or_else(|_| NaiveDate::parse_from_str(&spaced, fmt))
            .ok()
    })
}

/// Classify one normalized detail line; `None` when no label matches or the
/// matched field carries no usable value.
pub fn classify(line: &str) -> Option<Classified> {
    let pattern = PATTERNS.iter().find(|p| p.label.is_match(line))?;
    let (tier, raw) = resolve(pattern, line)?;
    let value = convert(pattern.shape, &raw)?;
    Some(Classified {
        field: pattern.field,
        tier,
        value,
    })
}

fn resolve(pattern: &FieldPattern, line: &str) -> Option<(Tier, String)> {
    if let Some(caps) = pattern.anchored.captures(line) {
        let value = caps.name("value").map(|m| m.as_str().trim()).unwrap_or("");
        if !value.is_empty() {
            return Some((Tier::Colon, value.to_string()));
        }
    }

    let shaped = match pattern.shape {
        Shape::Text => None,
        Shape::Count | Shape::Decimal => NUMBER.find(line).map(|m| m.as_str().to_string()),
        Shape::LeavePair => PAIR.find(line).map(|m| m.as_str().to_string()),
        Shape::DateRange => {
            let dates: Vec<&str> = DATE.find_iter(line).map(|m| m.as_str()).collect();
            (!dates.is_empty()).then(|| dates.join(" to "))
        }
    };
    if let Some(value) = shaped {
        return Some((Tier::Shape, value));
    }

    let remainder = pattern.label.replace(line, "");
    let remainder = remainder
        .trim()
        .trim_matches(|c: char| c == ':' || c == '-' || c == '|' || c.is_whitespace());
    (!remainder.is_empty()).then(|| (Tier::Remainder, remainder.to_string()))
}

fn convert(shape: Shape, raw: &str) -> Option<FieldValue> {
    match shape {
        Shape::Text => Some(FieldValue::Text(raw.to_string())),
        Shape::Count => INTEGER
            .find(raw)
            .and_then(|m| m.as_str().parse().ok())
            .map(FieldValue::Count),
        Shape::Decimal => NUMBER
            .find(raw)
            .and_then(|m| m.as_str().parse().ok())
            .map(FieldValue::Percent),
        Shape::LeavePair => {
            if let Some(caps) = PAIR.captures(raw) {
                let first = caps["first"].parse().ok()?;
                let second = caps["second"].parse().ok()?;
                return Some(FieldValue::Pair(first, second));
            }
            let mut numbers = INTEGER.find_iter(raw).filter_map(|m| m.as_str().parse().ok());
            let first = numbers.next()?;
            Some(FieldValue::Pair(first, numbers.next().unwrap_or(0)))
        }
        Shape::DateRange => {
            let mut dates = DATE.find_iter(raw).map(|m| parse_date(m.as_str()));
            let start = dates.next().flatten();
            let end = dates.next().flatten();
            if start.is_none() && end.is_none() {
                return None;
            }
            Some(FieldValue::Dates(start, end))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(line: &str) -> Option<String> {
        match classify(line)?.value {
            FieldValue::Text(t) => Some(t),
            _ => None,
        }
    }

    #[test]
    fn teacher_label_variants_agree() {
        assert_eq!(text_of("TEACHER: Jane Doe").as_deref(), Some("Jane Doe"));
        assert_eq!(text_of("Teacher : Jane Doe").as_deref(), Some("Jane Doe"));
        assert_eq!(text_of("Faculty Name:Jane Doe").as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn label_without_colon_falls_back_to_remainder() {
        let c = classify("Teacher Jane Doe").unwrap();
        assert_eq!(c.tier, Tier::Remainder);
        assert_eq!(c.value, FieldValue::Text("Jane Doe".to_string()));
    }

    #[test]
    fn counts_fall_back_to_first_number() {
        let c = classify("Lectures Delivered 20 (till date)").unwrap();
        assert_eq!(c.field, Field::Delivered);
        assert_eq!(c.tier, Tier::Shape);
        assert_eq!(c.value, FieldValue::Count(20));

        let c = classify("Total Lectures : 31").unwrap();
        assert_eq!(c.field, Field::Delivered);
        assert_eq!(c.tier, Tier::Colon);
        assert_eq!(c.value, FieldValue::Count(31));
    }

    #[test]
    fn approved_leave_wins_over_bare_leave_labels() {
        let c = classify("Approved ML: 3").unwrap();
        assert_eq!(c.field, Field::ApprovedMedicalLeave);
        assert_eq!(c.value, FieldValue::Count(3));

        let c = classify("approved duty leave - 4").unwrap();
        assert_eq!(c.field, Field::ApprovedDutyLeave);
        assert_eq!(c.value, FieldValue::Count(4));
    }

    #[test]
    fn combined_leave_string_splits_into_pair() {
        let c = classify("Leaves (DL/ML): 2 / 1").unwrap();
        assert_eq!(c.field, Field::CombinedLeave);
        assert_eq!(c.value, FieldValue::Pair(2, 1));

        let c = classify("DL/ML 0/4").unwrap();
        assert_eq!(c.value, FieldValue::Pair(0, 4));
    }

    #[test]
    fn percentage_keeps_decimals() {
        let c = classify("Attendance %: 85.71%").unwrap();
        assert_eq!(c.field, Field::Percentage);
        assert_eq!(c.value, FieldValue::Percent(85.71));
    }

    #[test]
    fn attended_percentage_is_not_a_count() {
        let c = classify("Attended %: 80.5").unwrap();
        assert_eq!(c.field, Field::Percentage);
        assert_eq!(c.tier, Tier::Colon);
        assert_eq!(c.value, FieldValue::Percent(80.5));

        let c = classify("Attendance (%) : 72.4").unwrap();
        assert_eq!(c.field, Field::Percentage);
        assert_eq!(c.value, FieldValue::Percent(72.4));
    }

    #[test]
    fn total_prefix_does_not_swallow_attended_or_absent() {
        let c = classify("Total Lectures Attended : 14").unwrap();
        assert_eq!(c.field, Field::Attended);
        assert_eq!(c.value, FieldValue::Count(14));

        let c = classify("Total Classes Absent: 6").unwrap();
        assert_eq!(c.field, Field::Absent);
        assert_eq!(c.value, FieldValue::Count(6));
    }

    #[test]
    fn session_range_parses_both_dates() {
        let c = classify("Duration : 01/08/2024 to 30/11/2024").unwrap();
        assert_eq!(
            c.value,
            FieldValue::Dates(
                NaiveDate::from_ymd_opt(2024, 8, 1),
                NaiveDate::from_ymd_opt(2024, 11, 30)
            )
        );

        let c = classify("Session 05-Aug-2024 - 29-Nov-2024").unwrap();
        assert_eq!(c.tier, Tier::Shape);
        assert_eq!(
            c.value,
            FieldValue::Dates(
                NaiveDate::from_ymd_opt(2024, 8, 5),
                NaiveDate::from_ymd_opt(2024, 11, 29)
            )
        );
    }

    #[test]
    fn unlabeled_or_valueless_lines_are_ignored() {
        assert!(classify("Remarks: keep it up").is_none());
        assert!(classify("Absent: n/a").is_none());
    }

    #[test]
    fn parses_known_date_spellings() {
        let expected = NaiveDate::from_ymd_opt(2024, 8, 5);
        assert_eq!(parse_date("05/08/2024"), expected);
        assert_eq!(parse_date("2024-08-05"), expected);
        assert_eq!(parse_date("5 Aug 2024"), expected);
        assert_eq!(parse_date("05-Aug-2024"), expected);
        assert_eq!(parse_date("yesterday"), None);
    }
}

//! Per-screen targeting of in-app messages.
use derive_more::From;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Filter value that matches any screen, including navigation without a screen name.
pub const WILDCARD: &str = "*";

/// A single targeting condition on the screen name.
///
/// `MATCHES`/`NOT_MATCHES` patterns are compiled once, when the filter is created or
/// deserialized. A filter with an invalid pattern never matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ScreenNameFilterWire", into = "ScreenNameFilterWire")]
pub struct ScreenNameFilter {
    operator: Operator,
    value: FilterValue,
    patterns: Patterns,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScreenNameFilterWire {
    operator: Operator,
    value: FilterValue,
}

#[derive(Debug, Clone)]
enum Patterns {
    /// Operator does not use patterns.
    NotApplicable,
    Compiled(Vec<Regex>),
    Invalid,
}

impl Patterns {
    fn compile(operator: Operator, value: &FilterValue) -> Patterns {
        if !matches!(operator, Operator::Matches | Operator::NotMatches) {
            return Patterns::NotApplicable;
        }
        let compiled: Result<Vec<Regex>, _> = value.values().map(Regex::new).collect();
        match compiled {
            Ok(regexes) => Patterns::Compiled(regexes),
            Err(err) => {
                log::warn!(target: "dengage", "invalid screen name pattern: {err}");
                Patterns::Invalid
            }
        }
    }
}

impl From<ScreenNameFilterWire> for ScreenNameFilter {
    fn from(wire: ScreenNameFilterWire) -> Self {
        ScreenNameFilter::new(wire.operator, wire.value)
    }
}

impl From<ScreenNameFilter> for ScreenNameFilterWire {
    fn from(filter: ScreenNameFilter) -> Self {
        ScreenNameFilterWire {
            operator: filter.operator,
            value: filter.value,
        }
    }
}

impl PartialEq for ScreenNameFilter {
    fn eq(&self, other: &Self) -> bool {
        self.operator == other.operator && self.value == other.value
    }
}

impl ScreenNameFilter {
    /// Build a filter, compiling its patterns if `operator` needs them.
    pub fn new(operator: Operator, value: impl Into<FilterValue>) -> Self {
        let value = value.into();
        ScreenNameFilter {
            patterns: Patterns::compile(operator, &value),
            operator,
            value,
        }
    }

    /// Comparison applied to the screen name.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Value(s) the screen name is compared against.
    pub fn value(&self) -> &FilterValue {
        &self.value
    }

    /// Returns `true` if the filter allows `screen_name`. Without a screen name only the wildcard
    /// matches.
    pub fn matches(&self, screen_name: Option<&str>) -> bool {
        if self.value.values().any(|v| v == WILDCARD) {
            return true;
        }
        let Some(screen_name) = screen_name else {
            return false;
        };
        let mut values = self.value.values();
        match self.operator {
            Operator::Equals => values.any(|v| v == screen_name),
            Operator::NotEquals => !values.any(|v| v == screen_name),
            Operator::StartsWith => values.any(|v| screen_name.starts_with(v)),
            Operator::EndsWith => values.any(|v| screen_name.ends_with(v)),
            Operator::Contains => values.any(|v| screen_name.contains(v)),
            Operator::Matches | Operator::NotMatches => {
                let Patterns::Compiled(regexes) = &self.patterns else {
                    return false;
                };
                let matched = regexes.iter().any(|regex| regex.is_match(screen_name));
                matched == (self.operator == Operator::Matches)
            }
        }
    }
}

/// Returns `true` if a message with `filters` may be shown on `screen_name`. A message without
/// filters is untargeted and matches everywhere.
pub fn matches_screen(filters: &[ScreenNameFilter], screen_name: Option<&str>) -> bool {
    filters.iter().all(|filter| filter.matches(screen_name))
}

/// One value or a list of values. A list matches if any of its elements does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, From)]
#[serde(untagged)]
pub enum FilterValue {
    /// A single value.
    Single(String),
    /// Any of several values.
    Multiple(Vec<String>),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_owned())
    }
}

impl FilterValue {
    fn values(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            FilterValue::Single(s) => std::slice::from_ref(s),
            FilterValue::Multiple(v) => v,
        };
        values.iter().map(String::as_str)
    }
}

/// Comparison applied by a [`ScreenNameFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    /// Screen name equals one of the values.
    Equals,
    /// Screen name equals none of the values.
    NotEquals,
    /// Screen name starts with one of the values.
    StartsWith,
    /// Screen name ends with one of the values.
    EndsWith,
    /// Screen name contains one of the values.
    Contains,
    /// Screen name matches one of the regular expressions.
    Matches,
    /// Screen name matches none of the regular expressions.
    NotMatches,
}

#[cfg(test)]
mod tests {
    use super::{matches_screen, FilterValue, Operator, Patterns, ScreenNameFilter};

    fn filter(operator: Operator, value: impl Into<FilterValue>) -> ScreenNameFilter {
        ScreenNameFilter::new(operator, value)
    }

    #[test]
    fn equals_any_of() {
        let any_of = filter(Operator::Equals, vec!["home".to_owned(), "cart".to_owned()]);
        assert!(any_of.matches(Some("home")));
        assert!(any_of.matches(Some("cart")));
        assert!(!any_of.matches(Some("profile")));
    }

    #[test]
    fn not_equals() {
        assert!(!filter(Operator::NotEquals, "home").matches(Some("home")));
        assert!(filter(Operator::NotEquals, "home").matches(Some("cart")));
        // NOT_EQUALS fails when there is no screen name
        assert!(!filter(Operator::NotEquals, "home").matches(None));
    }

    #[test]
    fn string_operators() {
        assert!(filter(Operator::StartsWith, "product/").matches(Some("product/42")));
        assert!(filter(Operator::EndsWith, "/42").matches(Some("product/42")));
        assert!(filter(Operator::Contains, "duct").matches(Some("product/42")));
        assert!(!filter(Operator::Contains, "duct").matches(Some("home")));
    }

    #[test]
    fn matches_regex() {
        let product = filter(Operator::Matches, "^product/\\d+$");
        assert!(product.matches(Some("product/42")));
        assert!(!product.matches(Some("product/abc")));
        assert!(filter(Operator::NotMatches, "^product/").matches(Some("home")));
    }

    #[test]
    fn invalid_regex_never_matches() {
        assert!(!filter(Operator::Matches, "(").matches(Some("home")));
        assert!(!filter(Operator::NotMatches, "(").matches(Some("home")));
    }

    #[test]
    fn untargeted_matches_everywhere() {
        assert!(matches_screen(&[], Some("home")));
        assert!(matches_screen(&[], None));
    }

    #[test]
    fn wildcard_matches_without_screen_name() {
        let filters = [filter(Operator::Equals, "*")];
        assert!(matches_screen(&filters, Some("anything")));
        assert!(matches_screen(&filters, None));
    }

    #[test]
    fn targeted_requires_screen_name() {
        let filters = [filter(Operator::Equals, "cart")];
        assert!(matches_screen(&filters, Some("cart")));
        assert!(!matches_screen(&filters, Some("home")));
        assert!(!matches_screen(&filters, None));
    }

    #[test]
    fn all_filters_must_match() {
        let filters = [
            filter(Operator::StartsWith, "product"),
            filter(Operator::NotEquals, "product/hidden"),
        ];
        assert!(matches_screen(&filters, Some("product/42")));
        assert!(!matches_screen(&filters, Some("product/hidden")));
    }

    #[test]
    fn parses_wire_format() {
        let filter: ScreenNameFilter =
            serde_json::from_str(r#"{ "operator": "EQUALS", "value": ["home", "cart"] }"#)
                .unwrap();
        assert_eq!(filter.operator(), Operator::Equals);
        assert!(filter.matches(Some("cart")));

        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "operator": "EQUALS", "value": ["home", "cart"] })
        );
    }

    #[test]
    fn patterns_are_compiled_on_parse() {
        let filter: ScreenNameFilter = serde_json::from_str(
            r#"{ "operator": "MATCHES", "value": ["^cart$", "^product/\\d+$"] }"#,
        )
        .unwrap();
        assert!(matches!(&filter.patterns, Patterns::Compiled(regexes) if regexes.len() == 2));
        assert!(filter.matches(Some("product/7")));

        let invalid: ScreenNameFilter =
            serde_json::from_str(r#"{ "operator": "MATCHES", "value": "(" }"#).unwrap();
        assert!(matches!(invalid.patterns, Patterns::Invalid));

        let text = ScreenNameFilter::new(Operator::Equals, "(");
        assert!(matches!(text.patterns, Patterns::NotApplicable));
    }
}

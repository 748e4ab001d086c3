//! JSON payload matching for triggers

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Matcher evaluated against an event's JSON payload.
///
/// Paths are dot-separated object keys; an empty path selects the whole
/// value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadMatcher {
    /// Value at `path` equals `value`
    Equals {
        /// Key path
        #[serde(default)]
        path: String,
        /// Expected value
        value: Value,
    },
    /// A non-null value exists at `path`
    Exists {
        /// Key path
        #[serde(default)]
        path: String,
    },
    /// Numeric value at `path` lies within `[min, max]`
    Range {
        /// Key path
        #[serde(default)]
        path: String,
        /// Inclusive lower bound
        #[serde(default)]
        min: Option<f64>,
        /// Inclusive upper bound
        #[serde(default)]
        max: Option<f64>,
    },
    /// Every matcher matches
    And(Vec<PayloadMatcher>),
    /// At least one matcher matches
    Or(Vec<PayloadMatcher>),
    /// The inner matcher does not match
    Not(Box<PayloadMatcher>),
}

impl PayloadMatcher {
    /// Evaluate against a payload
    #[must_use]
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            PayloadMatcher::Equals { path, value: expected } => {
                lookup(value, path).is_some_and(|v| values_equal(v, expected))
            }
            PayloadMatcher::Exists { path } => lookup(value, path).is_some_and(|v| !v.is_null()),
            PayloadMatcher::Range { path, min, max } => {
                let Some(number) = lookup(value, path).and_then(Value::as_f64) else {
                    return false;
                };
                min.map_or(true, |min| number >= min) && max.map_or(true, |max| number <= max)
            }
            PayloadMatcher::And(matchers) => matchers.iter().all(|m| m.matches(value)),
            PayloadMatcher::Or(matchers) => matchers.iter().any(|m| m.matches(value)),
            PayloadMatcher::Not(matcher) => !matcher.matches(value),
        }
    }
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.')
        .try_fold(value, |current, key| current.as_object()?.get(key))
}

// 1 and 1.0 compare equal
fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => actual == expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equals_nested_path() {
        let matcher = PayloadMatcher::Equals {
            path: "screen.name".to_string(),
            value: json!("home"),
        };
        assert!(matcher.matches(&json!({"screen": {"name": "home"}})));
        assert!(!matcher.matches(&json!({"screen": {"name": "settings"}})));
        assert!(!matcher.matches(&json!({"screen": "home"})));
        assert!(!matcher.matches(&Value::Null));
    }

    #[test]
    fn test_equals_numbers_across_representations() {
        let matcher = PayloadMatcher::Equals {
            path: "level".to_string(),
            value: json!(3),
        };
        assert!(matcher.matches(&json!({"level": 3.0})));
    }

    #[test]
    fn test_exists_and_range() {
        let exists = PayloadMatcher::Exists {
            path: "id".to_string(),
        };
        assert!(exists.matches(&json!({"id": "abc"})));
        assert!(!exists.matches(&json!({"id": null})));

        let range = PayloadMatcher::Range {
            path: "amount".to_string(),
            min: Some(10.0),
            max: Some(20.0),
        };
        assert!(range.matches(&json!({"amount": 10})));
        assert!(range.matches(&json!({"amount": 20.0})));
        assert!(!range.matches(&json!({"amount": 21})));
        assert!(!range.matches(&json!({"amount": "15"})));
    }

    #[test]
    fn test_combinators() {
        let matcher = PayloadMatcher::And(vec![
            PayloadMatcher::Exists {
                path: "a".to_string(),
            },
            PayloadMatcher::Not(Box::new(PayloadMatcher::Or(vec![PayloadMatcher::Equals {
                path: "a".to_string(),
                value: json!(false),
            }]))),
        ]);
        assert!(matcher.matches(&json!({"a": true})));
        assert!(!matcher.matches(&json!({"a": false})));
        assert!(!matcher.matches(&json!({})));
    }

    #[test]
    fn test_deserialize_from_json() {
        let matcher: PayloadMatcher = serde_json::from_value(json!({
            "or": [
                {"equals": {"path": "version", "value": "2.0"}},
                {"range": {"path": "build", "min": 100}}
            ]
        }))
        .unwrap();
        assert!(matcher.matches(&json!({"version": "2.0"})));
        assert!(matcher.matches(&json!({"build": 150})));
        assert!(!matcher.matches(&json!({"build": 50})));
    }
}

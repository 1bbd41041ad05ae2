//! Observation scoring.
//!
//! `None` means no field carried a usable scoring rule for the given answers, which is
//! different from a score of zero.

use serde_json::{Map, Value};

use crate::observation::{FieldScoring, ObservationToolDefinition};

/// Score a set of answers against a tool definition.
pub fn score_submission(
    definition: &ObservationToolDefinition,
    answers: &Map<String, Value>,
) -> Option<f64> {
    let mut total = 0.0;
    let mut used = false;

    for field in &definition.fields {
        let Some(scoring) = &field.scoring else {
            continue;
        };
        let answer = answers.get(&field.key).unwrap_or(&Value::Null);
        if let Some(points) = score_answer(scoring, answer) {
            total += points;
            used = true;
        }
    }

    used.then_some(total)
}

fn score_answer(scoring: &FieldScoring, answer: &Value) -> Option<f64> {
    if let (Some(map), Some(key)) = (&scoring.map, scalar_key(answer)) {
        if let Some(points) = map.get(&key) {
            return Some(*points);
        }
    }
    let points = scoring.points?;
    is_affirmative(answer).then_some(points)
}

/// String form of a scalar answer, used as a map key.
fn scalar_key(answer: &Value) -> Option<String> {
    match answer {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", f as i64)),
            _ => Some(n.to_string()),
        },
        _ => None,
    }
}

fn is_affirmative(answer: &Value) -> bool {
    match answer {
        Value::Bool(b) => *b,
        Value::String(s) => !s.trim().is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(f64::is_finite),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::fields::FieldType;
    use crate::observation::ToolField;

    fn tool(fields: Vec<ToolField>) -> ObservationToolDefinition {
        ObservationToolDefinition {
            id: "tool-1".into(),
            name: "Pain scale".into(),
            category: "pain".into(),
            description: None,
            fields,
            scoring_rules: None,
            is_active: true,
        }
    }

    fn field(key: &str, scoring: Option<FieldScoring>) -> ToolField {
        ToolField {
            key: key.into(),
            label: key.to_uppercase(),
            kind: FieldType::Choice,
            required: false,
            options: None,
            scoring,
        }
    }

    fn points(p: f64) -> Option<FieldScoring> {
        Some(FieldScoring {
            points: Some(p),
            map: None,
        })
    }

    fn mapped(entries: &[(&str, f64)]) -> Option<FieldScoring> {
        let map: HashMap<String, f64> = entries.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        Some(FieldScoring {
            points: None,
            map: Some(map),
        })
    }

    fn answers(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_map_hit() {
        let def = tool(vec![field("q1", mapped(&[("yes", 5.0), ("no", 0.0)]))]);
        assert_eq!(score_submission(&def, &answers(json!({"q1": "yes"}))), Some(5.0));
    }

    #[test]
    fn test_map_hit_of_zero_is_scored() {
        let def = tool(vec![field("q1", mapped(&[("yes", 5.0), ("no", 0.0)]))]);
        assert_eq!(score_submission(&def, &answers(json!({"q1": "no"}))), Some(0.0));
    }

    #[test]
    fn test_blank_answer_is_unscored() {
        let def = tool(vec![field("q1", points(3.0))]);
        assert_eq!(score_submission(&def, &answers(json!({"q1": ""}))), None);
        assert_eq!(score_submission(&def, &answers(json!({"q1": "   "}))), None);
    }

    #[test]
    fn test_false_without_map_is_unscored() {
        let def = tool(vec![field("q1", points(3.0))]);
        assert_eq!(score_submission(&def, &answers(json!({"q1": false}))), None);
    }

    #[test]
    fn test_points_awarded_for_truthy_answers() {
        let def = tool(vec![
            field("a", points(1.0)),
            field("b", points(2.0)),
            field("c", points(4.0)),
            field("d", None),
        ]);
        let a = answers(json!({"a": true, "b": "limping", "c": 0, "d": "ignored"}));
        assert_eq!(score_submission(&def, &a), Some(7.0));
    }

    #[test]
    fn test_map_keys_use_string_form() {
        let def = tool(vec![
            field("n", mapped(&[("3", 9.0)])),
            field("b", mapped(&[("true", 1.5)])),
        ]);
        let a = answers(json!({"n": 3, "b": true}));
        assert_eq!(score_submission(&def, &a), Some(10.5));
    }

    #[test]
    fn test_map_miss_falls_back_to_points() {
        let def = tool(vec![field(
            "q",
            Some(FieldScoring {
                points: Some(2.0),
                map: Some(HashMap::from([("severe".to_string(), 10.0)])),
            }),
        )]);
        assert_eq!(score_submission(&def, &answers(json!({"q": "mild"}))), Some(2.0));
    }

    #[test]
    fn test_missing_answer_is_ignored() {
        let def = tool(vec![field("q1", points(3.0))]);
        assert_eq!(score_submission(&def, &Map::new()), None);
    }
}

//! Graded student records as produced by the grading oracle.
//!
//! Records arrive in detection order, which is also the order used to map
//! records onto page blocks. Deserialization never fails on a single bad
//! field; see the `lenient` helpers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::lenient;
use crate::text::{SOLUTION_PREFIX, UNKNOWN_PREFIX};

/// What a paper represents in the pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperRole {
    /// The answer key; excluded from ranking.
    Solution,
    /// A paper whose student could not be identified.
    Unknown,
    Student,
}

impl PaperRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Solution => "solution",
            Self::Unknown => "unknown",
            Self::Student => "student",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "solution" => Some(Self::Solution),
            "unknown" => Some(Self::Unknown),
            "student" => Some(Self::Student),
            _ => None,
        }
    }

    /// Derive a role from a sentinel name prefix (case-insensitive).
    pub fn infer(name: Option<&str>) -> Self {
        let Some(name) = name else {
            return Self::Student;
        };
        let lower = name.trim().to_lowercase();
        if lower.starts_with(SOLUTION_PREFIX) {
            Self::Solution
        } else if lower.starts_with(UNKNOWN_PREFIX) {
            Self::Unknown
        } else {
            Self::Student
        }
    }
}

impl std::fmt::Display for PaperRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Marks for one labelled part of a question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subpart {
    #[serde(default, alias = "part", deserialize_with = "lenient::string")]
    pub label: String,
    #[serde(default, alias = "awarded", deserialize_with = "lenient::number")]
    pub marks: f64,
    #[serde(default, alias = "max", deserialize_with = "lenient::number")]
    pub max_marks: f64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub remarks: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(
        default,
        alias = "question",
        alias = "q",
        alias = "question_number",
        deserialize_with = "lenient::string"
    )]
    pub number: String,
    #[serde(default, alias = "awarded", deserialize_with = "lenient::number")]
    pub marks: f64,
    #[serde(default, alias = "max", deserialize_with = "lenient::number")]
    pub max_marks: f64,
    #[serde(default, deserialize_with = "lenient::optional_string")]
    pub topic: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub remarks: String,
    #[serde(default, alias = "parts", deserialize_with = "lenient::list")]
    pub subparts: Vec<Subpart>,
}

/// One graded paper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    #[serde(default, alias = "student_name", deserialize_with = "lenient::optional_string")]
    pub name: Option<String>,
    #[serde(
        default,
        alias = "roll_no",
        alias = "roll_number",
        alias = "id",
        deserialize_with = "lenient::optional_string"
    )]
    pub roll: Option<String>,
    #[serde(default, alias = "total", alias = "score", deserialize_with = "lenient::number")]
    pub total_score: f64,
    #[serde(default, alias = "max", alias = "total_marks", deserialize_with = "lenient::number")]
    pub max_score: f64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub remarks: String,
    #[serde(default, deserialize_with = "lenient::list")]
    pub questions: Vec<Question>,
    /// Explicit role, when the grader or OCR step set one.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "role")]
    pub role: Option<PaperRole>,
}

fn role<'de, D>(deserializer: D) -> Result<Option<PaperRole>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(lenient::optional_string(deserializer)?.and_then(|s| PaperRole::from_str(&s)))
}

impl StudentRecord {
    /// The explicit role if present, otherwise one inferred from the name.
    pub fn effective_role(&self) -> PaperRole {
        self.role
            .unwrap_or_else(|| PaperRole::infer(self.name.as_deref()))
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }

    pub fn display_roll(&self) -> &str {
        self.roll.as_deref().unwrap_or("-")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GradedPayload {
    List(Vec<Value>),
    Wrapped {
        #[serde(alias = "results", alias = "records")]
        students: Vec<Value>,
    },
}

/// Key groups that deserialize into the same field, canonical name first.
const RECORD_KEYS: &[&[&str]] = &[
    &["name", "student_name"],
    &["roll", "roll_no", "roll_number", "id"],
    &["total_score", "total", "score"],
    &["max_score", "max", "total_marks"],
];

const QUESTION_KEYS: &[&[&str]] = &[
    &["number", "question", "q", "question_number"],
    &["marks", "awarded"],
    &["max_marks", "max"],
    &["subparts", "parts"],
];

const SUBPART_KEYS: &[&[&str]] = &[
    &["label", "part"],
    &["marks", "awarded"],
    &["max_marks", "max"],
];

/// Keep only the first key of each group present, so serde never sees the
/// same field twice.
fn collapse_keys(map: &mut Map<String, Value>, groups: &[&[&str]]) {
    for group in groups {
        let mut seen = false;
        for key in group.iter() {
            if map.contains_key(*key) {
                if seen {
                    map.remove(*key);
                }
                seen = true;
            }
        }
    }
}

fn collapse_items(map: &mut Map<String, Value>, key: &str, groups: &[&[&str]]) {
    if let Some(Value::Array(items)) = map.get_mut(key) {
        for item in items.iter_mut() {
            if let Value::Object(inner) = item {
                collapse_keys(inner, groups);
                if key == "questions" {
                    collapse_items(inner, "subparts", SUBPART_KEYS);
                    collapse_items(inner, "parts", SUBPART_KEYS);
                }
            }
        }
    }
}

/// Parse one array item. Anything unusable becomes an empty record so later
/// records keep their positions.
fn parse_record(index: usize, item: Value) -> StudentRecord {
    let Value::Object(mut map) = item else {
        warn!("Graded result {} is not an object; using an empty record", index);
        return StudentRecord::default();
    };
    collapse_keys(&mut map, RECORD_KEYS);
    collapse_items(&mut map, "questions", QUESTION_KEYS);
    serde_json::from_value(Value::Object(map)).unwrap_or_else(|e| {
        warn!("Graded result {} is malformed ({}); using an empty record", index, e);
        StudentRecord::default()
    })
}

/// Parse grader output: either a JSON array of records or `{"students": [...]}`.
///
/// Every array item yields exactly one record, in order, since the position
/// maps a record onto its page block.
pub fn parse_graded_results(json: &str) -> Result<Vec<StudentRecord>, serde_json::Error> {
    let items = match serde_json::from_str::<GradedPayload>(json)? {
        GradedPayload::List(items) => items,
        GradedPayload::Wrapped { students } => students,
    };
    Ok(items
        .into_iter()
        .enumerate()
        .map(|(index, item)| parse_record(index, item))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default() {
        let rec: StudentRecord = serde_json::from_str("{}").unwrap();
        assert_eq!(rec.name, None);
        assert_eq!(rec.total_score, 0.0);
        assert_eq!(rec.remarks, "");
        assert!(rec.questions.is_empty());
        assert_eq!(rec.effective_role(), PaperRole::Student);
    }

    #[test]
    fn test_numeric_strings_and_nulls() {
        let rec: StudentRecord = serde_json::from_str(
            r#"{"name": null, "roll": 42, "total_score": "17.5", "max_score": "bad",
                "questions": [{"number": 1, "marks": "3", "max_marks": 5,
                               "subparts": [{"label": "a", "marks": 1}, 7]}, "junk"]}"#,
        )
        .unwrap();
        assert_eq!(rec.roll.as_deref(), Some("42"));
        assert_eq!(rec.total_score, 17.5);
        assert_eq!(rec.max_score, 0.0);
        assert_eq!(rec.questions.len(), 1);
        assert_eq!(rec.questions[0].number, "1");
        assert_eq!(rec.questions[0].marks, 3.0);
        assert_eq!(rec.questions[0].subparts.len(), 1);
    }

    #[test]
    fn test_role_inference_from_sentinel() {
        assert_eq!(
            PaperRole::infer(Some("SOLUTION_PAPER_quiz_a")),
            PaperRole::Solution
        );
        assert_eq!(PaperRole::infer(Some("unknown_quiz")), PaperRole::Unknown);
        assert_eq!(PaperRole::infer(Some("Jane")), PaperRole::Student);
        assert_eq!(PaperRole::infer(None), PaperRole::Student);
    }

    #[test]
    fn test_explicit_role_wins() {
        let rec: StudentRecord =
            serde_json::from_str(r#"{"name": "solution_paper_x", "role": "student"}"#).unwrap();
        assert_eq!(rec.effective_role(), PaperRole::Student);
    }

    #[test]
    fn test_parse_graded_results_shapes() {
        let list = parse_graded_results(r#"[{"name": "A", "total_score": 3}, 5]"#).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1], StudentRecord::default());

        let wrapped =
            parse_graded_results(r#"{"students": [{"name": "A"}, {"name": "B"}]}"#).unwrap();
        assert_eq!(wrapped.len(), 2);
        assert_eq!(wrapped[1].name.as_deref(), Some("B"));

        assert!(parse_graded_results(r#"{"other": 1}"#).is_err());
    }

    #[test]
    fn test_non_object_items_keep_positions() {
        let list =
            parse_graded_results(r#"[null, {"name": "Ben", "total_score": 90}]"#).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, None);
        assert_eq!(list[1].name.as_deref(), Some("Ben"));
        assert_eq!(list[1].total_score, 90.0);
    }

    #[test]
    fn test_aliased_fields_do_not_reject_record() {
        let list = parse_graded_results(
            r#"[{"name": "Ana", "total_score": 40, "score": 35, "max": 50, "max_score": 100,
                 "questions": [{"number": 1, "q": 2, "marks": 4, "awarded": 3,
                                "subparts": [{"label": "a", "part": "b"}]}]},
                {"name": "Ben", "total_score": 90},
                {"name": "Cy", "total_score": 10}]"#,
        )
        .unwrap();
        let names: Vec<&str> = list.iter().map(|r| r.display_name()).collect();
        assert_eq!(names, vec!["Ana", "Ben", "Cy"]);
        assert_eq!(list[0].total_score, 40.0);
        assert_eq!(list[0].max_score, 100.0);
        assert_eq!(list[0].questions.len(), 1);
        assert_eq!(list[0].questions[0].number, "1");
        assert_eq!(list[0].questions[0].marks, 4.0);
        assert_eq!(list[0].questions[0].subparts[0].label, "a");
    }
}

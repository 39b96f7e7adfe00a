//! Question types, required fields and content-service routes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ContractError;

/// Fields every question payload must carry
pub const COMMON_REQUIRED_FIELDS: [&str; 5] =
    ["project_id", "language_code", "question_type", "class", "stem"];

const QUESTIONS_BASE: &str = "/api/content/v1/questions";
const ITEMS_BASE: &str = "/api/content/v1/items";

/// Question type; doubles as the route segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    /// Multiple choice, single answer
    Mcq,
    /// Multiple choice, multiple answers
    Msq,
    TrueFalse,
    /// Fill in the blank
    Fib,
    Descriptive,
}

impl QuestionType {
    pub const ALL: [QuestionType; 5] = [
        QuestionType::Mcq,
        QuestionType::Msq,
        QuestionType::TrueFalse,
        QuestionType::Fib,
        QuestionType::Descriptive,
    ];

    pub fn path_segment(&self) -> &'static str {
        match self {
            QuestionType::Mcq => "mcq",
            QuestionType::Msq => "msq",
            QuestionType::TrueFalse => "true-false",
            QuestionType::Fib => "fib",
            QuestionType::Descriptive => "descriptive",
        }
    }

    /// Fields beyond [`COMMON_REQUIRED_FIELDS`] this type requires
    pub fn type_specific_fields(&self) -> &'static [&'static str] {
        match self {
            QuestionType::Mcq | QuestionType::Msq => &["options", "answer"],
            QuestionType::TrueFalse => &["answer"],
            QuestionType::Fib => &["answers"],
            QuestionType::Descriptive => &["model_answer"],
        }
    }

    /// The full documented required set
    pub fn required_fields(&self) -> Vec<&'static str> {
        COMMON_REQUIRED_FIELDS
            .iter()
            .chain(self.type_specific_fields())
            .copied()
            .collect()
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

impl FromStr for QuestionType {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuestionType::ALL
            .iter()
            .find(|t| t.path_segment() == s)
            .copied()
            .ok_or_else(|| ContractError::InvalidRequest(format!("unknown question type: {}", s)))
    }
}

/// `POST` target for creating a question
pub fn questions_path(question_type: QuestionType) -> String {
    format!("{}/{}", QUESTIONS_BASE, question_type.path_segment())
}

/// `PUT` target for updating a question
pub fn question_path(question_type: QuestionType, content_id: &str) -> String {
    format!("{}/{}/{}", QUESTIONS_BASE, question_type.path_segment(), content_id)
}

/// `GET` target for retrieving every row of a content item
pub fn item_path(content_id: &str) -> String {
    format!("{}/{}", ITEMS_BASE, content_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for t in QuestionType::ALL {
            assert_eq!(t.path_segment().parse::<QuestionType>().unwrap(), t);
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.path_segment()));
        }
        assert!("essay".parse::<QuestionType>().is_err());
    }

    #[test]
    fn test_required_fields() {
        let fields = QuestionType::Mcq.required_fields();
        assert_eq!(&fields[..5], &COMMON_REQUIRED_FIELDS);
        assert!(fields.contains(&"options"));
        assert!(QuestionType::Fib.required_fields().contains(&"answers"));
    }

    #[test]
    fn test_paths() {
        assert_eq!(questions_path(QuestionType::TrueFalse), "/api/content/v1/questions/true-false");
        assert_eq!(question_path(QuestionType::Mcq, "Q12"), "/api/content/v1/questions/mcq/Q12");
        assert_eq!(item_path("Q12"), "/api/content/v1/items/Q12");
    }
}

//! Turns raw model output into a validated [`Question`].
//!
//! Models are asked for a bare JSON object but still wrap it in code fences,
//! prepend chatter, or emit a couple of known malformed patterns. Parsing is
//! all-or-nothing: either every field checks out or a [`ParseError`] comes
//! back.

use serde::Deserialize;
use thiserror::Error;

use crate::models::{Question, CHOICE_COUNT};

const FENCE: &str = "```";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object found in model output")]
    NoObject,

    #[error("model output is not a valid question: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("expected {} choices, got {0}", CHOICE_COUNT)]
    ChoiceCount(usize),

    #[error("answer index {0} is out of range")]
    AnswerOutOfRange(i64),
}

/// Wire shape requested by the system prompt.
#[derive(Debug, Deserialize)]
struct RawQuestion {
    question: String,
    choices: Vec<String>,
    answer: i64,
    explanation: String,
    hint: String,
}

impl RawQuestion {
    fn validate(self) -> Result<Question, ParseError> {
        let choice_count = self.choices.len();
        let choices: [String; CHOICE_COUNT] = self
            .choices
            .try_into()
            .map_err(|_choices| ParseError::ChoiceCount(choice_count))?;

        let answer = self.answer;
        let correct_index = usize::try_from(answer)
            .ok()
            .filter(|&index| index < CHOICE_COUNT)
            .ok_or(ParseError::AnswerOutOfRange(answer))?;

        Question::new(
            self.question,
            choices,
            correct_index,
            self.explanation,
            self.hint,
        )
        .ok_or(ParseError::AnswerOutOfRange(answer))
    }
}

pub fn parse(raw: &str) -> Result<Question, ParseError> {
    let stripped = strip_code_fences(raw);
    let object = extract_object(&stripped).ok_or(ParseError::NoObject)?;
    let repaired = repair(object);

    let decoded: RawQuestion = serde_json::from_str(&repaired)?;
    decoded.validate()
}

/// Removes every ```` ``` ```` marker together with an optional language tag.
pub fn strip_code_fences(raw: &str) -> String {
    let mut stripped = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find(FENCE) {
        stripped.push_str(&rest[..start]);
        rest = &rest[start + FENCE.len()..];

        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or_else(|| rest.len());
        rest = &rest[tag_len..];
    }
    stripped.push_str(rest);

    stripped.trim().to_owned()
}

/// First `{` through last `}`.
pub fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;

    if end < start {
        return None;
    }

    Some(&text[start..=end])
}

/// Fixes the two malformed patterns models are known to emit:
/// `"foo") ,` becomes `"foo",` and `"foo") ]` becomes `"foo" ]`.
///
/// Nothing else is rewritten.
pub fn repair(object: &str) -> String {
    let repaired = drop_stray_paren(object, ',', "");
    drop_stray_paren(&repaired, ']', " ")
}

/// Deletes a `)` wedged between the end of a string literal and `delimiter`.
fn drop_stray_paren(input: &str, delimiter: char, separator: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut copied = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in input.char_indices() {
        if offset < copied {
            continue;
        }

        if !in_string {
            in_string = c == '"';
            continue;
        }

        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            in_string = false;

            let literal_end = offset + c.len_utf8();
            if let Some(consumed) = stray_paren_len(&input[literal_end..], delimiter) {
                out.push_str(&input[copied..literal_end]);
                out.push_str(separator);
                out.push(delimiter);
                copied = literal_end + consumed;
            }
        }
    }
    out.push_str(&input[copied..]);

    out
}

/// Length of `\s*)\s*<delimiter>` at the start of `tail`, if present.
fn stray_paren_len(tail: &str, delimiter: char) -> Option<usize> {
    let after_paren = tail.trim_start().strip_prefix(')')?.trim_start();
    let rest = after_paren.strip_prefix(delimiter)?;

    Some(tail.len() - rest.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const VALID: &str = r#"{
        "question": "What is 2 + 2?",
        "choices": ["3", "4", "5", "22"],
        "answer": 1,
        "explanation": "Two plus two is four.",
        "hint": "Count on your fingers."
    }"#;

    #[test]
    fn parses_plain_object() {
        let question = parse(VALID).unwrap();

        assert_eq!(question.text(), "What is 2 + 2?");
        assert_eq!(question.choices()[1], "4");
        assert_eq!(question.correct_index(), 1);
        assert_eq!(question.correct_choice(), "4");
        assert_eq!(question.explanation(), "Two plus two is four.");
        assert_eq!(question.hint(), "Count on your fingers.");
    }

    #[test]
    fn parses_fenced_object_with_chatter() {
        let raw = format!("Sure! Here is your question:\n```json\n{}\n```\nGood luck!", VALID);

        assert_eq!(parse(&raw).unwrap(), parse(VALID).unwrap());
    }

    #[test]
    fn parses_fence_without_language_tag() {
        let raw = format!("```\n{}\n```", VALID);

        assert_eq!(parse(&raw).unwrap(), parse(VALID).unwrap());
    }

    #[test]
    fn rejects_text_without_object() {
        assert!(matches!(
            parse("I cannot help with that."),
            Err(ParseError::NoObject)
        ));
        assert!(matches!(parse("} backwards {"), Err(ParseError::NoObject)));
    }

    #[test]
    fn rejects_missing_choices() {
        let raw = r#"{"question": "q", "answer": 0, "explanation": "e", "hint": "h"}"#;

        assert!(matches!(parse(raw), Err(ParseError::Decode(_))));
    }

    #[test]
    fn rejects_missing_hint_or_answer() {
        let no_hint = r#"{"question": "q", "choices": ["a", "b", "c", "d"], "answer": 0, "explanation": "e"}"#;
        let no_answer = r#"{"question": "q", "choices": ["a", "b", "c", "d"], "explanation": "e", "hint": "h"}"#;

        assert!(matches!(parse(no_hint), Err(ParseError::Decode(_))));
        assert!(matches!(parse(no_answer), Err(ParseError::Decode(_))));
    }

    #[test]
    fn rejects_wrong_choice_count() {
        let three = r#"{"question": "q", "choices": ["a", "b", "c"], "answer": 0, "explanation": "e", "hint": "h"}"#;
        let five = r#"{"question": "q", "choices": ["a", "b", "c", "d", "e"], "answer": 0, "explanation": "e", "hint": "h"}"#;

        assert!(matches!(parse(three), Err(ParseError::ChoiceCount(3))));
        assert!(matches!(parse(five), Err(ParseError::ChoiceCount(5))));
    }

    #[test]
    fn rejects_out_of_range_answer() {
        let high = r#"{"question": "q", "choices": ["a", "b", "c", "d"], "answer": 4, "explanation": "e", "hint": "h"}"#;
        let negative = r#"{"question": "q", "choices": ["a", "b", "c", "d"], "answer": -1, "explanation": "e", "hint": "h"}"#;

        assert!(matches!(parse(high), Err(ParseError::AnswerOutOfRange(4))));
        assert!(matches!(
            parse(negative),
            Err(ParseError::AnswerOutOfRange(-1))
        ));
    }

    #[test]
    fn repairs_paren_before_comma() {
        assert_eq!(repair(r#""foo") ,"#), r#""foo","#);
        assert_eq!(repair(r#"["foo"),"bar"]"#), r#"["foo","bar"]"#);
    }

    #[test]
    fn repairs_paren_before_bracket() {
        assert_eq!(repair(r#""foo") ]"#), r#""foo" ]"#);
        assert_eq!(repair(r#""foo")]"#), r#""foo" ]"#);
    }

    #[test]
    fn repair_leaves_parens_inside_strings() {
        let object = r#"{"choices": ["f(x) , g(x)", "(a) ]"]}"#;

        assert_eq!(repair(object), object);
    }

    #[test]
    fn parses_repaired_output() {
        let raw = r#"{
            "question": "Pick the prime",
            "choices": ["4", "6") , "7", "9") ],
            "answer": 2,
            "explanation": "7 has no divisors besides 1 and itself.",
            "hint": "Odd numbers"
        }"#;

        let question = parse(raw).unwrap();
        assert_eq!(question.choices()[1], "6");
        assert_eq!(question.choices()[3], "9");
        assert_eq!(question.correct_choice(), "7");
    }

    fn question_json(text: &str, choices: &[String], answer: i64) -> String {
        serde_json::json!({
            "question": text,
            "choices": choices,
            "answer": answer,
            "explanation": "because",
            "hint": "think",
        })
        .to_string()
    }

    proptest! {
        #[test]
        fn fenced_output_parses_like_bare_output(
            text in "[A-Za-z0-9 ?.]{1,40}",
            choices in proptest::collection::vec("[A-Za-z0-9 ]{1,20}", 4),
            answer in 0i64..4,
            tag in "(json|JSON|)",
        ) {
            let bare = question_json(&text, &choices, answer);
            let fenced = format!("```{}\n{}\n```", tag, bare);

            prop_assert_eq!(parse(&fenced).unwrap(), parse(&bare).unwrap());
        }

        #[test]
        fn parsed_index_is_in_bounds(
            choices in proptest::collection::vec("[a-z]{1,8}", 0..8),
            answer in -4i64..12,
        ) {
            match parse(&question_json("q", &choices, answer)) {
                Ok(question) => {
                    prop_assert_eq!(choices.len(), CHOICE_COUNT);
                    prop_assert!(question.correct_index() < question.choices().len());
                }
                Err(ParseError::ChoiceCount(count)) => prop_assert_ne!(count, CHOICE_COUNT),
                Err(ParseError::AnswerOutOfRange(index)) => {
                    prop_assert!(index < 0 || index >= CHOICE_COUNT as i64)
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
        }
    }
}

use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};
use thiserror::Error;

pub const CHOICE_COUNT: usize = 4;

const BUILTIN_CATALOG: &str = include_str!("../quiz.toml");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid catalog: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("catalog has no subjects")]
    NoSubjects,

    #[error("duplicate subject id `{0}`")]
    DuplicateSubject(String),

    #[error("duplicate level `{0}`")]
    DuplicateLevel(Level),

    #[error("time limit must be positive")]
    ZeroTimeLimit,

    #[error("question counts must be positive")]
    ZeroQuestionCount,
}

/// Subjects, levels, the system prompt and the timer settings.
///
/// Loaded once at startup and shared read-only by every session.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Catalog {
    #[serde(default)]
    pub subject: Vec<Subject>,

    #[serde(default)]
    pub level: Vec<LevelInfo>,

    pub system_prompt: String,

    #[serde(default = "default_time_limit")]
    pub time_limit: u32,

    #[serde(default = "default_question_counts")]
    pub question_counts: Vec<usize>,

    #[serde(default = "default_question_count")]
    pub default_question_count: usize,
}

fn default_time_limit() -> u32 {
    60
}

fn default_question_counts() -> Vec<usize> {
    vec![3, 5, 10]
}

fn default_question_count() -> usize {
    5
}

impl Catalog {
    pub fn builtin() -> Result<Catalog, CatalogError> {
        Catalog::from_toml(BUILTIN_CATALOG)
    }

    pub fn from_toml(source: &str) -> Result<Catalog, CatalogError> {
        let catalog: Catalog = toml::de::from_str(source)?;
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.subject.is_empty() {
            return Err(CatalogError::NoSubjects);
        }

        let mut subject_ids = BTreeSet::new();
        for subject in &self.subject {
            if !subject_ids.insert(subject.id.as_str()) {
                return Err(CatalogError::DuplicateSubject(subject.id.clone()));
            }
        }

        let mut levels = BTreeSet::new();
        for level in &self.level {
            if !levels.insert(level.id) {
                return Err(CatalogError::DuplicateLevel(level.id));
            }
        }

        if self.time_limit == 0 {
            return Err(CatalogError::ZeroTimeLimit);
        }

        if self.default_question_count == 0 || self.question_counts.iter().any(|&n| n == 0) {
            return Err(CatalogError::ZeroQuestionCount);
        }

        Ok(())
    }

    pub fn subject(&self, id: &str) -> Option<&Subject> {
        self.subject.iter().find(|subject| subject.id == id)
    }

    /// Display label for a level, falling back to its id when the catalog
    /// does not describe it.
    pub fn level_label(&self, level: Level) -> String {
        self.level
            .iter()
            .find(|info| info.id == level)
            .map(|info| info.label.clone())
            .unwrap_or_else(|| level.to_string())
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Subject {
    pub id: String,
    pub label: String,

    #[serde(default)]
    pub icon: String,

    #[serde(default)]
    pub color: String,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Basic,
    Standard,
    Advanced,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match self {
            Level::Basic => "basic",
            Level::Standard => "standard",
            Level::Advanced => "advanced",
        };
        f.write_str(id)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct LevelInfo {
    pub id: Level,
    pub label: String,

    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ConfigDraft {
    pub subject: Option<String>,
    pub level: Option<Level>,
    pub topic: String,
    pub question_count: usize,
}

impl ConfigDraft {
    pub fn new(catalog: &Catalog) -> ConfigDraft {
        ConfigDraft {
            subject: None,
            level: None,
            topic: String::new(),
            question_count: catalog.default_question_count,
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct QuizConfig {
    pub subject: String,
    pub level: Level,
    pub topic: String,
    pub question_count: usize,
}

/// A validated multiple-choice question.
///
/// Only the parser builds these, so `correct_index` always points into
/// `choices`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Question {
    text: String,
    choices: [String; CHOICE_COUNT],
    correct_index: usize,
    explanation: String,
    hint: String,
}

impl Question {
    pub(crate) fn new(
        text: String,
        choices: [String; CHOICE_COUNT],
        correct_index: usize,
        explanation: String,
        hint: String,
    ) -> Option<Question> {
        if correct_index >= CHOICE_COUNT {
            return None;
        }

        Some(Question {
            text,
            choices,
            correct_index,
            explanation,
            hint,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn choices(&self) -> &[String; CHOICE_COUNT] {
        &self.choices
    }

    pub fn correct_index(&self) -> usize {
        self.correct_index
    }

    pub fn correct_choice(&self) -> &str {
        &self.choices[self.correct_index]
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn hint(&self) -> &str {
        &self.hint
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    Choice(usize),
    TimedOut,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AnswerRecord {
    pub question_index: usize,
    pub selection: Selection,
    pub is_correct: bool,
}

impl AnswerRecord {
    pub fn new(question_index: usize, selection: Selection, question: &Question) -> AnswerRecord {
        let is_correct = match selection {
            Selection::Choice(index) => index == question.correct_index(),
            Selection::TimedOut => false,
        };

        AnswerRecord {
            question_index,
            selection,
            is_correct,
        }
    }

    /// The selected choice, with `-1` standing for a timeout.
    pub fn selected_index(&self) -> i64 {
        match self.selection {
            Selection::Choice(index) => index as i64,
            Selection::TimedOut => -1,
        }
    }
}

/// Error text the proxy answers with when it holds no upstream credential.
pub const MISSING_CREDENTIAL: &str = "API key is not configured";

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> ChatMessage {
        ChatMessage {
            role,
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl CompletionRequest {
    pub fn into_messages(self) -> Vec<ChatMessage> {
        match self.system {
            Some(system) => std::iter::once(ChatMessage::new(Role::System, system))
                .chain(self.messages)
                .collect(),
            None => self.messages,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CompletionEnvelope {
    #[serde(default)]
    pub choices: Vec<EnvelopeChoice>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EnvelopeChoice {
    pub message: EnvelopeMessage,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EnvelopeMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl CompletionEnvelope {
    pub fn into_text(self) -> Option<String> {
        self.choices.into_iter().next()?.message.content
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ErrorReply {
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_instruction_goes_first() {
        let request = CompletionRequest {
            messages: vec![ChatMessage::new(Role::User, "hi")],
            system: Some("be terse".into()),
        };

        let messages = request.into_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], ChatMessage::new(Role::System, "be terse"));
        assert_eq!(messages[1].role, Role::User);
    }

    #[test]
    fn envelope_yields_first_message() {
        let envelope: CompletionEnvelope = serde_json::from_str(
            r#"{"id": "x", "choices": [{"index": 0, "message": {"role": "assistant", "content": "{}"}}]}"#,
        )
        .unwrap();
        assert_eq!(envelope.into_text().as_deref(), Some("{}"));

        let empty: CompletionEnvelope = serde_json::from_str(r#"{"error": "nope"}"#).unwrap();
        assert_eq!(empty.into_text(), None);
    }

    fn question(correct_index: usize) -> Question {
        Question::new(
            "2 + 2?".into(),
            ["3".into(), "4".into(), "5".into(), "6".into()],
            correct_index,
            "Basic arithmetic".into(),
            "Count".into(),
        )
        .unwrap()
    }

    #[test]
    fn builtin_catalog_loads() {
        let catalog = Catalog::builtin().unwrap();

        assert!(catalog.subject("math").is_some());
        assert_eq!(catalog.level.len(), 3);
        assert_eq!(catalog.time_limit, 60);
        assert_eq!(catalog.question_counts, vec![3, 5, 10]);
    }

    #[test]
    fn catalog_defaults_apply() {
        let catalog = Catalog::from_toml(
            r#"
            system_prompt = "Return JSON."

            [[subject]]
            id = "math"
            label = "Math"
            "#,
        )
        .unwrap();

        assert_eq!(catalog.time_limit, 60);
        assert_eq!(catalog.default_question_count, 5);
        assert_eq!(catalog.level_label(Level::Advanced), "advanced");
    }

    #[test]
    fn catalog_rejects_duplicates_and_zeroes() {
        let duplicate = r#"
            system_prompt = "x"
            [[subject]]
            id = "math"
            label = "Math"
            [[subject]]
            id = "math"
            label = "Maths"
        "#;
        assert!(matches!(
            Catalog::from_toml(duplicate),
            Err(CatalogError::DuplicateSubject(id)) if id == "math"
        ));

        let empty = r#"system_prompt = "x""#;
        assert!(matches!(
            Catalog::from_toml(empty),
            Err(CatalogError::NoSubjects)
        ));

        let zero = r#"
            system_prompt = "x"
            time_limit = 0
            [[subject]]
            id = "math"
            label = "Math"
        "#;
        assert!(matches!(
            Catalog::from_toml(zero),
            Err(CatalogError::ZeroTimeLimit)
        ));
    }

    #[test]
    fn question_rejects_out_of_range_answer() {
        let choices = ["a".into(), "b".into(), "c".into(), "d".into()];
        assert!(Question::new("q".into(), choices, 4, "e".into(), "h".into()).is_none());
    }

    #[test]
    fn answer_record_scores_selection() {
        let question = question(1);

        let correct = AnswerRecord::new(0, Selection::Choice(1), &question);
        assert!(correct.is_correct);
        assert_eq!(correct.selected_index(), 1);

        let wrong = AnswerRecord::new(0, Selection::Choice(2), &question);
        assert!(!wrong.is_correct);

        let timed_out = AnswerRecord::new(0, Selection::TimedOut, &question);
        assert!(!timed_out.is_correct);
        assert_eq!(timed_out.selected_index(), -1);
    }
}

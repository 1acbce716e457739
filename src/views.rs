use serde::Serialize;

use crate::models::{ConfigDraft, LevelInfo, Selection, Subject};
use crate::session::{Phase, Screen, Session};

pub const URGENT_SECONDS: u32 = 10;

const EXCERPT_CHARS: usize = 60;

pub const TITLE: &str = "AI Quiz";

const START_HINT: &str = "Choose a subject and a level to start.";

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum View {
    Home(HomeView),
    Config(ConfigView),
    Quiz(QuizView),
    Result(ResultView),
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct HomeView {
    pub title: &'static str,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ConfigView {
    pub subjects: Vec<Subject>,
    pub levels: Vec<LevelInfo>,
    pub question_counts: Vec<usize>,
    pub draft: ConfigDraft,
    pub can_start: bool,
    /// Shown next to the disabled start button.
    pub start_hint: Option<&'static str>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct QuizView {
    pub subject_label: String,
    pub level_label: String,
    pub position: usize,
    pub generated: usize,
    pub requested: usize,
    pub correct_so_far: usize,
    /// Answered share of the generated questions, `0.0..=1.0`.
    pub progress: f32,
    pub loading: bool,
    pub question: Option<QuestionView>,
    pub failure: Option<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct QuestionView {
    pub number: usize,
    pub text: String,
    pub choices: Vec<ChoiceView>,
    /// Hidden whenever the countdown is not running.
    pub time_left: Option<u32>,
    pub urgent: bool,
    pub hint: Option<String>,
    pub can_show_hint: bool,
    pub verdict: Option<Verdict>,
    pub explanation: Option<String>,
    pub next: Option<NextButton>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ChoiceView {
    pub letter: char,
    pub text: String,
    pub mark: ChoiceMark,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceMark {
    Plain,
    Correct,
    Wrong,
    Dimmed,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    Incorrect,
    TimedOut,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NextButton {
    Next,
    /// The next question is still being generated; advancing waits for it.
    Generating,
    SeeResults,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ResultView {
    pub percentage: u32,
    pub score: usize,
    pub total: usize,
    pub feedback: Feedback,
    pub review: Vec<ReviewRow>,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Excellent,
    Close,
    Review,
}

impl Feedback {
    pub fn for_percentage(percentage: u32) -> Feedback {
        if percentage >= 80 {
            Feedback::Excellent
        } else if percentage >= 60 {
            Feedback::Close
        } else {
            Feedback::Review
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ReviewRow {
    pub excerpt: String,
    pub correct: bool,
    /// Only given for questions the user missed.
    pub correct_answer: Option<String>,
}

pub fn render(session: &Session) -> View {
    match session.screen() {
        Screen::Home => View::Home(HomeView { title: TITLE }),
        Screen::Config => View::Config(config_view(session)),
        Screen::Quiz => View::Quiz(quiz_view(session)),
        Screen::Result => View::Result(result_view(session)),
    }
}

fn config_view(session: &Session) -> ConfigView {
    let catalog = session.catalog();

    ConfigView {
        subjects: catalog.subject.clone(),
        levels: catalog.level.clone(),
        question_counts: catalog.question_counts.clone(),
        draft: session.draft().clone(),
        can_start: session.can_start(),
        start_hint: if session.can_start() {
            None
        } else {
            Some(START_HINT)
        },
    }
}

fn quiz_view(session: &Session) -> QuizView {
    let catalog = session.catalog();
    let config = session.config();

    let subject_label = config
        .and_then(|config| catalog.subject(&config.subject))
        .map(|subject| subject.label.clone())
        .unwrap_or_default();
    let level_label = config
        .map(|config| catalog.level_label(config.level))
        .unwrap_or_default();

    let generated = session.questions().len();
    let progress = if generated == 0 {
        0.0
    } else {
        session.answers().len() as f32 / generated as f32
    };

    QuizView {
        subject_label,
        level_label,
        position: (session.current_index() + 1).min(generated),
        generated,
        requested: config.map_or(0, |config| config.question_count),
        correct_so_far: session.score(),
        progress,
        loading: session.is_generating() && session.current_question().is_none(),
        question: question_view(session),
        failure: session.failure().map(String::from),
    }
}

fn question_view(session: &Session) -> Option<QuestionView> {
    let question = session.current_question()?;
    let answer = session.current_answer();
    let revealed = session.phase() == Phase::Revealed;
    let selected = answer.and_then(|answer| match answer.selection {
        Selection::Choice(index) => Some(index),
        Selection::TimedOut => None,
    });

    let choices = question
        .choices()
        .iter()
        .enumerate()
        .zip('A'..)
        .map(|((index, text), letter)| {
            let mark = if !revealed {
                ChoiceMark::Plain
            } else if index == question.correct_index() {
                ChoiceMark::Correct
            } else if Some(index) == selected {
                ChoiceMark::Wrong
            } else {
                ChoiceMark::Dimmed
            };

            ChoiceView {
                letter,
                text: text.clone(),
                mark,
            }
        })
        .collect();

    let verdict = answer.map(|answer| match answer.selection {
        Selection::TimedOut => Verdict::TimedOut,
        Selection::Choice(_) if answer.is_correct => Verdict::Correct,
        Selection::Choice(_) => Verdict::Incorrect,
    });

    let next = if revealed && session.failure().is_none() {
        let last = session.current_index() + 1 >= session.questions().len();
        Some(match (last, session.is_generating()) {
            (false, _) => NextButton::Next,
            (true, true) => NextButton::Generating,
            (true, false) => NextButton::SeeResults,
        })
    } else {
        None
    };

    let counting = session.timer_token().is_some();

    Some(QuestionView {
        number: session.current_index() + 1,
        text: question.text().into(),
        choices,
        time_left: if counting {
            Some(session.time_left())
        } else {
            None
        },
        urgent: counting && session.time_left() <= URGENT_SECONDS,
        hint: if session.hint_visible() {
            Some(question.hint().into())
        } else {
            None
        },
        can_show_hint: counting && !session.hint_visible(),
        verdict,
        explanation: if revealed {
            Some(question.explanation().into())
        } else {
            None
        },
        next,
    })
}

fn result_view(session: &Session) -> ResultView {
    let percentage = session.percentage();

    let review = session
        .questions()
        .iter()
        .enumerate()
        .map(|(index, question)| {
            let correct = session
                .answers()
                .iter()
                .any(|answer| answer.question_index == index && answer.is_correct);

            ReviewRow {
                excerpt: excerpt(question.text()),
                correct,
                correct_answer: if correct {
                    None
                } else {
                    Some(question.correct_choice().into())
                },
            }
        })
        .collect();

    ResultView {
        percentage,
        score: session.score(),
        total: session.total_questions(),
        feedback: Feedback::for_percentage(percentage),
        review,
    }
}

fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.into(),
    }
}

//! Quiz session state machine.
//!
//! A [`Session`] moves through `Home → Config → Quiz → Result`. While on the
//! quiz screen every question cycles `Generating → Answering → Revealed`.
//! Each user or runtime event maps to one method; none of them perform I/O.
//! Work the runtime has to carry out (generating the next question, running
//! the countdown) is expressed through [`GenerationRequest`] return values
//! and [`Session::timer_token`].
//!
//! Results of work started for an earlier run are recognised by their
//! [`GenerationTicket`] or [`TimerToken`] and dropped.

use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::generator::GenerationError;
use crate::models::{
    AnswerRecord, Catalog, ConfigDraft, Level, Question, QuizConfig, Selection, CHOICE_COUNT,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Home,
    Config,
    Quiz,
    Result,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// The current question has not arrived yet.
    Generating,
    /// The question is shown and the countdown runs.
    Answering,
    /// The answer is locked in; correct choice and explanation are shown.
    Revealed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GenerationTicket {
    pub attempt: u64,
    pub index: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
    pub ticket: GenerationTicket,
    pub subject_label: String,
    pub level_label: String,
    pub topic: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub attempt: u64,
    pub question: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("`{action}` is not available on the {screen:?} screen")]
    InvalidTransition { action: &'static str, screen: Screen },

    #[error("choose a subject before starting")]
    MissingSubject,

    #[error("choose a level before starting")]
    MissingLevel,

    #[error("unknown subject `{0}`")]
    UnknownSubject(String),

    #[error("question count must be positive")]
    InvalidQuestionCount,

    #[error("choice {0} does not exist")]
    ChoiceOutOfRange(usize),
}

#[derive(Debug)]
pub struct Session {
    catalog: Arc<Catalog>,
    screen: Screen,
    draft: ConfigDraft,
    active: Option<QuizConfig>,
    questions: Vec<Question>,
    answers: Vec<AnswerRecord>,
    current: usize,
    phase: Phase,
    time_left: u32,
    hint_visible: bool,
    generating: bool,
    failure: Option<String>,
    attempt: u64,
}

impl Session {
    pub fn new(catalog: Arc<Catalog>) -> Session {
        let draft = ConfigDraft::new(&catalog);
        let time_left = catalog.time_limit;

        Session {
            catalog,
            screen: Screen::Home,
            draft,
            active: None,
            questions: Vec::new(),
            answers: Vec::new(),
            current: 0,
            phase: Phase::Generating,
            time_left,
            hint_visible: false,
            generating: false,
            failure: None,
            attempt: 0,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn draft(&self) -> &ConfigDraft {
        &self.draft
    }

    pub fn config(&self) -> Option<&QuizConfig> {
        self.active.as_ref()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    pub fn current_answer(&self) -> Option<&AnswerRecord> {
        self.answers
            .iter()
            .find(|answer| answer.question_index == self.current)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn hint_visible(&self) -> bool {
        self.hint_visible
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn can_start(&self) -> bool {
        self.draft.subject.is_some() && self.draft.level.is_some()
    }

    /// Whether a generation result for `ticket` would still be accepted.
    pub fn is_current(&self, ticket: GenerationTicket) -> bool {
        self.screen == Screen::Quiz
            && self.generating
            && self.failure.is_none()
            && ticket.attempt == self.attempt
            && ticket.index == self.questions.len()
    }

    pub fn timer_token(&self) -> Option<TimerToken> {
        if self.screen == Screen::Quiz && self.failure.is_none() && self.phase == Phase::Answering
        {
            Some(TimerToken {
                attempt: self.attempt,
                question: self.current,
            })
        } else {
            None
        }
    }

    pub fn score(&self) -> usize {
        self.answers.iter().filter(|answer| answer.is_correct).count()
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    /// Score as a whole percentage, rounded half up.
    pub fn percentage(&self) -> u32 {
        let total = self.total_questions();
        if total == 0 {
            return 0;
        }

        ((200 * self.score() + total) / (2 * total)) as u32
    }

    fn ensure(&self, action: &'static str, allowed: &[Screen]) -> Result<(), SessionError> {
        if allowed.contains(&self.screen) {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                action,
                screen: self.screen,
            })
        }
    }

    pub fn open_config(&mut self) -> Result<(), SessionError> {
        match self.screen {
            Screen::Home | Screen::Result => {}
            Screen::Quiz if self.failure.is_some() => self.discard_run(),
            screen => {
                return Err(SessionError::InvalidTransition {
                    action: "open_config",
                    screen,
                })
            }
        }

        self.screen = Screen::Config;
        Ok(())
    }

    pub fn choose_subject(&mut self, id: &str) -> Result<(), SessionError> {
        self.ensure("choose_subject", &[Screen::Config])?;

        if self.catalog.subject(id).is_none() {
            return Err(SessionError::UnknownSubject(id.into()));
        }

        self.draft.subject = Some(id.into());
        Ok(())
    }

    pub fn choose_level(&mut self, level: Level) -> Result<(), SessionError> {
        self.ensure("choose_level", &[Screen::Config])?;

        self.draft.level = Some(level);
        Ok(())
    }

    pub fn set_topic(&mut self, topic: impl Into<String>) -> Result<(), SessionError> {
        self.ensure("set_topic", &[Screen::Config])?;

        self.draft.topic = topic.into();
        Ok(())
    }

    pub fn set_question_count(&mut self, count: usize) -> Result<(), SessionError> {
        self.ensure("set_question_count", &[Screen::Config])?;

        if count == 0 {
            return Err(SessionError::InvalidQuestionCount);
        }

        self.draft.question_count = count;
        Ok(())
    }

    pub fn start_quiz(&mut self) -> Result<GenerationRequest, SessionError> {
        self.ensure("start_quiz", &[Screen::Config])?;
        self.begin()
    }

    pub fn restart(&mut self) -> Result<GenerationRequest, SessionError> {
        self.ensure("restart", &[Screen::Result])?;
        self.begin()
    }

    pub fn edit_config(&mut self) -> Result<(), SessionError> {
        self.ensure("edit_config", &[Screen::Result])?;

        self.screen = Screen::Config;
        Ok(())
    }

    /// Back to the start. Leaving from the result screen forgets the
    /// configuration as well; leaving from the config screen keeps the draft.
    pub fn go_home(&mut self) -> Result<(), SessionError> {
        self.ensure("go_home", &[Screen::Config, Screen::Result])?;

        if self.screen == Screen::Result {
            self.draft = ConfigDraft::new(&self.catalog);
        }
        self.discard_run();
        self.screen = Screen::Home;
        Ok(())
    }

    pub fn question_generated(
        &mut self,
        ticket: GenerationTicket,
        question: Question,
    ) -> Option<GenerationRequest> {
        if !self.is_current(ticket) {
            debug!("dropping stale question {:?}", ticket);
            return None;
        }

        self.questions.push(question);

        if self.phase == Phase::Generating && self.current < self.questions.len() {
            self.enter_answering();
        }

        let config = self.active.as_ref()?;
        let generated = self.questions.len();

        if generated < config.question_count {
            Some(self.request(config, generated))
        } else {
            info!("generated all {} questions", generated);
            self.generating = false;
            None
        }
    }

    /// Aborts the run. The questions generated so far stay on screen but the
    /// quiz cannot progress; leaving through [`Session::open_config`] discards
    /// them.
    pub fn generation_failed(&mut self, ticket: GenerationTicket, error: &GenerationError) {
        if !self.is_current(ticket) {
            debug!("dropping stale failure {:?}: {}", ticket, error);
            return;
        }

        info!("aborting quiz at question {}: {}", ticket.index + 1, error);
        self.generating = false;
        self.failure = Some(error.user_message());
    }

    /// One countdown unit elapsed. Returns the timeout record when the
    /// countdown hits zero.
    pub fn tick(&mut self, token: TimerToken) -> Option<AnswerRecord> {
        if self.timer_token() != Some(token) {
            return None;
        }

        self.time_left = self.time_left.saturating_sub(1);
        if self.time_left == 0 {
            return self.submit(Selection::TimedOut);
        }

        None
    }

    /// Locks in a choice for the current question. Selecting again after the
    /// answer is revealed does nothing.
    pub fn select(&mut self, index: usize) -> Result<Option<AnswerRecord>, SessionError> {
        self.ensure("select", &[Screen::Quiz])?;

        if index >= CHOICE_COUNT {
            return Err(SessionError::ChoiceOutOfRange(index));
        }

        if self.phase != Phase::Answering || self.failure.is_some() {
            return Ok(None);
        }

        Ok(self.submit(Selection::Choice(index)))
    }

    pub fn show_hint(&mut self) -> bool {
        if self.timer_token().is_none() {
            return false;
        }

        self.hint_visible = true;
        true
    }

    pub fn advance(&mut self) -> Result<(), SessionError> {
        self.ensure("advance", &[Screen::Quiz])?;

        if self.phase != Phase::Revealed || self.failure.is_some() {
            return Err(SessionError::InvalidTransition {
                action: "advance",
                screen: self.screen,
            });
        }

        let next = self.current + 1;
        if next < self.questions.len() {
            self.current = next;
            self.enter_answering();
        } else if self.generating {
            self.current = next;
            self.phase = Phase::Generating;
            self.reset_transient();
        } else {
            info!("quiz finished: {} / {}", self.score(), self.total_questions());
            self.screen = Screen::Result;
        }

        Ok(())
    }

    fn begin(&mut self) -> Result<GenerationRequest, SessionError> {
        let subject = self
            .draft
            .subject
            .clone()
            .ok_or(SessionError::MissingSubject)?;
        let level = self.draft.level.ok_or(SessionError::MissingLevel)?;

        let config = QuizConfig {
            subject,
            level,
            topic: self.draft.topic.clone(),
            question_count: self.draft.question_count,
        };

        self.discard_run();
        let request = self.request(&config, 0);

        info!(
            "starting quiz: {} / {} x{}",
            config.subject, config.level, config.question_count
        );
        self.active = Some(config);
        self.generating = true;
        self.screen = Screen::Quiz;

        Ok(request)
    }

    fn request(&self, config: &QuizConfig, index: usize) -> GenerationRequest {
        let subject_label = self
            .catalog
            .subject(&config.subject)
            .map(|subject| subject.label.clone())
            .unwrap_or_else(|| config.subject.clone());

        GenerationRequest {
            ticket: GenerationTicket {
                attempt: self.attempt,
                index,
            },
            subject_label,
            level_label: self.catalog.level_label(config.level),
            topic: config.topic.clone(),
        }
    }

    fn submit(&mut self, selection: Selection) -> Option<AnswerRecord> {
        let question = self.questions.get(self.current)?;
        let record = AnswerRecord::new(self.current, selection, question);

        debug!("question {} answered: {:?}", self.current + 1, record);
        self.answers.push(record);
        self.phase = Phase::Revealed;

        Some(record)
    }

    fn enter_answering(&mut self) {
        self.phase = Phase::Answering;
        self.reset_transient();
    }

    fn reset_transient(&mut self) {
        self.time_left = self.catalog.time_limit;
        self.hint_visible = false;
    }

    /// Drops everything belonging to the current run. Bumping the attempt
    /// makes any in-flight generation or countdown stale.
    fn discard_run(&mut self) {
        self.attempt += 1;
        self.active = None;
        self.questions.clear();
        self.answers.clear();
        self.current = 0;
        self.phase = Phase::Generating;
        self.generating = false;
        self.failure = None;
        self.reset_transient();
    }
}

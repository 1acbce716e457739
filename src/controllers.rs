use log::{debug, info, warn};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{self, Instant, Interval, MissedTickBehavior},
};

use crate::generator::{Completion, GenerationError, QuestionGenerator};
use crate::models::{Catalog, Level, Question};
use crate::session::{GenerationRequest, GenerationTicket, Session, SessionError, TimerToken};
use crate::views::{self, View};

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    OpenConfig,
    ChooseSubject(String),
    ChooseLevel(Level),
    SetTopic(String),
    SetQuestionCount(usize),
    StartQuiz,
    Select(usize),
    ShowHint,
    Advance,
    Restart,
    EditConfig,
    GoHome,
}

type Generated = Result<Question, GenerationError>;

struct InFlight {
    ticket: GenerationTicket,
    handle: JoinHandle<Generated>,
}

struct Countdown {
    token: TimerToken,
    interval: Interval,
}

/// Drives a [`Session`]: runs generation one question at a time, keeps the
/// countdown in step with the current question and publishes a [`View`]
/// after every change.
///
/// All state lives on the task running [`QuizController::run`]; the outside
/// world only sends [`Command`]s and watches views.
pub struct QuizController<C> {
    session: Session,
    generator: Arc<QuestionGenerator<C>>,
    tick: Duration,
    in_flight: Option<InFlight>,
    countdown: Option<Countdown>,
    views: watch::Sender<View>,
}

impl<C: Completion> QuizController<C> {
    pub fn new(
        catalog: Arc<Catalog>,
        generator: QuestionGenerator<C>,
    ) -> (QuizController<C>, watch::Receiver<View>) {
        let session = Session::new(catalog);
        let (views, receiver) = watch::channel(views::render(&session));

        let controller = QuizController {
            session,
            generator: Arc::new(generator),
            tick: DEFAULT_TICK,
            in_flight: None,
            countdown: None,
            views,
        };

        (controller, receiver)
    }

    pub fn with_tick(mut self, tick: Duration) -> QuizController<C> {
        self.tick = tick;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> Session {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some((ticket, generated)) = join(&mut self.in_flight) => {
                    self.finish_generation(ticket, generated);
                }
                Some(token) = next_tick(&mut self.countdown) => {
                    if let Some(record) = self.session.tick(token) {
                        info!("question {} timed out", record.question_index + 1);
                    }
                }
            }

            self.sync();
            self.publish();
        }

        if let Some(in_flight) = self.in_flight.take() {
            in_flight.handle.abort();
        }

        self.session
    }

    pub fn handle(&mut self, command: Command) {
        debug!("command: {:?}", command);

        let session = &mut self.session;
        let outcome: Result<Option<GenerationRequest>, SessionError> = match command {
            Command::OpenConfig => session.open_config().map(|()| None),
            Command::ChooseSubject(id) => session.choose_subject(&id).map(|()| None),
            Command::ChooseLevel(level) => session.choose_level(level).map(|()| None),
            Command::SetTopic(topic) => session.set_topic(topic).map(|()| None),
            Command::SetQuestionCount(count) => session.set_question_count(count).map(|()| None),
            Command::StartQuiz => session.start_quiz().map(Some),
            Command::Select(index) => session.select(index).map(|_record| None),
            Command::ShowHint => {
                session.show_hint();
                Ok(None)
            }
            Command::Advance => session.advance().map(|()| None),
            Command::Restart => session.restart().map(Some),
            Command::EditConfig => session.edit_config().map(|()| None),
            Command::GoHome => session.go_home().map(|()| None),
        };

        match outcome {
            Ok(Some(request)) => self.spawn_generation(request),
            Ok(None) => {}
            Err(err) => warn!("command rejected: {}", err),
        }
    }

    fn finish_generation(&mut self, ticket: GenerationTicket, generated: Generated) {
        match generated {
            Ok(question) => {
                if let Some(next) = self.session.question_generated(ticket, question) {
                    self.spawn_generation(next);
                }
            }
            Err(err) => self.session.generation_failed(ticket, &err),
        }
    }

    fn spawn_generation(&mut self, request: GenerationRequest) {
        if let Some(previous) = self.in_flight.take() {
            previous.handle.abort();
        }

        let generator = Arc::clone(&self.generator);
        let ticket = request.ticket;
        debug!("generating question {} (attempt {})", ticket.index + 1, ticket.attempt);

        let handle = tokio::spawn(async move {
            generator
                .generate(&request.subject_label, &request.level_label, &request.topic)
                .await
        });

        self.in_flight = Some(InFlight { ticket, handle });
    }

    /// Cancels work the session no longer wants and re-arms the countdown
    /// when the current question changed.
    fn sync(&mut self) {
        let stale = self
            .in_flight
            .as_ref()
            .map_or(false, |in_flight| !self.session.is_current(in_flight.ticket));

        if stale {
            if let Some(in_flight) = self.in_flight.take() {
                debug!("cancelling generation {:?}", in_flight.ticket);
                in_flight.handle.abort();
            }
        }

        let wanted = self.session.timer_token();
        let armed = self.countdown.as_ref().map(|countdown| countdown.token);

        if wanted != armed {
            self.countdown = wanted.map(|token| {
                let mut interval = time::interval_at(Instant::now() + self.tick, self.tick);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Countdown { token, interval }
            });
        }
    }

    fn publish(&self) {
        self.views.send_replace(views::render(&self.session));
    }
}

async fn join(in_flight: &mut Option<InFlight>) -> Option<(GenerationTicket, Generated)> {
    let running = in_flight.as_mut()?;
    let joined = (&mut running.handle).await;
    let ticket = running.ticket;
    *in_flight = None;

    match joined {
        Ok(generated) => Some((ticket, generated)),
        Err(err) => Some((ticket, Err(GenerationError::Task(err)))),
    }
}

async fn next_tick(countdown: &mut Option<Countdown>) -> Option<TimerToken> {
    let countdown = countdown.as_mut()?;
    countdown.interval.tick().await;

    Some(countdown.token)
}

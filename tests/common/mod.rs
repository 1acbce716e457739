#![allow(dead_code)]

use ai_quiz::{
    generator::{Completion, GenerationError},
    models::{Catalog, CompletionRequest, Question},
    parser,
    views::View,
};
use async_trait::async_trait;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::sync::watch;

pub fn catalog() -> Arc<Catalog> {
    Arc::new(Catalog::builtin().expect("builtin catalog should load"))
}

pub fn question_json(n: usize, answer: usize) -> String {
    format!(
        r#"{{"question": "Question {}", "choices": ["first", "second", "third", "fourth"], "answer": {}, "explanation": "Explanation {}", "hint": "Hint {}"}}"#,
        n, answer, n, n
    )
}

pub fn question(n: usize, answer: usize) -> Question {
    parser::parse(&question_json(n, answer)).expect("fixture question should parse")
}

/// One canned completion outcome.
#[derive(Clone, Debug)]
pub enum Reply {
    /// A fenced, valid question whose correct choice is the given index.
    Question(usize),
    /// Text the parser cannot use.
    Garbage,
    /// Provider failure with status and message.
    Upstream(u16, &'static str),
}

/// Completion stub that plays back replies in order, optionally after a
/// delay, and records how many calls ran at once.
pub struct Scripted {
    replies: Mutex<VecDeque<Reply>>,
    delay: Duration,
    calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl Scripted {
    pub fn new(replies: Vec<Reply>) -> Arc<Scripted> {
        Scripted::delayed(replies, Duration::ZERO)
    }

    pub fn delayed(replies: Vec<Reply>, delay: Duration) -> Arc<Scripted> {
        Arc::new(Scripted {
            replies: Mutex::new(replies.into()),
            delay,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Completion for Scripted {
    async fn complete(&self, request: CompletionRequest) -> Result<String, GenerationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Garbage);

        match reply {
            Reply::Question(answer) => Ok(format!("```json\n{}\n```", question_json(call + 1, answer))),
            Reply::Garbage => Ok("Sorry, I can't do that.".into()),
            Reply::Upstream(status, message) => Err(GenerationError::UpstreamApi {
                status,
                message: message.into(),
            }),
        }
    }
}

/// Waits until `pick` finds something in the latest view.
pub async fn wait_for<T>(
    views: &mut watch::Receiver<View>,
    mut pick: impl FnMut(&View) -> Option<T>,
) -> T {
    loop {
        if let Some(found) = pick(&views.borrow_and_update()) {
            return found;
        }
        views.changed().await.expect("controller stopped");
    }
}

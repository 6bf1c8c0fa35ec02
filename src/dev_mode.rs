//! Development mode utilities for working without live APIs
//!
//! When the public endpoints are unavailable or rate-limiting, use this
//! module to replay a recorded TVL series through the normal fetcher, and
//! to script source behaviour in tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use crate::ingest::ValueSource;
use crate::model::FetchError;
use crate::retry::Sleeper;

// ---------------------------------------------------------------------------
// Scripted source
// ---------------------------------------------------------------------------

enum Script {
    /// Same answer forever.
    Repeat(Result<f64, FetchError>),
    /// One answer per call; errors once drained.
    Sequence(RefCell<VecDeque<Result<f64, FetchError>>>),
    /// Loops over the values forever.
    Cycle { values: Vec<f64>, next: Cell<usize> },
}

/// A `ValueSource` whose answers are fixed up front.
pub struct ScriptedSource {
    name: String,
    script: Script,
    calls: Rc<Cell<usize>>,
}

impl ScriptedSource {
    fn with_script(name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            script,
            calls: Rc::new(Cell::new(0)),
        }
    }

    pub fn always(name: &str, value: f64) -> Self {
        Self::with_script(name, Script::Repeat(Ok(value)))
    }

    pub fn failing(name: &str, err: FetchError) -> Self {
        Self::with_script(name, Script::Repeat(Err(err)))
    }

    pub fn sequence(name: &str, answers: Vec<Result<f64, FetchError>>) -> Self {
        Self::with_script(name, Script::Sequence(RefCell::new(answers.into())))
    }

    pub fn cycling(name: &str, values: Vec<f64>) -> Self {
        Self::with_script(
            name,
            Script::Cycle {
                values,
                next: Cell::new(0),
            },
        )
    }

    /// Shared call counter; stays readable after the source is boxed.
    pub fn calls_handle(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.calls)
    }
}

impl ValueSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self) -> Result<f64, FetchError> {
        self.calls.set(self.calls.get() + 1);
        match &self.script {
            Script::Repeat(answer) => answer.clone(),
            Script::Sequence(answers) => answers
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Http("script exhausted".to_string()))),
            Script::Cycle { values, next } => {
                if values.is_empty() {
                    return Err(FetchError::Http("empty replay series".to_string()));
                }
                let i = next.get();
                next.set((i + 1) % values.len());
                Ok(values[i])
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Sleepers
// ---------------------------------------------------------------------------

/// Records requested waits instead of blocking.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.borrow().clone()
    }

    pub fn total(&self) -> Duration {
        self.waits.borrow().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.waits.borrow_mut().push(duration);
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// Configuration for development mode data replay
#[derive(Debug)]
pub struct DevMode {
    /// TVL values replayed in order, looping at the end.
    pub values: Vec<f64>,
}

impl DevMode {
    /// Parses one value per line. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut values = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let value: f64 = line
                .parse()
                .map_err(|_| format!("line {}: '{}' is not a number", i + 1, line))?;
            values.push(value);
        }
        if values.is_empty() {
            return Err("replay series is empty".to_string());
        }
        Ok(Self { values })
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        Self::parse(&text)
    }

    /// A source that replays the series under `name`.
    pub fn into_source(self, name: &str) -> ScriptedSource {
        ScriptedSource::cycling(name, self.values)
    }
}

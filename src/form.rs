use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    #[default]
    Neutral,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Status {
    message: String,
    severity: Severity,
}

impl Status {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Status {
            message: message.into(),
            severity,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }
}

/// Which element of the form receives keystrokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    Credential,
    #[default]
    Input,
    Output,
    Submit,
    Clear,
    Copy,
}

impl Focus {
    const ORDER: [Focus; 6] = [
        Focus::Credential,
        Focus::Input,
        Focus::Output,
        Focus::Submit,
        Focus::Clear,
        Focus::Copy,
    ];

    fn position(self) -> usize {
        Self::ORDER.iter().position(|f| *f == self).unwrap_or(0)
    }

    pub fn next(self) -> Focus {
        Self::ORDER[(self.position() + 1) % Self::ORDER.len()]
    }

    pub fn prev(self) -> Focus {
        let len = Self::ORDER.len();
        Self::ORDER[(self.position() + len - 1) % len]
    }
}

/// In-flight marker shared between the form and a running submission.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns `None` when a submission is already outstanding.
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BusyGuard(self.0.clone()))
    }
}

/// Clears the busy flag when dropped, whichever way the submission ended.
#[derive(Debug)]
pub struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Typed state behind the form. Rendering surfaces only read from it; the
/// controller is the only writer.
#[derive(Debug, Default)]
pub struct FormView {
    credential: String,
    input: String,
    output: String,
    status: Status,
    focus: Focus,
    busy: BusyFlag,
}

impl FormView {
    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_set()
    }

    pub fn busy_flag(&self) -> &BusyFlag {
        &self.busy
    }

    pub(crate) fn set_credential(&mut self, value: String) {
        self.credential = value;
    }

    pub(crate) fn set_input(&mut self, value: String) {
        self.input = value;
    }

    pub(crate) fn set_output(&mut self, value: String) {
        self.output = value;
    }

    pub(crate) fn set_status(&mut self, message: impl Into<String>, severity: Severity) {
        self.status = Status::new(message, severity);
    }

    pub(crate) fn set_focus(&mut self, focus: Focus) {
        self.focus = focus;
    }
}

use crate::clipboard::Clipboard;
use crate::form::{BusyGuard, Focus, FormView, Severity};
use crate::http::{CleanReply, CleanService, TransportError};
use crate::store::{CREDENTIAL_KEY, KeyValueStore, Persistence};

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::sync::Arc;

pub const MSG_MISSING_TOKEN: &str = "Bitte Token eingeben.";
pub const MSG_CLEAN_OK: &str = "Bereinigung erfolgreich.";
pub const MSG_SERVER_ERROR: &str = "Fehler";
pub const MSG_NETWORK_ERROR: &str = "Netzwerkfehler";
pub const MSG_COPY_OK: &str = "In Zwischenablage kopiert.";
pub const MSG_COPY_FAILED: &str = "Kopieren fehlgeschlagen.";

/// Control+Enter or Super(Command)+Enter, whatever element has focus.
pub fn is_submit_shortcut(key: &KeyEvent) -> bool {
    key.kind != KeyEventKind::Release
        && key.code == KeyCode::Enter
        && key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::SUPER)
}

/// A request that has been admitted and holds the busy flag until its
/// outcome is applied (or dropped).
pub struct Submission<S: ?Sized> {
    service: Arc<S>,
    token: String,
    text: String,
    guard: BusyGuard,
}

impl<S: CleanService + ?Sized> Submission<S> {
    pub async fn send(self) -> Settled {
        let result = self.service.clean(&self.token, &self.text).await;
        Settled {
            result,
            guard: self.guard,
        }
    }
}

pub struct Settled {
    result: Result<CleanReply, TransportError>,
    guard: BusyGuard,
}

pub struct FormController<S: ?Sized, K, C> {
    view: FormView,
    service: Arc<S>,
    store: Persistence<K>,
    clipboard: C,
}

impl<S, K, C> FormController<S, K, C>
where
    S: CleanService + ?Sized,
    K: KeyValueStore,
    C: Clipboard,
{
    /// Builds the form and restores the remembered credential, if any.
    pub fn new(service: Arc<S>, store: Persistence<K>, clipboard: C) -> Self {
        let mut view = FormView::default();
        if let Some(saved) = store.get(CREDENTIAL_KEY).filter(|s| !s.is_empty()) {
            tracing::debug!("restored stored credential");
            view.set_credential(saved);
        }
        FormController {
            view,
            service,
            store,
            clipboard,
        }
    }

    pub fn view(&self) -> &FormView {
        &self.view
    }

    pub fn set_credential(&mut self, value: impl Into<String>) {
        let value = value.into();
        self.store.set(CREDENTIAL_KEY, &value);
        self.view.set_credential(value);
    }

    pub fn set_input(&mut self, value: impl Into<String>) {
        self.view.set_input(value.into());
    }

    pub fn set_focus(&mut self, focus: Focus) {
        self.view.set_focus(focus);
    }

    /// Validates the form and admits a submission. Returns `None` when the
    /// credential is missing (status says so) or a request is already out.
    pub fn begin_submit(&mut self) -> Option<Submission<S>> {
        if self.view.is_busy() {
            tracing::debug!("submission ignored, request already in flight");
            return None;
        }
        self.view.set_status("", Severity::Neutral);

        let token = self.view.credential().trim().to_string();
        if token.is_empty() {
            self.view.set_status(MSG_MISSING_TOKEN, Severity::Error);
            return None;
        }

        let guard = self.view.busy_flag().try_acquire()?;
        tracing::debug!(chars = self.view.input().chars().count(), "submitting text");
        Some(Submission {
            service: self.service.clone(),
            token,
            text: self.view.input().to_string(),
            guard,
        })
    }

    pub fn finish_submit(&mut self, settled: Settled) {
        let Settled { result, guard: _busy } = settled;
        match result {
            Ok(reply) if reply.status().is_success() => {
                let clean = reply.body().clean().unwrap_or_default().to_string();
                self.view.set_output(clean);
                self.view.set_status(MSG_CLEAN_OK, Severity::Success);
                tracing::debug!(status = %reply.status(), "text cleaned");
            }
            Ok(reply) => {
                let detail = reply
                    .body()
                    .detail()
                    .unwrap_or_else(|| MSG_SERVER_ERROR.to_string());
                let code = reply.status().as_u16();
                tracing::warn!(code, %detail, "service rejected request");
                self.view
                    .set_status(format!("{code}: {detail}"), Severity::Error);
            }
            Err(e) => {
                let description = e.describe();
                tracing::warn!(error = %description, "request failed");
                self.view.set_status(
                    format!("{MSG_NETWORK_ERROR}: {description}"),
                    Severity::Error,
                );
            }
        }
    }

    pub async fn submit(&mut self) {
        if let Some(submission) = self.begin_submit() {
            let settled = submission.send().await;
            self.finish_submit(settled);
        }
    }

    pub fn clear(&mut self) {
        self.view.set_input(String::new());
        self.view.set_focus(Focus::Input);
    }

    pub fn copy(&mut self) {
        match self.clipboard.set_text(self.view.output()) {
            Ok(()) => self.view.set_status(MSG_COPY_OK, Severity::Success),
            Err(e) => {
                tracing::warn!(error = %e, "copy failed");
                self.view.set_status(MSG_COPY_FAILED, Severity::Error);
            }
        }
    }
}

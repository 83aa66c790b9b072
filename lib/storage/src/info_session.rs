//! State behind the model info dialog: one session per opened file.

use crate::error::{Result, StorageError};
use crate::model_info::{ModelInfo, ModelInfoService};
use draekz_core::{MessageType, UiMessage};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const LOADING_TITLE: &str = "Loading...";
pub const COPY_TOAST_TIMEOUT: Duration = Duration::from_millis(4000);

/// Tracks which session is on screen. Opening a session makes it the active
/// one; results that arrive for any other session are dropped.
#[derive(Debug)]
pub struct SessionTracker {
    active: AtomicU64,
    next: AtomicU64,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self {
            active: AtomicU64::new(0),
            next: AtomicU64::new(1),
        }
    }
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn begin(&self) -> u64 {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        self.active.store(id, Ordering::SeqCst);
        id
    }

    fn end(&self, id: u64) {
        let _ = self
            .active
            .compare_exchange(id, 0, Ordering::SeqCst, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_active(&self, id: u64) -> bool {
        id != 0 && self.active.load(Ordering::SeqCst) == id
    }
}

/// Rows of the info table the user can edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditableField {
    Name,
    StrengthMin,
    StrengthMax,
    UserNote,
}

impl EditableField {
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            EditableField::Name => "name",
            EditableField::StrengthMin => "strengthMin",
            EditableField::StrengthMax => "strengthMax",
            EditableField::UserNote => "userNote",
        }
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, EditableField::StrengthMin | EditableField::StrengthMax)
    }

    /// Converts what the user typed into the value to save. Strengths must
    /// parse as numbers and are rounded to two decimals.
    pub fn parse(&self, input: &str) -> Result<Value> {
        if !self.is_numeric() {
            return Ok(Value::String(input.to_string()));
        }
        let number: f64 = input
            .trim()
            .parse()
            .ok()
            .filter(|n: &f64| n.is_finite())
            .ok_or_else(|| StorageError::InvalidNumber(self.key().to_string()))?;
        Ok(json!(round2(number)))
    }
}

impl fmt::Display for EditableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

/// Reported when the dialog closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseDetail {
    /// True if any field was saved while the session was open.
    pub dirty: bool,
}

pub struct ModelInfoSession {
    id: u64,
    file: String,
    tracker: Arc<SessionTracker>,
    service: Arc<ModelInfoService>,
    info: Option<ModelInfo>,
    loaded: bool,
    dirty: bool,
}

impl ModelInfoSession {
    /// Starts a session for `file` and makes it the active one.
    pub fn new(service: Arc<ModelInfoService>, tracker: Arc<SessionTracker>, file: &str) -> Self {
        let id = tracker.begin();
        Self {
            id,
            file: file.to_string(),
            tracker,
            service,
            info: None,
            loaded: false,
            dirty: false,
        }
    }

    /// Starts a session and loads its info.
    pub async fn open(
        service: Arc<ModelInfoService>,
        tracker: Arc<SessionTracker>,
        file: &str,
    ) -> Result<Self> {
        let mut session = Self::new(service, tracker, file);
        session.load().await?;
        Ok(session)
    }

    #[inline]
    #[must_use]
    pub fn info(&self) -> Option<&ModelInfo> {
        self.info.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.tracker.is_active(self.id)
    }

    #[must_use]
    pub fn title(&self) -> &str {
        match (&self.info, self.loaded) {
            (_, false) => LOADING_TITLE,
            (Some(info), true) => info.display_title(),
            (None, true) => "Unknown",
        }
    }

    /// Fetches the info for the session's file. Returns false when the
    /// session stopped being active before the result arrived.
    pub async fn load(&mut self) -> Result<bool> {
        let info = self.service.get_info(&self.file, false, false).await?;
        Ok(self.accept(info))
    }

    /// Asks the server to look the model up again.
    pub async fn refresh(&mut self) -> Result<bool> {
        let file = self.info_file()?;
        let info = self.service.refresh_info(&file).await?;
        Ok(self.accept(info))
    }

    /// Drops all locally stored info for the file.
    pub async fn clear(&mut self) -> Result<bool> {
        let file = self.info_file()?;
        let info = self.service.clear_fetched_info(&file).await?;
        Ok(self.accept(info))
    }

    /// Saves an edited row. Returns true if the record was modified.
    pub async fn save_field(&mut self, field: EditableField, input: &str) -> Result<bool> {
        let file = self.info_file()?;
        let value = field.parse(input)?;
        let mut partial = serde_json::Map::new();
        partial.insert(field.key().to_string(), value);

        let saved = self
            .service
            .save_partial_info(&file, Value::Object(partial))
            .await?;
        self.dirty = true;
        tracing::debug!(%file, %field, "Saved model info field");
        if let Some(info) = saved {
            self.accept(Some(info));
        }
        Ok(true)
    }

    /// Text to put on the clipboard for the selected trained words, and the
    /// toast confirming it.
    #[must_use]
    pub fn copy_trained_words(&self, selected: &[&str]) -> (String, UiMessage) {
        let text = selected.join(", ");
        let plural = if selected.len() == 1 { "" } else { "s" };
        let message = UiMessage::transient(
            &format!("Successfully copied {} key word{plural}.", selected.len()),
            COPY_TOAST_TIMEOUT,
        )
        .with_type(MessageType::Success);
        (text, message)
    }

    pub fn close(self) -> CloseDetail {
        self.tracker.end(self.id);
        CloseDetail { dirty: self.dirty }
    }

    fn info_file(&self) -> Result<String> {
        self.info
            .as_ref()
            .and_then(|i| i.file.clone())
            .filter(|f| !f.is_empty())
            .ok_or(StorageError::MissingFile)
    }

    fn accept(&mut self, info: Option<ModelInfo>) -> bool {
        if !self.is_active() {
            tracing::debug!(file = %self.file, "Dropping model info for an inactive session");
            return false;
        }
        self.info = info;
        self.loaded = true;
        true
    }
}

impl fmt::Debug for ModelInfoSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelInfoSession")
            .field("id", &self.id)
            .field("file", &self.file)
            .field("loaded", &self.loaded)
            .field("dirty", &self.dirty)
            .finish()
    }
}

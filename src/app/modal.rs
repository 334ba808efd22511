//! The new/edit note dialog as an explicit state machine.

use crate::error::ClientResult;
use crate::store::{Note, NoteDraft, NoteId};

/// What the open dialog will do on save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditTarget {
    New,
    Edit(NoteId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Cancel,
    Backdrop,
    Escape,
    Saved,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModalState {
    target: Option<EditTarget>,
    title: String,
    content: String,
    is_public: bool,
}

impl ModalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.target.is_some()
    }

    pub fn edit_target(&self) -> Option<&EditTarget> {
        self.target.as_ref()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_public(&self) -> bool {
        self.is_public
    }

    pub fn heading(&self) -> &'static str {
        match self.target {
            Some(EditTarget::Edit(_)) => "Edit Note",
            _ => "New Note",
        }
    }

    pub fn open_for_create(&mut self) {
        self.reset();
        self.target = Some(EditTarget::New);
    }

    /// Resets first, then binds to the note only when it carries a usable
    /// id. Anything else leaves a blank new-note dialog.
    pub fn open_for_edit(&mut self, note: Option<&Note>) {
        self.open_for_create();
        let Some(note) = note.filter(|note| note.id.is_resolvable()) else {
            return;
        };
        self.target = Some(EditTarget::Edit(note.id.clone()));
        self.title = note.title.clone().unwrap_or_default();
        self.content = note.content.clone();
        self.is_public = note.is_public;
    }

    /// Returns false when the dialog was already closed.
    pub fn close(&mut self, reason: CloseReason) -> bool {
        if !self.is_open() {
            return false;
        }
        tracing::debug!(?reason, "closing note dialog");
        self.reset();
        true
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    pub fn set_public(&mut self, is_public: bool) {
        self.is_public = is_public;
    }

    /// Validated payload built from the current fields.
    pub fn draft(&self, with_visibility: bool) -> ClientResult<NoteDraft> {
        let draft = NoteDraft::new(&self.title, &self.content)?;
        Ok(if with_visibility {
            draft.with_visibility(self.is_public)
        } else {
            draft
        })
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

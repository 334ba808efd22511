use crate::session::{Credentials, Tab};
use crate::store::NoteId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Enter,
    Other(char),
}

/// Everything the host can ask the controller to do. Events are handled one
/// at a time, each to completion.
#[derive(Debug, Clone)]
pub enum UiEvent {
    NewNote,
    EditNote(NoteId),
    /// The host has already confirmed the deletion with the user.
    DeleteNote(NoteId),
    Cancel,
    BackdropClick,
    Key(Key),
    TitleInput(String),
    ContentInput(String),
    VisibilityInput(bool),
    Save,
    SelectTab(Tab),
    Login(Credentials),
    Register(Credentials),
    Logout,
}

impl UiEvent {
    /// Events that need a round trip to the store.
    pub fn touches_store(&self) -> bool {
        matches!(
            self,
            UiEvent::DeleteNote(_)
                | UiEvent::Save
                | UiEvent::SelectTab(_)
                | UiEvent::Login(_)
                | UiEvent::Register(_)
                | UiEvent::Logout
        )
    }
}

//! The controller that ties the session, the note dialog, the store and the
//! renderer together. Hosts feed it [`UiEvent`]s and show its [`ViewState`].

use crate::config::ClientMode;
use crate::error::ClientError;
use crate::session::{Credentials, Session, SessionStore, Tab};
use crate::store::{Authenticator, Filter, Note, NoteId, NoteStore};
use crate::ui::{self, NoteRenderer, RenderContext};

pub mod actions;
pub mod modal;
pub mod state;

pub use actions::{Key, UiEvent};
pub use modal::{CloseReason, EditTarget, ModalState};
pub use state::{Notice, NoticeLevel, ViewState};

pub const SESSION_EXPIRED: &str = "Your session has expired. Please log in again.";

pub struct NoteViewController<B> {
    mode: ClientMode,
    backend: B,
    session: Session,
    modal: ModalState,
    renderer: NoteRenderer,
    view: ViewState,
}

impl<B> NoteViewController<B>
where
    B: NoteStore + Authenticator,
{
    /// The only way to build a controller: restores the stored session and
    /// performs the first load.
    pub async fn init(
        mode: ClientMode,
        backend: B,
        sessions: SessionStore,
        renderer: NoteRenderer,
    ) -> Self {
        let session = Session::restore(sessions);
        let mut controller = Self {
            mode,
            backend,
            session,
            modal: ModalState::new(),
            renderer,
            view: ViewState::default(),
        };
        tracing::debug!(%mode, logged_in = controller.session.is_logged_in(), "controller ready");
        controller.reload().await;
        controller
    }

    pub fn mode(&self) -> ClientMode {
        self.mode
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn modal(&self) -> &ModalState {
        &self.modal
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.view.take_notices()
    }

    /// Notes currently on screen, in display order.
    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.renderer.notes()
    }

    pub fn lookup(&self, id: &NoteId) -> Option<&Note> {
        self.renderer.lookup(id)
    }

    pub fn can_modify(&self, note: &Note) -> bool {
        self.context().can_modify(note)
    }

    pub fn format_timestamp(&self, note: &Note) -> String {
        self.renderer.timestamp_style().format(note.created_at)
    }

    pub fn render_page(&self) -> String {
        ui::render_page(&self.context(), &self.modal, self.view.fragment())
    }

    pub async fn dispatch(&mut self, event: UiEvent) {
        tracing::debug!(?event, remote = event.touches_store(), "dispatching event");
        match event {
            UiEvent::NewNote => self.modal.open_for_create(),
            UiEvent::EditNote(id) => self.edit(&id),
            UiEvent::DeleteNote(id) => self.delete(&id).await,
            UiEvent::Cancel => {
                self.modal.close(CloseReason::Cancel);
            }
            UiEvent::BackdropClick => {
                self.modal.close(CloseReason::Backdrop);
            }
            UiEvent::Key(Key::Escape) => {
                self.modal.close(CloseReason::Escape);
            }
            UiEvent::Key(Key::Enter | Key::Other(_)) => {}
            UiEvent::TitleInput(title) if self.modal.is_open() => self.modal.set_title(title),
            UiEvent::ContentInput(content) if self.modal.is_open() => {
                self.modal.set_content(content)
            }
            UiEvent::VisibilityInput(is_public) if self.modal.is_open() => {
                self.modal.set_public(is_public)
            }
            UiEvent::TitleInput(_) | UiEvent::ContentInput(_) | UiEvent::VisibilityInput(_) => {
                tracing::debug!("ignoring input while the note dialog is closed");
            }
            UiEvent::Save => self.save().await,
            UiEvent::SelectTab(tab) => self.select_tab(tab).await,
            UiEvent::Login(credentials) => self.login(&credentials).await,
            UiEvent::Register(credentials) => self.register(&credentials).await,
            UiEvent::Logout => self.logout().await,
        }
    }

    /// Fetches the active feed and re-renders it. A rejected session on the
    /// mine feed logs the user out and falls back to one plaza load.
    pub async fn reload(&mut self) {
        let filter = self.filter();
        let result = self.backend.list(filter, self.session.token()).await;
        match result {
            Ok(notes) => self.show(notes),
            Err(err) if err.is_auth() && self.mode.uses_accounts() => {
                tracing::warn!(error = %err, "mine feed rejected the session");
                self.forget_session();
                self.view.push(Notice::error(SESSION_EXPIRED));
                let fallback = self.backend.list(Filter::Public, None).await;
                match fallback {
                    Ok(notes) => self.show(notes),
                    Err(err) => self.show_load_error(&err),
                }
            }
            Err(err) => self.show_load_error(&err),
        }
    }

    fn filter(&self) -> Filter {
        if self.mode.uses_accounts() {
            self.session.active_tab().filter()
        } else {
            Filter::Public
        }
    }

    pub fn context(&self) -> RenderContext<'_> {
        RenderContext {
            session: &self.session,
            mode: self.mode,
        }
    }

    fn show(&mut self, notes: Vec<Note>) {
        tracing::debug!(count = notes.len(), "rendering notes");
        let ctx = RenderContext {
            session: &self.session,
            mode: self.mode,
        };
        let fragment = self.renderer.render(notes, &ctx);
        self.view.set_fragment(fragment);
    }

    fn show_load_error(&mut self, err: &ClientError) {
        let message = failure("load notes", err);
        let ctx = RenderContext {
            session: &self.session,
            mode: self.mode,
        };
        let fragment = self.renderer.render_error(&message, &ctx);
        self.view.set_fragment(fragment);
        self.view.push(Notice::error(message));
    }

    fn edit(&mut self, id: &NoteId) {
        let note = self.renderer.lookup(id).cloned();
        match &note {
            Some(note) if !self.context().can_modify(note) => {
                self.view.push(Notice::error("You can only edit your own notes."));
                return;
            }
            Some(_) => {}
            None => tracing::warn!(%id, "edit requested for a note that is not on screen"),
        }
        self.modal.open_for_edit(note.as_ref());
    }

    async fn save(&mut self) {
        let Some(target) = self.modal.edit_target().cloned() else {
            tracing::debug!("save requested with the note dialog closed");
            return;
        };
        let draft = match self.modal.draft(self.mode.uses_accounts()) {
            Ok(draft) => draft,
            Err(err) => {
                self.view.push(Notice::error(err.to_string()));
                return;
            }
        };
        if self.mode.uses_accounts() && !self.session.is_logged_in() {
            self.view.push(Notice::error(ClientError::LoginRequired.to_string()));
            return;
        }

        let token = self.session.token();
        let (action, result) = match &target {
            EditTarget::New => ("save note", self.backend.create(&draft, token).await),
            EditTarget::Edit(id) => ("update note", self.backend.update(id, &draft, token).await),
        };
        match result {
            Ok(note) => {
                tracing::info!(id = %note.id, "note saved");
                self.modal.close(CloseReason::Saved);
                self.reload().await;
            }
            Err(err) => self.view.push(Notice::error(failure(action, &err))),
        }
    }

    async fn delete(&mut self, id: &NoteId) {
        if self.mode.uses_accounts() && !self.session.is_logged_in() {
            self.view.push(Notice::error(ClientError::LoginRequired.to_string()));
            return;
        }
        // Ids that are not on screen go to the backend, which owns the final say.
        if let Some(note) = self.renderer.lookup(id) {
            if !self.context().can_modify(note) {
                self.view.push(Notice::error("You can only delete your own notes."));
                return;
            }
        }
        let result = self.backend.delete(id, self.session.token()).await;
        match result {
            Ok(()) => {
                tracing::info!(%id, "note deleted");
                self.reload().await;
            }
            Err(err) => self.view.push(Notice::error(failure("delete note", &err))),
        }
    }

    async fn select_tab(&mut self, tab: Tab) {
        if !self.mode.uses_accounts() {
            self.view.push(Notice::info("Tabs are only available with accounts."));
            return;
        }
        match self.session.select_tab(tab) {
            Ok(()) => self.reload().await,
            Err(err) => self.view.push(Notice::error(err.to_string())),
        }
    }

    async fn login(&mut self, credentials: &Credentials) {
        if let Err(err) = credentials.validate() {
            self.view.push(Notice::error(err.to_string()));
            return;
        }
        let grant = match self.backend.login(credentials).await {
            Ok(grant) => grant,
            Err(err) => {
                self.view.push(Notice::error(failure("log in", &err)));
                return;
            }
        };
        let username = grant.user.username.clone();
        if let Err(err) = self.session.log_in(grant) {
            self.view.push(Notice::error(failure("log in", &err)));
            return;
        }
        self.view.push(Notice::info(format!("Logged in as {username}.")));
        self.reload().await;
    }

    async fn register(&mut self, credentials: &Credentials) {
        if let Err(err) = credentials.validate() {
            self.view.push(Notice::error(err.to_string()));
            return;
        }
        match self.backend.register(credentials).await {
            Ok(()) => self.view.push(Notice::info(format!(
                "Registered {}. Please log in.",
                credentials.username()
            ))),
            Err(err) => self.view.push(Notice::error(failure("register", &err))),
        }
    }

    async fn logout(&mut self) {
        if self.forget_session() {
            self.view.push(Notice::info("Logged out."));
        }
        self.reload().await;
    }

    /// Logs out, reporting a stored session that could not be removed.
    fn forget_session(&mut self) -> bool {
        match self.session.log_out() {
            Ok(was_logged_in) => was_logged_in,
            Err(err) => {
                self.view.push(Notice::error(format!(
                    "Failed to forget the stored session: {err:#}"
                )));
                false
            }
        }
    }
}

/// User-facing text for a failed operation. Server messages and input
/// problems are shown as they are; everything else names the action.
fn failure(action: &str, err: &ClientError) -> String {
    match err {
        ClientError::Rejected { message, .. } => message.clone(),
        ClientError::Validation(_) | ClientError::LoginRequired | ClientError::Unsupported(_) => {
            err.to_string()
        }
        other => format!("Failed to {action}: {other}"),
    }
}

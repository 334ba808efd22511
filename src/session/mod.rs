//! Who is logged in, which feed is showing, and the durable copy of the login.

use std::fmt;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::{ClientError, ClientResult};
use crate::storage::StorageHandle;
use crate::store::{Filter, Note, UserId};

pub const TOKEN_KEY: &str = "auth_token";
pub const USER_KEY: &str = "current_user";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

/// Opaque bearer token issued by the backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken([REDACTED])")
    }
}

#[derive(Clone, Serialize)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.trim().to_string(),
            password: password.to_string(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(ClientError::Validation("username and password are required"));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Successful `/login` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginGrant {
    pub token: AuthToken,
    pub user: User,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Tab {
    /// Everyone's public notes.
    #[default]
    Plaza,
    /// The logged-in user's notes, any visibility.
    Mine,
}

impl Tab {
    pub fn filter(self) -> Filter {
        match self {
            Tab::Plaza => Filter::Public,
            Tab::Mine => Filter::Mine,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    LoggedOut,
    LoggedIn { user: User, token: AuthToken },
}

/// Durable half of the session: one token entry and one JSON user entry,
/// always written and cleared together.
#[derive(Debug, Clone)]
pub struct SessionStore {
    storage: StorageHandle,
}

impl SessionStore {
    pub fn new(storage: StorageHandle) -> Self {
        Self { storage }
    }

    pub fn load(&self) -> Result<Option<(User, AuthToken)>> {
        let token = self.storage.get_item(TOKEN_KEY)?;
        let user = self.storage.get_item(USER_KEY)?;
        match (token, user) {
            (None, None) => Ok(None),
            (Some(token), Some(user)) => {
                if token.trim().is_empty() {
                    bail!("stored auth token is blank");
                }
                let user: User =
                    serde_json::from_str(&user).context("parsing stored user identity")?;
                if !user.id.is_resolvable() || user.username.trim().is_empty() {
                    bail!("stored user identity is incomplete");
                }
                Ok(Some((user, AuthToken::new(token))))
            }
            _ => bail!("stored session has only one of token and user"),
        }
    }

    pub fn save(&self, user: &User, token: &AuthToken) -> Result<()> {
        let user = serde_json::to_string(user).context("serializing user identity")?;
        self.storage
            .set_items(&[(TOKEN_KEY, token.expose()), (USER_KEY, user.as_str())])
            .context("persisting session")
    }

    pub fn clear(&self) -> Result<()> {
        self.storage
            .remove_items(&[TOKEN_KEY, USER_KEY])
            .context("clearing persisted session")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    auth: AuthState,
    active_tab: Tab,
    store: SessionStore,
}

impl Session {
    /// Starts logged in only when both durable entries are present and
    /// well-formed. Anything else is cleared and treated as logged out.
    pub fn restore(store: SessionStore) -> Self {
        let auth = match store.load() {
            Ok(Some((user, token))) => {
                tracing::info!(user = %user.username, "restored session");
                AuthState::LoggedIn { user, token }
            }
            Ok(None) => AuthState::LoggedOut,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "discarding unreadable stored session");
                if let Err(err) = store.clear() {
                    tracing::warn!(error = %format!("{err:#}"), "failed to clear stored session");
                }
                AuthState::LoggedOut
            }
        };
        Self {
            auth,
            active_tab: Tab::Plaza,
            store,
        }
    }

    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    pub fn current_user(&self) -> Option<&User> {
        match &self.auth {
            AuthState::LoggedIn { user, .. } => Some(user),
            AuthState::LoggedOut => None,
        }
    }

    pub fn token(&self) -> Option<&AuthToken> {
        match &self.auth {
            AuthState::LoggedIn { token, .. } => Some(token),
            AuthState::LoggedOut => None,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self.auth, AuthState::LoggedIn { .. })
    }

    pub fn active_tab(&self) -> Tab {
        self.active_tab
    }

    /// True when the current user is the note's owner.
    pub fn owns(&self, note: &Note) -> bool {
        match (self.current_user(), note.owner_id.as_ref()) {
            (Some(user), Some(owner)) => &user.id == owner,
            _ => false,
        }
    }

    pub fn select_tab(&mut self, tab: Tab) -> ClientResult<()> {
        if tab == Tab::Mine && !self.is_logged_in() {
            return Err(ClientError::LoginRequired);
        }
        self.active_tab = tab;
        Ok(())
    }

    /// Persists the grant, then switches to the user's own feed.
    pub fn log_in(&mut self, grant: LoginGrant) -> ClientResult<()> {
        if grant.token.expose().trim().is_empty() {
            return Err(ClientError::Validation("server returned an empty token"));
        }
        self.store.save(&grant.user, &grant.token)?;
        self.auth = AuthState::LoggedIn {
            user: grant.user,
            token: grant.token,
        };
        self.active_tab = Tab::Mine;
        Ok(())
    }

    /// Falls back to a logged-out plaza, then clears the durable entries.
    /// Returns whether anyone was logged in. The in-memory session is gone
    /// even when clearing the stored copy fails.
    pub fn log_out(&mut self) -> Result<bool> {
        let was_logged_in = self.is_logged_in();
        self.auth = AuthState::LoggedOut;
        self.active_tab = Tab::Plaza;
        self.store.clear()?;
        Ok(was_logged_in)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::init_storage;
    use crate::store::RecordId;
    use assert_matches::assert_matches;

    fn grant() -> LoginGrant {
        serde_json::from_str(r#"{"token": "t", "user": {"id": 1, "username": "a"}}"#)
            .expect("valid grant")
    }

    fn note_owned_by(owner: Option<&str>) -> Note {
        Note {
            id: RecordId::from("n"),
            title: None,
            content: "c".into(),
            created_at: None,
            owner_id: owner.map(RecordId::from),
            is_public: false,
        }
    }

    #[test]
    fn login_persists_both_entries_and_shows_mine() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut session = Session::restore(SessionStore::new(storage.clone()));
        assert!(!session.is_logged_in());

        session.log_in(grant())?;
        assert_eq!(session.active_tab(), Tab::Mine);
        assert_eq!(session.current_user().map(|u| u.username.as_str()), Some("a"));
        assert_eq!(storage.get_item(TOKEN_KEY)?.as_deref(), Some("t"));
        let stored: User = serde_json::from_str(&storage.get_item(USER_KEY)?.unwrap_or_default())?;
        assert_eq!(stored.id, RecordId::from(1));

        let restored = Session::restore(SessionStore::new(storage));
        assert!(restored.is_logged_in());
        assert_eq!(restored.active_tab(), Tab::Plaza);
        Ok(())
    }

    #[test]
    fn logout_clears_storage_and_resets_tab() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut session = Session::restore(SessionStore::new(storage.clone()));
        session.log_in(grant())?;

        assert!(session.log_out()?);
        assert_eq!(session.active_tab(), Tab::Plaza);
        assert_eq!(session.token(), None);
        assert!(storage.keys()?.is_empty());
        assert!(!session.log_out()?);
        Ok(())
    }

    #[test]
    fn failed_clear_is_reported_but_still_logs_out() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut session = Session::restore(SessionStore::new(storage.clone()));
        session.log_in(grant())?;
        storage.with_connection(|conn| {
            conn.execute_batch("DROP TABLE kv_store")?;
            Ok(())
        })?;

        let err = session.log_out().unwrap_err();
        assert!(format!("{err:#}").contains("clearing persisted session"));
        assert!(!session.is_logged_in());
        assert_eq!(session.active_tab(), Tab::Plaza);
        Ok(())
    }

    #[test]
    fn malformed_user_entry_starts_logged_out() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.set_items(&[(TOKEN_KEY, "t"), (USER_KEY, "{oops")])?;
        let session = Session::restore(SessionStore::new(storage.clone()));
        assert_eq!(session.auth(), &AuthState::LoggedOut);
        assert!(storage.keys()?.is_empty());
        Ok(())
    }

    #[test]
    fn half_present_session_is_discarded() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.set_item(TOKEN_KEY, "orphan")?;
        let session = Session::restore(SessionStore::new(storage.clone()));
        assert!(!session.is_logged_in());
        assert_eq!(storage.get_item(TOKEN_KEY)?, None);
        Ok(())
    }

    #[test]
    fn mine_tab_requires_login() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut session = Session::restore(SessionStore::new(storage));
        assert_matches!(session.select_tab(Tab::Mine), Err(ClientError::LoginRequired));
        assert_eq!(session.active_tab(), Tab::Plaza);
        session.log_in(grant())?;
        session.select_tab(Tab::Plaza)?;
        session.select_tab(Tab::Mine)?;
        assert_eq!(session.active_tab(), Tab::Mine);
        Ok(())
    }

    #[test]
    fn ownership_compares_ids_textually() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut session = Session::restore(SessionStore::new(storage));
        assert!(!session.owns(&note_owned_by(Some("1"))));
        session.log_in(grant())?;
        assert!(session.owns(&note_owned_by(Some("1"))));
        assert!(!session.owns(&note_owned_by(Some("2"))));
        assert!(!session.owns(&note_owned_by(None)));
        Ok(())
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let rendered = format!("{:?} {:?}", grant(), Credentials::new("a", "hunter2"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("\"t\""));
        assert!(rendered.contains("[REDACTED]"));
    }
}

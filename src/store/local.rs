use time::OffsetDateTime;
use uuid::Uuid;

use super::{Authenticator, Filter, Note, NoteDraft, NoteId, NoteStore};
use crate::error::{ClientError, ClientResult};
use crate::session::{AuthToken, Credentials, LoginGrant};
use crate::storage::StorageHandle;

/// Key holding the JSON array of every local note.
pub const NOTES_KEY: &str = "notes";

/// Notes kept entirely on this machine. There are no accounts, so the
/// filter is ignored and every note is the user's own.
#[derive(Debug, Clone)]
pub struct LocalStore {
    storage: StorageHandle,
}

impl LocalStore {
    pub fn new(storage: StorageHandle) -> Self {
        Self { storage }
    }

    pub fn list_notes(&self) -> ClientResult<Vec<Note>> {
        let mut notes = self.read_all()?;
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes)
    }

    pub fn create_note(&self, draft: &NoteDraft) -> ClientResult<Note> {
        let mut notes = self.read_all()?;
        let note = Note {
            id: NoteId::new(Uuid::new_v4().to_string()),
            title: Some(draft.title().to_string()).filter(|title| !title.is_empty()),
            content: draft.content().to_string(),
            created_at: Some(OffsetDateTime::now_utc()),
            owner_id: None,
            is_public: draft.is_public().unwrap_or(false),
        };
        notes.insert(0, note.clone());
        self.write_all(&notes)?;
        tracing::debug!(id = %note.id, "created local note");
        Ok(note)
    }

    pub fn update_note(&self, id: &NoteId, draft: &NoteDraft) -> ClientResult<Note> {
        let mut notes = self.read_all()?;
        let note = notes
            .iter_mut()
            .find(|note| &note.id == id)
            .ok_or_else(|| ClientError::NotFound(id.to_string()))?;
        note.title = Some(draft.title().to_string()).filter(|title| !title.is_empty());
        note.content = draft.content().to_string();
        if let Some(is_public) = draft.is_public() {
            note.is_public = is_public;
        }
        let updated = note.clone();
        self.write_all(&notes)?;
        tracing::debug!(%id, "updated local note");
        Ok(updated)
    }

    pub fn delete_note(&self, id: &NoteId) -> ClientResult<()> {
        let mut notes = self.read_all()?;
        let before = notes.len();
        notes.retain(|note| &note.id != id);
        if notes.len() == before {
            return Err(ClientError::NotFound(id.to_string()));
        }
        self.write_all(&notes)?;
        tracing::debug!(%id, "deleted local note");
        Ok(())
    }

    fn read_all(&self) -> ClientResult<Vec<Note>> {
        match self.storage.get_item(NOTES_KEY)? {
            Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Ok(Vec::new()),
        }
    }

    fn write_all(&self, notes: &[Note]) -> ClientResult<()> {
        let raw = serde_json::to_string(notes)?;
        self.storage.set_item(NOTES_KEY, &raw)?;
        Ok(())
    }
}

impl NoteStore for LocalStore {
    async fn list(&self, _filter: Filter, _auth: Option<&AuthToken>) -> ClientResult<Vec<Note>> {
        self.list_notes()
    }

    async fn create(&self, draft: &NoteDraft, _auth: Option<&AuthToken>) -> ClientResult<Note> {
        self.create_note(draft)
    }

    async fn update(
        &self,
        id: &NoteId,
        draft: &NoteDraft,
        _auth: Option<&AuthToken>,
    ) -> ClientResult<Note> {
        self.update_note(id, draft)
    }

    async fn delete(&self, id: &NoteId, _auth: Option<&AuthToken>) -> ClientResult<()> {
        self.delete_note(id)
    }
}

impl Authenticator for LocalStore {
    async fn login(&self, _credentials: &Credentials) -> ClientResult<LoginGrant> {
        Err(ClientError::Unsupported("accounts require the remote backend"))
    }

    async fn register(&self, _credentials: &Credentials) -> ClientResult<()> {
        Err(ClientError::Unsupported("accounts require the remote backend"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::init_storage;
    use assert_matches::assert_matches;
    use time::macros::datetime;

    #[test]
    fn created_notes_list_newest_first() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let store = LocalStore::new(storage);
        let first = store.create_note(&NoteDraft::new("first", "one")?)?;
        let second = store.create_note(&NoteDraft::new("", "two")?)?;

        let notes = store.list_notes()?;
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].id, second.id);
        assert_eq!(notes[1].id, first.id);
        assert_eq!(notes[0].title, None);
        Ok(())
    }

    #[test]
    fn list_sorts_stored_notes_by_creation_time() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.set_item(
            NOTES_KEY,
            r#"[{"id":"old","content":"a","createdAt":"2023-01-01T00:00:00Z"},
                {"id":"undated","content":"b"},
                {"id":"new","content":"c","createdAt":"2024-01-01T00:00:00Z"}]"#,
        )?;
        let store = LocalStore::new(storage);
        let ids: Vec<_> = store
            .list_notes()?
            .into_iter()
            .map(|note| note.id.to_string())
            .collect();
        assert_eq!(ids, vec!["new", "old", "undated"]);
        Ok(())
    }

    #[test]
    fn update_keeps_id_and_creation_time() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.set_item(
            NOTES_KEY,
            r#"[{"id":"n1","title":"t","content":"c","createdAt":"2024-02-02T10:00:00Z"}]"#,
        )?;
        let store = LocalStore::new(storage);
        let updated = store.update_note(&NoteId::from("n1"), &NoteDraft::new("", "new body")?)?;
        assert_eq!(updated.title, None);
        assert_eq!(updated.content, "new body");
        assert_eq!(updated.created_at, Some(datetime!(2024-02-02 10:00:00 UTC)));
        assert_eq!(store.list_notes()?, vec![updated]);
        Ok(())
    }

    #[test]
    fn unknown_ids_are_not_found() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let store = LocalStore::new(storage);
        let missing = NoteId::from("missing");
        assert_matches!(
            store.update_note(&missing, &NoteDraft::new("t", "")?),
            Err(ClientError::NotFound(id)) if id == "missing"
        );
        assert_matches!(store.delete_note(&missing), Err(ClientError::NotFound(_)));
        Ok(())
    }

    #[test]
    fn delete_removes_only_the_target() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let store = LocalStore::new(storage);
        let keep = store.create_note(&NoteDraft::new("keep", "")?)?;
        let doomed = store.create_note(&NoteDraft::new("drop", "")?)?;
        store.delete_note(&doomed.id)?;
        assert_eq!(store.list_notes()?, vec![keep]);
        Ok(())
    }

    #[test]
    fn malformed_store_is_reported_not_overwritten() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        storage.set_item(NOTES_KEY, "{not json")?;
        let store = LocalStore::new(storage.clone());
        assert_matches!(store.list_notes(), Err(ClientError::Json(_)));
        assert_matches!(
            store.create_note(&NoteDraft::new("t", "")?),
            Err(ClientError::Json(_))
        );
        assert_eq!(storage.get_item(NOTES_KEY)?.as_deref(), Some("{not json"));
        Ok(())
    }
}

//! Store adapters: where notes are listed, created, updated and deleted.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::formats::Flexible;
use serde_with::{serde_as, BoolFromInt, DefaultOnNull, PickFirst};
use strum::{AsRefStr, Display};
use time::OffsetDateTime;

use crate::error::{ClientError, ClientResult};
use crate::session::{AuthToken, Credentials, LoginGrant};

pub mod local;
pub mod remote;

pub use local::LocalStore;
pub use remote::RemoteStore;

/// Store-assigned identifier. Arrives as a string or an integer and is
/// compared by its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

pub type NoteId = RecordId;
pub type UserId = RecordId;

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A usable id is non-blank.
    pub fn is_resolvable(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordIdVisitor;

        impl<'de> Visitor<'de> for RecordIdVisitor {
            type Value = RecordId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or integer id")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<RecordId, E> {
                Ok(RecordId::from(value))
            }

            fn visit_string<E: de::Error>(self, value: String) -> Result<RecordId, E> {
                Ok(RecordId(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<RecordId, E> {
                Ok(RecordId::from(value))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<RecordId, E> {
                Ok(RecordId(value.to_string()))
            }
        }

        deserializer.deserialize_any(RecordIdVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "NoteRecord")]
pub struct Note {
    pub id: NoteId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub content: String,
    #[serde(serialize_with = "timestamp::serialize")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<UserId>,
    pub is_public: bool,
}

/// Wire shape of a note. Backends spell some fields more than one way and
/// may send several spellings at once; the first present one in field order
/// wins.
#[serde_as]
#[derive(Deserialize)]
struct NoteRecord {
    id: NoteId,
    #[serde(default)]
    title: Option<String>,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    content: String,
    #[serde(default, deserialize_with = "timestamp::deserialize")]
    created_at: Option<OffsetDateTime>,
    #[serde(
        default,
        rename = "createdAt",
        deserialize_with = "timestamp::deserialize"
    )]
    created_at_camel: Option<OffsetDateTime>,
    #[serde(default)]
    owner_id: Option<UserId>,
    #[serde(default, rename = "ownerId")]
    owner_id_camel: Option<UserId>,
    #[serde(default)]
    user_id: Option<UserId>,
    #[serde_as(as = "Option<PickFirst<(_, BoolFromInt<Flexible>)>>")]
    #[serde(default)]
    is_public: Option<bool>,
    #[serde_as(as = "Option<PickFirst<(_, BoolFromInt<Flexible>)>>")]
    #[serde(default, rename = "isPublic")]
    is_public_camel: Option<bool>,
}

impl From<NoteRecord> for Note {
    fn from(record: NoteRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            content: record.content,
            created_at: record.created_at.or(record.created_at_camel),
            owner_id: record
                .owner_id
                .or(record.owner_id_camel)
                .or(record.user_id),
            is_public: record
                .is_public
                .or(record.is_public_camel)
                .unwrap_or(false),
        }
    }
}

impl Note {
    /// Title with blank values folded to `None`.
    pub fn display_title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|title| !title.is_empty())
    }
}

/// Payload of a save. Construct through [`NoteDraft::new`] so the
/// "title or content" rule is enforced before any store is touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteDraft {
    title: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_public: Option<bool>,
}

impl NoteDraft {
    pub fn new(title: &str, content: &str) -> ClientResult<Self> {
        let title = title.trim();
        let content = content.trim();
        if title.is_empty() && content.is_empty() {
            return Err(ClientError::Validation("please enter a title or some content"));
        }
        Ok(Self {
            title: title.to_string(),
            content: content.to_string(),
            is_public: None,
        })
    }

    pub fn with_visibility(mut self, is_public: bool) -> Self {
        self.is_public = Some(is_public);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_public(&self) -> Option<bool> {
        self.is_public
    }
}

/// Which feed a listing is scoped to; the wire value goes into `?type=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
pub enum Filter {
    #[strum(serialize = "public")]
    Public,
    #[strum(serialize = "my")]
    Mine,
}

#[allow(async_fn_in_trait)]
pub trait NoteStore {
    async fn list(&self, filter: Filter, auth: Option<&AuthToken>) -> ClientResult<Vec<Note>>;

    async fn create(&self, draft: &NoteDraft, auth: Option<&AuthToken>) -> ClientResult<Note>;

    async fn update(
        &self,
        id: &NoteId,
        draft: &NoteDraft,
        auth: Option<&AuthToken>,
    ) -> ClientResult<Note>;

    async fn delete(&self, id: &NoteId, auth: Option<&AuthToken>) -> ClientResult<()>;
}

#[allow(async_fn_in_trait)]
pub trait Authenticator {
    async fn login(&self, credentials: &Credentials) -> ClientResult<LoginGrant>;

    async fn register(&self, credentials: &Credentials) -> ClientResult<()>;
}

/// The backend picked from configuration at start-up.
#[derive(Debug, Clone)]
pub enum ClientBackend {
    Local(LocalStore),
    Remote(RemoteStore),
}

impl NoteStore for ClientBackend {
    async fn list(&self, filter: Filter, auth: Option<&AuthToken>) -> ClientResult<Vec<Note>> {
        match self {
            ClientBackend::Local(store) => store.list(filter, auth).await,
            ClientBackend::Remote(store) => store.list(filter, auth).await,
        }
    }

    async fn create(&self, draft: &NoteDraft, auth: Option<&AuthToken>) -> ClientResult<Note> {
        match self {
            ClientBackend::Local(store) => store.create(draft, auth).await,
            ClientBackend::Remote(store) => store.create(draft, auth).await,
        }
    }

    async fn update(
        &self,
        id: &NoteId,
        draft: &NoteDraft,
        auth: Option<&AuthToken>,
    ) -> ClientResult<Note> {
        match self {
            ClientBackend::Local(store) => store.update(id, draft, auth).await,
            ClientBackend::Remote(store) => store.update(id, draft, auth).await,
        }
    }

    async fn delete(&self, id: &NoteId, auth: Option<&AuthToken>) -> ClientResult<()> {
        match self {
            ClientBackend::Local(store) => store.delete(id, auth).await,
            ClientBackend::Remote(store) => store.delete(id, auth).await,
        }
    }
}

impl Authenticator for ClientBackend {
    async fn login(&self, credentials: &Credentials) -> ClientResult<LoginGrant> {
        match self {
            ClientBackend::Local(store) => store.login(credentials).await,
            ClientBackend::Remote(store) => store.login(credentials).await,
        }
    }

    async fn register(&self, credentials: &Credentials) -> ClientResult<()> {
        match self {
            ClientBackend::Local(store) => store.register(credentials).await,
            ClientBackend::Remote(store) => store.register(credentials).await,
        }
    }
}

/// Lenient `created_at` codec. Accepts RFC 3339, SQLite's
/// `YYYY-MM-DD HH:MM:SS` (UTC), and Unix seconds or milliseconds; anything
/// else becomes `None` rather than failing the whole record.
pub(crate) mod timestamp {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;
    use time::format_description::well_known::Rfc3339;
    use time::macros::format_description;
    use time::{OffsetDateTime, PrimitiveDateTime};

    const MILLIS_THRESHOLD: i64 = 100_000_000_000;

    pub fn serialize<S: Serializer>(
        value: &Option<OffsetDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => {
                let text = dt.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
                serializer.serialize_some(&text)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<OffsetDateTime>, D::Error> {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(match raw {
            Some(Value::String(text)) => parse(&text),
            Some(Value::Number(number)) => number.as_i64().and_then(from_epoch),
            _ => None,
        })
    }

    pub fn parse(text: &str) -> Option<OffsetDateTime> {
        let text = text.trim();
        if let Ok(dt) = OffsetDateTime::parse(text, &Rfc3339) {
            return Some(dt);
        }
        let sqlite = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        if let Ok(dt) = PrimitiveDateTime::parse(text, sqlite) {
            return Some(dt.assume_utc());
        }
        let naive_iso = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
        if let Ok(dt) = PrimitiveDateTime::parse(text, naive_iso) {
            return Some(dt.assume_utc());
        }
        text.parse::<i64>().ok().and_then(from_epoch)
    }

    fn from_epoch(value: i64) -> Option<OffsetDateTime> {
        if value.abs() >= MILLIS_THRESHOLD {
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(value) * 1_000_000).ok()
        } else {
            OffsetDateTime::from_unix_timestamp(value).ok()
        }
    }
}

//! REST client for the essays backend.

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_with::{serde_as, DefaultOnNull};

use super::{Authenticator, Filter, Note, NoteDraft, NoteId, NoteStore};
use crate::config::ApiOptions;
use crate::error::{ClientError, ClientResult};
use crate::session::{AuthToken, Credentials, LoginGrant};

#[derive(Debug, Clone)]
pub struct RemoteStore {
    base_url: Url,
    client: Client,
    accounts: bool,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    essays: Vec<Note>,
}

/// Save endpoints answer with the note itself or wrapped in `{essay: …}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NoteEnvelope {
    Wrapped { essay: Note },
    Bare(Note),
}

impl NoteEnvelope {
    fn into_note(self) -> Note {
        match self {
            NoteEnvelope::Wrapped { essay } => essay,
            NoteEnvelope::Bare(note) => note,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl RemoteStore {
    /// `accounts` switches on the plaza/mine filter and the auth endpoints.
    pub fn new(options: &ApiOptions, accounts: bool) -> ClientResult<Self> {
        let base_url = normalize_base_url(&options.base_url)?;
        let mut builder = Client::builder();
        if let Some(timeout) = options.timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            base_url,
            client: builder.build()?,
            accounts,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> ClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ClientError::InvalidConfiguration(format!(
                    "{} cannot be used as an API base URL",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(request: RequestBuilder, auth: Option<&AuthToken>) -> RequestBuilder {
        match auth {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        }
    }

    fn require_accounts(&self) -> ClientResult<()> {
        if self.accounts {
            Ok(())
        } else {
            Err(ClientError::Unsupported("this backend is configured without accounts"))
        }
    }
}

impl NoteStore for RemoteStore {
    async fn list(&self, filter: Filter, auth: Option<&AuthToken>) -> ClientResult<Vec<Note>> {
        let url = self.endpoint(&["essays"])?;
        let mut request = self.client.get(url);
        let mine_scope = self.accounts && filter == Filter::Mine;
        if self.accounts {
            request = request.query(&[("type", filter.as_ref())]);
        }
        if mine_scope && auth.is_none() {
            return Err(ClientError::LoginRequired);
        }
        // The plaza is public; a stale token must not break it.
        let request = if mine_scope {
            Self::authorize(request, auth)
        } else {
            request
        };

        tracing::debug!(%filter, "listing remote notes");
        let response = check_status(request.send().await?, mine_scope).await?;
        let payload = response.json::<ListResponse>().await?;
        Ok(payload.essays)
    }

    async fn create(&self, draft: &NoteDraft, auth: Option<&AuthToken>) -> ClientResult<Note> {
        let url = self.endpoint(&["essays"])?;
        let request = Self::authorize(self.client.post(url).json(draft), auth);
        let response = check_status(request.send().await?, false).await?;
        let note = response.json::<NoteEnvelope>().await?.into_note();
        tracing::info!(id = %note.id, "created remote note");
        Ok(note)
    }

    async fn update(
        &self,
        id: &NoteId,
        draft: &NoteDraft,
        auth: Option<&AuthToken>,
    ) -> ClientResult<Note> {
        let url = self.endpoint(&["essays", id.as_str()])?;
        let request = Self::authorize(self.client.put(url).json(draft), auth);
        let response = check_status(request.send().await?, false).await?;
        let note = response.json::<NoteEnvelope>().await?.into_note();
        tracing::info!(%id, "updated remote note");
        Ok(note)
    }

    async fn delete(&self, id: &NoteId, auth: Option<&AuthToken>) -> ClientResult<()> {
        if !id.is_resolvable() {
            return Err(ClientError::Validation("cannot delete a note without an id"));
        }
        let url = self.endpoint(&["essays", id.as_str()])?;
        let request = Self::authorize(self.client.delete(url), auth);
        check_status(request.send().await?, false).await?;
        tracing::info!(%id, "deleted remote note");
        Ok(())
    }
}

impl Authenticator for RemoteStore {
    async fn login(&self, credentials: &Credentials) -> ClientResult<LoginGrant> {
        self.require_accounts()?;
        credentials.validate()?;
        let url = self.endpoint(&["login"])?;
        let response = check_status(
            self.client.post(url).json(credentials).send().await?,
            false,
        )
        .await?;
        let grant = response.json::<LoginGrant>().await?;
        tracing::info!(user = %grant.user.username, "logged in");
        Ok(grant)
    }

    async fn register(&self, credentials: &Credentials) -> ClientResult<()> {
        self.require_accounts()?;
        credentials.validate()?;
        let url = self.endpoint(&["register"])?;
        check_status(
            self.client.post(url).json(credentials).send().await?,
            false,
        )
        .await?;
        tracing::info!(user = %credentials.username(), "registered account");
        Ok(())
    }
}

pub fn normalize_base_url(raw: &str) -> ClientResult<Url> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ClientError::InvalidConfiguration(
            "API base URL must not be empty".to_string(),
        ));
    }
    let url = Url::parse(trimmed).map_err(|err| {
        ClientError::InvalidConfiguration(format!("invalid API base URL {trimmed:?}: {err}"))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::InvalidConfiguration(format!(
            "API base URL must use http or https, got {}",
            url.scheme()
        )));
    }
    Ok(url)
}

/// Passes successful responses through. A 401/403 on a mine-scoped request
/// is an auth failure; every other failure keeps the server's message when
/// it sent one.
async fn check_status(response: Response, mine_scope: bool) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if mine_scope && (status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN) {
        tracing::warn!(status = status.as_u16(), "session rejected on mine feed");
        return Err(ClientError::Auth {
            status: status.as_u16(),
        });
    }
    let body = response.text().await.unwrap_or_default();
    let err = error_from_body(status, &body);
    tracing::warn!(status = status.as_u16(), error = %err, "request failed");
    Err(err)
}

fn error_from_body(status: StatusCode, body: &str) -> ClientError {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload
            .error
            .or(payload.message)
            .filter(|message| !message.trim().is_empty())
        {
            return ClientError::Rejected {
                status: status.as_u16(),
                message,
            };
        }
    }
    ClientError::Network(format!("server responded with HTTP {}", status.as_u16()))
}

//! HTML projection of a note list.
//!
//! User text (titles, contents, ids, server messages) always passes through
//! [`escape_html`]; the markup produced here never does.

use std::fmt::{self, Write as _};

use indexmap::IndexMap;
use time::format_description::OwnedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::config::{ClientMode, DisplayOptions};
use crate::session::{Session, Tab};
use crate::store::{Note, NoteId};

pub mod page;

pub use page::render_page;

/// A rendered chunk of HTML ready to be placed in the notes grid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment(String);

impl Fragment {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub session: &'a Session,
    pub mode: ClientMode,
}

impl RenderContext<'_> {
    /// Edit/delete are offered on every note without accounts, and only on
    /// the user's own notes with them.
    pub fn can_modify(&self, note: &Note) -> bool {
        if self.mode.uses_accounts() {
            self.session.owns(note)
        } else {
            true
        }
    }

    fn shows_visibility(&self) -> bool {
        self.mode.uses_accounts() && self.session.active_tab() == Tab::Mine
    }

    pub fn empty_message(&self) -> &'static str {
        if !self.mode.uses_accounts() {
            return "No notes yet. Use the New Note button to write the first one.";
        }
        match self.session.active_tab() {
            Tab::Plaza => "Nothing on the plaza yet. Public notes will show up here.",
            Tab::Mine => "You have not written any notes yet. Use the New Note button to start.",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimestampStyle {
    items: OwnedFormatItem,
    offset: UtcOffset,
}

impl TimestampStyle {
    pub fn from_options(options: &DisplayOptions) -> anyhow::Result<Self> {
        Ok(Self {
            items: options.timestamp_items()?,
            offset: options.utc_offset(),
        })
    }

    pub fn format(&self, timestamp: Option<OffsetDateTime>) -> String {
        timestamp
            .and_then(|dt| dt.to_offset(self.offset).format(&self.items).ok())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

impl Default for TimestampStyle {
    fn default() -> Self {
        Self {
            items: OwnedFormatItem::from(format_description!(
                "[year]/[month]/[day] [hour]:[minute]"
            )),
            offset: UtcOffset::UTC,
        }
    }
}

/// Renders note lists and remembers the last rendered notes by id so an
/// edit action carrying only an id can be resolved without a fetch.
#[derive(Debug, Clone, Default)]
pub struct NoteRenderer {
    index: IndexMap<NoteId, Note>,
    style: TimestampStyle,
}

impl NoteRenderer {
    pub fn new(style: TimestampStyle) -> Self {
        Self {
            index: IndexMap::new(),
            style,
        }
    }

    pub fn render(&mut self, notes: Vec<Note>, ctx: &RenderContext<'_>) -> Fragment {
        self.index.clear();
        if notes.is_empty() {
            return Fragment(empty_state(ctx.empty_message()));
        }
        let mut html = String::new();
        for note in notes {
            self.write_card(&mut html, &note, ctx);
            self.index.insert(note.id.clone(), note);
        }
        Fragment(html)
    }

    /// Placeholder list with the failure spelled out; nothing stale stays
    /// resolvable.
    pub fn render_error(&mut self, message: &str, ctx: &RenderContext<'_>) -> Fragment {
        self.index.clear();
        let mut html = format!(
            "<div class=\"notes-error\" role=\"alert\">{}</div>\n",
            escape_html(message)
        );
        html.push_str(&empty_state(ctx.empty_message()));
        Fragment(html)
    }

    pub fn lookup(&self, id: &NoteId) -> Option<&Note> {
        self.index.get(id)
    }

    /// Notes from the last render, in display order.
    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.index.values()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn timestamp_style(&self) -> &TimestampStyle {
        &self.style
    }

    fn write_card(&self, html: &mut String, note: &Note, ctx: &RenderContext<'_>) {
        let id = escape_html(note.id.as_str());
        let _ = writeln!(html, "<article class=\"note-card\" data-note-id=\"{id}\">");
        if let Some(title) = note.display_title() {
            let _ = writeln!(html, "  <h3 class=\"note-title\">{}</h3>", escape_html(title));
        }
        let _ = writeln!(
            html,
            "  <p class=\"note-content\" style=\"white-space: pre-wrap\">{}</p>",
            escape_html(&note.content)
        );
        let _ = writeln!(html, "  <footer class=\"note-meta\">");
        let _ = writeln!(
            html,
            "    <time class=\"note-time\">{}</time>",
            self.style.format(note.created_at)
        );
        if ctx.shows_visibility() {
            let (class, label) = if note.is_public {
                ("note-badge-public", "Public")
            } else {
                ("note-badge-private", "Private")
            };
            let _ = writeln!(html, "    <span class=\"note-badge {class}\">{label}</span>");
        }
        if ctx.can_modify(note) {
            let _ = writeln!(
                html,
                "    <div class=\"note-actions\">\
                 <button type=\"button\" class=\"note-edit\" data-action=\"edit\" data-note-id=\"{id}\">Edit</button>\
                 <button type=\"button\" class=\"note-delete\" data-action=\"delete\" data-note-id=\"{id}\">Delete</button>\
                 </div>"
            );
        }
        let _ = writeln!(html, "  </footer>");
        let _ = writeln!(html, "</article>");
    }
}

fn empty_state(message: &str) -> String {
    format!("<div class=\"notes-empty\">\n  <p>{message}</p>\n</div>\n")
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::session::{LoginGrant, SessionStore};
    use crate::storage::tests::init_storage;
    use crate::store::RecordId;
    use time::macros::datetime;

    pub(crate) fn note(id: &str, owner: Option<&str>, title: Option<&str>, content: &str) -> Note {
        Note {
            id: RecordId::from(id),
            title: title.map(str::to_string),
            content: content.to_string(),
            created_at: Some(datetime!(2024-05-06 07:08:09 UTC)),
            owner_id: owner.map(RecordId::from),
            is_public: false,
        }
    }

    fn logged_in_session(storage: crate::storage::StorageHandle) -> anyhow::Result<Session> {
        let mut session = Session::restore(SessionStore::new(storage));
        let grant: LoginGrant =
            serde_json::from_str(r#"{"token":"t","user":{"id":1,"username":"a"}}"#)?;
        session.log_in(grant)?;
        Ok(session)
    }

    #[test]
    fn escapes_user_text() {
        assert_eq!(
            escape_html(r#"<script>x</script> & "'"#),
            "&lt;script&gt;x&lt;/script&gt; &amp; &quot;&#39;"
        );
    }

    #[test]
    fn script_content_renders_as_text() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let session = Session::restore(SessionStore::new(storage));
        let ctx = RenderContext {
            session: &session,
            mode: ClientMode::Local,
        };
        let mut renderer = NoteRenderer::default();
        let html = renderer.render(
            vec![note("1", None, Some("<b>t</b>"), "<script>x</script>")],
            &ctx,
        );
        assert!(html.as_str().contains("&lt;script&gt;x&lt;/script&gt;"));
        assert!(!html.as_str().contains("<script>"));
        assert!(html.as_str().contains("&lt;b&gt;t&lt;/b&gt;"));
        Ok(())
    }

    #[test]
    fn card_shows_minute_precision_timestamp_and_preserves_whitespace() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let session = Session::restore(SessionStore::new(storage));
        let ctx = RenderContext {
            session: &session,
            mode: ClientMode::Remote,
        };
        let mut renderer = NoteRenderer::default();
        let html = renderer.render(vec![note("1", None, None, "line one\n  line two")], &ctx);
        assert!(html.as_str().contains("<time class=\"note-time\">2024/05/06 07:08</time>"));
        assert!(html.as_str().contains("line one\n  line two"));
        assert!(!html.as_str().contains("note-title"));
        assert!(html.as_str().contains("data-action=\"edit\""));
        Ok(())
    }

    #[test]
    fn utc_offset_shifts_displayed_time() -> anyhow::Result<()> {
        let style = TimestampStyle::from_options(&DisplayOptions {
            utc_offset_minutes: 480,
            ..DisplayOptions::default()
        })?;
        assert_eq!(
            style.format(Some(datetime!(2024-05-06 23:30:00 UTC))),
            "2024/05/07 07:30"
        );
        assert_eq!(style.format(None), "unknown");
        Ok(())
    }

    #[test]
    fn empty_list_message_follows_tab() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut session = logged_in_session(storage)?;
        let mut renderer = NoteRenderer::default();

        let mine = renderer.render(
            Vec::new(),
            &RenderContext {
                session: &session,
                mode: ClientMode::Accounts,
            },
        );
        assert!(mine.as_str().contains("You have not written any notes yet"));

        session.select_tab(Tab::Plaza)?;
        let plaza = renderer.render(
            Vec::new(),
            &RenderContext {
                session: &session,
                mode: ClientMode::Accounts,
            },
        );
        assert!(plaza.as_str().contains("Nothing on the plaza yet"));
        Ok(())
    }

    #[test]
    fn controls_only_on_owned_notes_with_accounts() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let mut session = logged_in_session(storage)?;
        session.select_tab(Tab::Plaza)?;
        let ctx = RenderContext {
            session: &session,
            mode: ClientMode::Accounts,
        };
        let mut renderer = NoteRenderer::default();
        let html = renderer.render(
            vec![
                note("10", Some("1"), Some("mine"), "a"),
                note("11", Some("2"), Some("theirs"), "b"),
            ],
            &ctx,
        );
        let cards: Vec<&str> = html.as_str().split("<article").skip(1).collect();
        assert_eq!(cards.len(), 2);
        assert!(cards[0].contains("data-action=\"delete\""));
        assert!(!cards[1].contains("data-action"));
        assert!(!html.as_str().contains("note-badge"));
        Ok(())
    }

    #[test]
    fn logged_out_visitors_get_no_controls() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let session = Session::restore(SessionStore::new(storage));
        let ctx = RenderContext {
            session: &session,
            mode: ClientMode::Accounts,
        };
        let mut renderer = NoteRenderer::default();
        let html = renderer.render(vec![note("10", Some("1"), None, "a")], &ctx);
        assert!(!html.as_str().contains("<button"));
        Ok(())
    }

    #[test]
    fn visibility_badge_only_on_mine_tab() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let session = logged_in_session(storage)?;
        let ctx = RenderContext {
            session: &session,
            mode: ClientMode::Accounts,
        };
        let mut public = note("10", Some("1"), None, "a");
        public.is_public = true;
        let private = note("11", Some("1"), None, "b");
        let mut renderer = NoteRenderer::default();
        let html = renderer.render(vec![public, private], &ctx);
        assert!(html.as_str().contains(">Public</span>"));
        assert!(html.as_str().contains(">Private</span>"));
        Ok(())
    }

    #[test]
    fn index_is_rebuilt_on_every_render() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let session = Session::restore(SessionStore::new(storage));
        let ctx = RenderContext {
            session: &session,
            mode: ClientMode::Local,
        };
        let mut renderer = NoteRenderer::default();
        renderer.render(vec![note("a", None, None, "1"), note("b", None, None, "2")], &ctx);
        assert_eq!(renderer.len(), 2);
        assert!(renderer.lookup(&RecordId::from("a")).is_some());

        renderer.render(vec![note("c", None, None, "3")], &ctx);
        assert!(renderer.lookup(&RecordId::from("a")).is_none());
        assert_eq!(
            renderer.notes().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            vec!["c"]
        );

        let html = renderer.render_error("<boom>", &ctx);
        assert!(renderer.is_empty());
        assert!(html.as_str().contains("&lt;boom&gt;"));
        assert!(html.as_str().contains("notes-empty"));
        Ok(())
    }
}

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};

use super::Commands;
use crate::app::{EditTarget, Notice, NoteViewController, UiEvent};
use crate::session::{Credentials, Tab};
use crate::store::{Authenticator, NoteId, NoteStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Html,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Feed to show when accounts are enabled (plaza or mine)
    #[arg(long)]
    pub tab: Option<Tab>,
    /// Print plain text or the rendered HTML fragment
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    #[arg(long)]
    pub tab: Option<Tab>,
    /// Write the page here instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Title for the note
    #[arg()]
    pub title: Option<String>,
    /// Provide the note body inline. If omitted, reads from stdin.
    #[arg(long)]
    pub body: Option<String>,
    /// Show the note on the plaza
    #[arg(long)]
    pub public: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Note identifier as shown by `list`
    pub id: String,
    /// Replace the title
    #[arg(long)]
    pub title: Option<String>,
    /// Replace the body
    #[arg(long)]
    pub body: Option<String>,
    #[arg(long, conflicts_with = "private")]
    pub public: bool,
    #[arg(long)]
    pub private: bool,
    /// Feed to find the note in (defaults to mine when logged in)
    #[arg(long)]
    pub tab: Option<Tab>,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Note identifier as shown by `list`
    pub id: String,
    /// Skip the confirmation prompt
    #[arg(long, short)]
    pub yes: bool,
    #[arg(long)]
    pub tab: Option<Tab>,
}

#[derive(Args, Debug, Clone)]
pub struct AuthArgs {
    pub username: String,
    /// Prompted for if omitted
    #[arg(long)]
    pub password: Option<String>,
}

pub async fn execute<B>(controller: &mut NoteViewController<B>, command: Commands) -> Result<()>
where
    B: NoteStore + Authenticator,
{
    let startup = controller.take_notices();
    let needs_feed = matches!(
        command,
        Commands::List(_) | Commands::Render(_) | Commands::Edit(_) | Commands::Delete(_)
    );
    if needs_feed {
        collect(startup)?;
    } else {
        for notice in startup {
            eprintln!("warning: {}", notice.message);
        }
    }

    let output = match command {
        Commands::List(args) => list_notes(controller, args).await?,
        Commands::Render(args) => render_page(controller, args).await?,
        Commands::New(mut args) => {
            if args.body.is_none() {
                args.body = read_stdin()?;
            }
            new_note(controller, args).await?
        }
        Commands::Edit(args) => edit_note(controller, args).await?,
        Commands::Delete(args) => {
            if !args.yes && !confirm(&format!("Delete note {}?", args.id))? {
                println!("Cancelled.");
                return Ok(());
            }
            delete_note(controller, args).await?
        }
        Commands::Login(args) => {
            let credentials = credentials(&args)?;
            log_in(controller, credentials).await?
        }
        Commands::Register(args) => {
            let credentials = credentials(&args)?;
            register(controller, credentials).await?
        }
        Commands::Logout => log_out(controller).await?,
        Commands::Whoami => whoami(controller),
    };
    print!("{output}");
    Ok(())
}

pub async fn list_notes<B>(controller: &mut NoteViewController<B>, args: ListArgs) -> Result<String>
where
    B: NoteStore + Authenticator,
{
    let mut out = show_tab(controller, args.tab).await?;
    match args.format {
        OutputFormat::Text => out.push_str(&format_note_list(controller)),
        OutputFormat::Html => out.push_str(controller.view().fragment().as_str()),
    }
    Ok(out)
}

async fn render_page<B>(controller: &mut NoteViewController<B>, args: RenderArgs) -> Result<String>
where
    B: NoteStore + Authenticator,
{
    let mut out = show_tab(controller, args.tab).await?;
    let page = controller.render_page();
    match args.output {
        Some(path) => {
            fs::write(&path, page).with_context(|| format!("writing {}", path.display()))?;
            let _ = writeln!(out, "Wrote {}", path.display());
        }
        None => out.push_str(&page),
    }
    Ok(out)
}

async fn new_note<B>(controller: &mut NoteViewController<B>, args: NewArgs) -> Result<String>
where
    B: NoteStore + Authenticator,
{
    controller.dispatch(UiEvent::NewNote).await;
    controller.dispatch(UiEvent::TitleInput(args.title.unwrap_or_default())).await;
    controller.dispatch(UiEvent::ContentInput(args.body.unwrap_or_default())).await;
    controller.dispatch(UiEvent::VisibilityInput(args.public)).await;
    controller.dispatch(UiEvent::Save).await;
    let mut out = collect(controller.take_notices())?;
    out.push_str("Note saved.\n");
    Ok(out)
}

async fn edit_note<B>(controller: &mut NoteViewController<B>, args: EditArgs) -> Result<String>
where
    B: NoteStore + Authenticator,
{
    let tab = args.tab.or_else(|| default_tab(controller));
    let mut out = show_tab(controller, tab).await?;
    let id = NoteId::new(args.id.trim());
    controller.dispatch(UiEvent::EditNote(id.clone())).await;
    out.push_str(&collect(controller.take_notices())?);
    if controller.modal().edit_target() != Some(&EditTarget::Edit(id.clone())) {
        controller.dispatch(UiEvent::Cancel).await;
        bail!("note {id} is not in the current feed");
    }

    if let Some(title) = args.title {
        controller.dispatch(UiEvent::TitleInput(title)).await;
    }
    if let Some(body) = args.body {
        controller.dispatch(UiEvent::ContentInput(body)).await;
    }
    if args.public || args.private {
        controller.dispatch(UiEvent::VisibilityInput(args.public)).await;
    }
    controller.dispatch(UiEvent::Save).await;
    out.push_str(&collect(controller.take_notices())?);
    let _ = writeln!(out, "Updated note {id}.");
    Ok(out)
}

async fn delete_note<B>(controller: &mut NoteViewController<B>, args: DeleteArgs) -> Result<String>
where
    B: NoteStore + Authenticator,
{
    let tab = args.tab.or_else(|| default_tab(controller));
    let mut out = show_tab(controller, tab).await?;
    let id = NoteId::new(args.id.trim());
    controller.dispatch(UiEvent::DeleteNote(id.clone())).await;
    out.push_str(&collect(controller.take_notices())?);
    let _ = writeln!(out, "Deleted note {id}.");
    Ok(out)
}

async fn log_in<B>(controller: &mut NoteViewController<B>, credentials: Credentials) -> Result<String>
where
    B: NoteStore + Authenticator,
{
    controller.dispatch(UiEvent::Login(credentials)).await;
    collect(controller.take_notices())
}

async fn register<B>(
    controller: &mut NoteViewController<B>,
    credentials: Credentials,
) -> Result<String>
where
    B: NoteStore + Authenticator,
{
    controller.dispatch(UiEvent::Register(credentials)).await;
    collect(controller.take_notices())
}

async fn log_out<B>(controller: &mut NoteViewController<B>) -> Result<String>
where
    B: NoteStore + Authenticator,
{
    let was_logged_in = controller.session().is_logged_in();
    controller.dispatch(UiEvent::Logout).await;
    let out = collect(controller.take_notices())?;
    if was_logged_in {
        Ok(out)
    } else {
        Ok("Not logged in.\n".to_string())
    }
}

fn whoami<B>(controller: &NoteViewController<B>) -> String
where
    B: NoteStore + Authenticator,
{
    match controller.session().current_user() {
        Some(user) => format!("{} (id {})\n", user.username, user.id),
        None => "Not logged in.\n".to_string(),
    }
}

/// Mine is where your own notes are; fall back to it for edits and deletes.
fn default_tab<B>(controller: &NoteViewController<B>) -> Option<Tab>
where
    B: NoteStore + Authenticator,
{
    (controller.mode().uses_accounts() && controller.session().is_logged_in()).then_some(Tab::Mine)
}

async fn show_tab<B>(controller: &mut NoteViewController<B>, tab: Option<Tab>) -> Result<String>
where
    B: NoteStore + Authenticator,
{
    match tab {
        Some(tab) => {
            controller.dispatch(UiEvent::SelectTab(tab)).await;
            collect(controller.take_notices())
        }
        None => Ok(String::new()),
    }
}

/// Info notices become output lines; any error notice fails the command.
fn collect(notices: Vec<Notice>) -> Result<String> {
    let (errors, infos): (Vec<_>, Vec<_>) = notices.into_iter().partition(Notice::is_error);
    if !errors.is_empty() {
        let messages: Vec<_> = errors.into_iter().map(|notice| notice.message).collect();
        bail!("{}", messages.join("\n"));
    }
    let mut out = String::new();
    for notice in infos {
        let _ = writeln!(out, "{notice}");
    }
    Ok(out)
}

fn format_note_list<B>(controller: &NoteViewController<B>) -> String
where
    B: NoteStore + Authenticator,
{
    let ctx = controller.context();
    let mut out = String::new();
    if controller.notes().next().is_none() {
        let _ = writeln!(out, "{}", ctx.empty_message());
        return out;
    }
    let show_visibility =
        controller.mode().uses_accounts() && controller.session().active_tab() == Tab::Mine;
    for note in controller.notes() {
        let mut headline = format!("#{}  {}", note.id, note.display_title().unwrap_or("(untitled)"));
        if show_visibility {
            headline.push_str(if note.is_public { "  [PUBLIC]" } else { "  [PRIVATE]" });
        }
        if controller.mode().uses_accounts() && ctx.can_modify(note) {
            headline.push_str("  [YOURS]");
        }
        let _ = writeln!(out, "{headline}");
        let _ = writeln!(out, "    created {}", controller.format_timestamp(note));
        for line in note.content.lines() {
            let _ = writeln!(out, "    {line}");
        }
        out.push('\n');
    }
    out
}

fn credentials(args: &AuthArgs) -> Result<Credentials> {
    let password = match &args.password {
        Some(password) => password.clone(),
        None => prompt("Password")?,
    };
    Ok(Credentials::new(&args.username, &password))
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;
    let mut stdout = io::stdout();
    write!(stdout, "{}: ", label)?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end().to_owned())
}

fn confirm(question: &str) -> Result<bool> {
    let answer = prompt(&format!("{question} [y/N]"))?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("reading note body from stdin")?;
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientMode;
    use crate::session::SessionStore;
    use crate::storage::tests::init_storage;
    use crate::store::{ClientBackend, LocalStore};
    use crate::ui::NoteRenderer;
    use tempfile::TempDir;

    type TestResult<T = ()> = Result<T>;

    async fn local_controller() -> TestResult<(TempDir, NoteViewController<ClientBackend>)> {
        let (temp, storage) = init_storage()?;
        let backend = ClientBackend::Local(LocalStore::new(storage.clone()));
        let controller = NoteViewController::init(
            ClientMode::Local,
            backend,
            SessionStore::new(storage),
            NoteRenderer::default(),
        )
        .await;
        Ok((temp, controller))
    }

    fn new_args(title: &str, body: &str) -> NewArgs {
        NewArgs {
            title: Some(title.into()),
            body: Some(body.into()),
            public: false,
        }
    }

    fn first_id(controller: &NoteViewController<ClientBackend>) -> String {
        controller
            .notes()
            .next()
            .map(|note| note.id.to_string())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn cli_new_then_list_prints_note() -> TestResult {
        let (_temp, mut controller) = local_controller().await?;
        let empty = list_notes(&mut controller, ListArgs::default()).await?;
        assert!(empty.contains("No notes yet"));

        let out = new_note(&mut controller, new_args("Groceries", "milk\neggs")).await?;
        assert_eq!(out, "Note saved.\n");

        let listing = list_notes(&mut controller, ListArgs::default()).await?;
        assert!(listing.contains("Groceries"));
        assert!(listing.contains("    milk\n    eggs\n"));
        assert!(!listing.contains("[YOURS]"));
        Ok(())
    }

    #[tokio::test]
    async fn cli_new_rejects_blank_note() -> TestResult {
        let (_temp, mut controller) = local_controller().await?;
        let err = new_note(&mut controller, new_args(" ", "")).await.unwrap_err();
        assert_eq!(err.to_string(), "please enter a title or some content");
        assert!(controller.notes().next().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn cli_html_listing_escapes_content() -> TestResult {
        let (_temp, mut controller) = local_controller().await?;
        new_note(&mut controller, new_args("", "<script>x</script>")).await?;
        let html = list_notes(
            &mut controller,
            ListArgs {
                tab: None,
                format: OutputFormat::Html,
            },
        )
        .await?;
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        Ok(())
    }

    #[tokio::test]
    async fn cli_edit_updates_only_given_fields() -> TestResult {
        let (_temp, mut controller) = local_controller().await?;
        new_note(&mut controller, new_args("Title", "old body")).await?;
        let id = first_id(&controller);

        let out = edit_note(
            &mut controller,
            EditArgs {
                id: id.clone(),
                title: None,
                body: Some("new body".into()),
                public: false,
                private: false,
                tab: None,
            },
        )
        .await?;
        assert_eq!(out, format!("Updated note {id}.\n"));
        let note = controller
            .lookup(&NoteId::from(id.as_str()))
            .context("edited note present")?;
        assert_eq!(note.display_title(), Some("Title"));
        assert_eq!(note.content, "new body");
        assert!(!controller.modal().is_open());
        Ok(())
    }

    #[tokio::test]
    async fn cli_edit_unknown_note_fails_and_closes_dialog() -> TestResult {
        let (_temp, mut controller) = local_controller().await?;
        let err = edit_note(
            &mut controller,
            EditArgs {
                id: "missing".into(),
                title: Some("x".into()),
                body: None,
                public: false,
                private: false,
                tab: None,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("not in the current feed"));
        assert!(!controller.modal().is_open());
        Ok(())
    }

    #[tokio::test]
    async fn cli_delete_removes_note() -> TestResult {
        let (_temp, mut controller) = local_controller().await?;
        new_note(&mut controller, new_args("doomed", "")).await?;
        let id = first_id(&controller);
        delete_note(
            &mut controller,
            DeleteArgs {
                id: id.clone(),
                yes: true,
                tab: None,
            },
        )
        .await?;
        assert!(controller.notes().next().is_none());

        let err = delete_note(
            &mut controller,
            DeleteArgs {
                id,
                yes: true,
                tab: None,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
        Ok(())
    }

    #[tokio::test]
    async fn cli_accounts_need_the_remote_backend() -> TestResult {
        let (_temp, mut controller) = local_controller().await?;
        let err = log_in(&mut controller, Credentials::new("a", "b"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "accounts require the remote backend");
        assert_eq!(whoami(&controller), "Not logged in.\n");
        assert_eq!(log_out(&mut controller).await?, "Not logged in.\n");
        Ok(())
    }

    #[tokio::test]
    async fn cli_render_writes_page_to_file() -> TestResult {
        let (temp, mut controller) = local_controller().await?;
        new_note(&mut controller, new_args("On the page", "")).await?;
        let path = temp.path().join("page.html");
        let out = render_page(
            &mut controller,
            RenderArgs {
                tab: None,
                output: Some(path.clone()),
            },
        )
        .await?;
        assert!(out.starts_with("Wrote "));
        let page = fs::read_to_string(&path)?;
        assert!(page.contains("On the page"));
        assert!(page.contains("<main id=\"notesGrid\""));
        Ok(())
    }

    #[test]
    fn collect_fails_on_error_notices() {
        assert_eq!(
            collect(vec![Notice::info("ok")]).ok().as_deref(),
            Some("ok\n")
        );
        let err = collect(vec![Notice::info("ok"), Notice::error("boom")]).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}

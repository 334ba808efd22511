use std::fmt::Write as _;

use super::{escape_html, Fragment, RenderContext};
use crate::app::ModalState;
use crate::session::Tab;

/// A standalone HTML document: header, feed tabs, the notes grid and, when
/// open, the note dialog.
pub fn render_page(ctx: &RenderContext<'_>, modal: &ModalState, notes: &Fragment) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>Notes</title>\n</head>\n<body>\n",
    );
    let _ = writeln!(html, "<header class=\"app-header\">\n<h1>Notes</h1>");
    if ctx.mode.uses_accounts() {
        write_tabs(&mut html, ctx);
        match ctx.session.current_user() {
            Some(user) => {
                let _ = writeln!(
                    html,
                    "<span class=\"current-user\">Signed in as {}</span>",
                    escape_html(&user.username)
                );
            }
            None => {
                let _ = writeln!(html, "<span class=\"current-user\">Not signed in</span>");
            }
        }
    }
    let _ = writeln!(html, "</header>");
    let _ = writeln!(html, "<main id=\"notesGrid\" class=\"notes-grid\">\n{notes}</main>");
    if modal.is_open() {
        write_modal(&mut html, ctx, modal);
    }
    html.push_str("</body>\n</html>\n");
    html
}

fn write_tabs(html: &mut String, ctx: &RenderContext<'_>) {
    let active = ctx.session.active_tab();
    let _ = writeln!(html, "<nav class=\"tabs\">");
    for (tab, label) in [(Tab::Plaza, "Plaza"), (Tab::Mine, "Mine")] {
        if tab == Tab::Mine && !ctx.session.is_logged_in() {
            continue;
        }
        let class = if tab == active { "tab active" } else { "tab" };
        let _ = writeln!(html, "<a class=\"{class}\" data-tab=\"{tab}\">{label}</a>");
    }
    let _ = writeln!(html, "</nav>");
}

fn write_modal(html: &mut String, ctx: &RenderContext<'_>, modal: &ModalState) {
    let _ = writeln!(html, "<div id=\"noteModal\" class=\"modal\">\n<form class=\"modal-form\">");
    let _ = writeln!(html, "<h2>{}</h2>", modal.heading());
    let _ = writeln!(
        html,
        "<input id=\"noteTitle\" type=\"text\" placeholder=\"Title\" value=\"{}\">",
        escape_html(modal.title())
    );
    let _ = writeln!(
        html,
        "<textarea id=\"noteContent\" placeholder=\"Write something...\">{}</textarea>",
        escape_html(modal.content())
    );
    if ctx.mode.uses_accounts() {
        let checked = if modal.is_public() { " checked" } else { "" };
        let _ = writeln!(
            html,
            "<label><input id=\"notePublic\" type=\"checkbox\"{checked}> Public</label>"
        );
    }
    let _ = writeln!(
        html,
        "<button type=\"button\" id=\"cancelBtn\">Cancel</button>\n<button type=\"button\" id=\"saveBtn\">Save</button>"
    );
    let _ = writeln!(html, "</form>\n</div>");
}

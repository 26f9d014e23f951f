use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{opt_i64, opt_str, respond, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::registry::{self, RefKind};
use crate::session::SessionContext;
use serde_json::json;

fn session_id(req: &Request) -> Result<&str, HandlerErr> {
    opt_str(&req.params, "sessionId")?.ok_or_else(|| HandlerErr::bad_params("missing sessionId"))
}

fn no_session(session_id: &str) -> HandlerErr {
    HandlerErr::new("no_session", "session is not open")
        .with_details(json!({ "sessionId": session_id }))
}

fn selection_view(state: &AppState, ctx: &SessionContext) -> HandlerResult {
    let sections = ctx.selection.sections(&state.db, ctx.school_year_id)?;
    let students = ctx.selection.students(&state.db)?;
    Ok(json!({
        "sessionId": ctx.session_id,
        "selection": ctx.selection,
        "sections": sections,
        "students": students,
    }))
}

fn handle_session_open(state: &mut AppState, req: &Request) -> HandlerResult {
    let school_year_id = opt_i64(&req.params, "schoolYearId")?;
    if let Some(id) = school_year_id {
        if !registry::exists(&state.db, RefKind::SchoolYear, id)? {
            return Err(HandlerErr::new("unknown_reference", "unknown schoolYear")
                .with_details(json!({ "kind": "schoolYear", "id": id })));
        }
    }
    let ctx = state.sessions.open(school_year_id);
    tracing::info!(
        event = "session_opened",
        session_id = %ctx.session_id,
        school_year_id = ?school_year_id
    );
    Ok(json!(ctx))
}

fn handle_session_close(state: &mut AppState, req: &Request) -> HandlerResult {
    let id = session_id(req)?;
    let closed = state.sessions.close(id);
    if closed {
        tracing::info!(event = "session_closed", session_id = %id);
    }
    Ok(json!({ "closed": closed }))
}

fn handle_selection_get(state: &mut AppState, req: &Request) -> HandlerResult {
    let id = session_id(req)?;
    let ctx = state.sessions.get(id).ok_or_else(|| no_session(id))?;
    selection_view(state, ctx)
}

fn handle_selection_set_grade(state: &mut AppState, req: &Request) -> HandlerResult {
    let id = session_id(req)?;
    let grade_id = opt_i64(&req.params, "gradeId")?;
    let ctx = state.sessions.get_mut(id).ok_or_else(|| no_session(id))?;

    let mut next = ctx.selection;
    let section_cleared = next.set_grade(&state.db, grade_id)?;
    ctx.selection = next;

    let ctx = state.sessions.get(id).ok_or_else(|| no_session(id))?;
    let mut view = selection_view(state, ctx)?;
    view["sectionCleared"] = json!(section_cleared);
    Ok(view)
}

fn handle_selection_set_section(state: &mut AppState, req: &Request) -> HandlerResult {
    let id = session_id(req)?;
    let section_id = opt_i64(&req.params, "sectionId")?;
    let ctx = state.sessions.get_mut(id).ok_or_else(|| no_session(id))?;

    let mut next = ctx.selection;
    next.set_section(&state.db, section_id)?;
    ctx.selection = next;

    let ctx = state.sessions.get(id).ok_or_else(|| no_session(id))?;
    selection_view(state, ctx)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "session.open" => handle_session_open(state, req),
        "session.close" => handle_session_close(state, req),
        "selection.get" => handle_selection_get(state, req),
        "selection.setGrade" => handle_selection_set_grade(state, req),
        "selection.setSection" => handle_selection_set_section(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

use crate::ipc::helpers::{
    opt_i64, req_i64, respond, school_year_param, session_for, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::registry;
use serde_json::json;

fn handle_subjects(state: &mut AppState, req: &Request) -> HandlerResult {
    let session = session_for(state, req)?;
    let section_id = opt_i64(&req.params, "sectionId")?
        .or_else(|| session.and_then(|s| s.selection.section_id));
    let subjects = registry::get_subjects(&state.db, section_id)?;
    Ok(json!({ "subjects": subjects }))
}

fn handle_periods(state: &mut AppState, req: &Request) -> HandlerResult {
    let session = session_for(state, req)?;
    let school_year_id = school_year_param(req, session)?;
    let periods = registry::get_periods(&state.db, school_year_id)?;
    Ok(json!({ "periods": periods }))
}

fn handle_sections(state: &mut AppState, req: &Request) -> HandlerResult {
    let session = session_for(state, req)?;
    let grade_id = opt_i64(&req.params, "gradeId")?;
    let school_year_id = school_year_param(req, session)?;
    let sections = registry::get_sections(&state.db, grade_id, school_year_id)?;
    Ok(json!({ "sections": sections }))
}

fn handle_students(state: &mut AppState, req: &Request) -> HandlerResult {
    let section_id = req_i64(&req.params, "sectionId")?;
    let students = registry::get_students_by_section(&state.db, section_id)?;
    let rows: Vec<serde_json::Value> = students
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "sectionId": s.section_id,
                "lastName": s.last_name,
                "firstName": s.first_name,
                "displayName": s.display_name(),
            })
        })
        .collect();
    Ok(json!({ "students": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "registry.subjects" => handle_subjects(state, req),
        "registry.periods" => handle_periods(state, req),
        "registry.sections" => handle_sections(state, req),
        "registry.students" => handle_students(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

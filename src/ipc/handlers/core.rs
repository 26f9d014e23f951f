use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{respond, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::registry::{self, ReferenceSeed};
use serde_json::json;

fn handle_health(state: &mut AppState, _req: &Request) -> HandlerResult {
    let counts = registry::counts(&state.db)?;
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.sessions.len(),
        "registry": {
            "sections": counts.sections,
            "subjects": counts.subjects,
            "periods": counts.periods,
            "students": counts.students,
        }
    }))
}

fn handle_registry_load(state: &mut AppState, req: &Request) -> HandlerResult {
    let seed: ReferenceSeed = serde_json::from_value(req.params.clone())
        .map_err(|e| HandlerErr::bad_params(format!("invalid reference payload: {}", e)))?;

    // The load is one transaction; a dangling foreign key rejects all of it.
    let summary = registry::load_seed(&state.db, &seed).map_err(|e| {
        HandlerErr::new("registry_load_failed", format!("{:#}", e))
    })?;

    tracing::info!(
        event = "registry_loaded",
        sections = summary.sections,
        subjects = summary.subjects,
        periods = summary.periods,
        students = summary.students
    );

    Ok(json!({
        "loaded": {
            "schoolYears": summary.school_years,
            "grades": summary.grades,
            "sections": summary.sections,
            "subjects": summary.subjects,
            "sectionSubjects": summary.section_subjects,
            "periods": summary.periods,
            "students": summary.students,
        }
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "registry.load" => handle_registry_load(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

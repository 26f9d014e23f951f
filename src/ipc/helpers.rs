use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::session::SessionContext;
use serde_json::json;

pub type HandlerResult = Result<serde_json::Value, HandlerErr>;

pub fn respond(req: &Request, result: HandlerResult) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn opt_i64(params: &serde_json::Value, key: &str) -> Result<Option<i64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| {
            HandlerErr::bad_params(format!("{} must be an integer", key))
                .with_details(json!({ key: v }))
        }),
    }
}

pub fn req_i64(params: &serde_json::Value, key: &str) -> Result<i64, HandlerErr> {
    opt_i64(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn opt_f64(params: &serde_json::Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or_else(|| {
            HandlerErr::bad_params(format!("{} must be a number", key))
                .with_details(json!({ key: v }))
        }),
    }
}

pub fn opt_str<'a>(
    params: &'a serde_json::Value,
    key: &str,
) -> Result<Option<&'a str>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a string", key))),
    }
}

/// Resolves `params.sessionId` when present. Omitting it is fine; naming a
/// session that is not open is not.
pub fn session_for<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<Option<&'a SessionContext>, HandlerErr> {
    let Some(session_id) = opt_str(&req.params, "sessionId")? else {
        return Ok(None);
    };
    state.sessions.get(session_id).map(Some).ok_or_else(|| {
        HandlerErr::new("no_session", "session is not open")
            .with_details(json!({ "sessionId": session_id }))
    })
}

/// `params.sectionId`, falling back to the session's selected section.
pub fn section_param(
    req: &Request,
    session: Option<&SessionContext>,
) -> Result<i64, HandlerErr> {
    opt_i64(&req.params, "sectionId")?
        .or_else(|| session.and_then(|s| s.selection.section_id))
        .ok_or_else(|| HandlerErr::bad_params("missing sectionId"))
}

/// `params.schoolYearId`, falling back to the session's school year.
pub fn school_year_param(
    req: &Request,
    session: Option<&SessionContext>,
) -> Result<Option<i64>, HandlerErr> {
    let explicit = opt_i64(&req.params, "schoolYearId")?;
    Ok(explicit.or_else(|| session.and_then(|s| s.school_year_id)))
}

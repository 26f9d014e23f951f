use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    opt_f64, opt_i64, opt_str, req_i64, respond, section_param, session_for, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, UpsertScore};
use serde_json::json;

const MAX_BULK_EDITS: usize = 5000;

/// Values an edit may omit because the enclosing request supplies them.
struct EditDefaults {
    section_id: i64,
    student_id: Option<i64>,
    max_score: f64,
}

fn parse_upsert(
    obj: &serde_json::Value,
    defaults: &EditDefaults,
) -> Result<UpsertScore, HandlerErr> {
    let student_id = opt_i64(obj, "studentId")?
        .or(defaults.student_id)
        .ok_or_else(|| HandlerErr::bad_params("missing studentId"))?;
    let section_id = opt_i64(obj, "sectionId")?.unwrap_or(defaults.section_id);
    let score = opt_f64(obj, "score")?.ok_or_else(|| HandlerErr::bad_params("missing score"))?;
    let max_score = opt_f64(obj, "maxScore")?.unwrap_or(defaults.max_score);
    let observations = opt_str(obj, "observations")?
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(UpsertScore {
        student_id,
        section_id,
        subject_id: req_i64(obj, "subjectId")?,
        period_id: req_i64(obj, "periodId")?,
        score,
        max_score,
        observations,
    })
}

fn handle_scores_list(state: &mut AppState, req: &Request) -> HandlerResult {
    let session = session_for(state, req)?;
    let student_id = req_i64(&req.params, "studentId")?;
    let section_id = section_param(req, session)?;
    let scores = store::query_by_student_section(&state.db, student_id, section_id)?;
    Ok(json!({ "scores": scores }))
}

fn handle_scores_upsert(state: &mut AppState, req: &Request) -> HandlerResult {
    let session = session_for(state, req)?;
    let defaults = EditDefaults {
        section_id: section_param(req, session)?,
        student_id: None,
        max_score: state.config.default_max_score,
    };
    let upsert = parse_upsert(&req.params, &defaults)?;

    let outcome = store::upsert(&state.db, &upsert).map_err(|e| {
        tracing::warn!(event = "score_rejected", code = e.code(), error = %e);
        HandlerErr::from(e)
    })?;

    Ok(json!({
        "record": outcome.record,
        "created": outcome.created,
    }))
}

fn handle_scores_bulk_upsert(state: &mut AppState, req: &Request) -> HandlerResult {
    let session = session_for(state, req)?;
    let defaults = EditDefaults {
        section_id: section_param(req, session)?,
        student_id: opt_i64(&req.params, "studentId")?,
        max_score: state.config.default_max_score,
    };
    let Some(edits) = req.params.get("edits").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing edits[]"));
    };

    if edits.len() > MAX_BULK_EDITS {
        let rejected = edits.len();
        return Ok(json!({
            "updated": 0,
            "created": 0,
            "rejected": rejected,
            "limitExceeded": true,
            "errors": [{
                "index": -1,
                "code": "too_many_edits",
                "message": format!(
                    "bulk payload exceeds max edits: {} > {}",
                    rejected, MAX_BULK_EDITS
                )
            }]
        }));
    }

    let mut updated: usize = 0;
    let mut created: usize = 0;
    let mut errors: Vec<serde_json::Value> = Vec::new();

    for (i, edit) in edits.iter().enumerate() {
        if !edit.is_object() {
            errors.push(json!({
                "index": i,
                "code": "bad_params",
                "message": format!("edit at index {} must be an object", i),
            }));
            continue;
        }

        let outcome = parse_upsert(edit, &defaults)
            .and_then(|u| store::upsert(&state.db, &u).map_err(HandlerErr::from));
        match outcome {
            Ok(o) => {
                updated += 1;
                if o.created {
                    created += 1;
                }
            }
            Err(e) => errors.push(json!({
                "index": i,
                "code": e.code,
                "message": e.message,
            })),
        }
    }

    tracing::info!(
        event = "scores_bulk_upsert",
        updated,
        created,
        rejected = errors.len()
    );

    Ok(json!({
        "updated": updated,
        "created": created,
        "rejected": errors.len(),
        "errors": errors,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "scores.list" => handle_scores_list(state, req),
        "scores.upsert" => handle_scores_upsert(state, req),
        "scores.bulkUpsert" => handle_scores_bulk_upsert(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

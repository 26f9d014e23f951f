use crate::calc;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{
    opt_i64, req_i64, respond, section_param, session_for, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Period, StudentGrid, Subject};
use crate::registry;
use crate::session::SessionContext;
use crate::store;
use rusqlite::Connection;
use serde_json::json;

/// Subjects and periods a section is graded on. Periods come from the
/// section's school year; an unknown section falls back to the requested or
/// session school year and, having no subjects, yields an empty grid.
fn section_frame(
    conn: &Connection,
    req: &Request,
    session: Option<&SessionContext>,
    section_id: i64,
) -> Result<(Vec<Subject>, Vec<Period>), HandlerErr> {
    let school_year_id = match opt_i64(&req.params, "schoolYearId")? {
        Some(id) => Some(id),
        None => match registry::get_section(conn, section_id)? {
            Some(section) => Some(section.school_year_id),
            None => session.and_then(|s| s.school_year_id),
        },
    };
    let subjects = registry::get_subjects(conn, Some(section_id))?;
    let periods = registry::get_periods(conn, school_year_id)?;
    Ok((subjects, periods))
}

fn student_grid(
    conn: &Connection,
    subjects: &[Subject],
    periods: &[Period],
    student_id: i64,
    section_id: i64,
) -> rusqlite::Result<StudentGrid> {
    let scores = store::query_by_student_section(conn, student_id, section_id)?;
    Ok(calc::student_grid(subjects, periods, &scores))
}

fn handle_grid_student(state: &mut AppState, req: &Request) -> HandlerResult {
    let session = session_for(state, req)?;
    let student_id = req_i64(&req.params, "studentId")?;
    let section_id = section_param(req, session)?;

    let (subjects, periods) = section_frame(&state.db, req, session, section_id)?;
    let grid = student_grid(&state.db, &subjects, &periods, student_id, section_id)?;

    let mut result = json!(grid);
    result["studentId"] = json!(student_id);
    result["sectionId"] = json!(section_id);
    Ok(result)
}

fn handle_grid_section(state: &mut AppState, req: &Request) -> HandlerResult {
    let session = session_for(state, req)?;
    let section_id = section_param(req, session)?;

    let (subjects, periods) = section_frame(&state.db, req, session, section_id)?;
    let students = registry::get_students_by_section(&state.db, section_id)?;

    let mut standings: Vec<serde_json::Value> = Vec::with_capacity(students.len());
    let mut failing_count: usize = 0;
    for student in &students {
        let grid = student_grid(&state.db, &subjects, &periods, student.id, section_id)?;
        if grid.is_failing {
            failing_count += 1;
        }
        standings.push(json!({
            "studentId": student.id,
            "displayName": student.display_name(),
            "generalAvg": grid.general_avg,
            "isFailing": grid.is_failing,
            "failedSubjects": grid.failed_subjects,
        }));
    }

    Ok(json!({
        "sectionId": section_id,
        "subjects": subjects,
        "periods": periods,
        "students": standings,
        "failingCount": failing_count,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grid.student" => handle_grid_student(state, req),
        "grid.section" => handle_grid_section(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}

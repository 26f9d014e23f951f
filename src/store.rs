//! Score records. `upsert` is the only write path for grade data.

use crate::model::ScoreRecord;
use crate::registry::{self, RefKind};
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("score {score} is outside [0, {max_score}]")]
    ScoreOutOfRange { score: f64, max_score: f64 },
    #[error("unknown {} id {id}", .kind.as_str())]
    UnknownReference { kind: RefKind, id: i64 },
    #[error("{} {id} is not part of section {section_id}", .kind.as_str())]
    NotInSection {
        kind: RefKind,
        id: i64,
        section_id: i64,
    },
    #[error("failed to save score: {0}")]
    SaveFailed(#[source] rusqlite::Error),
}

impl ScoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ScoreOutOfRange { .. } => "score_out_of_range",
            Self::UnknownReference { .. } | Self::NotInSection { .. } => "unknown_reference",
            Self::SaveFailed(_) => "save_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::ScoreOutOfRange { score, max_score } => {
                Some(json!({ "score": score, "maxScore": max_score }))
            }
            Self::UnknownReference { kind, id } => {
                Some(json!({ "kind": kind.as_str(), "id": id }))
            }
            Self::NotInSection {
                kind,
                id,
                section_id,
            } => Some(json!({ "kind": kind.as_str(), "id": id, "sectionId": section_id })),
            Self::SaveFailed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertScore {
    pub student_id: i64,
    pub section_id: i64,
    pub subject_id: i64,
    pub period_id: i64,
    pub score: f64,
    pub max_score: f64,
    #[serde(default)]
    pub observations: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub record: ScoreRecord,
    pub created: bool,
}

fn validate_range(score: f64, max_score: f64) -> Result<(), ScoreError> {
    let in_range = score.is_finite()
        && max_score.is_finite()
        && max_score >= 0.0
        && score >= 0.0
        && score <= max_score;
    if in_range {
        Ok(())
    } else {
        Err(ScoreError::ScoreOutOfRange { score, max_score })
    }
}

fn require(conn: &Connection, kind: RefKind, id: i64) -> Result<(), ScoreError> {
    match registry::exists(conn, kind, id) {
        Ok(true) => Ok(()),
        Ok(false) => Err(ScoreError::UnknownReference { kind, id }),
        Err(e) => Err(ScoreError::SaveFailed(e)),
    }
}

fn require_in_section(conn: &Connection, req: &UpsertScore) -> Result<(), ScoreError> {
    let enrolled = registry::student_in_section(conn, req.student_id, req.section_id)
        .map_err(ScoreError::SaveFailed)?;
    if !enrolled {
        return Err(ScoreError::NotInSection {
            kind: RefKind::Student,
            id: req.student_id,
            section_id: req.section_id,
        });
    }
    let offered = registry::section_offers_subject(conn, req.section_id, req.subject_id)
        .map_err(ScoreError::SaveFailed)?;
    if !offered {
        return Err(ScoreError::NotInSection {
            kind: RefKind::Subject,
            id: req.subject_id,
            section_id: req.section_id,
        });
    }
    Ok(())
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScoreRecord> {
    Ok(ScoreRecord {
        id: row.get(0)?,
        student_id: row.get(1)?,
        section_id: row.get(2)?,
        subject_id: row.get(3)?,
        period_id: row.get(4)?,
        score: row.get(5)?,
        max_score: row.get(6)?,
        observations: row.get(7)?,
        graded_at: row.get(8)?,
        active: row.get(9)?,
    })
}

const RECORD_COLUMNS: &str = "id, student_id, section_id, subject_id, period_id, score, max_score,
     observations, graded_at, active";

/// Inserts or updates the active record for the request's natural key.
///
/// Validation happens before anything is written: an out-of-range score, a
/// dangling id, a student outside the section or a subject the section does
/// not grade leaves the store untouched. An existing active record keeps its
/// id and max score, so an update is also checked against the stored max;
/// score, observations and `graded_at` take the new values.
pub fn upsert(conn: &Connection, req: &UpsertScore) -> Result<UpsertOutcome, ScoreError> {
    validate_range(req.score, req.max_score)?;
    require(conn, RefKind::Student, req.student_id)?;
    require(conn, RefKind::Section, req.section_id)?;
    require(conn, RefKind::Subject, req.subject_id)?;
    require(conn, RefKind::Period, req.period_id)?;
    require_in_section(conn, req)?;

    let graded_at = chrono::Utc::now().to_rfc3339();
    let tx = conn
        .unchecked_transaction()
        .map_err(ScoreError::SaveFailed)?;

    let existing: Option<(i64, f64)> = tx
        .query_row(
            "SELECT id, max_score FROM score_records
             WHERE student_id = ? AND section_id = ? AND subject_id = ? AND period_id = ?
               AND active = 1",
            (req.student_id, req.section_id, req.subject_id, req.period_id),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(ScoreError::SaveFailed)?;

    let (id, created) = match existing {
        Some((id, stored_max)) => {
            validate_range(req.score, stored_max)?;
            tx.execute(
                "UPDATE score_records
                 SET score = ?, observations = ?, graded_at = ?
                 WHERE id = ?",
                (req.score, &req.observations, &graded_at, id),
            )
            .map_err(ScoreError::SaveFailed)?;
            (id, false)
        }
        None => {
            tx.execute(
                "INSERT INTO score_records(
                   student_id, section_id, subject_id, period_id,
                   score, max_score, observations, graded_at, active)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, 1)",
                (
                    req.student_id,
                    req.section_id,
                    req.subject_id,
                    req.period_id,
                    req.score,
                    req.max_score,
                    &req.observations,
                    &graded_at,
                ),
            )
            .map_err(ScoreError::SaveFailed)?;
            (tx.last_insert_rowid(), true)
        }
    };

    let sql = format!("SELECT {} FROM score_records WHERE id = ?", RECORD_COLUMNS);
    let record = tx
        .query_row(&sql, [id], record_from_row)
        .map_err(ScoreError::SaveFailed)?;
    tx.commit().map_err(ScoreError::SaveFailed)?;

    tracing::debug!(
        event = "score_upserted",
        record_id = id,
        created,
        student_id = req.student_id,
        subject_id = req.subject_id,
        period_id = req.period_id
    );

    Ok(UpsertOutcome { record, created })
}

/// Active records of one student within one section, oldest first.
pub fn query_by_student_section(
    conn: &Connection,
    student_id: i64,
    section_id: i64,
) -> rusqlite::Result<Vec<ScoreRecord>> {
    let sql = format!(
        "SELECT {} FROM score_records
         WHERE student_id = ? AND section_id = ? AND active = 1
         ORDER BY id",
        RECORD_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map((student_id, section_id), record_from_row)?;
    rows.collect()
}

//! Per-caller context: the school year a session works in and its cascading
//! grade -> section -> students selection.

use crate::model::{Section, Student};
use crate::registry::{self, RefKind};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("unknown {} id {id}", .kind.as_str())]
    UnknownReference { kind: RefKind, id: i64 },
    #[error("section {section_id} does not belong to grade {grade_id}")]
    SectionOutsideGrade { section_id: i64, grade_id: i64 },
    #[error(transparent)]
    Query(#[from] rusqlite::Error),
}

impl SelectionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownReference { .. } => "unknown_reference",
            Self::SectionOutsideGrade { .. } => "bad_params",
            Self::Query(_) => "db_query_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    pub grade_id: Option<i64>,
    pub section_id: Option<i64>,
}

impl SelectionState {
    /// Selects a grade. A selected section that is not part of the new grade
    /// is cleared; the return value tells whether that happened.
    pub fn set_grade(
        &mut self,
        conn: &Connection,
        grade_id: Option<i64>,
    ) -> Result<bool, SelectionError> {
        if let Some(id) = grade_id {
            if !registry::exists(conn, RefKind::Grade, id)? {
                return Err(SelectionError::UnknownReference {
                    kind: RefKind::Grade,
                    id,
                });
            }
        }

        let keep_section = match (self.section_id, grade_id) {
            (Some(section_id), Some(grade_id)) => registry::get_section(conn, section_id)?
                .map(|s| s.grade_id == grade_id)
                .unwrap_or(false),
            _ => false,
        };

        self.grade_id = grade_id;
        let cleared = self.section_id.is_some() && !keep_section;
        if cleared {
            self.section_id = None;
        }
        Ok(cleared)
    }

    /// Selects a section. With no grade selected the section's grade is
    /// adopted; a section from another grade is rejected.
    pub fn set_section(
        &mut self,
        conn: &Connection,
        section_id: Option<i64>,
    ) -> Result<(), SelectionError> {
        let Some(section_id) = section_id else {
            self.section_id = None;
            return Ok(());
        };
        let Some(section) = registry::get_section(conn, section_id)? else {
            return Err(SelectionError::UnknownReference {
                kind: RefKind::Section,
                id: section_id,
            });
        };
        match self.grade_id {
            Some(grade_id) if grade_id != section.grade_id => {
                return Err(SelectionError::SectionOutsideGrade {
                    section_id,
                    grade_id,
                });
            }
            Some(_) => {}
            None => self.grade_id = Some(section.grade_id),
        }
        self.section_id = Some(section_id);
        Ok(())
    }

    /// Sections offered for the selected grade; empty until a grade is chosen.
    pub fn sections(
        &self,
        conn: &Connection,
        school_year_id: Option<i64>,
    ) -> rusqlite::Result<Vec<Section>> {
        match self.grade_id {
            Some(grade_id) => registry::get_sections(conn, Some(grade_id), school_year_id),
            None => Ok(Vec::new()),
        }
    }

    /// Students of the selected section; empty until a section is chosen.
    pub fn students(&self, conn: &Connection) -> rusqlite::Result<Vec<Student>> {
        match self.section_id {
            Some(section_id) => registry::get_students_by_section(conn, section_id),
            None => Ok(Vec::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub session_id: String,
    pub school_year_id: Option<i64>,
    pub opened_at: String,
    pub selection: SelectionState,
}

#[derive(Debug, Default)]
pub struct Sessions {
    by_id: HashMap<String, SessionContext>,
}

impl Sessions {
    pub fn open(&mut self, school_year_id: Option<i64>) -> SessionContext {
        let ctx = SessionContext {
            session_id: Uuid::new_v4().to_string(),
            school_year_id,
            opened_at: chrono::Utc::now().to_rfc3339(),
            selection: SelectionState::default(),
        };
        self.by_id.insert(ctx.session_id.clone(), ctx.clone());
        ctx
    }

    pub fn close(&mut self, session_id: &str) -> bool {
        self.by_id.remove(session_id).is_some()
    }

    pub fn get(&self, session_id: &str) -> Option<&SessionContext> {
        self.by_id.get(session_id)
    }

    pub fn get_mut(&mut self, session_id: &str) -> Option<&mut SessionContext> {
        self.by_id.get_mut(session_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }
}

//! Reference data the grid is built against: school years, grades, sections,
//! subjects, periods and students.
//!
//! Administration of this data lives elsewhere; the daemon only loads it
//! (`registry.load` or the startup seed file) and reads it back.

use crate::model::{Period, Section, Student, Subject};
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceSeed {
    #[serde(default)]
    pub school_years: Vec<SeedSchoolYear>,
    #[serde(default)]
    pub grades: Vec<SeedGrade>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub section_subjects: Vec<SeedSectionSubject>,
    #[serde(default)]
    pub periods: Vec<SeedPeriod>,
    #[serde(default)]
    pub students: Vec<SeedStudent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSchoolYear {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedGrade {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub sort_order: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSectionSubject {
    pub section_id: i64,
    pub subject_id: i64,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedPeriod {
    pub id: i64,
    pub school_year_id: i64,
    pub period_number: i64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedStudent {
    pub id: i64,
    pub section_id: i64,
    pub last_name: String,
    pub first_name: String,
    #[serde(default)]
    pub sort_order: i64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub school_years: usize,
    pub grades: usize,
    pub sections: usize,
    pub subjects: usize,
    pub section_subjects: usize,
    pub periods: usize,
    pub students: usize,
}

/// Inserts or replaces every row of `seed` in one transaction. Loading the
/// same payload twice leaves the registry unchanged.
pub fn load_seed(conn: &Connection, seed: &ReferenceSeed) -> anyhow::Result<LoadSummary> {
    let tx = conn.unchecked_transaction()?;

    for y in &seed.school_years {
        tx.execute(
            "INSERT INTO school_years(id, name) VALUES(?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            (y.id, &y.name),
        )
        .with_context(|| format!("school year {}", y.id))?;
    }
    for g in &seed.grades {
        tx.execute(
            "INSERT INTO grades(id, name, sort_order) VALUES(?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               sort_order = excluded.sort_order",
            (g.id, &g.name, g.sort_order),
        )
        .with_context(|| format!("grade {}", g.id))?;
    }
    for s in &seed.sections {
        tx.execute(
            "INSERT INTO sections(id, grade_id, school_year_id, name) VALUES(?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               grade_id = excluded.grade_id,
               school_year_id = excluded.school_year_id,
               name = excluded.name",
            (s.id, s.grade_id, s.school_year_id, &s.name),
        )
        .with_context(|| format!("section {}", s.id))?;
    }
    for s in &seed.subjects {
        tx.execute(
            "INSERT INTO subjects(id, name, code) VALUES(?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, code = excluded.code",
            (s.id, &s.name, &s.code),
        )
        .with_context(|| format!("subject {}", s.id))?;
    }
    for ss in &seed.section_subjects {
        tx.execute(
            "INSERT INTO section_subjects(section_id, subject_id, sort_order, active)
             VALUES(?, ?, ?, ?)
             ON CONFLICT(section_id, subject_id) DO UPDATE SET
               sort_order = excluded.sort_order,
               active = excluded.active",
            (ss.section_id, ss.subject_id, ss.sort_order, ss.active),
        )
        .with_context(|| format!("section {} subject {}", ss.section_id, ss.subject_id))?;
    }
    for p in &seed.periods {
        tx.execute(
            "INSERT INTO periods(id, school_year_id, period_number, name) VALUES(?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               school_year_id = excluded.school_year_id,
               period_number = excluded.period_number,
               name = excluded.name",
            (p.id, p.school_year_id, p.period_number, &p.name),
        )
        .with_context(|| format!("period {}", p.id))?;
    }
    for s in &seed.students {
        tx.execute(
            "INSERT INTO students(id, section_id, last_name, first_name, sort_order)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               section_id = excluded.section_id,
               last_name = excluded.last_name,
               first_name = excluded.first_name,
               sort_order = excluded.sort_order",
            (s.id, s.section_id, &s.last_name, &s.first_name, s.sort_order),
        )
        .with_context(|| format!("student {}", s.id))?;
    }

    tx.commit()?;

    Ok(LoadSummary {
        school_years: seed.school_years.len(),
        grades: seed.grades.len(),
        sections: seed.sections.len(),
        subjects: seed.subjects.len(),
        section_subjects: seed.section_subjects.len(),
        periods: seed.periods.len(),
        students: seed.students.len(),
    })
}

pub fn load_seed_file(conn: &Connection, path: &Path) -> anyhow::Result<LoadSummary> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.to_string_lossy()))?;
    let seed: ReferenceSeed = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse seed file {}", path.to_string_lossy()))?;
    load_seed(conn, &seed)
}

fn subject_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        name: row.get(1)?,
        code: row.get(2)?,
    })
}

/// Active subjects of `section_id` in their section order, or every subject
/// by name when no section is given.
pub fn get_subjects(conn: &Connection, section_id: Option<i64>) -> rusqlite::Result<Vec<Subject>> {
    match section_id {
        Some(section_id) => {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.name, s.code
                 FROM section_subjects ss
                 JOIN subjects s ON s.id = ss.subject_id
                 WHERE ss.section_id = ? AND ss.active = 1
                 ORDER BY ss.sort_order, s.id",
            )?;
            let rows = stmt.query_map([section_id], subject_from_row)?;
            rows.collect()
        }
        None => {
            let mut stmt = conn.prepare("SELECT id, name, code FROM subjects ORDER BY name, id")?;
            let rows = stmt.query_map([], subject_from_row)?;
            rows.collect()
        }
    }
}

/// Periods ordered by `period_number`, ties broken by id.
pub fn get_periods(
    conn: &Connection,
    school_year_id: Option<i64>,
) -> rusqlite::Result<Vec<Period>> {
    let mut stmt = conn.prepare(
        "SELECT id, period_number, name FROM periods
         WHERE (?1 IS NULL OR school_year_id = ?1)
         ORDER BY period_number, id",
    )?;
    let rows = stmt.query_map([school_year_id], |row| {
        Ok(Period {
            id: row.get(0)?,
            period_number: row.get(1)?,
            name: row.get(2)?,
        })
    })?;
    rows.collect()
}

pub fn get_sections(
    conn: &Connection,
    grade_id: Option<i64>,
    school_year_id: Option<i64>,
) -> rusqlite::Result<Vec<Section>> {
    let mut stmt = conn.prepare(
        "SELECT id, grade_id, school_year_id, name FROM sections
         WHERE (?1 IS NULL OR grade_id = ?1)
           AND (?2 IS NULL OR school_year_id = ?2)
         ORDER BY name, id",
    )?;
    let rows = stmt.query_map((grade_id, school_year_id), |row| {
        Ok(Section {
            id: row.get(0)?,
            grade_id: row.get(1)?,
            school_year_id: row.get(2)?,
            name: row.get(3)?,
        })
    })?;
    rows.collect()
}

pub fn get_section(conn: &Connection, section_id: i64) -> rusqlite::Result<Option<Section>> {
    conn.query_row(
        "SELECT id, grade_id, school_year_id, name FROM sections WHERE id = ?",
        [section_id],
        |row| {
            Ok(Section {
                id: row.get(0)?,
                grade_id: row.get(1)?,
                school_year_id: row.get(2)?,
                name: row.get(3)?,
            })
        },
    )
    .optional()
}

pub fn get_students_by_section(
    conn: &Connection,
    section_id: i64,
) -> rusqlite::Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, section_id, last_name, first_name FROM students
         WHERE section_id = ?
         ORDER BY sort_order, last_name, first_name, id",
    )?;
    let rows = stmt.query_map([section_id], |row| {
        Ok(Student {
            id: row.get(0)?,
            section_id: row.get(1)?,
            last_name: row.get(2)?,
            first_name: row.get(3)?,
        })
    })?;
    rows.collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Student,
    Section,
    Subject,
    Period,
    Grade,
    SchoolYear,
}

impl RefKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Section => "section",
            Self::Subject => "subject",
            Self::Period => "period",
            Self::Grade => "grade",
            Self::SchoolYear => "schoolYear",
        }
    }

    fn table(self) -> &'static str {
        match self {
            Self::Student => "students",
            Self::Section => "sections",
            Self::Subject => "subjects",
            Self::Period => "periods",
            Self::Grade => "grades",
            Self::SchoolYear => "school_years",
        }
    }
}

pub fn exists(conn: &Connection, kind: RefKind, id: i64) -> rusqlite::Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", kind.table());
    let found: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    Ok(found.is_some())
}

pub fn student_in_section(
    conn: &Connection,
    student_id: i64,
    section_id: i64,
) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM students WHERE id = ? AND section_id = ?",
            (student_id, section_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// True when the subject is an active part of the section's curriculum.
pub fn section_offers_subject(
    conn: &Connection,
    section_id: i64,
    subject_id: i64,
) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM section_subjects
             WHERE section_id = ? AND subject_id = ? AND active = 1",
            (section_id, subject_id),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryCounts {
    pub sections: i64,
    pub subjects: i64,
    pub periods: i64,
    pub students: i64,
}

pub fn counts(conn: &Connection) -> rusqlite::Result<RegistryCounts> {
    conn.query_row(
        "SELECT
           (SELECT COUNT(*) FROM sections),
           (SELECT COUNT(*) FROM subjects),
           (SELECT COUNT(*) FROM periods),
           (SELECT COUNT(*) FROM students)",
        [],
        |r| {
            Ok(RegistryCounts {
                sections: r.get(0)?,
                subjects: r.get(1)?,
                periods: r.get(2)?,
                students: r.get(3)?,
            })
        },
    )
}

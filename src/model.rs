use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub id: i64,
    pub period_number: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: i64,
    pub grade_id: i64,
    pub school_year_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub section_id: i64,
    pub last_name: String,
    pub first_name: String,
}

impl Student {
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub id: i64,
    pub student_id: i64,
    pub section_id: i64,
    pub subject_id: i64,
    pub period_id: i64,
    pub score: f64,
    pub max_score: f64,
    pub observations: Option<String>,
    pub graded_at: String,
    pub active: bool,
}

/// One (subject, period) slot of a student's grid. `score: None` means no
/// grade has been entered, which is not the same as a recorded zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub period_id: i64,
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRow {
    pub subject_id: i64,
    pub subject_name: String,
    pub subject_code: String,
    pub cells: Vec<Cell>,
    pub year_avg: Option<f64>,
    pub failed_last_period: bool,
    pub failed_year_avg: bool,
}

impl SubjectRow {
    pub fn is_failed(&self) -> bool {
        self.failed_last_period || self.failed_year_avg
    }

    pub fn cell_for(&self, period_id: i64) -> Option<&Cell> {
        self.cells.iter().find(|c| c.period_id == period_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGrid {
    pub periods: Vec<Period>,
    pub rows: Vec<SubjectRow>,
    pub period_avgs: BTreeMap<i64, Option<f64>>,
    pub general_avg: Option<f64>,
    pub is_failing: bool,
    pub failed_subjects: Vec<String>,
}

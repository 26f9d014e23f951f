use crate::model::{Cell, Period, ScoreRecord, StudentGrid, Subject, SubjectRow};
use std::collections::{BTreeMap, HashMap};

/// Year averages strictly below this value fail the subject. 2.00 passes.
pub const PROMOTION_THRESHOLD: f64 = 2.0;

/// A last-period score equal to this value marks the subject as failed,
/// whatever the year average is. Exact equality, not a threshold.
pub const FAIL_MARK: f64 = 1.0;

const ROUND2_LIMIT: f64 = 1e13;

/// 2-decimal rounding, half away from zero: `round(100*x) / 100`.
///
/// Past `1e13` the product `100 * x` loses enough precision that rounding twice
/// can drift by an ulp, so such values are returned untouched. This keeps
/// `round2(round2(x)) == round2(x)` for every finite `x`.
pub fn round2(x: f64) -> f64 {
    if !x.is_finite() || x.abs() >= ROUND2_LIMIT {
        return x;
    }
    (x * 100.0).round() / 100.0
}

fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut sum = 0.0;
    let mut n: usize = 0;
    for v in values {
        sum += v;
        n += 1;
    }
    if n == 0 {
        None
    } else {
        Some(round2(sum / n as f64))
    }
}

/// Builds the full subject x period matrix for one student.
///
/// Rows follow `subjects` order and cells follow `periods` order. Every pair
/// gets a cell; pairs without an active record hold `score: None`.
pub fn build_grid(
    subjects: &[Subject],
    periods: &[Period],
    scores: &[ScoreRecord],
) -> Vec<SubjectRow> {
    let mut by_key: HashMap<(i64, i64), &ScoreRecord> = HashMap::new();
    for r in scores.iter().filter(|r| r.active) {
        by_key.entry((r.subject_id, r.period_id)).or_insert(r);
    }

    subjects
        .iter()
        .map(|subject| {
            let cells = periods
                .iter()
                .map(|period| match by_key.get(&(subject.id, period.id)) {
                    Some(r) => Cell {
                        period_id: period.id,
                        score: Some(r.score),
                        record_id: Some(r.id),
                    },
                    None => Cell {
                        period_id: period.id,
                        score: None,
                        record_id: None,
                    },
                })
                .collect();
            SubjectRow {
                subject_id: subject.id,
                subject_name: subject.name.clone(),
                subject_code: subject.code.clone(),
                cells,
                year_avg: None,
                failed_last_period: false,
                failed_year_avg: false,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Averages {
    pub rows: Vec<SubjectRow>,
    pub period_avgs: BTreeMap<i64, Option<f64>>,
    pub general_avg: Option<f64>,
}

/// Fills `year_avg` on every row and computes per-period and general averages.
///
/// Missing cells are left out of both numerator and denominator. The general
/// average is taken over the already-rounded year averages.
pub fn recalc_averages(mut rows: Vec<SubjectRow>, periods: &[Period]) -> Averages {
    for row in rows.iter_mut() {
        row.year_avg = mean(row.cells.iter().filter_map(|c| c.score));
    }

    let period_avgs = periods
        .iter()
        .map(|p| {
            let avg = mean(
                rows.iter()
                    .filter_map(|row| row.cell_for(p.id).and_then(|c| c.score)),
            );
            (p.id, avg)
        })
        .collect();

    let general_avg = mean(rows.iter().filter_map(|row| row.year_avg));

    Averages {
        rows,
        period_avgs,
        general_avg,
    }
}

/// The period with the highest `period_number`. On ties the first one in
/// input order wins.
pub fn last_period(periods: &[Period]) -> Option<&Period> {
    let mut best: Option<&Period> = None;
    for p in periods {
        if best.map(|b| p.period_number > b.period_number).unwrap_or(true) {
            best = Some(p);
        }
    }
    best
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub rows: Vec<SubjectRow>,
    pub is_failing: bool,
    pub failed_subjects: Vec<String>,
}

/// Sets the failure flags on each row and derives the student verdict.
/// Expects `year_avg` to be filled already (see [`recalc_averages`]).
pub fn evaluate_promotion(mut rows: Vec<SubjectRow>, periods: &[Period]) -> Evaluation {
    let last = last_period(periods).map(|p| p.id);

    for row in rows.iter_mut() {
        row.failed_last_period = last
            .and_then(|pid| row.cell_for(pid))
            .and_then(|c| c.score)
            .map(|s| s == FAIL_MARK)
            .unwrap_or(false);
        row.failed_year_avg = row
            .year_avg
            .map(|avg| avg < PROMOTION_THRESHOLD)
            .unwrap_or(false);
    }

    let failed_subjects: Vec<String> = rows
        .iter()
        .filter(|row| row.is_failed())
        .map(|row| row.subject_name.clone())
        .collect();

    Evaluation {
        is_failing: !failed_subjects.is_empty(),
        failed_subjects,
        rows,
    }
}

/// `build_grid -> recalc_averages -> evaluate_promotion` for one student.
pub fn student_grid(
    subjects: &[Subject],
    periods: &[Period],
    scores: &[ScoreRecord],
) -> StudentGrid {
    let rows = build_grid(subjects, periods, scores);
    let averages = recalc_averages(rows, periods);
    let evaluation = evaluate_promotion(averages.rows, periods);

    StudentGrid {
        periods: periods.to_vec(),
        rows: evaluation.rows,
        period_avgs: averages.period_avgs,
        general_avg: averages.general_avg,
        is_failing: evaluation.is_failing,
        failed_subjects: evaluation.failed_subjects,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn period(id: i64, n: i64) -> Period {
        Period {
            id,
            period_number: n,
            name: format!("P{}", n),
        }
    }

    fn subject(id: i64, name: &str) -> Subject {
        Subject {
            id,
            name: name.to_string(),
            code: name.to_ascii_uppercase(),
        }
    }

    fn record(id: i64, subject_id: i64, period_id: i64, score: f64) -> ScoreRecord {
        ScoreRecord {
            id,
            student_id: 1,
            section_id: 1,
            subject_id,
            period_id,
            score,
            max_score: 10.0,
            observations: None,
            graded_at: "2026-03-01T00:00:00Z".to_string(),
            active: true,
        }
    }

    fn three_periods() -> Vec<Period> {
        vec![period(10, 1), period(11, 2), period(12, 3)]
    }

    #[test]
    fn round2_is_half_away_from_zero() {
        assert_eq!(round2(7.745), 7.75);
        assert_eq!(round2(-7.745), -7.75);
        assert_eq!(round2(1.0 / 3.0), 0.33);
        assert_eq!(round2(2.0), 2.0);
    }

    #[test]
    fn round2_is_idempotent() {
        let samples = [
            0.0, 0.005, 1.994999, 1.995, 2.675, -3.14159, 7.75, 123456.789, 9_999_999_999_999.995,
            1e15 - 0.375, 1e20, -1e300, f64::MAX, f64::MIN_POSITIVE,
        ];
        for x in samples {
            assert_eq!(round2(round2(x)), round2(x), "x = {}", x);
        }
    }

    #[test]
    fn grid_is_complete_even_without_scores() {
        let subjects = vec![subject(1, "math"), subject(2, "art")];
        let periods = three_periods();
        let rows = build_grid(&subjects, &periods, &[record(1000, 1, 11, 0.0)]);

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.cells.len() == 3));
        assert_eq!(rows[0].subject_name, "math");
        assert_eq!(rows[0].cells[1].score, Some(0.0));
        assert_eq!(rows[0].cells[1].record_id, Some(1000));
        assert_eq!(rows[0].cells[0].score, None);
        assert_eq!(rows[1].cells.iter().filter(|c| c.score.is_some()).count(), 0);
    }

    #[test]
    fn grid_ignores_inactive_records() {
        let mut old = record(1000, 1, 10, 3.0);
        old.active = false;
        let rows = build_grid(&[subject(1, "math")], &three_periods(), &[old]);
        assert_eq!(rows[0].cells[0].score, None);
    }

    #[test]
    fn year_avg_skips_missing_periods() {
        let scores = vec![record(1000, 1, 10, 8.5), record(1001, 1, 11, 7.0)];
        let grid = student_grid(&[subject(1, "math")], &three_periods(), &scores);
        assert_eq!(grid.rows[0].year_avg, Some(7.75));
        assert_eq!(grid.general_avg, Some(7.75));
    }

    #[test]
    fn recorded_zero_counts_but_missing_does_not() {
        let scores = vec![record(1000, 1, 10, 6.0), record(1001, 1, 11, 0.0)];
        let grid = student_grid(&[subject(1, "math")], &three_periods(), &scores);
        assert_eq!(grid.rows[0].year_avg, Some(3.0));
    }

    #[test]
    fn period_avgs_cover_every_period() {
        let subjects = vec![subject(1, "math"), subject(2, "art")];
        let scores = vec![record(1000, 1, 10, 4.0), record(1001, 2, 10, 5.0)];
        let grid = student_grid(&subjects, &three_periods(), &scores);

        assert_eq!(grid.period_avgs.len(), 3);
        assert_eq!(grid.period_avgs.get(&10), Some(&Some(4.5)));
        assert_eq!(grid.period_avgs.get(&11), Some(&None));
        assert_eq!(grid.period_avgs.get(&12), Some(&None));
    }

    #[test]
    fn general_avg_is_mean_of_year_avgs() {
        let subjects = vec![subject(1, "math"), subject(2, "art"), subject(3, "music")];
        let scores = vec![
            record(1000, 1, 10, 1.0),
            record(1001, 1, 11, 2.0),
            record(1002, 1, 12, 2.0),
            record(1003, 2, 10, 4.01),
        ];
        let grid = student_grid(&subjects, &three_periods(), &scores);

        assert_eq!(grid.rows[0].year_avg, Some(1.67));
        assert_eq!(grid.rows[1].year_avg, Some(4.01));
        assert_eq!(grid.rows[2].year_avg, None);
        assert_eq!(grid.general_avg, Some(2.84));
    }

    #[test]
    fn general_avg_is_null_only_when_every_year_avg_is_null() {
        let subjects = vec![subject(1, "math"), subject(2, "art")];
        let empty = student_grid(&subjects, &three_periods(), &[]);
        assert!(empty.rows.iter().all(|r| r.year_avg.is_none()));
        assert_eq!(empty.general_avg, None);
        assert!(!empty.is_failing);

        let one = student_grid(&subjects, &three_periods(), &[record(1000, 2, 12, 0.0)]);
        assert_eq!(one.general_avg, Some(0.0));
    }

    #[test]
    fn last_period_score_of_one_fails_regardless_of_year_avg() {
        let scores = vec![
            record(1000, 1, 10, 9.0),
            record(1001, 1, 11, 8.0),
            record(1002, 1, 12, 1.0),
        ];
        let grid = student_grid(&[subject(1, "math")], &three_periods(), &scores);

        assert_eq!(grid.rows[0].year_avg, Some(6.0));
        assert!(grid.rows[0].failed_last_period);
        assert!(!grid.rows[0].failed_year_avg);
        assert!(grid.is_failing);
        assert_eq!(grid.failed_subjects, vec!["math".to_string()]);
    }

    #[test]
    fn fail_mark_is_exact_equality() {
        let periods = three_periods();
        for s in [0.0, 0.5, 1.01, 1.5] {
            let grid = student_grid(&[subject(1, "math")], &periods, &[record(1000, 1, 12, s)]);
            assert!(!grid.rows[0].failed_last_period, "score = {}", s);
        }
        // A 1 outside the last period is just a low score.
        let grid = student_grid(
            &[subject(1, "math")],
            &periods,
            &[record(1000, 1, 10, 1.0), record(1001, 1, 12, 5.0)],
        );
        assert!(!grid.rows[0].failed_last_period);
        assert!(!grid.rows[0].failed_year_avg);
    }

    #[test]
    fn year_avg_threshold_boundary() {
        let periods = three_periods();
        let below = student_grid(&[subject(1, "math")], &periods, &[record(1000, 1, 10, 1.99)]);
        assert_eq!(below.rows[0].year_avg, Some(1.99));
        assert!(below.rows[0].failed_year_avg);

        let at = student_grid(&[subject(1, "math")], &periods, &[record(1000, 1, 10, 2.0)]);
        assert_eq!(at.rows[0].year_avg, Some(2.0));
        assert!(!at.rows[0].failed_year_avg);
        assert!(!at.is_failing);
    }

    #[test]
    fn failed_subjects_follow_row_order() {
        let subjects = vec![subject(1, "math"), subject(2, "art"), subject(3, "music")];
        let scores = vec![
            record(1000, 3, 10, 1.5),
            record(1001, 2, 10, 9.0),
            record(1002, 1, 12, 1.0),
        ];
        let grid = student_grid(&subjects, &three_periods(), &scores);
        assert_eq!(
            grid.failed_subjects,
            vec!["math".to_string(), "music".to_string()]
        );
    }

    #[test]
    fn last_period_tie_takes_first_in_input_order() {
        let periods = vec![period(10, 1), period(20, 2), period(21, 2)];
        assert_eq!(last_period(&periods).map(|p| p.id), Some(20));

        let reversed = vec![period(21, 2), period(10, 1), period(20, 2)];
        assert_eq!(last_period(&reversed).map(|p| p.id), Some(21));

        assert!(last_period(&[]).is_none());
    }

    #[test]
    fn last_period_is_by_number_not_position() {
        let periods = vec![period(12, 3), period(10, 1), period(11, 2)];
        let grid = student_grid(&[subject(1, "math")], &periods, &[record(1000, 1, 12, 1.0)]);
        assert!(grid.rows[0].failed_last_period);
    }

    #[test]
    fn empty_reference_data_yields_empty_grid() {
        let grid = student_grid(&[], &[], &[record(1000, 1, 10, 5.0)]);
        assert!(grid.rows.is_empty());
        assert!(grid.period_avgs.is_empty());
        assert_eq!(grid.general_avg, None);
        assert!(!grid.is_failing);

        let no_periods = student_grid(&[subject(1, "math")], &[], &[]);
        assert_eq!(no_periods.rows.len(), 1);
        assert!(no_periods.rows[0].cells.is_empty());
        assert_eq!(no_periods.rows[0].year_avg, None);
    }

    /// One row per subject, one optional score per period.
    fn sparse_grid() -> impl Strategy<Value = Vec<Vec<Option<f64>>>> {
        prop::collection::vec(
            prop::collection::vec(prop::option::of(0.0..=10.0f64), 3),
            0..5,
        )
    }

    fn grid_from(cells: &[Vec<Option<f64>>]) -> StudentGrid {
        let periods = three_periods();
        let subjects: Vec<Subject> = (0..cells.len() as i64)
            .map(|i| subject(i + 1, &format!("s{}", i + 1)))
            .collect();
        let mut scores = Vec::new();
        for (i, row) in cells.iter().enumerate() {
            for (p, score) in periods.iter().zip(row) {
                if let Some(score) = score {
                    let id = 1000 + scores.len() as i64;
                    scores.push(record(id, i as i64 + 1, p.id, *score));
                }
            }
        }
        student_grid(&subjects, &periods, &scores)
    }

    proptest! {
        #[test]
        fn round2_is_idempotent_for_any_finite_value(x in any::<f64>()) {
            prop_assume!(x.is_finite());
            prop_assert_eq!(round2(round2(x)), round2(x));
        }

        #[test]
        fn year_avg_is_mean_of_present_cells(cells in sparse_grid()) {
            let grid = grid_from(&cells);
            for (row, expected_cells) in grid.rows.iter().zip(&cells) {
                let present: Vec<f64> = expected_cells.iter().flatten().copied().collect();
                let expected = if present.is_empty() {
                    None
                } else {
                    Some(round2(present.iter().sum::<f64>() / present.len() as f64))
                };
                prop_assert_eq!(row.year_avg, expected);
                prop_assert_eq!(
                    row.cells.iter().filter(|c| c.score.is_some()).count(),
                    present.len()
                );
            }
        }

        #[test]
        fn general_avg_is_null_iff_every_year_avg_is_null(cells in sparse_grid()) {
            let grid = grid_from(&cells);
            let all_null = grid.rows.iter().all(|r| r.year_avg.is_none());
            prop_assert_eq!(grid.general_avg.is_none(), all_null);
        }
    }
}

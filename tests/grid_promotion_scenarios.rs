use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn fixture_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .env_remove("GRADEBOOKD_SEED")
        .env_remove("GRADEBOOKD_LATENCY_MS")
        .env_remove("GRADEBOOKD_DEFAULT_MAX_SCORE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn load_reference(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) {
    let text = std::fs::read_to_string(fixture_path("fixtures/reference/school.json"))
        .expect("read reference fixture");
    let seed: serde_json::Value = serde_json::from_str(&text).expect("parse reference fixture");
    let _ = request_ok(stdin, reader, "load", "registry.load", seed);
}

fn put_score(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    student_id: i64,
    subject_id: i64,
    period_id: i64,
    score: f64,
) {
    let id = format!("put-{}-{}-{}", student_id, subject_id, period_id);
    let _ = request_ok(
        stdin,
        reader,
        &id,
        "scores.upsert",
        json!({
            "studentId": student_id,
            "sectionId": 10,
            "subjectId": subject_id,
            "periodId": period_id,
            "score": score,
            "maxScore": 10.0
        }),
    );
}

fn row<'a>(grid: &'a serde_json::Value, code: &str) -> &'a serde_json::Value {
    grid["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .find(|r| r.get("subjectCode").and_then(|v| v.as_str()) == Some(code))
        .expect("subject row")
}

#[test]
fn student_grid_averages_and_verdict() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    load_reference(&mut stdin, &mut reader);

    // Mathematics: two of three periods graded.
    put_score(&mut stdin, &mut reader, 7, 100, 500, 8.5);
    put_score(&mut stdin, &mut reader, 7, 100, 501, 7.0);
    // Language: good average but the last period holds the fail mark.
    put_score(&mut stdin, &mut reader, 7, 101, 500, 9.0);
    put_score(&mut stdin, &mut reader, 7, 101, 501, 8.0);
    put_score(&mut stdin, &mut reader, 7, 101, 502, 1.0);
    // Science: never graded.

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "grid",
        "grid.student",
        json!({ "studentId": 7, "sectionId": 10 }),
    );

    let rows = grid["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 3);
    assert!(rows
        .iter()
        .all(|r| r["cells"].as_array().map(|c| c.len()) == Some(3)));

    let math = row(&grid, "MAT");
    assert_eq!(math.get("yearAvg").and_then(|v| v.as_f64()), Some(7.75));
    assert_eq!(math.pointer("/cells/2/score"), Some(&serde_json::Value::Null));
    assert_eq!(math.get("failedYearAvg").and_then(|v| v.as_bool()), Some(false));

    let language = row(&grid, "LEN");
    assert_eq!(language.get("yearAvg").and_then(|v| v.as_f64()), Some(6.0));
    assert_eq!(
        language.get("failedLastPeriod").and_then(|v| v.as_bool()),
        Some(true)
    );

    let science = row(&grid, "CIE");
    assert!(science.get("yearAvg").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(
        science.get("failedYearAvg").and_then(|v| v.as_bool()),
        Some(false)
    );
    assert_eq!(
        science.get("failedLastPeriod").and_then(|v| v.as_bool()),
        Some(false)
    );

    assert_eq!(grid.get("generalAvg").and_then(|v| v.as_f64()), Some(6.88));
    assert_eq!(
        grid.pointer("/periodAvgs/500").and_then(|v| v.as_f64()),
        Some(8.75)
    );
    assert_eq!(
        grid.pointer("/periodAvgs/501").and_then(|v| v.as_f64()),
        Some(7.5)
    );
    assert_eq!(
        grid.pointer("/periodAvgs/502").and_then(|v| v.as_f64()),
        Some(1.0)
    );
    assert_eq!(grid.get("isFailing").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(grid["failedSubjects"], json!(["Language"]));
}

#[test]
fn year_average_threshold_is_inclusive_at_two() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    load_reference(&mut stdin, &mut reader);

    put_score(&mut stdin, &mut reader, 8, 100, 500, 1.99);
    let below = request_ok(
        &mut stdin,
        &mut reader,
        "below",
        "grid.student",
        json!({ "studentId": 8, "sectionId": 10 }),
    );
    assert_eq!(
        row(&below, "MAT").get("failedYearAvg").and_then(|v| v.as_bool()),
        Some(true)
    );
    assert_eq!(below["failedSubjects"], json!(["Mathematics"]));

    put_score(&mut stdin, &mut reader, 8, 100, 500, 2.0);
    let at = request_ok(
        &mut stdin,
        &mut reader,
        "at",
        "grid.student",
        json!({ "studentId": 8, "sectionId": 10 }),
    );
    assert_eq!(
        row(&at, "MAT").get("yearAvg").and_then(|v| v.as_f64()),
        Some(2.0)
    );
    assert_eq!(at.get("isFailing").and_then(|v| v.as_bool()), Some(false));
}

#[test]
fn ungraded_student_has_null_averages() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    load_reference(&mut stdin, &mut reader);

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "empty",
        "grid.student",
        json!({ "studentId": 8, "sectionId": 10 }),
    );
    assert!(grid["generalAvg"].is_null());
    assert_eq!(grid.get("isFailing").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(grid["rows"].as_array().map(|r| r.len()), Some(3));
}

#[test]
fn unknown_section_yields_empty_grid() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    load_reference(&mut stdin, &mut reader);

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "nowhere",
        "grid.student",
        json!({ "studentId": 7, "sectionId": 9999 }),
    );
    assert_eq!(grid["rows"].as_array().map(|r| r.len()), Some(0));
    assert!(grid["generalAvg"].is_null());
}

#[test]
fn section_standings_count_failing_students() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    load_reference(&mut stdin, &mut reader);

    put_score(&mut stdin, &mut reader, 7, 100, 502, 1.0);
    put_score(&mut stdin, &mut reader, 8, 100, 500, 6.0);
    put_score(&mut stdin, &mut reader, 8, 101, 500, 4.0);

    let section = request_ok(
        &mut stdin,
        &mut reader,
        "section",
        "grid.section",
        json!({ "sectionId": 10 }),
    );
    assert_eq!(section.get("failingCount").and_then(|v| v.as_u64()), Some(1));

    let students = section["students"].as_array().expect("students");
    assert_eq!(students.len(), 2);
    assert_eq!(
        students[0].get("displayName").and_then(|v| v.as_str()),
        Some("Rojas, Ana")
    );
    assert_eq!(students[0].get("isFailing").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(students[0]["failedSubjects"], json!(["Mathematics"]));
    assert_eq!(students[1].get("generalAvg").and_then(|v| v.as_f64()), Some(5.0));
    assert_eq!(students[1].get("isFailing").and_then(|v| v.as_bool()), Some(false));
}

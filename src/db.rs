use rusqlite::Connection;

/// First id handed out to a new score record.
pub const SCORE_ID_START: i64 = 1000;

/// Opens the session database. Everything lives in memory and is gone when
/// the process exits.
pub fn open_memory_db() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_years(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            id INTEGER PRIMARY KEY,
            grade_id INTEGER NOT NULL,
            school_year_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(grade_id) REFERENCES grades(id),
            FOREIGN KEY(school_year_id) REFERENCES school_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sections_grade_year ON sections(grade_id, school_year_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS section_subjects(
            section_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY(section_id, subject_id),
            FOREIGN KEY(section_id) REFERENCES sections(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS periods(
            id INTEGER PRIMARY KEY,
            school_year_id INTEGER NOT NULL,
            period_number INTEGER NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(school_year_id) REFERENCES school_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_periods_year ON periods(school_year_id, period_number)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id INTEGER PRIMARY KEY,
            section_id INTEGER NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(section_id) REFERENCES sections(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_section ON students(section_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS score_records(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            section_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            period_id INTEGER NOT NULL,
            score REAL NOT NULL,
            max_score REAL NOT NULL,
            observations TEXT,
            graded_at TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(section_id) REFERENCES sections(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(period_id) REFERENCES periods(id)
        )",
        [],
    )?;
    // At most one active record per natural key; inactive history may repeat.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_score_records_active_key
         ON score_records(student_id, section_id, subject_id, period_id)
         WHERE active = 1",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_score_records_student_section
         ON score_records(student_id, section_id)",
        [],
    )?;

    seed_score_sequence(conn)?;
    Ok(())
}

fn seed_score_sequence(conn: &Connection) -> anyhow::Result<()> {
    let seeded: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_sequence WHERE name = 'score_records'",
        [],
        |r| r.get(0),
    )?;
    if seeded == 0 {
        conn.execute(
            "INSERT INTO sqlite_sequence(name, seq) VALUES('score_records', ?)",
            [SCORE_ID_START - 1],
        )?;
    }
    Ok(())
}

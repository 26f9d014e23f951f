mod calc;
mod config;
mod db;
mod ipc;
mod model;
mod registry;
mod session;
mod store;

use std::io::{self, BufRead, Write};
use tracing_subscriber::{fmt, EnvFilter};

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries the protocol; logs go to stderr only.
    fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cfg = config::Config::from_env();
    init_logging(&cfg.log_level);

    let conn = db::open_memory_db()?;
    if let Some(seed) = cfg.seed_path.as_deref() {
        let summary = registry::load_seed_file(&conn, seed)?;
        tracing::info!(
            event = "seed_loaded",
            path = %seed.to_string_lossy(),
            sections = summary.sections,
            subjects = summary.subjects,
            periods = summary.periods,
            students = summary.students
        );
    }

    tracing::info!(event = "daemon_start", config = ?cfg);

    let latency = cfg.latency();
    let mut state = ipc::AppState {
        db: conn,
        sessions: session::Sessions::default(),
        config: cfg,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => {
                tracing::debug!(event = "request", id = %req.id, method = %req.method);
                ipc::handle_request(&mut state, req)
            }
            Err(e) => {
                tracing::warn!(event = "bad_json", error = %e);
                ipc::bad_json(e.to_string())
            }
        };

        // Requests are handled one at a time, so a fixed delay never reorders replies.
        if let Some(d) = latency {
            std::thread::sleep(d);
        }

        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    tracing::info!(event = "daemon_stop");
    Ok(())
}

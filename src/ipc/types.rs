use crate::config::Config;
use crate::session::Sessions;
use rusqlite::Connection;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub db: Connection,
    pub sessions: Sessions,
    pub config: Config,
}

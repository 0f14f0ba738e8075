//! Flat JSON documents persisted by the League Manager.
//!
//! - `<root>/leagues/<league_id>/standings.json`
//! - `<root>/matches/<league_id>/<match_id>.json`
//!
//! Documents are written to a sibling temporary file then renamed over the target, so a reader
//! never sees a half-written document.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::protocol::messages::{MatchResult, MatchStatus, StandingRow};

pub const SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingsDocument {
    pub schema_version: String,
    pub league_id: String,
    pub last_updated: String,
    pub rounds_completed: u32,
    pub standings: Vec<StandingRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub schema_version: String,
    pub league_id: String,
    pub match_id: String,
    pub round_id: u32,
    #[serde(rename = "player_A_id")]
    pub player_a_id: String,
    #[serde(rename = "player_B_id")]
    pub player_b_id: String,
    pub status: MatchStatus,
    pub winner: Option<String>,
    pub result: Option<MatchResult>,
    pub recorded_at: String,
}

/// Root of the persisted documents.
#[derive(Debug, Clone)]
pub struct DataStore {
    root: PathBuf,
}

impl DataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DataStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn standings_path(&self, league_id: &str) -> PathBuf {
        self.root
            .join("leagues")
            .join(league_id)
            .join("standings.json")
    }

    pub fn match_path(&self, league_id: &str, match_id: &str) -> PathBuf {
        self.root
            .join("matches")
            .join(league_id)
            .join(format!("{match_id}.json"))
    }

    pub fn save_standings(&self, document: &StandingsDocument) -> anyhow::Result<()> {
        write_json(&self.standings_path(&document.league_id), document)
    }

    /// `None` when nothing was saved yet.
    pub fn load_standings(&self, league_id: &str) -> anyhow::Result<Option<StandingsDocument>> {
        read_json(&self.standings_path(league_id))
    }

    pub fn save_match(&self, record: &MatchRecord) -> anyhow::Result<()> {
        write_json(&self.match_path(&record.league_id, &record.match_id), record)
    }

    pub fn load_match(&self, league_id: &str, match_id: &str) -> anyhow::Result<Option<MatchRecord>> {
        read_json(&self.match_path(league_id, match_id))
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("could not create directory {}", dir.display()))?;
    }
    let body = serde_json::to_vec_pretty(value).context("could not serialize document")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).with_context(|| format!("could not write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("could not move {} into place", path.display()))?;
    trace!(path = %path.display(), "document saved");
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let body = match fs::read(path) {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("could not read {}", path.display())),
    };
    let value = serde_json::from_slice(&body)
        .with_context(|| format!("{} is not a valid document", path.display()))?;
    Ok(Some(value))
}

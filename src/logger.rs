//! Console/file tracing setup and the JSON-lines event record of each role.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::Serialize;
use serde_json::{Map, Value};
use time::{
    format_description::{self, parse},
    OffsetDateTime,
};
use tracing::{debug, error, info, subscriber::set_global_default, warn, Level};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, FmtSubscriber};

use crate::configuration::Configuration;
use crate::protocol::{utc_timestamp, MessageType};

/// Installs the global tracing subscriber of a role.
///
/// Output goes to stdout, or to `<log_root>/<component>_<date>_log.txt` when logging to file is
/// enabled. An already-installed subscriber is kept as is.
pub fn init_logger(component: &str, config: &Configuration) -> anyhow::Result<()> {
    let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        local_offset,
        format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
            .context("invalid timer format")?,
    );

    let writer = if config.log {
        fs::create_dir_all(&config.log_root).with_context(|| {
            format!("could not create log directory {}", config.log_root.display())
        })?;
        let path = config.log_root.join(get_log_file_name(component)?);
        let file = File::create(&path)
            .with_context(|| format!("could not create log file {}", path.display()))?;
        BoxMakeWriter::new(Mutex::new(file))
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if config.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_ansi(!config.log)
        .with_timer(timer)
        .with_writer(writer)
        .finish();

    if set_global_default(subscriber).is_err() {
        debug!("a global tracing subscriber is already installed, keeping it");
    }
    Ok(())
}

fn get_log_file_name(component: &str) -> anyhow::Result<String> {
    let format = parse("[year]-[month]-[day]_[hour]-[minute]-[second]")?;
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    Ok(format!("{component}_{}_log.txt", now.format(&format)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Direction of a logged protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

/// Append-only JSON-lines record of what a role did.
///
/// Each line is `{timestamp, component, event_type, level, ...details}`. Failing to write is
/// never fatal: the event still reaches `tracing`.
#[derive(Debug)]
pub struct EventLog {
    component: String,
    path: Option<PathBuf>,
    file: Mutex<Option<File>>,
}

impl EventLog {
    /// Opens `<log_root>/league/<league_id>/<component>.log.jsonl`, or
    /// `<log_root>/agents/<component>.log.jsonl` without a league.
    pub fn new(component: impl Into<String>, league_id: Option<&str>, log_root: &Path) -> Self {
        let component = component.into();
        let dir = match league_id {
            Some(league_id) => log_root.join("league").join(league_id),
            None => log_root.join("agents"),
        };
        let path = dir.join(format!("{component}.log.jsonl"));
        let file = fs::create_dir_all(&dir)
            .and_then(|_| OpenOptions::new().create(true).append(true).open(&path));
        match file {
            Ok(file) => EventLog {
                component,
                path: Some(path),
                file: Mutex::new(Some(file)),
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "event log unavailable");
                EventLog::disabled(component)
            }
        }
    }

    /// An event log that only forwards to `tracing`.
    pub fn disabled(component: impl Into<String>) -> Self {
        EventLog {
            component: component.into(),
            path: None,
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn log(&self, level: EventLevel, event_type: &str, details: Value) {
        match level {
            EventLevel::Debug => debug!(component = %self.component, event_type, %details),
            EventLevel::Info => info!(component = %self.component, event_type, %details),
            EventLevel::Warning => warn!(component = %self.component, event_type, %details),
            EventLevel::Error => error!(component = %self.component, event_type, %details),
        }

        let mut entry = Map::new();
        entry.insert("timestamp".into(), Value::String(utc_timestamp()));
        entry.insert("component".into(), Value::String(self.component.clone()));
        entry.insert("event_type".into(), Value::String(event_type.to_string()));
        entry.insert(
            "level".into(),
            serde_json::to_value(level).unwrap_or(Value::Null),
        );
        match details {
            Value::Object(fields) => entry.extend(fields),
            Value::Null => {}
            other => {
                entry.insert("details".into(), other);
            }
        }

        let mut file = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(file) = file.as_mut() {
            let line = Value::Object(entry).to_string();
            if let Err(e) = writeln!(file, "{line}") {
                warn!(component = %self.component, error = %e, "could not append to event log");
            }
        }
    }

    pub fn debug(&self, event_type: &str, details: Value) {
        self.log(EventLevel::Debug, event_type, details);
    }

    pub fn info(&self, event_type: &str, details: Value) {
        self.log(EventLevel::Info, event_type, details);
    }

    pub fn warning(&self, event_type: &str, details: Value) {
        self.log(EventLevel::Warning, event_type, details);
    }

    pub fn error(&self, event_type: &str, details: Value) {
        self.log(EventLevel::Error, event_type, details);
    }

    /// Records a protocol message as `MCP_SENT` or `MCP_RECEIVED`.
    pub fn message(&self, direction: Direction, message_type: MessageType, details: Value) {
        let event_type = match direction {
            Direction::Sent => "MCP_SENT",
            Direction::Received => "MCP_RECEIVED",
        };
        let mut fields = match details {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        fields.insert("message_type".into(), Value::String(message_type.to_string()));
        self.log(EventLevel::Debug, event_type, Value::Object(fields));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn read_lines(path: &Path) -> Vec<Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn league_events_are_appended_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new("referee_REF01", Some("league_x"), dir.path());
        log.info("MATCH_START", json!({"match_id": "R1M1"}));
        log.message(
            Direction::Sent,
            MessageType::GameInvitation,
            json!({"to": "P01"}),
        );

        let path = dir.path().join("league/league_x/referee_REF01.log.jsonl");
        assert_eq!(log.path(), Some(path.as_path()));
        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["component"], "referee_REF01");
        assert_eq!(lines[0]["event_type"], "MATCH_START");
        assert_eq!(lines[0]["level"], "INFO");
        assert_eq!(lines[0]["match_id"], "R1M1");
        assert_eq!(lines[1]["event_type"], "MCP_SENT");
        assert_eq!(lines[1]["message_type"], "GAME_INVITATION");
    }

    #[test]
    fn agents_without_league_log_under_agents() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new("player_alice", None, dir.path());
        log.warning("REGISTRATION_FAILED", json!({"reason": "timeout"}));
        let lines = read_lines(&dir.path().join("agents/player_alice.log.jsonl"));
        assert_eq!(lines[0]["level"], "WARNING");
    }

    #[test]
    fn disabled_log_does_not_touch_the_disk() {
        let log = EventLog::disabled("quiet");
        log.error("ANYTHING", json!({}));
        assert!(log.path().is_none());
    }
}

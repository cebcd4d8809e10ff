// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! Durable participant registry log.
//!
//! Registrations must survive a node restart so participants keep their
//! ids. The log is a YAML stream, one document per record, appended and
//! fsynced before a registration is confirmed. Recovery replays the
//! stream in order; a register followed by an unregister of the same id
//! cancels out.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use wayline_schedule::{ParticipantDescription, ParticipantId};

/// Errors from the durable registry log.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The log could not be read or durably written. Fatal at startup.
    #[error("registry log io: {0}")]
    Io(#[from] std::io::Error),
    /// The log contents did not parse. Fatal at startup.
    #[error("registry log parse: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// A record referenced an id inconsistently (e.g., a register without
    /// a description). Fatal at startup.
    #[error("registry log corrupt at record {record}")]
    Corrupt {
        /// Zero-based index of the offending record.
        record: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum LogOp {
    Register,
    Unregister,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LogRecord {
    op: LogOp,
    id: ParticipantId,
    description: Option<ParticipantDescription>,
    timestamp: u64,
}

/// Append-only participant registry persistence.
pub struct ParticipantRegistry {
    path: PathBuf,
    file: File,
}

impl std::fmt::Debug for ParticipantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticipantRegistry")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ParticipantRegistry {
    /// Opens (or creates) the log at `path` and replays it.
    ///
    /// Returns the registry handle plus the surviving registrations in
    /// record order, ready to be restored into a database.
    ///
    /// # Errors
    /// Any [`RegistryError`] here is fatal: the service must not accept
    /// mutations on top of an unreadable registry.
    pub fn open(
        path: impl AsRef<Path>,
    ) -> Result<(Self, Vec<(ParticipantId, ParticipantDescription)>), RegistryError> {
        let path = path.as_ref().to_path_buf();
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };

        let mut survivors: Vec<(ParticipantId, ParticipantDescription)> = Vec::new();
        for (index, document) in serde_yaml::Deserializer::from_str(&contents).enumerate() {
            let record = LogRecord::deserialize(document)?;
            match record.op {
                LogOp::Register => {
                    let description = record
                        .description
                        .ok_or(RegistryError::Corrupt { record: index })?;
                    survivors.push((record.id, description));
                }
                LogOp::Unregister => {
                    survivors.retain(|(id, _)| *id != record.id);
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok((Self { path, file }, survivors))
    }

    /// Path of the backing log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a registration record and fsyncs it.
    ///
    /// # Errors
    /// Returns [`RegistryError::Io`] when the record cannot be made
    /// durable; the caller must roll the registration back.
    pub fn record_registration(
        &mut self,
        id: ParticipantId,
        description: &ParticipantDescription,
    ) -> Result<(), RegistryError> {
        self.append(&LogRecord {
            op: LogOp::Register,
            id,
            description: Some(description.clone()),
            timestamp: unix_seconds(),
        })
    }

    /// Appends an unregistration record and fsyncs it.
    ///
    /// # Errors
    /// Returns [`RegistryError::Io`] when the record cannot be made
    /// durable.
    pub fn record_unregistration(&mut self, id: ParticipantId) -> Result<(), RegistryError> {
        self.append(&LogRecord {
            op: LogOp::Unregister,
            id,
            description: None,
            timestamp: unix_seconds(),
        })
    }

    fn append(&mut self, record: &LogRecord) -> Result<(), RegistryError> {
        let document = serde_yaml::to_string(record)?;
        self.file.write_all(b"---\n")?;
        self.file.write_all(document.as_bytes())?;
        self.file.sync_all()?;
        Ok(())
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use wayline_schedule::Responsiveness;
    use wayline_traffic::Profile;

    fn description(name: &str) -> ParticipantDescription {
        ParticipantDescription::new(
            name,
            "log_fleet",
            Responsiveness::Responsive,
            Profile::circle_mm(250),
        )
    }

    #[test]
    fn replay_restores_registrations_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("registry.yaml");

        {
            let (mut registry, survivors) = ParticipantRegistry::open(&path).expect("open");
            assert!(survivors.is_empty());
            registry
                .record_registration(ParticipantId(1), &description("alpha"))
                .expect("append");
            registry
                .record_registration(ParticipantId(2), &description("beta"))
                .expect("append");
            registry
                .record_unregistration(ParticipantId(1))
                .expect("append");
        }

        let (_, survivors) = ParticipantRegistry::open(&path).expect("reopen");
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].0, ParticipantId(2));
        assert_eq!(survivors[0].1, description("beta"));
    }

    #[test]
    fn a_register_without_description_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("registry.yaml");
        std::fs::write(
            &path,
            "---\nop: Register\nid: 3\ndescription: null\ntimestamp: 0\n",
        )
        .expect("write");

        assert!(matches!(
            ParticipantRegistry::open(&path),
            Err(RegistryError::Corrupt { record: 0 })
        ));
    }

    #[test]
    fn missing_log_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_, survivors) =
            ParticipantRegistry::open(dir.path().join("fresh.yaml")).expect("open");
        assert!(survivors.is_empty());
    }
}

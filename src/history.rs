// ABOUTME: Append-only deployment history kept on the operator machine and the target.
// ABOUTME: Pointer files naming the current version/method are replaced atomically.

use crate::shell::{Shell, ShellError, quote};
use crate::state::{RemoteLayout, read_remote_line};
use crate::transport::TransportMethod;
use crate::version::Version;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const LOCAL_LOG: &str = "history.log";
pub const CURRENT_VERSION: &str = "current_version";
pub const CURRENT_METHOD: &str = "current_method";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("local history I/O failed at {path}: {source}")]
    Local {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("remote history update failed: {0}")]
    Remote(#[from] ShellError),

    #[error("malformed history line {line:?}: {reason}")]
    Malformed { line: String, reason: String },
}

impl HistoryError {
    /// The copy on the target was not updated.
    pub fn is_remote(&self) -> bool {
        matches!(self, HistoryError::Remote(_))
    }
}

fn local_err(path: &Path) -> impl FnOnce(std::io::Error) -> HistoryError + '_ {
    move |source| HistoryError::Local {
        path: path.to_path_buf(),
        source,
    }
}

/// Terminal outcome of one deployment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStatus {
    Success,
    Failed,
    /// The recorded version was restored after a failed attempt.
    Rollback,
}

impl DeployStatus {
    /// Whether this outcome changes which version is current.
    pub fn moves_pointer(&self) -> bool {
        matches!(self, DeployStatus::Success | DeployStatus::Rollback)
    }
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeployStatus::Success => "success",
            DeployStatus::Failed => "failed",
            DeployStatus::Rollback => "rollback",
        })
    }
}

impl FromStr for DeployStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(DeployStatus::Success),
            "failed" => Ok(DeployStatus::Failed),
            "rollback" => Ok(DeployStatus::Rollback),
            _ => Err(format!("unknown status: {}", s)),
        }
    }
}

/// One line of history: `timestamp|version|status|method`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRecord {
    pub timestamp: DateTime<Utc>,
    pub version: Version,
    pub status: DeployStatus,
    pub method: TransportMethod,
}

impl DeploymentRecord {
    pub fn new(
        timestamp: DateTime<Utc>,
        version: Version,
        status: DeployStatus,
        method: TransportMethod,
    ) -> Self {
        Self {
            timestamp,
            version,
            status,
            method,
        }
    }

    pub fn to_line(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.version,
            self.status,
            self.method
        )
    }

    pub fn parse_line(line: &str) -> Result<Self, HistoryError> {
        let malformed = |reason: String| HistoryError::Malformed {
            line: line.to_string(),
            reason,
        };

        let fields: Vec<&str> = line.trim().split('|').collect();
        let [timestamp, version, status, method] = fields[..] else {
            return Err(malformed(format!("expected 4 fields, got {}", fields.len())));
        };

        Ok(Self {
            timestamp: DateTime::parse_from_rfc3339(timestamp)
                .map_err(|e| malformed(e.to_string()))?
                .with_timezone(&Utc),
            version: Version::parse(version).map_err(|e| malformed(e.to_string()))?,
            status: status.parse().map_err(malformed)?,
            method: method.parse().map_err(malformed)?,
        })
    }
}

/// History and pointer files in the operator-local state directory.
#[derive(Debug, Clone)]
pub struct LocalHistory {
    dir: PathBuf,
}

impl LocalHistory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn ensure_dir(&self) -> Result<(), HistoryError> {
        fs::create_dir_all(&self.dir).map_err(local_err(&self.dir))
    }

    pub fn append(&self, record: &DeploymentRecord) -> Result<(), HistoryError> {
        self.ensure_dir()?;
        let path = self.dir.join(LOCAL_LOG);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(local_err(&path))?;
        writeln!(file, "{}", record.to_line()).map_err(local_err(&path))?;
        file.sync_data().map_err(local_err(&path))
    }

    /// The last `n` records in chronological order.
    pub fn recent(&self, n: usize) -> Result<Vec<DeploymentRecord>, HistoryError> {
        let path = self.dir.join(LOCAL_LOG);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(local_err(&path)(e)),
        };

        let records: Vec<DeploymentRecord> = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| match DeploymentRecord::parse_line(line) {
                Ok(r) => Some(r),
                Err(e) => {
                    tracing::warn!("{}", e);
                    None
                }
            })
            .collect();

        let skip = records.len().saturating_sub(n);
        Ok(records.into_iter().skip(skip).collect())
    }

    pub fn write_pointer(
        &self,
        version: &Version,
        method: TransportMethod,
    ) -> Result<(), HistoryError> {
        self.ensure_dir()?;
        write_atomic(&self.dir.join(CURRENT_VERSION), version.as_str())?;
        write_atomic(&self.dir.join(CURRENT_METHOD), &method.to_string())
    }

    pub fn current_version(&self) -> Result<Option<Version>, HistoryError> {
        let path = self.dir.join(CURRENT_VERSION);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Version::parse(content.trim()).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(local_err(&path)(e)),
        }
    }
}

/// Replace `path` with `content` via a temp file in the same directory and a
/// rename, so readers see either the old or the new value.
fn write_atomic(path: &Path, content: &str) -> Result<(), HistoryError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp.{}", file_name, std::process::id()));

    let mut file = fs::File::create(&tmp).map_err(local_err(&tmp))?;
    writeln!(file, "{}", content).map_err(local_err(&tmp))?;
    file.sync_all().map_err(local_err(&tmp))?;
    drop(file);

    fs::rename(&tmp, path).map_err(local_err(path))
}

/// History and pointer files under `<root>/.deploy` on the target.
pub struct RemoteHistory<'a> {
    shell: &'a dyn Shell,
    layout: &'a RemoteLayout,
}

impl<'a> RemoteHistory<'a> {
    pub fn new(shell: &'a dyn Shell, layout: &'a RemoteLayout) -> Self {
        Self { shell, layout }
    }

    pub async fn append(&self, record: &DeploymentRecord) -> Result<(), HistoryError> {
        let command = format!(
            "mkdir -p {} && printf '%s\\n' {} >> {}",
            quote(&self.layout.state_dir()),
            quote(&record.to_line()),
            quote(&self.layout.versions_log())
        );
        self.shell.run(&command).await?;
        Ok(())
    }

    pub async fn write_pointer(
        &self,
        version: &Version,
        method: TransportMethod,
    ) -> Result<(), HistoryError> {
        let command = format!(
            "mkdir -p {dir} && {version} && {method}",
            dir = quote(&self.layout.state_dir()),
            version = replace_remote_file(&self.layout.current_version(), version.as_str()),
            method = replace_remote_file(&self.layout.current_method(), &method.to_string()),
        );
        self.shell.run(&command).await?;
        Ok(())
    }

    /// `None` means nothing was ever deployed: the first deployment.
    pub async fn current_version(&self) -> Result<Option<Version>, HistoryError> {
        let line = read_remote_line(self.shell, &self.layout.current_version()).await?;
        Ok(line.and_then(|l| match Version::parse(&l) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("ignoring unreadable current_version {:?}: {}", l, e);
                None
            }
        }))
    }

    pub async fn current_method(&self) -> Result<Option<TransportMethod>, HistoryError> {
        let line = read_remote_line(self.shell, &self.layout.current_method()).await?;
        Ok(line.and_then(|l| l.parse().ok()))
    }
}

/// Shell snippet writing `content` to a temp file and renaming it over `path`.
fn replace_remote_file(path: &str, content: &str) -> String {
    let tmp = format!("{}.tmp.$$", path);
    format!(
        "printf '%s\\n' {} > \"{}\" && mv -f \"{}\" {}",
        quote(content),
        tmp,
        tmp,
        quote(path)
    )
}

/// Both history copies. Appends go to the local log first so a lost
/// connection cannot lose the record.
pub struct HistoryStore<'a> {
    local: LocalHistory,
    remote: RemoteHistory<'a>,
}

impl<'a> HistoryStore<'a> {
    pub fn new(local: LocalHistory, remote: RemoteHistory<'a>) -> Self {
        Self { local, remote }
    }

    pub fn local(&self) -> &LocalHistory {
        &self.local
    }

    pub fn remote(&self) -> &RemoteHistory<'a> {
        &self.remote
    }

    /// Append to both logs, then move both pointers when the outcome makes
    /// `record.version` current.
    ///
    /// A local failure does not stop the target from being updated. The
    /// remote error wins when both copies fail.
    pub async fn append(&self, record: &DeploymentRecord) -> Result<(), HistoryError> {
        let moves = record.status.moves_pointer();

        let local = self.local.append(record).and_then(|()| {
            if moves {
                self.local.write_pointer(&record.version, record.method)
            } else {
                Ok(())
            }
        });

        self.remote.append(record).await?;
        if moves {
            self.remote
                .write_pointer(&record.version, record.method)
                .await?;
        }
        local
    }

    /// Record only on the operator machine, leaving the target untouched.
    pub fn append_local(&self, record: &DeploymentRecord) -> Result<(), HistoryError> {
        self.local.append(record)
    }

    pub fn recent(&self, n: usize) -> Result<Vec<DeploymentRecord>, HistoryError> {
        self.local.recent(n)
    }
}

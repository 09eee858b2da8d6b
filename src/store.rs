use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tempfile::Builder;

use crate::archive::fetch_and_extract;
use crate::codepage::{NameRepair, Reencode};
use crate::error::GcisError;
use crate::gcis::GcisClient;

pub const DEFAULT_TIMEZONE: &str = "Asia/Taipei";
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y%m";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// How dataset snapshots are stamped: the timezone the acquisition time is
/// rendered in and the strftime pattern used. The pattern sets the freshness
/// granularity (`%Y%m` keeps one snapshot per month).
#[derive(Debug, Clone)]
pub struct CachePolicy {
    timezone: Tz,
    timestamp_format: String,
}

impl CachePolicy {
    pub fn new(timezone: &str, timestamp_format: &str) -> Result<Self, GcisError> {
        let timezone = timezone
            .parse::<Tz>()
            .map_err(|err| GcisError::InvalidTimezone(format!("{timezone}: {err}")))?;

        if timestamp_format.is_empty()
            || StrftimeItems::new(timestamp_format).any(|item| matches!(item, Item::Error))
        {
            return Err(GcisError::InvalidTimestampFormat(
                timestamp_format.to_string(),
            ));
        }
        let sample = Utc
            .timestamp_opt(0, 0)
            .single()
            .map(|epoch| epoch.format(timestamp_format).to_string())
            .unwrap_or_default();
        if sample.contains(['/', '\\']) {
            return Err(GcisError::InvalidTimestampFormat(format!(
                "{timestamp_format}: renders a path separator"
            )));
        }

        Ok(Self {
            timezone,
            timestamp_format: timestamp_format.to_string(),
        })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn timestamp_format(&self) -> &str {
        &self.timestamp_format
    }

    pub fn stamp(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.timezone)
            .format(&self.timestamp_format)
            .to_string()
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            timezone: Tz::Asia__Taipei,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

/// `dir/name.ext` becomes `dir/name_<stamp>.ext`.
pub fn timestamped_path(path: &Utf8Path, stamp: &str) -> Utf8PathBuf {
    let stem = path.file_stem().unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{stem}_{stamp}.{ext}"),
        None => format!("{stem}_{stamp}"),
    };
    path.with_file_name(file_name)
}

pub struct DatasetCache {
    policy: CachePolicy,
    clock: Box<dyn Clock>,
    repair: Box<dyn NameRepair>,
}

impl DatasetCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            clock: Box::new(SystemClock),
            repair: Box::new(Reencode::default()),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_repair(mut self, repair: Box<dyn NameRepair>) -> Self {
        self.repair = repair;
        self
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Path the snapshot for the current clock reading lives at.
    pub fn current_path(&self, base_path: &Utf8Path) -> Utf8PathBuf {
        timestamped_path(base_path, &self.policy.stamp(self.clock.now()))
    }

    /// Returns the current snapshot of the dataset, downloading it from
    /// `source_url` when no file exists at the current timestamped path.
    pub fn ensure_fresh<C: GcisClient + ?Sized>(
        &self,
        client: &C,
        base_path: &Utf8Path,
        source_url: &str,
    ) -> Result<Utf8PathBuf, GcisError> {
        let target = self.current_path(base_path);
        if target.as_std_path().exists() {
            tracing::info!(path = %target, "dataset snapshot is current");
            return Ok(target);
        }

        let dir = match base_path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| GcisError::Filesystem(format!("create {dir}: {err}")))?;

        let staging = Builder::new()
            .prefix(".gcis-staging")
            .tempdir_in(dir.as_std_path())
            .map_err(|err| GcisError::Filesystem(err.to_string()))?;
        let staging_path = Utf8PathBuf::from_path_buf(staging.path().to_path_buf())
            .map_err(|_| GcisError::Filesystem("invalid staging dir".to_string()))?;

        let extracted = fetch_and_extract(client, source_url, &staging_path, self.repair.as_ref())?;
        let dataset = extracted
            .into_iter()
            .find(|path| path.as_std_path().is_file())
            .ok_or_else(|| GcisError::EmptyArchive(source_url.to_string()))?;
        if dataset.file_name() != base_path.file_name() {
            tracing::info!(
                extracted = dataset.file_name().unwrap_or_default(),
                expected = base_path.file_name().unwrap_or_default(),
                "archive entry name differs from dataset name"
            );
        }

        if publish_new(&dataset, &target)? {
            tracing::info!(from = %dataset, to = %target, "published dataset snapshot");
        } else {
            tracing::info!(path = %target, "snapshot published concurrently, keeping existing file");
        }
        staging
            .close()
            .map_err(|err| GcisError::Filesystem(err.to_string()))?;
        Ok(target)
    }

    /// Every snapshot of `base_path` in its directory, newest stamp first.
    pub fn list_snapshots(&self, base_path: &Utf8Path) -> Result<Vec<Utf8PathBuf>, GcisError> {
        let dir = match base_path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        if !dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let prefix = format!("{}_", base_path.file_stem().unwrap_or_default());
        let suffix = base_path
            .extension()
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        let entries =
            fs::read_dir(dir.as_std_path()).map_err(|err| GcisError::Filesystem(err.to_string()))?;
        let mut snapshots = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| GcisError::Filesystem(err.to_string()))?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with(&prefix)
                && name.ends_with(&suffix)
                && name.len() > prefix.len() + suffix.len()
                && entry.path().is_file()
            {
                snapshots.push(dir.join(name));
            }
        }
        snapshots.sort_by(|a, b| b.cmp(a));
        Ok(snapshots)
    }
}

/// Moves `source` to `target` unless `target` already exists. Returns whether
/// this call created `target`.
fn publish_new(source: &Utf8Path, target: &Utf8Path) -> Result<bool, GcisError> {
    match fs::hard_link(source.as_std_path(), target.as_std_path()) {
        Ok(()) => {
            fs::remove_file(source.as_std_path())
                .map_err(|err| GcisError::Filesystem(err.to_string()))?;
            Ok(true)
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(err) if err.kind() == io::ErrorKind::Unsupported => {
            // no link support on this filesystem
            fs::rename(source.as_std_path(), target.as_std_path())
                .map_err(|err| GcisError::Filesystem(format!("rename {source} to {target}: {err}")))?;
            Ok(true)
        }
        Err(err) => Err(GcisError::Filesystem(format!(
            "publish {source} to {target}: {err}"
        ))),
    }
}

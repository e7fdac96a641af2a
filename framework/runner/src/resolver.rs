use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::NaiveDateTime;
use gatling_influx_core::prelude::DelegatedShutdownListener;
use regex::Regex;
use tokio::select;
use walkdir::WalkDir;

const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Results directories may be created slightly before the relay starts.
const START_TOLERANCE: Duration = Duration::from_secs(60);

const LOG_FILE_NAME: &str = "simulation.log";

/// `<simulation id>-<yyyyMMddHHmmss><millis>`
static RESULTS_DIR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.+-(\d{14})\d{3}$").expect("results directory pattern is valid")
});

const RESULTS_DIR_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Failed to inspect {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{} exists but is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("Failed to search for a results directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("{} exists but is not a readable file", .0.display())]
    LogFileNotReadable(PathBuf),
    #[error("Directory search task failed: {0}")]
    Task(tokio::task::JoinError),
}

/// Result of a lookup that the operator can interrupt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    StoppedByUser,
}

/// Where the log of the current run was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsLocation {
    pub target_dir: PathBuf,
    pub results_dir: PathBuf,
    pub log_file: PathBuf,
}

/// Waits for Gatling to create the results of the run that this relay was started for.
///
/// Every lookup polls until it succeeds, fails in a way that retrying won't fix, or the shutdown
/// listener fires.
pub struct DirectoryResolver {
    not_before: SystemTime,
    retry_interval: Duration,
    shutdown_listener: DelegatedShutdownListener,
}

impl DirectoryResolver {
    pub fn new(started_at: SystemTime, shutdown_listener: DelegatedShutdownListener) -> Self {
        Self {
            not_before: started_at
                .checked_sub(START_TOLERANCE)
                .unwrap_or(UNIX_EPOCH),
            retry_interval: RETRY_INTERVAL,
            shutdown_listener,
        }
    }

    /// Find the target directory, then the results directory for this run, then its log file.
    pub async fn resolve(&mut self, root: &Path) -> Result<Lookup<ResultsLocation>, ResolveError> {
        let target_dir = match self.await_target_directory(root).await? {
            Lookup::Found(dir) => dir,
            Lookup::StoppedByUser => return Ok(Lookup::StoppedByUser),
        };
        let results_dir = match self.await_results_directory(&target_dir).await? {
            Lookup::Found(dir) => dir,
            Lookup::StoppedByUser => return Ok(Lookup::StoppedByUser),
        };
        let log_file = match self.await_log_file(&results_dir).await? {
            Lookup::Found(file) => file,
            Lookup::StoppedByUser => return Ok(Lookup::StoppedByUser),
        };

        Ok(Lookup::Found(ResultsLocation {
            target_dir,
            results_dir,
            log_file,
        }))
    }

    pub async fn await_target_directory(
        &mut self,
        root: &Path,
    ) -> Result<Lookup<PathBuf>, ResolveError> {
        log::info!("Waiting for target directory {}", root.display());

        let lookup = self
            .poll_until("target directory", || check_target_directory(root))
            .await?;
        if let Lookup::Found(dir) = &lookup {
            log::info!("Found target directory {}", dir.display());
        }

        Ok(lookup)
    }

    pub async fn await_results_directory(
        &mut self,
        root: &Path,
    ) -> Result<Lookup<PathBuf>, ResolveError> {
        log::info!("Waiting for a results directory in {}", root.display());

        let not_before = self.not_before;
        self.poll_until("results directory", || {
            let root = root.to_path_buf();
            async move {
                match tokio::task::spawn_blocking(move || find_results_directory(&root, not_before))
                    .await
                {
                    Ok(found) => found,
                    Err(e) => Err(ResolveError::Task(e)),
                }
            }
        })
        .await
    }

    pub async fn await_log_file(
        &mut self,
        results_dir: &Path,
    ) -> Result<Lookup<PathBuf>, ResolveError> {
        let log_file = results_dir.join(LOG_FILE_NAME);
        log::info!("Waiting for log file {}", log_file.display());

        let lookup = self
            .poll_until("log file", || check_log_file(&log_file))
            .await?;
        if let Lookup::Found(file) = &lookup {
            log::info!("Found log file {}", file.display());
        }

        Ok(lookup)
    }

    async fn poll_until<T, F, Fut>(
        &mut self,
        what: &str,
        mut attempt: F,
    ) -> Result<Lookup<T>, ResolveError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, ResolveError>>,
    {
        loop {
            if self.shutdown_listener.should_shutdown() {
                log::info!("Stopped while waiting for the {what}");
                return Ok(Lookup::StoppedByUser);
            }

            if let Some(found) = attempt().await? {
                return Ok(Lookup::Found(found));
            }

            log::debug!(
                "No {what} yet, retrying in {}s",
                self.retry_interval.as_secs()
            );
            select! {
                _ = tokio::time::sleep(self.retry_interval) => {}
                _ = self.shutdown_listener.wait_for_shutdown() => {
                    log::info!("Stopped while waiting for the {what}");
                    return Ok(Lookup::StoppedByUser);
                }
            }
        }
    }
}

async fn check_target_directory(root: &Path) -> Result<Option<PathBuf>, ResolveError> {
    match tokio::fs::metadata(root).await {
        Ok(metadata) if metadata.is_dir() => tokio::fs::canonicalize(root)
            .await
            .map(Some)
            .map_err(|source| ResolveError::Io {
                path: root.to_path_buf(),
                source,
            }),
        Ok(_) => Err(ResolveError::NotADirectory(root.to_path_buf())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ResolveError::Io {
            path: root.to_path_buf(),
            source,
        }),
    }
}

async fn check_log_file(log_file: &Path) -> Result<Option<PathBuf>, ResolveError> {
    match tokio::fs::metadata(log_file).await {
        Ok(metadata) if metadata.is_file() && is_shared_readable(&metadata) => {
            Ok(Some(log_file.to_path_buf()))
        }
        Ok(_) => Err(ResolveError::LogFileNotReadable(log_file.to_path_buf())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ResolveError::Io {
            path: log_file.to_path_buf(),
            source,
        }),
    }
}

#[cfg(unix)]
fn is_shared_readable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;

    metadata.permissions().mode() & 0o044 == 0o044
}

#[cfg(not(unix))]
fn is_shared_readable(_metadata: &std::fs::Metadata) -> bool {
    true
}

/// Walk `root` for the first results directory modified at or after `not_before`.
///
/// Entries are visited in file name order and `root` itself is never a candidate. Entries that
/// can't be read, or that disappear while the walk is in progress, are skipped. Only failing to
/// read `root` itself is an error.
pub fn find_results_directory(
    root: &Path,
    not_before: SystemTime,
) -> Result<Option<PathBuf>, ResolveError> {
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 && !is_not_found(&e) => return Err(e.into()),
            Err(e) => {
                log::debug!("Skipping unreadable entry: {e}");
                continue;
            }
        };

        if !entry.file_type().is_dir() {
            continue;
        }

        let Some(timestamp) = entry
            .file_name()
            .to_str()
            .and_then(|name| RESULTS_DIR_PATTERN.captures(name))
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string())
        else {
            continue;
        };

        let modified = match entry.metadata() {
            Ok(metadata) => metadata.modified(),
            Err(e) => {
                log::debug!("Skipping unreadable entry: {e}");
                continue;
            }
        };
        let Ok(modified) = modified else {
            log::debug!("No modification time for {}", entry.path().display());
            continue;
        };

        if modified < not_before {
            log::debug!(
                "Ignoring results directory {} from an earlier run",
                entry.path().display()
            );
            continue;
        }

        match NaiveDateTime::parse_from_str(&timestamp, RESULTS_DIR_TIMESTAMP_FORMAT) {
            Ok(started) => log::info!(
                "Found results directory {} for a run started at {started}",
                entry.path().display()
            ),
            Err(_) => log::info!("Found results directory {}", entry.path().display()),
        }

        return Ok(Some(entry.into_path()));
    }

    Ok(None)
}

fn is_not_found(e: &walkdir::Error) -> bool {
    e.io_error()
        .is_some_and(|io_error| io_error.kind() == ErrorKind::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use gatling_influx_core::prelude::ShutdownHandle;
    use pretty_assertions::assert_eq;
    use std::fs;

    const TWO_HOURS: Duration = Duration::from_secs(2 * 60 * 60);

    fn set_mtime(path: &Path, time: SystemTime) {
        filetime::set_file_mtime(path, FileTime::from_system_time(time)).unwrap();
    }

    #[cfg(unix)]
    fn make_shared_readable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o644)).unwrap();
    }

    #[cfg(not(unix))]
    fn make_shared_readable(_path: &Path) {}

    #[test]
    fn selects_fresh_directory_over_stale_one() {
        let root = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let stale = root.path().join("basicsimulation-20230101120000123");
        let fresh = root.path().join("basicsimulation-20240101120000123");
        fs::create_dir(&stale).unwrap();
        fs::create_dir(&fresh).unwrap();
        set_mtime(&stale, now - TWO_HOURS);

        let found = find_results_directory(root.path(), now - START_TOLERANCE).unwrap();

        assert_eq!(Some(fresh), found);
    }

    #[test]
    fn never_selects_stale_directories() {
        let root = tempfile::tempdir().unwrap();
        let now = SystemTime::now();
        let stale = root.path().join("basicsimulation-20230101120000123");
        fs::create_dir(&stale).unwrap();
        set_mtime(&stale, now - TWO_HOURS);

        assert_eq!(
            None,
            find_results_directory(root.path(), now - START_TOLERANCE).unwrap()
        );
    }

    #[test]
    fn ignores_names_that_do_not_match() {
        let root = tempfile::tempdir().unwrap();
        for name in [
            "basicsimulation",
            "basicsimulation-2024010112000012",
            "-20240101120000123",
            "basicsimulation-20240101120000123-old",
        ] {
            fs::create_dir(root.path().join(name)).unwrap();
        }
        fs::write(root.path().join("notadir-20240101120000123"), b"").unwrap();

        assert_eq!(
            None,
            find_results_directory(root.path(), UNIX_EPOCH).unwrap()
        );
    }

    #[test]
    fn first_match_in_name_order_wins() {
        let root = tempfile::tempdir().unwrap();
        let first = root.path().join("a-20240101120000123");
        fs::create_dir(root.path().join("b-20240101120000123")).unwrap();
        fs::create_dir(&first).unwrap();

        assert_eq!(
            Some(first.clone()),
            find_results_directory(root.path(), UNIX_EPOCH).unwrap()
        );
        assert_eq!(
            Some(first),
            find_results_directory(root.path(), UNIX_EPOCH).unwrap()
        );
    }

    #[test]
    fn finds_nested_results_directory() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("results").join("sim-20240101120000123");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            Some(nested),
            find_results_directory(root.path(), UNIX_EPOCH).unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subdirectory_does_not_stop_the_search() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let private = root.path().join("a-private");
        fs::create_dir_all(private.join("nested")).unwrap();
        let fresh = root.path().join("b-20240101120000123");
        fs::create_dir(&fresh).unwrap();
        fs::set_permissions(&private, fs::Permissions::from_mode(0o000)).unwrap();

        let found = find_results_directory(root.path(), UNIX_EPOCH);

        fs::set_permissions(&private, fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(Some(fresh), found.unwrap());
    }

    #[test]
    fn missing_root_is_not_an_error() {
        let parent = tempfile::tempdir().unwrap();

        assert_eq!(
            None,
            find_results_directory(&parent.path().join("gone"), UNIX_EPOCH).unwrap()
        );
    }

    #[test]
    fn root_is_not_a_candidate() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("sim-20240101120000123");
        fs::create_dir(&root).unwrap();

        assert_eq!(None, find_results_directory(&root, UNIX_EPOCH).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_target_directory_to_be_created() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("target");
        let shutdown = ShutdownHandle::new();
        let mut resolver = DirectoryResolver::new(SystemTime::now(), shutdown.new_listener());

        let create_root = root.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(6)).await;
            fs::create_dir(create_root).unwrap();
        });

        let started = tokio::time::Instant::now();
        let found = resolver.await_target_directory(&root).await.unwrap();

        assert_eq!(Lookup::Found(fs::canonicalize(&root).unwrap()), found);
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test]
    async fn relative_target_is_made_absolute() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("gatling").join("results");
        fs::create_dir_all(&nested).unwrap();
        let shutdown = ShutdownHandle::new();
        let mut resolver = DirectoryResolver::new(SystemTime::now(), shutdown.new_listener());

        let found = resolver
            .await_target_directory(&nested.join("..").join("results"))
            .await
            .unwrap();
        assert_eq!(Lookup::Found(fs::canonicalize(&nested).unwrap()), found);

        let Lookup::Found(current) = resolver.await_target_directory(Path::new(".")).await.unwrap()
        else {
            panic!("The working directory exists");
        };
        assert!(current.is_absolute(), "{}", current.display());
    }

    #[tokio::test]
    async fn target_that_is_a_file_is_fatal() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("target");
        fs::write(&root, b"").unwrap();
        let shutdown = ShutdownHandle::new();
        let mut resolver = DirectoryResolver::new(SystemTime::now(), shutdown.new_listener());

        let result = resolver.await_target_directory(&root).await;

        assert!(matches!(result, Err(ResolveError::NotADirectory(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_waiting_is_not_an_error() {
        let parent = tempfile::tempdir().unwrap();
        let shutdown = ShutdownHandle::new();
        let mut resolver = DirectoryResolver::new(SystemTime::now(), shutdown.new_listener());

        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            stopper.shutdown();
        });

        let result = resolver
            .await_results_directory(parent.path())
            .await
            .unwrap();

        assert_eq!(Lookup::StoppedByUser, result);
    }

    #[tokio::test]
    async fn stop_before_lookup_returns_immediately() {
        let shutdown = ShutdownHandle::new();
        shutdown.shutdown();
        let mut resolver = DirectoryResolver::new(SystemTime::now(), shutdown.new_listener());

        let result = resolver
            .resolve(Path::new("/does/not/exist"))
            .await
            .unwrap();

        assert_eq!(Lookup::StoppedByUser, result);
    }

    #[tokio::test]
    async fn resolves_full_location() {
        let root = tempfile::tempdir().unwrap();
        let target_dir = fs::canonicalize(root.path()).unwrap();
        let results_dir = target_dir.join("basicsimulation-20240101120000123");
        fs::create_dir(&results_dir).unwrap();
        let log_file = results_dir.join(LOG_FILE_NAME);
        fs::write(&log_file, b"").unwrap();
        make_shared_readable(&log_file);
        let shutdown = ShutdownHandle::new();
        let mut resolver = DirectoryResolver::new(SystemTime::now(), shutdown.new_listener());

        let found = resolver.resolve(root.path()).await.unwrap();

        assert_eq!(
            Lookup::Found(ResultsLocation {
                target_dir,
                results_dir,
                log_file,
            }),
            found
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn private_log_file_is_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let results_dir = tempfile::tempdir().unwrap();
        let log_file = results_dir.path().join(LOG_FILE_NAME);
        fs::write(&log_file, b"").unwrap();
        fs::set_permissions(&log_file, fs::Permissions::from_mode(0o600)).unwrap();
        let shutdown = ShutdownHandle::new();
        let mut resolver = DirectoryResolver::new(SystemTime::now(), shutdown.new_listener());

        let result = resolver.await_log_file(results_dir.path()).await;

        assert!(matches!(result, Err(ResolveError::LogFileNotReadable(_))));
    }
}

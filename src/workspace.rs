//! In-memory registry of live jobs and their private workspace directories.
//!
//! The registry is the only authority for authorization. Directory scanning is
//! left to the reaper and is never consulted while serving a request.

use crate::constants::{MAX_ID_ATTEMPTS, TOKEN_BYTES};
use crate::error::{AuthError, StoreError};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use subtle::ConstantTimeEq;
use uuid::Uuid;

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = chrono::Duration::from_std(by)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
        {
            *now = next;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handed back once, to the request that created the job.
#[derive(Clone, PartialEq, Eq)]
pub struct JobTicket {
    pub id: String,
    pub token: String,
    pub dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for JobTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobTicket")
            .field("id", &self.id)
            .field("token", &"<redacted>")
            .field("dir", &self.dir)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Keeps a job's directory on disk while a download or archive is reading it.
#[derive(Debug)]
pub struct ReadLease {
    counter: Arc<AtomicUsize>,
}

impl ReadLease {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for ReadLease {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Result of a successful token check: a snapshot of the job plus a lease.
#[derive(Debug)]
pub struct AuthorizedJob {
    pub id: String,
    pub dir: PathBuf,
    pub files: Vec<String>,
    pub expires_at: DateTime<Utc>,
    lease: ReadLease,
}

impl AuthorizedJob {
    pub fn contains(&self, file_name: &str) -> bool {
        self.files.iter().any(|f| f == file_name)
    }

    /// Path of a registered file; `None` for anything the job does not own.
    pub fn file_path(&self, file_name: &str) -> Option<PathBuf> {
        self.contains(file_name).then(|| self.dir.join(file_name))
    }

    pub fn into_lease(self) -> ReadLease {
        self.lease
    }
}

struct JobEntry {
    token: String,
    expires_at: DateTime<Utc>,
    dir: PathBuf,
    files: BTreeSet<String>,
    leases: Arc<AtomicUsize>,
}

/// Evicted from the registry, directory not yet removed.
struct Retired {
    id: String,
    dir: PathBuf,
    leases: Arc<AtomicUsize>,
}

#[derive(Default)]
struct Registry {
    jobs: HashMap<String, JobEntry>,
    retired: Vec<Retired>,
}

impl Registry {
    fn retire(&mut self, job_id: &str) -> Option<Retired> {
        self.jobs.remove(job_id).map(|entry| Retired {
            id: job_id.to_string(),
            dir: entry.dir,
            leases: entry.leases,
        })
    }
}

pub struct JobStore {
    root: PathBuf,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
    registry: Mutex<Registry>,
}

impl fmt::Debug for JobStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobStore")
            .field("root", &self.root)
            .field("ttl", &self.ttl)
            .field("jobs", &self.len())
            .finish()
    }
}

impl JobStore {
    pub fn new(root: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            tracing::error!(error = %e, root = %root.display(), "Cannot create workspace root");
            StoreError::DirectoryCreationFailed(root.clone())
        })?;
        let ttl = chrono::Duration::from_std(ttl).map_err(|_| {
            StoreError::Io(io::Error::new(io::ErrorKind::InvalidInput, "job TTL out of range"))
        })?;

        Ok(Self {
            root,
            ttl,
            clock,
            registry: Mutex::new(Registry::default()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn len(&self) -> usize {
        self.registry().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_live(&self, job_id: &str) -> bool {
        self.registry().jobs.contains_key(job_id)
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates a job, its token and an empty workspace directory.
    pub fn create(&self) -> Result<JobTicket, StoreError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = Uuid::new_v4().to_string();
            {
                let registry = self.registry();
                if registry.jobs.contains_key(&id) || registry.retired.iter().any(|r| r.id == id) {
                    continue;
                }
            }

            let dir = self.root.join(&id);
            match fs::create_dir(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    tracing::error!(error = %e, job_id = %id, "Failed to create job workspace");
                    return Err(StoreError::DirectoryCreationFailed(dir));
                }
            }

            let created_at = self.clock.now();
            let ticket = JobTicket {
                id: id.clone(),
                token: generate_token(),
                dir: dir.clone(),
                created_at,
                expires_at: created_at + self.ttl,
            };

            self.registry().jobs.insert(
                id,
                JobEntry {
                    token: ticket.token.clone(),
                    expires_at: ticket.expires_at,
                    dir,
                    files: BTreeSet::new(),
                    leases: Arc::new(AtomicUsize::new(0)),
                },
            );

            tracing::debug!(job_id = %ticket.id, expires_at = %ticket.expires_at, "Created job workspace");
            return Ok(ticket);
        }

        Err(StoreError::IdExhausted(MAX_ID_ATTEMPTS))
    }

    /// Checks possession of the token. Expired jobs are evicted on the spot and
    /// reported exactly like unknown ones. No filesystem access happens here.
    pub fn authorize(&self, job_id: &str, token: &str) -> Result<AuthorizedJob, AuthError> {
        let now = self.clock.now();
        let mut registry = self.registry();

        let expired = match registry.jobs.get(job_id) {
            None => return Err(AuthError::NotFound),
            Some(entry) => now >= entry.expires_at,
        };
        if expired {
            if let Some(retired) = registry.retire(job_id) {
                registry.retired.push(retired);
            }
            tracing::debug!(job_id = %job_id, "Evicted expired job during lookup");
            return Err(AuthError::NotFound);
        }

        let entry = registry.jobs.get(job_id).ok_or(AuthError::NotFound)?;
        if !tokens_match(&entry.token, token) {
            return Err(AuthError::InvalidToken);
        }

        Ok(AuthorizedJob {
            id: job_id.to_string(),
            dir: entry.dir.clone(),
            files: entry.files.iter().cloned().collect(),
            expires_at: entry.expires_at,
            lease: ReadLease::acquire(&entry.leases),
        })
    }

    /// Records an output the caller has already written into the job directory.
    pub fn register_file(&self, job_id: &str, file_name: &str) -> Result<(), StoreError> {
        let mut registry = self.registry();
        let entry = registry
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::UnknownJob(job_id.to_string()))?;
        entry.files.insert(file_name.to_string());
        Ok(())
    }

    /// Drops the job and its directory. Unknown ids are a no-op. A directory
    /// that is still being read is handed to the reaper instead.
    pub fn delete(&self, job_id: &str) -> Result<(), StoreError> {
        let dir = {
            let mut registry = self.registry();
            let retired = match registry.retire(job_id) {
                Some(retired) => retired,
                // Already evicted by a lookup; its directory may still be queued.
                None => match registry.retired.iter().position(|r| r.id == job_id) {
                    Some(index) if registry.retired[index].leases.load(Ordering::SeqCst) == 0 => {
                        registry.retired.swap_remove(index)
                    }
                    _ => return Ok(()),
                },
            };
            if retired.leases.load(Ordering::SeqCst) > 0 {
                tracing::debug!(job_id = %job_id, "Job deleted while being read, deferring removal");
                registry.retired.push(retired);
                return Ok(());
            }
            retired.dir
        };

        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Moves every expired job out of the registry. Returns the evicted ids.
    pub fn evict_expired(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut registry = self.registry();
        let expired: Vec<String> = registry
            .jobs
            .iter()
            .filter(|(_, entry)| now >= entry.expires_at)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(retired) = registry.retire(id) {
                registry.retired.push(retired);
            }
        }
        expired
    }

    /// Hands out retired directories nobody is reading any more. Leased ones
    /// stay queued for a later sweep.
    pub fn take_removable(&self) -> (Vec<(String, PathBuf)>, usize) {
        let mut registry = self.registry();
        let (free, leased): (Vec<Retired>, Vec<Retired>) = registry
            .retired
            .drain(..)
            .partition(|r| r.leases.load(Ordering::SeqCst) == 0);
        let deferred = leased.len();
        registry.retired = leased;
        (free.into_iter().map(|r| (r.id, r.dir)).collect(), deferred)
    }

    /// Directory names the registry still accounts for, live or retired.
    pub fn known_ids(&self) -> HashSet<String> {
        let registry = self.registry();
        registry
            .jobs
            .keys()
            .cloned()
            .chain(registry.retired.iter().map(|r| r.id.clone()))
            .collect()
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time comparison so a partial match takes as long as a miss.
fn tokens_match(expected: &str, presented: &str) -> bool {
    if expected.len() != presented.len() {
        return false;
    }
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}

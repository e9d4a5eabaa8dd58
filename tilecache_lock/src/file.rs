//! File-based locker for cross-process coordination (spec §4.8), grounded on
//! `tilecache_cache::file::FileCache`'s atomic-rename style but using
//! `O_EXCL` lock-file creation as the exclusion primitive: a lock is held by
//! whoever successfully creates `<name>.lock`; release writes a sibling
//! `<name>.result` marker, then removes the lock file. Waiters poll for the
//! lock file's disappearance.

use crate::traits::{LockHandle, LockOutcome, LockResult, Locker};
use async_trait::async_trait;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

pub struct FileLocker {
	root: PathBuf,
	poll_interval: Duration,
}

impl FileLocker {
	pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
		let root = root.into();
		fs::create_dir_all(&root)?;
		Ok(FileLocker {
			root,
			poll_interval: Duration::from_millis(50),
		})
	}

	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}

	fn sanitize(name: &str) -> String {
		name
			.bytes()
			.map(|b| if (b as char).is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-') { (b as char).to_string() } else { format!("%{b:02x}") })
			.collect()
	}

	fn lock_path(&self, name: &str) -> PathBuf {
		self.root.join(format!("{}.lock", Self::sanitize(name)))
	}

	fn result_path(&self, name: &str) -> PathBuf {
		self.root.join(format!("{}.result", Self::sanitize(name)))
	}
}

#[async_trait]
impl Locker for FileLocker {
	async fn lock_or_wait(&self, name: &str) -> anyhow::Result<LockOutcome> {
		let lock_path = self.lock_path(name);
		let result_path = self.result_path(name);

		loop {
			match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
				Ok(_file) => {
					let _ = fs::remove_file(&result_path);
					return Ok(LockOutcome::Acquired(LockHandle {
						name: name.to_string(),
						token: 0,
					}));
				}
				Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
					while lock_path.exists() {
						tokio::time::sleep(self.poll_interval).await;
					}
					match fs::read_to_string(&result_path) {
						Ok(contents) => {
							let result = if contents.trim() == "failure" { LockResult::Failure } else { LockResult::Success };
							return Ok(LockOutcome::Waited(result));
						}
						Err(_) => continue,
					}
				}
				Err(e) => return Err(e.into()),
			}
		}
	}

	async fn unlock(&self, handle: LockHandle) -> anyhow::Result<()> {
		fs::write(self.result_path(&handle.name), "success")?;
		fs::remove_file(self.lock_path(&handle.name))?;
		Ok(())
	}

	async fn unlock_with_failure(&self, handle: LockHandle) -> anyhow::Result<()> {
		fs::write(self.result_path(&handle.name), "failure")?;
		fs::remove_file(self.lock_path(&handle.name))?;
		Ok(())
	}

	fn reap_stale_locks(&self, max_age: Duration) -> anyhow::Result<()> {
		let now = SystemTime::now();
		for entry in fs::read_dir(&self.root)? {
			let entry = entry?;
			let path = entry.path();
			if path.extension().and_then(|e| e.to_str()) != Some("lock") {
				continue;
			}
			let Ok(metadata) = entry.metadata() else { continue };
			let Ok(modified) = metadata.modified() else { continue };
			if now.duration_since(modified).unwrap_or_default() >= max_age {
				log::warn!("reaping stale lock file: {}", path.display());
				let _ = fs::remove_file(&path);
			}
		}
		Ok(())
	}
}

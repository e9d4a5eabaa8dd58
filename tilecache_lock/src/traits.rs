//! Locker contract (spec §4.8): named-resource mutual exclusion where a
//! waiter blocks until the owner releases, rather than racing to redo the
//! owner's work.

use async_trait::async_trait;

/// Opaque proof of ownership, returned by a successful acquire and consumed
/// by `unlock`/`unlock_with_failure`. Backends attach whatever bookkeeping
/// they need (an in-process guard, a lock file path, ...).
pub struct LockHandle {
	pub(crate) name: String,
	pub(crate) token: u64,
}

impl LockHandle {
	pub fn name(&self) -> &str {
		&self.name
	}
}

/// What a waiter observes once the owner releases the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockResult {
	Success,
	Failure,
}

/// Outcome of `lock_or_wait`: either this caller is now the owner, or it
/// waited for a prior owner and learned how their work went.
pub enum LockOutcome {
	Acquired(LockHandle),
	Waited(LockResult),
}

/// `lock_or_wait`/`unlock`/`unlock_with_failure` per spec §4.8. The only
/// cross-worker synchroniser in the render pipeline (spec §4.10); every
/// other shared resource is either pool-leased single-owner or internally
/// thread-safe.
#[async_trait]
pub trait Locker: Send + Sync {
	/// Acquire `name`, or wait for the current owner to release it.
	async fn lock_or_wait(&self, name: &str) -> anyhow::Result<LockOutcome>;

	/// Release, signalling success to any waiters.
	async fn unlock(&self, handle: LockHandle) -> anyhow::Result<()>;

	/// Release, signalling failure to any waiters (spec §4.10: any error
	/// between LOCK_HELD and CACHED takes this path).
	async fn unlock_with_failure(&self, handle: LockHandle) -> anyhow::Result<()>;

	/// Remove on-disk lock artifacts older than `max_age`; a no-op for
	/// backends with no persistent state. Called once at process startup.
	fn reap_stale_locks(&self, _max_age: std::time::Duration) -> anyhow::Result<()> {
		Ok(())
	}
}

//! In-process locker: a `tokio::sync::watch` channel per name carries the
//! current owner generation and, once released, the result the owner
//! reported. Waiters subscribe and block on `changed()` rather than polling,
//! mirroring the single-process render-coalescing case of spec §4.10 (one
//! binary, many tokio tasks).

use crate::traits::{LockHandle, LockOutcome, LockResult, Locker};
use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::watch;

#[derive(Clone, Copy)]
struct SlotState {
	locked: bool,
	generation: u64,
	last_result: Option<LockResult>,
}

struct Slot {
	tx: watch::Sender<SlotState>,
}

pub struct MemoryLocker {
	slots: StdMutex<HashMap<String, Arc<Slot>>>,
}

impl Default for MemoryLocker {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryLocker {
	pub fn new() -> Self {
		MemoryLocker {
			slots: StdMutex::new(HashMap::new()),
		}
	}

	fn slot_for(&self, name: &str) -> Arc<Slot> {
		let mut slots = self.slots.lock().unwrap();
		slots
			.entry(name.to_string())
			.or_insert_with(|| {
				Arc::new(Slot {
					tx: watch::channel(SlotState {
						locked: false,
						generation: 0,
						last_result: None,
					})
					.0,
				})
			})
			.clone()
	}

	fn release(&self, handle: LockHandle, result: LockResult) -> anyhow::Result<()> {
		let slot = self.slot_for(&handle.name);
		slot.tx.send_modify(|s| {
			debug_assert_eq!(s.generation, handle.token, "unlock called with a stale handle");
			s.locked = false;
			s.last_result = Some(result);
		});
		Ok(())
	}
}

#[async_trait]
impl Locker for MemoryLocker {
	async fn lock_or_wait(&self, name: &str) -> anyhow::Result<LockOutcome> {
		let slot = self.slot_for(name);
		let mut rx = slot.tx.subscribe();

		let mut acquired_gen = None;
		slot.tx.send_if_modified(|s| {
			if s.locked {
				false
			} else {
				s.locked = true;
				s.generation += 1;
				s.last_result = None;
				acquired_gen = Some(s.generation);
				true
			}
		});
		if let Some(gen) = acquired_gen {
			return Ok(LockOutcome::Acquired(LockHandle {
				name: name.to_string(),
				token: gen,
			}));
		}

		let target_gen = rx.borrow().generation;
		loop {
			{
				let state = *rx.borrow();
				if state.generation == target_gen && !state.locked {
					if let Some(result) = state.last_result {
						return Ok(LockOutcome::Waited(result));
					}
				}
			}
			rx.changed().await.context("locker channel closed with no owner update")?;
		}
	}

	async fn unlock(&self, handle: LockHandle) -> anyhow::Result<()> {
		self.release(handle, LockResult::Success)
	}

	async fn unlock_with_failure(&self, handle: LockHandle) -> anyhow::Result<()> {
		self.release(handle, LockResult::Failure)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	#[tokio::test]
	async fn second_caller_waits_for_first_to_release() {
		let locker = Arc::new(MemoryLocker::new());

		let handle = match locker.lock_or_wait("metatile").await.unwrap() {
			LockOutcome::Acquired(h) => h,
			LockOutcome::Waited(_) => panic!("first caller should acquire"),
		};

		let locker2 = locker.clone();
		let waiter = tokio::spawn(async move { locker2.lock_or_wait("metatile").await.unwrap() });

		tokio::time::sleep(Duration::from_millis(20)).await;
		locker.unlock(handle).await.unwrap();

		match waiter.await.unwrap() {
			LockOutcome::Waited(LockResult::Success) => {}
			LockOutcome::Waited(LockResult::Failure) => panic!("expected success"),
			LockOutcome::Acquired(_) => panic!("waiter should not acquire while owner holds the lock"),
		}
	}

	#[tokio::test]
	async fn failure_propagates_to_waiters() {
		let locker = Arc::new(MemoryLocker::new());
		let handle = match locker.lock_or_wait("m").await.unwrap() {
			LockOutcome::Acquired(h) => h,
			_ => unreachable!(),
		};

		let locker2 = locker.clone();
		let waiter = tokio::spawn(async move { locker2.lock_or_wait("m").await.unwrap() });
		tokio::time::sleep(Duration::from_millis(20)).await;
		locker.unlock_with_failure(handle).await.unwrap();

		assert!(matches!(waiter.await.unwrap(), LockOutcome::Waited(LockResult::Failure)));
	}

	#[tokio::test]
	async fn render_invoked_exactly_once_under_concurrency_scenario_s4() {
		let locker = Arc::new(MemoryLocker::new());
		let render_count = Arc::new(AtomicUsize::new(0));

		let mut handles = Vec::new();
		for _ in 0..8 {
			let locker = locker.clone();
			let render_count = render_count.clone();
			handles.push(tokio::spawn(async move {
				match locker.lock_or_wait("0/0/0").await.unwrap() {
					LockOutcome::Acquired(h) => {
						render_count.fetch_add(1, Ordering::SeqCst);
						tokio::time::sleep(Duration::from_millis(10)).await;
						locker.unlock(h).await.unwrap();
					}
					LockOutcome::Waited(result) => assert_eq!(result, LockResult::Success),
				}
			}));
		}
		for h in handles {
			h.await.unwrap();
		}
		assert_eq!(render_count.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn lock_is_reusable_after_release() {
		let locker = MemoryLocker::new();
		let h1 = match locker.lock_or_wait("x").await.unwrap() {
			LockOutcome::Acquired(h) => h,
			_ => unreachable!(),
		};
		locker.unlock(h1).await.unwrap();

		match locker.lock_or_wait("x").await.unwrap() {
			LockOutcome::Acquired(_) => {}
			LockOutcome::Waited(_) => panic!("lock should be free again"),
		}
	}
}

//! Keyed, lazily-initialized resource pool (spec §4.7), grounded on
//! `versatiles_pipeline::operations::read::from_gdal::gdal_pool`'s use of
//! `deadpool::managed`.

use anyhow::Result;
use deadpool::managed::{Manager, Object, Pool, PoolError, RecycleResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

/// Per-key resource manager: constructs a resource on demand and decides
/// whether an idle resource may be recycled (`ctor`/`dtor`/`ctor_arg` in
/// spec §4.7 terms).
pub struct ResourceManager<T, A> {
	ctor: Box<dyn Fn(&A) -> Result<T> + Send + Sync>,
	ctor_arg: A,
}

impl<T, A> ResourceManager<T, A>
where
	T: Send + 'static,
	A: Clone + Send + Sync + 'static,
{
	pub fn new(ctor_arg: A, ctor: impl Fn(&A) -> Result<T> + Send + Sync + 'static) -> Self {
		ResourceManager {
			ctor: Box::new(ctor),
			ctor_arg,
		}
	}
}

impl<T, A> Manager for ResourceManager<T, A>
where
	T: Send + Sync + 'static,
	A: Clone + Send + Sync + 'static,
{
	type Type = T;
	type Error = anyhow::Error;

	async fn create(&self) -> std::result::Result<T, Self::Error> {
		(self.ctor)(&self.ctor_arg)
	}

	async fn recycle(&self, _obj: &mut T, _metrics: &deadpool::managed::Metrics) -> RecycleResult<Self::Error> {
		Ok(())
	}
}

pub type Lease<T, A> = Object<ResourceManager<T, A>>;

/// Keyed cache of lazily-constructed resources: `get(key, ctor, ...) ->
/// handle` fulfills leases per key without blocking other keys (spec §4.7).
pub struct ConnectionPool<T, A>
where
	T: Send + Sync + 'static,
	A: Clone + Send + Sync + 'static,
{
	pools: StdMutex<HashMap<String, Arc<Pool<ResourceManager<T, A>>>>>,
	max_size_per_key: usize,
}

impl<T, A> ConnectionPool<T, A>
where
	T: Send + Sync + 'static,
	A: Clone + Send + Sync + 'static,
{
	pub fn new(max_size_per_key: usize) -> Self {
		ConnectionPool {
			pools: StdMutex::new(HashMap::new()),
			max_size_per_key: max_size_per_key.max(1),
		}
	}

	fn pool_for(&self, key: &str, ctor_arg: A, ctor: impl Fn(&A) -> Result<T> + Send + Sync + 'static) -> Arc<Pool<ResourceManager<T, A>>> {
		let mut pools = self.pools.lock().unwrap();
		pools
			.entry(key.to_string())
			.or_insert_with(|| {
				let manager = ResourceManager::new(ctor_arg, ctor);
				Arc::new(Pool::builder(manager).max_size(self.max_size_per_key).build().expect("pool config is static"))
			})
			.clone()
	}

	/// Lease a resource for `key`, constructing the pool (and, if needed, the
	/// resource) on first use. Never blocks leases for other keys.
	pub async fn get(&self, key: &str, ctor_arg: A, ctor: impl Fn(&A) -> Result<T> + Send + Sync + 'static) -> Result<Lease<T, A>, PoolError<anyhow::Error>> {
		let pool = self.pool_for(key, ctor_arg, ctor);
		pool.get().await
	}

	/// Drop every idle resource for `key`, forcing reconstruction on next use.
	pub fn invalidate(&self, key: &str) {
		if let Some(pool) = self.pools.lock().unwrap().get(key) {
			pool.retain(|_, _| false);
		}
	}
}

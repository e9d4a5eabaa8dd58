//! Dimension requests and assembly (spec §3.5, §4.6).

/// How a dimension's sub-values are merged into one cached artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyType {
	/// Exact match required; no merging.
	None,
	/// Alpha-over composite of sub-values in declared order.
	Stack,
	/// Each sub-value is a time frame of an animation-aware encoding.
	Animate,
}

impl AssemblyType {
	pub fn is_assembled(self) -> bool {
		!matches!(self, AssemblyType::None)
	}
}

/// `(dimension, requested_value, cached_value)`, see spec §3.5.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionRequest {
	pub dimension: String,
	pub requested_value: String,
	pub cached_value: Option<String>,
}

impl DimensionRequest {
	pub fn new(dimension: impl Into<String>, requested_value: impl Into<String>) -> Self {
		Self {
			dimension: dimension.into(),
			requested_value: requested_value.into(),
			cached_value: None,
		}
	}

	pub fn resolved(dimension: impl Into<String>, requested_value: impl Into<String>, cached_value: impl Into<String>) -> Self {
		Self {
			dimension: dimension.into(),
			requested_value: requested_value.into(),
			cached_value: Some(cached_value.into()),
		}
	}
}

/// Ordered list of dimension requests fingerprinting one tile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimensionSet {
	pub entries: Vec<DimensionRequest>,
}

impl DimensionSet {
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn get(&self, name: &str) -> Option<&DimensionRequest> {
		self.entries.iter().find(|e| e.dimension == name)
	}

	/// All entries must have a resolved `cached_value` before this set can key a cache lookup.
	pub fn all_resolved(&self) -> bool {
		self.entries.iter().all(|e| e.cached_value.is_some())
	}
}

/// A dimension backend's lookup contract (spec §1 non-goals: wire protocol
/// beyond this is external). Resolves a requested value to zero, one, or
/// several concrete backing values.
pub trait Dimension: Send + Sync {
	fn name(&self) -> &str;

	/// Exact-match resolution: must produce exactly one concrete value for
	/// non-assembled dimensions (0 -> 404, >1 -> 500 per spec §4.5).
	fn resolve_single(&self, requested_value: &str) -> anyhow::Result<Option<String>>;

	/// Assembly resolution: may produce multiple sub-values (spec §4.6).
	fn get_entries_for_value(&self, requested_value: &str) -> anyhow::Result<Vec<String>>;

	fn assembly_type(&self) -> AssemblyType {
		AssemblyType::None
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn all_resolved_requires_every_entry() {
		let mut set = DimensionSet::empty();
		set.entries.push(DimensionRequest::new("time", "2024"));
		assert!(!set.all_resolved());
		set.entries[0].cached_value = Some("2024-01-01".to_string());
		assert!(set.all_resolved());
	}
}

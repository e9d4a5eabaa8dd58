//! Error taxonomy shared by every tilecache crate.
//!
//! Components build errors cumulatively: attaching more context never
//! discards the earliest `Status`, matching the "new errors append to the
//! existing message, preserving the earliest status" rule.

use std::fmt;

/// HTTP-flavoured status carried by every `CacheError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	/// Malformed input from the caller: bad extent, unknown tileset/grid, invalid dimension value.
	InvalidArgument,
	/// Addressable but absent: unknown dimension sub-value, unconfigured grid, missing metadata.
	NotFound,
	/// A backend or source failed after retries were exhausted.
	UpstreamFailure,
	/// Invariant violation or configuration error detected at runtime.
	Internal,
}

impl Status {
	pub fn code(self) -> u16 {
		match self {
			Status::InvalidArgument => 400,
			Status::NotFound => 404,
			Status::UpstreamFailure => 502,
			Status::Internal => 500,
		}
	}

	/// Lower status code wins when combining two statuses, matching "preserving the earliest status".
	fn rank(self) -> u8 {
		match self {
			Status::InvalidArgument => 0,
			Status::NotFound => 1,
			Status::Internal => 2,
			Status::UpstreamFailure => 3,
		}
	}
}

#[derive(Debug, Clone)]
pub struct CacheError {
	status: Status,
	message: String,
}

impl CacheError {
	pub fn new(status: Status, message: impl Into<String>) -> Self {
		Self {
			status,
			message: message.into(),
		}
	}

	pub fn invalid_argument(message: impl Into<String>) -> Self {
		Self::new(Status::InvalidArgument, message)
	}

	pub fn not_found(message: impl Into<String>) -> Self {
		Self::new(Status::NotFound, message)
	}

	pub fn upstream_failure(message: impl Into<String>) -> Self {
		Self::new(Status::UpstreamFailure, message)
	}

	pub fn internal(message: impl Into<String>) -> Self {
		Self::new(Status::Internal, message)
	}

	pub fn status(&self) -> Status {
		self.status
	}

	/// Append a new message, keeping whichever status ranks first (see `Status::rank`).
	pub fn append(self, status: Status, message: impl Into<String>) -> Self {
		let (status, message) = if status.rank() <= self.status.rank() {
			(status, format!("{}; {}", message.into(), self.message))
		} else {
			(self.status, format!("{}; {}", self.message, message.into()))
		};
		Self { status, message }
	}
}

impl fmt::Display for CacheError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{}] {}", self.status.code(), self.message)
	}
}

impl std::error::Error for CacheError {}

pub type Result<T> = std::result::Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_codes() {
		assert_eq!(Status::InvalidArgument.code(), 400);
		assert_eq!(Status::NotFound.code(), 404);
		assert_eq!(Status::UpstreamFailure.code(), 502);
		assert_eq!(Status::Internal.code(), 500);
	}

	#[test]
	fn append_keeps_earliest_status() {
		let err = CacheError::not_found("missing dimension").append(Status::UpstreamFailure, "source retry exhausted");
		assert_eq!(err.status(), Status::NotFound);
		assert!(err.to_string().contains("missing dimension"));
		assert!(err.to_string().contains("source retry exhausted"));
	}

	#[test]
	fn append_promotes_more_severe_status() {
		// InvalidArgument (rank 0) is more "original-caller" than Internal (rank 2);
		// appending InvalidArgument onto an Internal error surfaces the caller mistake.
		let err = CacheError::internal("renderer panicked").append(Status::InvalidArgument, "zoom out of range");
		assert_eq!(err.status(), Status::InvalidArgument);
	}
}

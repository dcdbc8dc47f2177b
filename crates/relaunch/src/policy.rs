use serde::{Deserialize, Serialize};
use std::fmt;

/// Ceiling on automatic restarts, shared by every slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLimit", into = "RawLimit")]
pub enum RestartLimit {
	Unlimited,
	Capped(u32),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawLimit {
	Count(u32),
	Word(String),
}

impl TryFrom<RawLimit> for RestartLimit {
	type Error = String;

	fn try_from(raw: RawLimit) -> Result<Self, Self::Error> {
		match raw {
			RawLimit::Count(n) => Ok(RestartLimit::Capped(n)),
			RawLimit::Word(w) if w.eq_ignore_ascii_case("unlimited") => Ok(RestartLimit::Unlimited),
			RawLimit::Word(w) => Err(format!(
				"invalid max_restarts {:?}: expected a non-negative integer or \"unlimited\"",
				w
			)),
		}
	}
}

impl From<RestartLimit> for RawLimit {
	fn from(limit: RestartLimit) -> Self {
		match limit {
			RestartLimit::Unlimited => RawLimit::Word("unlimited".to_string()),
			RestartLimit::Capped(n) => RawLimit::Count(n),
		}
	}
}

impl fmt::Display for RestartLimit {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RestartLimit::Unlimited => write!(f, "unlimited"),
			RestartLimit::Capped(n) => write!(f, "{}", n),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
	pub restart_on_failure: bool,
	pub limit: RestartLimit,
}

impl RestartPolicy {
	pub fn new(restart_on_failure: bool, limit: RestartLimit) -> Self {
		Self {
			restart_on_failure,
			limit,
		}
	}

	pub fn never() -> Self {
		Self::new(false, RestartLimit::Capped(0))
	}

	/// Whether a slot that has already restarted `restarts` times may restart again.
	pub fn allows(&self, restarts: u32) -> bool {
		if !self.restart_on_failure {
			return false;
		}
		match self.limit {
			RestartLimit::Unlimited => true,
			RestartLimit::Capped(cap) => restarts < cap,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn disabled_never_restarts() {
		let policy = RestartPolicy::new(false, RestartLimit::Unlimited);
		assert!(!policy.allows(0));
		assert!(!policy.allows(100));
	}

	#[test]
	fn cap_is_exclusive() {
		let policy = RestartPolicy::new(true, RestartLimit::Capped(2));
		assert!(policy.allows(0));
		assert!(policy.allows(1));
		assert!(!policy.allows(2));
		assert!(!policy.allows(3));
	}

	#[test]
	fn zero_cap_means_no_restarts() {
		assert!(!RestartPolicy::new(true, RestartLimit::Capped(0)).allows(0));
		assert!(!RestartPolicy::never().allows(0));
	}

	#[test]
	fn unlimited() {
		assert!(RestartPolicy::new(true, RestartLimit::Unlimited).allows(u32::MAX));
	}

	#[test]
	fn limit_display() {
		assert_eq!(RestartLimit::Unlimited.to_string(), "unlimited");
		assert_eq!(RestartLimit::Capped(4).to_string(), "4");
	}
}

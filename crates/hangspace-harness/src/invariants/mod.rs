//! Properties of the sync engine that hold after every simulation step.
//!
//! A [`SystemSnapshot`] captures what each client knows (bundles, message
//! streams, open chat) alongside what its App displays. Each [`Invariant`]
//! inspects one snapshot; the [`InvariantRegistry`] runs a set of them and
//! reports every failure at once.
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! registry.assert_all(&snapshot(&runtime), "after reconnect");
//! ```

mod checks;
mod snapshot;

pub use checks::{
    NonEmptyBundles, SingleEntryPerMessage, ToastLimit, UniqueBundles, ViewFollowsClient,
};
pub use snapshot::{BundleSnapshot, ClientSnapshot, EntrySnapshot, SystemSnapshot, ViewSnapshot};

/// Outcome of one invariant check.
pub type InvariantResult = Result<(), Violation>;

/// A broken invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Which invariant failed.
    pub invariant: &'static str,
    /// What was observed.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property checked against a [`SystemSnapshot`].
pub trait Invariant: Send + Sync {
    /// Short identifier used in violation reports.
    fn name(&self) -> &'static str;

    /// `Err` describes the first offending client or entry.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// A set of invariants checked together.
#[derive(Default)]
pub struct InvariantRegistry {
    checks: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// Registry with no checks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every check the engine is expected to satisfy:
    ///
    /// - [`UniqueBundles`]
    /// - [`NonEmptyBundles`]
    /// - [`SingleEntryPerMessage`]
    /// - [`ViewFollowsClient`]
    /// - [`ToastLimit`]
    pub fn standard() -> Self {
        Self {
            checks: vec![
                Box::new(UniqueBundles),
                Box::new(NonEmptyBundles),
                Box::new(SingleEntryPerMessage),
                Box::new(ViewFollowsClient),
                Box::new(ToastLimit),
            ],
        }
    }

    /// Register another check.
    pub fn add(&mut self, invariant: impl Invariant + 'static) {
        self.checks.push(Box::new(invariant));
    }

    /// Names of the registered checks, in run order.
    pub fn names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|check| check.name()).collect()
    }

    /// Run every check, collecting all violations.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<Violation> =
            self.checks.iter().filter_map(|check| check.check(state).err()).collect();
        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Run every check and panic with all violations if any fail.
    #[allow(clippy::panic, reason = "test assertion helper")]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let report: Vec<String> = violations.iter().map(ToString::to_string).collect();
            panic!("{} invariant(s) broken {context}:\n  {}", report.len(), report.join("\n  "));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct AlwaysFails;

    impl Invariant for AlwaysFails {
        fn name(&self) -> &'static str {
            "always_fails"
        }

        fn check(&self, _: &SystemSnapshot) -> InvariantResult {
            Err(Violation { invariant: self.name(), message: "nope".into() })
        }
    }

    #[test]
    fn standard_registry_lists_every_check() {
        let names = InvariantRegistry::standard().names();
        assert_eq!(names.len(), 5);
        assert!(names.contains(&"unique_bundles"));
    }

    #[test]
    fn empty_snapshot_passes() {
        assert!(InvariantRegistry::standard().check_all(&SystemSnapshot::empty()).is_ok());
    }

    #[test]
    fn failures_are_collected() {
        let mut registry = InvariantRegistry::standard();
        registry.add(AlwaysFails);

        let violations = registry.check_all(&SystemSnapshot::empty()).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].to_string(), "[always_fails] nope");
    }
}

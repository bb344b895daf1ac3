//! Applies create, update and delete requests to a [`Snapshot`].
//!
//! Reconciliation never performs I/O. It mutates the snapshot in place and
//! reports which keys changed and which were skipped, so the caller can
//! warn the operator, decide whether anything needs to be persisted, and
//! mirror exactly the changed keys elsewhere.

use crate::Snapshot;
use std::fmt;

/// What the operator asked to do with a set of keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Insert pairs whose keys do not exist yet.
    Create(Snapshot),
    /// Overwrite pairs whose keys already exist.
    Update(Snapshot),
    /// Remove keys by name.
    Delete(Vec<String>),
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::Create(_) => MutationKind::Create,
            Mutation::Update(_) => MutationKind::Update,
            Mutation::Delete(_) => MutationKind::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    /// Past-tense verb used in operator messages.
    pub fn past_tense(&self) -> &'static str {
        match self {
            MutationKind::Create => "created",
            MutationKind::Update => "updated",
            MutationKind::Delete => "deleted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyExists,
    NotFound,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyExists => f.write_str("already exists"),
            SkipReason::NotFound => f.write_str("not found"),
        }
    }
}

/// A requested key that was left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub key: String,
    pub reason: SkipReason,
}

/// Outcome of applying one [`Mutation`] to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    kind: MutationKind,
    /// For create/update the new values, for delete the removed values.
    changed: Snapshot,
    skipped: Vec<Skipped>,
}

impl Reconciliation {
    fn new(kind: MutationKind) -> Self {
        Self {
            kind,
            changed: Snapshot::new(),
            skipped: Vec::new(),
        }
    }

    fn skip(&mut self, key: &str, reason: SkipReason) {
        self.skipped.push(Skipped {
            key: key.to_string(),
            reason,
        });
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn changed(&self) -> &Snapshot {
        &self.changed
    }

    pub fn changed_keys(&self) -> impl Iterator<Item = &str> {
        self.changed.keys()
    }

    pub fn skipped(&self) -> &[Skipped] {
        &self.skipped
    }

    pub fn any_change(&self) -> bool {
        !self.changed.is_empty()
    }
}

/// Dispatches `mutation` to the matching reconcile function.
pub fn reconcile(existing: &mut Snapshot, mutation: &Mutation) -> Reconciliation {
    match mutation {
        Mutation::Create(proposed) => reconcile_create(existing, proposed),
        Mutation::Update(proposed) => reconcile_update(existing, proposed),
        Mutation::Delete(names) => reconcile_delete(existing, names),
    }
}

/// Inserts every proposed pair whose key is absent. Existing keys are never
/// overwritten.
pub fn reconcile_create(existing: &mut Snapshot, proposed: &Snapshot) -> Reconciliation {
    let mut outcome = Reconciliation::new(MutationKind::Create);

    for (key, value) in proposed {
        if existing.contains_key(key) {
            outcome.skip(key, SkipReason::AlreadyExists);
            continue;
        }
        existing.insert(key.as_str(), value.as_str());
        outcome.changed.insert(key.as_str(), value.as_str());
    }

    outcome
}

/// Overwrites every proposed pair whose key is present. Unknown keys are
/// never introduced.
pub fn reconcile_update(existing: &mut Snapshot, proposed: &Snapshot) -> Reconciliation {
    let mut outcome = Reconciliation::new(MutationKind::Update);

    for (key, value) in proposed {
        if !existing.contains_key(key) {
            outcome.skip(key, SkipReason::NotFound);
            continue;
        }
        existing.insert(key.as_str(), value.as_str());
        outcome.changed.insert(key.as_str(), value.as_str());
    }

    outcome
}

/// Removes every named key that is present.
pub fn reconcile_delete<S: AsRef<str>>(existing: &mut Snapshot, names: &[S]) -> Reconciliation {
    let mut outcome = Reconciliation::new(MutationKind::Delete);

    for name in names {
        let name = name.as_ref();
        match existing.remove(name) {
            Some(old) => {
                outcome.changed.insert(name, old);
            }
            None => outcome.skip(name, SkipReason::NotFound),
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pairs: &[(&str, &str)]) -> Snapshot {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_create_skips_existing_keys() {
        let mut existing = snapshot(&[("FOO", "1"), ("BAR", "2")]);
        let outcome = reconcile_create(&mut existing, &snapshot(&[("FOO", "9"), ("BAZ", "3")]));

        assert_eq!(existing, snapshot(&[("FOO", "1"), ("BAR", "2"), ("BAZ", "3")]));
        assert_eq!(outcome.changed_keys().collect::<Vec<_>>(), vec!["BAZ"]);
        assert_eq!(
            outcome.skipped(),
            &[Skipped {
                key: "FOO".into(),
                reason: SkipReason::AlreadyExists
            }]
        );
        assert!(outcome.any_change());
    }

    #[test]
    fn test_update_never_adds_keys() {
        let mut existing = snapshot(&[("FOO", "1")]);
        let outcome = reconcile_update(&mut existing, &snapshot(&[("FOO", "2"), ("QUX", "9")]));

        assert_eq!(existing, snapshot(&[("FOO", "2")]));
        assert_eq!(existing.len(), 1);
        assert_eq!(outcome.changed().get("FOO"), Some("2"));
        assert_eq!(outcome.skipped().len(), 1);
        assert_eq!(outcome.skipped()[0].key, "QUX");
        assert_eq!(outcome.skipped()[0].reason, SkipReason::NotFound);
    }

    #[test]
    fn test_delete_removes_intersection() {
        let mut existing = snapshot(&[("A", "1"), ("B", "2")]);
        let outcome = reconcile_delete(&mut existing, &["B", "C"]);

        assert_eq!(existing, snapshot(&[("A", "1")]));
        assert_eq!(outcome.changed_keys().collect::<Vec<_>>(), vec!["B"]);
        assert_eq!(outcome.changed().get("B"), Some("2"));
        assert_eq!(outcome.skipped()[0].key, "C");
    }

    #[test]
    fn test_delete_twice_is_noop() {
        let mut existing = snapshot(&[("A", "1"), ("B", "2")]);
        assert!(reconcile_delete(&mut existing, &["A"]).any_change());

        let second = reconcile_delete(&mut existing, &["A"]);
        assert!(!second.any_change());
        assert_eq!(second.skipped().len(), 1);
        assert_eq!(existing, snapshot(&[("B", "2")]));
    }

    #[test]
    fn test_delete_repeated_name_in_one_request() {
        let mut existing = snapshot(&[("A", "1")]);
        let outcome = reconcile_delete(&mut existing, &["A", "A"]);

        assert_eq!(outcome.changed().len(), 1);
        assert_eq!(outcome.skipped().len(), 1);
        assert!(existing.is_empty());
    }

    #[test]
    fn test_create_all_existing_reports_no_change() {
        let mut existing = snapshot(&[("A", "1"), ("B", "2")]);
        let before = existing.clone();
        let outcome = reconcile_create(&mut existing, &snapshot(&[("A", "x"), ("B", "y")]));

        assert!(!outcome.any_change());
        assert_eq!(outcome.skipped().len(), 2);
        assert_eq!(existing, before);
    }

    #[test]
    fn test_skips_follow_request_order() {
        let mut existing = snapshot(&[("Z", "1")]);
        let outcome = reconcile_update(&mut existing, &snapshot(&[("C", "1"), ("A", "1"), ("B", "1")]));

        let order: Vec<_> = outcome.skipped().iter().map(|s| s.key.as_str()).collect();
        assert_eq!(order, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_create_keeps_every_existing_key() {
        let cases = [
            (snapshot(&[]), snapshot(&[("A", "1")])),
            (snapshot(&[("A", "1")]), snapshot(&[])),
            (snapshot(&[("A", "1"), ("B", "2")]), snapshot(&[("B", "3"), ("C", "4"), ("D", "5")])),
        ];

        for (original, proposed) in cases {
            let mut existing = original.clone();
            let outcome = reconcile_create(&mut existing, &proposed);

            for (key, value) in &original {
                assert_eq!(existing.get(key), Some(value.as_str()));
            }
            for (key, value) in &proposed {
                if !original.contains_key(key) {
                    assert_eq!(existing.get(key), Some(value.as_str()));
                    assert!(outcome.changed().contains_key(key));
                }
            }
            assert!(outcome.changed_keys().all(|k| proposed.contains_key(k)));
        }
    }

    #[test]
    fn test_dispatch_matches_kind() {
        let mut existing = snapshot(&[("A", "1")]);
        let mutation = Mutation::Delete(vec!["A".to_string()]);
        let outcome = reconcile(&mut existing, &mutation);

        assert_eq!(mutation.kind(), MutationKind::Delete);
        assert_eq!(outcome.kind(), MutationKind::Delete);
        assert!(existing.is_empty());
    }
}

//! The revision graph.
//!
//! Revisions form a DAG through their `revises` pointers. This module
//! validates the graph, resolves symbolic names (`head`, `heads`, `base`,
//! ids and id prefixes) and walks it in a stable topological order: parents
//! before children, ties broken by revision id.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{MigrateError, Result};
use crate::migration::Migration;

/// Ledger changes caused by applying or undoing one revision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerTransition {
    /// Revisions that stop being applied heads.
    pub delete: Vec<String>,
    /// Revisions that become applied heads.
    pub insert: Vec<String>,
}

impl LedgerTransition {
    /// Applies the transition to an in-memory head set.
    pub fn apply(&self, heads: &mut BTreeSet<String>) {
        for revision in &self.delete {
            heads.remove(revision);
        }
        heads.extend(self.insert.iter().cloned());
    }
}

/// A validated set of revisions.
#[derive(Debug, Clone, Default)]
pub struct RevisionMap {
    revisions: BTreeMap<String, Migration>,
    children: BTreeMap<String, BTreeSet<String>>,
    order: Vec<String>,
}

impl RevisionMap {
    /// Builds the graph.
    ///
    /// # Errors
    ///
    /// Fails on duplicate ids, unknown parents, or cycles.
    pub fn new(migrations: Vec<Migration>) -> Result<Self> {
        let mut revisions = BTreeMap::new();
        for migration in migrations {
            if revisions.contains_key(&migration.revision) {
                return Err(MigrateError::DuplicateRevision(migration.revision));
            }
            revisions.insert(migration.revision.clone(), migration);
        }

        let mut children: BTreeMap<String, BTreeSet<String>> = revisions
            .keys()
            .map(|id| (id.clone(), BTreeSet::new()))
            .collect();
        for migration in revisions.values() {
            for parent in &migration.revises {
                children
                    .get_mut(parent)
                    .ok_or_else(|| MigrateError::MissingParent {
                        revision: migration.revision.clone(),
                        parent: parent.clone(),
                    })?
                    .insert(migration.revision.clone());
            }
        }

        let order = Self::topological_order(&revisions, &children)?;
        Ok(Self {
            revisions,
            children,
            order,
        })
    }

    /// Kahn's algorithm; the ready set is ordered so ties go by id.
    fn topological_order(
        revisions: &BTreeMap<String, Migration>,
        children: &BTreeMap<String, BTreeSet<String>>,
    ) -> Result<Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> = revisions
            .values()
            .map(|m| {
                let parents: BTreeSet<&String> = m.revises.iter().collect();
                (m.revision.as_str(), parents.len())
            })
            .collect();
        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(revisions.len());

        while let Some(id) = ready.pop_first() {
            order.push(id.to_string());
            for child in children.get(id).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(child.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(child.as_str());
                    }
                }
            }
        }

        if order.len() != revisions.len() {
            return Err(MigrateError::CircularDependency);
        }
        Ok(order)
    }

    /// Number of revisions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    /// Returns true if there are no revisions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// Gets a revision by exact id.
    #[must_use]
    pub fn get(&self, revision: &str) -> Option<&Migration> {
        self.revisions.get(revision)
    }

    /// All revisions, parents first.
    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.order.iter().filter_map(|id| self.revisions.get(id))
    }

    /// Revisions without children, sorted by id.
    #[must_use]
    pub fn heads(&self) -> Vec<&str> {
        self.children
            .iter()
            .filter(|(_, children)| children.is_empty())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Revisions without parents, sorted by id.
    #[must_use]
    pub fn bases(&self) -> Vec<&str> {
        self.revisions
            .values()
            .filter(|m| m.is_base())
            .map(|m| m.revision.as_str())
            .collect()
    }

    /// Finds a revision by exact id or unique prefix.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::AmbiguousRevision`] or
    /// [`MigrateError::RevisionNotFound`].
    pub fn lookup(&self, identifier: &str) -> Result<&Migration> {
        if let Some(migration) = self.revisions.get(identifier) {
            return Ok(migration);
        }
        let candidates: Vec<&Migration> = if identifier.is_empty() {
            Vec::new()
        } else {
            self.revisions
                .range(identifier.to_string()..)
                .take_while(|(id, _)| id.starts_with(identifier))
                .map(|(_, m)| m)
                .collect()
        };
        match candidates.as_slice() {
            [] => Err(MigrateError::RevisionNotFound(identifier.to_string())),
            [single] => Ok(*single),
            _ => Err(MigrateError::AmbiguousRevision {
                prefix: identifier.to_string(),
                candidates: candidates.iter().map(|m| m.revision.clone()).collect(),
            }),
        }
    }

    /// Resolves a symbolic name to a set of revision ids.
    ///
    /// `base` resolves to the empty set, `heads` to every head, and `head`
    /// to the single head (or nothing when there are no revisions).
    ///
    /// # Errors
    ///
    /// Fails on `head` with several heads and on unknown or ambiguous ids.
    pub fn resolve(&self, identifier: &str) -> Result<Vec<String>> {
        match identifier {
            "base" => Ok(Vec::new()),
            "heads" => Ok(self.heads().into_iter().map(String::from).collect()),
            "head" => {
                let heads = self.heads();
                if heads.len() > 1 {
                    return Err(MigrateError::MultipleHeads(
                        heads.into_iter().map(String::from).collect(),
                    ));
                }
                Ok(heads.into_iter().map(String::from).collect())
            }
            _ => Ok(vec![self.lookup(identifier)?.revision.clone()]),
        }
    }

    /// Every revision reachable through `revises`, including `ids`.
    #[must_use]
    pub fn ancestors<S: AsRef<str>>(&self, ids: &[S]) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&str> = ids.iter().map(AsRef::as_ref).collect();
        while let Some(id) = stack.pop() {
            if !seen.insert(id.to_string()) {
                continue;
            }
            if let Some(migration) = self.revisions.get(id) {
                stack.extend(migration.revises.iter().map(String::as_str));
            }
        }
        seen
    }

    /// Returns true if `ancestor` is `revision` or one of its ancestors.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: &str, revision: &str) -> bool {
        self.ancestors(&[revision]).contains(ancestor)
    }

    fn in_order(&self, ids: &BTreeSet<String>) -> Vec<&Migration> {
        self.order
            .iter()
            .filter(|id| ids.contains(*id))
            .filter_map(|id| self.revisions.get(id))
            .collect()
    }

    /// Revisions between `lower` and `upper` (both inclusive), newest first.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::RangeNotAncestor`] when `lower` is not an
    /// ancestor of `upper`, or a resolution error.
    pub fn iterate(&self, upper: &str, lower: &str) -> Result<Vec<&Migration>> {
        let uppers = self.resolve(upper)?;
        let lowers = self.resolve(lower)?;
        let reachable = self.ancestors(&uppers);

        if let Some(outside) = lowers.iter().find(|l| !reachable.contains(*l)) {
            return Err(MigrateError::RangeNotAncestor {
                lower: outside.clone(),
                upper: upper.to_string(),
            });
        }

        let mut below = self.ancestors(&lowers);
        for l in &lowers {
            below.remove(l);
        }
        let selected: BTreeSet<String> = reachable.difference(&below).cloned().collect();

        let mut revisions = self.in_order(&selected);
        revisions.reverse();
        Ok(revisions)
    }

    /// Parses `lower:upper` (either side may be empty) and iterates it.
    ///
    /// A missing lower bound means `base`; a missing upper bound `heads`.
    ///
    /// # Errors
    ///
    /// Same as [`iterate`](Self::iterate).
    pub fn range(&self, range: &str) -> Result<Vec<&Migration>> {
        let (lower, upper) = range.split_once(':').unwrap_or(("", range));
        let lower = if lower.is_empty() { "base" } else { lower };
        let upper = if upper.is_empty() { "heads" } else { upper };
        self.iterate(upper, lower)
    }

    fn check_known(&self, current: &[String]) -> Result<()> {
        match current.iter().find(|id| !self.revisions.contains_key(*id)) {
            Some(unknown) => Err(MigrateError::RevisionNotFound(unknown.clone())),
            None => Ok(()),
        }
    }

    /// Revisions to apply, in order, to go from `current` heads to `target`.
    ///
    /// # Errors
    ///
    /// Fails if `target` doesn't resolve or `current` names unknown ids.
    pub fn upgrade_path(&self, current: &[String], target: &str) -> Result<Vec<&Migration>> {
        self.check_known(current)?;
        let targets = self.resolve(target)?;
        let applied = self.ancestors(current);
        let wanted: BTreeSet<String> = self
            .ancestors(&targets)
            .difference(&applied)
            .cloned()
            .collect();
        Ok(self.in_order(&wanted))
    }

    /// Revisions to undo, in order, to go from `current` heads down to
    /// `target`.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::RangeNotAncestor`] when `target` isn't
    /// below the current heads, or a resolution error.
    pub fn downgrade_path(&self, current: &[String], target: &str) -> Result<Vec<&Migration>> {
        self.check_known(current)?;
        let targets = self.resolve(target)?;
        let applied = self.ancestors(current);
        if let Some(outside) = targets.iter().find(|t| !applied.contains(*t)) {
            return Err(MigrateError::RangeNotAncestor {
                lower: outside.clone(),
                upper: current.join(","),
            });
        }
        let keep = self.ancestors(&targets);
        let undo: BTreeSet<String> = applied.difference(&keep).cloned().collect();
        let mut revisions = self.in_order(&undo);
        revisions.reverse();
        Ok(revisions)
    }

    /// Ledger change for applying `migration` on top of `heads`.
    #[must_use]
    pub fn upgrade_transition(
        &self,
        heads: &BTreeSet<String>,
        migration: &Migration,
    ) -> LedgerTransition {
        LedgerTransition {
            delete: migration
                .revises
                .iter()
                .filter(|p| heads.contains(*p))
                .cloned()
                .collect(),
            insert: vec![migration.revision.clone()],
        }
    }

    /// Ledger change for undoing `migration` from `heads`.
    ///
    /// Parents come back only when no remaining head already covers them.
    #[must_use]
    pub fn downgrade_transition(
        &self,
        heads: &BTreeSet<String>,
        migration: &Migration,
    ) -> LedgerTransition {
        let remaining: Vec<&String> = heads
            .iter()
            .filter(|h| **h != migration.revision)
            .collect();
        let covered = self.ancestors(&remaining);
        LedgerTransition {
            delete: vec![migration.revision.clone()],
            insert: migration
                .revises
                .iter()
                .filter(|p| !covered.contains(*p))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{DowngradeOps, UpgradeOps};

    fn rev(id: &str, revises: &[&str]) -> Migration {
        Migration::new(
            id,
            revises.iter().map(ToString::to_string).collect(),
            format!("revision {}", id),
            UpgradeOps::default(),
            DowngradeOps::default(),
        )
    }

    fn ids(migrations: &[&Migration]) -> Vec<String> {
        migrations.iter().map(|m| m.revision.clone()).collect()
    }

    /// a1 -> b2 -> c3, plus a branch b2 -> d4.
    fn branched() -> RevisionMap {
        RevisionMap::new(vec![
            rev("d4", &["b2"]),
            rev("c3", &["b2"]),
            rev("b2", &["a1"]),
            rev("a1", &[]),
        ])
        .unwrap()
    }

    #[test]
    fn test_linear_order_ignores_input_order() {
        let map = RevisionMap::new(vec![rev("c", &["b"]), rev("a", &[]), rev("b", &["a"])])
            .unwrap();
        let order: Vec<&str> = map.iter().map(|m| m.revision.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(map.heads(), vec!["c"]);
        assert_eq!(map.bases(), vec!["a"]);
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            RevisionMap::new(vec![rev("a", &[]), rev("a", &[])]),
            Err(MigrateError::DuplicateRevision(id)) if id == "a"
        ));
        assert!(matches!(
            RevisionMap::new(vec![rev("a", &["zz"])]),
            Err(MigrateError::MissingParent { .. })
        ));
        assert!(matches!(
            RevisionMap::new(vec![rev("a", &["b"]), rev("b", &["a"])]),
            Err(MigrateError::CircularDependency)
        ));
    }

    #[test]
    fn test_resolve() {
        let map = branched();
        assert!(matches!(
            map.resolve("head"),
            Err(MigrateError::MultipleHeads(heads)) if heads == vec!["c3", "d4"]
        ));
        assert_eq!(map.resolve("heads").unwrap(), vec!["c3", "d4"]);
        assert!(map.resolve("base").unwrap().is_empty());
        assert_eq!(map.resolve("c").unwrap(), vec!["c3"]);
        assert!(matches!(
            map.resolve("x"),
            Err(MigrateError::RevisionNotFound(_))
        ));

        let map = RevisionMap::new(vec![rev("abc1", &[]), rev("abc2", &["abc1"])]).unwrap();
        assert!(matches!(
            map.resolve("abc"),
            Err(MigrateError::AmbiguousRevision { candidates, .. }) if candidates.len() == 2
        ));
        assert_eq!(map.resolve("head").unwrap(), vec!["abc2"]);
    }

    #[test]
    fn test_empty_map_resolves_head_to_nothing() {
        let map = RevisionMap::new(vec![]).unwrap();
        assert!(map.resolve("head").unwrap().is_empty());
        assert!(map.heads().is_empty());
    }

    #[test]
    fn test_range() {
        let map = branched();
        assert_eq!(ids(&map.range("a1:c3").unwrap()), vec!["c3", "b2", "a1"]);
        assert_eq!(ids(&map.range("b2:c3").unwrap()), vec!["c3", "b2"]);
        assert_eq!(ids(&map.range(":").unwrap()), vec!["d4", "c3", "b2", "a1"]);
        assert!(matches!(
            map.range("d4:c3"),
            Err(MigrateError::RangeNotAncestor { lower, .. }) if lower == "d4"
        ));
    }

    #[test]
    fn test_upgrade_and_downgrade_paths() {
        let map = branched();
        assert_eq!(
            ids(&map.upgrade_path(&[], "c3").unwrap()),
            vec!["a1", "b2", "c3"]
        );
        assert_eq!(
            ids(&map.upgrade_path(&["c3".to_string()], "heads").unwrap()),
            vec!["d4"]
        );
        let current = vec!["c3".to_string(), "d4".to_string()];
        assert_eq!(
            ids(&map.downgrade_path(&current, "a1").unwrap()),
            vec!["d4", "c3", "b2"]
        );
        assert_eq!(
            ids(&map.downgrade_path(&["c3".to_string()], "base").unwrap()),
            vec!["c3", "b2", "a1"]
        );
        assert!(matches!(
            map.downgrade_path(&["c3".to_string()], "d4"),
            Err(MigrateError::RangeNotAncestor { .. })
        ));
        assert!(matches!(
            map.upgrade_path(&["zz".to_string()], "heads"),
            Err(MigrateError::RevisionNotFound(_))
        ));
    }

    #[test]
    fn test_ledger_transitions() {
        let map = RevisionMap::new(vec![
            rev("a1", &[]),
            rev("b2", &["a1"]),
            rev("c3", &["a1"]),
            rev("m4", &["b2", "c3"]),
        ])
        .unwrap();
        let mut heads = BTreeSet::new();
        for id in ["a1", "b2", "c3"] {
            map.upgrade_transition(&heads, map.get(id).unwrap())
                .apply(&mut heads);
        }
        assert_eq!(heads, BTreeSet::from(["b2".to_string(), "c3".to_string()]));

        let merge = map.get("m4").unwrap();
        let up = map.upgrade_transition(&heads, merge);
        assert_eq!(up.delete, vec!["b2", "c3"]);
        up.apply(&mut heads);
        assert_eq!(heads, BTreeSet::from(["m4".to_string()]));

        map.downgrade_transition(&heads, merge).apply(&mut heads);
        assert_eq!(heads, BTreeSet::from(["b2".to_string(), "c3".to_string()]));

        // a1 is still below b2, so undoing c3 must not bring it back
        let down = map.downgrade_transition(&heads, map.get("c3").unwrap());
        assert!(down.insert.is_empty());
        down.apply(&mut heads);
        assert_eq!(heads, BTreeSet::from(["b2".to_string()]));

        map.downgrade_transition(&heads, map.get("b2").unwrap())
            .apply(&mut heads);
        assert_eq!(heads, BTreeSet::from(["a1".to_string()]));
    }
}

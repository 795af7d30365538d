//! Pairing of old and new elements: tracking ID, then name, then signature.

use std::collections::HashSet;

use crate::schema::{Constraint, ConstraintKind, Tracked};

/// How a pair was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MatchedBy {
    Id,
    Name,
    Signature,
}

pub(crate) struct Matched<'a, T> {
    pub pairs: Vec<(&'a T, &'a T, MatchedBy)>,
    pub added: Vec<&'a T>,
    pub removed: Vec<&'a T>,
}

/// Pair elements of `old` and `new`.
///
/// `signature` is consulted only for elements left over after the ID and
/// name phases.
pub(crate) fn match_elements<'a, T: Tracked>(
    old: &'a [T],
    new: &'a [T],
    signature: Option<fn(&T) -> Option<String>>,
) -> Matched<'a, T> {
    let mut used_old: HashSet<usize> = HashSet::new();
    let mut used_new: HashSet<usize> = HashSet::new();
    let mut pairs = Vec::new();

    // Phase 1: tracking IDs.
    for (ni, n) in new.iter().enumerate() {
        let Some(id) = n.tracking_id() else { continue };
        if let Some((oi, o)) = old
            .iter()
            .enumerate()
            .find(|(oi, o)| !used_old.contains(oi) && o.tracking_id() == Some(id))
        {
            used_old.insert(oi);
            used_new.insert(ni);
            pairs.push((o, n, MatchedBy::Id));
        }
    }

    // Phase 2: names within the same schema.
    for (ni, n) in new.iter().enumerate() {
        if used_new.contains(&ni) {
            continue;
        }
        if let Some((oi, o)) = old
            .iter()
            .enumerate()
            .find(|(oi, o)| {
                !used_old.contains(oi) && o.namespace() == n.namespace() && o.name() == n.name()
            })
        {
            used_old.insert(oi);
            used_new.insert(ni);
            pairs.push((o, n, MatchedBy::Name));
        }
    }

    // Phase 3: signatures.
    if let Some(sig) = signature {
        for (ni, n) in new.iter().enumerate() {
            if used_new.contains(&ni) {
                continue;
            }
            let Some(wanted) = sig(n) else { continue };
            if let Some((oi, o)) = old
                .iter()
                .enumerate()
                .find(|(oi, o)| !used_old.contains(oi) && sig(o).as_ref() == Some(&wanted))
            {
                used_old.insert(oi);
                used_new.insert(ni);
                pairs.push((o, n, MatchedBy::Signature));
            }
        }
    }

    let added = new
        .iter()
        .enumerate()
        .filter(|(i, _)| !used_new.contains(i))
        .map(|(_, n)| n)
        .collect();
    let removed = old
        .iter()
        .enumerate()
        .filter(|(i, _)| !used_old.contains(i))
        .map(|(_, o)| o)
        .collect();

    Matched {
        pairs,
        added,
        removed,
    }
}

/// Name-independent identity of a constraint.
///
/// CHECK constraints only get one when their name ends in `_check`; the
/// last two `_` tokens of the name (`age_check` of `users_age_check`) are
/// compared, so checks renamed along with their table still pair up.
pub(crate) fn constraint_signature(c: &Constraint) -> Option<String> {
    let mut cols = c.columns.clone();
    cols.sort();
    match c.kind {
        ConstraintKind::PrimaryKey => Some(format!("PRIMARY KEY:{}", cols.join(","))),
        ConstraintKind::Unique => Some(format!("UNIQUE:{}", cols.join(","))),
        ConstraintKind::ForeignKey => {
            let target = c.references.as_ref()?;
            Some(format!("FK:{}->{}", cols.join(","), target.target()))
        }
        ConstraintKind::Check => {
            let tokens: Vec<&str> = c.name.split('_').collect();
            if tokens.len() < 3 || tokens.last() != Some(&"check") {
                return None;
            }
            Some(format!("CHECK:{}", tokens[tokens.len() - 2..].join("_")))
        }
        ConstraintKind::Exclude => None,
    }
}

//! Rebuilds a DACL around a single full-access grant.
//!
//! The rules, in list order: explicit deny entries survive verbatim and
//! move to the front, inherited entries are dropped entirely (the
//! platform re-derives them from the parent when the list is applied),
//! and the target's allow entry collapses to one full-access entry at
//! its first occurrence — or is appended at the end when the target
//! never appears.

use std::mem;

use crate::ace::{
    Ace, AceKind, ACCESS_ALLOWED_ACE_LEN, CONTAINER_INHERIT_ACE, FILE_ALL_ACCESS,
    OBJECT_INHERIT_ACE,
};
use crate::acl::{Acl, AclError};
use crate::sid::Sid;

/// A rebuilt list plus what happened while rebuilding it.
#[derive(Debug)]
pub struct GrantOutcome {
    pub acl: Acl,
    /// Explicit deny entries carried over by the first pass.
    pub denies_preserved: usize,
    /// Whether an existing allow entry for the target was collapsed in
    /// place rather than the grant being appended at the end.
    pub replaced_existing: bool,
}

/// Produces a new list granting `target` full access.
///
/// The capacity is computed up front — the old list's bytes in use, plus
/// one `ACCESS_ALLOWED_ACE` for a SID of the target's length, minus the
/// `SidStart` DWORD counted by both — and is never resized; the whole
/// merge happens in that single allocation. Any append failure aborts
/// the merge with the original list untouched.
pub fn grant_full_access(old: &Acl, target: &Sid) -> Result<GrantOutcome, AclError> {
    let capacity =
        old.bytes_in_use() + ACCESS_ALLOWED_ACE_LEN + target.len() - mem::size_of::<u32>();
    let mut fresh = Acl::with_capacity(capacity)?;

    let mut denies_preserved = 0;
    for ace in old.aces() {
        if ace.is_inherited() {
            continue;
        }
        if ace.kind() == AceKind::Deny {
            fresh.append(&ace)?;
            denies_preserved += 1;
        }
    }

    let grant = Ace::access_allowed(
        CONTAINER_INHERIT_ACE | OBJECT_INHERIT_ACE,
        FILE_ALL_ACCESS,
        target,
    );
    let mut replaced_existing = false;
    for ace in old.aces() {
        if ace.is_inherited() {
            continue;
        }
        match ace.kind() {
            // already carried over by the first pass
            AceKind::Deny => continue,
            AceKind::Allow if ace.sid().as_ref() == Some(target) => {
                // collapse at the first occurrence, drop the rest
                if !replaced_existing {
                    fresh.append(&grant)?;
                    replaced_existing = true;
                }
            }
            _ => fresh.append(&ace)?,
        }
    }

    if !replaced_existing {
        fresh.append(&grant)?;
    }

    Ok(GrantOutcome {
        acl: fresh,
        denies_preserved,
        replaced_existing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ace::{
        ACCESS_DENIED_ACE_TYPE, ACE_HEADER_LEN, INHERITED_ACE, INHERIT_ONLY_ACE,
    };
    use crate::acl::ACL_HEADER_LEN;

    fn sid(tail: u32) -> Sid {
        Sid::from_parts(5, &[21, 1111, 2222, tail]).unwrap()
    }

    /// Builds an arbitrary allow/deny/other entry through the decoder.
    fn entry(ace_type: u8, flags: u8, mask: u32, sid: &Sid) -> Ace {
        let size = ACE_HEADER_LEN + 4 + sid.len();
        let mut raw = vec![ace_type, flags];
        raw.extend_from_slice(&(size as u16).to_le_bytes());
        raw.extend_from_slice(&mask.to_le_bytes());
        raw.extend_from_slice(sid.as_bytes());
        Ace::decode(&raw).unwrap()
    }

    fn acl_of(entries: &[Ace]) -> Acl {
        let bytes: usize = entries.iter().map(Ace::len).sum();
        let mut acl = Acl::with_capacity(ACL_HEADER_LEN + bytes).unwrap();
        for ace in entries {
            acl.append(ace).unwrap();
        }
        acl
    }

    fn full_access_entries(acl: &Acl, target: &Sid) -> Vec<usize> {
        acl.aces()
            .enumerate()
            .filter(|(_, ace)| {
                ace.kind() == AceKind::Allow
                    && ace.sid().as_ref() == Some(target)
                    && ace.mask() == Some(FILE_ALL_ACCESS)
                    && ace.flags() == CONTAINER_INHERIT_ACE | OBJECT_INHERIT_ACE
            })
            .map(|(index, _)| index)
            .collect()
    }

    #[test]
    fn appends_grant_when_target_is_absent() {
        let bystander = entry(0, 0, 0x1201bf, &sid(1));
        let old = acl_of(&[bystander.clone()]);
        let outcome = grant_full_access(&old, &sid(9)).unwrap();

        assert!(!outcome.replaced_existing);
        assert_eq!(outcome.denies_preserved, 0);
        let entries: Vec<_> = outcome.acl.aces().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], bystander);
        assert_eq!(full_access_entries(&outcome.acl, &sid(9)), vec![1]);
    }

    #[test]
    fn collapses_existing_grant_in_place() {
        let before = entry(0, 0, 0x1, &sid(1));
        let existing = entry(0, INHERIT_ONLY_ACE, 0x120089, &sid(9));
        let after = entry(0, 0, 0x2, &sid(2));
        let old = acl_of(&[before.clone(), existing, after.clone()]);
        let outcome = grant_full_access(&old, &sid(9)).unwrap();

        assert!(outcome.replaced_existing);
        let entries: Vec<_> = outcome.acl.aces().collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], before);
        assert_eq!(entries[2], after);
        // the stale flags and mask are gone, not copied
        assert_eq!(full_access_entries(&outcome.acl, &sid(9)), vec![1]);
    }

    #[test]
    fn multiple_matches_collapse_to_one() {
        let old = acl_of(&[
            entry(0, 0, 0x1, &sid(9)),
            entry(0, 0, 0x2, &sid(1)),
            entry(0, 0, 0x4, &sid(9)),
        ]);
        let outcome = grant_full_access(&old, &sid(9)).unwrap();

        let entries: Vec<_> = outcome.acl.aces().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(full_access_entries(&outcome.acl, &sid(9)), vec![0]);
        assert_eq!(entries[1].sid(), Some(sid(1)));
    }

    #[test]
    fn explicit_denies_move_to_the_front_in_order() {
        let allow = entry(0, 0, 0x7, &sid(1));
        let deny_a = entry(ACCESS_DENIED_ACE_TYPE, 0, 0x2, &sid(2));
        let deny_b = entry(ACCESS_DENIED_ACE_TYPE, CONTAINER_INHERIT_ACE, 0x4, &sid(3));
        let old = acl_of(&[allow.clone(), deny_a.clone(), deny_b.clone()]);
        let outcome = grant_full_access(&old, &sid(9)).unwrap();

        assert_eq!(outcome.denies_preserved, 2);
        let entries: Vec<_> = outcome.acl.aces().collect();
        // denies first, bytes untouched, original relative order
        assert_eq!(entries[0], deny_a);
        assert_eq!(entries[1], deny_b);
        assert_eq!(entries[2], allow);
        assert_eq!(full_access_entries(&outcome.acl, &sid(9)), vec![3]);
    }

    #[test]
    fn inherited_entries_never_survive() {
        let old = acl_of(&[
            entry(0, INHERITED_ACE, 0x1, &sid(1)),
            entry(ACCESS_DENIED_ACE_TYPE, INHERITED_ACE, 0x2, &sid(2)),
            entry(0, INHERITED_ACE, 0x4, &sid(9)),
        ]);
        let outcome = grant_full_access(&old, &sid(9)).unwrap();

        assert_eq!(outcome.denies_preserved, 0);
        // even the target's inherited entry is dropped, so the grant is
        // a fresh append
        assert!(!outcome.replaced_existing);
        let entries: Vec<_> = outcome.acl.aces().collect();
        assert_eq!(entries.len(), 1);
        assert!(entries.iter().all(|ace| !ace.is_inherited()));
        assert_eq!(full_access_entries(&outcome.acl, &sid(9)), vec![0]);
    }

    #[test]
    fn opaque_entries_pass_through_verbatim() {
        // SYSTEM_AUDIT_ACE_TYPE rides along untouched
        let audit = entry(0x02, 0x40, 0x99, &sid(4));
        let old = acl_of(&[audit.clone()]);
        let outcome = grant_full_access(&old, &sid(9)).unwrap();

        let entries: Vec<_> = outcome.acl.aces().collect();
        assert_eq!(entries[0], audit);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn capacity_follows_the_exact_formula() {
        let target = sid(9);
        let old = acl_of(&[entry(0, 0, 0x1, &sid(1)), entry(0, 0, 0x2, &sid(2))]);
        let outcome = grant_full_access(&old, &target).unwrap();

        assert_eq!(
            outcome.acl.capacity(),
            old.bytes_in_use() + ACCESS_ALLOWED_ACE_LEN + target.len() - 4
        );
        // with nothing dropped and the grant appended, the buffer is
        // exactly full
        assert_eq!(outcome.acl.bytes_in_use(), outcome.acl.capacity());
    }

    #[test]
    fn granting_twice_changes_nothing() {
        let target = sid(9);
        let old = acl_of(&[
            entry(ACCESS_DENIED_ACE_TYPE, 0, 0x2, &sid(2)),
            entry(0, 0, 0x1, &sid(1)),
        ]);
        let once = grant_full_access(&old, &target).unwrap();
        let twice = grant_full_access(&once.acl, &target).unwrap();

        assert!(twice.replaced_existing);
        let first: Vec<_> = once.acl.aces().collect();
        let second: Vec<_> = twice.acl.aces().collect();
        assert_eq!(first, second);
        assert_eq!(full_access_entries(&twice.acl, &target).len(), 1);
    }

    #[test]
    fn empty_list_gets_exactly_the_grant() {
        let target = sid(9);
        let outcome = grant_full_access(&Acl::empty(), &target).unwrap();

        assert_eq!(outcome.denies_preserved, 0);
        assert!(!outcome.replaced_existing);
        assert_eq!(outcome.acl.ace_count(), 1);
        assert_eq!(full_access_entries(&outcome.acl, &target), vec![0]);
    }
}

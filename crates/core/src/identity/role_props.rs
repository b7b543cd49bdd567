//! Property tests for legacy flag projections.

use proptest::prelude::*;

use super::{LegacyFlag, Role};

fn any_role() -> impl Strategy<Value = Role> {
    prop::sample::select(Role::PRECEDENCE.to_vec())
}

fn any_flag() -> impl Strategy<Value = LegacyFlag> {
    prop::sample::select(LegacyFlag::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Setting a flag is always read back as set, and no other flag is set.
    #[test]
    fn prop_set_flag_reads_back(role in any_role(), flag in any_flag()) {
        let updated = role.with_flag(flag, true);
        prop_assert!(updated.flag(flag));
        for other in LegacyFlag::ALL {
            if other != flag {
                prop_assert!(!updated.flag(other));
            }
        }
    }

    /// Clearing a flag is always read back as cleared.
    #[test]
    fn prop_clear_flag_reads_back(role in any_role(), flag in any_flag()) {
        let updated = role.with_flag(flag, false);
        prop_assert!(!updated.flag(flag));
        if role != flag.role() {
            prop_assert_eq!(updated, role);
        }
    }

    /// Projecting to flags and collapsing back is the identity.
    #[test]
    fn prop_flags_roundtrip(role in any_role()) {
        prop_assert_eq!(Role::from_legacy_flags(role.legacy_flags()), role);
    }
}

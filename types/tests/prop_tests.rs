use proptest::prelude::*;

use pointgate_types::time::SECS_PER_DAY;
use pointgate_types::{Account, RewardParams, Timestamp, UserId};

fn account_checked_in_at(last: Option<u64>) -> Account {
    Account {
        id: UserId::new(1),
        username: Some("alice".into()),
        display_name: "Alice".into(),
        balance: 0,
        blocked: false,
        referred_by: None,
        created_at: Timestamp::EPOCH,
        last_check_in: last.map(Timestamp::new),
    }
}

proptest! {
    /// Calendar days never go backwards as time moves forward.
    #[test]
    fn calendar_day_is_monotonic(
        a in 0u64..u64::MAX / 2,
        b in 0u64..u64::MAX / 2,
        offset in -14 * 3600i32..=14 * 3600,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(Timestamp::new(lo).calendar_day(offset) <= Timestamp::new(hi).calendar_day(offset));
    }

    /// Two instants less than a day apart are at most one calendar day apart.
    #[test]
    fn calendar_days_differ_by_at_most_one_within_a_day(
        start in 0u64..u64::MAX / 2,
        delta in 0u64..SECS_PER_DAY,
        offset in -14 * 3600i32..=14 * 3600,
    ) {
        let d0 = Timestamp::new(start).calendar_day(offset).index();
        let d1 = Timestamp::new(start + delta).calendar_day(offset).index();
        prop_assert!(d1 - d0 <= 1);
    }

    /// After a check-in at `t`, another check-in is allowed exactly when the
    /// calendar day has advanced.
    #[test]
    fn check_in_guard_matches_day_comparison(
        last in 0u64..u64::MAX / 2,
        later in 0u64..10 * SECS_PER_DAY,
        offset in -14 * 3600i32..=14 * 3600,
    ) {
        let acc = account_checked_in_at(Some(last));
        let now = Timestamp::new(last + later);
        let expected = Timestamp::new(last).calendar_day(offset) < now.calendar_day(offset);
        prop_assert_eq!(acc.can_check_in(now, offset), expected);
    }

    /// Account records survive bincode encoding (the LMDB value format).
    #[test]
    fn account_bincode_roundtrip(id in 0u64.., balance in 0i64.., last in proptest::option::of(0u64..)) {
        let mut acc = account_checked_in_at(last);
        acc.id = UserId::new(id);
        acc.balance = balance;
        let encoded = bincode::serialize(&acc).unwrap();
        let decoded: Account = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, acc);
    }
}

#[test]
fn default_rewards_match_published_values() {
    let params = RewardParams::default();
    assert_eq!(params.register_reward, 1);
    assert_eq!(params.invite_reward, 2);
    assert_eq!(params.checkin_reward, 1);
    assert_eq!(params.verify_cost, 1);
    assert_eq!(params.utc_offset_secs, 0);
}

use chrono::NaiveDate;
use proptest::prelude::*;
use velt_migration::config::LocationTypeRef;

/// Dates between 2000 and 2030
pub fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (0i64..11_000).prop_map(|offset| {
        NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default() + chrono::Duration::days(offset)
    })
}

/// One to six location types with ids 1..=n; exactly one default
pub fn location_types_strategy() -> impl Strategy<Value = Vec<LocationTypeRef>> {
    (1usize..=6)
        .prop_flat_map(|n| (Just(n), 0..n))
        .prop_map(|(n, default_index)| {
            (0..n)
                .map(|i| LocationTypeRef {
                    id: i as i64 + 1,
                    name: format!("slot{i}"),
                    is_default: i == default_index,
                })
                .collect()
        })
}

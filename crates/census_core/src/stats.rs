//! Birthday gift counts and per-town age percentiles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::graph::neighbor_map;
use crate::{CitizenId, RowId};

pub const AGE_PERCENTILES: [u32; 3] = [50, 75, 99];

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PresentsCount {
    pub citizen_id: CitizenId,
    pub presents: u32,
}

/// Month number (1..=12) to the citizens buying presents that month.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BirthdayPresents {
    pub months: BTreeMap<u8, Vec<PresentsCount>>,
}

impl BirthdayPresents {
    pub fn month(&self, month: u8) -> &[PresentsCount] {
        self.months.get(&month).map(Vec::as_slice).unwrap_or_default()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TownAgeStats {
    pub town: String,
    pub p50: i64,
    pub p75: i64,
    pub p99: i64,
}

/// Minimal per-citizen projection the gift count needs.
#[derive(Clone, Copy, Debug)]
pub struct BirthdayRow {
    pub row_id: RowId,
    pub citizen_id: CitizenId,
    pub birth_date: Date,
}

/// Counts, per month, the presents each citizen buys for relatives born that month.
///
/// One pass over the edges; every month key is present, citizens with no presents in a
/// month are left out of it.
pub fn count_presents(citizens: &[BirthdayRow], edges: &[(RowId, RowId)]) -> BirthdayPresents {
    let by_row: BTreeMap<RowId, &BirthdayRow> =
        citizens.iter().map(|row| (row.row_id, row)).collect();
    let mut counters: BTreeMap<u8, BTreeMap<CitizenId, u32>> =
        (1..=12).map(|month| (month, BTreeMap::new())).collect();
    for (row_id, neighbors) in neighbor_map(edges) {
        let Some(buyer) = by_row.get(&row_id) else {
            continue;
        };
        for neighbor in neighbors {
            let Some(relative) = by_row.get(&neighbor) else {
                continue;
            };
            let month = u8::from(relative.birth_date.month());
            *counters
                .entry(month)
                .or_default()
                .entry(buyer.citizen_id)
                .or_default() += 1;
        }
    }
    BirthdayPresents {
        months: counters
            .into_iter()
            .map(|(month, buyers)| {
                let list = buyers
                    .into_iter()
                    .map(|(citizen_id, presents)| PresentsCount {
                        citizen_id,
                        presents,
                    })
                    .collect();
                (month, list)
            })
            .collect(),
    }
}

/// Full years between `birth` and `today`.
pub fn age_on(birth: Date, today: Date) -> i64 {
    let years = i64::from(today.year()) - i64::from(birth.year());
    let birthday_pending = (u8::from(today.month()), today.day())
        < (u8::from(birth.month()), birth.day());
    if birthday_pending { years - 1 } else { years }
}

/// Linear-interpolation percentile of an ascending slice, rounded up.
///
/// Evaluated in integer arithmetic: the rank `percent/100 * (n-1)` is kept scaled by
/// 100 so the interpolation and the ceiling are exact.
pub fn percentile_ceil(sorted: &[i64], percent: u32) -> Option<i64> {
    let last = sorted.len().checked_sub(1)?;
    let scaled_rank = percent as usize * last;
    let lower = scaled_rank / 100;
    let fraction = (scaled_rank % 100) as i64;
    let low = sorted[lower];
    if fraction == 0 {
        return Some(low);
    }
    let high = sorted[lower + 1];
    let scaled = low * 100 + (high - low) * fraction;
    let ceil = scaled.div_euclid(100) + i64::from(scaled.rem_euclid(100) > 0);
    Some(ceil)
}

/// Groups residents by town and computes the age percentiles of each, sorted by town.
pub fn town_age_stats<'a, I>(residents: I, today: Date) -> Vec<TownAgeStats>
where
    I: IntoIterator<Item = (&'a str, Date)>,
{
    let mut ages: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
    for (town, birth_date) in residents {
        ages.entry(town).or_default().push(age_on(birth_date, today));
    }
    ages.into_iter()
        .filter_map(|(town, mut town_ages)| {
            town_ages.sort_unstable();
            let [p50, p75, p99] = AGE_PERCENTILES.map(|p| percentile_ceil(&town_ages, p));
            Some(TownAgeStats {
                town: town.to_string(),
                p50: p50?,
                p75: p75?,
                p99: p99?,
            })
        })
        .collect()
}

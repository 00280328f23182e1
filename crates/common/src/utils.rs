//! Small helpers shared by the read layer and the CLI.

use chrono::{Datelike, NaiveDate};
use std::collections::{HashMap, HashSet};
use std::fmt::Display;

/// Last day of the given month, or `None` for an invalid month.
pub fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month.checked_add(1)?, 1)?
    };
    // Validates `month` for the December branch too.
    NaiveDate::from_ymd_opt(year, month, 1)?;
    Some(first_of_next.pred_opt()?.day())
}

/// Render pairs as `key=value, key=value` in iteration order.
pub fn dict_to_string<I, K, V>(pairs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: Display,
    V: Display,
{
    pairs
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Every option whose similarity to `query` is at least `cutoff`.
///
/// Similarity is `2 * M / T`, where `M` counts characters in the matching
/// blocks found by repeatedly taking the longest common substring and `T` is
/// the combined length. For queries of 200 characters or more, characters
/// making up over 1% of the query cannot start a match, though they still
/// extend one. Results are ordered best first; equal scores are ordered by
/// option text, descending. `cutoff` is clamped to `0.0..=1.0`.
pub fn find_all_matches<S: AsRef<str>>(query: &str, options: &[S], cutoff: f64) -> Vec<String> {
    let cutoff = cutoff.clamp(0.0, 1.0);
    let query: Vec<char> = query.chars().collect();

    let mut scored: Vec<(f64, &str)> = options
        .iter()
        .map(AsRef::as_ref)
        .filter_map(|option| {
            let candidate: Vec<char> = option.chars().collect();
            let score = similarity(&candidate, &query);
            (score >= cutoff).then_some((score, option))
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| b.1.cmp(a.1)));
    scored.into_iter().map(|(_, option)| option.to_string()).collect()
}

/// One page of `items`. Pages are 1-based; page 0 reads as page 1 and a page
/// past the end is empty.
pub fn paginate_list<T>(items: &[T], page: usize, size: usize) -> &[T] {
    let start = page.max(1).saturating_sub(1).saturating_mul(size);
    if start >= items.len() {
        return &[];
    }
    let end = start.saturating_add(size).min(items.len());
    &items[start..end]
}

/// Length from which frequent characters of the second sequence are ignored
/// when seeding matches.
const POPULAR_MIN_LEN: usize = 200;

fn similarity(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(a, b) as f64 / total as f64
}

/// Characters occurring in more than 1% of `b`, once `b` is long enough.
fn popular_characters(b: &[char]) -> HashSet<char> {
    if b.len() < POPULAR_MIN_LEN {
        return HashSet::new();
    }

    let limit = b.len() / 100 + 1;
    let mut counts: HashMap<char, usize> = HashMap::new();
    for c in b {
        *counts.entry(*c).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > limit)
        .map(|(c, _)| c)
        .collect()
}

fn matching_characters(a: &[char], b: &[char]) -> usize {
    let popular = popular_characters(b);
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_match(a, b, &popular, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }

    matched
}

/// Longest common run of `a[alo..ahi]` and `b[blo..bhi]`; the earliest start
/// in `a` wins, then the earliest in `b`. Runs are seeded from non-popular
/// characters only, then grown over equal neighbours of any kind.
fn longest_match(
    a: &[char],
    b: &[char],
    popular: &HashSet<char>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut best = (alo, blo, 0);
    let width = bhi - blo + 1;
    let mut prev = vec![0usize; width];

    for i in alo..ahi {
        let mut current = vec![0usize; width];
        for j in blo..bhi {
            if a[i] == b[j] && !popular.contains(&b[j]) {
                let run = prev[j - blo] + 1;
                current[j - blo + 1] = run;
                if run > best.2 {
                    best = (i + 1 - run, j + 1 - run, run);
                }
            }
        }
        prev = current;
    }

    let (mut i, mut j, mut size) = best;
    while i > alo && j > blo && a[i - 1] == b[j - 1] {
        i -= 1;
        j -= 1;
        size += 1;
    }
    while i + size < ahi && j + size < bhi && a[i + size] == b[j + size] {
        size += 1;
    }
    (i, j, size)
}

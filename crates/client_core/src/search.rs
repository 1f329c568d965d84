//! In-memory search over portal records.
//!
//! A record matches a query when one of its searchable fields contains the
//! whole query, or when every whitespace-separated token of the query is
//! contained in some field (tokens may land in different fields). Matching is
//! case-insensitive. Tag and status criteria are ANDed with the text query.

use std::{borrow::Cow, cmp::Ordering, collections::BTreeSet, hash::Hash};

use rand::{rngs::StdRng, seq::index, Rng, SeedableRng};
use shared::domain::{
    Lecturer, LecturerId, Partner, PartnerId, ProgramId, ProgramStatus, RequestId, ReviewStatus,
    TrainingProgram, TrainingProgramRequest,
};

/// Size of the default view shown while no query and no tag filter is set.
pub const DEFAULT_SAMPLE_SIZE: usize = 3;

pub trait Searchable {
    type Key: Copy + Ord + Hash;
    type Status: Copy + PartialEq;

    fn key(&self) -> Self::Key;
    fn status(&self) -> Self::Status;
    fn search_fields(&self) -> Vec<Cow<'_, str>>;

    fn tags(&self) -> &[String] {
        &[]
    }
}

impl Searchable for TrainingProgram {
    type Key = ProgramId;
    type Status = ProgramStatus;

    fn key(&self) -> ProgramId {
        self.id
    }

    fn status(&self) -> ProgramStatus {
        self.status
    }

    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        let mut fields = vec![
            Cow::Borrowed(self.title.as_str()),
            Cow::Borrowed(self.subtitle.as_str()),
            Cow::Borrowed(self.description.as_str()),
            Cow::Borrowed(self.learning_outcomes.as_str()),
            Cow::Owned(format_price(self.price)),
        ];
        if let Some(discounted) = self.discounted_price {
            fields.push(Cow::Owned(format_price(discounted)));
        }
        fields.extend(self.tags.iter().map(|tag| Cow::Borrowed(tag.as_str())));
        fields
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }
}

impl Searchable for Lecturer {
    type Key = LecturerId;
    type Status = ReviewStatus;

    fn key(&self) -> LecturerId {
        self.id
    }

    fn status(&self) -> ReviewStatus {
        self.status
    }

    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![
            Cow::Borrowed(self.full_name.as_str()),
            Cow::Borrowed(self.email.as_str()),
            Cow::Borrowed(self.phone.as_str()),
            Cow::Borrowed(self.expertise.as_str()),
            Cow::Borrowed(self.bio.as_str()),
        ]
    }
}

impl Searchable for Partner {
    type Key = PartnerId;
    type Status = ReviewStatus;

    fn key(&self) -> PartnerId {
        self.id
    }

    fn status(&self) -> ReviewStatus {
        self.status
    }

    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![
            Cow::Borrowed(self.name.as_str()),
            Cow::Borrowed(self.email.as_str()),
            Cow::Borrowed(self.website.as_str()),
            Cow::Borrowed(self.address.as_str()),
            Cow::Borrowed(self.description.as_str()),
        ]
    }
}

impl Searchable for TrainingProgramRequest {
    type Key = RequestId;
    type Status = ReviewStatus;

    fn key(&self) -> RequestId {
        self.id
    }

    fn status(&self) -> ReviewStatus {
        self.status
    }

    fn search_fields(&self) -> Vec<Cow<'_, str>> {
        vec![
            Cow::Borrowed(self.title.as_str()),
            Cow::Borrowed(self.description.as_str()),
        ]
    }
}

/// Formats an amount of VND the way the portal displays it: `2.000.000 ₫`.
pub fn format_price(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 4);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    if amount < 0 {
        format!("-{grouped} ₫")
    } else {
        format!("{grouped} ₫")
    }
}

/// Whole-query or all-tokens containment over already lowercased fields.
fn text_matches(fields: &[String], query: &str) -> bool {
    if query.is_empty() || fields.iter().any(|field| field.contains(query)) {
        return true;
    }
    query
        .split_whitespace()
        .all(|token| fields.iter().any(|field| field.contains(token)))
}

pub fn matches_query<T: Searchable + ?Sized>(record: &T, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    let fields: Vec<String> = record
        .search_fields()
        .iter()
        .map(|field| field.to_lowercase())
        .collect();
    text_matches(&fields, &query)
}

#[derive(Debug, Clone)]
pub struct SearchFilter<S> {
    pub query: String,
    /// A record must carry every selected tag.
    pub tags: Vec<String>,
    /// Empty means any status.
    pub statuses: Vec<S>,
}

impl<S> Default for SearchFilter<S> {
    fn default() -> Self {
        Self {
            query: String::new(),
            tags: Vec::new(),
            statuses: Vec::new(),
        }
    }
}

impl<S: Copy + PartialEq> SearchFilter<S> {
    pub fn with_query(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn status(mut self, status: S) -> Self {
        self.statuses.push(status);
        self
    }

    /// No query and no tag filter: the caller gets a small sample instead of
    /// the full list.
    pub fn is_default_view(&self) -> bool {
        self.query.trim().is_empty() && self.tags.is_empty()
    }

    pub fn accepts<T>(&self, record: &T) -> bool
    where
        T: Searchable<Status = S> + ?Sized,
    {
        if !self.statuses.is_empty() && !self.statuses.contains(&record.status()) {
            return false;
        }
        let has_all_tags = self.tags.iter().all(|wanted| {
            let wanted = wanted.to_lowercase();
            record.tags().iter().any(|tag| tag.to_lowercase() == wanted)
        });
        has_all_tags && matches_query(record, &self.query)
    }
}

/// Every record accepted by `filter`, in input order. Never samples.
pub fn filter_records<'a, T: Searchable>(
    records: &'a [T],
    filter: &SearchFilter<T::Status>,
) -> Vec<&'a T> {
    records.iter().filter(|record| filter.accepts(*record)).collect()
}

/// Runs `filter`, sampling at most [`DEFAULT_SAMPLE_SIZE`] records when the
/// filter is in its default view.
pub fn search<'a, T, R>(
    records: &'a [T],
    filter: &SearchFilter<T::Status>,
    rng: &mut R,
) -> Vec<&'a T>
where
    T: Searchable,
    R: Rng + ?Sized,
{
    let matches = filter_records(records, filter);
    if !filter.is_default_view() {
        return matches;
    }
    sample_in_order(matches, rng)
}

fn sample_in_order<'a, T, R: Rng + ?Sized>(matches: Vec<&'a T>, rng: &mut R) -> Vec<&'a T> {
    let amount = DEFAULT_SAMPLE_SIZE.min(matches.len());
    let mut picked = index::sample(rng, matches.len(), amount).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| matches[i]).collect()
}

/// Search state for one browsing session.
///
/// The default-view sample is drawn once and reused for as long as the set of
/// candidate records stays the same, so re-rendering does not reshuffle it.
pub struct SessionSearch<K> {
    rng: StdRng,
    sample: Option<(BTreeSet<K>, Vec<K>)>,
}

impl<K: Copy + Ord> SessionSearch<K> {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            sample: None,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            sample: None,
        }
    }

    pub fn run<'a, T>(&mut self, records: &'a [T], filter: &SearchFilter<T::Status>) -> Vec<&'a T>
    where
        T: Searchable<Key = K>,
    {
        if !filter.is_default_view() {
            return filter_records(records, filter);
        }

        let candidates = filter_records(records, filter);
        let candidate_keys: BTreeSet<K> = candidates.iter().map(|record| record.key()).collect();
        let reuse = matches!(&self.sample, Some((keys, _)) if *keys == candidate_keys);
        if !reuse {
            let sampled = sample_in_order(candidates.clone(), &mut self.rng)
                .into_iter()
                .map(|record| record.key())
                .collect();
            self.sample = Some((candidate_keys, sampled));
        }

        let chosen = match &self.sample {
            Some((_, keys)) => keys,
            None => return Vec::new(),
        };
        candidates
            .into_iter()
            .filter(|record| chosen.contains(&record.key()))
            .collect()
    }

    /// Forgets the remembered sample; the next default view draws a new one.
    pub fn reshuffle(&mut self) {
        self.sample = None;
    }
}

impl<K: Copy + Ord> Default for SessionSearch<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramSortKey {
    Title,
    Price,
    StartDate,
    Status,
}

impl ProgramSortKey {
    fn compare(self, a: &TrainingProgram, b: &TrainingProgram) -> Ordering {
        match self {
            ProgramSortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            ProgramSortKey::Price => effective_price(a).cmp(&effective_price(b)),
            // Undated programs sort last in ascending order.
            ProgramSortKey::StartDate => match (a.start_date, b.start_date) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            ProgramSortKey::Status => a.status.as_str().cmp(b.status.as_str()),
        }
    }
}

fn effective_price(program: &TrainingProgram) -> i64 {
    program.discounted_price.unwrap_or(program.price)
}

/// Stable sort of a result page for table display.
pub fn sort_programs(
    programs: &mut [&TrainingProgram],
    key: ProgramSortKey,
    direction: SortDirection,
) {
    programs.sort_by(|a, b| {
        let ordering = key.compare(a, b);
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
}

#[cfg(test)]
#[path = "tests/search_tests.rs"]
mod tests;

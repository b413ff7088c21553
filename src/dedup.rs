//! Duplicate and near-duplicate detection over one import run.
//!
//! Exact duplicates share a normalized signature (title, module and step
//! descriptions). Each exact group keeps its most complete record. In smart
//! mode the surviving records are also compared pairwise with a weighted
//! Levenshtein similarity; near-duplicates are only reported, never removed.

use std::collections::{HashMap, HashSet};

use clap::ValueEnum;
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::model::{Priority, TestCase};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;
pub const DEFAULT_TITLE_WEIGHT: f64 = 0.6;
pub const DEFAULT_STEPS_WEIGHT: f64 = 0.4;
const MAX_STEP_BONUS: u32 = 10;
const POINTS_PER_STEP: u32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum DeduplicationMode {
    Off,
    #[default]
    Strict,
    Smart,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupConfig {
    pub similarity_threshold: f64,
    pub title_weight: f64,
    pub steps_weight: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            title_weight: DEFAULT_TITLE_WEIGHT,
            steps_weight: DEFAULT_STEPS_WEIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateType {
    Exact,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    pub signature: String,
    pub cases: Vec<TestCase>,
    pub keep_case: TestCase,
    pub duplicate_type: DuplicateType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarGroup {
    pub cases: Vec<TestCase>,
    pub similarity_score: f64,
    pub differences: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeduplicationStats {
    pub original_count: usize,
    pub duplicates_removed: usize,
    pub final_count: usize,
    pub duplicate_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateDetectionResult {
    pub exact_duplicates: Vec<DuplicateGroup>,
    pub similar_cases: Vec<SimilarGroup>,
    pub unique_cases: Vec<TestCase>,
    pub deduplication_stats: DeduplicationStats,
}

/// Lower-cases and collapses runs of whitespace.
pub fn normalize_text(value: &str) -> String {
    value.split_whitespace().join(" ").to_lowercase()
}

fn joined_step_text(case: &TestCase) -> String {
    case.test_steps
        .iter()
        .map(|step| normalize_text(&step.description))
        .join("|")
}

pub fn exact_signature(case: &TestCase) -> String {
    format!(
        "{}||{}||{}",
        normalize_text(&case.title),
        normalize_text(&case.module),
        joined_step_text(case)
    )
}

pub fn completeness_score(case: &TestCase) -> u32 {
    let mut score = 0;
    if !case.title.trim().is_empty() {
        score += 10;
    }
    if !case.description.trim().is_empty() {
        score += 5;
    }
    if !case.category.trim().is_empty() {
        score += 3;
    }
    if case.priority != Priority::Medium {
        score += 2;
    }
    score += (case.test_steps.len() as u32 * POINTS_PER_STEP).min(MAX_STEP_BONUS);
    if !case.test_data.trim().is_empty() {
        score += 3;
    }
    if !case.expected_result.trim().is_empty() {
        score += 3;
    }
    score + case.tags.len() as u32
}

/// `(max_len - distance) / max_len` over chars; 1.0 for two empty strings.
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

pub fn case_similarity(a: &TestCase, b: &TestCase, config: &DedupConfig) -> f64 {
    let titles = levenshtein_similarity(&normalize_text(&a.title), &normalize_text(&b.title));
    let steps = levenshtein_similarity(&joined_step_text(a), &joined_step_text(b));
    config.title_weight * titles + config.steps_weight * steps
}

pub fn detect_duplicates(
    cases: &[TestCase],
    mode: DeduplicationMode,
    config: &DedupConfig,
) -> DuplicateDetectionResult {
    let mut order: Vec<(String, Vec<usize>)> = Vec::new();
    let mut by_signature: HashMap<String, usize> = HashMap::new();
    for (idx, case) in cases.iter().enumerate() {
        let signature = exact_signature(case);
        match by_signature.get(&signature) {
            Some(&slot) => order[slot].1.push(idx),
            None => {
                by_signature.insert(signature.clone(), order.len());
                order.push((signature, vec![idx]));
            }
        }
    }

    let mut exact_duplicates = Vec::new();
    let mut dropped: HashSet<usize> = HashSet::new();
    for (signature, members) in order.into_iter().filter(|(_, m)| m.len() > 1) {
        let mut keep = members[0];
        for &idx in &members[1..] {
            if completeness_score(&cases[idx]) > completeness_score(&cases[keep]) {
                keep = idx;
            }
        }
        dropped.extend(members.iter().copied().filter(|&idx| idx != keep));
        exact_duplicates.push(DuplicateGroup {
            signature,
            cases: members.iter().map(|&idx| cases[idx].clone()).collect(),
            keep_case: cases[keep].clone(),
            duplicate_type: DuplicateType::Exact,
        });
    }

    let removing = mode != DeduplicationMode::Off;
    let unique_cases = cases
        .iter()
        .enumerate()
        .filter(|(idx, _)| !removing || !dropped.contains(idx))
        .map(|(_, case)| case.clone())
        .collect::<Vec<_>>();

    let similar_cases = if mode == DeduplicationMode::Smart {
        find_similar_groups(&unique_cases, config)
    } else {
        Vec::new()
    };

    let original_count = cases.len();
    let duplicates_removed = if removing { dropped.len() } else { 0 };
    let stats = DeduplicationStats {
        original_count,
        duplicates_removed,
        final_count: unique_cases.len(),
        duplicate_rate: if original_count == 0 {
            0.0
        } else {
            duplicates_removed as f64 / original_count as f64
        },
    };
    info!(
        "Duplicate detection ({mode:?}): {} exact group(s), {} similar group(s), {} removed",
        exact_duplicates.len(),
        similar_cases.len(),
        duplicates_removed
    );

    DuplicateDetectionResult {
        exact_duplicates,
        similar_cases,
        unique_cases,
        deduplication_stats: stats,
    }
}

struct Comparable {
    title: String,
    steps: String,
    title_len: usize,
    steps_len: usize,
}

impl Comparable {
    fn new(case: &TestCase) -> Self {
        let title = normalize_text(&case.title);
        let steps = joined_step_text(case);
        Self {
            title_len: title.chars().count(),
            steps_len: steps.chars().count(),
            title,
            steps,
        }
    }
}

fn length_bound(a: usize, b: usize) -> f64 {
    let longest = a.max(b);
    if longest == 0 {
        1.0
    } else {
        a.min(b) as f64 / longest as f64
    }
}

fn find_similar_groups(cases: &[TestCase], config: &DedupConfig) -> Vec<SimilarGroup> {
    let prepared = cases.iter().map(Comparable::new).collect::<Vec<_>>();
    let similarity = |i: usize, j: usize| -> Option<f64> {
        let (a, b) = (&prepared[i], &prepared[j]);
        // Edit distance can never beat the length ratio.
        let bound = config.title_weight * length_bound(a.title_len, b.title_len)
            + config.steps_weight * length_bound(a.steps_len, b.steps_len);
        if bound <= config.similarity_threshold {
            return None;
        }
        Some(
            config.title_weight * levenshtein_similarity(&a.title, &b.title)
                + config.steps_weight * levenshtein_similarity(&a.steps, &b.steps),
        )
    };

    let mut assigned = vec![false; cases.len()];
    let mut groups = Vec::new();
    let mut comparisons = 0usize;
    for anchor in 0..cases.len() {
        if assigned[anchor] {
            continue;
        }
        let mut members = vec![anchor];
        for candidate in anchor + 1..cases.len() {
            if assigned[candidate] {
                continue;
            }
            comparisons += 1;
            if similarity(anchor, candidate).is_some_and(|score| score > config.similarity_threshold)
            {
                members.push(candidate);
            }
        }
        if members.len() < 2 {
            continue;
        }
        for &idx in &members {
            assigned[idx] = true;
        }

        let pair_scores = members
            .iter()
            .tuple_combinations()
            .map(|(&i, &j)| {
                similarity(i, j).unwrap_or_else(|| {
                    case_similarity(&cases[i], &cases[j], config)
                })
            })
            .collect::<Vec<_>>();
        let similarity_score = pair_scores.iter().sum::<f64>() / pair_scores.len() as f64;
        let first = &cases[members[0]];
        let differences = members[1..]
            .iter()
            .flat_map(|&idx| describe_differences(first, &cases[idx]))
            .collect();

        groups.push(SimilarGroup {
            cases: members.iter().map(|&idx| cases[idx].clone()).collect(),
            similarity_score,
            differences,
        });
    }
    debug!(
        "Smart similarity: {} comparison(s) across {} case(s)",
        comparisons,
        cases.len()
    );
    groups
}

fn describe_differences(first: &TestCase, other: &TestCase) -> Vec<String> {
    let mut differences = Vec::new();
    if first.title.trim() != other.title.trim() {
        differences.push(format!(
            "{}: title '{}' vs '{}'",
            other.id, first.title, other.title
        ));
    }
    if first.priority != other.priority {
        differences.push(format!(
            "{}: priority {} vs {}",
            other.id, first.priority, other.priority
        ));
    }
    if normalize_text(&first.category) != normalize_text(&other.category) {
        differences.push(format!(
            "{}: category '{}' vs '{}'",
            other.id,
            display_or_none(&first.category),
            display_or_none(&other.category)
        ));
    }
    differences
}

fn display_or_none(value: &str) -> &str {
    if value.trim().is_empty() {
        "(none)"
    } else {
        value
    }
}

//! Assembly of mapped records into [`TestCase`] values.
//!
//! IDs follow `TC_IMPORT_{MODULE}_{NNN}`. The counter for a module prefix
//! starts above the highest suffix found in the caller's existing records,
//! so repeated imports into one collection never collide. The allocator
//! lives for a single import run.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::{
    mapping::MappedRecord,
    model::{DEFAULT_MODULE, DEFAULT_PROJECT, IMPORT_AUTHOR, Priority, Status, TestCase},
};

pub const ID_PREFIX: &str = "TC_IMPORT";
const MODULE_PREFIX_LEN: usize = 8;
const EMPTY_MODULE_PREFIX: &str = "GEN";
const COUNTER_WIDTH: usize = 3;

/// Upper-cased, alphanumeric-only, 8-char module token used inside IDs.
pub fn module_prefix(module: &str) -> String {
    let token = module
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MODULE_PREFIX_LEN)
        .collect::<String>()
        .to_ascii_uppercase();
    if token.is_empty() {
        EMPTY_MODULE_PREFIX.to_string()
    } else {
        token
    }
}

#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    highest: HashMap<String, u64>,
}

impl IdAllocator {
    pub fn from_existing(existing: &[TestCase]) -> Self {
        let mut allocator = Self::default();
        for case in existing {
            allocator.observe(&case.id);
        }
        allocator
    }

    /// Records `id` if it follows the import scheme.
    pub fn observe(&mut self, id: &str) {
        let Some(rest) = id
            .strip_prefix(ID_PREFIX)
            .and_then(|rest| rest.strip_prefix('_'))
        else {
            return;
        };
        let Some((module, counter)) = rest.rsplit_once('_') else {
            return;
        };
        if module.is_empty() {
            return;
        }
        if let Ok(value) = counter.parse::<u64>() {
            let entry = self.highest.entry(module.to_string()).or_insert(0);
            *entry = (*entry).max(value);
        }
    }

    pub fn next_id(&mut self, module: &str) -> String {
        let prefix = module_prefix(module);
        let counter = self.highest.entry(prefix.clone()).or_insert(0);
        if *counter == u64::MAX {
            warn!("ID counter for module {prefix} is exhausted; reusing the highest suffix");
        }
        *counter = counter.saturating_add(1);
        format!(
            "{ID_PREFIX}_{prefix}_{value:0width$}",
            value = *counter,
            width = COUNTER_WIDTH
        )
    }
}

#[derive(Debug, Clone)]
pub struct BuildContext {
    pub default_project: Option<String>,
    pub now: DateTime<Utc>,
}

impl BuildContext {
    pub fn new(default_project: Option<String>) -> Self {
        Self {
            default_project,
            now: Utc::now(),
        }
    }
}

pub fn build_test_case(
    record: MappedRecord,
    context: &BuildContext,
    ids: &mut IdAllocator,
) -> TestCase {
    let module = if record.module.trim().is_empty() {
        DEFAULT_MODULE.to_string()
    } else {
        record.module.trim().to_string()
    };
    let priority = record.priority.parse::<Priority>().unwrap_or_else(|_| {
        if !record.priority.is_empty() {
            debug!("Priority '{}' defaulted to medium", record.priority);
        }
        Priority::default()
    });
    let status = record.status.parse::<Status>().unwrap_or_default();
    let project_id = [
        Some(record.project.trim()),
        context.default_project.as_deref().map(str::trim),
    ]
    .into_iter()
    .flatten()
    .find(|value| !value.is_empty())
    .unwrap_or(DEFAULT_PROJECT)
    .to_string();

    TestCase {
        id: ids.next_id(&module),
        source_id: Some(record.source_id).filter(|id| !id.is_empty()),
        module,
        category: record.category,
        title: record.title,
        description: record.description,
        preconditions: record.preconditions,
        priority,
        status,
        tags: record.tags,
        test_steps: record.steps,
        test_data: record.test_data,
        expected_result: record.expected_result,
        test_result: record.test_result,
        automated: record.automated.eq_ignore_ascii_case("true"),
        qa: record.qa,
        remarks: record.remarks,
        project_id,
        created_at: context.now,
        updated_at: context.now,
        created_by: IMPORT_AUTHOR.to_string(),
    }
}

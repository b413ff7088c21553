//! Free-text step splitting.
//!
//! Turns a single "steps" cell into an ordered list of [`TestStep`] records.
//! Separators, ordinal/bullet markers and inline `Expected:` markers all come
//! from the preset's [`StepRules`]. The output is never empty.

use log::debug;

use crate::{model::TestStep, preset::StepRules};

/// Stands in for an inline expected-result marker while separators are split.
const EXPECTED_SENTINEL: char = '\u{1f}';

pub fn parse_steps(steps_text: &str, expected_text: &str, rules: &StepRules) -> Vec<TestStep> {
    let sentinel = EXPECTED_SENTINEL.to_string();
    let protected = rules
        .expected_marker
        .replace_all(steps_text, sentinel.as_str());
    let lines = split_segments(&protected, &rules.separators);
    let expected_lines = parse_expected_block(expected_text, rules);

    let mut steps: Vec<TestStep> = Vec::new();
    for line in lines {
        let mut parts = line.split(EXPECTED_SENTINEL);
        let description_part = parts.next().unwrap_or_default();
        let inline_expected = parts
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>();
        let description = strip_step_prefix(description_part, rules);

        if description.is_empty() {
            // "Expected: ..." on its own line belongs to the step before it.
            if let Some(previous) = steps.last_mut()
                && !inline_expected.is_empty()
            {
                append_expected(&mut previous.expected_result, &inline_expected.join(" "));
            }
            continue;
        }
        if description.chars().count() < rules.min_step_length {
            debug!("Discarding step fragment '{description}' below minimum length");
            continue;
        }
        if steps.len() >= rules.max_steps {
            debug!(
                "Step limit of {} reached; remaining lines ignored",
                rules.max_steps
            );
            break;
        }

        let index = steps.len();
        let expected_result = if inline_expected.is_empty() {
            expected_lines.get(index).cloned().unwrap_or_default()
        } else {
            inline_expected.join(" ")
        };
        steps.push(TestStep::new(
            (index + 1) as u32,
            description,
            expected_result,
        ));
    }

    if steps.is_empty() {
        steps.push(placeholder_step(rules));
    }
    steps
}

pub fn placeholder_step(rules: &StepRules) -> TestStep {
    TestStep::new(1, rules.default_step.clone(), String::new())
}

pub fn is_placeholder(steps: &[TestStep], rules: &StepRules) -> bool {
    matches!(steps, [only] if only.description == rules.default_step && only.expected_result.is_empty())
}

fn parse_expected_block(expected_text: &str, rules: &StepRules) -> Vec<String> {
    if expected_text.trim().is_empty() {
        return Vec::new();
    }
    let cleaned = rules.expected_marker.replace_all(expected_text, "\n");
    split_segments(&cleaned, &rules.separators)
        .into_iter()
        .map(|line| strip_step_prefix(&line, rules))
        .filter(|line| !line.is_empty())
        .collect()
}

fn split_segments(text: &str, separators: &[String]) -> Vec<String> {
    let mut normalized = text.to_string();
    for separator in separators {
        if separator != "\n" {
            normalized = normalized.replace(separator.as_str(), "\n");
        }
    }
    normalized
        .split('\n')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_step_prefix(line: &str, rules: &StepRules) -> String {
    let trimmed = line.trim();
    rules.step_prefix.replace(trimmed, "").trim().to_string()
}

fn append_expected(target: &mut String, addition: &str) {
    if target.is_empty() {
        target.push_str(addition);
    } else {
        target.push(' ');
        target.push_str(addition);
    }
}

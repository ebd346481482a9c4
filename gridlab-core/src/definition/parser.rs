//! Text format for strategy definitions.
//!
//! ```text
//! # comment
//! StockExecutions = fast, slow
//! EodExecutions = trader
//! fast.loadLine = Sma(n = [5i:20i:5i], Input(e = close))
//! slow.loadLine = Sma(n = 30i, Input(e = close))
//! trader.loadLine = CrossTrader(fast = fast, slow = slow, size = 10d)
//! ```
//!
//! Values: `5i` integer, `0.5d` real, bare word text, `[a:b:s]` range typed by
//! its suffixes, `[x|y|z]` discrete set. An argument of the form `Name(...)`
//! is a sub-invocation. Unsuffixed numbers are read as integer when they
//! parse as one, real otherwise. A repeated key keeps its last value.

use std::collections::{HashMap, HashSet};

use super::template::{ExecutionTemplate, InvocationTemplate, StrategyTemplate, TemplateValue};
use super::{ConfigError, ExecutionDefinition, ExecutionKind};
use crate::params::{AxisKind, ParamValue, ParameterAssignment};

const STOCK_KEY: &str = "StockExecutions";
const EOD_KEY: &str = "EodExecutions";
const LOAD_LINE_SUFFIX: &str = ".loadLine";

/// Parse a definition that may contain tunable values.
pub fn parse_template(text: &str) -> Result<StrategyTemplate, ConfigError> {
    let mut stock_names = Vec::new();
    let mut eod_names = Vec::new();
    let mut load_lines: HashMap<String, String> = HashMap::new();

    for (i, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let bad_line = || ConfigError::BadLine {
            line_no: i + 1,
            line: line.to_string(),
        };
        let (key, value) = line.split_once('=').ok_or_else(bad_line)?;
        let (key, value) = (key.trim(), value.trim());

        if key == STOCK_KEY {
            stock_names = name_list(value);
        } else if key == EOD_KEY {
            eod_names = name_list(value);
        } else if let Some(name) = key.strip_suffix(LOAD_LINE_SUFFIX) {
            if !is_identifier(name) {
                return Err(bad_line());
            }
            load_lines.insert(name.to_string(), value.to_string());
        } else {
            return Err(bad_line());
        }
    }

    let mut seen = HashSet::new();
    for name in stock_names.iter().chain(&eod_names) {
        if !seen.insert(name.as_str()) {
            return Err(ConfigError::DuplicateExecution { name: name.clone() });
        }
    }

    let build = |names: &[String], kind: ExecutionKind| -> Result<Vec<ExecutionTemplate>, ConfigError> {
        names
            .iter()
            .map(|name| -> Result<ExecutionTemplate, ConfigError> {
                let line = load_lines.get(name).ok_or_else(|| ConfigError::MissingLoadLine {
                    kind,
                    name: name.clone(),
                })?;
                let invocation = parse_invocation(line).ok_or_else(|| ConfigError::BadLoadLine {
                    line: line.clone(),
                })?;
                Ok(ExecutionTemplate::new(name.clone(), invocation))
            })
            .collect()
    };

    Ok(StrategyTemplate {
        stock_executions: build(&stock_names, ExecutionKind::Stock)?,
        eod_executions: build(&eod_names, ExecutionKind::Eod)?,
    })
}

/// Parse a fully concrete definition. Any tunable value is an error.
pub fn parse_definition(text: &str) -> Result<ExecutionDefinition, ConfigError> {
    parse_template(text)?.resolve(&ParameterAssignment::new())
}

fn name_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ─── Load lines ──────────────────────────────────────────────────────

/// `Name(arg, ...)` where each arg is `key = value` or a nested invocation.
fn parse_invocation(text: &str) -> Option<InvocationTemplate> {
    let text = text.trim();
    let open = text.find('(')?;
    let name = text[..open].trim();
    if !is_identifier(name) || !text.ends_with(')') {
        return None;
    }

    let mut node = InvocationTemplate::new(name);
    for arg in split_arguments(&text[open + 1..text.len() - 1])? {
        match assignment_split(arg) {
            Some((key, value)) => {
                if !is_identifier(key) {
                    return None;
                }
                node.params.push((key.to_string(), parse_value(value)?));
            }
            None => node.children.push(parse_invocation(arg)?),
        }
    }
    Some(node)
}

/// Split on commas outside brackets. `None` when brackets do not balance.
fn split_arguments(inner: &str) -> Option<Vec<&str>> {
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }

    let mut open: Vec<char> = Vec::new();
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '(' | '[' => open.push(c),
            ')' => {
                if open.pop() != Some('(') {
                    return None;
                }
            }
            ']' => {
                if open.pop() != Some('[') {
                    return None;
                }
            }
            ',' if open.is_empty() => {
                parts.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if !open.is_empty() {
        return None;
    }
    parts.push(&inner[start..]);

    if parts.iter().any(|p| p.trim().is_empty()) {
        return None;
    }
    Some(parts)
}

/// `key = value` unless the `=` sits inside a nested invocation.
fn assignment_split(arg: &str) -> Option<(&str, &str)> {
    let eq = arg.find('=')?;
    if arg[..eq].contains(['(', '[']) {
        return None;
    }
    Some((arg[..eq].trim(), arg[eq + 1..].trim()))
}

fn parse_value(text: &str) -> Option<TemplateValue> {
    let text = text.trim();
    if let Some(body) = text.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
        return parse_tunable(body).map(TemplateValue::Tunable);
    }
    parse_scalar(text).map(TemplateValue::Fixed)
}

fn parse_tunable(body: &str) -> Option<AxisKind> {
    if body.contains(':') {
        let parts: Vec<ParamValue> = body.split(':').map(parse_scalar).collect::<Option<_>>()?;
        let [from, to, step] = parts.as_slice() else {
            return None;
        };
        return match (from, to, step) {
            (ParamValue::Integer(from), ParamValue::Integer(to), ParamValue::Integer(step)) => {
                Some(AxisKind::IntegerRange {
                    from: *from,
                    to: *to,
                    step: *step,
                })
            }
            _ => Some(AxisKind::RealRange {
                from: from.as_f64()?,
                to: to.as_f64()?,
                step: step.as_f64()?,
            }),
        };
    }

    let values = body.split('|').map(parse_scalar).collect::<Option<Vec<_>>>()?;
    Some(AxisKind::DiscreteSet { values })
}

fn parse_scalar(text: &str) -> Option<ParamValue> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let numeric = text.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
    if numeric {
        if let Some(v) = text.strip_suffix('i').and_then(|n| n.parse::<i64>().ok()) {
            return Some(ParamValue::Integer(v));
        }
        if let Some(v) = text.strip_suffix('d').and_then(|n| n.parse::<f64>().ok()) {
            return Some(ParamValue::Real(v));
        }
        if let Ok(v) = text.parse::<i64>() {
            return Some(ParamValue::Integer(v));
        }
        return text.parse::<f64>().ok().map(ParamValue::Real);
    }

    let word = text
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    word.then(|| ParamValue::Text(text.to_string()))
}

// ─── Tests ───────────────────────────────────────────────────────────

//! Parse checks and static call summaries for behavior bodies.
//!
//! Bodies are stored as bare Lua chunks; the script host wraps them in a
//! function before loading, so a body that parses as a chunk here also loads
//! at run time.

use std::collections::BTreeSet;

use anyhow::{anyhow, Result};
use full_moon::{
    ast::{self, Assignment, Call, FunctionCall, Index, Prefix, Suffix, Var},
    parse,
    visitors::Visitor,
};
use serde::Serialize;

/// What a body touches, gathered without running it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BodySummary {
    /// Global functions called, in first-use order.
    pub calls: Vec<String>,
    /// Fields written through `self.<field> = ...`.
    pub writes: BTreeSet<String>,
}

impl BodySummary {
    pub fn calls_any(&self, names: &[&str]) -> bool {
        self.calls.iter().any(|call| names.contains(&call.as_str()))
    }
}

/// Returns an error naming the first parse failure if `body` is not a valid chunk.
pub fn validate_body(body: &str) -> Result<()> {
    parse(body).map(|_| ()).map_err(|error| anyhow!("{error}"))
}

pub fn summarize_body(body: &str) -> Result<BodySummary> {
    let ast = parse(body).map_err(|error| anyhow!("{error}"))?;
    Ok(summarize_ast(&ast))
}

fn summarize_ast(ast: &ast::Ast) -> BodySummary {
    let mut collector = SummaryCollector::default();
    collector.visit_ast(ast);
    collector.summary
}

#[derive(Default)]
struct SummaryCollector {
    summary: BodySummary,
}

impl Visitor for SummaryCollector {
    fn visit_function_call(&mut self, call: &FunctionCall) {
        if let Some(name) = global_call_name(call) {
            push_unique(&mut self.summary.calls, name);
        }
    }

    fn visit_assignment(&mut self, assign: &Assignment) {
        for var in assign.variables().iter() {
            if let Some(field) = self_field(var) {
                self.summary.writes.insert(field);
            }
        }
    }
}

fn global_call_name(call: &FunctionCall) -> Option<String> {
    let Prefix::Name(name) = call.prefix() else {
        return None;
    };
    match call.suffixes().next() {
        Some(Suffix::Call(Call::AnonymousCall(_))) => Some(name.token().to_string()),
        _ => None,
    }
}

fn self_field(var: &Var) -> Option<String> {
    let Var::Expression(expr) = var else {
        return None;
    };
    match expr.prefix() {
        Prefix::Name(name) if name.token().to_string() == "self" => {}
        _ => return None,
    }
    let mut suffixes = expr.suffixes();
    let suffix = suffixes.next()?;
    if suffixes.next().is_some() {
        return None;
    }
    match suffix {
        Suffix::Index(Index::Dot { name, .. }) => Some(name.token().to_string()),
        _ => None,
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.iter().any(|existing| existing == &value) {
        list.push(value);
    }
}

//! Type definitions of a low-level SQL string representation.

use std::collections::BTreeMap;

use super::ast::TableAlias;
use super::dialect::Dialect;

/// SQL text under construction.
///
/// Tracks the nesting depth for indentation and the display name of every alias seen so far,
/// so the same tree always renders to the same text.
pub struct SQL<'a> {
    pub sql: String,
    dialect: &'a dyn Dialect,
    alias_names: BTreeMap<TableAlias, String>,
    depth: usize,
}

impl<'a> SQL<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> SQL<'a> {
        SQL {
            sql: String::new(),
            dialect,
            alias_names: BTreeMap::new(),
            depth: 0,
        }
    }

    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    pub fn append_syntax(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    pub fn append_identifier(&mut self, identifier: &str) {
        let quoted = self.dialect.quote_identifier(identifier);
        self.sql.push_str(&quoted);
    }

    /// Aliases are named `t0`, `t1`, ... in order of first appearance.
    pub fn append_alias(&mut self, alias: TableAlias) {
        let next_index = self.alias_names.len();
        let name = self
            .alias_names
            .entry(alias)
            .or_insert_with(|| format!("t{next_index}"));
        self.sql.push_str(name);
    }

    pub fn append_param(&mut self, name: &str) {
        let placeholder = self.dialect.parameter_placeholder(name);
        self.sql.push_str(&placeholder);
    }

    /// Start a new line at the current depth.
    pub fn new_line(&mut self) {
        self.sql.push('\n');
        for _ in 0..self.depth {
            self.sql.push_str("  ");
        }
    }

    pub fn indent(&mut self) {
        self.depth += 1;
    }

    pub fn outdent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

//! Helpers for processing an operator chain and building SQL.

use std::collections::BTreeMap;
use std::rc::Rc;

use query_engine_metadata::metadata;
use query_engine_sql::sql;
use query_engine_sql::sql::dialect::Dialect;

use super::chain;
use super::error::Error;

/// Static information from the metadata and the target dialect.
pub struct Env<'a> {
    metadata: &'a metadata::Metadata,
    dialect: &'a dyn Dialect,
}

impl<'a> Env<'a> {
    /// Create a new Env by supplying the metadata and the dialect.
    pub fn new(metadata: &'a metadata::Metadata, dialect: &'a dyn Dialect) -> Env<'a> {
        Env { metadata, dialect }
    }

    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    /// Lookup the table an entity is stored in.
    pub fn lookup_table(&self, entity: &str) -> Result<&'a metadata::TableInfo, Error> {
        self.metadata
            .tables
            .0
            .get(entity)
            .ok_or_else(|| Error::CollectionNotFound(entity.to_string()))
    }
}

/// Ties aggregates over a group's elements back to the select that computed the group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupByDescriptor {
    /// The alias of the select carrying the GROUP BY clause.
    pub alias: sql::ast::TableAlias,
    /// One element of the group, in terms of the grouped source.
    pub element: sql::ast::Expression,
}

/// An ordering key waiting for the primary ordering it refines.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOrdering {
    pub key: chain::Lambda,
    pub descending: bool,
}

/// Mutable state threaded through the translation of one chain.
#[derive(Debug, Default)]
pub struct State {
    then_by: Vec<PendingOrdering>,
    /// Keyed by the alias of each group's element select.
    group_descriptors: BTreeMap<sql::ast::TableAlias, GroupByDescriptor>,
    current_group_element: Option<sql::ast::TableAlias>,
}

impl State {
    pub fn new() -> State {
        State::default()
    }

    /// Queue a secondary ordering key. The most recent key is queued last.
    pub fn push_then_by(&mut self, pending: PendingOrdering) {
        self.then_by.push(pending);
    }

    /// Drain the queued secondary keys, in the order they appear in the chain.
    pub fn take_then_by(&mut self) -> Vec<PendingOrdering> {
        let mut pending = std::mem::take(&mut self.then_by);
        pending.reverse();
        pending
    }

    pub fn register_group(
        &mut self,
        element_select: sql::ast::TableAlias,
        descriptor: GroupByDescriptor,
    ) -> Result<(), Error> {
        if self.group_descriptors.contains_key(&element_select) {
            return Err(Error::InvariantViolation(format!(
                "group element select {} registered twice",
                element_select.unique_index()
            )));
        }
        self.group_descriptors.insert(element_select, descriptor);
        Ok(())
    }

    pub fn lookup_group(
        &self,
        element_select: sql::ast::TableAlias,
    ) -> Option<&GroupByDescriptor> {
        self.group_descriptors.get(&element_select)
    }

    pub fn current_group_element(&self) -> Option<sql::ast::TableAlias> {
        self.current_group_element
    }

    /// Set the current group element, returning the previous one so it can be restored.
    pub fn replace_current_group_element(
        &mut self,
        element_select: Option<sql::ast::TableAlias>,
    ) -> Option<sql::ast::TableAlias> {
        std::mem::replace(&mut self.current_group_element, element_select)
    }
}

/// An immutable, scope-chained mapping from lambda parameters to what they stand for.
///
/// Binding a name returns a new scope; the old one is unchanged, so a nested lambda reusing a
/// parameter name shadows the outer binding only while its body is translated.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    head: Option<Rc<Binding>>,
}

#[derive(Debug)]
struct Binding {
    name: String,
    value: sql::ast::Expression,
    parent: Option<Rc<Binding>>,
}

impl Scope {
    pub fn empty() -> Scope {
        Scope::default()
    }

    pub fn bind(&self, name: &str, value: sql::ast::Expression) -> Scope {
        Scope {
            head: Some(Rc::new(Binding {
                name: name.to_string(),
                value,
                parent: self.head.clone(),
            })),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&sql::ast::Expression> {
        let mut current = self.head.as_deref();
        while let Some(binding) = current {
            if binding.name == name {
                return Some(&binding.value);
            }
            current = binding.parent.as_deref();
        }
        None
    }
}

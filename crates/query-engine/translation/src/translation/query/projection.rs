//! Turn row shapes into select lists.
//!
//! A projector describes one output item in terms of the columns of some source. To select it
//! from a new select, every scalar piece of the projector becomes a column of the new select and
//! the projector is rewritten to read those columns instead.

use query_engine_metadata::metadata::ScalarType;
use query_engine_sql::sql;
use query_engine_sql::sql::ast::{
    ColumnDeclaration, Expression, From, OrderByElement, Projection, Select, TableAlias,
};

/// The select list and rewritten projector produced by `project_columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedColumns {
    pub columns: Vec<ColumnDeclaration>,
    pub projector: Expression,
}

/// Project `projector`, written over the `existing` aliases, into columns of a select aliased
/// `new_alias`.
///
/// Scalar parts of the projector become columns, deduplicated by expression. Nested
/// projections stay shapes, but any reference they make to an `existing` alias is routed
/// through a column of the new select, so they stay correlated once the new select is wrapped.
pub fn project_columns(
    projector: Expression,
    new_alias: TableAlias,
    existing: &[TableAlias],
) -> ProjectedColumns {
    let mut column_projector = ColumnProjector {
        alias: new_alias,
        existing,
        columns: vec![],
    };
    let projector = column_projector.project(projector, None);
    ProjectedColumns {
        columns: column_projector.columns,
        projector,
    }
}

/// Wrap a projection in a fresh select re-projecting the same row shape.
pub fn wrap(projection: Projection) -> Projection {
    let projector = projection.projector.clone();
    reproject(projection, projector)
}

/// Select `projector`, written over the row shape of `source`, from a fresh select wrapping it.
pub fn reproject(source: Projection, projector: Expression) -> Projection {
    let alias = TableAlias::new();
    let ProjectedColumns { columns, projector } =
        project_columns(projector, alias, &[source.select.alias]);
    let (from, order_by) = into_source(source.select);
    let mut select = sql::helpers::select_from(alias, columns, from);
    select.order_by = order_by;
    Projection {
        select,
        projector,
        aggregator: None,
    }
}

/// A select producing exactly the single scalar column `projection` projects, for use as a
/// scalar subquery or an `IN (SELECT ..)` list.
pub fn single_column_select(projection: Projection) -> Select {
    let Projection {
        select, projector, ..
    } = projection;
    let reads_single_column = select.columns.len() == 1
        && matches!(
            &projector,
            Expression::Column(column)
                if column.table == select.alias && column.name == select.columns[0].name
        );
    if reads_single_column {
        return select;
    }
    let alias = TableAlias::new();
    let (from, _) = into_source(select);
    sql::helpers::select_from(
        alias,
        vec![sql::helpers::make_column_declaration("", projector)],
        from,
    )
}

/// Turn `select` into the FROM source of a wrapping select, lifting its ordering out.
///
/// The returned ordering reads columns of `select`, which gains columns where needed. A select
/// that pages keeps its own ordering too, as the page depends on it. Distinct and grouped selects
/// cannot gain columns, so only ordering terms they already select are lifted.
pub fn into_source(mut select: Select) -> (From, Vec<OrderByElement>) {
    let can_add_columns = !select.is_distinct && select.group_by.is_empty();
    let mut lifted = vec![];
    for element in select.ordering() {
        let already_selected = select
            .columns
            .iter()
            .find(|column| column.expression == element.target)
            .map(|column| column.name.0.clone());
        let name = match already_selected {
            Some(name) => name,
            None if can_add_columns => {
                declare_column(&mut select.columns, element.target.clone(), None)
            }
            None => continue,
        };
        let r#type = element.target.scalar_type().unwrap_or(ScalarType::Any);
        lifted.push(OrderByElement {
            target: sql::helpers::make_column(select.alias, &name, r#type),
            direction: element.direction,
        });
    }
    if select.skip.is_none() && select.take.is_none() {
        select.order_by.clear();
        select.is_reverse = false;
    }
    (From::Select(Box::new(select)), lifted)
}

/// Add `expression` to `columns` unless it is already selected, returning its column name.
pub fn declare_column(
    columns: &mut Vec<ColumnDeclaration>,
    expression: Expression,
    suggestion: Option<&str>,
) -> String {
    if let Some(column) = columns.iter().find(|column| column.expression == expression) {
        return column.name.0.clone();
    }
    let base = suggestion
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| match &expression {
            Expression::Column(column) => Some(column.name.0.clone()),
            _ => None,
        });
    let name = unique_column_name(columns, base);
    columns.push(sql::helpers::make_column_declaration(&name, expression));
    name
}

fn unique_column_name(columns: &[ColumnDeclaration], base: Option<String>) -> String {
    let taken = |name: &str| columns.iter().any(|column| column.name.0 == name);
    match base {
        Some(base) if !taken(&base) => base,
        Some(base) => (1..)
            .map(|suffix| format!("{base}{suffix}"))
            .find(|name| !taken(name))
            .unwrap_or_default(),
        None => (0..)
            .map(|index| format!("c{index}"))
            .find(|name| !taken(name))
            .unwrap_or_default(),
    }
}

struct ColumnProjector<'a> {
    alias: TableAlias,
    existing: &'a [TableAlias],
    columns: Vec<ColumnDeclaration>,
}

impl ColumnProjector<'_> {
    fn project(&mut self, expression: Expression, suggestion: Option<&str>) -> Expression {
        match expression {
            Expression::Record(record) => Expression::Record(sql::ast::Record {
                type_name: record.type_name,
                fields: record
                    .fields
                    .into_iter()
                    .map(|(name, field)| {
                        let field = self.project(field, Some(&name));
                        (name, field)
                    })
                    .collect(),
            }),
            Expression::Grouping { key, elements } => Expression::Grouping {
                key: Box::new(self.project(*key, Some("Key"))),
                elements: Box::new(self.remap_projection(*elements)),
            },
            Expression::Projection(projection) => {
                Expression::Projection(Box::new(self.remap_projection(*projection)))
            }
            scalar => self.declare(scalar, suggestion),
        }
    }

    fn declare(&mut self, expression: Expression, suggestion: Option<&str>) -> Expression {
        let r#type = expression.scalar_type().unwrap_or(ScalarType::Any);
        let name = declare_column(&mut self.columns, expression, suggestion);
        sql::helpers::make_column(self.alias, &name, r#type)
    }

    fn remap_projection(&mut self, mut projection: Projection) -> Projection {
        self.remap_select(&mut projection.select);
        self.remap_expression(&mut projection.projector);
        projection
    }

    /// Does `expression` read columns, all of them from existing aliases? Predicates stay in
    /// place so that only values are ever selected.
    fn is_closed_over_existing(&self, expression: &Expression) -> bool {
        if expression.is_shape() || expression.is_predicate() {
            return false;
        }
        let mut tables = vec![];
        collect_tables(expression, &mut tables);
        !tables.is_empty()
            && tables.iter().all(|table| self.existing.contains(table))
    }

    fn remap_expression(&mut self, expression: &mut Expression) {
        if self.is_closed_over_existing(expression) {
            let taken = std::mem::replace(expression, sql::helpers::null_expr());
            *expression = self.declare(taken, None);
            return;
        }
        match expression {
            Expression::Column(_)
            | Expression::Value { .. }
            | Expression::External(_)
            | Expression::NamedValue(_) => {}
            Expression::And { left, right }
            | Expression::Or { left, right }
            | Expression::BinaryOperation { left, right, .. } => {
                self.remap_expression(left);
                self.remap_expression(right);
            }
            Expression::Not(inner)
            | Expression::UnaryOperation {
                expression: inner, ..
            }
            | Expression::Cast {
                expression: inner, ..
            } => self.remap_expression(inner),
            Expression::Conditional {
                condition,
                then,
                otherwise,
            } => {
                self.remap_expression(condition);
                self.remap_expression(then);
                self.remap_expression(otherwise);
            }
            Expression::FunctionCall { args, .. } => {
                for arg in args {
                    self.remap_expression(arg);
                }
            }
            Expression::Aggregate(aggregate) => {
                if let Some(argument) = &mut aggregate.argument {
                    self.remap_expression(argument);
                }
            }
            Expression::ScalarSubquery { select, .. } | Expression::Exists { select } => {
                self.remap_select(select);
            }
            Expression::In { expression, values } => {
                self.remap_expression(expression);
                for value in values {
                    self.remap_expression(value);
                }
            }
            Expression::InSelect { expression, select } => {
                self.remap_expression(expression);
                self.remap_select(select);
            }
            Expression::Record(record) => {
                for (_, field) in &mut record.fields {
                    self.remap_expression(field);
                }
            }
            Expression::Grouping { key, elements } => {
                self.remap_expression(key);
                self.remap_select(&mut elements.select);
                self.remap_expression(&mut elements.projector);
            }
            Expression::Projection(projection) => {
                self.remap_select(&mut projection.select);
                self.remap_expression(&mut projection.projector);
            }
        }
    }

    fn remap_select(&mut self, select: &mut Select) {
        for column in &mut select.columns {
            self.remap_expression(&mut column.expression);
        }
        if let Some(from) = &mut select.from {
            self.remap_from(from);
        }
        if let Some(predicate) = &mut select.where_ {
            self.remap_expression(predicate);
        }
        for element in &mut select.order_by {
            self.remap_expression(&mut element.target);
        }
        for key in &mut select.group_by {
            self.remap_expression(key);
        }
        if let Some(skip) = &mut select.skip {
            self.remap_expression(skip);
        }
        if let Some(take) = &mut select.take {
            self.remap_expression(take);
        }
    }

    fn remap_from(&mut self, from: &mut From) {
        match from {
            From::Table { .. } => {}
            From::Select(select) => self.remap_select(select),
            From::Join(join) => {
                self.remap_from(&mut join.left);
                self.remap_from(&mut join.right);
                if let Some(condition) = &mut join.condition {
                    self.remap_expression(condition);
                }
            }
        }
    }
}

/// Collect the alias of every column `expression` reads, looking inside subqueries too.
pub fn collect_tables(expression: &Expression, tables: &mut Vec<TableAlias>) {
    match expression {
        Expression::Column(column) => tables.push(column.table),
        Expression::Value { .. } | Expression::External(_) | Expression::NamedValue(_) => {}
        Expression::And { left, right }
        | Expression::Or { left, right }
        | Expression::BinaryOperation { left, right, .. } => {
            collect_tables(left, tables);
            collect_tables(right, tables);
        }
        Expression::Not(inner)
        | Expression::UnaryOperation {
            expression: inner, ..
        }
        | Expression::Cast {
            expression: inner, ..
        } => collect_tables(inner, tables),
        Expression::Conditional {
            condition,
            then,
            otherwise,
        } => {
            collect_tables(condition, tables);
            collect_tables(then, tables);
            collect_tables(otherwise, tables);
        }
        Expression::FunctionCall { args, .. } => {
            for arg in args {
                collect_tables(arg, tables);
            }
        }
        Expression::Aggregate(aggregate) => {
            if let Some(argument) = &aggregate.argument {
                collect_tables(argument, tables);
            }
        }
        Expression::ScalarSubquery { select, .. } | Expression::Exists { select } => {
            collect_select_tables(select, tables);
        }
        Expression::In { expression, values } => {
            collect_tables(expression, tables);
            for value in values {
                collect_tables(value, tables);
            }
        }
        Expression::InSelect { expression, select } => {
            collect_tables(expression, tables);
            collect_select_tables(select, tables);
        }
        Expression::Record(record) => {
            for (_, field) in &record.fields {
                collect_tables(field, tables);
            }
        }
        Expression::Grouping { key, elements } => {
            collect_tables(key, tables);
            collect_select_tables(&elements.select, tables);
            collect_tables(&elements.projector, tables);
        }
        Expression::Projection(projection) => {
            collect_select_tables(&projection.select, tables);
            collect_tables(&projection.projector, tables);
        }
    }
}

fn collect_select_tables(select: &Select, tables: &mut Vec<TableAlias>) {
    for column in &select.columns {
        collect_tables(&column.expression, tables);
    }
    if let Some(from) = &select.from {
        collect_from_tables(from, tables);
    }
    if let Some(predicate) = &select.where_ {
        collect_tables(predicate, tables);
    }
    for element in &select.order_by {
        collect_tables(&element.target, tables);
    }
    for key in &select.group_by {
        collect_tables(key, tables);
    }
}

fn collect_from_tables(from: &From, tables: &mut Vec<TableAlias>) {
    match from {
        From::Table { .. } => {}
        From::Select(select) => collect_select_tables(select, tables),
        From::Join(join) => {
            collect_from_tables(&join.left, tables);
            collect_from_tables(&join.right, tables);
            if let Some(condition) = &join.condition {
                collect_tables(condition, tables);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_engine_sql::sql::ast::Record;
    use query_engine_sql::sql::helpers;

    #[test]
    fn record_fields_name_their_columns() {
        let source = TableAlias::new();
        let target = TableAlias::new();
        let projector = Expression::Record(Record {
            type_name: Some("Person".to_string()),
            fields: vec![
                (
                    "Age".to_string(),
                    helpers::make_column(source, "age", ScalarType::Integer),
                ),
                (
                    "Next".to_string(),
                    helpers::binary(
                        helpers::make_column(source, "age", ScalarType::Integer),
                        sql::ast::BinaryOperator::Add,
                        helpers::int_expr(1),
                    ),
                ),
            ],
        });
        let projected = project_columns(projector, target, &[source]);
        let names: Vec<_> = projected
            .columns
            .iter()
            .map(|column| column.name.0.as_str())
            .collect();
        assert_eq!(names, vec!["Age", "Next"]);
        assert_eq!(
            projected.projector,
            Expression::Record(Record {
                type_name: Some("Person".to_string()),
                fields: vec![
                    (
                        "Age".to_string(),
                        helpers::make_column(target, "Age", ScalarType::Integer)
                    ),
                    (
                        "Next".to_string(),
                        helpers::make_column(target, "Next", ScalarType::Integer)
                    ),
                ],
            })
        );
    }

    #[test]
    fn repeated_expressions_share_a_column() {
        let source = TableAlias::new();
        let age = helpers::make_column(source, "age", ScalarType::Integer);
        let projector = Expression::Record(Record {
            type_name: None,
            fields: vec![("a".to_string(), age.clone()), ("b".to_string(), age)],
        });
        let projected = project_columns(projector, TableAlias::new(), &[source]);
        assert_eq!(projected.columns.len(), 1);
    }

    #[test]
    fn nested_projections_are_correlated_through_new_columns() {
        let outer = TableAlias::new();
        let inner_table = TableAlias::new();
        let target = TableAlias::new();
        let mut nested_select = helpers::simple_select(
            TableAlias::new(),
            vec![helpers::make_column_declaration(
                "id",
                helpers::make_column(inner_table, "id", ScalarType::Integer),
            )],
        );
        nested_select.where_ = Some(helpers::equals(
            helpers::make_column(inner_table, "owner", ScalarType::Integer),
            helpers::make_column(outer, "id", ScalarType::Integer),
        ));
        let nested_alias = nested_select.alias;
        let projector = Expression::Projection(Box::new(Projection {
            select: nested_select,
            projector: helpers::make_column(nested_alias, "id", ScalarType::Integer),
            aggregator: None,
        }));

        let projected = project_columns(projector, target, &[outer]);

        assert_eq!(
            projected.columns,
            vec![helpers::make_column_declaration(
                "id",
                helpers::make_column(outer, "id", ScalarType::Integer)
            )]
        );
        let Expression::Projection(nested) = projected.projector else {
            panic!("expected a nested projection");
        };
        assert_eq!(
            nested.select.where_,
            Some(helpers::equals(
                helpers::make_column(inner_table, "owner", ScalarType::Integer),
                helpers::make_column(target, "id", ScalarType::Integer),
            ))
        );
    }

    #[test]
    fn ordering_is_lifted_and_dropped_unless_paging() {
        let table = TableAlias::new();
        let mut select = helpers::simple_select(
            TableAlias::new(),
            vec![helpers::make_column_declaration(
                "Age",
                helpers::make_column(table, "age", ScalarType::Integer),
            )],
        );
        select.order_by = vec![
            OrderByElement {
                target: helpers::make_column(table, "age", ScalarType::Integer),
                direction: sql::ast::OrderByDirection::Asc,
            },
            OrderByElement {
                target: helpers::make_column(table, "id", ScalarType::Integer),
                direction: sql::ast::OrderByDirection::Desc,
            },
        ];
        let alias = select.alias;

        let (from, lifted) = into_source(select.clone());
        let From::Select(inner) = from else {
            panic!("expected a subquery");
        };
        assert!(inner.order_by.is_empty());
        assert_eq!(inner.columns.len(), 2);
        assert_eq!(
            lifted,
            vec![
                OrderByElement {
                    target: helpers::make_column(alias, "Age", ScalarType::Integer),
                    direction: sql::ast::OrderByDirection::Asc,
                },
                OrderByElement {
                    target: helpers::make_column(alias, "id", ScalarType::Integer),
                    direction: sql::ast::OrderByDirection::Desc,
                },
            ]
        );

        select.take = Some(helpers::int_expr(3));
        let (from, _) = into_source(select);
        let From::Select(inner) = from else {
            panic!("expected a subquery");
        };
        assert_eq!(inner.order_by.len(), 2);
    }
}

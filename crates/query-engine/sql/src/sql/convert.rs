//! Convert a SQL AST to a low-level SQL string.

use thiserror::Error;

use super::ast::*;
use super::dialect::{Dialect, PagingStyle};
use super::string::SQL;

/// A node that has no SQL rendering reached the formatter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("cannot convert a {0} node to SQL")]
    UnsupportedNode(&'static str),
}

/// Render a select to SQL text.
pub fn select_to_sql(select: &Select, dialect: &dyn Dialect) -> Result<String, Error> {
    let mut sql = SQL::new(dialect);
    select.to_sql(&mut sql)?;
    Ok(sql.sql)
}

// Convert to SQL strings

impl Select {
    pub fn to_sql(&self, sql: &mut SQL) -> Result<(), Error> {
        let paging_style = sql.dialect().paging_style();

        sql.append_syntax("SELECT ");
        if self.is_distinct {
            sql.append_syntax("DISTINCT ");
        }
        if paging_style == PagingStyle::Top && self.skip.is_none() {
            if let Some(take) = &self.take {
                sql.append_syntax("TOP (");
                take.to_sql(sql)?;
                sql.append_syntax(") ");
            }
        }

        if self.columns.is_empty() {
            sql.append_syntax("1");
        }
        for (index, column) in self.columns.iter().enumerate() {
            if index > 0 {
                sql.append_syntax(", ");
            }
            column.to_sql(sql)?;
        }

        if let Some(from) = &self.from {
            sql.new_line();
            sql.append_syntax("FROM ");
            from.to_sql(sql)?;
        }

        if let Some(predicate) = &self.where_ {
            sql.new_line();
            sql.append_syntax("WHERE ");
            predicate.to_sql_predicate(sql)?;
        }

        if !self.group_by.is_empty() {
            sql.new_line();
            sql.append_syntax("GROUP BY ");
            for (index, key) in self.group_by.iter().enumerate() {
                if index > 0 {
                    sql.append_syntax(", ");
                }
                key.to_sql(sql)?;
            }
        }

        let pages_with_offset = match paging_style {
            PagingStyle::LimitOffset => false,
            PagingStyle::Top => self.skip.is_some(),
            PagingStyle::OffsetFetch => self.skip.is_some() || self.take.is_some(),
        };

        let ordering = self.ordering();
        if !ordering.is_empty() {
            sql.new_line();
            sql.append_syntax("ORDER BY ");
            for (index, element) in ordering.iter().enumerate() {
                if index > 0 {
                    sql.append_syntax(", ");
                }
                element.to_sql(sql)?;
            }
        } else if pages_with_offset {
            // OFFSET .. FETCH is only valid after an ORDER BY.
            sql.new_line();
            sql.append_syntax("ORDER BY (SELECT NULL)");
        }

        if pages_with_offset {
            sql.new_line();
            sql.append_syntax("OFFSET ");
            match &self.skip {
                Some(skip) => skip.to_sql(sql)?,
                None => sql.append_syntax("0"),
            }
            sql.append_syntax(" ROWS");
            if let Some(take) = &self.take {
                sql.append_syntax(" FETCH NEXT ");
                take.to_sql(sql)?;
                sql.append_syntax(" ROWS ONLY");
            }
        } else if paging_style == PagingStyle::LimitOffset {
            if let Some(take) = &self.take {
                sql.new_line();
                sql.append_syntax("LIMIT ");
                take.to_sql(sql)?;
            }
            if let Some(skip) = &self.skip {
                sql.new_line();
                sql.append_syntax("OFFSET ");
                skip.to_sql(sql)?;
            }
        }
        Ok(())
    }
}

impl ColumnDeclaration {
    pub fn to_sql(&self, sql: &mut SQL) -> Result<(), Error> {
        self.expression.to_sql(sql)?;
        let ColumnName(name) = &self.name;
        let named_after_itself = matches!(
            &self.expression,
            Expression::Column(ColumnReference { name: ColumnName(column), .. }) if column == name
        );
        if !name.is_empty() && !named_after_itself {
            sql.append_syntax(" AS ");
            sql.append_identifier(name);
        }
        Ok(())
    }
}

impl From {
    pub fn to_sql(&self, sql: &mut SQL) -> Result<(), Error> {
        match self {
            From::Table { reference, alias } => {
                reference.to_sql(sql);
                sql.append_syntax(" AS ");
                sql.append_alias(*alias);
            }
            From::Select(select) => {
                nested_select_to_sql(select, sql)?;
                sql.append_syntax(" AS ");
                sql.append_alias(select.alias);
            }
            From::Join(join) => join.to_sql(sql)?,
        }
        Ok(())
    }
}

impl Join {
    pub fn to_sql(&self, sql: &mut SQL) -> Result<(), Error> {
        let supports_apply = sql.dialect().supports_apply();
        self.left.to_sql(sql)?;
        sql.new_line();
        let needs_condition = match (self.kind, supports_apply) {
            (JoinType::CrossJoin, _) => {
                sql.append_syntax("CROSS JOIN ");
                false
            }
            (JoinType::InnerJoin, _) => {
                sql.append_syntax("INNER JOIN ");
                true
            }
            (JoinType::LeftOuterJoin, _) => {
                sql.append_syntax("LEFT OUTER JOIN ");
                true
            }
            (JoinType::CrossApply, true) => {
                sql.append_syntax("CROSS APPLY ");
                false
            }
            (JoinType::OuterApply, true) => {
                sql.append_syntax("OUTER APPLY ");
                false
            }
            (JoinType::CrossApply, false) => {
                sql.append_syntax("CROSS JOIN LATERAL ");
                false
            }
            (JoinType::OuterApply, false) => {
                sql.append_syntax("LEFT OUTER JOIN LATERAL ");
                true
            }
        };

        if let From::Join(_) = self.right {
            sql.append_syntax("(");
            self.right.to_sql(sql)?;
            sql.append_syntax(")");
        } else {
            self.right.to_sql(sql)?;
        }

        match &self.condition {
            Some(condition) => {
                sql.append_syntax(" ON ");
                condition.to_sql_predicate(sql)?;
            }
            None if needs_condition => {
                sql.append_syntax(" ON ");
                always_true(sql);
            }
            None => {}
        }
        Ok(())
    }
}

impl TableReference {
    pub fn to_sql(&self, sql: &mut SQL) {
        let SchemaName(schema) = &self.schema;
        let TableName(table) = &self.table;
        if !schema.is_empty() {
            sql.append_identifier(schema);
            sql.append_syntax(".");
        }
        sql.append_identifier(table);
    }
}

impl OrderByElement {
    pub fn to_sql(&self, sql: &mut SQL) -> Result<(), Error> {
        self.target.to_sql(sql)?;
        match self.direction {
            OrderByDirection::Asc => sql.append_syntax(" ASC"),
            OrderByDirection::Desc => sql.append_syntax(" DESC"),
        }
        Ok(())
    }
}

/// A parenthesised select on its own indented lines.
fn nested_select_to_sql(select: &Select, sql: &mut SQL) -> Result<(), Error> {
    sql.append_syntax("(");
    sql.indent();
    sql.new_line();
    select.to_sql(sql)?;
    sql.outdent();
    sql.new_line();
    sql.append_syntax(")");
    Ok(())
}

fn always_true(sql: &mut SQL) {
    if sql.dialect().native_booleans() {
        sql.append_syntax("TRUE");
    } else {
        sql.append_syntax("1 = 1");
    }
}

// scalars

/// Where an expression appears decides how booleans are spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Value,
    Predicate,
}

const PRECEDENCE_OR: u8 = 1;
const PRECEDENCE_AND: u8 = 2;
const PRECEDENCE_NOT: u8 = 3;
const PRECEDENCE_COMPARISON: u8 = 4;
const PRECEDENCE_ADDITIVE: u8 = 5;
const PRECEDENCE_MULTIPLICATIVE: u8 = 6;
const PRECEDENCE_NEGATE: u8 = 7;
const PRECEDENCE_ATOM: u8 = 8;

impl BinaryOperator {
    fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Equals
            | BinaryOperator::NotEquals
            | BinaryOperator::LessThan
            | BinaryOperator::LessThanOrEqualTo
            | BinaryOperator::GreaterThan
            | BinaryOperator::GreaterThanOrEqualTo
            | BinaryOperator::Like => PRECEDENCE_COMPARISON,
            BinaryOperator::Add | BinaryOperator::Subtract | BinaryOperator::Concatenate => {
                PRECEDENCE_ADDITIVE
            }
            BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo => {
                PRECEDENCE_MULTIPLICATIVE
            }
        }
    }

    /// `a op (b op c)` differs from `(a op b) op c`.
    fn is_associative(self) -> bool {
        matches!(
            self,
            BinaryOperator::Add | BinaryOperator::Multiply | BinaryOperator::Concatenate
        )
    }

    fn to_sql(self, sql: &mut SQL) {
        sql.append_syntax(match self {
            BinaryOperator::Equals => " = ",
            BinaryOperator::NotEquals => " <> ",
            BinaryOperator::LessThan => " < ",
            BinaryOperator::LessThanOrEqualTo => " <= ",
            BinaryOperator::GreaterThan => " > ",
            BinaryOperator::GreaterThanOrEqualTo => " >= ",
            BinaryOperator::Like => " LIKE ",
            BinaryOperator::Add => " + ",
            BinaryOperator::Subtract => " - ",
            BinaryOperator::Multiply => " * ",
            BinaryOperator::Divide => " / ",
            BinaryOperator::Modulo => " % ",
            BinaryOperator::Concatenate => " || ",
        });
    }
}

impl Expression {
    /// Render in value position, e.g. as a selected column or an operand.
    pub fn to_sql(&self, sql: &mut SQL) -> Result<(), Error> {
        self.to_sql_at(Position::Value, sql)
    }

    /// Render in predicate position, e.g. in a WHERE clause.
    pub fn to_sql_predicate(&self, sql: &mut SQL) -> Result<(), Error> {
        self.to_sql_at(Position::Predicate, sql)
    }

    fn to_sql_at(&self, position: Position, sql: &mut SQL) -> Result<(), Error> {
        let native_booleans = sql.dialect().native_booleans();
        match position {
            Position::Value if !native_booleans && self.is_predicate() => {
                sql.append_syntax("CASE WHEN ");
                self.to_sql_raw(sql)?;
                sql.append_syntax(" THEN 1 ELSE 0 END");
                Ok(())
            }
            Position::Predicate if !native_booleans && !self.is_predicate() => {
                sql.append_syntax("(");
                self.operand_to_sql(Position::Value, PRECEDENCE_COMPARISON, true, sql)?;
                sql.append_syntax(" = 1)");
                Ok(())
            }
            _ => self.to_sql_raw(sql),
        }
    }

    /// The precedence of this expression once rendered at `position`.
    fn precedence_at(&self, position: Position, native_booleans: bool) -> u8 {
        if !native_booleans {
            match position {
                Position::Value if self.is_predicate() => return PRECEDENCE_ATOM,
                Position::Predicate if !self.is_predicate() => return PRECEDENCE_ATOM,
                _ => {}
            }
        }
        match self {
            Expression::Or { .. } => PRECEDENCE_OR,
            Expression::And { .. } => PRECEDENCE_AND,
            Expression::Not(_) => PRECEDENCE_NOT,
            Expression::BinaryOperation { operator, .. } => operator.precedence(),
            Expression::UnaryOperation { operator, .. } => match operator {
                UnaryOperator::IsNull | UnaryOperator::IsNotNull => PRECEDENCE_COMPARISON,
                UnaryOperator::Negate => PRECEDENCE_NEGATE,
            },
            Expression::In { .. } | Expression::InSelect { .. } => PRECEDENCE_COMPARISON,
            _ => PRECEDENCE_ATOM,
        }
    }

    /// Render as the operand of an operator with precedence `parent`, adding parentheses
    /// when the operand binds more loosely. `strict` also parenthesises equal precedence.
    fn operand_to_sql(
        &self,
        position: Position,
        parent: u8,
        strict: bool,
        sql: &mut SQL,
    ) -> Result<(), Error> {
        let precedence = self.precedence_at(position, sql.dialect().native_booleans());
        let needs_parentheses = if strict {
            precedence <= parent
        } else {
            precedence < parent
        };
        if needs_parentheses {
            sql.append_syntax("(");
            self.to_sql_at(position, sql)?;
            sql.append_syntax(")");
            Ok(())
        } else {
            self.to_sql_at(position, sql)
        }
    }

    fn to_sql_raw(&self, sql: &mut SQL) -> Result<(), Error> {
        match self {
            Expression::Column(column) => {
                sql.append_alias(column.table);
                sql.append_syntax(".");
                let ColumnName(name) = &column.name;
                sql.append_identifier(name);
            }
            Expression::Value { value, .. } => value.to_sql(sql),
            Expression::External(_) => return Err(Error::UnsupportedNode("external value")),
            Expression::NamedValue(named_value) => sql.append_param(&named_value.name),
            Expression::And { left, right } => {
                left.operand_to_sql(Position::Predicate, PRECEDENCE_AND, false, sql)?;
                sql.append_syntax(" AND ");
                right.operand_to_sql(Position::Predicate, PRECEDENCE_AND, false, sql)?;
            }
            Expression::Or { left, right } => {
                left.operand_to_sql(Position::Predicate, PRECEDENCE_OR, false, sql)?;
                sql.append_syntax(" OR ");
                right.operand_to_sql(Position::Predicate, PRECEDENCE_OR, false, sql)?;
            }
            Expression::Not(expression) => {
                sql.append_syntax("NOT ");
                expression.operand_to_sql(Position::Predicate, PRECEDENCE_NOT, true, sql)?;
            }
            Expression::BinaryOperation {
                left,
                operator,
                right,
            } => {
                let precedence = operator.precedence();
                let comparison = operator.is_comparison();
                left.operand_to_sql(Position::Value, precedence, comparison, sql)?;
                operator.to_sql(sql);
                right.operand_to_sql(
                    Position::Value,
                    precedence,
                    comparison || !operator.is_associative(),
                    sql,
                )?;
            }
            Expression::UnaryOperation {
                expression,
                operator,
            } => match operator {
                UnaryOperator::IsNull => {
                    expression.operand_to_sql(Position::Value, PRECEDENCE_COMPARISON, true, sql)?;
                    sql.append_syntax(" IS NULL");
                }
                UnaryOperator::IsNotNull => {
                    expression.operand_to_sql(Position::Value, PRECEDENCE_COMPARISON, true, sql)?;
                    sql.append_syntax(" IS NOT NULL");
                }
                UnaryOperator::Negate => {
                    sql.append_syntax("-");
                    expression.operand_to_sql(Position::Value, PRECEDENCE_NEGATE, true, sql)?;
                }
            },
            Expression::Conditional {
                condition,
                then,
                otherwise,
            } => {
                sql.append_syntax("CASE WHEN ");
                condition.to_sql_predicate(sql)?;
                sql.append_syntax(" THEN ");
                then.to_sql(sql)?;
                sql.append_syntax(" ELSE ");
                otherwise.to_sql(sql)?;
                sql.append_syntax(" END");
            }
            Expression::FunctionCall { function, args, .. } => {
                function.to_sql(sql);
                sql.append_syntax("(");
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        sql.append_syntax(", ");
                    }
                    arg.to_sql(sql)?;
                }
                sql.append_syntax(")");
            }
            Expression::Cast { expression, r#type } => {
                sql.append_syntax("CAST(");
                expression.to_sql(sql)?;
                sql.append_syntax(" AS ");
                let type_name = sql.dialect().cast_type_name(*r#type);
                sql.append_syntax(&type_name);
                sql.append_syntax(")");
            }
            Expression::Aggregate(aggregate) => aggregate.to_sql(sql)?,
            Expression::ScalarSubquery { select, .. } => nested_select_to_sql(select, sql)?,
            Expression::Exists { select } => {
                sql.append_syntax("EXISTS ");
                nested_select_to_sql(select, sql)?;
            }
            Expression::In { expression, values } => {
                if values.is_empty() {
                    // nothing is a member of the empty list
                    if sql.dialect().native_booleans() {
                        sql.append_syntax("FALSE");
                    } else {
                        sql.append_syntax("1 = 0");
                    }
                } else {
                    expression.operand_to_sql(
                        Position::Value,
                        PRECEDENCE_COMPARISON,
                        true,
                        sql,
                    )?;
                    sql.append_syntax(" IN (");
                    for (index, value) in values.iter().enumerate() {
                        if index > 0 {
                            sql.append_syntax(", ");
                        }
                        value.to_sql(sql)?;
                    }
                    sql.append_syntax(")");
                }
            }
            Expression::InSelect { expression, select } => {
                expression.operand_to_sql(Position::Value, PRECEDENCE_COMPARISON, true, sql)?;
                sql.append_syntax(" IN ");
                nested_select_to_sql(select, sql)?;
            }
            Expression::Record(_) => return Err(Error::UnsupportedNode("record")),
            Expression::Grouping { .. } => return Err(Error::UnsupportedNode("grouping")),
            Expression::Projection(_) => return Err(Error::UnsupportedNode("projection")),
        }
        Ok(())
    }
}

impl Aggregate {
    pub fn to_sql(&self, sql: &mut SQL) -> Result<(), Error> {
        let spelling = sql.dialect().aggregate_spelling(self.function);
        sql.append_syntax(&spelling);
        sql.append_syntax("(");
        match &self.argument {
            // the argument-less form counts every row
            None => sql.append_syntax("*"),
            Some(argument) => {
                if self.is_distinct {
                    sql.append_syntax("DISTINCT ");
                }
                argument.to_sql(sql)?;
            }
        }
        sql.append_syntax(")");
        Ok(())
    }
}

impl Function {
    pub fn to_sql(&self, sql: &mut SQL) {
        match self {
            Function::Coalesce => sql.append_syntax("COALESCE"),
            Function::Upper => sql.append_syntax("UPPER"),
            Function::Lower => sql.append_syntax("LOWER"),
            Function::Length => sql.append_syntax("LENGTH"),
            Function::Trim => sql.append_syntax("TRIM"),
            Function::Abs => sql.append_syntax("ABS"),
            Function::Round => sql.append_syntax("ROUND"),
        }
    }
}

impl Value {
    pub fn to_sql(&self, sql: &mut SQL) {
        match &self {
            Value::Null => sql.append_syntax("NULL"),
            Value::Bool(b) => {
                let text = match (sql.dialect().native_booleans(), b) {
                    (true, true) => "TRUE",
                    (true, false) => "FALSE",
                    (false, true) => "1",
                    (false, false) => "0",
                };
                sql.append_syntax(text);
            }
            Value::Int8(i) => sql.append_syntax(&i.to_string()),
            Value::Float8(f) => sql.append_syntax(&format!("{f:?}")),
            Value::String(s) => {
                sql.append_syntax("'");
                sql.append_syntax(&s.replace('\'', "''"));
                sql.append_syntax("'");
            }
        }
    }
}

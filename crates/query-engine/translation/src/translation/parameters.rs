//! Replace literals and captured values in a bound tree with named parameters.
//!
//! Numeric literals stay inline: they rarely vary between runs of the same query and inlining
//! them lets the database use them when planning. Every other literal becomes a parameter, as
//! does every captured value. Equal values share one parameter.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use query_engine_metadata::metadata::ScalarType;
use query_engine_sql::sql::ast::{
    Expression, ExternalValue, From, NamedValue, ParamValue, Projection, Select, Value,
};
use query_engine_sql::sql::execution_plan::Param;

/// Parameterize the select and the projector of a bound projection, returning the parameters in
/// the order they were created.
pub fn parameterize(mut projection: Projection) -> (Projection, Vec<Param>) {
    let mut parameterizer = Parameterizer::default();
    parameterizer.select(&mut projection.select);
    parameterizer.expression(&mut projection.projector);
    let params = parameterizer.params.iter().map(Param::from).collect();
    (projection, params)
}

#[derive(Default)]
struct Parameterizer {
    params: Vec<NamedValue>,
    /// Captured values by a hash of their content, to the indices of candidate parameters.
    externals: HashMap<u64, Vec<usize>>,
}

impl Parameterizer {
    fn literal(&mut self, value: Value, r#type: ScalarType) -> Expression {
        let source = ParamValue::Literal { value };
        let existing = self
            .params
            .iter()
            .find(|param| param.r#type == r#type && param.source == source);
        match existing {
            Some(param) => Expression::NamedValue(param.clone()),
            None => self.create(source, r#type),
        }
    }

    fn external(&mut self, external: ExternalValue) -> Expression {
        let key = content_hash(&external);
        let source = ParamValue::External {
            root: external.root,
            path: external.path,
            value: external.value,
        };
        if let Some(candidates) = self.externals.get(&key) {
            if let Some(param) = candidates
                .iter()
                .map(|index| &self.params[*index])
                .find(|param| param.source == source)
            {
                return Expression::NamedValue(param.clone());
            }
        }
        self.externals
            .entry(key)
            .or_default()
            .push(self.params.len());
        self.create(source, external.r#type)
    }

    fn create(&mut self, source: ParamValue, r#type: ScalarType) -> Expression {
        let named_value = NamedValue {
            name: format!("p{}", self.params.len()),
            r#type,
            source,
        };
        self.params.push(named_value.clone());
        Expression::NamedValue(named_value)
    }

    fn expression(&mut self, expression: &mut Expression) {
        match expression {
            Expression::Value { value, r#type } => {
                if !value.is_numeric() && *value != Value::Null {
                    let r#type = *r#type;
                    let value = std::mem::replace(value, Value::Null);
                    *expression = self.literal(value, r#type);
                }
            }
            Expression::External(external) => {
                let external = external.clone();
                *expression = self.external(external);
            }
            Expression::Column(_) | Expression::NamedValue(_) => {}
            Expression::And { left, right }
            | Expression::Or { left, right }
            | Expression::BinaryOperation { left, right, .. } => {
                self.expression(left);
                self.expression(right);
            }
            Expression::Not(inner)
            | Expression::UnaryOperation {
                expression: inner, ..
            }
            | Expression::Cast {
                expression: inner, ..
            } => self.expression(inner),
            Expression::Conditional {
                condition,
                then,
                otherwise,
            } => {
                self.expression(condition);
                self.expression(then);
                self.expression(otherwise);
            }
            Expression::FunctionCall { args, .. } => {
                for arg in args {
                    self.expression(arg);
                }
            }
            Expression::Aggregate(aggregate) => {
                if let Some(argument) = &mut aggregate.argument {
                    self.expression(argument);
                }
            }
            Expression::ScalarSubquery { select, .. } | Expression::Exists { select } => {
                self.select(select);
            }
            Expression::In { expression, values } => {
                self.expression(expression);
                for value in values {
                    self.expression(value);
                }
            }
            Expression::InSelect { expression, select } => {
                self.expression(expression);
                self.select(select);
            }
            Expression::Record(record) => {
                for (_, field) in &mut record.fields {
                    self.expression(field);
                }
            }
            Expression::Grouping { key, elements } => {
                self.expression(key);
                self.select(&mut elements.select);
                self.expression(&mut elements.projector);
            }
            Expression::Projection(projection) => {
                self.select(&mut projection.select);
                self.expression(&mut projection.projector);
            }
        }
    }

    fn select(&mut self, select: &mut Select) {
        for column in &mut select.columns {
            self.expression(&mut column.expression);
        }
        if let Some(from) = &mut select.from {
            self.from(from);
        }
        if let Some(predicate) = &mut select.where_ {
            self.expression(predicate);
        }
        for key in &mut select.group_by {
            self.expression(key);
        }
        for element in &mut select.order_by {
            self.expression(&mut element.target);
        }
        if let Some(skip) = &mut select.skip {
            self.expression(skip);
        }
        if let Some(take) = &mut select.take {
            self.expression(take);
        }
    }

    fn from(&mut self, from: &mut From) {
        match from {
            From::Table { .. } => {}
            From::Select(select) => self.select(select),
            From::Join(join) => {
                self.from(&mut join.left);
                self.from(&mut join.right);
                if let Some(condition) = &mut join.condition {
                    self.expression(condition);
                }
            }
        }
    }
}

fn content_hash(external: &ExternalValue) -> u64 {
    let mut hasher = DefaultHasher::new();
    external.root.hash(&mut hasher);
    external.path.hash(&mut hasher);
    external.value.to_string().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_engine_sql::sql::ast::{Aggregator, TableAlias};
    use query_engine_sql::sql::helpers;

    fn external(root: &str, value: serde_json::Value) -> Expression {
        Expression::External(ExternalValue {
            root: root.to_string(),
            path: vec![],
            value,
            r#type: ScalarType::Integer,
        })
    }

    fn text(value: &str) -> Expression {
        Expression::Value {
            value: Value::String(value.to_string()),
            r#type: ScalarType::Text,
        }
    }

    fn projection_of(where_: Expression) -> Projection {
        let alias = TableAlias::new();
        let mut select = helpers::simple_select(
            alias,
            vec![helpers::make_column_declaration("one", helpers::int_expr(1))],
        );
        select.where_ = Some(where_);
        Projection {
            select,
            projector: helpers::make_column(alias, "one", ScalarType::Integer),
            aggregator: Some(Aggregator::SingleValue),
        }
    }

    #[test]
    fn numbers_stay_inline_and_strings_become_parameters() {
        let (projection, params) = parameterize(projection_of(helpers::equals(
            text("Ann"),
            helpers::int_expr(3),
        )));
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "p0");
        assert_eq!(
            params[0].value,
            ParamValue::Literal {
                value: Value::String("Ann".to_string())
            }
        );
        let Some(Expression::BinaryOperation { left, right, .. }) = projection.select.where_
        else {
            panic!("expected the comparison to survive");
        };
        assert!(matches!(*left, Expression::NamedValue(_)));
        assert_eq!(*right, helpers::int_expr(3));
    }

    #[test]
    fn equal_values_share_a_parameter() {
        let (_, params) = parameterize(projection_of(helpers::and(
            helpers::and(
                helpers::equals(text("Ann"), text("Ann")),
                helpers::equals(
                    external("min", serde_json::json!(18)),
                    external("min", serde_json::json!(18)),
                ),
            ),
            helpers::equals(
                external("max", serde_json::json!(18)),
                external("min", serde_json::json!(19)),
            ),
        )));
        let names: Vec<_> = params.iter().map(|param| param.name.as_str()).collect();
        assert_eq!(names, vec!["p0", "p1", "p2", "p3"]);
        assert!(matches!(
            &params[1].value,
            ParamValue::External { root, .. } if root == "min"
        ));
    }

    #[test]
    fn different_literals_get_different_parameters() {
        let (_, params) = parameterize(projection_of(helpers::or(
            helpers::equals(text("Ann"), text("Bob")),
            helpers::equals(text("Ann"), text("Bob")),
        )));
        let values: Vec<_> = params.iter().map(|param| &param.value).collect();
        assert_eq!(
            values,
            vec![
                &ParamValue::Literal {
                    value: Value::String("Ann".to_string())
                },
                &ParamValue::Literal {
                    value: Value::String("Bob".to_string())
                },
            ]
        );
        assert_eq!(params[0].name, "p0");
        assert_eq!(params[1].name, "p1");
    }

    #[test]
    fn always_true_and_always_false_stay_inline() {
        let where_ = helpers::or(helpers::true_expr(), helpers::false_expr());
        let (projection, params) = parameterize(projection_of(where_.clone()));
        assert!(params.is_empty());
        assert_eq!(projection.select.where_, Some(where_));
    }

    #[test]
    fn captured_numbers_are_parameters_too() {
        let (_, params) = parameterize(projection_of(helpers::equals(
            external("count", serde_json::json!(10)),
            helpers::int_expr(10),
        )));
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].r#type, ScalarType::Integer);
    }
}

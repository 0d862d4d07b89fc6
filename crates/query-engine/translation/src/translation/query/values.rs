//! Handle the translation of literal values.

use query_engine_metadata::metadata::ScalarType;
use query_engine_sql::sql;

use crate::translation::error::Error;
use crate::translation::helpers::Env;

/// A literal from the chain, typed the way the dialect stores constants of its shape.
pub fn translate_constant(
    env: &Env,
    value: &serde_json::Value,
) -> Result<sql::ast::Expression, Error> {
    let r#type = env.dialect().constant_type(value);
    Ok(sql::ast::Expression::Value {
        value: translate_json_value(value, r#type)?,
        r#type,
    })
}

/// Convert a JSON value into a SQL value.
pub fn translate_json_value(
    value: &serde_json::Value,
    scalar_type: ScalarType,
) -> Result<sql::ast::Value, Error> {
    match value {
        // numbers
        serde_json::Value::Number(num) => match scalar_type {
            // integers
            ScalarType::Smallint | ScalarType::Integer | ScalarType::Bigint => num
                .as_i64()
                .map(sql::ast::Value::Int8)
                .ok_or_else(|| Error::type_mismatch(value, scalar_type.to_string())),

            // floats
            ScalarType::Real | ScalarType::DoublePrecision | ScalarType::Numeric => num
                .as_f64()
                .map(sql::ast::Value::Float8)
                .ok_or_else(|| Error::type_mismatch(value, scalar_type.to_string())),

            ScalarType::Any => Ok(num.as_i64().map_or_else(
                || sql::ast::Value::Float8(num.as_f64().unwrap_or(f64::NAN)),
                sql::ast::Value::Int8,
            )),

            _ => Err(Error::type_mismatch(value, scalar_type.to_string())),
        },

        // booleans
        serde_json::Value::Bool(b) => match scalar_type {
            ScalarType::Boolean | ScalarType::Any => Ok(sql::ast::Value::Bool(*b)),

            _ => Err(Error::type_mismatch(value, scalar_type.to_string())),
        },

        // strings
        serde_json::Value::String(s) => match scalar_type {
            ScalarType::Character | ScalarType::CharacterVarying | ScalarType::Text => {
                Ok(sql::ast::Value::String(s.to_string()))
            }

            // date, time and uuid literals are written as strings and coerced by the database
            ScalarType::Date
            | ScalarType::TimeWithoutTimeZone
            | ScalarType::TimestampWithTimeZone
            | ScalarType::TimestampWithoutTimeZone
            | ScalarType::Uuid => Ok(sql::ast::Value::String(s.to_string())),

            // Any will be passed as string for now
            ScalarType::Any => Ok(sql::ast::Value::String(s.to_string())),

            _ => Err(Error::type_mismatch(value, scalar_type.to_string())),
        },
        // null
        serde_json::Value::Null => Ok(sql::ast::Value::Null),

        // not supported
        serde_json::Value::Array(_) => Err(Error::UnsupportedConstruct(
            "array literal used as a scalar".to_string(),
        )),
        serde_json::Value::Object(_) => Err(Error::UnsupportedConstruct(
            "object literal used as a scalar".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_follow_the_requested_type() {
        assert_eq!(
            translate_json_value(&serde_json::json!(18), ScalarType::Integer),
            Ok(sql::ast::Value::Int8(18))
        );
        assert_eq!(
            translate_json_value(&serde_json::json!(18), ScalarType::DoublePrecision),
            Ok(sql::ast::Value::Float8(18.0))
        );
        assert!(matches!(
            translate_json_value(&serde_json::json!(1.5), ScalarType::Integer),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn strings_do_not_become_numbers() {
        assert!(matches!(
            translate_json_value(&serde_json::json!("18"), ScalarType::Integer),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(
            translate_json_value(&serde_json::json!("2024-01-01"), ScalarType::Date),
            Ok(sql::ast::Value::String("2024-01-01".to_string()))
        );
    }

    #[test]
    fn arrays_are_not_scalars() {
        assert!(matches!(
            translate_json_value(&serde_json::json!([1, 2]), ScalarType::Json),
            Err(Error::UnsupportedConstruct(_))
        ));
    }
}

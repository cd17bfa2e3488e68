//! Per-level hyperparameter expansion.
//!
//! Network hyperparameters such as cutoff radii or channel counts may be given
//! either as a single number or as a short list. Both are expanded to one value
//! per level; a short list is padded by repeating its final entry.
use crate::error::{CoreError, Result};
use serde_json::Value;
use tracing::warn;

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn as_number(name: &str, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| CoreError::IncorrectType {
        name: name.to_string(),
        found: type_name(value),
    })
}

/// Expands `var` to exactly `num_levels` values.
///
/// A number is repeated `num_levels` times. A list shorter than `num_levels` is
/// padded with its last entry; a longer list is cut to `num_levels`. Anything
/// else, including lists holding non-numbers, is an [`CoreError::IncorrectType`].
pub fn expand_var_list(name: &str, var: &Value, num_levels: usize) -> Result<Vec<f64>> {
    match var {
        Value::Number(_) => Ok(vec![as_number(name, var)?; num_levels]),
        Value::Array(items) => {
            let mut values = items
                .iter()
                .map(|item| as_number(name, item))
                .collect::<Result<Vec<_>>>()?;
            let last = *values.last().ok_or_else(|| CoreError::EmptyList {
                name: name.to_string(),
            })?;
            if values.len() > num_levels {
                warn!(
                    "'{}' has {} entries, only the first {} are used",
                    name,
                    values.len(),
                    num_levels
                );
                values.truncate(num_levels);
            }
            values.resize(num_levels, last);
            Ok(values)
        }
        other => Err(CoreError::IncorrectType {
            name: name.to_string(),
            found: type_name(other),
        }),
    }
}

/// [`expand_var_list`] for orders and channel counts, which must be non-negative integers.
pub fn expand_int_list(name: &str, var: &Value, num_levels: usize) -> Result<Vec<usize>> {
    expand_var_list(name, var, num_levels)?
        .into_iter()
        .map(|v| {
            if v >= 0.0 && v.fract() == 0.0 {
                Ok(v as usize)
            } else {
                Err(CoreError::Config(format!(
                    "'{}' must hold non-negative integers, found {}",
                    name, v
                )))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expand_scalar() {
        assert_eq!(expand_var_list("gain", &json!(10.0), 4).unwrap(), vec![10.0; 4]);
        assert_eq!(expand_var_list("maxl", &json!(3), 2).unwrap(), vec![3.0, 3.0]);
        assert!(expand_var_list("maxl", &json!(3), 0).unwrap().is_empty());
    }

    #[test]
    fn test_expand_short_list_repeats_last() {
        let values = expand_var_list("rad", &json!([1.5, 2.0]), 5).unwrap();
        assert_eq!(values, vec![1.5, 2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_expand_channels_has_one_more_level() {
        let num_cg_levels = 3;
        let values = expand_int_list("num_channels", &json!([8, 16]), num_cg_levels + 1).unwrap();
        assert_eq!(values, vec![8, 16, 16, 16]);
    }

    #[test]
    fn test_expand_long_list_is_truncated() {
        let values = expand_var_list("rad", &json!([1, 2, 3, 4]), 2).unwrap();
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[test]
    fn test_expand_rejects_other_types() {
        for bad in [json!("3"), json!(true), json!(null), json!({"a": 1}), json!([1, "2"])] {
            let err = expand_var_list("maxl", &bad, 3).unwrap_err();
            assert!(matches!(err, CoreError::IncorrectType { .. }), "{bad} -> {err}");
        }
        assert!(matches!(
            expand_var_list("maxl", &json!([]), 3).unwrap_err(),
            CoreError::EmptyList { .. }
        ));
    }

    #[test]
    fn test_expand_int_rejects_fractions() {
        assert!(expand_int_list("maxl", &json!(1.5), 2).is_err());
        assert!(expand_int_list("maxl", &json!(-1), 2).is_err());
        assert_eq!(expand_int_list("maxl", &json!(2.0), 2).unwrap(), vec![2, 2]);
    }
}

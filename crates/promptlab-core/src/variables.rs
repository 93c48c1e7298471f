//! Record variable builder.
//!
//! Turns a flat form submission (dotted field path → raw string) into the
//! nested variable tree stored on a dataset record, coercing each value by
//! the type the dataset schema declares for its path.
//!
//! ```text
//! { "user.age": "30", "tags": "a,b,c" }      schema: user.age=number, tags=array
//!                  ↓
//! { "user": { "age": 30 }, "tags": ["a", "b", "c"] }
//! ```

use crate::validation::whole_to_i64;
use crate::{DatasetSchema, FieldType, PromptLabError, Result};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Nested variable tree produced by [`build_variables`].
pub type VariableTree = Map<String, Value>;

/// Coerce one raw form value according to its declared type.
///
/// - `number`: integer text stays an integer, other numeric text becomes a
///   float; anything else (including infinities and NaN) is `null`
/// - `boolean`: `true` (any case) or `1` is `true`, everything else `false`
/// - `null`: always `null`
/// - `array`: valid JSON is used as parsed; otherwise the text is split on
///   commas and each piece trimmed
/// - `object`: valid JSON is used as parsed; otherwise the raw text is kept
/// - `string` and unknown types: the raw text, unchanged
pub fn coerce_value(raw: &str, field_type: FieldType) -> Value {
    match field_type {
        FieldType::Number => parse_number(raw.trim()),
        FieldType::Boolean => {
            let text = raw.trim();
            Value::Bool(text.eq_ignore_ascii_case("true") || text == "1")
        }
        FieldType::Null => Value::Null,
        FieldType::Array => serde_json::from_str(raw).unwrap_or_else(|_| {
            Value::Array(
                raw.split(',')
                    .map(|piece| Value::String(piece.trim().to_string()))
                    .collect(),
            )
        }),
        FieldType::Object => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        }
        FieldType::String | FieldType::Other => Value::String(raw.to_string()),
    }
}

/// Whole-valued numbers are stored as integers, so `"30.0"` and `"1e3"`
/// become `30` and `1000`.
fn parse_number(text: &str) -> Value {
    if let Ok(int) = text.parse::<i64>() {
        return Value::Number(int.into());
    }
    let Ok(float) = text.parse::<f64>() else {
        return Value::Null;
    };
    match whole_to_i64(float) {
        Some(int) => Value::Number(int.into()),
        None => Number::from_f64(float).map_or(Value::Null, Value::Number),
    }
}

/// Build a nested variable tree from flat field paths.
///
/// Fields whose raw value is empty or whitespace-only are omitted. Paths are
/// split on `.`; intermediate segments become objects created on demand and
/// the last segment holds the coerced value.
///
/// # Errors
///
/// Returns [`PromptLabError::ConflictingPath`] when a path needs an object
/// where a value already sits (`a` = "1" together with `a.b` = "2"), or when a
/// value would replace an object built by a longer path. No data is silently
/// overwritten, so the outcome does not depend on field order.
pub fn build_variables(
    fields: &BTreeMap<String, String>,
    schema: &DatasetSchema,
) -> Result<VariableTree> {
    let mut tree = VariableTree::new();

    for (path, raw) in fields {
        if raw.trim().is_empty() {
            continue;
        }

        let field_type = schema
            .get(path)
            .map(|field| field.field_type)
            .unwrap_or_default();
        let value = coerce_value(raw, field_type);

        insert_path(&mut tree, path, value)?;
    }

    Ok(tree)
}

fn insert_path(tree: &mut VariableTree, path: &str, value: Value) -> Result<()> {
    let segments: Vec<&str> = path.split('.').collect();
    let (leaf, parents) = match segments.split_last() {
        Some(split) => split,
        None => return Ok(()),
    };

    let mut node = tree;
    for segment in parents {
        let entry = node
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        node = match entry {
            Value::Object(map) => map,
            _ => return Err(PromptLabError::ConflictingPath(path.to_string())),
        };
    }

    if matches!(node.get(*leaf), Some(Value::Object(_))) {
        return Err(PromptLabError::ConflictingPath(path.to_string()));
    }
    node.insert(leaf.to_string(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchemaField;
    use serde_json::json;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn schema(pairs: &[(&str, FieldType)]) -> DatasetSchema {
        pairs
            .iter()
            .map(|(k, t)| (k.to_string(), SchemaField::new(*t)))
            .collect()
    }

    #[test]
    fn test_nested_paths_with_coercion() {
        let schema = schema(&[("user.age", FieldType::Number), ("tags", FieldType::Array)]);
        let tree = build_variables(&fields(&[("user.age", "30"), ("tags", "a,b,c")]), &schema)
            .unwrap();

        assert_eq!(
            Value::Object(tree),
            json!({"user": {"age": 30}, "tags": ["a", "b", "c"]})
        );
    }

    #[test]
    fn test_empty_values_are_omitted() {
        let schema = schema(&[("user.age", FieldType::Number)]);
        let tree = build_variables(&fields(&[("user.age", "")]), &schema).unwrap();
        assert!(tree.is_empty());

        let tree = build_variables(&fields(&[("name", "   "), ("city", "Oslo")]), &schema).unwrap();
        assert_eq!(Value::Object(tree), json!({"city": "Oslo"}));
    }

    #[test]
    fn test_missing_schema_entry_defaults_to_string() {
        let tree =
            build_variables(&fields(&[("count", "12")]), &DatasetSchema::new()).unwrap();
        assert_eq!(Value::Object(tree), json!({"count": "12"}));
    }

    #[test]
    fn test_number_coercion() {
        assert_eq!(coerce_value("30", FieldType::Number), json!(30));
        assert_eq!(coerce_value(" -4 ", FieldType::Number), json!(-4));
        assert_eq!(coerce_value("2.5", FieldType::Number), json!(2.5));
        assert_eq!(coerce_value("1e3", FieldType::Number), json!(1000));
        assert_eq!(coerce_value("30.0", FieldType::Number), json!(30));
        assert_eq!(coerce_value("-2.50e1", FieldType::Number), json!(-25));
        assert_eq!(coerce_value("1e30", FieldType::Number), json!(1e30));
        assert_eq!(coerce_value("thirty", FieldType::Number), Value::Null);
        assert_eq!(coerce_value("inf", FieldType::Number), Value::Null);
        assert_eq!(coerce_value("NaN", FieldType::Number), Value::Null);
    }

    #[test]
    fn test_boolean_coercion() {
        assert_eq!(coerce_value("true", FieldType::Boolean), json!(true));
        assert_eq!(coerce_value("TRUE", FieldType::Boolean), json!(true));
        assert_eq!(coerce_value("1", FieldType::Boolean), json!(true));
        assert_eq!(coerce_value("yes", FieldType::Boolean), json!(false));
        assert_eq!(coerce_value("0", FieldType::Boolean), json!(false));
        assert_eq!(coerce_value("false", FieldType::Boolean), json!(false));
    }

    #[test]
    fn test_null_coercion_ignores_text() {
        assert_eq!(coerce_value("anything", FieldType::Null), Value::Null);
    }

    #[test]
    fn test_array_fallback_splits_and_trims() {
        assert_eq!(
            coerce_value(" a , b,c ", FieldType::Array),
            json!(["a", "b", "c"])
        );
        assert_eq!(coerce_value("solo", FieldType::Array), json!(["solo"]));
        assert_eq!(coerce_value("a,,b", FieldType::Array), json!(["a", "", "b"]));
    }

    #[test]
    fn test_object_fallback_keeps_raw_text() {
        assert_eq!(
            coerce_value("{not json", FieldType::Object),
            json!("{not json")
        );
    }

    #[test]
    fn test_json_parse_matches_for_structured_types() {
        let samples = [
            r#"[1, "two", {"three": 3}]"#,
            r#"{"a": [1, 2], "b": null}"#,
            r#"["x"]"#,
            "42",
            r#""quoted""#,
        ];
        for raw in samples {
            let parsed: Value = serde_json::from_str(raw).unwrap();
            assert_eq!(coerce_value(raw, FieldType::Array), parsed, "array: {raw}");
            assert_eq!(coerce_value(raw, FieldType::Object), parsed, "object: {raw}");
        }
    }

    #[test]
    fn test_string_and_other_types_keep_raw_text() {
        assert_eq!(coerce_value("  padded ", FieldType::String), json!("  padded "));
        assert_eq!(coerce_value("2024-01-01", FieldType::Other), json!("2024-01-01"));
    }

    #[test]
    fn test_sibling_paths_share_parent() {
        let schema = schema(&[("user.age", FieldType::Number)]);
        let tree = build_variables(
            &fields(&[("user.age", "30"), ("user.name", "Ada"), ("user.address.city", "Oslo")]),
            &schema,
        )
        .unwrap();
        assert_eq!(
            Value::Object(tree),
            json!({"user": {"age": 30, "name": "Ada", "address": {"city": "Oslo"}}})
        );
    }

    #[test]
    fn test_scalar_then_nested_path_conflicts() {
        // "a" sorts before "a.b", so the scalar is placed first.
        let err = build_variables(&fields(&[("a", "1"), ("a.b", "2")]), &DatasetSchema::new())
            .unwrap_err();
        assert!(matches!(err, PromptLabError::ConflictingPath(ref p) if p == "a.b"));
    }

    #[test]
    fn test_nested_path_then_scalar_conflicts() {
        let mut tree = VariableTree::new();
        insert_path(&mut tree, "a.b", json!("2")).unwrap();
        let err = insert_path(&mut tree, "a", json!("1")).unwrap_err();
        assert!(matches!(err, PromptLabError::ConflictingPath(ref p) if p == "a"));
        assert_eq!(Value::Object(tree), json!({"a": {"b": "2"}}));
    }

    #[test]
    fn test_empty_scalar_does_not_conflict() {
        let tree = build_variables(&fields(&[("a", ""), ("a.b", "2")]), &DatasetSchema::new())
            .unwrap();
        assert_eq!(Value::Object(tree), json!({"a": {"b": "2"}}));
    }
}

// Copyright Materialize, Inc. and contributors. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Binding of request parameters to typed rows.
//!
//! A request supplies its parameters in two places: the query string, where
//! every value is text, and the JSON body, where values carry JSON types. The
//! two are merged into one set of [`Params`] according to a
//! [`ParamPrecedence`], and a [`Schema`] then binds the merged parameters to a
//! [`Row`] with one datum per declared field.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use rc_repr::{ColumnType, Datum, Jsonb, RelationDesc, Row, ScalarType};
use serde::Deserialize;

use crate::config::ConfigError;

/// Which source wins when a parameter appears in both the query string and
/// the request body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParamPrecedence {
    /// Values from the body override values from the query string.
    #[default]
    BodyFirst,
    /// Values from the query string override values from the body.
    QueryFirst,
}

impl FromStr for ParamPrecedence {
    type Err = String;

    fn from_str(s: &str) -> Result<ParamPrecedence, String> {
        match s {
            "body" | "body-first" => Ok(ParamPrecedence::BodyFirst),
            "query" | "query-first" => Ok(ParamPrecedence::QueryFirst),
            _ => Err(format!(
                "invalid precedence {s:?}: expected \"body-first\" or \"query-first\""
            )),
        }
    }
}

/// An untyped parameter value.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    /// A value from the query string.
    Text(String),
    /// A value from the JSON body.
    Json(serde_json::Value),
}

/// The merged parameters of a request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    /// Merges query-string parameters and a JSON request body.
    ///
    /// An empty (or all-whitespace) body contributes no parameters; any other
    /// body must be a JSON object. When a query-string key repeats, its last
    /// value is used.
    pub fn from_request(
        query: Vec<(String, String)>,
        body: &[u8],
        precedence: ParamPrecedence,
    ) -> Result<Params, BindError> {
        let body = if body.iter().all(u8::is_ascii_whitespace) {
            serde_json::Map::new()
        } else {
            match serde_json::from_slice(body) {
                Ok(serde_json::Value::Object(fields)) => fields,
                Ok(other) => {
                    return Err(BindError::InvalidBody(format!(
                        "expected a JSON object, got {}",
                        json_kind(&other)
                    )))
                }
                Err(e) => return Err(BindError::InvalidBody(e.to_string())),
            }
        };

        let query = query
            .into_iter()
            .map(|(name, value)| (name, ParamValue::Text(value)));
        let body = body
            .into_iter()
            .map(|(name, value)| (name, ParamValue::Json(value)));

        // Later insertions win.
        let params = match precedence {
            ParamPrecedence::BodyFirst => query.chain(body).collect(),
            ParamPrecedence::QueryFirst => body.chain(query).collect(),
        };
        Ok(Params(params))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A field of a [`Schema`].
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub typ: ColumnType,
    /// The value bound when a request omits this field.
    pub default: Option<Datum>,
}

/// The declared shape of the rows a REST connector produces.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new() -> Schema {
        Schema::default()
    }

    /// Appends a field that requests must supply, unless it is nullable.
    pub fn with_field(mut self, name: impl Into<String>, typ: ColumnType) -> Schema {
        self.fields.push(Field {
            name: name.into(),
            typ,
            default: None,
        });
        self
    }

    /// Appends a field that is bound to `default` when a request omits it.
    pub fn with_default(
        mut self,
        name: impl Into<String>,
        typ: ColumnType,
        default: impl Into<Datum>,
    ) -> Schema {
        self.fields.push(Field {
            name: name.into(),
            typ,
            default: Some(default.into()),
        });
        self
    }

    /// Parses a schema from its JSON description.
    ///
    /// The description is an object mapping field names to field specs, e.g.
    /// `{"query": {"type": "string"}, "user": {"type": "string", "default":
    /// "manul"}}`. Fields are ordered by name.
    pub fn from_json(s: &str) -> Result<Schema, ConfigError> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct FieldSpec {
            #[serde(rename = "type")]
            typ: ScalarType,
            #[serde(default)]
            nullable: bool,
            default: Option<serde_json::Value>,
        }

        let specs: BTreeMap<String, FieldSpec> =
            serde_json::from_str(s).map_err(|e| ConfigError::InvalidSchema(e.to_string()))?;
        let mut schema = Schema::new();
        for (name, spec) in specs {
            let typ = spec.typ.nullable(spec.nullable);
            schema = match spec.default {
                None => schema.with_field(name, typ),
                Some(default) => {
                    let datum = coerce(&name, &typ, ParamValue::Json(default)).map_err(|e| {
                        ConfigError::InvalidDefault {
                            field: name.clone(),
                            msg: e.to_string(),
                        }
                    })?;
                    schema.with_default(name, typ, datum)
                }
            };
        }
        schema.validate()?;
        Ok(schema)
    }

    /// Checks that field names are unique and non-empty, that no field is of
    /// a type that clients cannot supply, and that defaults match their
    /// fields' types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = BTreeSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(ConfigError::EmptyFieldName);
            }
            if !names.insert(field.name.as_str()) {
                return Err(ConfigError::DuplicateField(field.name.clone()));
            }
            if field.typ.scalar_type == ScalarType::Id {
                return Err(ConfigError::InvalidFieldType {
                    field: field.name.clone(),
                    typ: field.typ.scalar_type,
                });
            }
            if let Some(default) = &field.default {
                if !default.is_instance_of(&field.typ) {
                    return Err(ConfigError::InvalidDefault {
                        field: field.name.clone(),
                        msg: format!("{default} is not a valid {}", field.typ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns the shape of the rows this schema binds.
    pub fn desc(&self) -> RelationDesc {
        self.fields
            .iter()
            .fold(RelationDesc::empty(), |desc, field| {
                desc.with_column(field.name.as_str(), field.typ)
            })
    }

    /// Binds `params` to a row with one datum per field, in field order.
    ///
    /// Parameters that name no field are ignored, unless `strict` is set, in
    /// which case they fail the binding.
    pub fn bind(&self, mut params: Params, strict: bool) -> Result<Row, BindError> {
        let mut datums = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let datum = match params.0.remove(&field.name) {
                Some(value) => coerce(&field.name, &field.typ, value)?,
                None => match &field.default {
                    Some(default) => default.clone(),
                    None if field.typ.nullable => Datum::Null,
                    None => return Err(BindError::MissingField(field.name.clone())),
                },
            };
            datums.push(datum);
        }
        if strict {
            if let Some(name) = params.0.into_keys().next() {
                return Err(BindError::UnknownField(name));
            }
        }
        Ok(Row::new(datums))
    }
}

/// Converts an untyped parameter into a datum of type `typ`.
fn coerce(name: &str, typ: &ColumnType, value: ParamValue) -> Result<Datum, BindError> {
    let invalid = |msg: String| BindError::InvalidField {
        field: name.to_owned(),
        typ: typ.scalar_type,
        msg,
    };
    match value {
        ParamValue::Json(serde_json::Value::Null) if typ.nullable => Ok(Datum::Null),
        ParamValue::Json(serde_json::Value::Null) => Err(BindError::NullField(name.to_owned())),
        // Clients that only speak strings may quote scalars in the body too.
        ParamValue::Json(serde_json::Value::String(s))
            if matches!(
                typ.scalar_type,
                ScalarType::Bool | ScalarType::Int64 | ScalarType::Float64
            ) =>
        {
            parse_text(typ.scalar_type, s).map_err(invalid)
        }
        ParamValue::Json(value) => from_json(typ.scalar_type, value).map_err(invalid),
        ParamValue::Text(s) => parse_text(typ.scalar_type, s).map_err(invalid),
    }
}

fn parse_text(typ: ScalarType, s: String) -> Result<Datum, String> {
    match typ {
        ScalarType::Bool => s.trim().parse::<bool>().map(Datum::from).map_err(|e| e.to_string()),
        ScalarType::Int64 => s.trim().parse::<i64>().map(Datum::from).map_err(|e| e.to_string()),
        ScalarType::Float64 => s.trim().parse::<f64>().map(Datum::from).map_err(|e| e.to_string()),
        ScalarType::String => Ok(Datum::String(s)),
        ScalarType::Jsonb => {
            let value = serde_json::from_str(&s).unwrap_or(serde_json::Value::String(s));
            Ok(Datum::Jsonb(Jsonb::from_value(&value)))
        }
        ScalarType::Id => Err("identities cannot be supplied by requests".into()),
    }
}

fn from_json(typ: ScalarType, value: serde_json::Value) -> Result<Datum, String> {
    match (typ, value) {
        (ScalarType::Bool, serde_json::Value::Bool(b)) => Ok(Datum::from(b)),
        (ScalarType::Int64, serde_json::Value::Number(n)) => n
            .as_i64()
            .map(Datum::from)
            .ok_or_else(|| format!("{n} is not a 64-bit integer")),
        (ScalarType::Float64, serde_json::Value::Number(n)) => n
            .as_f64()
            .map(Datum::from)
            .ok_or_else(|| format!("{n} is not a number")),
        (ScalarType::String, serde_json::Value::String(s)) => Ok(Datum::String(s)),
        (ScalarType::Jsonb, value) => Ok(Datum::Jsonb(Jsonb::from_value(&value))),
        (ScalarType::Id, _) => Err("identities cannot be supplied by requests".into()),
        (_, value) => Err(format!("got {}", json_kind(&value))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Errors binding a request to a row. All of them are the client's fault.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("missing required field {0:?}")]
    MissingField(String),
    #[error("field {field:?} is not a valid {typ}: {msg}")]
    InvalidField {
        field: String,
        typ: ScalarType,
        msg: String,
    },
    #[error("field {0:?} cannot be null")]
    NullField(String),
    #[error("unknown field {0:?}")]
    UnknownField(String),
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error("invalid query string: {0}")]
    InvalidQuery(String),
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn query_schema() -> Schema {
        Schema::new()
            .with_field("query", ScalarType::String.nullable(false))
            .with_field("user", ScalarType::String.nullable(false))
    }

    fn params(query: &[(&str, &str)], body: &str) -> Params {
        let query = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Params::from_request(query, body.as_bytes(), ParamPrecedence::BodyFirst).unwrap()
    }

    #[test]
    fn binds_body_fields_in_schema_order() {
        let row = query_schema()
            .bind(params(&[], r#"{"user": "sergey", "query": "one"}"#), false)
            .unwrap();
        assert_eq!(row, Row::new(vec![Datum::from("one"), Datum::from("sergey")]));
    }

    #[test]
    fn binds_query_string_fields() {
        let row = query_schema()
            .bind(params(&[("user", "sergey")], r#"{"query": "one"}"#), false)
            .unwrap();
        assert_eq!(row, Row::new(vec![Datum::from("one"), Datum::from("sergey")]));
    }

    #[test]
    fn applies_defaults() {
        let schema = Schema::new()
            .with_field("query", ScalarType::String.nullable(false))
            .with_default("user", ScalarType::String.nullable(false), "manul");
        let row = schema.bind(params(&[], r#"{"query": "one"}"#), false).unwrap();
        assert_eq!(row, Row::new(vec![Datum::from("one"), Datum::from("manul")]));

        // A supplied value overrides the default.
        let row = schema
            .bind(params(&[], r#"{"query": "one", "user": "sergey"}"#), false)
            .unwrap();
        assert_eq!(row, Row::new(vec![Datum::from("one"), Datum::from("sergey")]));
    }

    #[test]
    fn missing_required_field() {
        assert_eq!(
            query_schema().bind(params(&[], r#"{"query": "one"}"#), false),
            Err(BindError::MissingField("user".into()))
        );
    }

    #[test]
    fn nullable_fields() {
        let schema = Schema::new()
            .with_field("k", ScalarType::Int64.nullable(false))
            .with_field("note", ScalarType::String.nullable(true));
        assert_eq!(
            schema.bind(params(&[], r#"{"k": 1}"#), false),
            Ok(Row::new(vec![Datum::from(1_i64), Datum::Null]))
        );
        assert_eq!(
            schema.bind(params(&[], r#"{"k": 1, "note": null}"#), false),
            Ok(Row::new(vec![Datum::from(1_i64), Datum::Null]))
        );
        assert_eq!(
            schema.bind(params(&[], r#"{"k": null}"#), false),
            Err(BindError::NullField("k".into()))
        );
    }

    #[test]
    fn body_takes_precedence_by_default() {
        let query = vec![("user".to_string(), "query-user".to_string())];
        let body = br#"{"query": "one", "user": "body-user"}"#;

        let body_first =
            Params::from_request(query.clone(), body, ParamPrecedence::BodyFirst).unwrap();
        assert_eq!(
            query_schema().bind(body_first, false).unwrap().get(1),
            Some(&Datum::from("body-user"))
        );

        let query_first = Params::from_request(query, body, ParamPrecedence::QueryFirst).unwrap();
        assert_eq!(
            query_schema().bind(query_first, false).unwrap().get(1),
            Some(&Datum::from("query-user"))
        );
    }

    #[test]
    fn coerces_types() {
        let schema = Schema::new()
            .with_field("b", ScalarType::Bool.nullable(false))
            .with_field("i", ScalarType::Int64.nullable(false))
            .with_field("f", ScalarType::Float64.nullable(false))
            .with_field("j", ScalarType::Jsonb.nullable(false));

        let row = schema
            .bind(params(&[("b", "true"), ("i", "-3"), ("f", "2.5"), ("j", "[1]")], ""), false)
            .unwrap();
        assert_eq!(
            row,
            Row::new(vec![
                Datum::from(true),
                Datum::from(-3_i64),
                Datum::from(2.5),
                Datum::Jsonb(Jsonb::from_value(&serde_json::json!([1]))),
            ])
        );

        // JSON integers are valid floats, and quoted scalars are parsed.
        let row = schema
            .bind(
                params(&[], r#"{"b": "false", "i": "7", "f": 2, "j": {"x": "y"}}"#),
                false,
            )
            .unwrap();
        assert_eq!(row.get(1), Some(&Datum::from(7_i64)));
        assert_eq!(row.get(2), Some(&Datum::from(2.0)));
    }

    #[test]
    fn rejects_wrong_types() {
        let schema = Schema::new().with_field("k", ScalarType::Int64.nullable(false));
        for body in [r#"{"k": "one"}"#, r#"{"k": 1.5}"#, r#"{"k": [1]}"#, r#"{"k": true}"#] {
            assert!(
                matches!(
                    schema.bind(params(&[], body), false),
                    Err(BindError::InvalidField { .. })
                ),
                "{body}"
            );
        }
        let schema = Schema::new().with_field("s", ScalarType::String.nullable(false));
        assert!(matches!(
            schema.bind(params(&[], r#"{"s": 1}"#), false),
            Err(BindError::InvalidField { .. })
        ));
    }

    #[test]
    fn unknown_fields() {
        let p = params(&[("debug", "1")], r#"{"query": "one", "user": "sergey"}"#);
        assert!(query_schema().bind(p.clone(), false).is_ok());
        assert_eq!(
            query_schema().bind(p, true),
            Err(BindError::UnknownField("debug".into()))
        );
    }

    #[test]
    fn rejects_non_object_bodies() {
        for body in ["[1, 2]", "\"one\"", "{", "null"] {
            assert!(
                matches!(
                    Params::from_request(vec![], body.as_bytes(), ParamPrecedence::BodyFirst),
                    Err(BindError::InvalidBody(_))
                ),
                "{body}"
            );
        }
        assert!(Params::from_request(vec![], b"  \n", ParamPrecedence::BodyFirst)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn schema_from_json() {
        let schema = Schema::from_json(
            r#"{"query": {"type": "string"}, "user": {"type": "string", "default": "manul"}}"#,
        )
        .unwrap();
        assert_eq!(
            schema,
            Schema::new()
                .with_field("query", ScalarType::String.nullable(false))
                .with_default("user", ScalarType::String.nullable(false), "manul")
        );

        assert!(matches!(
            Schema::from_json(r#"{"k": {"type": "int", "default": "many"}}"#),
            Err(ConfigError::InvalidDefault { .. })
        ));
        assert!(matches!(
            Schema::from_json(r#"{"k": {"type": "decimal"}}"#),
            Err(ConfigError::InvalidSchema(_))
        ));
        assert!(matches!(
            Schema::from_json(r#"{"k": {"type": "id"}}"#),
            Err(ConfigError::InvalidFieldType { .. })
        ));
    }

    #[test]
    fn validate_rejects_bad_schemas() {
        let int = ScalarType::Int64.nullable(false);
        assert_eq!(
            Schema::new().with_field("k", int).with_field("k", int).validate(),
            Err(ConfigError::DuplicateField("k".into()))
        );
        assert_eq!(
            Schema::new().with_field("", int).validate(),
            Err(ConfigError::EmptyFieldName)
        );
        assert!(matches!(
            Schema::new().with_default("k", int, "one").validate(),
            Err(ConfigError::InvalidDefault { .. })
        ));
    }

    proptest! {
        #[test]
        fn proptest_bind_never_panics(
            query: Vec<(String, String)>,
            body: Vec<u8>,
            strict: bool,
        ) {
            let schema = Schema::new()
                .with_field("b", ScalarType::Bool.nullable(true))
                .with_field("i", ScalarType::Int64.nullable(false))
                .with_default("f", ScalarType::Float64.nullable(false), 0.5)
                .with_field("s", ScalarType::String.nullable(false))
                .with_field("j", ScalarType::Jsonb.nullable(true));
            if let Ok(params) = Params::from_request(query, &body, ParamPrecedence::BodyFirst) {
                let _ = schema.bind(params, strict);
            }
        }

        #[test]
        fn proptest_bound_rows_match_desc(
            i in any::<i64>(),
            s in ".*",
            user in proptest::option::of(".*"),
        ) {
            let schema = Schema::new()
                .with_field("i", ScalarType::Int64.nullable(false))
                .with_field("s", ScalarType::String.nullable(false))
                .with_default("user", ScalarType::String.nullable(false), "manul");
            let mut body = serde_json::json!({"i": i, "s": s});
            if let Some(user) = &user {
                body["user"] = serde_json::Value::String(user.clone());
            }
            let params = Params::from_request(
                vec![],
                body.to_string().as_bytes(),
                ParamPrecedence::BodyFirst,
            ).unwrap();
            let row = schema.bind(params, true).unwrap();
            let desc = schema.desc();
            prop_assert_eq!(row.len(), desc.arity());
            for (datum, (_, typ)) in row.iter().zip(desc.iter()) {
                prop_assert!(datum.is_instance_of(typ));
            }
            prop_assert_eq!(
                row.get(2),
                Some(&Datum::from(user.unwrap_or_else(|| "manul".into())))
            );
        }
    }
}

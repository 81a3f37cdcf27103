//! Attribute value transformation.
//!
//! Once an assertion is trusted its attribute values are converted into
//! [`TypedValue`]s for the relying application. The conversion is a
//! pluggable strategy; failures are [`SamlError::Transformation`] errors and
//! say nothing about whether the assertion itself is trustworthy.

use std::collections::BTreeMap;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::types::{AttributeStatement, AttributeValue, NameId, SAML_NS};
use crate::xml::XmlElement;

/// An attribute value converted for the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    /// Text.
    String(String),
    /// `xs:integer` and its restrictions.
    Integer(i64),
    /// `xs:boolean`.
    Boolean(bool),
    /// `xs:dateTime`.
    DateTime(DateTime<Utc>),
    /// Decoded binary content.
    Binary(Vec<u8>),
    /// A `saml:NameID` value.
    NameId(NameId),
    /// Any other XML value, canonicalized.
    Xml(String),
    /// An `xsi:nil` value.
    Null,
}

impl TypedValue {
    /// Returns the string content of a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }
}

/// Transformed attributes by name, each with its values in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformedAttributes(BTreeMap<String, Vec<TypedValue>>);

impl TransformedAttributes {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends values to an attribute.
    pub fn extend(&mut self, name: impl Into<String>, values: impl IntoIterator<Item = TypedValue>) {
        self.0.entry(name.into()).or_default().extend(values);
    }

    /// Merges another set into this one.
    pub fn merge(&mut self, other: Self) {
        for (name, values) in other.0 {
            self.extend(name, values);
        }
    }

    /// Values of an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[TypedValue]> {
        self.0.get(name).map(Vec::as_slice)
    }

    /// First value of an attribute.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&TypedValue> {
        self.get(name).and_then(<[TypedValue]>::first)
    }

    /// Iterates over attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[TypedValue])> {
        self.0.iter().map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Converts the attributes of a statement.
pub trait Transformer: Send + Sync {
    /// Transforms every plaintext attribute of the statement.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Transformation`] if a value cannot be converted.
    fn transform(&self, statement: &AttributeStatement) -> SamlResult<TransformedAttributes>;
}

/// Converts values according to their `xsi:type`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypedValueTransformer;

impl Transformer for TypedValueTransformer {
    fn transform(&self, statement: &AttributeStatement) -> SamlResult<TransformedAttributes> {
        let mut transformed = TransformedAttributes::new();
        for attribute in &statement.attributes {
            let values = attribute
                .values
                .iter()
                .map(|value| typed_value(value).map_err(|reason| transformation(&attribute.name, reason)))
                .collect::<SamlResult<Vec<_>>>()?;
            transformed.extend(attribute.name.as_str(), values);
        }
        Ok(transformed)
    }
}

fn typed_value(value: &AttributeValue) -> Result<TypedValue, String> {
    match value {
        AttributeValue::Nil => Ok(TypedValue::Null),
        AttributeValue::Element(element) => Ok(element_value(element)),
        AttributeValue::Text { xsi_type, value } => {
            let local_type = xsi_type
                .as_deref()
                .map(|t| t.rsplit(':').next().unwrap_or(t));
            match local_type {
                Some(
                    "integer" | "int" | "long" | "short" | "byte" | "nonNegativeInteger"
                    | "positiveInteger" | "negativeInteger" | "nonPositiveInteger",
                ) => value
                    .trim()
                    .parse()
                    .map(TypedValue::Integer)
                    .map_err(|e| format!("invalid integer: {e}")),
                Some("boolean") => match value.trim() {
                    "true" | "1" => Ok(TypedValue::Boolean(true)),
                    "false" | "0" => Ok(TypedValue::Boolean(false)),
                    other => Err(format!("invalid boolean '{other}'")),
                },
                Some("dateTime") => DateTime::parse_from_rfc3339(value.trim())
                    .map(|instant| TypedValue::DateTime(instant.with_timezone(&Utc)))
                    .map_err(|e| format!("invalid dateTime: {e}")),
                Some("base64Binary") => decode_base64(value).map(TypedValue::Binary),
                _ => Ok(TypedValue::String(value.clone())),
            }
        }
    }
}

fn element_value(element: &XmlElement) -> TypedValue {
    if element.is(SAML_NS, "NameID") {
        TypedValue::NameId(NameId::from_element(element))
    } else {
        TypedValue::Xml(element.canonicalize())
    }
}

/// Decodes base64 encoded values.
///
/// A value may hold several base64 chunks separated by `_`; each chunk is
/// decoded into its own value. Decoded text that is valid UTF-8 becomes a
/// string, anything else stays binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Transformer;

impl Transformer for Base64Transformer {
    fn transform(&self, statement: &AttributeStatement) -> SamlResult<TransformedAttributes> {
        let mut transformed = TransformedAttributes::new();
        for attribute in &statement.attributes {
            let mut values = Vec::new();
            for value in &attribute.values {
                match value {
                    AttributeValue::Nil => values.push(TypedValue::Null),
                    AttributeValue::Element(_) => {
                        return Err(transformation(
                            &attribute.name,
                            "expected base64 text, found an XML element",
                        ));
                    }
                    AttributeValue::Text { value, .. } => {
                        for chunk in value.split('_') {
                            let bytes = decode_base64(chunk)
                                .map_err(|reason| transformation(&attribute.name, reason))?;
                            values.push(match String::from_utf8(bytes) {
                                Ok(text) => TypedValue::String(text),
                                Err(e) => TypedValue::Binary(e.into_bytes()),
                            });
                        }
                    }
                }
            }
            transformed.extend(attribute.name.as_str(), values);
        }
        Ok(transformed)
    }
}

fn decode_base64(value: &str) -> Result<Vec<u8>, String> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| format!("invalid base64: {e}"))
}

fn transformation(attribute: &str, reason: impl Into<String>) -> SamlError {
    let reason = reason.into();
    tracing::warn!(attribute, reason = %reason, "Attribute transformation failed");
    SamlError::Transformation {
        attribute: attribute.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Attribute, XSI_NS};

    fn statement(attributes: Vec<Attribute>) -> AttributeStatement {
        AttributeStatement {
            attributes,
            encrypted_attributes: Vec::new(),
        }
    }

    #[test]
    fn converts_by_schema_type() {
        let statement = statement(vec![
            Attribute::single("mail", "a@b.c"),
            Attribute::new("age").with_value(AttributeValue::typed("xs:integer", " 42 ")),
            Attribute::new("admin").with_value(AttributeValue::typed("xs:boolean", "true")),
            Attribute::new("since").with_value(AttributeValue::typed("xs:dateTime", "2024-01-02T03:04:05Z")),
            Attribute::new("photo").with_value(AttributeValue::typed("xs:base64Binary", "AQID")),
            Attribute::new("nothing").with_value(AttributeValue::Nil),
            Attribute::new("plain").with_value(AttributeValue::untyped("x")),
        ]);
        let transformed = TypedValueTransformer.transform(&statement).unwrap();

        assert_eq!(transformed.first("mail").and_then(TypedValue::as_str), Some("a@b.c"));
        assert_eq!(transformed.first("age"), Some(&TypedValue::Integer(42)));
        assert_eq!(transformed.first("admin"), Some(&TypedValue::Boolean(true)));
        assert!(matches!(transformed.first("since"), Some(TypedValue::DateTime(_))));
        assert_eq!(transformed.first("photo"), Some(&TypedValue::Binary(vec![1, 2, 3])));
        assert_eq!(transformed.first("nothing"), Some(&TypedValue::Null));
        assert_eq!(transformed.first("plain").and_then(TypedValue::as_str), Some("x"));
    }

    #[test]
    fn keeps_value_order() {
        let statement = statement(vec![Attribute::multi(
            "groups",
            vec!["b".to_string(), "a".to_string(), "c".to_string()],
        )]);
        let transformed = TypedValueTransformer.transform(&statement).unwrap();
        let groups: Vec<_> = transformed
            .get("groups")
            .unwrap()
            .iter()
            .filter_map(TypedValue::as_str)
            .collect();
        assert_eq!(groups, ["b", "a", "c"]);
    }

    #[test]
    fn unwraps_name_id_and_keeps_other_xml() {
        let name_id = NameId::persistent("user-1");
        let other = XmlElement::new("urn:example", "ex", "Thing").with_text("v");
        let statement = statement(vec![Attribute::new("id")
            .with_value(AttributeValue::Element(name_id.to_element()))
            .with_value(AttributeValue::Element(other))]);

        let transformed = TypedValueTransformer.transform(&statement).unwrap();
        let values = transformed.get("id").unwrap();
        assert_eq!(values[0], TypedValue::NameId(name_id));
        assert!(matches!(&values[1], TypedValue::Xml(xml) if xml.contains("urn:example")));
    }

    #[test]
    fn invalid_typed_value_is_a_transformation_error() {
        let statement = statement(vec![
            Attribute::new("age").with_value(AttributeValue::typed("xs:integer", "forty")),
        ]);
        let err = TypedValueTransformer.transform(&statement).unwrap_err();
        assert!(matches!(err, SamlError::Transformation { attribute, .. } if attribute == "age"));
    }

    #[test]
    fn base64_values_split_on_underscore() {
        let statement = statement(vec![
            Attribute::new("roles").with_value(AttributeValue::untyped("YWRtaW4=_dXNlcg==")),
            Attribute::new("raw").with_value(AttributeValue::untyped("/w==")),
        ]);
        let transformed = Base64Transformer.transform(&statement).unwrap();

        let roles: Vec<_> = transformed
            .get("roles")
            .unwrap()
            .iter()
            .filter_map(TypedValue::as_str)
            .collect();
        assert_eq!(roles, ["admin", "user"]);
        assert_eq!(transformed.first("raw"), Some(&TypedValue::Binary(vec![0xff])));
    }

    #[test]
    fn base64_rejects_invalid_input() {
        let garbage = statement(vec![Attribute::new("x").with_value(AttributeValue::untyped("***"))]);
        assert!(matches!(
            Base64Transformer.transform(&garbage),
            Err(SamlError::Transformation { .. })
        ));

        let element = XmlElement::new(XSI_NS, "xsi", "nil");
        let structured =
            statement(vec![Attribute::new("x").with_value(AttributeValue::Element(element))]);
        assert!(Base64Transformer.transform(&structured).is_err());
    }

    #[test]
    fn merge_appends_values() {
        let mut first = TransformedAttributes::new();
        first.extend("mail", [TypedValue::String("a".to_string())]);
        let mut second = TransformedAttributes::new();
        second.extend("mail", [TypedValue::String("b".to_string())]);
        second.extend("cn", [TypedValue::String("c".to_string())]);

        first.merge(second);
        assert_eq!(first.len(), 2);
        assert_eq!(first.get("mail").unwrap().len(), 2);
    }
}

//! Namespace-aware XML tree used for assertion parsing and signing.
//!
//! Assertions arrive as XML and their signatures are computed over a
//! canonical serialization, so the crate keeps a small owned DOM rather
//! than mapping straight into typed structs. Parsing uses `quick-xml`'s
//! namespace resolving reader; serialization follows exclusive XML
//! canonicalization (no comments, sorted attributes, namespace
//! declarations emitted only where a prefix is visibly used).
//!
//! Text is kept exactly as parsed, whitespace included, after XML line
//! ending and attribute value normalization. Digests are computed over it.

mod saml;

use std::borrow::Cow;
use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};

/// An XML attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlAttribute {
    /// Qualified name as written, e.g. `xsi:type`.
    pub name: String,
    /// Namespace URI of a prefixed attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Unescaped value.
    pub value: String,
}

impl XmlAttribute {
    /// Returns the local part of the attribute name.
    #[must_use]
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    fn is_namespace_declaration(&self) -> bool {
        self.name == "xmlns" || self.name.starts_with("xmlns:")
    }
}

/// A child node of an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum XmlNode {
    /// A nested element.
    Element(XmlElement),
    /// Character data.
    Text(String),
}

/// An XML element with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlElement {
    /// Prefix the element was written with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Local name.
    pub local_name: String,
    /// Namespace URI the element belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Attributes in document order, namespace declarations included.
    #[serde(default)]
    pub attributes: Vec<XmlAttribute>,
    /// Child nodes in document order.
    #[serde(default)]
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Creates an empty element in the given namespace.
    #[must_use]
    pub fn new(namespace: &str, prefix: &str, local_name: &str) -> Self {
        Self {
            prefix: Some(prefix.to_string()),
            local_name: local_name.to_string(),
            namespace: Some(namespace.to_string()),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds an unqualified attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.push(XmlAttribute {
            name: name.to_string(),
            namespace: None,
            value: value.into(),
        });
        self
    }

    /// Adds an unqualified attribute when a value is present.
    #[must_use]
    pub fn with_optional_attribute(self, name: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.with_attribute(name, value),
            None => self,
        }
    }

    /// Adds a namespace-qualified attribute such as `xsi:type`.
    #[must_use]
    pub fn with_qualified_attribute(
        mut self,
        namespace: &str,
        name: &str,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.push(XmlAttribute {
            name: name.to_string(),
            namespace: Some(namespace.to_string()),
            value: value.into(),
        });
        self
    }

    /// Declares a namespace prefix on this element.
    #[must_use]
    pub fn with_namespace_declaration(mut self, prefix: &str, namespace: &str) -> Self {
        self.attributes.push(XmlAttribute {
            name: format!("xmlns:{prefix}"),
            namespace: None,
            value: namespace.to_string(),
        });
        self
    }

    /// Appends a child element.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    /// Appends text content.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    /// Returns true if the element has the given namespace and local name.
    #[must_use]
    pub fn is(&self, namespace: &str, local_name: &str) -> bool {
        self.local_name == local_name && self.namespace.as_deref() == Some(namespace)
    }

    /// Returns the qualified name as written.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.local_name),
            None => self.local_name.clone(),
        }
    }

    /// Returns the value of an unqualified attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.namespace.is_none() && attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// Returns the value of a namespace-qualified attribute.
    #[must_use]
    pub fn qualified_attribute(&self, namespace: &str, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| {
                attr.namespace.as_deref() == Some(namespace) && attr.local_name() == local_name
            })
            .map(|attr| attr.value.as_str())
    }

    /// Iterates over child elements.
    pub fn elements(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// Iterates over child elements with the given name.
    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a Self> + 'a {
        self.elements()
            .filter(move |element| element.is(namespace, local_name))
    }

    /// Returns the first child element with the given name.
    #[must_use]
    pub fn child(&self, namespace: &str, local_name: &str) -> Option<&Self> {
        self.elements().find(|element| element.is(namespace, local_name))
    }

    /// Returns the first child element with the given name or an error.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::MissingElement`] if there is no such child.
    pub fn required_child(&self, namespace: &str, local_name: &str) -> SamlResult<&Self> {
        self.child(namespace, local_name).ok_or_else(|| {
            SamlError::MissingElement(format!("{local_name} in {}", self.local_name))
        })
    }

    /// Returns the concatenated text content of this element and its descendants.
    #[must_use]
    pub fn text(&self) -> String {
        let mut text = String::new();
        self.collect_text(&mut text);
        text
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                XmlNode::Text(value) => out.push_str(value),
                XmlNode::Element(element) => element.collect_text(out),
            }
        }
    }

    /// Returns the trimmed text content, or `None` if it is empty.
    #[must_use]
    pub fn trimmed_text(&self) -> Option<String> {
        let text = self.text();
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// Returns a copy of this element without the first direct child that
    /// matches the given name.
    #[must_use]
    pub fn without_child(&self, namespace: &str, local_name: &str) -> Self {
        let mut copy = self.clone();
        if let Some(index) = copy.children.iter().position(
            |node| matches!(node, XmlNode::Element(element) if element.is(namespace, local_name)),
        ) {
            copy.children.remove(index);
        }
        copy
    }

    /// Inserts a child element at the given position among the children.
    pub fn insert_child(&mut self, index: usize, child: Self) {
        let index = index.min(self.children.len());
        self.children.insert(index, XmlNode::Element(child));
    }

    /// Parses a document and returns its root element.
    ///
    /// Comments, processing instructions, the XML declaration and
    /// whitespace outside the root element are dropped. Adjacent text and
    /// CDATA sections merge into one text node.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::XmlParse`] for malformed XML or an unbound prefix.
    pub fn parse(xml: &str) -> SamlResult<Self> {
        let mut reader = NsReader::from_str(xml);
        reader.config_mut().expand_empty_elements = true;

        let mut stack: Vec<Self> = Vec::new();
        let mut root: Option<Self> = None;

        loop {
            let (resolved, event) = reader.read_resolved_event()?;
            match event {
                Event::Start(start) => {
                    if root.is_some() {
                        return Err(SamlError::XmlParse(
                            "content after document element".to_string(),
                        ));
                    }
                    let namespace = resolved_namespace(resolved)?;
                    let name = start.name();
                    let prefix = name
                        .prefix()
                        .map(|prefix| std::str::from_utf8(prefix.as_ref()).map(str::to_string))
                        .transpose()?;
                    let local_name = std::str::from_utf8(name.local_name().as_ref())?.to_string();

                    let mut attributes = Vec::new();
                    for attr in start.attributes() {
                        let attr = attr?;
                        let name = std::str::from_utf8(attr.key.as_ref())?.to_string();
                        let value = attribute_value(std::str::from_utf8(&attr.value)?)?;
                        let namespace = if name == "xmlns" || name.starts_with("xmlns:") {
                            None
                        } else {
                            let (resolved, _) = reader.resolve_attribute(attr.key);
                            resolved_namespace(resolved)?
                        };
                        attributes.push(XmlAttribute {
                            name,
                            namespace,
                            value,
                        });
                    }

                    stack.push(Self {
                        prefix,
                        local_name,
                        namespace,
                        attributes,
                        children: Vec::new(),
                    });
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| SamlError::XmlParse("unbalanced end tag".to_string()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::Element(element)),
                        None => root = Some(element),
                    }
                }
                Event::Text(text) => {
                    let value = text_value(std::str::from_utf8(&text)?)?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_text(value),
                        None if value.trim().is_empty() => {}
                        None => {
                            return Err(SamlError::XmlParse(
                                "text outside of document element".to_string(),
                            ));
                        }
                    }
                }
                Event::CData(data) => {
                    let value = normalize_line_endings(std::str::from_utf8(&data)?).into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.push_text(value);
                    }
                }
                Event::DocType(_) => {
                    return Err(SamlError::XmlParse(
                        "document type declarations are not allowed".to_string(),
                    ));
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(SamlError::XmlParse("unexpected end of document".to_string()));
        }
        root.ok_or_else(|| SamlError::XmlParse("document has no root element".to_string()))
    }

    fn push_text(&mut self, value: String) {
        if let Some(XmlNode::Text(previous)) = self.children.last_mut() {
            previous.push_str(&value);
        } else {
            self.children.push(XmlNode::Text(value));
        }
    }

    /// Serializes this element in canonical form.
    ///
    /// The output is independent of where namespace declarations appeared in
    /// the source document, so a subtree canonicalizes the same whether it is
    /// serialized alone or inside a larger message.
    #[must_use]
    pub fn canonicalize(&self) -> String {
        self.canonicalize_with_prefixes(&[])
    }

    /// Serializes this element in canonical form, additionally rendering
    /// the listed prefixes wherever they are declared in scope and not yet
    /// rendered, as the `InclusiveNamespaces` `PrefixList` parameter
    /// requires. `#default` stands for the default namespace.
    ///
    /// Only declarations made on this element or its descendants are known.
    #[must_use]
    pub fn canonicalize_with_prefixes(&self, inclusive_prefixes: &[String]) -> String {
        let mut out = String::new();
        let options = WriteOptions {
            keep_declarations: false,
            inclusive_prefixes,
        };
        self.write(&mut out, &BTreeMap::new(), &BTreeMap::new(), &options);
        out
    }

    /// Serializes this element for transmission.
    ///
    /// Like [`canonicalize`](Self::canonicalize) but keeps namespace
    /// declarations that were written explicitly, so prefixes referenced
    /// from attribute values (such as `xs:string`) stay resolvable.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        let options = WriteOptions {
            keep_declarations: true,
            inclusive_prefixes: &[],
        };
        self.write(&mut out, &BTreeMap::new(), &BTreeMap::new(), &options);
        out
    }

    /// `rendered` holds the declarations already output by ancestors,
    /// `declared` those made by ancestors in the source.
    fn write(
        &self,
        out: &mut String,
        rendered: &BTreeMap<String, String>,
        declared: &BTreeMap<String, String>,
        options: &WriteOptions<'_>,
    ) {
        let mut scope = rendered.clone();
        let mut declared = declared.clone();
        let mut declarations: BTreeMap<String, String> = BTreeMap::new();

        for attr in self.attributes.iter().filter(|attr| attr.is_namespace_declaration()) {
            let prefix = attr.name.strip_prefix("xmlns:").unwrap_or_default();
            if prefix != XML_PREFIX {
                declared.insert(prefix.to_string(), attr.value.clone());
            }
        }

        let element_prefix = self.prefix.clone().unwrap_or_default();
        let element_namespace = self.namespace.clone().unwrap_or_default();
        if needs_declaration(&scope, &element_prefix, &element_namespace) {
            declarations.insert(element_prefix, element_namespace);
        }

        for attr in &self.attributes {
            if attr.is_namespace_declaration() {
                if options.keep_declarations {
                    let prefix = attr.name.strip_prefix("xmlns:").unwrap_or_default();
                    if prefix != XML_PREFIX && scope.get(prefix) != Some(&attr.value) {
                        declarations
                            .entry(prefix.to_string())
                            .or_insert_with(|| attr.value.clone());
                    }
                }
                continue;
            }
            if let (Some(prefix), Some(namespace)) = (attr.prefix(), attr.namespace.as_ref()) {
                if prefix != XML_PREFIX && scope.get(prefix) != Some(namespace) {
                    declarations.insert(prefix.to_string(), namespace.clone());
                }
            }
        }

        for listed in options.inclusive_prefixes {
            let prefix = if listed == DEFAULT_PREFIX_TOKEN { "" } else { listed.as_str() };
            if let Some(namespace) = declared.get(prefix) {
                if needs_declaration(&scope, prefix, namespace) {
                    declarations
                        .entry(prefix.to_string())
                        .or_insert_with(|| namespace.clone());
                }
            }
        }

        let qualified_name = self.qualified_name();
        out.push('<');
        out.push_str(&qualified_name);

        for (prefix, namespace) in &declarations {
            if prefix.is_empty() {
                out.push_str(" xmlns=\"");
            } else {
                out.push_str(" xmlns:");
                out.push_str(prefix);
                out.push_str("=\"");
            }
            escape_attribute(namespace, out);
            out.push('"');
            scope.insert(prefix.clone(), namespace.clone());
        }

        let mut attributes: Vec<&XmlAttribute> = self
            .attributes
            .iter()
            .filter(|attr| !attr.is_namespace_declaration())
            .collect();
        attributes.sort_by(|a, b| {
            let a_key = (a.namespace.as_deref().unwrap_or(""), a.local_name());
            let b_key = (b.namespace.as_deref().unwrap_or(""), b.local_name());
            a_key.cmp(&b_key)
        });
        for attr in attributes {
            out.push(' ');
            out.push_str(&attr.name);
            out.push_str("=\"");
            escape_attribute(&attr.value, out);
            out.push('"');
        }
        out.push('>');

        for node in &self.children {
            match node {
                XmlNode::Element(child) => child.write(out, &scope, &declared, options),
                XmlNode::Text(text) => escape_text(text, out),
            }
        }

        out.push_str("</");
        out.push_str(&qualified_name);
        out.push('>');
    }
}

const XML_PREFIX: &str = "xml";
const DEFAULT_PREFIX_TOKEN: &str = "#default";

struct WriteOptions<'a> {
    keep_declarations: bool,
    inclusive_prefixes: &'a [String],
}

/// Whether `prefix` must be declared given what ancestors already rendered.
/// An empty default namespace needs no declaration until a non-empty one
/// has been rendered.
fn needs_declaration(rendered: &BTreeMap<String, String>, prefix: &str, namespace: &str) -> bool {
    match rendered.get(prefix) {
        Some(bound) => bound != namespace,
        None => !(prefix.is_empty() && namespace.is_empty()),
    }
}

/// Replaces `\r\n` and lone `\r` with `\n`.
fn normalize_line_endings(raw: &str) -> Cow<'_, str> {
    if raw.contains('\r') {
        Cow::Owned(raw.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(raw)
    }
}

fn text_value(raw: &str) -> SamlResult<String> {
    let normalized = normalize_line_endings(raw);
    quick_xml::escape::unescape(&normalized)
        .map(Cow::into_owned)
        .map_err(|e| SamlError::XmlParse(e.to_string()))
}

/// Literal tabs and line breaks in attribute values become spaces; escaped
/// ones survive.
fn attribute_value(raw: &str) -> SamlResult<String> {
    let normalized: String = normalize_line_endings(raw)
        .chars()
        .map(|c| if matches!(c, '\t' | '\n') { ' ' } else { c })
        .collect();
    quick_xml::escape::unescape(&normalized)
        .map(Cow::into_owned)
        .map_err(|e| SamlError::XmlParse(e.to_string()))
}

fn resolved_namespace(resolved: ResolveResult<'_>) -> SamlResult<Option<String>> {
    match resolved {
        ResolveResult::Bound(namespace) => Ok(Some(
            std::str::from_utf8(namespace.as_ref())?.to_string(),
        )),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(SamlError::XmlParse(format!(
            "unbound namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SAML_NS, XSI_NS};

    #[test]
    fn parse_resolves_namespaces() {
        let xml = r#"<?xml version="1.0"?>
            <saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_a1">
                <!-- comment -->
                <saml:Issuer>https://idp.example.com</saml:Issuer>
            </saml:Assertion>"#;

        let root = XmlElement::parse(xml).unwrap();
        assert!(root.is(SAML_NS, "Assertion"));
        assert_eq!(root.attribute("ID"), Some("_a1"));

        let issuer = root.child(SAML_NS, "Issuer").unwrap();
        assert_eq!(issuer.text(), "https://idp.example.com");
        assert_eq!(root.elements().count(), 1);
    }

    #[test]
    fn parse_rejects_unbound_prefix() {
        let result = XmlElement::parse("<saml:Assertion/>");
        assert!(matches!(result, Err(SamlError::XmlParse(_))));
    }

    #[test]
    fn parse_rejects_doctype() {
        let xml = r#"<!DOCTYPE foo [<!ENTITY x "y">]><foo>&x;</foo>"#;
        assert!(XmlElement::parse(xml).is_err());
    }

    #[test]
    fn parse_rejects_unterminated_document() {
        assert!(XmlElement::parse("<a><b></b>").is_err());
    }

    #[test]
    fn canonical_form_sorts_attributes_and_expands_empty_elements() {
        let xml = r#"<a:root xmlns:a="urn:a" z="1" b="2"><a:empty/></a:root>"#;
        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(
            root.canonicalize(),
            r#"<a:root xmlns:a="urn:a" b="2" z="1"><a:empty></a:empty></a:root>"#
        );
    }

    #[test]
    fn canonical_form_ignores_declaration_placement() {
        let nested = r#"<p:outer xmlns:p="urn:p" xmlns:s="urn:s"><s:inner Id="x">v</s:inner></p:outer>"#;
        let standalone = r#"<s:inner xmlns:s="urn:s" Id="x">v</s:inner>"#;

        let outer = XmlElement::parse(nested).unwrap();
        let inner = outer.child("urn:s", "inner").unwrap();
        let alone = XmlElement::parse(standalone).unwrap();

        assert_eq!(inner.canonicalize(), alone.canonicalize());
    }

    #[test]
    fn canonical_form_drops_unused_declarations() {
        let xml = r#"<a:root xmlns:a="urn:a" xmlns:unused="urn:unused"/>"#;
        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(root.canonicalize(), r#"<a:root xmlns:a="urn:a"></a:root>"#);
        assert!(root.to_xml().contains("xmlns:unused"));
    }

    #[test]
    fn built_elements_declare_their_namespaces() {
        let element = XmlElement::new(SAML_NS, "saml", "AttributeValue")
            .with_qualified_attribute(XSI_NS, "xsi:type", "xs:string")
            .with_text("a < b");

        let xml = element.canonicalize();
        assert!(xml.contains(r#"xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion""#));
        assert!(xml.contains(r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#));
        assert!(xml.contains("a &lt; b"));

        let reparsed = XmlElement::parse(&xml).unwrap();
        assert_eq!(reparsed.qualified_attribute(XSI_NS, "type"), Some("xs:string"));
        assert_eq!(reparsed.text(), "a < b");
    }

    #[test]
    fn canonical_form_keeps_whitespace_text() {
        let xml = "<a:r xmlns:a=\"urn:a\">\n  <a:b>x</a:b>\n</a:r>";
        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(root.canonicalize(), xml);
        assert_eq!(root.elements().count(), 1);
        assert_eq!(root.child("urn:a", "b").unwrap().text(), "x");
    }

    #[test]
    fn parse_normalizes_line_endings() {
        let xml = "<r a=\"1\r\n2\t3&#xA;4\">x\r\ny\rz&#xD;</r>";
        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(root.attribute("a"), Some("1 2 3\n4"));
        assert_eq!(root.text(), "x\ny\nz\r");
        assert_eq!(root.canonicalize(), "<r a=\"1 2 3&#xA;4\">x\ny\nz&#xD;</r>");
    }

    #[test]
    fn text_and_cdata_merge() {
        let root = XmlElement::parse("<r>a &amp; <![CDATA[<b>]]> c</r>").unwrap();
        assert_eq!(root.children, vec![XmlNode::Text("a & <b> c".to_string())]);
        assert_eq!(root.canonicalize(), "<r>a &amp; &lt;b&gt; c</r>");
    }

    #[test]
    fn canonical_form_never_declares_xml_prefix() {
        let root = XmlElement::parse(r#"<r xml:lang="en"/>"#).unwrap();
        assert_eq!(root.canonicalize(), r#"<r xml:lang="en"></r>"#);
        assert_eq!(root.to_xml(), r#"<r xml:lang="en"></r>"#);
    }

    #[test]
    fn empty_default_namespace_is_undeclared_under_default() {
        let root = XmlElement::parse(r#"<r xmlns="urn:d"><c xmlns=""/></r>"#).unwrap();
        assert_eq!(root.canonicalize(), r#"<r xmlns="urn:d"><c xmlns=""></c></r>"#);
    }

    #[test]
    fn inclusive_prefixes_are_rendered_where_declared() {
        let xml = r#"<a:r xmlns:a="urn:a" xmlns:xs="urn:xs"><a:v t="xs:string">x</a:v></a:r>"#;
        let root = XmlElement::parse(xml).unwrap();

        assert_eq!(
            root.canonicalize(),
            r#"<a:r xmlns:a="urn:a"><a:v t="xs:string">x</a:v></a:r>"#
        );
        assert_eq!(
            root.canonicalize_with_prefixes(&["xs".to_string(), "unknown".to_string()]),
            r#"<a:r xmlns:a="urn:a" xmlns:xs="urn:xs"><a:v t="xs:string">x</a:v></a:r>"#
        );
    }

    #[test]
    fn without_child_removes_first_match() {
        let root = XmlElement::new("urn:a", "a", "root")
            .with_child(XmlElement::new("urn:a", "a", "sig"))
            .with_child(XmlElement::new("urn:a", "a", "body"));

        let stripped = root.without_child("urn:a", "sig");
        assert_eq!(stripped.elements().count(), 1);
        assert!(stripped.child("urn:a", "sig").is_none());
        assert_eq!(root.elements().count(), 2);
    }
}

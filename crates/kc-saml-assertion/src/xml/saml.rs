//! Mapping between SAML types and XML elements.

use chrono::{DateTime, SecondsFormat, Utc};

use super::XmlElement;
use crate::error::{SamlError, SamlResult};
use crate::types::{
    Assertion, Attribute, AttributeStatement, AttributeValue, AudienceRestriction, AuthnContext,
    AuthnStatement, Conditions, EncryptedAssertion, EncryptedAttribute, EncryptedData,
    EncryptedElement, EncryptedId, EncryptedKey, EncryptionMethod, KeyInfo, NameId, ProxyRestriction,
    Statement, Subject, SubjectConfirmation, SubjectConfirmationData, SubjectLocality, SAML_NS,
    XMLDSIG_NS, XMLENC11_NS, XMLENC_NS, XSI_NS, XS_NS,
};

pub(crate) fn parse_instant(value: &str, what: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|e| SamlError::InvalidAssertion(format!("invalid {what} '{value}': {e}")))
}

pub(crate) fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn optional_instant(element: &XmlElement, name: &str) -> SamlResult<Option<DateTime<Utc>>> {
    element
        .attribute(name)
        .map(|value| parse_instant(value, name))
        .transpose()
}

fn required_attribute<'a>(element: &'a XmlElement, name: &str) -> SamlResult<&'a str> {
    element.attribute(name).ok_or_else(|| {
        SamlError::MissingElement(format!("{name} attribute on {}", element.local_name))
    })
}

fn saml(local_name: &str) -> XmlElement {
    XmlElement::new(SAML_NS, "saml", local_name)
}

fn xenc(local_name: &str) -> XmlElement {
    XmlElement::new(XMLENC_NS, "xenc", local_name)
}

fn ds(local_name: &str) -> XmlElement {
    XmlElement::new(XMLDSIG_NS, "ds", local_name)
}

// ============================================================================
// Assertion
// ============================================================================

impl Assertion {
    /// Parses a serialized `saml:Assertion`.
    ///
    /// # Errors
    ///
    /// Returns an error if the XML is malformed or is not a usable assertion.
    pub fn from_xml(xml: &str) -> SamlResult<Self> {
        let element = XmlElement::parse(xml)?;
        if !element.is(SAML_NS, "Assertion") {
            return Err(SamlError::InvalidAssertion(format!(
                "expected saml:Assertion, found {}",
                element.qualified_name()
            )));
        }
        Self::from_element(element)
    }

    /// Builds an assertion from its element, keeping the element as source.
    ///
    /// # Errors
    ///
    /// Returns an error if required attributes or children are missing or
    /// malformed.
    pub fn from_element(element: XmlElement) -> SamlResult<Self> {
        let id = required_attribute(&element, "ID")?.to_string();
        let version = required_attribute(&element, "Version")?.to_string();
        let issue_instant = parse_instant(
            required_attribute(&element, "IssueInstant")?,
            "IssueInstant",
        )?;
        let issuer = element
            .required_child(SAML_NS, "Issuer")?
            .trimmed_text()
            .ok_or_else(|| SamlError::InvalidAssertion("empty Issuer".to_string()))?;

        let subject = element
            .child(SAML_NS, "Subject")
            .map(Subject::from_element)
            .transpose()?;
        let conditions = element
            .child(SAML_NS, "Conditions")
            .map(Conditions::from_element)
            .transpose()?;

        let mut statements = Vec::new();
        for child in element.elements() {
            if child.is(SAML_NS, "AuthnStatement") {
                statements.push(Statement::Authn(AuthnStatement::from_element(child)?));
            } else if child.is(SAML_NS, "AttributeStatement") {
                statements.push(Statement::Attribute(AttributeStatement::from_element(
                    child,
                )?));
            }
        }

        Ok(Self {
            id,
            version,
            issue_instant,
            issuer,
            subject,
            conditions,
            statements,
            source: Some(element),
        })
    }

    /// Builds the unsigned element for this assertion.
    #[must_use]
    pub fn to_element(&self) -> XmlElement {
        let mut element = saml("Assertion")
            .with_namespace_declaration("saml", SAML_NS)
            .with_namespace_declaration("xs", XS_NS)
            .with_namespace_declaration("xsi", XSI_NS)
            .with_attribute("ID", self.id.as_str())
            .with_attribute("Version", self.version.as_str())
            .with_attribute("IssueInstant", format_instant(self.issue_instant))
            .with_child(saml("Issuer").with_text(self.issuer.as_str()));

        if let Some(subject) = &self.subject {
            element = element.with_child(subject.to_element());
        }
        if let Some(conditions) = &self.conditions {
            element = element.with_child(conditions.to_element());
        }
        for statement in &self.statements {
            element = element.with_child(match statement {
                Statement::Authn(authn) => authn.to_element(),
                Statement::Attribute(attributes) => attributes.to_element(),
            });
        }
        element
    }

    /// Serializes the assertion.
    ///
    /// Assertions read from the wire serialize their source element, so an
    /// embedded signature survives re-encoding.
    #[must_use]
    pub fn to_xml(&self) -> String {
        self.source
            .as_ref()
            .map_or_else(|| self.to_element().to_xml(), XmlElement::to_xml)
    }
}

// ============================================================================
// Subject
// ============================================================================

impl NameId {
    /// Parses a `saml:NameID` element.
    #[must_use]
    pub fn from_element(element: &XmlElement) -> Self {
        Self {
            value: element.text().trim().to_string(),
            format: element.attribute("Format").map(str::to_string),
            name_qualifier: element.attribute("NameQualifier").map(str::to_string),
            sp_name_qualifier: element.attribute("SPNameQualifier").map(str::to_string),
            sp_provided_id: element.attribute("SPProvidedID").map(str::to_string),
        }
    }

    /// Builds the `saml:NameID` element.
    #[must_use]
    pub fn to_element(&self) -> XmlElement {
        saml("NameID")
            .with_optional_attribute("Format", self.format.as_deref())
            .with_optional_attribute("NameQualifier", self.name_qualifier.as_deref())
            .with_optional_attribute("SPNameQualifier", self.sp_name_qualifier.as_deref())
            .with_optional_attribute("SPProvidedID", self.sp_provided_id.as_deref())
            .with_text(self.value.as_str())
    }
}

impl Subject {
    fn from_element(element: &XmlElement) -> SamlResult<Self> {
        let name_id = element.child(SAML_NS, "NameID").map(NameId::from_element);
        let encrypted_id = element
            .child(SAML_NS, "EncryptedID")
            .map(EncryptedId::from_element)
            .transpose()?;
        let subject_confirmations = element
            .children_named(SAML_NS, "SubjectConfirmation")
            .map(SubjectConfirmation::from_element)
            .collect::<SamlResult<Vec<_>>>()?;
        Ok(Self {
            name_id,
            encrypted_id,
            subject_confirmations,
        })
    }

    fn to_element(&self) -> XmlElement {
        let mut element = saml("Subject");
        if let Some(name_id) = &self.name_id {
            element = element.with_child(name_id.to_element());
        }
        if let Some(encrypted_id) = &self.encrypted_id {
            element = element.with_child(encrypted_id.to_element());
        }
        for confirmation in &self.subject_confirmations {
            element = element.with_child(confirmation.to_element());
        }
        element
    }
}

impl SubjectConfirmation {
    fn from_element(element: &XmlElement) -> SamlResult<Self> {
        let method = required_attribute(element, "Method")?.to_string();
        let subject_confirmation_data = element
            .child(SAML_NS, "SubjectConfirmationData")
            .map(|data| -> SamlResult<SubjectConfirmationData> {
                Ok(SubjectConfirmationData {
                    in_response_to: data.attribute("InResponseTo").map(str::to_string),
                    not_on_or_after: optional_instant(data, "NotOnOrAfter")?,
                    not_before: optional_instant(data, "NotBefore")?,
                    recipient: data.attribute("Recipient").map(str::to_string),
                    address: data.attribute("Address").map(str::to_string),
                })
            })
            .transpose()?;
        Ok(Self {
            method,
            subject_confirmation_data,
        })
    }

    fn to_element(&self) -> XmlElement {
        let mut element = saml("SubjectConfirmation").with_attribute("Method", self.method.as_str());
        if let Some(data) = &self.subject_confirmation_data {
            element = element.with_child(
                saml("SubjectConfirmationData")
                    .with_optional_attribute("NotBefore", data.not_before.map(format_instant))
                    .with_optional_attribute(
                        "NotOnOrAfter",
                        data.not_on_or_after.map(format_instant),
                    )
                    .with_optional_attribute("Recipient", data.recipient.as_deref())
                    .with_optional_attribute("InResponseTo", data.in_response_to.as_deref())
                    .with_optional_attribute("Address", data.address.as_deref()),
            );
        }
        element
    }
}

// ============================================================================
// Conditions
// ============================================================================

impl Conditions {
    fn from_element(element: &XmlElement) -> SamlResult<Self> {
        let audience_restrictions = element
            .children_named(SAML_NS, "AudienceRestriction")
            .map(|restriction| AudienceRestriction {
                audiences: audiences(restriction),
            })
            .collect();
        let proxy_restriction = element
            .child(SAML_NS, "ProxyRestriction")
            .map(|restriction| -> SamlResult<ProxyRestriction> {
                let count = restriction
                    .attribute("Count")
                    .map(|count| {
                        count.trim().parse::<u32>().map_err(|e| {
                            SamlError::InvalidAssertion(format!("invalid proxy count: {e}"))
                        })
                    })
                    .transpose()?;
                Ok(ProxyRestriction {
                    count,
                    audiences: audiences(restriction),
                })
            })
            .transpose()?;

        Ok(Self {
            not_before: optional_instant(element, "NotBefore")?,
            not_on_or_after: optional_instant(element, "NotOnOrAfter")?,
            audience_restrictions,
            one_time_use: element.child(SAML_NS, "OneTimeUse").is_some(),
            proxy_restriction,
        })
    }

    fn to_element(&self) -> XmlElement {
        let mut element = saml("Conditions")
            .with_optional_attribute("NotBefore", self.not_before.map(format_instant))
            .with_optional_attribute("NotOnOrAfter", self.not_on_or_after.map(format_instant));
        for restriction in &self.audience_restrictions {
            element = element.with_child(with_audiences(
                saml("AudienceRestriction"),
                &restriction.audiences,
            ));
        }
        if self.one_time_use {
            element = element.with_child(saml("OneTimeUse"));
        }
        if let Some(proxy) = &self.proxy_restriction {
            let restriction = saml("ProxyRestriction")
                .with_optional_attribute("Count", proxy.count.map(|count| count.to_string()));
            element = element.with_child(with_audiences(restriction, &proxy.audiences));
        }
        element
    }
}

fn audiences(element: &XmlElement) -> Vec<String> {
    element
        .children_named(SAML_NS, "Audience")
        .filter_map(XmlElement::trimmed_text)
        .collect()
}

fn with_audiences(mut element: XmlElement, audiences: &[String]) -> XmlElement {
    for audience in audiences {
        element = element.with_child(saml("Audience").with_text(audience.as_str()));
    }
    element
}

// ============================================================================
// Statements
// ============================================================================

impl AuthnStatement {
    fn from_element(element: &XmlElement) -> SamlResult<Self> {
        let authn_instant = parse_instant(
            required_attribute(element, "AuthnInstant")?,
            "AuthnInstant",
        )?;
        let authn_context = element
            .child(SAML_NS, "AuthnContext")
            .map(|context| AuthnContext {
                authn_context_class_ref: context
                    .child(SAML_NS, "AuthnContextClassRef")
                    .and_then(XmlElement::trimmed_text),
                authn_context_decl_ref: context
                    .child(SAML_NS, "AuthnContextDeclRef")
                    .and_then(XmlElement::trimmed_text),
                authenticating_authorities: context
                    .children_named(SAML_NS, "AuthenticatingAuthority")
                    .filter_map(XmlElement::trimmed_text)
                    .collect(),
            })
            .unwrap_or_default();
        let subject_locality = element
            .child(SAML_NS, "SubjectLocality")
            .map(|locality| SubjectLocality {
                address: locality.attribute("Address").map(str::to_string),
                dns_name: locality.attribute("DNSName").map(str::to_string),
            });

        Ok(Self {
            authn_instant,
            session_index: element.attribute("SessionIndex").map(str::to_string),
            session_not_on_or_after: optional_instant(element, "SessionNotOnOrAfter")?,
            authn_context,
            subject_locality,
        })
    }

    fn to_element(&self) -> XmlElement {
        let mut element = saml("AuthnStatement")
            .with_attribute("AuthnInstant", format_instant(self.authn_instant))
            .with_optional_attribute("SessionIndex", self.session_index.as_deref())
            .with_optional_attribute(
                "SessionNotOnOrAfter",
                self.session_not_on_or_after.map(format_instant),
            );
        if let Some(locality) = &self.subject_locality {
            element = element.with_child(
                saml("SubjectLocality")
                    .with_optional_attribute("Address", locality.address.as_deref())
                    .with_optional_attribute("DNSName", locality.dns_name.as_deref()),
            );
        }

        let mut context = saml("AuthnContext");
        if let Some(class_ref) = &self.authn_context.authn_context_class_ref {
            context = context.with_child(saml("AuthnContextClassRef").with_text(class_ref.as_str()));
        }
        if let Some(decl_ref) = &self.authn_context.authn_context_decl_ref {
            context = context.with_child(saml("AuthnContextDeclRef").with_text(decl_ref.as_str()));
        }
        for authority in &self.authn_context.authenticating_authorities {
            context =
                context.with_child(saml("AuthenticatingAuthority").with_text(authority.as_str()));
        }
        element.with_child(context)
    }
}

impl AttributeStatement {
    fn from_element(element: &XmlElement) -> SamlResult<Self> {
        let mut statement = Self::new();
        for child in element.elements() {
            if child.is(SAML_NS, "Attribute") {
                statement.attributes.push(Attribute::from_element(child)?);
            } else if child.is(SAML_NS, "EncryptedAttribute") {
                statement
                    .encrypted_attributes
                    .push(EncryptedAttribute::from_element(child)?);
            }
        }
        Ok(statement)
    }

    fn to_element(&self) -> XmlElement {
        let mut element = saml("AttributeStatement");
        for attribute in &self.attributes {
            element = element.with_child(attribute.to_element());
        }
        for encrypted in &self.encrypted_attributes {
            element = element.with_child(encrypted.to_element());
        }
        element
    }
}

impl Attribute {
    /// Parses a `saml:Attribute` element.
    ///
    /// # Errors
    ///
    /// Returns an error if the `Name` attribute is missing.
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            name: required_attribute(element, "Name")?.to_string(),
            name_format: element.attribute("NameFormat").map(str::to_string),
            friendly_name: element.attribute("FriendlyName").map(str::to_string),
            values: element
                .children_named(SAML_NS, "AttributeValue")
                .map(AttributeValue::from_element)
                .collect(),
        })
    }

    /// Builds the `saml:Attribute` element.
    #[must_use]
    pub fn to_element(&self) -> XmlElement {
        let mut element = saml("Attribute")
            .with_attribute("Name", self.name.as_str())
            .with_optional_attribute("NameFormat", self.name_format.as_deref())
            .with_optional_attribute("FriendlyName", self.friendly_name.as_deref());
        for value in &self.values {
            element = element.with_child(value.to_element());
        }
        element
    }
}

impl AttributeValue {
    fn from_element(element: &XmlElement) -> Self {
        let nil = element
            .qualified_attribute(XSI_NS, "nil")
            .is_some_and(|nil| matches!(nil.trim(), "true" | "1"));
        if nil {
            return Self::Nil;
        }
        if let Some(child) = element.elements().next() {
            return Self::Element(child.clone());
        }
        Self::Text {
            xsi_type: element
                .qualified_attribute(XSI_NS, "type")
                .map(str::to_string),
            value: element.text(),
        }
    }

    fn to_element(&self) -> XmlElement {
        let element = saml("AttributeValue");
        match self {
            Self::Text { xsi_type, value } => {
                let element = match xsi_type {
                    Some(xsi_type) => {
                        element.with_qualified_attribute(XSI_NS, "xsi:type", xsi_type.as_str())
                    }
                    None => element,
                };
                element.with_text(value.as_str())
            }
            Self::Element(child) => element.with_child(child.clone()),
            Self::Nil => element.with_qualified_attribute(XSI_NS, "xsi:nil", "true"),
        }
    }
}

// ============================================================================
// Encryption
// ============================================================================

impl EncryptedAssertion {
    /// Parses a `saml:EncryptedAssertion` element.
    ///
    /// # Errors
    ///
    /// Returns an error if `EncryptedData` or its cipher value is missing.
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            encrypted: EncryptedElement::from_container(element)?,
        })
    }

    /// Builds the `saml:EncryptedAssertion` element.
    #[must_use]
    pub fn to_element(&self) -> XmlElement {
        self.encrypted.to_container(saml("EncryptedAssertion"))
    }

    /// Serializes the encrypted assertion.
    #[must_use]
    pub fn to_xml(&self) -> String {
        self.to_element().to_xml()
    }
}

impl EncryptedAttribute {
    /// Parses a `saml:EncryptedAttribute` element.
    ///
    /// # Errors
    ///
    /// Returns an error if `EncryptedData` or its cipher value is missing.
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            encrypted: EncryptedElement::from_container(element)?,
        })
    }

    /// Builds the `saml:EncryptedAttribute` element.
    #[must_use]
    pub fn to_element(&self) -> XmlElement {
        self.encrypted.to_container(saml("EncryptedAttribute"))
    }
}

impl EncryptedId {
    /// Parses a `saml:EncryptedID` element.
    ///
    /// # Errors
    ///
    /// Returns an error if `EncryptedData` or its cipher value is missing.
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            encrypted: EncryptedElement::from_container(element)?,
        })
    }

    /// Builds the `saml:EncryptedID` element.
    #[must_use]
    pub fn to_element(&self) -> XmlElement {
        self.encrypted.to_container(saml("EncryptedID"))
    }
}

impl EncryptedElement {
    fn from_container(element: &XmlElement) -> SamlResult<Self> {
        let data = element.required_child(XMLENC_NS, "EncryptedData")?;
        let key_info = data
            .child(XMLDSIG_NS, "KeyInfo")
            .map(|info| -> SamlResult<KeyInfo> {
                Ok(KeyInfo {
                    key_name: info
                        .child(XMLDSIG_NS, "KeyName")
                        .and_then(XmlElement::trimmed_text),
                    encrypted_keys: info
                        .children_named(XMLENC_NS, "EncryptedKey")
                        .map(EncryptedKey::from_element)
                        .collect::<SamlResult<Vec<_>>>()?,
                    retrieval_uris: info
                        .children_named(XMLDSIG_NS, "RetrievalMethod")
                        .filter_map(|method| method.attribute("URI").map(str::to_string))
                        .collect(),
                })
            })
            .transpose()?;

        let encrypted_data = EncryptedData {
            id: data.attribute("Id").map(str::to_string),
            type_uri: data.attribute("Type").map(str::to_string),
            encryption_method: data
                .child(XMLENC_NS, "EncryptionMethod")
                .map(EncryptionMethod::from_element),
            key_info,
            cipher_value: cipher_value(data)?,
        };
        let encrypted_keys = element
            .children_named(XMLENC_NS, "EncryptedKey")
            .map(EncryptedKey::from_element)
            .collect::<SamlResult<Vec<_>>>()?;

        Ok(Self {
            encrypted_data,
            encrypted_keys,
        })
    }

    fn to_container(&self, mut container: XmlElement) -> XmlElement {
        let data = &self.encrypted_data;
        let mut element = xenc("EncryptedData")
            .with_namespace_declaration("xenc", XMLENC_NS)
            .with_optional_attribute("Id", data.id.as_deref())
            .with_optional_attribute("Type", data.type_uri.as_deref());
        if let Some(method) = &data.encryption_method {
            element = element.with_child(method.to_element());
        }
        if let Some(info) = &data.key_info {
            let mut key_info = ds("KeyInfo").with_namespace_declaration("ds", XMLDSIG_NS);
            if let Some(name) = &info.key_name {
                key_info = key_info.with_child(ds("KeyName").with_text(name.as_str()));
            }
            for uri in &info.retrieval_uris {
                key_info = key_info.with_child(
                    ds("RetrievalMethod")
                        .with_attribute("URI", uri.as_str())
                        .with_attribute("Type", "http://www.w3.org/2001/04/xmlenc#EncryptedKey"),
                );
            }
            for key in &info.encrypted_keys {
                key_info = key_info.with_child(key.to_element());
            }
            element = element.with_child(key_info);
        }
        element = element.with_child(cipher_data(&data.cipher_value));

        container = container.with_child(element);
        for key in &self.encrypted_keys {
            container = container.with_child(key.to_element());
        }
        container
    }
}

impl EncryptedKey {
    fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            id: element.attribute("Id").map(str::to_string),
            recipient: element.attribute("Recipient").map(str::to_string),
            encryption_method: element
                .child(XMLENC_NS, "EncryptionMethod")
                .map(EncryptionMethod::from_element),
            key_name: element
                .child(XMLDSIG_NS, "KeyInfo")
                .and_then(|info| info.child(XMLDSIG_NS, "KeyName"))
                .and_then(XmlElement::trimmed_text),
            cipher_value: cipher_value(element)?,
        })
    }

    fn to_element(&self) -> XmlElement {
        let mut element = xenc("EncryptedKey")
            .with_optional_attribute("Id", self.id.as_deref())
            .with_optional_attribute("Recipient", self.recipient.as_deref());
        if let Some(method) = &self.encryption_method {
            element = element.with_child(method.to_element());
        }
        if let Some(name) = &self.key_name {
            element = element
                .with_child(ds("KeyInfo").with_child(ds("KeyName").with_text(name.as_str())));
        }
        element.with_child(cipher_data(&self.cipher_value))
    }
}

impl EncryptionMethod {
    fn from_element(element: &XmlElement) -> Self {
        Self {
            algorithm: element.attribute("Algorithm").unwrap_or_default().to_string(),
            digest_method: element
                .child(XMLDSIG_NS, "DigestMethod")
                .and_then(|digest| digest.attribute("Algorithm"))
                .map(str::to_string),
            mgf: element
                .child(XMLENC11_NS, "MGF")
                .and_then(|mgf| mgf.attribute("Algorithm"))
                .map(str::to_string),
        }
    }

    fn to_element(&self) -> XmlElement {
        let mut element = xenc("EncryptionMethod").with_attribute("Algorithm", self.algorithm.as_str());
        if let Some(digest) = &self.digest_method {
            element = element.with_child(ds("DigestMethod").with_attribute("Algorithm", digest.as_str()));
        }
        if let Some(mgf) = &self.mgf {
            element = element.with_child(
                XmlElement::new(XMLENC11_NS, "xenc11", "MGF").with_attribute("Algorithm", mgf.as_str()),
            );
        }
        element
    }
}

/// The base64 cipher value with any line breaks removed.
fn cipher_value(element: &XmlElement) -> SamlResult<String> {
    let value: String = element
        .required_child(XMLENC_NS, "CipherData")?
        .required_child(XMLENC_NS, "CipherValue")?
        .text()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if value.is_empty() {
        return Err(SamlError::MissingElement("CipherValue content".to_string()));
    }
    Ok(value)
}

fn cipher_data(value: &str) -> XmlElement {
    xenc("CipherData").with_child(xenc("CipherValue").with_text(value))
}

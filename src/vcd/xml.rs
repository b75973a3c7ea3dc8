//! VCD XML schema
//!
//! A small owned element tree plus the handful of typed documents the driver
//! exchanges with vCloud Director: metadata, undeploy parameters and error
//! payloads. Namespace handling lives here and nowhere else: parsed elements
//! carry their resolved namespace URI, built elements carry their qualified
//! name and the root declares the prefixes.

use super::error::{VcdError, VcdResult};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use quick_xml::Writer;
use std::io::Cursor;

pub const VCLOUD_NS: &str = "http://www.vmware.com/vcloud/v1.5";
pub const OVF_NS: &str = "http://schemas.dmtf.org/ovf/envelope/1";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// A parsed or built XML element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    /// Resolved namespace URI (parsed documents only)
    pub namespace: Option<String>,
    /// Local name when parsed, qualified name when built
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

fn xml_err<E: std::fmt::Display>(e: E) -> VcdError {
    VcdError::Xml(e.to_string())
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Root element declaring the vCloud namespace as default
    pub fn vcloud_root(name: impl Into<String>) -> Self {
        Self::new(name).with_attr("xmlns", VCLOUD_NS)
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// True if this is the vCloud element `local`
    pub fn is(&self, local: &str) -> bool {
        self.name == local && self.namespace.as_deref() == Some(VCLOUD_NS)
    }

    /// All elements below this one, depth first
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        self.collect_descendants(&mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, out: &mut Vec<&'a XmlElement>) {
        for child in &self.children {
            out.push(child);
            child.collect_descendants(out);
        }
    }

    /// All vCloud `local` elements below this one
    pub fn find_all(&self, local: &str) -> Vec<&XmlElement> {
        self.descendants()
            .into_iter()
            .filter(|e| e.is(local))
            .collect()
    }

    /// First vCloud `local` element below this one
    pub fn find(&self, local: &str) -> Option<&XmlElement> {
        self.find_all(local).into_iter().next()
    }

    /// First direct vCloud child named `local`
    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.is(local))
    }

    /// Parse a document into its root element
    pub fn parse(xml: &str) -> VcdResult<Self> {
        let mut reader = NsReader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_resolved_event() {
                Ok((ns, Event::Start(ref e))) => {
                    let element = element_from(ns, e)?;
                    stack.push(element);
                }
                Ok((ns, Event::Empty(ref e))) => {
                    let element = element_from(ns, e)?;
                    attach(&mut stack, &mut root, element);
                }
                Ok((_, Event::End(_))) => {
                    if let Some(element) = stack.pop() {
                        attach(&mut stack, &mut root, element);
                    }
                }
                Ok((_, Event::Text(ref t))) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&t.unescape().map_err(xml_err)?);
                    }
                }
                Ok((_, Event::CData(c))) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Ok((_, Event::Eof)) => break,
                Ok(_) => {}
                Err(e) => return Err(xml_err(e)),
            }
        }

        if !stack.is_empty() {
            return Err(VcdError::Xml("unexpected end of document".to_string()));
        }
        root.ok_or_else(|| VcdError::Xml("document has no root element".to_string()))
    }

    /// Serialize with an XML declaration
    pub fn to_xml(&self) -> VcdResult<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(xml_err)?;
        write_element(&mut writer, self)?;
        String::from_utf8(writer.into_inner().into_inner()).map_err(xml_err)
    }
}

fn element_from(ns: ResolveResult, start: &BytesStart) -> VcdResult<XmlElement> {
    let namespace = match ns {
        ResolveResult::Bound(Namespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
        _ => None,
    };
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        attributes.push((key, value));
    }

    Ok(XmlElement {
        namespace,
        name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, element: &XmlElement) -> VcdResult<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() && element.text.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(xml_err)?;
        return Ok(());
    }

    writer.write_event(Event::Start(start)).map_err(xml_err)?;
    if !element.text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&element.text)))
            .map_err(xml_err)?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(xml_err)?;
    Ok(())
}

// =============================================================================
// Metadata
// =============================================================================

/// Typed metadata value as stored by VCD
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    String(String),
    DateTime(String),
}

impl MetadataValue {
    pub fn xsi_type(&self) -> &'static str {
        match self {
            Self::String(_) => "MetadataStringValue",
            Self::DateTime(_) => "MetadataDateTimeValue",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::String(v) | Self::DateTime(v) => v,
        }
    }
}

/// Build a `Metadata` document holding the given entries
pub fn build_metadata(entries: &[(String, MetadataValue)]) -> XmlElement {
    let mut metadata = XmlElement::vcloud_root("Metadata").with_attr("xmlns:xsi", XSI_NS);
    for (key, value) in entries {
        let typed = XmlElement::new("TypedValue")
            .with_attr("xsi:type", value.xsi_type())
            .with_child(XmlElement::new("Value").with_text(value.value()));
        metadata.push(
            XmlElement::new("MetadataEntry")
                .with_child(XmlElement::new("Key").with_text(key.as_str()))
                .with_child(typed),
        );
    }
    metadata
}

/// Look up the value stored under `key` in a `Metadata` document
pub fn metadata_value(metadata: &XmlElement, key: &str) -> Option<String> {
    metadata
        .children
        .iter()
        .filter(|e| e.is("MetadataEntry"))
        .find(|e| e.child("Key").map(|k| k.text == key).unwrap_or(false))
        .and_then(|e| e.find("Value"))
        .map(|v| v.text.clone())
}

// =============================================================================
// Power and error documents
// =============================================================================

/// Build an `UndeployVAppParams` document
pub fn build_undeploy(power_action: &str) -> XmlElement {
    XmlElement::vcloud_root("UndeployVAppParams")
        .with_child(XmlElement::new("UndeployPowerAction").with_text(power_action))
}

/// Extract the `message` of a VCD `Error` payload (bare or inside a Task)
pub fn error_message(body: &str) -> Option<String> {
    let doc = XmlElement::parse(body).ok()?;
    if doc.is("Error") {
        return doc.attr("message").map(str::to_string);
    }
    doc.find("Error")
        .and_then(|e| e.attr("message"))
        .map(str::to_string)
}

//! Minimal namespace-aware XML DOM
//!
//! The Extended-XMP codec needs to move elements and attributes between
//! documents, keep namespace declarations coherent while doing so, and
//! measure serialized sizes. quick-xml is event-based, so this module builds
//! a small owned tree over its events: names carry their resolved namespace
//! URI from parse time, namespace declarations stay in the attribute list,
//! and serialization goes back through a quick-xml writer with no XML
//! declaration and no indentation.

use crate::error::{Error, Result};
use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;
use std::io::Cursor;

/// A qualified XML name with its resolved namespace URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlName {
    /// Prefix as written, e.g. `rdf` in `rdf:RDF`
    pub prefix: Option<String>,
    /// Local part of the name
    pub local: String,
    /// Namespace URI the prefix resolved to at parse time (or that the
    /// caller assigned), if any
    pub ns: Option<String>,
}

impl XmlName {
    /// A name with a prefix and a known namespace URI
    pub fn prefixed(prefix: &str, local: &str, ns: &str) -> Self {
        Self {
            prefix: Some(prefix.to_string()),
            local: local.to_string(),
            ns: Some(ns.to_string()),
        }
    }

    /// The name as written in the document, `prefix:local` or `local`
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.local),
            None => self.local.clone(),
        }
    }
}

/// One attribute of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    /// Attribute name
    pub name: XmlName,
    /// Unescaped attribute value
    pub value: String,
}

impl XmlAttribute {
    /// True for `xmlns` and `xmlns:prefix` namespace declarations
    pub fn is_namespace_decl(&self) -> bool {
        self.name.prefix.as_deref() == Some("xmlns")
            || (self.name.prefix.is_none() && self.name.local == "xmlns")
    }

    /// For a `xmlns:prefix` declaration, the declared prefix
    fn declared_prefix(&self) -> Option<&str> {
        if self.name.prefix.as_deref() == Some("xmlns") {
            Some(&self.name.local)
        } else {
            None
        }
    }

    /// Serialized size in UTF-8 bytes, including the leading space
    pub fn utf8_len(&self) -> usize {
        // space + name + ="value"
        1 + self.name.qualified().len() + 2 + escape(self.value.as_str()).len() + 1
    }
}

/// A node in the tree: a child element or character data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    /// A nested element
    Element(XmlElement),
    /// Character data (entities already unescaped)
    Text(String),
}

/// An element with its attributes and children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Element name
    pub name: XmlName,
    /// Attributes in document order, namespace declarations included
    pub attributes: Vec<XmlAttribute>,
    /// Child nodes in document order
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    /// Create an element with no attributes or children
    pub fn new(name: XmlName) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Iterate over child elements, skipping text nodes
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            XmlNode::Text(_) => None,
        })
    }

    /// Indexes into `children` of child elements matching namespace and
    /// local name
    pub fn child_indexes(&self, ns: Option<&str>, local: &str) -> Vec<usize> {
        self.children
            .iter()
            .enumerate()
            .filter_map(|(index, node)| match node {
                XmlNode::Element(element)
                    if element.name.local == local && element.name.ns.as_deref() == ns =>
                {
                    Some(index)
                }
                _ => None,
            })
            .collect()
    }

    /// Index of the attribute matching namespace and local name
    ///
    /// An attribute without a prefix has no namespace, so `ns: None` matches
    /// only unprefixed attributes.
    pub fn attribute_index(&self, ns: Option<&str>, local: &str) -> Option<usize> {
        self.attributes
            .iter()
            .position(|attr| attr.name.local == local && attr.name.ns.as_deref() == ns)
    }

    /// Value of the attribute matching namespace and local name
    pub fn attribute(&self, ns: Option<&str>, local: &str) -> Option<&str> {
        self.attribute_index(ns, local)
            .map(|index| self.attributes[index].value.as_str())
    }

    /// Set an attribute, overwriting any existing value under the same
    /// namespace and local name
    pub fn set_attribute(&mut self, name: XmlName, value: &str) {
        match self.attribute_index(name.ns.as_deref(), &name.local) {
            Some(index) => {
                self.attributes[index].value = value.to_string();
            }
            None => self.attributes.push(XmlAttribute {
                name,
                value: value.to_string(),
            }),
        }
    }

    /// Remove and return the attribute matching namespace and local name
    pub fn remove_attribute(&mut self, ns: Option<&str>, local: &str) -> Option<XmlAttribute> {
        self.attribute_index(ns, local)
            .map(|index| self.attributes.remove(index))
    }

    /// Append a child node
    pub fn append_child(&mut self, node: XmlNode) {
        self.children.push(node);
    }

    /// Remove and return the child node at `index`
    pub fn remove_child(&mut self, index: usize) -> XmlNode {
        self.children.remove(index)
    }

    /// Declare `xmlns:prefix="uri"` on this element unless an equal
    /// declaration is already present
    pub fn ensure_namespace(&mut self, prefix: &str, uri: &str) {
        let already = self.attributes.iter().any(|attr| {
            attr.declared_prefix() == Some(prefix) && attr.value == uri
        });
        if !already {
            // Replace a same-prefix declaration pointing elsewhere.
            self.attributes
                .retain(|attr| attr.declared_prefix() != Some(prefix));
            self.attributes.push(XmlAttribute {
                name: XmlName {
                    prefix: Some("xmlns".to_string()),
                    local: prefix.to_string(),
                    ns: None,
                },
                value: uri.to_string(),
            });
        }
    }

    /// Collect every `prefix -> uri` pair used by names in this subtree
    ///
    /// A prefix bound to more than one URI is dropped from the result and
    /// reported separately; its declarations must stay where they are.
    pub fn used_namespaces(&self) -> (HashMap<String, String>, Vec<String>) {
        let mut used = HashMap::new();
        let mut conflicted = Vec::new();
        self.collect_used(&mut used, &mut conflicted);
        for prefix in &conflicted {
            used.remove(prefix);
        }
        (used, conflicted)
    }

    fn collect_used(&self, used: &mut HashMap<String, String>, conflicted: &mut Vec<String>) {
        let mut record = |name: &XmlName| {
            if let (Some(prefix), Some(ns)) = (&name.prefix, &name.ns) {
                match used.get(prefix) {
                    Some(existing) if existing != ns => conflicted.push(prefix.clone()),
                    Some(_) => {}
                    None => {
                        used.insert(prefix.clone(), ns.clone());
                    }
                }
            }
        };
        record(&self.name);
        for attr in &self.attributes {
            if !attr.is_namespace_decl() {
                record(&attr.name);
            }
        }
        for child in self.child_elements() {
            child.collect_used(used, conflicted);
        }
    }

    fn subtree_uses_prefix(&self, prefix: &str) -> bool {
        if self.name.prefix.as_deref() == Some(prefix) {
            return true;
        }
        if self
            .attributes
            .iter()
            .any(|attr| !attr.is_namespace_decl() && attr.name.prefix.as_deref() == Some(prefix))
        {
            return true;
        }
        self.child_elements()
            .any(|child| child.subtree_uses_prefix(prefix))
    }

    /// Deduplicate namespace declarations across this subtree
    ///
    /// Every unconflicted prefix used anywhere in the tree is declared on
    /// this element; descendant declarations that repeat an in-scope binding
    /// and declarations whose prefix goes unused in their subtree are
    /// removed. Prefixes bound to more than one URI keep their local
    /// declarations untouched.
    pub fn optimize_namespaces(&mut self) {
        let (used, conflicted) = self.used_namespaces();
        for (prefix, uri) in &used {
            self.ensure_namespace(prefix, uri);
        }
        self.prune_declarations(&HashMap::new(), &conflicted);
    }

    fn prune_declarations(&mut self, in_scope: &HashMap<String, String>, conflicted: &[String]) {
        let mut scope = in_scope.clone();
        let mut kept = Vec::with_capacity(self.attributes.len());
        let uses: Vec<bool> = self
            .attributes
            .iter()
            .map(|attr| {
                attr.declared_prefix()
                    .map(|prefix| self.subtree_uses_prefix(prefix))
                    .unwrap_or(false)
            })
            .collect();
        for (attr, used_here) in self.attributes.drain(..).zip(uses) {
            let Some(prefix) = attr.declared_prefix().map(str::to_string) else {
                kept.push(attr);
                continue;
            };
            if conflicted.contains(&prefix) {
                scope.insert(prefix, attr.value.clone());
                kept.push(attr);
                continue;
            }
            if scope.get(&prefix) == Some(&attr.value) || !used_here {
                continue;
            }
            scope.insert(prefix, attr.value.clone());
            kept.push(attr);
        }
        self.attributes = kept;

        for child in &mut self.children {
            if let XmlNode::Element(element) = child {
                element.prune_declarations(&scope, conflicted);
            }
        }
    }

    /// Serialize this element (and subtree) to UTF-8 bytes, with no XML
    /// declaration and no indentation
    pub fn serialize_utf8(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        self.write_into(&mut writer)?;
        Ok(writer.into_inner().into_inner())
    }

    /// Serialize this element to a string
    pub fn serialize_string(&self) -> Result<String> {
        String::from_utf8(self.serialize_utf8()?)
            .map_err(|_| Error::InvalidSegment("serialized XML is not valid UTF-8".to_string()))
    }

    /// Size of the UTF-8 serialization in bytes
    pub fn utf8_len(&self) -> usize {
        self.serialize_utf8().map(|bytes| bytes.len()).unwrap_or(0)
    }

    fn write_into(&self, writer: &mut Writer<Cursor<Vec<u8>>>) -> Result<()> {
        let qualified = self.name.qualified();
        let mut start = BytesStart::new(qualified.as_str());
        for attr in &self.attributes {
            start.push_attribute((attr.name.qualified().as_str(), attr.value.as_str()));
        }
        if self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        writer.write_event(Event::Start(start))?;
        for child in &self.children {
            match child {
                XmlNode::Element(element) => element.write_into(writer)?,
                XmlNode::Text(text) => {
                    writer.write_event(Event::Text(BytesText::new(text)))?;
                }
            }
        }
        writer.write_event(Event::End(BytesEnd::new(qualified.as_str())))?;
        Ok(())
    }
}

/// A parsed XML document
#[derive(Debug, Clone)]
pub struct XmlDocument {
    /// The document element
    pub root: XmlElement,
}

impl XmlDocument {
    /// Parse a document from a string
    ///
    /// Processing instructions, comments and the XML declaration are
    /// dropped; pure-whitespace text between elements is discarded.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut scopes: Vec<HashMap<Option<String>, String>> = vec![HashMap::new()];
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let element = element_from_event(&start, &mut scopes)?;
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element = element_from_event(&start, &mut scopes)?;
                    scopes.pop();
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| {
                        Error::InvalidSegment("unbalanced XML end tag".to_string())
                    })?;
                    scopes.pop();
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let raw = String::from_utf8_lossy(text.as_ref()).to_string();
                    let unescaped = match unescape(&raw) {
                        Ok(value) => value.to_string(),
                        Err(_) => raw,
                    };
                    if !unescaped.trim().is_empty() {
                        if let Some(parent) = stack.last_mut() {
                            parent.append_child(XmlNode::Text(unescaped));
                        }
                    }
                }
                Event::CData(data) => {
                    let text = String::from_utf8_lossy(data.as_ref()).to_string();
                    if let Some(parent) = stack.last_mut() {
                        parent.append_child(XmlNode::Text(text));
                    }
                }
                Event::Eof => break,
                // Declaration, PIs, comments and doctypes carry nothing the
                // codec needs.
                _ => {}
            }
        }

        let root = root.ok_or_else(|| {
            Error::InvalidSegment("XML document has no root element".to_string())
        })?;
        Ok(Self { root })
    }
}

fn attach(
    stack: &mut Vec<XmlElement>,
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.append_child(XmlNode::Element(element));
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(Error::InvalidSegment(
                    "XML document has more than one root element".to_string(),
                ));
            }
            *root = Some(element);
            Ok(())
        }
    }
}

fn split_qname(raw: &[u8]) -> Result<(Option<String>, String)> {
    let raw = std::str::from_utf8(raw)
        .map_err(|_| Error::InvalidSegment("XML name is not valid UTF-8".to_string()))?;
    match raw.split_once(':') {
        Some((prefix, local)) => Ok((Some(prefix.to_string()), local.to_string())),
        None => Ok((None, raw.to_string())),
    }
}

/// Build an element from a start tag, pushing its namespace scope
fn element_from_event(
    start: &BytesStart<'_>,
    scopes: &mut Vec<HashMap<Option<String>, String>>,
) -> Result<XmlElement> {
    let mut raw_attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| {
            Error::InvalidSegment(format!("malformed XML attribute: {e}"))
        })?;
        let (prefix, local) = split_qname(attr.key.as_ref())?;
        let raw_value = String::from_utf8_lossy(&attr.value).to_string();
        let value = match unescape(&raw_value) {
            Ok(unescaped) => unescaped.to_string(),
            Err(_) => raw_value,
        };
        raw_attrs.push((prefix, local, value));
    }

    // New scope: the parent scope plus this element's declarations.
    let mut scope = scopes.last().cloned().unwrap_or_default();
    for (prefix, local, value) in &raw_attrs {
        if prefix.as_deref() == Some("xmlns") {
            scope.insert(Some(local.clone()), value.clone());
        } else if prefix.is_none() && local == "xmlns" {
            scope.insert(None, value.clone());
        }
    }

    let (prefix, local) = split_qname(start.name().as_ref())?;
    let ns = scope.get(&prefix).cloned();
    let mut element = XmlElement::new(XmlName { prefix, local, ns });

    for (prefix, local, value) in raw_attrs {
        let is_decl =
            prefix.as_deref() == Some("xmlns") || (prefix.is_none() && local == "xmlns");
        // Per XML namespaces, an unprefixed attribute has no namespace.
        let ns = if is_decl || prefix.is_none() {
            None
        } else {
            scope.get(&prefix).cloned()
        };
        element.attributes.push(XmlAttribute {
            name: XmlName { prefix, local, ns },
            value,
        });
    }

    scopes.push(scope);
    Ok(element)
}

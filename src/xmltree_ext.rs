use std::io::Read;

use xmltree::{Element, XMLNode};

use crate::errors::DavError;
use crate::DavResult;

pub(crate) const DAV_NS: &str = "DAV:";

pub(crate) trait ElementExt {
    /// Parse a request body. Leading whitespace and XML comments are fine.
    fn parse2<R: Read>(r: R) -> DavResult<Element>;
    /// Iterate over child elements, skipping text and comments.
    fn child_elems_iter<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Element> + 'a>;
    /// Is this `<name>` in the DAV: namespace.
    fn is_dav(&self, name: &str) -> bool;
}

impl ElementExt for Element {
    fn parse2<R: Read>(r: R) -> DavResult<Element> {
        let elem = Element::parse(r)?;
        if elem.namespace.as_deref() != Some(DAV_NS) {
            return Err(DavError::XmlParseError);
        }
        Ok(elem)
    }

    fn child_elems_iter<'a>(&'a self) -> Box<dyn Iterator<Item = &'a Element> + 'a> {
        Box::new(self.children.iter().filter_map(|n| match n {
            XMLNode::Element(e) => Some(e),
            _ => None,
        }))
    }

    fn is_dav(&self, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(DAV_NS)
    }
}

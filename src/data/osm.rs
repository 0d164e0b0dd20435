/// One top-level element of an .osm file, as read off the stream. Attribute
/// values are kept verbatim (as strings); nothing is interpreted until the
/// element is audited or shaped.
#[derive(Debug, Clone, PartialEq)]
pub struct RawElement {
    pub kind: ElementKind,
    pub attrs: Vec<(String, String)>,
    pub tags: Vec<Tag>,
    pub node_refs: Vec<String>,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

/// A k/v annotation attached to a node, way or relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// A <member> child of a relation. Kept only so relations survive sampling;
/// they are never shaped into documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub member_type: String,
    pub member_ref: String,
    pub role: String,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Node => "node",
            ElementKind::Way => "way",
            ElementKind::Relation => "relation",
        }
    }

    pub fn from_tag_name(name: &[u8]) -> Option<ElementKind> {
        match name {
            b"node" => Some(ElementKind::Node),
            b"way" => Some(ElementKind::Way),
            b"relation" => Some(ElementKind::Relation),
            _ => None,
        }
    }
}

impl RawElement {
    pub fn new(kind: ElementKind) -> RawElement {
        RawElement {
            kind,
            attrs: Vec::new(),
            tags: Vec::new(),
            node_refs: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }
}

//! Attribute dictionary.
//!
//! The dictionary is a typed tree of RADIUS attributes. Every node has a number that is
//! unique among its siblings, a name that is unique across the whole dictionary and a
//! data type. Group types (`tlv`, `vsa`, `extended`, `evs` and vendor nodes) have
//! children; all other types are leaves that carry a value.
//!
//! Nodes are stored in an arena and addressed by [`AttrId`]. The tree is populated once at
//! startup (see [`parser`]) and is read-only afterwards.

pub mod parser;

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    str::FromStr,
};

use thiserror::Error;

/// Vendor-Specific (RFC 2865 §5.26).
pub const ATTR_VENDOR_SPECIFIC: u32 = 26;
/// Message-Authenticator (RFC 3579 §3.2).
pub const ATTR_MESSAGE_AUTHENTICATOR: u32 = 80;
/// Extended-Attribute-1 (RFC 6929 §2.1).
pub const ATTR_EXTENDED_ATTRIBUTE_1: u32 = 241;
/// Private enterprise number of the FreeRADIUS project.
pub const VENDORPEC_FREERADIUS: u32 = 11344;

/// Handle to a node of a [`Dictionary`].
///
/// Handles are only meaningful for the dictionary that created them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrId(u32);

impl AttrId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Declared type of a dictionary attribute.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Byte,
    Short,
    Integer,
    Integer64,
    Signed,
    Date,
    IpAddr,
    String,
    Octets,
    Tlv,
    Vsa,
    Extended,
    Evs,
    Vendor,
}

impl DataType {
    /// Returns true for types that group other attributes instead of carrying a value.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            DataType::Tlv | DataType::Vsa | DataType::Extended | DataType::Evs | DataType::Vendor
        )
    }

    /// Dictionary keyword for this type.
    pub fn name(self) -> &'static str {
        match self {
            DataType::Byte => "byte",
            DataType::Short => "short",
            DataType::Integer => "integer",
            DataType::Integer64 => "integer64",
            DataType::Signed => "signed",
            DataType::Date => "date",
            DataType::IpAddr => "ipaddr",
            DataType::String => "string",
            DataType::Octets => "octets",
            DataType::Tlv => "tlv",
            DataType::Vsa => "vsa",
            DataType::Extended => "extended",
            DataType::Evs => "evs",
            DataType::Vendor => "vendor",
        }
    }
}

impl FromStr for DataType {
    type Err = DictionaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "byte" => Ok(DataType::Byte),
            "short" => Ok(DataType::Short),
            "integer" => Ok(DataType::Integer),
            "integer64" => Ok(DataType::Integer64),
            "signed" => Ok(DataType::Signed),
            "date" => Ok(DataType::Date),
            "ipaddr" => Ok(DataType::IpAddr),
            "string" => Ok(DataType::String),
            "octets" => Ok(DataType::Octets),
            "tlv" => Ok(DataType::Tlv),
            "vsa" => Ok(DataType::Vsa),
            "extended" => Ok(DataType::Extended),
            "evs" => Ok(DataType::Evs),
            _ => Err(DictionaryError::UnknownType(s.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised while building or loading a dictionary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DictionaryError {
    #[error("Unknown data type \"{0}\"")]
    UnknownType(String),

    #[error("Duplicate attribute name \"{0}\"")]
    DuplicateName(String),

    #[error("Attribute number {num} is already defined beneath \"{parent}\"")]
    DuplicateNumber { parent: String, num: u32 },

    #[error("\"{0}\" is not a structural attribute and cannot have children")]
    NotStructural(String),

    #[error("Unknown attribute \"{0}\"")]
    UnknownAttribute(String),

    #[error("Parent of \"{0}\" is not defined")]
    MissingParent(String),

    #[error("VALUE is not allowed for \"{0}\" of type \"{1}\"")]
    ValuesNotAllowed(String, DataType),

    #[error("Unknown vendor \"{0}\"")]
    UnknownVendor(String),

    #[error("Invalid number \"{0}\"")]
    InvalidNumber(String),

    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Failed reading {file}: {reason}")]
    Io { file: String, reason: String },

    #[error("{file}[{line}]: {source}")]
    At {
        file: String,
        line: usize,
        #[source]
        source: Box<DictionaryError>,
    },
}

/// A single dictionary attribute.
#[derive(Clone, Debug)]
pub struct Attr {
    num: u32,
    name: String,
    data_type: DataType,
    parent: Option<AttrId>,
    depth: u32,
    children: BTreeMap<u32, AttrId>,
    values: BTreeMap<u64, String>,
    value_names: HashMap<String, u64>,
}

impl Attr {
    /// Number of this attribute beneath its parent.
    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn parent(&self) -> Option<AttrId> {
        self.parent
    }

    /// Distance from the dictionary root (the root itself has depth 0).
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Name registered with `VALUE` for an integer value, if any.
    pub fn value_name(&self, value: u64) -> Option<&str> {
        self.values.get(&value).map(String::as_str)
    }

    /// Integer registered with `VALUE` under `name` (case-insensitive).
    pub fn value_by_name(&self, name: &str) -> Option<u64> {
        self.value_names.get(&name.to_ascii_lowercase()).copied()
    }
}

/// Tree of RADIUS attributes.
#[derive(Clone, Debug)]
pub struct Dictionary {
    attrs: Vec<Attr>,
    names: HashMap<String, AttrId>,
    vendors: HashMap<String, u32>,
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl Dictionary {
    /// Creates a dictionary that only contains the root node.
    pub fn new() -> Self {
        let root = Attr {
            num: 0,
            name: "root".to_string(),
            data_type: DataType::Tlv,
            parent: None,
            depth: 0,
            children: BTreeMap::new(),
            values: BTreeMap::new(),
            value_names: HashMap::new(),
        };
        Dictionary {
            attrs: vec![root],
            names: HashMap::new(),
            vendors: HashMap::new(),
        }
    }

    pub fn root(&self) -> AttrId {
        AttrId(0)
    }

    /// Returns the attribute behind a handle issued by this dictionary.
    pub fn attr(&self, id: AttrId) -> &Attr {
        &self.attrs[id.index()]
    }

    /// Number of attributes, not counting the root.
    pub fn len(&self) -> usize {
        self.attrs.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds an attribute beneath `parent`.
    ///
    /// # Errors
    /// Fails if the parent cannot have children, or if the name or the number is already
    /// taken.
    pub fn add_attr(
        &mut self,
        parent: AttrId,
        num: u32,
        name: &str,
        data_type: DataType,
    ) -> Result<AttrId, DictionaryError> {
        let parent_attr = self.attr(parent);
        if !parent_attr.data_type.is_structural() {
            return Err(DictionaryError::NotStructural(parent_attr.name.clone()));
        }
        if let Some(&existing) = parent_attr.children.get(&num) {
            let attr = self.attr(existing);
            // Stock dictionaries repeat definitions the built-in one already has.
            if attr.name.eq_ignore_ascii_case(name) && attr.data_type == data_type {
                return Ok(existing);
            }
            return Err(DictionaryError::DuplicateNumber {
                parent: parent_attr.name.clone(),
                num,
            });
        }
        let key = name.to_ascii_lowercase();
        if self.names.contains_key(&key) {
            return Err(DictionaryError::DuplicateName(name.to_string()));
        }

        let id = AttrId(self.attrs.len() as u32);
        let depth = parent_attr.depth + 1;
        self.attrs.push(Attr {
            num,
            name: name.to_string(),
            data_type,
            parent: Some(parent),
            depth,
            children: BTreeMap::new(),
            values: BTreeMap::new(),
            value_names: HashMap::new(),
        });
        self.attrs[parent.index()].children.insert(num, id);
        self.names.insert(key, id);
        Ok(id)
    }

    /// Registers an enumerated name for a value of an integer attribute.
    pub fn add_value(&mut self, attr: AttrId, name: &str, value: u64) -> Result<(), DictionaryError> {
        let entry = &mut self.attrs[attr.index()];
        match entry.data_type {
            DataType::Byte
            | DataType::Short
            | DataType::Integer
            | DataType::Integer64
            | DataType::Signed => {}
            other => return Err(DictionaryError::ValuesNotAllowed(entry.name.clone(), other)),
        }
        // First definition wins for rendering, every name stays usable for parsing.
        entry.values.entry(value).or_insert_with(|| name.to_string());
        entry.value_names.insert(name.to_ascii_lowercase(), value);
        Ok(())
    }

    pub fn add_vendor(&mut self, name: &str, num: u32) {
        self.vendors.insert(name.to_ascii_lowercase(), num);
    }

    pub fn vendor_by_name(&self, name: &str) -> Option<u32> {
        self.vendors.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn child_by_num(&self, parent: AttrId, num: u32) -> Option<AttrId> {
        self.attr(parent).children.get(&num).copied()
    }

    /// Finds a direct child of `parent` by name (case-insensitive).
    pub fn child_by_name(&self, parent: AttrId, name: &str) -> Option<AttrId> {
        self.attr_by_name(name)
            .filter(|id| self.attr(*id).parent == Some(parent))
    }

    /// Finds an attribute anywhere in the tree by name (case-insensitive).
    pub fn attr_by_name(&self, name: &str) -> Option<AttrId> {
        self.names.get(&name.to_ascii_lowercase()).copied()
    }

    /// Follows `path` from `from` for as long as children match.
    ///
    /// Returns the deepest node reached and how many components were consumed.
    pub fn resolve_path(&self, from: AttrId, path: &[u32]) -> (AttrId, usize) {
        let mut node = from;
        for (consumed, num) in path.iter().enumerate() {
            match self.child_by_num(node, *num) {
                Some(child) => node = child,
                None => return (node, consumed),
            }
        }
        (node, path.len())
    }

    /// Returns true if `ancestor` is `node` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: AttrId, node: AttrId) -> bool {
        let target_depth = self.attr(ancestor).depth;
        let mut current = node;
        while self.attr(current).depth > target_depth {
            match self.attr(current).parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
        current == ancestor
    }

    /// Attribute numbers on the path below `ancestor` down to and including `node`.
    ///
    /// Returns `None` if `ancestor` is not an ancestor of `node`.
    pub fn path_between(&self, ancestor: AttrId, node: AttrId) -> Option<Vec<u32>> {
        if !self.is_ancestor(ancestor, node) {
            return None;
        }
        let mut path = Vec::with_capacity((self.attr(node).depth - self.attr(ancestor).depth) as usize);
        let mut current = node;
        while current != ancestor {
            let attr = self.attr(current);
            path.push(attr.num);
            current = attr.parent?;
        }
        path.reverse();
        Some(path)
    }

    /// Nodes from the top-level attribute down to `node` (the root is not included).
    pub fn lineage(&self, node: AttrId) -> Vec<AttrId> {
        let mut lineage = Vec::with_capacity(self.attr(node).depth as usize);
        let mut current = node;
        while let Some(parent) = self.attr(current).parent {
            lineage.push(current);
            current = parent;
        }
        lineage.reverse();
        lineage
    }
}

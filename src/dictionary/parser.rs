//! Reader for FreeRADIUS style dictionary files.
//!
//! Supported statements: `ATTRIBUTE`, `VALUE`, `VENDOR`, `BEGIN-VENDOR`, `END-VENDOR` and
//! `$INCLUDE`. Unrecognised keywords are logged and skipped so that stock dictionaries can be
//! loaded without modification.

use std::{
    fs,
    path::{Path, PathBuf},
};

use super::{AttrId, DataType, Dictionary, DictionaryError, ATTR_VENDOR_SPECIFIC};

/// Dictionary shipped with the binary.
const BUILTIN: &str = include_str!("../../share/dictionary");

/// Name of the file read from a dictionary directory.
pub const DICTIONARY_FILE: &str = "dictionary";

const MAX_INCLUDE_DEPTH: usize = 16;

impl Dictionary {
    /// Creates a dictionary populated from the built-in definitions.
    ///
    /// # Errors
    /// Only fails if the embedded file is itself broken.
    pub fn builtin() -> Result<Self, DictionaryError> {
        let mut dict = Dictionary::new();
        dict.load_str(BUILTIN, Path::new("<builtin>"))?;
        Ok(dict)
    }

    /// Loads `<dir>/dictionary` on top of the current definitions.
    pub fn load_dir(&mut self, dir: &Path) -> Result<(), DictionaryError> {
        self.load_file(&dir.join(DICTIONARY_FILE))
    }

    /// Loads a dictionary file on top of the current definitions.
    ///
    /// # Errors
    /// Returns `DictionaryError::Io` if the file (or a file it includes) cannot be read and
    /// `DictionaryError::At` for any error in its contents.
    pub fn load_file(&mut self, path: &Path) -> Result<(), DictionaryError> {
        let mut reader = Reader::new(self);
        reader.read_file(path)?;
        reader.finish(path)
    }

    /// Parses dictionary text. `origin` names the text in errors and anchors `$INCLUDE`.
    pub fn load_str(&mut self, text: &str, origin: &Path) -> Result<(), DictionaryError> {
        let mut reader = Reader::new(self);
        reader.read_text(text, origin)?;
        reader.finish(origin)
    }
}

/// Vendor block currently open.
struct VendorBlock {
    name: String,
    node: AttrId,
}

struct Reader<'d> {
    dict: &'d mut Dictionary,
    vendor: Option<VendorBlock>,
    depth: usize,
}

impl<'d> Reader<'d> {
    fn new(dict: &'d mut Dictionary) -> Self {
        Reader {
            dict,
            vendor: None,
            depth: 0,
        }
    }

    fn read_file(&mut self, path: &Path) -> Result<(), DictionaryError> {
        let text = fs::read_to_string(path).map_err(|e| DictionaryError::Io {
            file: path.display().to_string(),
            reason: e.to_string(),
        })?;
        log::debug!("Loading dictionary {}", path.display());
        self.read_text(&text, path)
    }

    fn read_text(&mut self, text: &str, origin: &Path) -> Result<(), DictionaryError> {
        for (number, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default();
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            self.statement(&fields, origin)
                .map_err(|e| match e {
                    // Errors from included files already carry their own position.
                    DictionaryError::At { .. } | DictionaryError::Io { .. } => e,
                    other => DictionaryError::At {
                        file: origin.display().to_string(),
                        line: number + 1,
                        source: Box::new(other),
                    },
                })?;
        }
        Ok(())
    }

    fn finish(self, origin: &Path) -> Result<(), DictionaryError> {
        match self.vendor {
            Some(block) => Err(DictionaryError::At {
                file: origin.display().to_string(),
                line: 0,
                source: Box::new(DictionaryError::Syntax(format!(
                    "BEGIN-VENDOR {} has no matching END-VENDOR",
                    block.name
                ))),
            }),
            None => Ok(()),
        }
    }

    fn statement(&mut self, fields: &[&str], origin: &Path) -> Result<(), DictionaryError> {
        match fields[0] {
            "ATTRIBUTE" => self.attribute(fields),
            "VALUE" => self.value(fields),
            "VENDOR" => self.vendor(fields),
            "BEGIN-VENDOR" => self.begin_vendor(fields),
            "END-VENDOR" => self.end_vendor(fields),
            "$INCLUDE" => self.include(fields, origin),
            other => {
                log::debug!("Skipping unsupported dictionary keyword \"{}\"", other);
                Ok(())
            }
        }
    }

    fn attribute(&mut self, fields: &[&str]) -> Result<(), DictionaryError> {
        if fields.len() < 4 {
            return Err(DictionaryError::Syntax(
                "ATTRIBUTE requires a name, a number and a type".to_string(),
            ));
        }
        let name = fields[1];
        let data_type: DataType = fields[3].parse()?;
        let mut nums = fields[2]
            .split('.')
            .map(parse_number)
            .collect::<Result<Vec<u32>, _>>()?;
        let num = nums.pop().ok_or_else(|| DictionaryError::InvalidNumber(fields[2].to_string()))?;

        let base = match &self.vendor {
            Some(block) => block.node,
            None => self.dict.root(),
        };
        let (parent, consumed) = self.dict.resolve_path(base, &nums);
        if consumed != nums.len() {
            return Err(DictionaryError::MissingParent(name.to_string()));
        }
        self.dict.add_attr(parent, num, name, data_type)?;
        Ok(())
    }

    fn value(&mut self, fields: &[&str]) -> Result<(), DictionaryError> {
        if fields.len() < 4 {
            return Err(DictionaryError::Syntax(
                "VALUE requires an attribute, a name and a number".to_string(),
            ));
        }
        let attr = self
            .dict
            .attr_by_name(fields[1])
            .ok_or_else(|| DictionaryError::UnknownAttribute(fields[1].to_string()))?;
        let value = parse_wide_number(fields[3])?;
        self.dict.add_value(attr, fields[2], value)
    }

    fn vendor(&mut self, fields: &[&str]) -> Result<(), DictionaryError> {
        if fields.len() < 3 {
            return Err(DictionaryError::Syntax("VENDOR requires a name and a number".to_string()));
        }
        let num = parse_number(fields[2])?;
        self.dict.add_vendor(fields[1], num);
        Ok(())
    }

    fn begin_vendor(&mut self, fields: &[&str]) -> Result<(), DictionaryError> {
        if fields.len() < 2 {
            return Err(DictionaryError::Syntax("BEGIN-VENDOR requires a vendor name".to_string()));
        }
        if let Some(block) = &self.vendor {
            return Err(DictionaryError::Syntax(format!(
                "BEGIN-VENDOR {} inside vendor block {}",
                fields[1], block.name
            )));
        }
        let name = fields[1];
        let vendor_num = self
            .dict
            .vendor_by_name(name)
            .ok_or_else(|| DictionaryError::UnknownVendor(name.to_string()))?;

        let container = match fields.get(2) {
            None => self
                .dict
                .child_by_num(self.dict.root(), ATTR_VENDOR_SPECIFIC)
                .ok_or_else(|| DictionaryError::MissingParent(name.to_string()))?,
            Some(format) => self.extended_container(name, format)?,
        };

        let node = match self.dict.child_by_num(container, vendor_num) {
            Some(node) => node,
            None => {
                let node_name = if self.dict.attr_by_name(name).is_none() {
                    name.to_string()
                } else {
                    format!("{}-{}", self.dict.attr(container).name(), name)
                };
                self.dict.add_attr(container, vendor_num, &node_name, DataType::Vendor)?
            }
        };
        self.vendor = Some(VendorBlock {
            name: name.to_string(),
            node,
        });
        Ok(())
    }

    /// Resolves `format=Extended-Vendor-Specific-<n>` to the evs node below `240+n`.
    fn extended_container(&self, vendor: &str, format: &str) -> Result<AttrId, DictionaryError> {
        let n = format
            .strip_prefix("format=Extended-Vendor-Specific-")
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| (1..=4).contains(n))
            .ok_or_else(|| DictionaryError::Syntax(format!("Invalid vendor format \"{}\"", format)))?;
        self.dict
            .child_by_num(self.dict.root(), 240 + n)
            .and_then(|extended| self.dict.child_by_num(extended, ATTR_VENDOR_SPECIFIC))
            .ok_or_else(|| DictionaryError::MissingParent(vendor.to_string()))
    }

    fn end_vendor(&mut self, fields: &[&str]) -> Result<(), DictionaryError> {
        match (&self.vendor, fields.get(1)) {
            (Some(block), Some(name)) if block.name.eq_ignore_ascii_case(name) => {
                self.vendor = None;
                Ok(())
            }
            _ => Err(DictionaryError::Syntax(format!(
                "END-VENDOR {} does not close an open vendor block",
                fields.get(1).unwrap_or(&"")
            ))),
        }
    }

    fn include(&mut self, fields: &[&str], origin: &Path) -> Result<(), DictionaryError> {
        let target = fields
            .get(1)
            .ok_or_else(|| DictionaryError::Syntax("$INCLUDE requires a path".to_string()))?;
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(DictionaryError::Syntax(format!(
                "$INCLUDE nested more than {} levels",
                MAX_INCLUDE_DEPTH
            )));
        }
        let path = match origin.parent() {
            Some(dir) if Path::new(target).is_relative() => dir.join(target),
            _ => PathBuf::from(target),
        };
        self.depth += 1;
        let result = self.read_file(&path);
        self.depth -= 1;
        result
    }
}

fn parse_number(text: &str) -> Result<u32, DictionaryError> {
    parse_wide_number(text)
        .and_then(|n| u32::try_from(n).map_err(|_| DictionaryError::InvalidNumber(text.to_string())))
}

fn parse_wide_number(text: &str) -> Result<u64, DictionaryError> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| DictionaryError::InvalidNumber(text.to_string()))
}

//! Platform descriptors loaded from JSON
//!
//! One descriptor holds the ground truth for one platform key: class sizes,
//! base classes, field offsets and where each interceptable function's
//! dispatch slot lives. Descriptors are deployed next to the framework so
//! they can be updated for a new host build without recompiling mods.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use shadowhook_sdk::{ClassLayout, FieldLayout, FunctionIdentity, ParseError, PlatformKey, SlotLocation};

/// Errors that can occur when loading descriptors
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("Failed to read descriptor {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse descriptor {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid platform key in descriptor: {0}")]
    InvalidPlatform(#[source] ParseError),

    #[error("Invalid function identity in descriptor: {0}")]
    InvalidIdentity(#[source] ParseError),

    #[error("Invalid number for {context}: {value:?}")]
    InvalidNumber { context: String, value: String },

    #[error("Function {identity} must have exactly one of vtable, address or pattern")]
    InvalidSlot { identity: FunctionIdentity },

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Function {0} is described more than once")]
    DuplicateFunction(FunctionIdentity),

    #[error("Class '{class}' has unknown base class '{base}'")]
    UnknownBase { class: String, base: String },

    #[error("Base class chain of '{class}' is cyclic")]
    BaseCycle { class: String },

    #[error("Duplicate descriptor for platform {0}")]
    DuplicatePlatform(PlatformKey),

    #[error("No descriptor for platform {0}")]
    NoDescriptor(PlatformKey),
}

/// Integer that may be written as a JSON number or a "0x" hex string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Int(u64),
    Text(String),
}

impl RawNumber {
    fn value(&self, context: impl Fn() -> String) -> Result<u64, DescriptorError> {
        let text = match self {
            RawNumber::Int(v) => return Ok(*v),
            RawNumber::Text(text) => text,
        };

        let trimmed = text.trim();
        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => trimmed.parse(),
        };

        parsed.map_err(|_| DescriptorError::InvalidNumber {
            context: context(),
            value: text.clone(),
        })
    }

    fn size(&self, context: impl Fn() -> String) -> Result<usize, DescriptorError> {
        let value = self.value(&context)?;
        usize::try_from(value).map_err(|_| DescriptorError::InvalidNumber {
            context: context(),
            value: value.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDescriptor {
    platform: String,
    #[serde(default)]
    classes: BTreeMap<String, RawClass>,
    #[serde(default)]
    functions: BTreeMap<String, RawFunction>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawClass {
    size: RawNumber,
    base: Option<String>,
    vtable: Option<RawNumber>,
    #[serde(default)]
    fields: BTreeMap<String, RawField>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawField {
    offset: RawNumber,
    size: RawNumber,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFunction {
    vtable: Option<RawNumber>,
    address: Option<RawNumber>,
    pattern: Option<String>,
}

/// Ground truth for one host class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub layout: ClassLayout,

    /// RVA of the class's primary vtable, when any of its methods are
    /// reached through virtual dispatch
    pub vtable: Option<u64>,

    /// Fields described directly on this class, keyed by field name
    pub fields: BTreeMap<String, FieldLayout>,
}

/// Ground truth for one platform key
#[derive(Debug, Clone)]
pub struct PlatformDescriptor {
    platform: PlatformKey,
    classes: HashMap<String, ClassInfo>,
    functions: HashMap<FunctionIdentity, SlotLocation>,
}

impl PlatformDescriptor {
    /// Load a descriptor from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, DescriptorError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| DescriptorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Load a descriptor from a JSON string
    pub fn load_from_str(json: &str) -> Result<Self, DescriptorError> {
        Self::parse(json, "<string>")
    }

    fn parse(json: &str, origin: &str) -> Result<Self, DescriptorError> {
        let raw: RawDescriptor =
            serde_json::from_str(json).map_err(|source| DescriptorError::Json {
                origin: origin.to_string(),
                source,
            })?;

        let platform: PlatformKey = raw
            .platform
            .parse()
            .map_err(DescriptorError::InvalidPlatform)?;

        let mut classes = HashMap::with_capacity(raw.classes.len());
        for (name, class) in raw.classes {
            let size = class.size.size(|| format!("{} size", name))?;
            let vtable = match &class.vtable {
                Some(v) => Some(v.value(|| format!("{} vtable", name))?),
                None => None,
            };

            let mut fields = BTreeMap::new();
            for (field, raw_field) in class.fields {
                let offset = raw_field
                    .offset
                    .size(|| format!("{}::{} offset", name, field))?;
                let field_size = raw_field
                    .size
                    .size(|| format!("{}::{} size", name, field))?;
                fields.insert(
                    field.clone(),
                    FieldLayout::new(name.as_str(), field, offset, field_size),
                );
            }

            let layout = ClassLayout::new(name.as_str(), size, class.base.as_deref());
            classes.insert(name, ClassInfo { layout, vtable, fields });
        }

        let mut functions = HashMap::with_capacity(raw.functions.len());
        for (text, function) in raw.functions {
            let identity: FunctionIdentity =
                text.parse().map_err(DescriptorError::InvalidIdentity)?;

            let slot = match (function.vtable, function.address, function.pattern) {
                (Some(index), None, None) => SlotLocation::VTable {
                    index: index.size(|| format!("{} vtable index", identity))?,
                },
                (None, Some(rva), None) => SlotLocation::Address {
                    rva: rva.value(|| format!("{} address", identity))?,
                },
                (None, None, Some(pattern)) => {
                    parse_pattern(&pattern)?;
                    SlotLocation::Pattern { pattern }
                }
                _ => return Err(DescriptorError::InvalidSlot { identity }),
            };

            if functions.contains_key(&identity) {
                return Err(DescriptorError::DuplicateFunction(identity));
            }
            functions.insert(identity, slot);
        }

        let descriptor = Self {
            platform,
            classes,
            functions,
        };
        descriptor.validate_bases()?;

        tracing::info!(
            "Loaded descriptor for {}: {} classes, {} functions",
            descriptor.platform,
            descriptor.classes.len(),
            descriptor.functions.len()
        );

        Ok(descriptor)
    }

    /// Every base must be described and no chain may loop
    fn validate_bases(&self) -> Result<(), DescriptorError> {
        for (name, info) in &self.classes {
            let mut seen = HashSet::new();
            seen.insert(name.as_str());

            let mut current = info;
            while let Some(base) = current.layout.base.as_deref() {
                current = self
                    .classes
                    .get(base)
                    .ok_or_else(|| DescriptorError::UnknownBase {
                        class: current.layout.name.clone(),
                        base: base.to_string(),
                    })?;

                if !seen.insert(base) {
                    return Err(DescriptorError::BaseCycle { class: name.clone() });
                }
            }
        }
        Ok(())
    }

    /// The platform this descriptor describes
    pub fn platform(&self) -> &PlatformKey {
        &self.platform
    }

    /// Look up a class by name
    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    /// Iterate over all described classes
    pub fn classes(&self) -> impl Iterator<Item = &ClassInfo> {
        self.classes.values()
    }

    /// Walk a class and its bases, most-derived first
    pub fn base_chain<'a>(&'a self, class: &str) -> impl Iterator<Item = &'a ClassInfo> + 'a {
        // Bases were checked for cycles at load time
        let mut next = self.classes.get(class);
        std::iter::from_fn(move || {
            let current = next?;
            next = current
                .layout
                .base
                .as_deref()
                .and_then(|base| self.classes.get(base));
            Some(current)
        })
    }

    /// Find the ground truth for a field, searching base classes as well
    ///
    /// Offsets are absolute, so a field inherited from a base resolves to
    /// the base's offset unchanged.
    pub fn resolve_field(&self, class: &str, field: &str) -> Option<&FieldLayout> {
        self.base_chain(class).find_map(|info| info.fields.get(field))
    }

    /// Where the dispatch slot for a function lives
    pub fn function(&self, identity: &FunctionIdentity) -> Option<&SlotLocation> {
        self.functions.get(identity)
    }

    /// Iterate over all described functions
    pub fn functions(&self) -> impl Iterator<Item = (&FunctionIdentity, &SlotLocation)> {
        self.functions.iter()
    }
}

/// A set of descriptors, at most one per platform key
#[derive(Debug, Default)]
pub struct DescriptorCatalog {
    descriptors: HashMap<PlatformKey, Arc<PlatformDescriptor>>,
}

impl DescriptorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` file in a directory
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self, DescriptorError> {
        let dir = dir.as_ref();
        let io_err = |source| DescriptorError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut catalog = Self::new();
        for path in paths {
            catalog.insert(PlatformDescriptor::load_from_file(&path)?)?;
        }

        tracing::debug!(
            "Descriptor catalog {:?}: {} platforms",
            dir,
            catalog.descriptors.len()
        );
        Ok(catalog)
    }

    /// Add a descriptor, rejecting a second one for the same platform
    pub fn insert(&mut self, descriptor: PlatformDescriptor) -> Result<(), DescriptorError> {
        let key = descriptor.platform().clone();
        if self.descriptors.contains_key(&key) {
            return Err(DescriptorError::DuplicatePlatform(key));
        }
        self.descriptors.insert(key, Arc::new(descriptor));
        Ok(())
    }

    pub fn get(&self, platform: &PlatformKey) -> Option<Arc<PlatformDescriptor>> {
        self.descriptors.get(platform).cloned()
    }

    /// Like [`get`](Self::get), but a missing platform is an error
    pub fn require(&self, platform: &PlatformKey) -> Result<Arc<PlatformDescriptor>, DescriptorError> {
        self.get(platform)
            .ok_or_else(|| DescriptorError::NoDescriptor(platform.clone()))
    }

    /// Platforms with a descriptor, sorted
    pub fn platforms(&self) -> Vec<PlatformKey> {
        let mut keys: Vec<_> = self.descriptors.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Parse a byte pattern string
///
/// Supports:
/// - Hex bytes: "55 48 89 E5"
/// - Wildcards: "55 ? 89 E5" or "55 ?? 89 E5"
pub fn parse_pattern(pattern: &str) -> Result<Vec<Option<u8>>, DescriptorError> {
    let mut result = Vec::new();

    for part in pattern.split_whitespace() {
        if part == "?" || part == "??" {
            result.push(None);
        } else {
            let byte = u8::from_str_radix(part, 16)
                .map_err(|_| DescriptorError::InvalidPattern(format!("Invalid hex byte: {}", part)))?;
            result.push(Some(byte));
        }
    }

    if result.is_empty() {
        return Err(DescriptorError::InvalidPattern(
            "Empty pattern".to_string(),
        ));
    }

    Ok(result)
}

/// Find the first occurrence of a pattern, returning its offset
pub fn scan_pattern(haystack: &[u8], pattern: &[Option<u8>]) -> Option<usize> {
    if pattern.is_empty() || haystack.len() < pattern.len() {
        return None;
    }

    haystack.windows(pattern.len()).position(|window| {
        window
            .iter()
            .zip(pattern)
            .all(|(actual, expected)| expected.map_or(true, |b| b == *actual))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowhook_sdk::{Arch, Os};

    const DESCRIPTOR: &str = r#"{
        "platform": "linux-x86_64@2.206",
        "classes": {
            "cocos2d::CCObject": {
                "size": "0x38",
                "vtable": "0x5e1a40",
                "fields": { "m_uID": { "offset": 8, "size": 4 } }
            },
            "cocos2d::CCNode": {
                "size": 264,
                "base": "cocos2d::CCObject",
                "fields": { "m_fRotationX": { "offset": "0x38", "size": 4 } }
            }
        },
        "functions": {
            "AppDelegate::trySaveGame(bool)": { "vtable": 42 },
            "PlayLayer::update(float)": { "address": "0x2a1c30" },
            "MenuLayer::init()": { "pattern": "55 48 89 E5 ?? 57" }
        }
    }"#;

    #[test]
    fn test_parse_pattern() {
        let pattern = parse_pattern("55 48 89 E5").unwrap();
        assert_eq!(pattern, vec![Some(0x55), Some(0x48), Some(0x89), Some(0xE5)]);

        let pattern = parse_pattern("55 ? 89 ??").unwrap();
        assert_eq!(pattern, vec![Some(0x55), None, Some(0x89), None]);

        assert!(parse_pattern("").is_err());
        assert!(parse_pattern("55 XY").is_err());
    }

    #[test]
    fn test_scan_pattern() {
        let data = [0x00, 0x55, 0x48, 0x89, 0xE5, 0x00];
        let pattern = vec![Some(0x55), Some(0x48), Some(0x89), Some(0xE5)];
        assert_eq!(scan_pattern(&data, &pattern), Some(1));
    }

    #[test]
    fn test_scan_pattern_with_wildcard() {
        let data = [0x00, 0x55, 0xFF, 0x89, 0xE5, 0x00];
        let pattern = vec![Some(0x55), None, Some(0x89), Some(0xE5)];
        assert_eq!(scan_pattern(&data, &pattern), Some(1));
        assert_eq!(scan_pattern(&data[..3], &pattern), None);
    }

    #[test]
    fn test_load_descriptor() {
        let descriptor = PlatformDescriptor::load_from_str(DESCRIPTOR).unwrap();
        assert_eq!(
            descriptor.platform(),
            &PlatformKey::new(Os::Linux, Arch::X86_64, "2.206")
        );

        let object = descriptor.class("cocos2d::CCObject").unwrap();
        assert_eq!(object.layout.size, 0x38);
        assert_eq!(object.vtable, Some(0x5e1a40));

        let node = descriptor.class("cocos2d::CCNode").unwrap();
        assert_eq!(node.layout.base.as_deref(), Some("cocos2d::CCObject"));
        assert_eq!(node.vtable, None);

        let save: FunctionIdentity = "AppDelegate::trySaveGame(bool)".parse().unwrap();
        assert_eq!(descriptor.function(&save), Some(&SlotLocation::VTable { index: 42 }));

        let update: FunctionIdentity = "PlayLayer::update(float)".parse().unwrap();
        assert_eq!(
            descriptor.function(&update),
            Some(&SlotLocation::Address { rva: 0x2a1c30 })
        );
    }

    #[test]
    fn test_resolve_field_walks_bases() {
        let descriptor = PlatformDescriptor::load_from_str(DESCRIPTOR).unwrap();

        let own = descriptor.resolve_field("cocos2d::CCNode", "m_fRotationX").unwrap();
        assert_eq!((own.offset, own.size), (0x38, 4));

        let inherited = descriptor.resolve_field("cocos2d::CCNode", "m_uID").unwrap();
        assert_eq!(inherited.class, "cocos2d::CCObject");
        assert_eq!(inherited.offset, 8);

        assert!(descriptor.resolve_field("cocos2d::CCObject", "m_fRotationX").is_none());

        let chain: Vec<_> = descriptor
            .base_chain("cocos2d::CCNode")
            .map(|c| c.layout.name.as_str())
            .collect();
        assert_eq!(chain, ["cocos2d::CCNode", "cocos2d::CCObject"]);
    }

    #[test]
    fn test_rejects_unknown_base() {
        let json = r#"{
            "platform": "linux-x86_64@1",
            "classes": { "A": { "size": 8, "base": "Missing" } }
        }"#;
        assert!(matches!(
            PlatformDescriptor::load_from_str(json),
            Err(DescriptorError::UnknownBase { .. })
        ));
    }

    #[test]
    fn test_rejects_base_cycle() {
        let json = r#"{
            "platform": "linux-x86_64@1",
            "classes": {
                "A": { "size": 8, "base": "B" },
                "B": { "size": 8, "base": "A" }
            }
        }"#;
        assert!(matches!(
            PlatformDescriptor::load_from_str(json),
            Err(DescriptorError::BaseCycle { .. })
        ));
    }

    #[test]
    fn test_rejects_ambiguous_slot() {
        let json = r#"{
            "platform": "linux-x86_64@1",
            "functions": { "A::f()": { "vtable": 1, "address": "0x10" } }
        }"#;
        assert!(matches!(
            PlatformDescriptor::load_from_str(json),
            Err(DescriptorError::InvalidSlot { .. })
        ));

        let json = r#"{ "platform": "linux-x86_64@1", "functions": { "A::f()": {} } }"#;
        assert!(matches!(
            PlatformDescriptor::load_from_str(json),
            Err(DescriptorError::InvalidSlot { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_function() {
        // Both keys name Widget::draw(int) once the signature is trimmed
        let json = r#"{
            "platform": "linux-x86_64@1",
            "functions": {
                "Widget::draw(int)": { "vtable": 1 },
                "Widget::draw( int )": { "vtable": 2 }
            }
        }"#;
        match PlatformDescriptor::load_from_str(json) {
            Err(DescriptorError::DuplicateFunction(identity)) => {
                assert_eq!(identity.to_string(), "Widget::draw(int)");
            }
            other => panic!("expected duplicate function error, got {:?}", other.map(|d| d.platform().clone())),
        }
    }

    #[test]
    fn test_rejects_bad_values() {
        let json = r#"{ "platform": "linux@1" }"#;
        assert!(matches!(
            PlatformDescriptor::load_from_str(json),
            Err(DescriptorError::InvalidPlatform(_))
        ));

        let json = r#"{ "platform": "linux-x86_64@1", "classes": { "A": { "size": "0xZZ" } } }"#;
        assert!(matches!(
            PlatformDescriptor::load_from_str(json),
            Err(DescriptorError::InvalidNumber { .. })
        ));

        let json = r#"{ "platform": "linux-x86_64@1", "functions": { "A::f()": { "pattern": "GG" } } }"#;
        assert!(matches!(
            PlatformDescriptor::load_from_str(json),
            Err(DescriptorError::InvalidPattern(_))
        ));

        assert!(matches!(
            PlatformDescriptor::load_from_str("{"),
            Err(DescriptorError::Json { .. })
        ));
    }

    #[test]
    fn test_catalog_rejects_duplicate_platform() {
        let mut catalog = DescriptorCatalog::new();
        catalog
            .insert(PlatformDescriptor::load_from_str(DESCRIPTOR).unwrap())
            .unwrap();

        let err = catalog
            .insert(PlatformDescriptor::load_from_str(DESCRIPTOR).unwrap())
            .unwrap_err();
        assert!(matches!(err, DescriptorError::DuplicatePlatform(_)));

        let key: PlatformKey = "linux-x86_64@2.206".parse().unwrap();
        assert!(catalog.get(&key).is_some());
        assert!(matches!(
            catalog.require(&"android-arm@2.206".parse().unwrap()),
            Err(DescriptorError::NoDescriptor(_))
        ));
    }

    #[test]
    fn test_catalog_load_dir() {
        let dir = std::env::temp_dir().join(format!(
            "shadowhook-descriptors-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("linux.json"), DESCRIPTOR).unwrap();
        std::fs::write(
            dir.join("android.json"),
            r#"{ "platform": "android-arm@2.206" }"#,
        )
        .unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let catalog = DescriptorCatalog::load_dir(&dir).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.platforms(),
            vec![
                "linux-x86_64@2.206".parse::<PlatformKey>().unwrap(),
                "android-arm@2.206".parse::<PlatformKey>().unwrap(),
            ]
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }
}

//! Layout manifests
//!
//! A manifest is what a mod build hands to the `layout-check` gate: the
//! mod's declared classes for one platform, serialized as JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use shadowhook_sdk::{ClassDecl, ClassLayout, FieldLayout, PlatformKey};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid platform key in manifest: {0}")]
    InvalidPlatform(#[from] shadowhook_sdk::ParseError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestField {
    pub name: String,
    pub offset: usize,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestClass {
    pub name: String,
    pub size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default)]
    pub fields: Vec<ManifestField>,
}

impl From<&ClassDecl> for ManifestClass {
    fn from(decl: &ClassDecl) -> Self {
        Self {
            name: decl.layout.name.clone(),
            size: decl.layout.size,
            base: decl.layout.base.clone(),
            fields: decl
                .fields
                .iter()
                .map(|f| ManifestField {
                    name: f.field.clone(),
                    offset: f.offset,
                    size: f.size,
                })
                .collect(),
        }
    }
}

impl From<&ManifestClass> for ClassDecl {
    fn from(class: &ManifestClass) -> Self {
        let layout = ClassLayout::new(class.name.as_str(), class.size, class.base.as_deref());
        class.fields.iter().fold(ClassDecl::new(layout), |decl, f| {
            decl.with_field(FieldLayout::new(
                class.name.as_str(),
                f.name.as_str(),
                f.offset,
                f.size,
            ))
        })
    }
}

/// Declared layouts of one mod for one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutManifest {
    pub mod_id: String,
    /// Textual platform key, e.g. `linux-x86_64@2.206`
    pub platform: String,
    pub classes: Vec<ManifestClass>,
}

impl LayoutManifest {
    pub fn new(mod_id: impl Into<String>, platform: &PlatformKey, decls: &[ClassDecl]) -> Self {
        Self {
            mod_id: mod_id.into(),
            platform: platform.to_string(),
            classes: decls.iter().map(ManifestClass::from).collect(),
        }
    }

    pub fn platform(&self) -> Result<PlatformKey, ManifestError> {
        Ok(self.platform.parse()?)
    }

    /// Declarations in the form the verifier consumes
    pub fn decls(&self) -> Vec<ClassDecl> {
        self.classes.iter().map(ClassDecl::from).collect()
    }

    pub fn to_json(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_str(json)?;
        manifest.platform()?;
        Ok(manifest)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Save the manifest, creating parent directories if needed
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ManifestError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        tracing::debug!("Saved layout manifest for {} to {:?}", self.mod_id, path);
        Ok(())
    }
}

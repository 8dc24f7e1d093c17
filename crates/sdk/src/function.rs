//! Function identities and dispatch slots

use std::fmt;
use std::str::FromStr;

use crate::platform::ParseError;

/// Uniquely identifies one interceptable host entry point
///
/// The textual form is `Class::method(signature)`, where the class may itself
/// contain `::` (namespaces) and the signature is the parameter list without
/// the enclosing parentheses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionIdentity {
    pub class: String,
    pub method: String,
    pub signature: String,
}

impl FunctionIdentity {
    pub fn new(
        class: impl Into<String>,
        method: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            class: class.into(),
            method: method.into(),
            signature: signature.into(),
        }
    }
}

impl fmt::Display for FunctionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}({})", self.class, self.method, self.signature)
    }
}

impl FromStr for FunctionIdentity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseError::new("function identity", s);

        let open = s.find('(').ok_or_else(err)?;
        let signature = s[open..]
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(err)?;
        let (class, method) = s[..open].rsplit_once("::").ok_or_else(err)?;

        if class.is_empty() || method.is_empty() {
            return Err(err());
        }

        Ok(Self::new(class, method, signature.trim()))
    }
}

/// Where the dispatch slot of a function lives for one platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotLocation {
    /// Index into the owning class's vtable
    VTable { index: usize },

    /// Entry point at a fixed offset from the host image base
    Address { rva: u64 },

    /// Entry point found by scanning the host image for a byte pattern
    Pattern { pattern: String },
}

//! Platform keys
//!
//! A [`PlatformKey`] names one (operating system, architecture, host build)
//! combination. Every piece of layout ground truth is keyed by it.

use std::fmt;
use std::str::FromStr;

/// Error returned when parsing platform keys, function identities or slot
/// patterns from their textual form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    kind: &'static str,
    input: String,
}

impl ParseError {
    pub(crate) fn new(kind: &'static str, input: &str) -> Self {
        Self {
            kind,
            input: input.to_string(),
        }
    }

    /// What was being parsed ("platform key", "function identity", ...)
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// The rejected input
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}", self.kind, self.input)
    }
}

impl std::error::Error for ParseError {}

/// Host operating system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Os {
    Windows,
    Linux,
    MacOs,
    Android,
    Ios,
}

impl Os {
    /// Operating system of the compilation target
    pub const fn current() -> Option<Self> {
        if cfg!(target_os = "windows") {
            Some(Os::Windows)
        } else if cfg!(target_os = "android") {
            Some(Os::Android)
        } else if cfg!(target_os = "linux") {
            Some(Os::Linux)
        } else if cfg!(target_os = "ios") {
            Some(Os::Ios)
        } else if cfg!(target_os = "macos") {
            Some(Os::MacOs)
        } else {
            None
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Os::Windows => "windows",
            Os::Linux => "linux",
            Os::MacOs => "macos",
            Os::Android => "android",
            Os::Ios => "ios",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Os {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "windows" | "win" => Ok(Os::Windows),
            "linux" => Ok(Os::Linux),
            "macos" | "mac" => Ok(Os::MacOs),
            "android" => Ok(Os::Android),
            "ios" => Ok(Os::Ios),
            _ => Err(ParseError::new("operating system", s)),
        }
    }
}

/// Host CPU architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arch {
    X86,
    X86_64,
    Arm,
    Aarch64,
}

impl Arch {
    /// Architecture of the compilation target
    pub const fn current() -> Option<Self> {
        if cfg!(target_arch = "x86_64") {
            Some(Arch::X86_64)
        } else if cfg!(target_arch = "x86") {
            Some(Arch::X86)
        } else if cfg!(target_arch = "aarch64") {
            Some(Arch::Aarch64)
        } else if cfg!(target_arch = "arm") {
            Some(Arch::Arm)
        } else {
            None
        }
    }

    /// Size of a host pointer (and therefore of a vtable slot) in bytes
    pub const fn pointer_width(&self) -> usize {
        match self {
            Arch::X86 | Arch::Arm => 4,
            Arch::X86_64 | Arch::Aarch64 => 8,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
            Arch::Arm => "arm",
            Arch::Aarch64 => "aarch64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86" | "i686" => Ok(Arch::X86),
            "x86_64" | "x64" | "amd64" => Ok(Arch::X86_64),
            "arm" | "armv7" => Ok(Arch::Arm),
            "aarch64" | "arm64" => Ok(Arch::Aarch64),
            _ => Err(ParseError::new("architecture", s)),
        }
    }
}

/// (operating system, architecture, host build) tuple
///
/// Chosen once per build or run and never mutated. The textual form is
/// `{os}-{arch}@{build}`, e.g. `android-arm@2.206`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlatformKey {
    pub os: Os,
    pub arch: Arch,
    pub build: String,
}

impl PlatformKey {
    pub fn new(os: Os, arch: Arch, build: impl Into<String>) -> Self {
        Self {
            os,
            arch,
            build: build.into(),
        }
    }

    /// Key for the compilation target running against the given host build
    ///
    /// Returns `None` on targets the host never ships for.
    pub fn current(build: impl Into<String>) -> Option<Self> {
        Some(Self::new(Os::current()?, Arch::current()?, build))
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}@{}", self.os, self.arch, self.build)
    }
}

impl FromStr for PlatformKey {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseError::new("platform key", s);

        let (target, build) = s.split_once('@').ok_or_else(err)?;
        let (os, arch) = target.split_once('-').ok_or_else(err)?;

        if build.is_empty() {
            return Err(err());
        }

        Ok(Self {
            os: os.parse().map_err(|_| err())?,
            arch: arch.parse().map_err(|_| err())?,
            build: build.to_string(),
        })
    }
}

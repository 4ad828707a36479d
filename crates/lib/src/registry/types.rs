//! Component registry records.
//!
//! Everything here is immutable configuration, loaded once at startup. The
//! resolver and the stager key all behaviour off these records rather than off
//! component names.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The toolchain family a component's build runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentKind {
  /// Commands run after sourcing the build environment setup script.
  Ewdk,
  /// Commands run in a plain shell with the compiler root exported.
  Native,
}

impl EnvironmentKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      EnvironmentKind::Ewdk => "ewdk",
      EnvironmentKind::Native => "native",
    }
  }
}

impl fmt::Display for EnvironmentKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// What a component contributes to the release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentRole {
  Driver,
  Agent,
  Installer,
}

/// Target architecture of a build output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
  X86,
  X64,
}

impl Arch {
  pub const ALL: [Arch; 2] = [Arch::X86, Arch::X64];

  pub fn as_str(&self) -> &'static str {
    match self {
      Arch::X86 => "x86",
      Arch::X64 => "x64",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The part an artifact plays in the installer's input tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
  /// Kernel-mode driver binary.
  Driver,
  /// Catalog / signature file.
  Catalog,
  /// Driver setup information file.
  Inf,
  /// User-mode agent binary.
  Agent,
  /// Anything else the installer ships (symbols, co-installers, tools).
  Support,
}

impl ArtifactRole {
  pub fn as_str(&self) -> &'static str {
    match self {
      ArtifactRole::Driver => "driver",
      ArtifactRole::Catalog => "catalog",
      ArtifactRole::Inf => "inf",
      ArtifactRole::Agent => "agent",
      ArtifactRole::Support => "support",
    }
  }
}

impl fmt::Display for ArtifactRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// An output a component declares it produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDecl {
  pub arch: Arch,
  pub role: ArtifactRole,
  /// Glob relative to the component checkout, e.g. `xenbus/x64/*.sys`.
  pub pattern: String,
}

/// One component repository taking part in the release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentSpec {
  pub name: String,
  pub url: String,
  #[serde(rename = "ref")]
  pub git_ref: String,
  pub kind: EnvironmentKind,
  pub role: ComponentRole,
  /// Build command run inside the checkout. Detected from the checkout when absent.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub entry: Option<String>,
  #[serde(default)]
  pub artifacts: Vec<ArtifactDecl>,
}

impl ComponentSpec {
  pub fn is_installer(&self) -> bool {
    self.role == ComponentRole::Installer
  }
}

/// Where one (component, arch, role) triple lands in the staging tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutEntry {
  pub component: String,
  pub arch: Arch,
  pub role: ArtifactRole,
  /// Directory relative to the staging root.
  pub dest: String,
  #[serde(default = "default_required")]
  pub required: bool,
}

fn default_required() -> bool {
  true
}

/// A directory copied verbatim from a component checkout into the staging tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraCopy {
  pub component: String,
  /// Directory relative to the component checkout.
  pub source: String,
  /// Directory relative to the staging root.
  pub dest: String,
}

/// The directory shape the installer's build expects as input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallerLayout {
  pub entries: Vec<LayoutEntry>,
  #[serde(default)]
  pub extras: Vec<ExtraCopy>,
}

impl InstallerLayout {
  pub fn find(&self, component: &str, arch: Arch, role: ArtifactRole) -> Option<&LayoutEntry> {
    self
      .entries
      .iter()
      .find(|e| e.component == component && e.arch == arch && e.role == role)
  }

  pub fn required(&self) -> impl Iterator<Item = &LayoutEntry> {
    self.entries.iter().filter(|e| e.required)
  }
}

/// The fixed set of files the installer build must leave behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSpec {
  /// Paths relative to the installer checkout.
  pub outputs: Vec<String>,
  pub archive_name: String,
  pub certificate_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branding {
  pub manufacturer: String,
}

impl Branding {
  /// Common name of the test-signing certificate.
  pub fn test_certificate_name(&self) -> String {
    format!("{}(test)", self.manufacturer)
  }
}

/// The full, validated component registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySet {
  pub components: Vec<ComponentSpec>,
  pub layout: InstallerLayout,
  pub release: ReleaseSpec,
  pub branding: Branding,
}

impl RepositorySet {
  pub fn get(&self, name: &str) -> Option<&ComponentSpec> {
    self.components.iter().find(|c| c.name == name)
  }

  /// The single installer component. Validation guarantees there is exactly one.
  pub fn installer(&self) -> Option<&ComponentSpec> {
    self.components.iter().find(|c| c.is_installer())
  }

  /// Every component the installer consumes, in registry order.
  pub fn non_installer(&self) -> impl Iterator<Item = &ComponentSpec> {
    self.components.iter().filter(|c| !c.is_installer())
  }

  pub fn names(&self) -> Vec<&str> {
    self.components.iter().map(|c| c.name.as_str()).collect()
  }
}

//! The built-in registry: the PV driver set, the guest agent and the installer.

use super::types::{
  Arch, ArtifactDecl, ArtifactRole, Branding, ComponentRole, ComponentSpec, EnvironmentKind, ExtraCopy, InstallerLayout,
  LayoutEntry, ReleaseSpec, RepositorySet,
};

const UPSTREAM: &str = "https://github.com/xcp-ng";
const DEFAULT_REF: &str = "master";

const DRIVERS: [&str; 5] = ["xenbus", "xeniface", "xenvif", "xennet", "xenvbd"];
const AGENT: &str = "xenguestagent";
const INSTALLER: &str = "win-installer";

/// Repository name for a short component name (`xenbus` -> `win-xenbus`).
fn repo_name(short: &str) -> String {
  format!("win-{}", short)
}

fn repo_url(name: &str) -> String {
  format!("{}/{}.git", UPSTREAM, name)
}

fn driver(short: &str) -> ComponentSpec {
  let name = repo_name(short);
  let mut artifacts = Vec::new();
  for arch in Arch::ALL {
    for (role, ext) in [
      (ArtifactRole::Driver, "sys"),
      (ArtifactRole::Catalog, "cat"),
      (ArtifactRole::Inf, "inf"),
      (ArtifactRole::Support, "dll"),
    ] {
      artifacts.push(ArtifactDecl {
        arch,
        role,
        pattern: format!("{}/{}/*.{}", short, arch, ext),
      });
    }
  }

  ComponentSpec {
    url: repo_url(&name),
    name,
    git_ref: DEFAULT_REF.to_string(),
    kind: EnvironmentKind::Ewdk,
    role: ComponentRole::Driver,
    entry: None,
    artifacts,
  }
}

fn agent() -> ComponentSpec {
  let name = repo_name(AGENT);
  let artifacts = Arch::ALL
    .into_iter()
    .map(|arch| ArtifactDecl {
      arch,
      role: ArtifactRole::Agent,
      pattern: format!("{}/{}/*.exe", AGENT, arch),
    })
    .collect();

  ComponentSpec {
    url: repo_url(&name),
    name,
    git_ref: DEFAULT_REF.to_string(),
    kind: EnvironmentKind::Native,
    role: ComponentRole::Agent,
    entry: None,
    artifacts,
  }
}

fn installer() -> ComponentSpec {
  ComponentSpec {
    name: INSTALLER.to_string(),
    url: repo_url(INSTALLER),
    git_ref: DEFAULT_REF.to_string(),
    kind: EnvironmentKind::Native,
    role: ComponentRole::Installer,
    entry: Some("python build.py".to_string()),
    artifacts: Vec::new(),
  }
}

fn layout() -> InstallerLayout {
  let mut entries = Vec::new();
  for short in DRIVERS {
    for arch in Arch::ALL {
      for (role, required) in [
        (ArtifactRole::Driver, true),
        (ArtifactRole::Catalog, true),
        (ArtifactRole::Inf, true),
        (ArtifactRole::Support, false),
      ] {
        entries.push(LayoutEntry {
          component: repo_name(short),
          arch,
          role,
          dest: format!("{}/{}", short, arch),
          required,
        });
      }
    }
  }
  for arch in Arch::ALL {
    entries.push(LayoutEntry {
      component: repo_name(AGENT),
      arch,
      role: ArtifactRole::Agent,
      dest: format!("{}/{}", AGENT, arch),
      required: true,
    });
  }

  InstallerLayout {
    entries,
    extras: vec![ExtraCopy {
      component: INSTALLER.to_string(),
      source: "src/vmcleaner".to_string(),
      dest: "vmcleaner".to_string(),
    }],
  }
}

/// The registry used when no registry file is given.
pub fn builtin() -> RepositorySet {
  let mut components: Vec<ComponentSpec> = DRIVERS.iter().map(|short| driver(short)).collect();
  components.push(agent());
  components.push(installer());

  RepositorySet {
    components,
    layout: layout(),
    release: ReleaseSpec {
      outputs: vec![
        "installer/managementagentx64.msi".to_string(),
        "installer/managementagentx86.msi".to_string(),
        "installer/Setup.exe".to_string(),
      ],
      archive_name: "win-pv-drivers.zip".to_string(),
      certificate_name: "testsign.cer".to_string(),
    },
    branding: Branding {
      manufacturer: "XCP-ng".to_string(),
    },
  }
}

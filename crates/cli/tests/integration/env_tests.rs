//! Env command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn env_lists_every_component() {
  let env = TestEnv::new();

  let mut assert = env.pvbundle_cmd().arg("env").assert().success();
  for spec in &env.set.components {
    assert = assert.stdout(predicate::str::contains(spec.name.as_str()));
  }
}

#[test]
fn env_json_resolves_launchers() {
  let env = TestEnv::new();

  let output = env.pvbundle_cmd().args(["env", "--json"]).output().unwrap();
  assert!(output.status.success());

  let items: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(items.len(), env.set.components.len());

  let xenbus = items.iter().find(|i| i["component"] == "win-xenbus").unwrap();
  assert_eq!(xenbus["kind"], "ewdk");
  let prelude = xenbus["environment"]["launcher"]["prelude"].as_str().unwrap();
  assert!(prelude.contains("SetupBuildEnv.sh"));
  assert!(
    xenbus["environment"]["working_dir"]
      .as_str()
      .unwrap()
      .ends_with("win-xenbus")
  );

  let agent = items.iter().find(|i| i["component"] == "win-xenguestagent").unwrap();
  assert_eq!(agent["kind"], "native");
  assert!(agent["environment"]["launcher"]["prelude"].is_null());
  assert!(agent["environment"]["env"]["WIX"].is_string());
}

//! Fetch command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn unreachable_repositories_are_all_reported() {
  let mut env = TestEnv::new();
  for spec in &mut env.set.components {
    spec.url = env.temp.path().join("upstream").join(&spec.name).display().to_string();
  }
  env.write_registry();

  let mut assert = env
    .pvbundle_cmd()
    .arg("fetch")
    .assert()
    .failure()
    .stderr(predicate::str::contains("7 of 7 components failed to fetch"));
  for spec in &env.set.components {
    assert = assert.stderr(predicate::str::contains(format!("{} [fetch]", spec.name)));
  }
}

use serde_json::json;

use esy_lib::plan::export::BuildPlan;
use esy_lib::store::StoreTier;

use super::common::{Workspace, read};

/// `shared/tool` is an immutable package consumed by two projects.
fn shared_tool(ws: &Workspace) {
  ws.write_json(
    "shared/tool/package.json",
    json!({
      "name": "tool",
      "version": "2.0.0",
      "esy": {
        "build": "sh -c 'echo tool-built > #{self.share}/marker'",
        "exportedEnv": { "TOOL_HOME": { "val": "#{self.share}", "scope": "global" } }
      }
    }),
  );
  for project in ["one", "two"] {
    ws.write_json(
      &format!("{project}/package.json"),
      json!({
        "name": project,
        "version": "0.1.0",
        "esy": { "build": "sh -c 'echo $TOOL_HOME > #{self.share}/tool-home'" },
        "dependencies": { "tool": "path:../shared/tool" }
      }),
    );
  }
}

#[tokio::test]
async fn immutable_builds_are_shared_between_projects() {
  let ws = Workspace::new();
  shared_tool(&ws);

  let one = ws.load("one");
  let tool = one.graph.find("tool").unwrap();
  assert_eq!(one.graph.task(tool).tier, StoreTier::Global);

  let report = one.executor(one.build_options()).build_root().await.unwrap();
  assert_eq!(report.built.len(), 2);
  let tool_install = one.stores.entry(one.graph.task(tool)).install_dir;
  assert_eq!(read(&tool_install.join("share/marker")), "tool-built");

  let root_install = one.stores.entry(one.graph.root_task()).install_dir;
  assert_eq!(
    read(&root_install.join("share/tool-home")),
    tool_install.join("share").display().to_string()
  );

  let two = ws.load("two");
  let report = two.executor(two.build_options()).build_root().await.unwrap();
  assert_eq!(report.cached, vec![one.graph.task(tool).id.clone()]);
  assert_eq!(report.built, vec![two.graph.root_task().id.clone()]);
}

#[tokio::test]
async fn resolution_override_changes_the_build() {
  let ws = Workspace::new();
  shared_tool(&ws);
  ws.write_json(
    "one/package.json",
    json!({
      "name": "one",
      "version": "0.1.0",
      "esy": { "build": "true" },
      "dependencies": { "tool": "path:../shared/tool" },
      "resolutions": {
        "tool": {
          "source": "path:../shared/tool",
          "override": { "build": "sh -c 'echo overridden > #{self.share}/marker'" }
        }
      }
    }),
  );

  let one = ws.load("one");
  let two = ws.load("two");
  let tool_one = one.graph.task(one.graph.find("tool").unwrap());
  let tool_two = two.graph.task(two.graph.find("tool").unwrap());
  assert_ne!(tool_one.id, tool_two.id);

  one.executor(one.build_options()).build_root().await.unwrap();
  let marker = one.stores.entry(tool_one).install_dir.join("share/marker");
  assert_eq!(read(&marker), "overridden");
}

#[test]
fn build_plan_of_the_root_names_dependency_paths() {
  let ws = Workspace::new();
  shared_tool(&ws);
  let one = ws.load("one");

  let plan = BuildPlan::render(&one.graph, &one.stores, &one.globals, one.graph.root()).unwrap();
  assert_eq!(plan.source_type, "root");
  let tool = one.graph.task(one.graph.find("tool").unwrap());
  let tool_share = one.stores.entry(tool).install_dir.join("share");
  assert_eq!(plan.env.get("TOOL_HOME"), Some(tool_share.to_string_lossy().as_ref()));
}

#[test]
fn later_declared_dependency_exports_win() {
  let ws = Workspace::new();
  for name in ["zeta", "alpha"] {
    ws.write_json(
      &format!("app/{name}/package.json"),
      json!({
        "name": name,
        "version": "1.0.0",
        "esy": {
          "build": "true",
          "exportedEnv": {
            "SHARED_VAR": { "val": format!("from-{name}"), "scope": "global" },
            "LOCAL_VAR": { "val": format!("local-{name}"), "scope": "local" }
          }
        }
      }),
    );
  }
  ws.write_json(
    "app/package.json",
    json!({
      "name": "app",
      "version": "0.1.0",
      "esy": { "build": "true", "buildEnv": { "OWN_VAR": "$SHARED_VAR-own" } },
      "dependencies": { "zeta": "path:./zeta", "alpha": "path:./alpha" }
    }),
  );

  let app = ws.load("app");
  let plan = BuildPlan::render(&app.graph, &app.stores, &app.globals, app.graph.root()).unwrap();
  assert_eq!(plan.env.get("SHARED_VAR"), Some("from-alpha"));
  assert_eq!(plan.env.get("LOCAL_VAR"), Some("local-alpha"));
  assert_eq!(plan.env.get("OWN_VAR"), Some("from-alpha-own"));
}

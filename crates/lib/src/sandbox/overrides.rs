//! Override records and the manifest merge.
//!
//! An override patches a source manifest. Plain fields (`build`, `exportedEnv`,
//! …) replace the source field wholesale; `…Override` fields merge key by key,
//! where `null` deletes the key:
//!
//! ```json
//! {
//!   "build": "make",
//!   "exportedEnvOverride": { "KEEP": { "val": "new" }, "DROP": null }
//! }
//! ```
//!
//! Every field is parsed once into a [`Patch`], so applying an override is a
//! single typed merge with no null checks.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::manifest::{CommandList, ExportedVar, OrderedMap, PackageManifest};

/// Keys accepted in an override record.
pub const OVERRIDE_KEYS: &[&str] = &[
  "build",
  "buildDev",
  "install",
  "buildsInSource",
  "buildEnv",
  "buildEnvOverride",
  "exportedEnv",
  "exportedEnvOverride",
  "dependencies",
  "devDependencies",
  "resolutions",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverrideError {
  #[error("unknown override key '{key}' (expected one of: {})", OVERRIDE_KEYS.join(", "))]
  UnknownKey { key: String },

  #[error("override sets both '{replace}' and '{merge}'")]
  Conflict { replace: &'static str, merge: &'static str },

  #[error("override must be a JSON object")]
  NotAnObject,

  #[error("invalid override: {0}")]
  Invalid(String),
}

/// One field of an override: absent, set to a value, or set to `null`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
  Keep,
  Set(T),
  Delete,
}

impl<T> Default for Patch<T> {
  fn default() -> Self {
    Patch::Keep
  }
}

impl<T> Patch<T> {
  pub fn is_keep(&self) -> bool {
    matches!(self, Patch::Keep)
  }

  /// Apply to a field whose deleted state is `T::default()`.
  fn apply_to(&self, target: &mut T)
  where
    T: Clone + Default,
  {
    match self {
      Patch::Keep => {}
      Patch::Set(value) => *target = value.clone(),
      Patch::Delete => *target = T::default(),
    }
  }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    Ok(match Option::<T>::deserialize(deserializer)? {
      Some(value) => Patch::Set(value),
      None => Patch::Delete,
    })
  }
}

impl<T: Serialize> Serialize for Patch<T> {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Patch::Set(value) => value.serialize(serializer),
      Patch::Keep | Patch::Delete => serializer.serialize_none(),
    }
  }
}

/// A parsed override record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Override {
  #[serde(default, skip_serializing_if = "Patch::is_keep")]
  pub build: Patch<CommandList>,

  #[serde(default, skip_serializing_if = "Patch::is_keep")]
  pub build_dev: Patch<CommandList>,

  #[serde(default, skip_serializing_if = "Patch::is_keep")]
  pub install: Patch<CommandList>,

  #[serde(default, skip_serializing_if = "Patch::is_keep")]
  pub builds_in_source: Patch<bool>,

  #[serde(default, skip_serializing_if = "Patch::is_keep")]
  pub build_env: Patch<OrderedMap<String>>,

  #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
  pub build_env_override: OrderedMap<Patch<String>>,

  #[serde(default, skip_serializing_if = "Patch::is_keep")]
  pub exported_env: Patch<OrderedMap<ExportedVar>>,

  #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
  pub exported_env_override: OrderedMap<Patch<ExportedVar>>,

  #[serde(default, skip_serializing_if = "Patch::is_keep")]
  pub dependencies: Patch<OrderedMap<String>>,

  #[serde(default, skip_serializing_if = "Patch::is_keep")]
  pub dev_dependencies: Patch<OrderedMap<String>>,

  #[serde(default, skip_serializing_if = "Patch::is_keep")]
  pub resolutions: Patch<OrderedMap<serde_json::Value>>,
}

impl Override {
  /// Parse an override payload, rejecting unknown and conflicting keys.
  pub fn parse(value: &serde_json::Value) -> Result<Self, OverrideError> {
    let object = value.as_object().ok_or(OverrideError::NotAnObject)?;
    if let Some(key) = object.keys().find(|k| !OVERRIDE_KEYS.contains(&k.as_str())) {
      return Err(OverrideError::UnknownKey { key: key.clone() });
    }

    let parsed: Override = serde_json::from_value(value.clone()).map_err(|e| OverrideError::Invalid(e.to_string()))?;

    if !parsed.build_env.is_keep() && !parsed.build_env_override.is_empty() {
      return Err(OverrideError::Conflict {
        replace: "buildEnv",
        merge: "buildEnvOverride",
      });
    }
    if !parsed.exported_env.is_keep() && !parsed.exported_env_override.is_empty() {
      return Err(OverrideError::Conflict {
        replace: "exportedEnv",
        merge: "exportedEnvOverride",
      });
    }
    Ok(parsed)
  }

  /// Merge this override over `source`, producing a new manifest.
  pub fn apply(&self, source: &PackageManifest) -> PackageManifest {
    let mut merged = source.clone();

    self.dependencies.apply_to(&mut merged.dependencies);
    self.dev_dependencies.apply_to(&mut merged.dev_dependencies);
    self.resolutions.apply_to(&mut merged.resolutions);

    let esy = merged.esy_config_mut();
    self.build.apply_to(&mut esy.build);
    self.install.apply_to(&mut esy.install);
    self.builds_in_source.apply_to(&mut esy.builds_in_source);
    match &self.build_dev {
      Patch::Keep => {}
      Patch::Set(cmds) => esy.build_dev = Some(cmds.clone()),
      Patch::Delete => esy.build_dev = None,
    }
    self.build_env.apply_to(&mut esy.build_env);
    self.exported_env.apply_to(&mut esy.exported_env);
    merge_patches(&mut esy.build_env, &self.build_env_override);
    merge_patches(&mut esy.exported_env, &self.exported_env_override);

    merged
  }
}

fn merge_patches<V: Clone>(target: &mut OrderedMap<V>, patches: &OrderedMap<Patch<V>>) {
  for (key, patch) in patches.iter() {
    match patch {
      Patch::Keep => {}
      Patch::Set(value) => target.insert(key, value.clone()),
      Patch::Delete => {
        target.remove(key);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::manifest::{Command, ExportScope};
  use serde_json::json;

  fn source() -> PackageManifest {
    serde_json::from_value(json!({
      "name": "dep",
      "version": "1.0.0",
      "dependencies": { "a": "*", "b": "*" },
      "esy": {
        "build": "make",
        "install": "make install",
        "buildEnv": { "CC": "gcc", "CFLAGS": "-O2" },
        "exportedEnv": {
          "KEEP": { "val": "old", "scope": "global" },
          "DROP": { "val": "gone" },
          "OTHER": { "val": "untouched" }
        }
      }
    }))
    .unwrap()
  }

  #[test]
  fn merge_override_deletes_null_keys() {
    let over = Override::parse(&json!({
      "exportedEnvOverride": { "KEEP": { "val": "new", "scope": "local" }, "DROP": null }
    }))
    .unwrap();

    let merged = over.apply(&source()).esy_config();

    let keys: Vec<_> = merged.exported_env.keys().collect();
    assert_eq!(keys, vec!["KEEP", "OTHER"]);
    assert_eq!(merged.exported_env.get("KEEP").unwrap(), &ExportedVar::new("new", ExportScope::Local));
    assert_eq!(merged.exported_env.get("OTHER").unwrap().val, "untouched");
  }

  #[test]
  fn plain_fields_replace_the_source() {
    let over = Override::parse(&json!({
      "build": ["dune build"],
      "buildEnv": { "CC": "clang" },
      "dependencies": { "c": "*" }
    }))
    .unwrap();

    let merged = over.apply(&source());
    let esy = merged.esy_config();

    assert_eq!(esy.build.0, vec![Command::Shell("dune build".into())]);
    assert_eq!(esy.install.0, vec![Command::Shell("make install".into())]);
    assert_eq!(esy.build_env.keys().collect::<Vec<_>>(), vec!["CC"]);
    assert_eq!(merged.dependencies.keys().collect::<Vec<_>>(), vec!["c"]);
  }

  #[test]
  fn null_plain_field_resets_to_default() {
    let over = Override::parse(&json!({ "install": null, "buildEnv": null })).unwrap();
    let esy = over.apply(&source()).esy_config();
    assert!(esy.install.is_empty());
    assert!(esy.build_env.is_empty());
  }

  #[test]
  fn unknown_key_is_rejected() {
    let err = Override::parse(&json!({ "biuld": "make" })).unwrap_err();
    assert_eq!(err, OverrideError::UnknownKey { key: "biuld".into() });
  }

  #[test]
  fn replace_and_merge_of_same_field_conflict() {
    let err = Override::parse(&json!({
      "buildEnv": {},
      "buildEnvOverride": { "CC": "clang" }
    }))
    .unwrap_err();
    assert!(matches!(err, OverrideError::Conflict { .. }));
  }

  #[test]
  fn empty_override_is_identity() {
    let over = Override::parse(&json!({})).unwrap();
    assert_eq!(over.apply(&source()), source());
  }

  #[test]
  fn override_serializes_without_untouched_fields() {
    let over = Override::parse(&json!({ "buildEnvOverride": { "X": null } })).unwrap();
    assert_eq!(serde_json::to_value(&over).unwrap(), json!({ "buildEnvOverride": { "X": null } }));
  }
}

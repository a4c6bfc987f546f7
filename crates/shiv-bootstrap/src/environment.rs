//! Build-time settings carried inside an archive, with runtime overrides.
//!
//! The record is written once by the archive builder as `environment.json` and
//! read back on every launch. Build-time values act as defaults only: each
//! overridable accessor consults an [`EnvOverrides`] snapshot first, so the
//! process environment always wins.

use std::collections::{BTreeMap, HashMap};
use std::env;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const INTERPRETER: &str = "SHIV_INTERPRETER";
pub const ENTRY_POINT: &str = "SHIV_ENTRY_POINT";
pub const MODULE: &str = "SHIV_MODULE";
pub const CONSOLE_SCRIPT: &str = "SHIV_CONSOLE_SCRIPT";
pub const ROOT: &str = "SHIV_ROOT";
pub const FORCE_EXTRACT: &str = "SHIV_FORCE_EXTRACT";
pub const COMPILE_PYC: &str = "SHIV_COMPILE_PYC";
pub const COMPILE_WORKERS: &str = "SHIV_COMPILE_WORKERS";
pub const EXTEND_PYTHONPATH: &str = "SHIV_EXTEND_PYTHONPATH";
pub const PREAMBLE: &str = "SHIV_PREAMBLE";
pub const LOCK_TIMEOUT: &str = "SHIV_LOCK_TIMEOUT";
pub const PYTHON: &str = "SHIV_PYTHON";

/// Variables that only steer the bootstrap and must not leak into the
/// entry point's own subprocesses.
pub const BOOTSTRAP_ONLY_VARS: [&str; 3] = [MODULE, ENTRY_POINT, CONSOLE_SCRIPT];

/// A point-in-time copy of the process environment used to resolve overrides.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    vars: HashMap<String, String>,
}

impl EnvOverrides {
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    #[must_use]
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

/// Conventional truthy vocabulary shared by every boolean override.
#[must_use]
pub fn str_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "yes" | "true" | "t" | "1"
    )
}

/// First override found among `keys`, else the build-time default.
#[must_use]
pub fn resolve_str(overrides: &EnvOverrides, keys: &[&str], default: Option<&str>) -> Option<String> {
    keys.iter()
        .find_map(|key| overrides.var(key))
        .or(default)
        .map(ToOwned::to_owned)
}

#[must_use]
pub fn resolve_bool(overrides: &EnvOverrides, key: &str, default: bool) -> bool {
    overrides.var(key).map_or(default, str_bool)
}

/// Integer overrides that fail to parse resolve to zero instead of erroring.
#[must_use]
pub fn resolve_int(overrides: &EnvOverrides, key: &str, default: usize) -> usize {
    match overrides.var(key) {
        Some(raw) => raw.trim().parse().unwrap_or(0),
        None => default,
    }
}

fn default_compile_pyc() -> bool {
    true
}

/// The `environment.json` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    built_at: String,
    shiv_version: String,
    #[serde(default)]
    always_write_cache: bool,
    #[serde(default)]
    build_id: Option<String>,
    #[serde(default = "default_compile_pyc")]
    compile_pyc: bool,
    #[serde(default)]
    entry_point: Option<String>,
    #[serde(default)]
    extend_pythonpath: bool,
    #[serde(default)]
    hashes: BTreeMap<String, String>,
    #[serde(default)]
    no_modify: bool,
    #[serde(default)]
    preamble: Option<String>,
    #[serde(default)]
    reproducible: bool,
    #[serde(default)]
    root: Option<String>,
    #[serde(default)]
    script: Option<String>,
}

impl Environment {
    pub fn new(built_at: impl Into<String>, shiv_version: impl Into<String>) -> Self {
        Self {
            built_at: built_at.into(),
            shiv_version: shiv_version.into(),
            always_write_cache: false,
            build_id: None,
            compile_pyc: default_compile_pyc(),
            entry_point: None,
            extend_pythonpath: false,
            hashes: BTreeMap::new(),
            no_modify: false,
            preamble: None,
            reproducible: false,
            root: None,
            script: None,
        }
    }

    /// Parses an `environment.json` payload.
    ///
    /// # Errors
    /// Returns an error when the payload is not a valid record.
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).context("invalid environment.json payload")
    }

    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to encode environment.json")
    }

    #[must_use]
    pub fn with_build_id(mut self, build_id: Option<String>) -> Self {
        self.build_id = build_id;
        self
    }

    #[must_use]
    pub fn with_entry_point(mut self, entry_point: Option<String>) -> Self {
        self.entry_point = entry_point;
        self
    }

    #[must_use]
    pub fn with_script(mut self, script: Option<String>) -> Self {
        self.script = script;
        self
    }

    #[must_use]
    pub fn with_compile_pyc(mut self, compile_pyc: bool) -> Self {
        self.compile_pyc = compile_pyc;
        self
    }

    #[must_use]
    pub fn with_extend_pythonpath(mut self, extend: bool) -> Self {
        self.extend_pythonpath = extend;
        self
    }

    #[must_use]
    pub fn with_no_modify(mut self, no_modify: bool) -> Self {
        self.no_modify = no_modify;
        self
    }

    #[must_use]
    pub fn with_reproducible(mut self, reproducible: bool) -> Self {
        self.reproducible = reproducible;
        self
    }

    #[must_use]
    pub fn with_preamble(mut self, preamble: Option<String>) -> Self {
        self.preamble = preamble;
        self
    }

    #[must_use]
    pub fn with_root(mut self, root: Option<String>) -> Self {
        self.root = root;
        self
    }

    #[must_use]
    pub fn with_hashes(mut self, hashes: BTreeMap<String, String>) -> Self {
        self.hashes = hashes;
        self
    }

    pub fn set_build_id(&mut self, build_id: impl Into<String>) {
        self.build_id = Some(build_id.into());
    }

    #[must_use]
    pub fn built_at(&self) -> &str {
        &self.built_at
    }

    #[must_use]
    pub fn shiv_version(&self) -> &str {
        &self.shiv_version
    }

    #[must_use]
    pub fn build_id(&self) -> Option<&str> {
        self.build_id.as_deref()
    }

    #[must_use]
    pub fn hashes(&self) -> &BTreeMap<String, String> {
        &self.hashes
    }

    #[must_use]
    pub fn no_modify(&self) -> bool {
        self.no_modify
    }

    #[must_use]
    pub fn reproducible(&self) -> bool {
        self.reproducible
    }

    #[must_use]
    pub fn entry_point(&self, overrides: &EnvOverrides) -> Option<String> {
        resolve_str(overrides, &[ENTRY_POINT, MODULE], self.entry_point.as_deref())
    }

    #[must_use]
    pub fn script(&self, overrides: &EnvOverrides) -> Option<String> {
        resolve_str(overrides, &[CONSOLE_SCRIPT], self.script.as_deref())
    }

    /// Any non-empty `SHIV_INTERPRETER` forces the interactive fallback.
    #[must_use]
    pub fn interpreter(&self, overrides: &EnvOverrides) -> bool {
        overrides
            .var(INTERPRETER)
            .is_some_and(|value| !value.is_empty())
    }

    #[must_use]
    pub fn root(&self, overrides: &EnvOverrides) -> Option<String> {
        resolve_str(overrides, &[ROOT], self.root.as_deref())
    }

    #[must_use]
    pub fn force_extract(&self, overrides: &EnvOverrides) -> bool {
        resolve_bool(overrides, FORCE_EXTRACT, self.always_write_cache)
    }

    #[must_use]
    pub fn compile_pyc(&self, overrides: &EnvOverrides) -> bool {
        resolve_bool(overrides, COMPILE_PYC, self.compile_pyc)
    }

    #[must_use]
    pub fn compile_workers(&self, overrides: &EnvOverrides) -> usize {
        resolve_int(overrides, COMPILE_WORKERS, 0)
    }

    #[must_use]
    pub fn extend_pythonpath(&self, overrides: &EnvOverrides) -> bool {
        resolve_bool(overrides, EXTEND_PYTHONPATH, self.extend_pythonpath)
    }

    #[must_use]
    pub fn preamble(&self, overrides: &EnvOverrides) -> Option<String> {
        resolve_str(overrides, &[PREAMBLE], self.preamble.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Environment {
        Environment::new("2019-01-01 12:12:12", "1.0.0")
    }

    #[test]
    fn overrides_win_over_build_defaults() {
        let env = record();
        let empty = EnvOverrides::default();

        assert_eq!(env.entry_point(&empty), None);
        let overrides = EnvOverrides::from_pairs([(ENTRY_POINT, "test")]);
        assert_eq!(env.entry_point(&overrides).as_deref(), Some("test"));

        assert!(!env.interpreter(&empty));
        let overrides = EnvOverrides::from_pairs([(INTERPRETER, "1")]);
        assert!(env.interpreter(&overrides));

        assert_eq!(env.root(&empty), None);
        let overrides = EnvOverrides::from_pairs([(ROOT, "tmp")]);
        assert_eq!(env.root(&overrides).as_deref(), Some("tmp"));

        assert!(!env.force_extract(&empty));
        let overrides = EnvOverrides::from_pairs([(FORCE_EXTRACT, "1")]);
        assert!(env.force_extract(&overrides));

        assert!(env.compile_pyc(&empty));
        let overrides = EnvOverrides::from_pairs([(COMPILE_PYC, "False")]);
        assert!(!env.compile_pyc(&overrides));

        assert!(!env.extend_pythonpath(&empty));
        let overrides = EnvOverrides::from_pairs([(EXTEND_PYTHONPATH, "1")]);
        assert!(env.extend_pythonpath(&overrides));

        assert_eq!(env.compile_workers(&empty), 0);
        let overrides = EnvOverrides::from_pairs([(COMPILE_WORKERS, "1")]);
        assert_eq!(env.compile_workers(&overrides), 1);
    }

    #[test]
    fn overrides_replace_non_empty_build_values() {
        let env = record()
            .with_entry_point(Some("pkg.cli:main".into()))
            .with_script(Some("tool".into()))
            .with_preamble(Some("pre.py".into()))
            .with_extend_pythonpath(true);
        let overrides = EnvOverrides::from_pairs([
            (ENTRY_POINT, "other:run"),
            (CONSOLE_SCRIPT, "other-tool"),
            (PREAMBLE, "setup.sh"),
            (EXTEND_PYTHONPATH, "no"),
        ]);
        assert_eq!(env.entry_point(&overrides).as_deref(), Some("other:run"));
        assert_eq!(env.script(&overrides).as_deref(), Some("other-tool"));
        assert_eq!(env.preamble(&overrides).as_deref(), Some("setup.sh"));
        assert!(!env.extend_pythonpath(&overrides));
    }

    #[test]
    fn entry_point_prefers_entry_point_var_over_module_var() {
        let env = record();
        let overrides = EnvOverrides::from_pairs([(MODULE, "mod:fn"), (ENTRY_POINT, "ep:fn")]);
        assert_eq!(env.entry_point(&overrides).as_deref(), Some("ep:fn"));
        let overrides = EnvOverrides::from_pairs([(MODULE, "mod:fn")]);
        assert_eq!(env.entry_point(&overrides).as_deref(), Some("mod:fn"));
    }

    #[test]
    fn unparsable_worker_count_falls_back_to_zero() {
        let env = record();
        let overrides = EnvOverrides::from_pairs([(COMPILE_WORKERS, "one bazillion")]);
        assert_eq!(env.compile_workers(&overrides), 0);
        let overrides = EnvOverrides::from_pairs([(COMPILE_WORKERS, " 4 ")]);
        assert_eq!(env.compile_workers(&overrides), 4);
    }

    #[test]
    fn str_bool_accepts_truthy_vocabulary() {
        for value in ["yes", "TRUE", "t", "1", "Yes"] {
            assert!(str_bool(value), "{value} should be truthy");
        }
        for value in ["no", "0", "false", "", "enabled"] {
            assert!(!str_bool(value), "{value} should be falsey");
        }
    }

    #[test]
    fn json_round_trip_preserves_every_field() {
        let mut hashes = BTreeMap::new();
        hashes.insert("pkg/__init__.py".to_string(), "ab".repeat(32));
        let env = record()
            .with_build_id(Some("deadbeef".into()))
            .with_entry_point(Some("pkg:main".into()))
            .with_no_modify(true)
            .with_reproducible(true)
            .with_root(Some("$HOME".into()))
            .with_hashes(hashes);
        let encoded = env.to_json().expect("encode");
        let decoded = Environment::from_json(&encoded).expect("decode");
        assert_eq!(env, decoded);
    }

    #[test]
    fn from_json_fills_defaults_for_missing_keys() {
        let env = Environment::from_json(r#"{"built_at": "x", "shiv_version": "1"}"#)
            .expect("minimal record");
        let empty = EnvOverrides::default();
        assert!(env.compile_pyc(&empty));
        assert!(env.hashes().is_empty());
        assert_eq!(env.build_id(), None);
    }
}

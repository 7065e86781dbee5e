//! Shared JSON fixtures for dazrig tests, listed in `fixtures/manifest.json`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    scenes: BTreeMap<String, String>,
    #[serde(default)]
    contexts: BTreeMap<String, String>,
}

fn locate(table: &BTreeMap<String, String>, kind: &str, name: &str) -> Result<PathBuf> {
    let rel = table
        .get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))?;
    Ok(Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../../../fixtures")
        .join(rel))
}

/// DAZ scene documents.
pub mod scenes {
    use super::*;

    /// Scene names in sorted order.
    pub fn keys() -> Vec<String> {
        MANIFEST.scenes.keys().cloned().collect()
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        locate(&MANIFEST.scenes, "scene", name)
    }

    pub fn bytes(name: &str) -> Result<Vec<u8>> {
        let path = path(name)?;
        fs::read(&path).with_context(|| format!("failed to read fixture at {}", path.display()))
    }

    pub fn json(name: &str) -> Result<String> {
        String::from_utf8(bytes(name)?).with_context(|| format!("scene fixture {name} is not UTF-8"))
    }
}

/// Build configuration documents.
pub mod contexts {
    use serde::de::DeserializeOwned;

    use super::*;

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let path = locate(&MANIFEST.contexts, "context", name)?;
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read fixture at {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("failed to parse context fixture {name}"))
    }
}

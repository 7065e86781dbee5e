//! Scene JSON loading.
//!
//! DAZ exports are plain JSON or gzip-compressed JSON; the two are told apart by
//! the gzip magic bytes rather than the file extension.

use std::fs;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

use crate::asset::SceneFile;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Errors produced while loading a scene document.
#[derive(Debug, Error)]
pub enum JsonError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("gzip decode error: {0}")]
    Gzip(#[source] std::io::Error),
    #[error("scene json parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Parse an uncompressed scene document.
pub fn parse_scene(text: &str) -> Result<SceneFile, JsonError> {
    Ok(serde_json::from_str(text)?)
}

/// Whether `bytes` start with the gzip magic number.
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC
}

/// Parse scene bytes, inflating them first when they are gzip-compressed.
pub fn load_scene_bytes(bytes: &[u8]) -> Result<SceneFile, JsonError> {
    if is_gzip(bytes) {
        let mut decoder = libflate::gzip::Decoder::new(bytes).map_err(JsonError::Gzip)?;
        let mut inflated = Vec::new();
        decoder
            .read_to_end(&mut inflated)
            .map_err(JsonError::Gzip)?;
        log::debug!(
            "inflated gzip scene: {} -> {} bytes",
            bytes.len(),
            inflated.len()
        );
        Ok(serde_json::from_slice(&inflated)?)
    } else {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Read and parse a scene file from disk.
pub fn load_scene_file(path: impl AsRef<Path>) -> Result<SceneFile, JsonError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| JsonError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_scene_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCENE: &str = r#"{"figures": [{"name": "Genesis", "bones": []}]}"#;

    #[test]
    fn loads_plain_json() {
        let scene = load_scene_bytes(SCENE.as_bytes()).unwrap();
        assert_eq!(scene.figures.len(), 1);
        assert!(!is_gzip(SCENE.as_bytes()));
    }

    #[test]
    fn loads_gzip_json() {
        let mut encoder = libflate::gzip::Encoder::new(Vec::new()).unwrap();
        encoder.write_all(SCENE.as_bytes()).unwrap();
        let bytes = encoder.finish().into_result().unwrap();
        assert!(is_gzip(&bytes));
        let scene = load_scene_bytes(&bytes).unwrap();
        assert_eq!(scene.figures[0].name, "Genesis");
    }

    #[test]
    fn reports_parse_errors() {
        let err = parse_scene("{\"figures\": 3}").unwrap_err();
        assert!(matches!(err, JsonError::Parse(_)));
    }

    #[test]
    fn reports_missing_files() {
        let err = load_scene_file("/definitely/not/here.duf").unwrap_err();
        assert!(err.to_string().contains("not/here.duf"));
    }
}

/*
 *   Copyright (c) 2024-2025 R3BL LLC
 *   All rights reserved.
 *
 *   Licensed under the Apache License, Version 2.0 (the "License");
 *   you may not use this file except in compliance with the License.
 *   You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 *   Unless required by applicable law or agreed to in writing, software
 *   distributed under the License is distributed on an "AS IS" BASIS,
 *   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *   See the License for the specific language governing permissions and
 *   limitations under the License.
 */

//! ETag-aware cache for the remote theme-bundle download used by the
//! `set-colors --themes-dir` / theme-list flow (spec.md §4.K).
//!
//! The bundle is a zip archive; a small JSON sidecar next to the cached
//! archive records the `ETag` so later fetches can issue a conditional GET
//! and skip the download (and the unzip) entirely on a 304.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RcError;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheMeta {
    etag: String,
    url: String,
}

/// Fetches (or reuses) the zip bundle at `url`, extracting it into
/// `cache_dir` and returning the directory it was extracted to. A cache
/// hit is a 304 Not Modified response against the stored `ETag`; only a
/// cache miss re-downloads and re-extracts.
pub struct ThemesCache {
    client: reqwest::Client,
    cache_dir: PathBuf,
}

impl ThemesCache {
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>) -> ThemesCache {
        ThemesCache {
            client: reqwest::Client::new(),
            cache_dir: cache_dir.into(),
        }
    }

    fn meta_path(&self) -> PathBuf {
        self.cache_dir.join("bundle.etag.json")
    }

    fn archive_path(&self) -> PathBuf {
        self.cache_dir.join("bundle.zip")
    }

    fn extracted_dir(&self) -> PathBuf {
        self.cache_dir.join("extracted")
    }

    fn read_meta(&self) -> Option<CacheMeta> {
        let bytes = std::fs::read(self.meta_path()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Ensures the bundle at `url` is present, extracted, and up to date;
    /// returns the directory holding the extracted files.
    pub async fn ensure_fresh(&self, url: &str) -> Result<PathBuf, RcError> {
        std::fs::create_dir_all(&self.cache_dir).map_err(RcError::from)?;

        let cached = self.read_meta().filter(|meta| meta.url == url);
        let mut request = self.client.get(url);
        if let Some(meta) = &cached {
            request = request.header(reqwest::header::IF_NONE_MATCH, meta.etag.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| RcError::Transport(std::io::Error::other(e)))?;

        if response.status() == reqwest::StatusCode::NOT_MODIFIED {
            if self.extracted_dir().is_dir() {
                return Ok(self.extracted_dir());
            }
            // Cache metadata survived but the extracted tree didn't; fall
            // through and treat this as a miss by re-requesting unconditionally.
            return self.force_fetch(url).await;
        }

        if !response.status().is_success() {
            return Err(RcError::Transport(std::io::Error::other(format!(
                "themes bundle fetch failed with status {}",
                response.status()
            ))));
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| RcError::Transport(std::io::Error::other(e)))?;

        self.store_archive_atomically(&body)?;
        self.extract_archive()?;
        self.write_meta(&CacheMeta {
            etag,
            url: url.to_string(),
        })?;
        Ok(self.extracted_dir())
    }

    async fn force_fetch(&self, url: &str) -> Result<PathBuf, RcError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RcError::Transport(std::io::Error::other(e)))?;
        if !response.status().is_success() {
            return Err(RcError::Transport(std::io::Error::other(format!(
                "themes bundle fetch failed with status {}",
                response.status()
            ))));
        }
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| RcError::Transport(std::io::Error::other(e)))?;
        self.store_archive_atomically(&body)?;
        self.extract_archive()?;
        self.write_meta(&CacheMeta {
            etag,
            url: url.to_string(),
        })?;
        Ok(self.extracted_dir())
    }

    fn store_archive_atomically(&self, bytes: &[u8]) -> Result<(), RcError> {
        let tmp_path = self.cache_dir.join("bundle.zip.tmp");
        std::fs::write(&tmp_path, bytes).map_err(RcError::from)?;
        std::fs::rename(&tmp_path, self.archive_path()).map_err(RcError::from)?;
        Ok(())
    }

    fn extract_archive(&self) -> Result<(), RcError> {
        let bytes = std::fs::read(self.archive_path()).map_err(RcError::from)?;
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| RcError::Corruption(format!("corrupt themes bundle: {e}")))?;

        let extracted = self.extracted_dir();
        let tmp_extracted = self.cache_dir.join("extracted.tmp");
        if tmp_extracted.exists() {
            std::fs::remove_dir_all(&tmp_extracted).map_err(RcError::from)?;
        }
        std::fs::create_dir_all(&tmp_extracted).map_err(RcError::from)?;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| RcError::Corruption(format!("corrupt themes bundle entry: {e}")))?;
            let Some(relative_path) = entry.enclosed_name() else {
                continue;
            };
            let out_path = tmp_extracted.join(relative_path);
            if entry.is_dir() {
                std::fs::create_dir_all(&out_path).map_err(RcError::from)?;
                continue;
            }
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(RcError::from)?;
            }
            let mut out_file = std::fs::File::create(&out_path).map_err(RcError::from)?;
            std::io::copy(&mut entry, &mut out_file).map_err(RcError::from)?;
        }

        if extracted.exists() {
            std::fs::remove_dir_all(&extracted).map_err(RcError::from)?;
        }
        std::fs::rename(&tmp_extracted, &extracted).map_err(RcError::from)?;
        Ok(())
    }

    fn write_meta(&self, meta: &CacheMeta) -> Result<(), RcError> {
        let tmp_path = self.cache_dir.join("bundle.etag.json.tmp");
        let bytes = serde_json::to_vec_pretty(meta).map_err(RcError::from)?;
        std::fs::write(&tmp_path, bytes).map_err(RcError::from)?;
        std::fs::rename(&tmp_path, self.meta_path()).map_err(RcError::from)?;
        Ok(())
    }
}

/// Lists the extracted theme file stems (without extension) under
/// `extracted_dir`, sorted for deterministic CLI output.
pub fn list_theme_names(extracted_dir: &Path) -> Result<Vec<String>, RcError> {
    let mut names: Vec<String> = std::fs::read_dir(extracted_dir)
        .map_err(RcError::from)?
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .collect();
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_theme_names_returns_sorted_file_stems() {
        let dir = std::env::temp_dir().join(format!(
            "rc_core_themes_test_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("zeta.toml"), b"").unwrap();
        std::fs::write(dir.join("alpha.toml"), b"").unwrap();

        let names = list_theme_names(&dir).unwrap();
        assert_eq!(names, vec!["alpha", "zeta"]);

        std::fs::remove_dir_all(&dir).ok();
    }
}

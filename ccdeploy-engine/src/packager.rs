//! Chaincode source packaging.
//!
//! [`DirectoryPackager`] reads `<build_root>/src/<path>` recursively and
//! produces a [`ChaincodeBundle`]: the files in sorted relative-path order
//! plus a SHA-256 digest over paths and contents. Dot-files and
//! dot-directories (`.git`, editor state) are skipped.

use std::path::{Path, PathBuf};

use ccdeploy_core::types::ChaincodeSpec;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{io_err, PackageError};

/// Builds the deployable bundle for a chaincode.
pub trait Packager {
    fn package(&self, spec: &ChaincodeSpec) -> Result<ChaincodeBundle, PackageError>;
}

/// One source file inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleFile {
    /// Path relative to the source directory, `/`-separated.
    pub path: String,
    pub contents: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeBundle {
    /// Import path the chaincode was packaged from.
    pub source_path: String,
    pub files: Vec<BundleFile>,
    /// Hex SHA-256 over every `(path, contents)` pair in order.
    pub digest: String,
}

impl ChaincodeBundle {
    pub fn size(&self) -> usize {
        self.files.iter().map(|f| f.contents.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryPackager;

impl Packager for DirectoryPackager {
    fn package(&self, spec: &ChaincodeSpec) -> Result<ChaincodeBundle, PackageError> {
        let root = spec.source_dir();
        if !root.is_dir() {
            return Err(PackageError::SourceNotFound { path: root });
        }

        let mut paths = Vec::new();
        collect_files(&root, &mut paths)?;
        if paths.is_empty() {
            return Err(PackageError::Empty { path: root });
        }

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let contents = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
            files.push(BundleFile {
                path: relative_name(&root, &path),
                contents,
            });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let digest = {
            let mut h = Sha256::new();
            for file in &files {
                h.update(file.path.as_bytes());
                h.update([0u8]);
                h.update((file.contents.len() as u64).to_be_bytes());
                h.update(&file.contents);
            }
            hex::encode(h.finalize())
        };

        let bundle = ChaincodeBundle {
            source_path: spec.path.clone(),
            files,
            digest,
        };
        tracing::info!(
            chaincode = %spec.label(),
            files = bundle.files.len(),
            bytes = bundle.size(),
            digest = %bundle.digest,
            "chaincode packaged"
        );
        Ok(bundle)
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), PackageError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| io_err(&path, e))?;
        if file_type.is_dir() {
            collect_files(&path, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn spec_in(root: &Path) -> ChaincodeSpec {
        ChaincodeSpec {
            name: "example_cc".into(),
            version: "0.1".into(),
            path: "github.com/example/cc".into(),
            build_root: root.to_path_buf(),
            init_args: vec!["init".into()],
            endorsing_orgs: vec![],
        }
    }

    fn write_sources(root: &Path) -> PathBuf {
        let dir = root.join("src/github.com/example/cc");
        fs::create_dir_all(dir.join("lib")).expect("mkdir");
        fs::create_dir_all(dir.join(".git")).expect("mkdir .git");
        fs::write(dir.join("main.go"), "package main\n").expect("write");
        fs::write(dir.join("lib/store.go"), "package lib\n").expect("write");
        fs::write(dir.join(".git/HEAD"), "ref: refs/heads/main\n").expect("write");
        dir
    }

    #[test]
    fn bundles_sorted_files_and_skips_dot_entries() {
        let root = TempDir::new().expect("tempdir");
        write_sources(root.path());

        let bundle = DirectoryPackager.package(&spec_in(root.path())).expect("package");
        let names: Vec<_> = bundle.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(names, vec!["lib/store.go", "main.go"]);
        assert_eq!(bundle.digest.len(), 64);
        assert_eq!(bundle.source_path, "github.com/example/cc");
    }

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        let root = TempDir::new().expect("tempdir");
        let dir = write_sources(root.path());
        let spec = spec_in(root.path());

        let first = DirectoryPackager.package(&spec).expect("package");
        let second = DirectoryPackager.package(&spec).expect("package again");
        assert_eq!(first.digest, second.digest);

        fs::write(dir.join("main.go"), "package main // changed\n").expect("edit");
        let third = DirectoryPackager.package(&spec).expect("package edited");
        assert_ne!(first.digest, third.digest);
    }

    #[test]
    fn missing_source_dir_is_reported() {
        let root = TempDir::new().expect("tempdir");
        let err = DirectoryPackager.package(&spec_in(root.path())).unwrap_err();
        assert!(matches!(err, PackageError::SourceNotFound { .. }));
    }

    #[test]
    fn empty_source_dir_is_reported() {
        let root = TempDir::new().expect("tempdir");
        fs::create_dir_all(root.path().join("src/github.com/example/cc/.hidden")).expect("mkdir");
        let err = DirectoryPackager.package(&spec_in(root.path())).unwrap_err();
        assert!(matches!(err, PackageError::Empty { .. }));
    }
}

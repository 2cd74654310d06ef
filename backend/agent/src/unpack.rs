//! Extracts an uploaded zip archive under a target directory, mirroring
//! the teacher's `zip_directory`/`walk_files` pairing on the archiving side.
//!
//! Extraction lands in a staging directory first and is only moved into the
//! real target file-by-file once the whole archive has been read
//! successfully, so a corrupt or truncated upload never leaves a
//! half-written tree behind -- the existing contents of `target_dir` (it
//! may already hold files from a prior upload) are otherwise undisturbed.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use rockhold_core::{Result, SandboxError};

pub fn unzip_into(bytes: &[u8], target_dir: &Path) -> Result<()> {
    let staging_dir = target_dir.with_extension(format!("part-{}", uuid::Uuid::new_v4().simple()));
    extract_archive(bytes, &staging_dir).map_err(|e| {
        let _ = fs::remove_dir_all(&staging_dir);
        e
    })?;

    fs::create_dir_all(target_dir)
        .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to create {}: {e}", target_dir.display())))?;
    move_tree(&staging_dir, target_dir)?;
    let _ = fs::remove_dir_all(&staging_dir);
    Ok(())
}

fn extract_archive(bytes: &[u8], staging_dir: &Path) -> Result<()> {
    fs::create_dir_all(staging_dir)
        .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to create {}: {e}", staging_dir.display())))?;

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| SandboxError::InvalidArgument(format!("not a valid zip archive: {e}")))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to read zip entry {i}: {e}")))?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(SandboxError::InvalidArgument(format!("unsafe path in archive entry {i}")));
        };
        let out_path = staging_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to create {}: {e}", out_path.display())))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to create {}: {e}", parent.display())))?;
        }
        let mut out_file = fs::File::create(&out_path)
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to create {}: {e}", out_path.display())))?;
        std::io::copy(&mut entry, &mut out_file)
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to extract {}: {e}", out_path.display())))?;
    }

    Ok(())
}

/// Moves every file under `from` to the matching path under `to`, creating
/// parent directories as needed. Files already fully extracted into
/// `staging_dir` rename in a single filesystem operation each.
fn move_tree(from: &Path, to: &Path) -> Result<()> {
    let mut stack = vec![from.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(&dir)
            .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to read {}: {e}", dir.display())))?;
        for entry in entries {
            let entry = entry.map_err(|e| SandboxError::Internal(anyhow::anyhow!("dir entry failed: {e}")))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let relative = path.strip_prefix(from).expect("walked entry under staging dir");
            let dest: PathBuf = to.join(relative);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to create {}: {e}", parent.display())))?;
            }
            fs::rename(&path, &dest)
                .map_err(|e| SandboxError::Internal(anyhow::anyhow!("failed to move {} into place: {e}", dest.display())))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::FileOptions::default();
            for (name, data) in entries {
                writer.start_file(*name, options).unwrap();
                std::io::Write::write_all(&mut writer, data).unwrap();
            }
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn extracts_nested_files_under_target_dir() {
        let archive = build_zip(&[("a.txt", b"hello"), ("nested/b.txt", b"world")]);
        let dir = std::env::temp_dir().join(format!("rockhold-unpack-test-{}", uuid::Uuid::new_v4()));
        unzip_into(&archive, &dir).unwrap();

        assert_eq!(fs::read_to_string(dir.join("a.txt")).unwrap(), "hello");
        assert_eq!(fs::read_to_string(dir.join("nested/b.txt")).unwrap(), "world");
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn merges_into_an_already_populated_target_dir() {
        let dir = std::env::temp_dir().join(format!("rockhold-unpack-merge-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("existing.txt"), b"already here").unwrap();

        let archive = build_zip(&[("new.txt", b"fresh")]);
        unzip_into(&archive, &dir).unwrap();

        assert_eq!(fs::read_to_string(dir.join("existing.txt")).unwrap(), "already here");
        assert_eq!(fs::read_to_string(dir.join("new.txt")).unwrap(), "fresh");
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn rejects_a_non_zip_payload_without_touching_target_dir() {
        let dir = std::env::temp_dir().join(format!("rockhold-unpack-bad-{}", uuid::Uuid::new_v4()));
        let result = unzip_into(b"not a zip", &dir);
        assert!(result.is_err());
        assert!(!dir.exists());
    }
}

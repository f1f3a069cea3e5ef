//! File utilities for safe and robust file operations.
//!
//! Source files are read with a lossy UTF-8 fallback so a single oddly encoded
//! file never aborts an analysis pass, and data files are filtered the same way
//! on every platform (dot-files, plus hidden/system attributes on Windows).

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::core::errors::{AutoTemplateError, Result};

/// Safe file reading with UTF-8 validation and fallback handling
pub struct FileReader;

impl FileReader {
    /// Read a file to string, handling non-UTF-8 files gracefully
    pub fn read_to_string(file_path: &Path) -> Result<String> {
        if Self::is_likely_binary(file_path)? {
            return Err(AutoTemplateError::validation(format!(
                "File appears to be binary: {}",
                file_path.display()
            )));
        }

        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                let bytes = fs::read(file_path)
                    .map_err(|err| AutoTemplateError::io("Failed to read file as bytes", err))?;

                let content = String::from_utf8_lossy(&bytes).to_string();
                warn!(
                    "File contained invalid UTF-8, converted with lossy encoding: {}",
                    file_path.display()
                );
                Ok(content)
            }
            Err(e) => Err(AutoTemplateError::io(
                format!("Failed to read file: {}", file_path.display()),
                e,
            )),
        }
    }

    /// Check if a file is likely to be binary by sampling its first bytes
    pub fn is_likely_binary(file_path: &Path) -> Result<bool> {
        let metadata = fs::metadata(file_path)
            .map_err(|e| AutoTemplateError::io("Failed to read file metadata", e))?;

        // Generated sources beyond this size are not worth mining
        if metadata.len() > 10 * 1024 * 1024 {
            return Ok(true);
        }

        let sample_size = std::cmp::min(1024, metadata.len() as usize);
        if sample_size == 0 {
            return Ok(false);
        }

        let mut buffer = vec![0u8; sample_size];

        use std::io::Read;
        let mut file = fs::File::open(file_path)
            .map_err(|e| AutoTemplateError::io("Failed to open file for sampling", e))?;

        file.read_exact(&mut buffer)
            .map_err(|e| AutoTemplateError::io("Failed to read file sample", e))?;

        let null_bytes = buffer.iter().filter(|&&b| b == 0).count();
        let null_percentage = (null_bytes as f64 / buffer.len() as f64) * 100.0;

        Ok(null_percentage > 1.0)
    }

    /// Check if a file is a C# source file
    pub fn is_csharp_file(file_path: &Path) -> bool {
        file_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("cs"))
            .unwrap_or(false)
    }
}

/// Whether a data-directory entry should be ignored as hidden or system owned.
pub fn is_hidden_file(path: &Path) -> bool {
    let dot_file = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false);

    dot_file || has_hidden_attributes(path)
}

#[cfg(windows)]
fn has_hidden_attributes(path: &Path) -> bool {
    use std::os::windows::fs::MetadataExt;

    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    const FILE_ATTRIBUTE_SYSTEM: u32 = 0x4;

    fs::metadata(path)
        .map(|meta| meta.file_attributes() & (FILE_ATTRIBUTE_HIDDEN | FILE_ATTRIBUTE_SYSTEM) != 0)
        .unwrap_or(false)
}

#[cfg(not(windows))]
fn has_hidden_attributes(_path: &Path) -> bool {
    false
}

/// Render a relative path with forward slashes regardless of platform.
pub fn to_forward_slashes(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            std::path::Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

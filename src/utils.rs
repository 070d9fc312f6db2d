/// Utility functions for common operations
///
/// Helpers shared by the HTTP handlers and the CLI: size formatting, download
/// reference building, and input file discovery.
use crate::constants::{NO_IMPROVEMENT_LABEL, PROGRESS_BAR_TEMPLATE};
use crate::error::{Result, VaultError};
use crate::validation::is_potential_image_file;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Characters escaped inside a single path segment or query value.
const COMPONENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Format file size in human-readable format
///
/// # Arguments
/// * `bytes` - Size in bytes
///
/// # Returns
/// * Human-readable size string (e.g., "1.2 MB", "512 KB")
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Calculate compression ratio as a percentage
///
/// Positive means reduction. Never negative for stored outputs, since larger
/// results are replaced by the original.
pub fn calculate_compression_ratio(original_size: u64, compressed_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    ((original_size as f64 - compressed_size as f64) / original_size as f64) * 100.0
}

/// Human-readable savings for a result row.
pub fn describe_savings(saved_bytes: u64) -> String {
    if saved_bytes == 0 {
        NO_IMPROVEMENT_LABEL.to_string()
    } else {
        format_file_size(saved_bytes)
    }
}

pub fn download_url(job_id: &str, file_name: &str, token: &str) -> String {
    format!(
        "/download/{}/{}?t={}",
        utf8_percent_encode(job_id, COMPONENT),
        utf8_percent_encode(file_name, COMPONENT),
        utf8_percent_encode(token, COMPONENT)
    )
}

pub fn archive_url(job_id: &str, token: &str) -> String {
    format!(
        "/zip/{}?t={}",
        utf8_percent_encode(job_id, COMPONENT),
        utf8_percent_encode(token, COMPONENT)
    )
}

pub fn archive_file_name(job_id: &str) -> String {
    format!("compressed_{}.zip", job_id)
}

pub fn create_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_BAR_TEMPLATE) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Resolves a CLI input (file, directory or glob) into image file paths.
pub fn collect_image_files(input: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut image_files = Vec::new();
    let input_path = Path::new(input);

    if input_path.is_file() {
        image_files.push(input_path.to_path_buf());
    } else if input_path.is_dir() {
        let walker = if recursive {
            WalkDir::new(input_path)
        } else {
            WalkDir::new(input_path).max_depth(1)
        };

        // depth 0 is the input itself, which may legitimately be "."
        for entry in walker
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        {
            let entry = entry?;
            if entry.file_type().is_file() && is_potential_image_file(entry.path()) {
                image_files.push(entry.into_path());
            }
        }
    } else if let Ok(pattern) = glob(input) {
        image_files.extend(
            pattern
                .flatten()
                .filter(|p| p.is_file() && is_potential_image_file(p)),
        );
    }

    if image_files.is_empty() {
        return Err(VaultError::NoImageFilesFound(input.to_string()));
    }
    image_files.sort();
    Ok(image_files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_file_size(1024 * 1024 * 1024), "1.0 GB");
    }

    #[test]
    fn test_calculate_compression_ratio() {
        assert_eq!(calculate_compression_ratio(1000, 800), 20.0);
        assert_eq!(calculate_compression_ratio(1000, 1000), 0.0);
        assert_eq!(calculate_compression_ratio(0, 100), 0.0);
    }

    #[test]
    fn test_describe_savings() {
        assert_eq!(describe_savings(0), "no improvement");
        assert_eq!(describe_savings(2048), "2.0 KB");
    }

    #[test]
    fn test_reference_urls() {
        assert_eq!(
            download_url("abc", "photo-1.webp", "f00d"),
            "/download/abc/photo-1.webp?t=f00d"
        );
        assert_eq!(download_url("abc", "a b.png", "t"), "/download/abc/a%20b.png?t=t");
        assert_eq!(archive_url("abc", "f00d"), "/zip/abc?t=f00d");
        assert_eq!(archive_file_name("abc"), "compressed_abc.zip");
    }

    #[test]
    fn test_collect_image_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::write(root.join("a.jpg"), b"x").unwrap();
        std::fs::write(root.join("b.png"), b"x").unwrap();
        std::fs::write(root.join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(root.join("nested")).unwrap();
        std::fs::write(root.join("nested").join("c.webp"), b"x").unwrap();
        std::fs::create_dir(root.join(".hidden")).unwrap();
        std::fs::write(root.join(".hidden").join("d.png"), b"x").unwrap();

        let dir = root.to_str().unwrap();
        assert_eq!(collect_image_files(dir, false).unwrap().len(), 2);
        assert_eq!(collect_image_files(dir, true).unwrap().len(), 3);

        let pattern = format!("{}/*.png", dir);
        assert_eq!(
            collect_image_files(&pattern, false).unwrap(),
            vec![root.join("b.png")]
        );

        let single = root.join("a.jpg");
        assert_eq!(
            collect_image_files(single.to_str().unwrap(), false).unwrap(),
            vec![single.clone()]
        );
    }

    #[test]
    fn test_collect_image_files_empty() {
        let temp_dir = TempDir::new().unwrap();
        let result = collect_image_files(temp_dir.path().to_str().unwrap(), true);
        assert!(matches!(result, Err(VaultError::NoImageFilesFound(_))));
    }
}

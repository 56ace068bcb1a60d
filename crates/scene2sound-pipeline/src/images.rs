//! Input image discovery.

use std::path::{Path, PathBuf};

use scene2sound_media::ImageInput;
use scene2sound_types::ImageRecord;
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};

/// File extensions treated as input images (case-insensitive).
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// A folder of input images.
///
/// [`ImageSource::iter`] walks the folder lazily in file-name order; calling
/// it again re-scans and yields the same records if nothing changed on disk.
#[derive(Debug, Clone)]
pub struct ImageSource {
    root: PathBuf,
}

impl ImageSource {
    /// Open an image folder. A missing folder is a setup error.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(PipelineError::not_found(root, "input folder does not exist"));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Images under the folder, recursively.
    ///
    /// An image file whose name yields no usable identifier comes back as
    /// [`PipelineError::InvalidId`] so the caller can count it.
    pub fn iter(&self) -> impl Iterator<Item = Result<ImageRecord>> + '_ {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(root = %self.root.display(), "Skipping unreadable entry: {e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && has_image_extension(entry.path()))
            .map(|entry| {
                ImageRecord::from_path(entry.path())
                    .ok_or_else(|| PipelineError::InvalidId(entry.into_path()))
            })
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Resolve an explicitly requested image.
///
/// Fails with [`PipelineError::NotFound`] if the path does not exist or does
/// not look like an image the pipeline can read.
pub fn single(path: impl AsRef<Path>) -> Result<ImageRecord> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(PipelineError::not_found(path, "no such file"));
    }

    // Format comes from the content alone; `ImageReader::open` would take the
    // extension's word for it.
    let file = std::fs::File::open(path)
        .map_err(|e| PipelineError::not_found(path, format!("unreadable: {e}")))?;
    let reader = image::ImageReader::new(std::io::BufReader::new(file))
        .with_guessed_format()
        .map_err(|e| PipelineError::not_found(path, format!("unreadable: {e}")))?;
    if reader.format().is_none() {
        return Err(PipelineError::not_found(path, "not a recognised image file"));
    }

    ImageRecord::from_path(path)
        .ok_or_else(|| PipelineError::not_found(path, "file name has no usable stem"))
}

/// Read an image's bytes and work out its MIME type.
pub async fn load_image(record: &ImageRecord) -> Result<ImageInput> {
    let data = tokio::fs::read(&record.path)
        .await
        .map_err(PipelineError::io(&record.path))?;
    let mime_type = mime_type(&record.path, &data).to_string();
    Ok(ImageInput { data, mime_type })
}

/// MIME type from the content, falling back to the extension.
pub(crate) fn mime_type(path: &Path, data: &[u8]) -> &'static str {
    if let Ok(format) = image::guess_format(data) {
        return format.to_mime_type();
    }
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n', 0, 0, 0, 0];

    #[test]
    fn test_enumerate_sorted_recursive_and_restartable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("102.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("101.JPG"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("201.png"), b"x").unwrap();

        let source = ImageSource::open(dir.path()).unwrap();
        let ids: Vec<String> = source.iter().map(|r| r.unwrap().id).collect();
        assert_eq!(ids, vec!["101", "102", "201"]);

        let again: Vec<String> = source.iter().map(|r| r.unwrap().id).collect();
        assert_eq!(ids, again);
    }

    #[test]
    fn test_unusable_file_name_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("...jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("7.jpg"), b"x").unwrap();

        let items: Vec<_> = ImageSource::open(dir.path()).unwrap().iter().collect();
        assert_eq!(items.len(), 2);
        let bad = items.iter().find(|r| r.is_err()).unwrap().as_ref().unwrap_err();
        assert!(matches!(bad, PipelineError::InvalidId(p) if p.ends_with("...jpg")));
        assert!(items.iter().any(|r| matches!(r, Ok(rec) if rec.id == "7")));
    }

    #[test]
    fn test_open_missing_folder_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageSource::open(dir.path().join("missing")).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_single_checks_existence_and_format() {
        let dir = tempfile::tempdir().unwrap();

        let missing = single(dir.path().join("nope.jpg")).unwrap_err();
        assert!(matches!(missing, PipelineError::NotFound { .. }));

        // The extension alone does not make a file an image.
        let text = dir.path().join("fake.jpg");
        std::fs::write(&text, b"definitely not an image").unwrap();
        assert!(matches!(
            single(&text).unwrap_err(),
            PipelineError::NotFound { .. }
        ));

        // Real PNG content behind a misleading extension is accepted.
        let renamed = dir.path().join("102.jpg");
        std::fs::write(&renamed, PNG_MAGIC).unwrap();
        assert_eq!(single(&renamed).unwrap().id, "102");

        let png = dir.path().join("101.png");
        std::fs::write(&png, PNG_MAGIC).unwrap();
        let record = single(&png).unwrap();
        assert_eq!(record.id, "101");
    }

    #[test]
    fn test_mime_type_detection() {
        assert_eq!(mime_type(Path::new("a.jpg"), PNG_MAGIC), "image/png");
        assert_eq!(mime_type(Path::new("a.bmp"), b"??"), "image/bmp");
        assert_eq!(mime_type(Path::new("a.jpg"), b"??"), "image/jpeg");
    }
}

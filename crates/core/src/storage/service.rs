//! Upload store implementation using Apache OpenDAL.

use std::path::{Path, PathBuf};

use chrono::Utc;
use opendal::{ErrorKind, Operator, services};
use tracing::{debug, warn};

use super::error::StorageError;

/// Extensions accepted for attachments.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "gif", "webp", "heic"];

const TEMP_DIR: &str = "temp";

/// Attachment store rooted at one directory.
#[derive(Debug, Clone)]
pub struct UploadStore {
    operator: Operator,
    root: PathBuf,
    max_file_size: u64,
}

impl UploadStore {
    /// Opens the store, creating the root directory when missing.
    ///
    /// # Errors
    ///
    /// Returns `Backend` if the directory cannot be created or the
    /// filesystem service cannot be initialized.
    pub fn open(root: impl Into<PathBuf>, max_file_size: u64) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(root.join(TEMP_DIR))
            .map_err(|e| StorageError::Backend(format!("{}: {e}", root.display())))?;
        let root = root
            .canonicalize()
            .map_err(|e| StorageError::Backend(format!("{}: {e}", root.display())))?;

        let builder = services::Fs::default().root(&root.to_string_lossy());
        let operator = Operator::new(builder)?.finish();

        Ok(Self {
            operator,
            root,
            max_file_size,
        })
    }

    /// Absolute, canonical upload root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maximum accepted size in bytes.
    #[must_use]
    pub const fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Checks name, size and extension of an incoming file.
    ///
    /// # Errors
    ///
    /// `InvalidFilename`, `FileTooLarge` or `DisallowedExtension`.
    pub fn validate_upload(&self, original_name: &str, size: u64) -> Result<(), StorageError> {
        validate_original_name(original_name)?;
        if size > self.max_file_size {
            return Err(StorageError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }
        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(StorageError::DisallowedExtension(ext));
        }
        Ok(())
    }

    /// Builds the stored name `{submitter_id}_{nanos}_{sanitized}`.
    #[must_use]
    pub fn stored_name(submitter_id: i32, nanos: i64, original_name: &str) -> String {
        format!("{submitter_id}_{nanos}_{}", sanitize_filename(original_name))
    }

    /// Saves an attachment and returns its stored basename.
    ///
    /// # Errors
    ///
    /// Validation errors from [`Self::validate_upload`], or `Backend`.
    pub async fn save(
        &self,
        submitter_id: i32,
        original_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, StorageError> {
        self.validate_upload(original_name, bytes.len() as u64)?;
        let name = Self::stored_name(submitter_id, now_nanos(), original_name);
        validate_basename(&name)?;

        self.operator.write(&name, bytes).await?;
        debug!(file = %name, submitter_id, "attachment saved");
        Ok(name)
    }

    /// Saves a temporary file for document extraction and returns its absolute path.
    ///
    /// # Errors
    ///
    /// Validation errors from [`Self::validate_upload`], or `Backend`.
    pub async fn save_temp(
        &self,
        original_name: &str,
        bytes: Vec<u8>,
    ) -> Result<PathBuf, StorageError> {
        self.validate_upload(original_name, bytes.len() as u64)?;
        let name = format!("{}_{}", now_nanos(), sanitize_filename(original_name));
        let key = format!("{TEMP_DIR}/{name}");
        self.operator.write(&key, bytes).await?;
        Ok(self.root.join(TEMP_DIR).join(name))
    }

    /// Removes a temporary file created by [`Self::save_temp`]. Failures are logged.
    pub async fn remove_temp(&self, path: &Path) {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        if validate_basename(name).is_err() {
            return;
        }
        if let Err(e) = self.operator.delete(&format!("{TEMP_DIR}/{name}")).await {
            warn!(file = %name, error = %e, "failed to remove temporary upload");
        }
    }

    /// Resolves a stored basename to an absolute path inside the root.
    ///
    /// # Errors
    ///
    /// `InvalidFilename` for anything but a plain basename, or a path whose
    /// canonical form escapes the root; `NotFound` if it does not exist.
    pub async fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_basename(name)?;
        let candidate = self.root.join(name);
        let resolved = match tokio::fs::canonicalize(&candidate).await {
            Ok(p) => p,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()));
            }
            Err(e) => return Err(StorageError::Backend(e.to_string())),
        };
        if !resolved.starts_with(&self.root) {
            return Err(StorageError::InvalidFilename(name.to_string()));
        }
        Ok(resolved)
    }

    /// Reads a stored attachment.
    ///
    /// # Errors
    ///
    /// See [`Self::resolve`].
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        self.resolve(name).await?;
        match self.operator.read(name).await {
            Ok(buffer) => Ok(buffer.to_vec()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes a stored attachment. Missing files are not an error.
    ///
    /// # Errors
    ///
    /// `InvalidFilename` or `Backend`.
    pub async fn delete(&self, name: &str) -> Result<(), StorageError> {
        validate_basename(name)?;
        self.operator.delete(name).await?;
        Ok(())
    }
}

fn now_nanos() -> i64 {
    Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_micros() * 1000)
}

/// Rejects anything that is not a plain basename.
///
/// Empty names, `.`/`..`, names containing `..`, `/`, `\` or NUL are refused.
///
/// # Errors
///
/// Returns `InvalidFilename`.
pub fn validate_basename(name: &str) -> Result<(), StorageError> {
    let bad = name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        Err(StorageError::InvalidFilename(name.to_string()))
    } else {
        Ok(())
    }
}

/// Rejects client filenames that carry a path.
///
/// Separators, NUL and `..` components are refused. Other odd characters are
/// left to [`sanitize_filename`].
///
/// # Errors
///
/// Returns `InvalidFilename`.
pub fn validate_original_name(name: &str) -> Result<(), StorageError> {
    let bad = name.trim().is_empty()
        || name.contains(['/', '\\', '\0'])
        || name.contains("..");
    if bad {
        Err(StorageError::InvalidFilename(name.to_string()))
    } else {
        Ok(())
    }
}

/// Sanitizes a client-supplied filename.
///
/// Only ASCII alphanumerics, dots, hyphens and underscores survive; any path
/// component is dropped first and leading dots are stripped.
#[must_use]
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').replace("..", "_");
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn store(dir: &tempfile::TempDir) -> UploadStore {
        UploadStore::open(dir.path().join("uploads"), 1024).unwrap()
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("invoice 2026.pdf"), "invoice_2026.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\docs\\q.png"), "q.png");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename("קבלה.jpg"), "____.jpg");
        assert_eq!(sanitize_filename(""), "file");
    }

    #[rstest]
    #[case("../secret")]
    #[case("a/b.pdf")]
    #[case("a\\b.pdf")]
    #[case("/etc/passwd")]
    #[case("..")]
    #[case("")]
    fn test_validate_basename_rejects(#[case] name: &str) {
        assert!(matches!(
            validate_basename(name),
            Err(StorageError::InvalidFilename(_))
        ));
    }

    #[test]
    fn test_stored_name_scheme() {
        assert_eq!(
            UploadStore::stored_name(7, 123, "my receipt.pdf"),
            "7_123_my_receipt.pdf"
        );
    }

    #[test]
    fn test_validate_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(store.validate_upload("scan.PDF", 10).is_ok());
        assert!(matches!(
            store.validate_upload("run.exe", 10),
            Err(StorageError::DisallowedExtension(_))
        ));
        assert!(matches!(
            store.validate_upload("big.pdf", 2048),
            Err(StorageError::FileTooLarge { size: 2048, max: 1024 })
        ));
    }

    #[rstest]
    #[case("../../etc/evil.pdf")]
    #[case("/etc/evil.pdf")]
    #[case("sub/dir/evil.pdf")]
    #[case("..\\evil.pdf")]
    #[case("evil..pdf")]
    #[tokio::test]
    async fn test_save_rejects_path_in_filename(#[case] original: &str) {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let err = store.save(3, original, b"%PDF".to_vec()).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidFilename(_)));
        assert_eq!(err.status_code(), 400);
        assert!(matches!(
            store.save_temp(original, b"%PDF".to_vec()).await,
            Err(StorageError::InvalidFilename(_))
        ));
        assert_eq!(std::fs::read_dir(store.root()).unwrap().count(), 1);
        assert!(!dir.path().join("etc").exists());
    }

    #[test]
    fn test_odd_characters_still_sanitized() {
        assert!(validate_original_name("my receipt (1).pdf").is_ok());
        assert!(validate_original_name("קבלה.jpg").is_ok());
        assert_eq!(
            UploadStore::stored_name(3, 1, "my receipt (1).pdf"),
            "3_1_my_receipt__1_.pdf"
        );
    }

    #[tokio::test]
    async fn test_save_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let name = store.save(3, "quote.pdf", b"%PDF".to_vec()).await.unwrap();
        assert!(name.starts_with("3_"));
        assert!(name.ends_with("_quote.pdf"));
        validate_basename(&name).unwrap();

        let resolved = store.resolve(&name).await.unwrap();
        assert!(resolved.starts_with(store.root()));
        assert_eq!(store.read(&name).await.unwrap(), b"%PDF");

        store.delete(&name).await.unwrap();
        assert!(matches!(
            store.read(&name).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        std::fs::write(dir.path().join("outside.pdf"), b"x").unwrap();

        assert!(matches!(
            store.resolve("../outside.pdf").await,
            Err(StorageError::InvalidFilename(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_rejects_symlink_escape() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let outside = dir.path().join("outside.pdf");
        std::fs::write(&outside, b"x").unwrap();
        std::os::unix::fs::symlink(&outside, store.root().join("link.pdf")).unwrap();

        assert!(matches!(
            store.resolve("link.pdf").await,
            Err(StorageError::InvalidFilename(_))
        ));
    }

    #[tokio::test]
    async fn test_temp_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let path = store.save_temp("scan.png", vec![1, 2, 3]).await.unwrap();
        assert!(path.exists());
        store.remove_temp(&path).await;
        assert!(!path.exists());
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Sanitized names contain only safe characters and always pass basename validation.
        #[test]
        fn prop_sanitized_filename_is_safe_basename(filename in ".*") {
            let sanitized = sanitize_filename(&filename);
            for c in sanitized.chars() {
                let is_safe = c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_';
                prop_assert!(is_safe, "Unexpected character in sanitized filename: {}", c);
            }
            prop_assert!(validate_basename(&sanitized).is_ok());
        }

        /// Any name with a separator or parent reference is refused.
        #[test]
        fn prop_traversal_names_rejected(prefix in "[a-z]{0,5}", suffix in "[a-z]{0,5}", sep in prop::sample::select(vec!["/", "\\", ".."])) {
            let name = format!("{prefix}{sep}{suffix}");
            prop_assert!(validate_basename(&name).is_err());
        }

        /// Stored names are always plain basenames.
        #[test]
        fn prop_stored_name_is_basename(id in 1i32..100_000, nanos in 0i64..i64::MAX, original in ".*") {
            let name = UploadStore::stored_name(id, nanos, &original);
            prop_assert!(validate_basename(&name).is_ok());
            let expected_prefix = format!("{id}_{nanos}_");
            prop_assert!(name.starts_with(&expected_prefix));
        }
    }
}

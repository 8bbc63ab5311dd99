//! `multipart/form-data` decoding.
//!
//! Text parts become form fields. File parts are streamed chunk by chunk
//! into temp files under the upload directory; each becomes an
//! [`UploadedFile`] that deletes its temp file when dropped.

use bytes::Bytes;
use portico_core::{ParamBag, TranslationError, TranslationErrorKind, UploadedFile};
use std::io;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use crate::config::MultipartLimits;

/// Decoded multipart body.
#[derive(Debug, Default)]
pub struct MultipartBody {
    /// Text parts, in order.
    pub fields: ParamBag,
    /// File parts, in order.
    pub files: Vec<UploadedFile>,
}

fn malformed(detail: impl Into<String>) -> TranslationError {
    TranslationError::new(TranslationErrorKind::MalformedBody, detail)
}

fn too_large(detail: impl Into<String>) -> TranslationError {
    TranslationError::new(TranslationErrorKind::PayloadTooLarge, detail)
}

fn spool_failed(err: &io::Error) -> TranslationError {
    TranslationError::new(
        TranslationErrorKind::UploadFailed,
        format!("cannot spool upload: {err}"),
    )
}

/// Decodes a buffered multipart body.
pub async fn read_multipart(
    content_type: &str,
    body: Bytes,
    limits: &MultipartLimits,
    upload_dir: &Path,
) -> Result<MultipartBody, TranslationError> {
    let boundary = multer::parse_boundary(content_type)
        .map_err(|_| malformed("missing or invalid boundary in multipart Content-Type"))?;

    let stream = futures_util::stream::once(async move { Ok::<_, io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut decoded = MultipartBody::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| malformed(format!("multipart parse error: {e}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            tracing::debug!("skipping multipart part without a name");
            continue;
        };

        let Some(file_name) = field.file_name().map(str::to_string) else {
            if decoded.fields.len() >= limits.max_fields {
                return Err(too_large(format!(
                    "too many form fields (max {})",
                    limits.max_fields
                )));
            }
            let text = field
                .text()
                .await
                .map_err(|e| malformed(format!("failed to read field '{name}': {e}")))?;
            decoded.fields.push(name, text);
            continue;
        };

        let mime = field.content_type().map(ToString::to_string);
        let temp = tempfile::Builder::new()
            .prefix("portico-upload-")
            .tempfile_in(upload_dir)
            .map_err(|e| spool_failed(&e))?;
        let (std_file, path) = temp.into_parts();
        let mut file = tokio::fs::File::from_std(std_file);

        let mut size: u64 = 0;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| malformed(format!("failed to read file '{name}': {e}")))?
        {
            size += chunk.len() as u64;
            if size > limits.max_file_size as u64 {
                return Err(too_large(format!(
                    "file '{file_name}' exceeds {} bytes",
                    limits.max_file_size
                )));
            }
            file.write_all(&chunk).await.map_err(|e| spool_failed(&e))?;
        }
        file.flush().await.map_err(|e| spool_failed(&e))?;

        // Browsers send an empty, unnamed part for an untouched file input.
        if file_name.is_empty() && size == 0 {
            continue;
        }
        if decoded.files.len() >= limits.max_files {
            return Err(too_large(format!(
                "too many files (max {})",
                limits.max_files
            )));
        }
        decoded
            .files
            .push(UploadedFile::new(name, Some(file_name), mime, size, path));
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CT: &str = "multipart/form-data; boundary=XBOUNDARY";

    fn body(parts: &[(&str, Option<&str>, &str)]) -> Bytes {
        let mut out = String::new();
        for (name, file, content) in parts {
            out.push_str("--XBOUNDARY\r\n");
            match file {
                Some(f) => out.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{f}\"\r\nContent-Type: text/plain\r\n\r\n"
                )),
                None => out.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            out.push_str(content);
            out.push_str("\r\n");
        }
        out.push_str("--XBOUNDARY--\r\n");
        Bytes::from(out)
    }

    #[tokio::test]
    async fn test_fields_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let decoded = read_multipart(
            CT,
            body(&[
                ("title", None, "Hello"),
                ("attachment", Some("notes.txt"), "file body"),
                ("status", None, "draft"),
            ]),
            &MultipartLimits::default(),
            dir.path(),
        )
        .await
        .unwrap();

        assert_eq!(decoded.fields.len(), 2);
        assert_eq!(decoded.fields.get("title"), Some("Hello"));
        assert_eq!(decoded.files.len(), 1);

        let file = &decoded.files[0];
        assert_eq!(file.field_name(), "attachment");
        assert_eq!(file.original_name(), Some("notes.txt"));
        assert_eq!(file.size(), 9);
        assert_eq!(file.mime(), Some("text/plain"));
        assert!(file.path().starts_with(dir.path()));
        assert_eq!(std::fs::read_to_string(file.path()).unwrap(), "file body");
    }

    #[tokio::test]
    async fn test_file_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let limits = MultipartLimits {
            max_file_size: 4,
            ..MultipartLimits::default()
        };
        let err = read_multipart(CT, body(&[("a", Some("a.txt"), "too big")]), &limits, dir.path())
            .await
            .unwrap_err();
        assert_eq!(err.kind, TranslationErrorKind::PayloadTooLarge);
    }

    #[tokio::test]
    async fn test_field_and_file_count_limits() {
        let dir = tempfile::tempdir().unwrap();
        let limits = MultipartLimits {
            max_fields: 1,
            max_files: 1,
            ..MultipartLimits::default()
        };
        let err = read_multipart(CT, body(&[("a", None, "1"), ("b", None, "2")]), &limits, dir.path())
            .await
            .unwrap_err();
        assert_eq!(err.kind, TranslationErrorKind::PayloadTooLarge);

        let err = read_multipart(
            CT,
            body(&[("a", Some("1.txt"), "1"), ("b", Some("2.txt"), "2")]),
            &limits,
            dir.path(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, TranslationErrorKind::PayloadTooLarge);
    }

    #[tokio::test]
    async fn test_empty_file_input_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let decoded = read_multipart(
            CT,
            body(&[("avatar", Some(""), "")]),
            &MultipartLimits::default(),
            dir.path(),
        )
        .await
        .unwrap();
        assert!(decoded.files.is_empty());
    }

    #[tokio::test]
    async fn test_missing_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_multipart(
            "multipart/form-data",
            Bytes::new(),
            &MultipartLimits::default(),
            dir.path(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, TranslationErrorKind::MalformedBody);
    }
}

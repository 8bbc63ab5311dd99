//! `multipart/form-data` bodies for upload tests.

use bytes::{BufMut, Bytes, BytesMut};

const DEFAULT_BOUNDARY: &str = "----portico-test-boundary";

enum Part {
    Field {
        name: String,
        value: String,
    },
    File {
        name: String,
        filename: String,
        content_type: String,
        data: Bytes,
    },
}

/// A form with text fields and file parts.
///
/// ```rust
/// use portico_test::MultipartForm;
///
/// let (content_type, body) = MultipartForm::new()
///     .text("title", "Hello")
///     .file("cover", "cover.png", "image/png", &b"\x89PNG"[..])
///     .encode();
/// assert!(content_type.starts_with("multipart/form-data; boundary="));
/// assert!(!body.is_empty());
/// ```
#[must_use]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<Part>,
}

impl MultipartForm {
    /// An empty form.
    pub fn new() -> Self {
        Self {
            boundary: DEFAULT_BOUNDARY.to_string(),
            parts: Vec::new(),
        }
    }

    /// Overrides the boundary.
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = boundary.into();
        self
    }

    /// Adds a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part::Field {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Adds a file part.
    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(Part::File {
            name: name.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
        });
        self
    }

    /// The `Content-Type` header value and the encoded body.
    #[must_use]
    pub fn encode(&self) -> (String, Bytes) {
        let mut body = BytesMut::new();
        for part in &self.parts {
            body.put_slice(format!("--{}\r\n", self.boundary).as_bytes());
            match part {
                Part::Field { name, value } => {
                    body.put_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.put_slice(value.as_bytes());
                }
                Part::File {
                    name,
                    filename,
                    content_type,
                    data,
                } => {
                    body.put_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                             Content-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.put_slice(data);
                }
            }
            body.put_slice(b"\r\n");
        }
        body.put_slice(format!("--{}--\r\n", self.boundary).as_bytes());

        (
            format!("multipart/form-data; boundary={}", self.boundary),
            body.freeze(),
        )
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let (content_type, body) = MultipartForm::new()
            .boundary("XyZ")
            .text("title", "Hello")
            .file("doc", "a.txt", "text/plain", "abc")
            .encode();

        assert_eq!(content_type, "multipart/form-data; boundary=XyZ");
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.starts_with("--XyZ\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nHello\r\n"));
        assert!(body.contains("filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\nabc\r\n"));
        assert!(body.ends_with("--XyZ--\r\n"));
    }
}

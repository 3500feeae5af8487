//! `multipart/form-data` body encoding.
//!
//! Bodies are assembled by hand so the exact bytes on the wire are under
//! our control: text fields first, then files, CRLF line endings.

const CRLF: &[u8] = b"\r\n";

#[derive(Debug, Clone)]
struct FilePart {
    name: String,
    filename: String,
    content_type: String,
    data: Vec<u8>,
}

/// A form under construction.
#[derive(Debug, Clone)]
pub struct MultipartForm {
    boundary: String,
    fields: Vec<(String, String)>,
    files: Vec<FilePart>,
}

/// An encoded form body and its boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartBody {
    /// Boundary separating the parts.
    pub boundary: String,
    /// Encoded bytes.
    pub body: Vec<u8>,
}

impl MultipartBody {
    /// Value for the `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    /// Creates an empty form with a fresh boundary.
    pub fn new() -> Self {
        Self::with_boundary(new_boundary())
    }

    /// Creates an empty form with a fixed boundary.
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            fields: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Adds a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Adds a file part.
    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.files.push(FilePart {
            name: name.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            data,
        });
        self
    }

    /// Current boundary. [`encode`](Self::encode) may replace it.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Encodes the form.
    ///
    /// If the boundary occurs inside any payload, a new one is drawn until
    /// it does not.
    pub fn encode(mut self) -> MultipartBody {
        while self.boundary_collides() {
            tracing::debug!("multipart boundary collides with payload, regenerating");
            self.boundary = new_boundary();
        }

        let mut body = Vec::with_capacity(self.encoded_len_hint());
        for (name, value) in &self.fields {
            self.open_part(&mut body);
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend_from_slice(value.as_bytes());
            body.extend_from_slice(CRLF);
        }
        for file in &self.files {
            self.open_part(&mut body);
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    file.name, file.filename, file.content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(&file.data);
            body.extend_from_slice(CRLF);
        }
        body.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());

        MultipartBody {
            boundary: self.boundary,
            body,
        }
    }

    fn open_part(&self, body: &mut Vec<u8>) {
        body.extend_from_slice(b"--");
        body.extend_from_slice(self.boundary.as_bytes());
        body.extend_from_slice(CRLF);
    }

    fn boundary_collides(&self) -> bool {
        let needle = self.boundary.as_bytes();
        self.fields
            .iter()
            .map(|(_, value)| value.as_bytes())
            .chain(self.files.iter().map(|f| f.data.as_slice()))
            .any(|payload| contains(payload, needle))
    }

    fn encoded_len_hint(&self) -> usize {
        let payload: usize = self.fields.iter().map(|(_, v)| v.len()).sum::<usize>()
            + self.files.iter().map(|f| f.data.len()).sum::<usize>();
        payload + (self.fields.len() + self.files.len() + 1) * 128
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

/// `----imgx{millis}{random}`
fn new_boundary() -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "----imgx{}{}",
        chrono::Utc::now().timestamp_millis(),
        &random[..12]
    )
}

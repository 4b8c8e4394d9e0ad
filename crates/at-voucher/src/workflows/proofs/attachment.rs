use mime::Mime;

use crate::store::RepositoryError;

pub const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;

/// Uploaded bytes before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachmentError {
    #[error("attachment is empty")]
    Empty,
    #[error("attachment is {size} bytes; the limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("'{0}' is not an accepted document type (PDF, JPEG, PNG, or TIFF)")]
    UnsupportedType(String),
}

/// Blob storage for uploaded documents.
pub trait DocumentStore: Send + Sync {
    fn put_document(&self, key: &str, bytes: Vec<u8>) -> Result<(), RepositoryError>;
    fn get_document(&self, key: &str) -> Result<Option<Vec<u8>>, RepositoryError>;
    fn delete_document(&self, key: &str) -> Result<(), RepositoryError>;
}

/// Resolve the effective content type, guessing from the filename when the client sent none
/// (or sent the generic `application/octet-stream`).
pub fn validate(document: &UploadedDocument) -> Result<Mime, AttachmentError> {
    if document.bytes.is_empty() {
        return Err(AttachmentError::Empty);
    }
    if document.bytes.len() > MAX_ATTACHMENT_BYTES {
        return Err(AttachmentError::TooLarge {
            size: document.bytes.len(),
            limit: MAX_ATTACHMENT_BYTES,
        });
    }

    let declared = document
        .content_type
        .as_deref()
        .and_then(|raw| raw.parse::<Mime>().ok())
        .filter(|mime| *mime != mime::APPLICATION_OCTET_STREAM);
    let mime = match declared {
        Some(mime) => mime,
        None => mime_guess::from_path(&document.filename).first_or_octet_stream(),
    };

    if is_accepted(&mime) {
        Ok(mime)
    } else {
        Err(AttachmentError::UnsupportedType(mime.essence_str().to_string()))
    }
}

fn is_accepted(mime: &Mime) -> bool {
    if *mime == mime::APPLICATION_PDF {
        return true;
    }
    mime.type_() == mime::IMAGE
        && matches!(mime.subtype().as_str(), "jpeg" | "png" | "tiff")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(filename: &str, content_type: Option<&str>, size: usize) -> UploadedDocument {
        UploadedDocument {
            filename: filename.to_string(),
            content_type: content_type.map(str::to_string),
            bytes: vec![1; size],
        }
    }

    #[test]
    fn accepts_declared_pdf() {
        let mime = validate(&document("paystub.pdf", Some("application/pdf"), 10)).expect("pdf");
        assert_eq!(mime, mime::APPLICATION_PDF);
    }

    #[test]
    fn guesses_type_from_filename() {
        let mime = validate(&document("lease.PNG", None, 10)).expect("png");
        assert_eq!(mime, mime::IMAGE_PNG);

        let mime = validate(&document("scan.tiff", Some("application/octet-stream"), 10))
            .expect("tiff");
        assert_eq!(mime.subtype().as_str(), "tiff");
    }

    #[test]
    fn rejects_unsupported_and_oversized() {
        assert!(matches!(
            validate(&document("notes.docx", None, 10)),
            Err(AttachmentError::UnsupportedType(_))
        ));
        assert!(matches!(
            validate(&document("big.pdf", Some("application/pdf"), MAX_ATTACHMENT_BYTES + 1)),
            Err(AttachmentError::TooLarge { .. })
        ));
        assert_eq!(
            validate(&document("empty.pdf", None, 0)),
            Err(AttachmentError::Empty)
        );
    }
}

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, header};
use multer::{Constraints, Field, Multipart, SizeLimit};

/// An error returned when extracting the profile from a multipart upload.
#[derive(Debug, thiserror::Error)]
pub enum MultipartError {
    /// The body is not valid multipart data or exceeds the size limit.
    #[error("failed to parse multipart request: {0}")]
    Invalid(#[from] multer::Error),
    /// No file part with the expected name was uploaded.
    #[error("required {0} part is missing")]
    MissingPart(String),
    /// The file part declares a different file name than its field name.
    #[error("{0} filename is not '{0}'")]
    FilenameMismatch(String),
}

/// Streams a multipart body and returns the file part named `name`.
///
/// The file part must also declare `name` as its file name. Other fields are skipped without
/// buffering. The whole body, including the returned field, is limited to `limit` bytes.
pub async fn extract_file_part(
    headers: &HeaderMap,
    body: Body,
    name: &str,
    limit: usize,
) -> Result<Field<'static>, MultipartError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let boundary = multer::parse_boundary(content_type)?;

    let limits = SizeLimit::new().whole_stream(limit as u64);
    let mut multipart = Multipart::with_constraints(
        body.into_data_stream(),
        boundary,
        Constraints::new().size_limit(limits),
    );

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(name) {
            continue;
        }

        let file_name_matches = match field.file_name() {
            Some(file_name) => file_name == name,
            // Plain form fields are not uploads.
            None => continue,
        };

        if !file_name_matches {
            return Err(MultipartError::FilenameMismatch(name.to_owned()));
        }

        return Ok(field);
    }

    Err(MultipartError::MissingPart(name.to_owned()))
}

/// Rewrites the headers of a request whose body was replaced by an extracted file part.
///
/// The content type becomes `application/octet-stream`, and the content length is removed since
/// the size of the decompressed payload is not known up front.
pub fn reset_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.remove(header::CONTENT_LENGTH);
}

#[cfg(test)]
mod tests {
    use ember_test::{BOUNDARY, Part, multipart_body, multipart_content_type};

    use super::*;

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            multipart_content_type().parse().unwrap(),
        );
        headers
    }

    async fn extract(parts: &[Part], limit: usize) -> Result<Vec<u8>, MultipartError> {
        let body = Body::from(multipart_body(parts));
        let field = extract_file_part(&headers(), body, "jfr", limit).await?;
        Ok(field.bytes().await?.to_vec())
    }

    #[tokio::test]
    async fn test_extract_file_part() {
        let parts = [
            Part::field("jfr", "not a file"),
            Part::file("other", "jfr", "other"),
            Part::file("jfr", "jfr", "recording"),
        ];

        let content = extract(&parts, 1024).await.unwrap();
        assert_eq!(content, b"recording");
    }

    #[tokio::test]
    async fn test_missing_part() {
        let parts = [Part::file("profile", "jfr", "recording")];

        let error = extract(&parts, 1024).await.unwrap_err();
        assert_eq!(error.to_string(), "required jfr part is missing");
    }

    #[tokio::test]
    async fn test_filename_mismatch() {
        let parts = [Part::file("jfr", "profile.jfr", "recording")];

        let error = extract(&parts, 1024).await.unwrap_err();
        assert_eq!(error.to_string(), "jfr filename is not 'jfr'");
    }

    #[tokio::test]
    async fn test_size_limit() {
        let parts = [Part::file("jfr", "jfr", vec![0; 4096])];

        let error = extract(&parts, 1024).await.unwrap_err();
        assert!(matches!(
            error,
            MultipartError::Invalid(multer::Error::StreamSizeExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_boundary() {
        let body = Body::from(format!("--{BOUNDARY}--\r\n"));
        let error = extract_file_part(&HeaderMap::new(), body, "jfr", 1024)
            .await
            .unwrap_err();
        assert!(matches!(error, MultipartError::Invalid(_)));
    }

    #[test]
    fn test_reset_headers() {
        let mut headers = headers();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("42"));

        reset_headers(&mut headers);

        assert_eq!(headers[header::CONTENT_TYPE], "application/octet-stream");
        assert!(!headers.contains_key(header::CONTENT_LENGTH));
    }
}

use crate::utils::error::{ErpError, Result};
use std::collections::HashSet;
use url::Url;

/// File types accepted by the documents endpoint for photos and receipts.
pub const ATTACHMENT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "pdf"];

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: impl Into<String>, reason: impl Into<String>) -> ErpError {
    ErpError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.into(),
        reason: reason.into(),
    }
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(invalid(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(invalid(
            field_name,
            url_str,
            format!("Invalid URL format: {}", e),
        )),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }

    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(invalid(
            field_name,
            value.to_string(),
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

/// Checks attachment file names against an extension allow-list (case-insensitive).
pub fn validate_file_extensions(
    field_name: &str,
    files: &[String],
    allowed_extensions: &[&str],
) -> Result<()> {
    let allowed_set: HashSet<&str> = allowed_extensions.iter().copied().collect();

    for file in files {
        let extension = std::path::Path::new(file)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension {
            Some(ext) if allowed_set.contains(ext.as_str()) => {}
            Some(ext) => {
                return Err(ErpError::ValidationError {
                    message: format!(
                        "{}: unsupported file extension '{}' for {}. Allowed extensions: {}",
                        field_name,
                        ext,
                        file,
                        allowed_extensions.join(", ")
                    ),
                });
            }
            None => {
                return Err(ErpError::ValidationError {
                    message: format!("{}: file {} has no extension", field_name, file),
                });
            }
        }
    }

    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| ErpError::MissingConfigError {
        field: field_name.to_string(),
    })
}

/// Form-level check: a user-entered field must contain more than whitespace.
pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ErpError::ValidationError {
            message: format!("{} cannot be empty", field_name),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            value.to_string(),
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("api.base_url", "https://erp.example.com").is_ok());
        assert!(validate_url("api.base_url", "http://localhost:3000").is_ok());
        assert!(validate_url("api.base_url", "").is_err());
        assert!(validate_url("api.base_url", "invalid-url").is_err());
        assert!(validate_url("api.base_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("outbox.tick_seconds", 15, 1).is_ok());
        assert!(validate_positive_number("outbox.tick_seconds", 0, 1).is_err());
    }

    #[test]
    fn test_validate_file_extensions() {
        let files = vec!["IMG_0001.JPG".to_string(), "receipt.pdf".to_string()];
        assert!(validate_file_extensions("photos", &files, ATTACHMENT_EXTENSIONS).is_ok());

        let invalid_files = vec!["notes.txt".to_string()];
        assert!(validate_file_extensions("photos", &invalid_files, ATTACHMENT_EXTENSIONS).is_err());

        let no_ext = vec!["README".to_string()];
        assert!(validate_file_extensions("photos", &no_ext, ATTACHMENT_EXTENSIONS).is_err());
    }

    #[test]
    fn test_validate_non_empty_string() {
        assert!(validate_non_empty_string("location", "Site A").is_ok());
        assert!(validate_non_empty_string("location", "   ").is_err());
    }
}

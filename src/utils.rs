//! Utility functions for common operations.

use crate::error::ScraperError;
use std::path::Path;

/// Normalizes one raw input link.
///
/// Surrounding whitespace and stray trailing quotes (left over when paths
/// are pasted from a file manager) are removed.
pub fn clean_link(raw: &str) -> String {
    raw.trim().trim_end_matches('"').trim_start_matches('"').trim().to_string()
}

/// Parses the content of a links file.
///
/// One link per line; blank lines and lines starting with `#` are ignored.
pub fn parse_links(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(clean_link)
        .filter(|link| !link.is_empty())
        .collect()
}

/// Reads a links file.
pub fn read_links_file(path: &Path) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_links(&content))
}

/// Checks if an HTTP response is successful, and if not, returns a detailed error.
///
/// # Arguments
/// * `response` - The reqwest Response to check
///
/// # Returns
/// Ok(response) if successful, or Err(ScraperError::Status) with the status and URL
pub async fn check_response_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ScraperError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let url = response.url().to_string();
        tracing::debug!(%url, status, "non-success response");
        return Err(ScraperError::Status { status, url });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_clean_link() {
        assert_eq!(clean_link("  https://a.com/x  "), "https://a.com/x");
        assert_eq!(clean_link("C:\\manga\\series\""), "C:\\manga\\series");
        assert_eq!(clean_link("\"/srv/manga\""), "/srv/manga");
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_links("").is_empty());
        assert!(parse_links("\n\n   \n").is_empty());
    }

    #[test]
    fn test_parse_skips_comments() {
        let content = "# reading list\nhttps://a.com/1\n\n  # later\nhttps://a.com/2\"\n";
        assert_eq!(parse_links(content), vec!["https://a.com/1", "https://a.com/2"]);
    }

    #[test]
    fn test_read_links_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "https://a.com/1\r\nhttps://a.com/2\r\n").unwrap();

        let links = read_links_file(file.path()).unwrap();
        assert_eq!(links, vec!["https://a.com/1", "https://a.com/2"]);
    }

    #[test]
    fn test_read_missing_file() {
        assert!(read_links_file(Path::new("/definitely/not/here.txt")).is_err());
    }
}

use crate::error::NetworkError;
use reqwest::blocking::Client;
use std::path::Path;
use std::time::Duration;

/// Checks if `location` is an http(s) URL rather than a local path.
pub fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Appends `file_name` to a directory path or base URL.
pub fn join(location: &str, file_name: &str) -> String {
    if is_url(location) {
        format!("{}/{}", location.trim_end_matches('/'), file_name)
    } else {
        Path::new(location).join(file_name).to_string_lossy().into_owned()
    }
}

pub fn load_url_as_string(url: &str, timeout: Duration) -> Result<String, NetworkError> {
    let client = Client::builder().timeout(timeout).build()?;
    let response = client.get(url).send()?;
    if !response.status().is_success() {
        return Err(NetworkError::UnexpectedStatus(response.status().as_u16()));
    }
    Ok(response.text()?)
}

/// Reads a whole file from a local path or an http(s) URL.
pub fn load_file_as_string(location: &str, timeout: Duration) -> Result<String, NetworkError> {
    if is_url(location) {
        load_url_as_string(location, timeout)
    } else {
        Ok(std::fs::read_to_string(location)?)
    }
}

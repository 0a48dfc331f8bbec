use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Structured error context for failed backend calls, appended as JSON lines
/// to `error.log` in the data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub service: String,
    pub operation: String,
    pub timestamp: String,
    pub error_type: String,
    pub error_message: String,
    pub request_url: Option<String>,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl ErrorContext {
    pub fn new(service: &str, operation: &str) -> Self {
        Self {
            service: service.to_string(),
            operation: operation.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            error_type: String::new(),
            error_message: String::new(),
            request_url: None,
            status_code: None,
            response_body: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_error(mut self, error_type: &str, message: &str) -> Self {
        self.error_type = error_type.to_string();
        self.error_message = message.to_string();
        self
    }

    pub fn with_request_details(
        mut self,
        url: &str,
        status_code: Option<u16>,
        response_body: Option<&str>,
    ) -> Self {
        self.request_url = Some(url.to_string());
        self.status_code = status_code;
        self.response_body = response_body.map(|s| s.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Log through `log` and, when a log file is known, persist the entry.
    pub fn log_error(&self, error_log: Option<&Path>) {
        log::error!(
            target: "backend_errors",
            "Backend error: {} | Operation: {} | Type: {} | Message: {} | URL: {:?} | Status: {:?} | Context: {:?}",
            self.service,
            self.operation,
            self.error_type,
            self.error_message,
            self.request_url,
            self.status_code,
            self.metadata
        );

        if let Some(path) = error_log {
            if let Err(e) = self.write_to_error_log(path) {
                log::warn!("Failed to write to error log file: {e}");
            }
        }
    }

    fn write_to_error_log(&self, path: &Path) -> io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(self).map_err(io::Error::other)?;
        writeln!(file, "{line}")
    }
}

/// Statistics about errors for one service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorStats {
    pub total_errors: usize,
    pub error_types: HashMap<String, usize>,
    pub last_error_time: Option<String>,
}

pub struct ErrorLogReader {
    path: PathBuf,
}

impl ErrorLogReader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn read_all(&self) -> io::Result<Vec<ErrorContext>> {
        if !self.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut errors = Vec::new();
        for line in reader.lines() {
            let line = line?;
            match serde_json::from_str::<ErrorContext>(&line) {
                Ok(error) => errors.push(error),
                Err(e) => log::debug!("Skipping malformed error log line: {e}"),
            }
        }
        Ok(errors)
    }

    /// Most recent errors first, optionally only for one service.
    pub fn read_recent_errors(
        &self,
        limit: usize,
        service_filter: Option<&str>,
    ) -> io::Result<Vec<ErrorContext>> {
        let mut errors: Vec<ErrorContext> = self
            .read_all()?
            .into_iter()
            .filter(|e| service_filter.is_none_or(|s| e.service == s))
            .collect();
        errors.reverse();
        errors.truncate(limit);
        Ok(errors)
    }

    pub fn get_error_stats(&self) -> io::Result<HashMap<String, ErrorStats>> {
        let mut stats: HashMap<String, ErrorStats> = HashMap::new();
        for error in self.read_all()? {
            let entry = stats.entry(error.service.clone()).or_default();
            entry.total_errors += 1;
            *entry.error_types.entry(error.error_type.clone()).or_insert(0) += 1;
            entry.last_error_time = Some(error.timestamp.clone());
        }
        Ok(stats)
    }

    /// Remove the log file. Returns false when there was nothing to clear.
    pub fn clear(&self) -> io::Result<bool> {
        if !self.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_error_context_builder_pattern() {
        let error = ErrorContext::new("skincare-ai", "chat")
            .with_error("network_error", "Connection timeout")
            .with_request_details(
                "https://abc.example.co/functions/v1/skincare-ai",
                Some(500),
                Some("Internal Server Error"),
            )
            .with_metadata("action", "chat");

        assert_eq!(error.service, "skincare-ai");
        assert_eq!(error.operation, "chat");
        assert_eq!(error.error_type, "network_error");
        assert_eq!(error.status_code, Some(500));
        assert_eq!(
            error.response_body,
            Some("Internal Server Error".to_string())
        );
        assert_eq!(error.metadata.get("action"), Some(&"chat".to_string()));
        assert!(!error.timestamp.is_empty());
    }

    #[test]
    fn test_reader_with_missing_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let reader = ErrorLogReader::new(temp_dir.path().join("error.log"));

        assert!(reader.read_recent_errors(10, None).unwrap().is_empty());
        assert!(reader.get_error_stats().unwrap().is_empty());
        assert!(!reader.clear().unwrap());
    }

    #[test]
    fn test_log_error_round_trip_through_reader() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("nested").join("error.log");

        ErrorContext::new("skincare-history", "save-scan")
            .with_error("api_error", "HTTP 401")
            .log_error(Some(&path));
        ErrorContext::new("skincare-ai", "chat")
            .with_error("network_error", "Connection failed")
            .log_error(Some(&path));
        ErrorContext::new("skincare-ai", "generate-routine")
            .with_error("network_error", "Connection failed")
            .log_error(Some(&path));
        fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut f| writeln!(f, "not json"))
            .unwrap();

        let reader = ErrorLogReader::new(path);
        let errors = reader.read_recent_errors(10, None).unwrap();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].operation, "generate-routine");
        assert_eq!(errors[2].service, "skincare-history");

        let limited = reader.read_recent_errors(1, Some("skincare-ai")).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].operation, "generate-routine");

        let stats = reader.get_error_stats().unwrap();
        let ai = stats.get("skincare-ai").expect("Should have ai stats");
        assert_eq!(ai.total_errors, 2);
        assert_eq!(ai.error_types.get("network_error"), Some(&2));
        assert_eq!(stats.get("skincare-history").unwrap().total_errors, 1);

        assert!(reader.clear().unwrap());
        assert!(!reader.exists());
    }
}

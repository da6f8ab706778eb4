//! Transfer Service - Raw File Upload and Download
//!
//! Moves the data file behind a raw-file node by running an external transfer
//! tool (Aspera `ascp` by default) and checking what arrived. The service never
//! validates or saves nodes; callers upload first and then record the returned
//! URL on the node, or save a node that already documents the file.
//!
//! # Integrity checks
//!
//! After a transfer the service compares the expected size and checksum with
//! what it can observe:
//!
//! - the local file's size
//! - a locally computed digest when the expected checksum is `md5` or `sha256`
//! - `size` and checksum lines the tool prints on stdout, for anything else
//!
//! A checksum that nothing can confirm is an error, not a warning.
//!
//! Failures are never retried; the tool's own diagnostic is returned.

use crate::config::TransferConfig;
use crate::models::Node;
use crate::services::error::TransferError;
use serde_json::Value;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// URL recorded for raw files that are kept out of the public store
pub const PRIVATE_URL: &str = "<private>";

/// Study name to top-level remote directory
const STUDY_DIRS: &[(&str, &str)] = &[
    ("ibd", "ibd"),
    ("preg_preterm", "ptb"),
    ("prediabetes", "t2d"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: String,
    pub value: String,
}

impl Checksum {
    pub fn new(algorithm: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into().to_ascii_lowercase(),
            value: value.into().to_ascii_lowercase(),
        }
    }

    pub fn sha256(value: impl Into<String>) -> Self {
        Self::new("sha256", value)
    }

    pub fn md5(value: impl Into<String>) -> Self {
        Self::new("md5", value)
    }
}

/// What the transferred file should look like; unset fields are not checked
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedFile {
    pub size: Option<u64>,
    pub checksum: Option<Checksum>,
}

impl ExpectedFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Expectations recorded on a raw-file node (`size`, `checksums`)
    ///
    /// A `sha256` checksum is preferred over `md5` because it can be verified
    /// locally.
    pub fn from_node(node: &Node) -> Self {
        let size = node.attribute("size").and_then(Value::as_u64);
        let checksum = node
            .attribute("checksums")
            .and_then(Value::as_object)
            .and_then(|sums| {
                ["sha256", "md5"].iter().find_map(|algorithm| {
                    sums.get(*algorithm)
                        .and_then(Value::as_str)
                        .map(|value| Checksum::new(*algorithm, value))
                })
            });
        Self { size, checksum }
    }
}

/// Facts the tool reported about a finished transfer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolReport {
    pub size: Option<u64>,
    pub checksums: Vec<Checksum>,
}

impl ToolReport {
    /// Read `size`, `md5` and `sha256` lines of the form `key: value` or `key=value`
    pub fn parse(stdout: &str) -> Self {
        let mut report = Self::default();
        for line in stdout.lines() {
            let Some((key, value)) = line.split_once([':', '=']) else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            match key.as_str() {
                "size" => {
                    if let Ok(size) = value.parse() {
                        report.size = Some(size);
                    }
                }
                "md5" | "sha256" if is_hex(value) => {
                    report.checksums.push(Checksum::new(key, value));
                }
                _ => {}
            }
        }
        report
    }

    pub fn checksum(&self, algorithm: &str) -> Option<&str> {
        self.checksums
            .iter()
            .find(|c| c.algorithm == algorithm)
            .map(|c| c.value.as_str())
    }
}

fn is_hex(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Outcome of a verified transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub source: String,
    pub destination: String,
    pub size: u64,
    pub tool: ToolReport,
}

/// Runs uploads and downloads through the configured transfer tool
pub struct TransferService {
    config: TransferConfig,
}

impl TransferService {
    pub fn new(config: TransferConfig) -> Result<Self, TransferError> {
        config
            .validate()
            .map_err(|err| TransferError::invalid_request(err.to_string()))?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Remote location for a study's file: `/<study dir>/<segments...>/<name>`
    ///
    /// The file name is reduced to `[A-Za-z0-9._-]`.
    pub fn remote_path(
        study: &str,
        segments: &[&str],
        local_file: &Path,
    ) -> Result<String, TransferError> {
        let study_dir = STUDY_DIRS
            .iter()
            .find(|(name, _)| *name == study)
            .map(|(_, dir)| *dir)
            .ok_or_else(|| {
                TransferError::invalid_request(format!("no remote directory for study '{study}'"))
            })?;

        let name: String = local_file
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            .collect();
        if name.is_empty() || name.chars().all(|c| c == '.') {
            return Err(TransferError::invalid_request(format!(
                "{} has no usable file name",
                local_file.display()
            )));
        }

        let mut path = format!("/{study_dir}");
        for segment in segments.iter().map(|s| s.trim_matches('/')).filter(|s| !s.is_empty()) {
            path.push('/');
            path.push_str(segment);
        }
        path.push('/');
        path.push_str(&name);
        Ok(path)
    }

    /// `<scheme>://<server><path>`
    pub fn remote_url(&self, remote_path: &str) -> String {
        format!(
            "{}://{}{}",
            self.config.url_scheme, self.config.server, remote_path
        )
    }

    fn remote_target(&self, remote_path: &str) -> String {
        if self.config.username.is_empty() {
            format!("{}:{}", self.config.server, remote_path)
        } else {
            format!(
                "{}@{}:{}",
                self.config.username, self.config.server, remote_path
            )
        }
    }

    /// Send `local` to `remote_path` and verify it
    pub async fn upload(
        &self,
        local: &Path,
        remote_path: &str,
        expected: &ExpectedFile,
    ) -> Result<TransferReceipt, TransferError> {
        check_remote_path(remote_path)?;
        let metadata = tokio::fs::metadata(local)
            .await
            .map_err(|err| TransferError::local_file(local, err.to_string()))?;
        if !metadata.is_file() {
            return Err(TransferError::local_file(local, "not a regular file"));
        }

        let source = local.display().to_string();
        let destination = self.remote_target(remote_path);
        self.transfer(source, destination, local, expected).await
    }

    /// Fetch `remote_path` into `local` and verify it
    pub async fn download(
        &self,
        remote_path: &str,
        local: &Path,
        expected: &ExpectedFile,
    ) -> Result<TransferReceipt, TransferError> {
        check_remote_path(remote_path)?;
        let source = self.remote_target(remote_path);
        let destination = local.display().to_string();
        self.transfer(source, destination, local, expected).await
    }

    /// Upload a raw-file node's data and record its URL on the node
    ///
    /// A node flagged `private_files` gets the private marker instead and
    /// nothing is transferred. The node is left untouched on failure.
    pub async fn stage_raw_file(
        &self,
        node: &mut Node,
        local: &Path,
        remote_path: &str,
    ) -> Result<Option<TransferReceipt>, TransferError> {
        let private = node
            .attribute("private_files")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if private {
            tracing::info!(node_type = %node.node_type(), "Files are private, skipping transfer");
            node.set_attribute("urls", vec![PRIVATE_URL]);
            return Ok(None);
        }

        let receipt = self
            .upload(local, remote_path, &ExpectedFile::from_node(node))
            .await?;
        node.set_attribute("urls", vec![self.remote_url(remote_path)]);
        Ok(Some(receipt))
    }

    async fn transfer(
        &self,
        source: String,
        destination: String,
        local: &Path,
        expected: &ExpectedFile,
    ) -> Result<TransferReceipt, TransferError> {
        tracing::debug!(
            program = %self.config.program,
            %source,
            %destination,
            "Starting transfer"
        );

        let tool = match self.run_tool(&source, &destination).await {
            Ok(tool) => tool,
            Err(err) => {
                tracing::error!(%source, %destination, error = %err, "Transfer failed");
                return Err(err);
            }
        };

        let receipt = verify(local, expected, &tool).await.map(|size| TransferReceipt {
            source: source.clone(),
            destination: destination.clone(),
            size,
            tool,
        });

        match &receipt {
            Ok(receipt) => {
                tracing::info!(%source, %destination, size = receipt.size, "Transfer complete")
            }
            Err(err) => {
                tracing::error!(%source, %destination, error = %err, "Transfer verification failed")
            }
        }
        receipt
    }

    async fn run_tool(&self, source: &str, destination: &str) -> Result<ToolReport, TransferError> {
        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.extra_args)
            .arg(source)
            .arg(destination)
            .env(&self.config.password_env, &self.config.password)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = command.output().await.map_err(|err| TransferError::Spawn {
            program: self.config.program.clone(),
            reason: err.to_string(),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let diagnostic = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(TransferError::ToolFailed {
                status: output.status.code(),
                diagnostic,
            });
        }

        Ok(ToolReport::parse(&stdout))
    }
}

fn check_remote_path(remote_path: &str) -> Result<(), TransferError> {
    if !remote_path.starts_with('/') || remote_path.split('/').any(|part| part == "..") {
        return Err(TransferError::invalid_request(format!(
            "remote path '{remote_path}' must be absolute and must not contain '..'"
        )));
    }
    Ok(())
}

/// Compare expectations with the local file and the tool's report
async fn verify(
    local: &Path,
    expected: &ExpectedFile,
    tool: &ToolReport,
) -> Result<u64, TransferError> {
    let size = tokio::fs::metadata(local)
        .await
        .map_err(|err| TransferError::local_file(local, err.to_string()))?
        .len();

    if let Some(expected_size) = expected.size {
        let reported = tool.size.unwrap_or(size);
        for actual in [size, reported] {
            if actual != expected_size {
                return Err(TransferError::SizeMismatch {
                    expected: expected_size,
                    actual,
                });
            }
        }
    }

    let Some(checksum) = &expected.checksum else {
        return Ok(size);
    };
    let actual = match checksum.algorithm.as_str() {
        "sha256" => sha256_file(local).await?,
        "md5" => md5_file(local).await?,
        other => match tool.checksum(other) {
            Some(reported) => reported.to_string(),
            None => {
                return Err(TransferError::Unverifiable {
                    algorithm: other.to_string(),
                    path: local.to_path_buf(),
                })
            }
        },
    };

    if !actual.eq_ignore_ascii_case(&checksum.value) {
        return Err(TransferError::ChecksumMismatch {
            expected: checksum.value.clone(),
            actual,
        });
    }
    if let Some(reported) = tool.checksum(&checksum.algorithm) {
        if !reported.eq_ignore_ascii_case(&checksum.value) {
            return Err(TransferError::ChecksumMismatch {
                expected: checksum.value.clone(),
                actual: reported.to_string(),
            });
        }
    }
    Ok(size)
}

/// Hex SHA-256 of a file's contents
pub async fn sha256_file(path: &Path) -> Result<String, TransferError> {
    digest_file::<Sha256>(path).await
}

/// Hex MD5 of a file's contents
pub async fn md5_file(path: &Path) -> Result<String, TransferError> {
    digest_file::<Md5>(path).await
}

async fn digest_file<D: Digest>(path: &Path) -> Result<String, TransferError> {
    let to_error = |err: std::io::Error| TransferError::local_file(PathBuf::from(path), err.to_string());

    let mut file = tokio::fs::File::open(path).await.map_err(to_error)?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).await.map_err(to_error)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service() -> TransferService {
        TransferService::new(TransferConfig {
            username: "dcc".to_string(),
            password: "pw".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_remote_path_maps_study_and_sanitizes_name() {
        let path = TransferService::remote_path(
            "preg_preterm",
            &["cytokine", "host"],
            Path::new("/data/run 1/my file(1).txt"),
        )
        .unwrap();
        assert_eq!(path, "/ptb/cytokine/host/myfile1.txt");
    }

    #[test]
    fn test_remote_path_rejects_unknown_study() {
        let result = TransferService::remote_path("hmp1", &[], Path::new("a.fastq"));
        assert!(matches!(result, Err(TransferError::InvalidRequest(_))));
    }

    #[test]
    fn test_remote_url_and_target() {
        let service = service();
        assert_eq!(
            service.remote_url("/ibd/genome/a.fastq"),
            "fasp://aspera.ihmpdcc.org/ibd/genome/a.fastq"
        );
        assert_eq!(
            service.remote_target("/ibd/a.fastq"),
            "dcc@aspera.ihmpdcc.org:/ibd/a.fastq"
        );
    }

    #[test]
    fn test_tool_report_parsing() {
        let report = ToolReport::parse(
            "Completed: 12K bytes transferred\nsize: 12288\nmd5=D41D8CD98F00B204E9800998ECF8427E\nsha256: not-hex\n",
        );
        assert_eq!(report.size, Some(12288));
        assert_eq!(report.checksum("md5"), Some("d41d8cd98f00b204e9800998ecf8427e"));
        assert_eq!(report.checksum("sha256"), None);
    }

    #[test]
    fn test_expected_file_from_node_prefers_sha256() {
        let node = Node::new("wgs_raw_seq_set")
            .with_attribute("size", 42)
            .with_attribute("checksums", json!({"md5": "aa", "sha256": "BB"}));
        let expected = ExpectedFile::from_node(&node);
        assert_eq!(expected.size, Some(42));
        assert_eq!(expected.checksum, Some(Checksum::sha256("bb")));
    }

    #[test]
    fn test_remote_path_must_be_absolute() {
        assert!(check_remote_path("/ibd/a.fastq").is_ok());
        assert!(check_remote_path("ibd/a.fastq").is_err());
        assert!(check_remote_path("/ibd/../etc").is_err());
    }

    #[tokio::test]
    async fn test_md5_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();
        assert_eq!(
            md5_file(&path).await.unwrap(),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[tokio::test]
    async fn test_unreported_algorithm_is_unverifiable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let expected = ExpectedFile::new().with_checksum(Checksum::new("sha1", "aaf4c61d"));
        let err = verify(&path, &expected, &ToolReport::default()).await.unwrap_err();
        assert!(matches!(err, TransferError::Unverifiable { ref algorithm, .. } if algorithm == "sha1"));
    }

    #[tokio::test]
    async fn test_sha256_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();
        assert_eq!(
            sha256_file(&path).await.unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}

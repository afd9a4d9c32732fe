use super::SkillError;
use std::collections::BTreeMap;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const SECTION_PREFIX: &str = "=== ";
const SECTION_SUFFIX: &str = " ===";

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub project_path: PathBuf,
    pub input_paths: Vec<String>,
    pub exclusions: Vec<String>,
}

/// External project scanner: hands back the newline-delimited manifest
/// stream with `=== <path> ===` section markers.
pub trait ProjectScanner: Send + Sync {
    fn scan(&self, request: &ScanRequest) -> Result<String, SkillError>;
}

/// Scanner backed by an external program, spawned per request with the
/// project's input paths and exclusion globs.
#[derive(Debug, Clone)]
pub struct CommandScanner {
    program: PathBuf,
    timeout: Duration,
}

impl CommandScanner {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl ProjectScanner for CommandScanner {
    fn scan(&self, request: &ScanRequest) -> Result<String, SkillError> {
        let mut command = Command::new(&self.program);
        command
            .current_dir(&request.project_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if !request.exclusions.is_empty() {
            command.arg("-x").arg(request.exclusions.join(","));
        }
        let input_paths: Vec<String> = if request.input_paths.is_empty() {
            vec![".".to_string()]
        } else {
            request.input_paths.clone()
        };
        command.args(&input_paths);

        let mut child = command.spawn().map_err(|source| SkillError::Scanner {
            reason: format!("failed to spawn {}: {source}", self.program.display()),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| SkillError::Scanner {
            reason: "missing stdout pipe".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| SkillError::Scanner {
            reason: "missing stderr pipe".to_string(),
        })?;
        let stdout_reader = thread::spawn(move || {
            let mut buf = String::new();
            let _ = BufReader::new(stdout).read_to_string(&mut buf);
            buf
        });
        let stderr_reader = thread::spawn(move || {
            let mut buf = String::new();
            let _ = BufReader::new(stderr).read_to_string(&mut buf);
            buf
        });

        let start = Instant::now();
        let exit_status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if start.elapsed() > self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(SkillError::Scanner {
                            reason: format!(
                                "scanner timed out after {}ms",
                                self.timeout.as_millis()
                            ),
                        });
                    }
                    thread::sleep(Duration::from_millis(10));
                }
                Err(source) => {
                    return Err(SkillError::Scanner {
                        reason: format!("failed waiting for scanner: {source}"),
                    })
                }
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        if !exit_status.success() {
            return Err(SkillError::Scanner {
                reason: format!(
                    "scanner exited with code {}: {}",
                    exit_status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }
        Ok(stdout)
    }
}

/// Parse a manifest stream into `path -> content`. Lines shaped
/// `=== <path> ===` open a section; everything until the next marker is the
/// file body. Text before the first marker and trailer sections are skipped.
pub fn parse_manifest(stream: &str) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in stream.lines() {
        if let Some(path) = section_path(line) {
            if let Some((path, body)) = current.take() {
                files.insert(path, body.join("\n"));
            }
            current = Some((path.to_string(), Vec::new()));
            continue;
        }
        if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some((path, body)) = current.take() {
        files.insert(path, body.join("\n"));
    }
    files
}

fn section_path(line: &str) -> Option<&str> {
    let trimmed = line.trim_end();
    let inner = trimmed
        .strip_prefix(SECTION_PREFIX)?
        .strip_suffix(SECTION_SUFFIX)?;
    let path = inner.trim();
    if path.is_empty() {
        return None;
    }
    Some(path)
}

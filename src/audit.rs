//! Tamper-evident, hash-chained audit log (spec §4.6).

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

use crate::hash::{digest, ZERO_HASH};
use crate::Result;

/// Terminal status of an audited command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Ok,
    Deny,
    Fail,
}

impl AuditStatus {
    fn as_token(self) -> &'static str {
        match self {
            AuditStatus::Ok => "OK",
            AuditStatus::Deny => "DENY",
            AuditStatus::Fail => "FAIL",
        }
    }
}

/// Outcome of [`AuditLog::verify`]: either the chain is intact, or it broke
/// at a specific (1-indexed) line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Ok,
    Corrupted { line: usize, reason: String },
}

/// A single parsed audit-log line.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub entry_hash: String,
    pub prev_hash: String,
    pub ts_ms: i64,
    pub user: String,
    pub command: String,
    pub args_hash: String,
    pub status: String,
    pub error_msg: Option<String>,
}

/// `H(join(args, " "))`, or the empty-string digest when there are no args.
pub fn args_hash(args: &[String]) -> String {
    digest(args.join(" ").as_bytes())
}

fn escape_single_line(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\n', "\\n").replace('\t', "\\t")
}

fn unescape_single_line(s: &str) -> String {
    s.replace("\\t", "\t").replace("\\n", "\n").replace("\\\\", "\\")
}

fn entry_hash(
    prev_hash: &str,
    ts_ms: i64,
    user: &str,
    command: &str,
    args_hash: &str,
    status: &str,
    error_msg: Option<&str>,
) -> String {
    let mut data = format!("{prev_hash} {ts_ms} {user} {command} {args_hash} {status}");
    if let Some(err) = error_msg {
        data.push(' ');
        data.push_str(err);
    }
    digest(data.as_bytes())
}

/// Append-only, hash-chained audit log backed by a single text file.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    /// Open (creating if absent) the audit log at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            File::create(&path)?;
        }
        Ok(Self { path })
    }

    fn last_hash(&self) -> Result<String> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut last = ZERO_HASH.to_string();
        for line in reader.lines() {
            let line = line?;
            if let Some(hash) = line.split_whitespace().next() {
                last = hash.to_string();
            }
        }
        Ok(last)
    }

    /// Append one entry and durably flush before returning.
    pub fn append(
        &self,
        user: &str,
        command: &str,
        args: &[String],
        status: AuditStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let prev_hash = self.last_hash()?;
        let ts_ms = Utc::now().timestamp_millis();
        let ahash = args_hash(args);
        let status_token = status.as_token();
        let escaped_error = error.map(escape_single_line);

        let hash = entry_hash(
            &prev_hash,
            ts_ms,
            user,
            command,
            &ahash,
            status_token,
            escaped_error.as_deref(),
        );

        let mut line = format!("{hash} {prev_hash} {ts_ms} {user} {command} {ahash} {status_token}");
        if let Some(err) = &escaped_error {
            line.push(' ');
            line.push_str(err);
        }

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;

        info!(user, command, status = status_token, "audit entry appended");
        Ok(())
    }

    /// Replay the log from the beginning, validating the hash chain.
    pub fn verify(&self) -> Result<VerifyOutcome> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut expected_prev = ZERO_HASH.to_string();

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 7 {
                return Ok(VerifyOutcome::Corrupted {
                    line: line_no,
                    reason: "fewer than seven tokens".to_string(),
                });
            }
            let (stored_hash, rest) = (tokens[0], &tokens[1..]);
            if rest[0] != expected_prev {
                return Ok(VerifyOutcome::Corrupted {
                    line: line_no,
                    reason: "prev_hash does not match the running chain".to_string(),
                });
            }
            let recomputed = digest(rest.join(" ").as_bytes());
            if recomputed != stored_hash {
                return Ok(VerifyOutcome::Corrupted {
                    line: line_no,
                    reason: "entry_hash mismatch".to_string(),
                });
            }
            expected_prev = stored_hash.to_string();
        }
        Ok(VerifyOutcome::Ok)
    }

    /// Parse every entry in the log without validating the chain, for
    /// `audit-verify`-adjacent inspection tooling.
    pub fn entries(&self) -> Result<Vec<AuditEntry>> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 7 {
                continue;
            }
            let error_msg = if tokens.len() > 7 {
                Some(unescape_single_line(&tokens[7..].join(" ")))
            } else {
                None
            };
            entries.push(AuditEntry {
                entry_hash: tokens[0].to_string(),
                prev_hash: tokens[1].to_string(),
                ts_ms: tokens[2].parse().unwrap_or_default(),
                user: tokens[3].to_string(),
                command: tokens[4].to_string(),
                args_hash: tokens[5].to_string(),
                status: tokens[6].to_string(),
                error_msg,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log_at(dir: &TempDir) -> AuditLog {
        AuditLog::open(dir.path().join("audit.log")).unwrap()
    }

    #[test]
    fn fresh_log_verifies_ok() {
        let dir = TempDir::new().unwrap();
        let log = log_at(&dir);
        assert_eq!(log.verify().unwrap(), VerifyOutcome::Ok);
    }

    #[test]
    fn appended_entries_chain_and_verify() {
        let dir = TempDir::new().unwrap();
        let log = log_at(&dir);
        log.append("root", "init", &[], AuditStatus::Ok, None).unwrap();
        log.append(
            "root",
            "backup",
            &["/src".to_string()],
            AuditStatus::Ok,
            None,
        )
        .unwrap();
        log.append(
            "bob",
            "restore",
            &["snap_1".to_string(), "/tmp/x".to_string()],
            AuditStatus::Deny,
            None,
        )
        .unwrap();
        assert_eq!(log.verify().unwrap(), VerifyOutcome::Ok);
        assert_eq!(log.entries().unwrap().len(), 3);
    }

    #[test]
    fn first_entry_chains_from_zero_hash() {
        let dir = TempDir::new().unwrap();
        let log = log_at(&dir);
        log.append("root", "init", &[], AuditStatus::Ok, None).unwrap();
        let entries = log.entries().unwrap();
        assert_eq!(entries[0].prev_hash, ZERO_HASH);
    }

    #[test]
    fn appended_stray_line_is_detected_as_corruption() {
        let dir = TempDir::new().unwrap();
        let log = log_at(&dir);
        log.append("root", "init", &[], AuditStatus::Ok, None).unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join("audit.log"))
            .unwrap();
        writeln!(file, "TAMPERED").unwrap();
        match log.verify().unwrap() {
            VerifyOutcome::Corrupted { line, .. } => assert_eq!(line, 2),
            VerifyOutcome::Ok => panic!("expected corruption"),
        }
    }

    #[test]
    fn single_byte_flip_in_an_entry_is_detected() {
        let dir = TempDir::new().unwrap();
        let log = log_at(&dir);
        log.append("root", "init", &[], AuditStatus::Ok, None).unwrap();
        log.append("root", "backup", &[], AuditStatus::Ok, None).unwrap();
        let contents = std::fs::read_to_string(dir.path().join("audit.log")).unwrap();
        let tampered = contents.replacen("root", "rooy", 1);
        std::fs::write(dir.path().join("audit.log"), tampered).unwrap();
        match log.verify().unwrap() {
            VerifyOutcome::Corrupted { line, .. } => assert_eq!(line, 1),
            VerifyOutcome::Ok => panic!("expected corruption"),
        }
    }

    #[test]
    fn error_message_is_recorded_on_fail_status() {
        let dir = TempDir::new().unwrap();
        let log = log_at(&dir);
        log.append(
            "root",
            "backup",
            &["/src".to_string()],
            AuditStatus::Fail,
            Some("disk full"),
        )
        .unwrap();
        let entries = log.entries().unwrap();
        assert_eq!(entries[0].error_msg.as_deref(), Some("disk full"));
        assert_eq!(log.verify().unwrap(), VerifyOutcome::Ok);
    }
}

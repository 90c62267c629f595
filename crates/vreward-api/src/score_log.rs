//! Plain-text score log.
//!
//! One line per received upload and one per analysis, appended to
//! `video_scores.txt`. The file is for humans watching a training run; write
//! failures are logged and never reach the caller.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use vreward_models::{EpisodeKey, RewardOutcome};

pub const SCORE_LOG_FILE: &str = "video_scores.txt";

const RULE_WIDTH: usize = 80;

/// Size and episode count of the score log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogStats {
    pub total_episodes: usize,
    pub log_file_exists: bool,
    pub log_file_size: u64,
}

/// Last lines of the score log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogTail {
    pub total_lines: usize,
    pub lines: Vec<String>,
}

/// Append-only score log shared by all requests.
#[derive(Debug)]
pub struct ScoreLog {
    dir: PathBuf,
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ScoreLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let path = dir.join(SCORE_LOG_FILE);
        Self {
            dir,
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the directory and write the header if the file is new.
    pub async fn initialize(&self) {
        let _guard = self.write_lock.lock().await;
        if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return;
        }
        let result = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            tokio::fs::write(&self.path, header(&timestamp())).await
        }
        .await;
        match result {
            Ok(()) => info!(path = %self.path.display(), "Score log initialized"),
            Err(e) => error!(path = %self.path.display(), error = %e, "Failed to initialize score log"),
        }
    }

    pub async fn record_received(&self, episode: EpisodeKey, size: u64, filename: Option<&str>) {
        let line = received_line(&timestamp(), episode, size, filename);
        if self.append(&line).await {
            info!(
                episode = episode.episode_number,
                attempt = episode.attempt_number,
                size_mb = megabytes(size),
                "Log entry added for received video"
            );
        }
    }

    pub async fn record_score(&self, outcome: &RewardOutcome) {
        let line = score_line(&timestamp(), outcome);
        if self.append(&line).await {
            info!(
                episode = outcome.episode.episode_number,
                score = outcome.reward,
                "Score logged"
            );
        }
    }

    async fn append(&self, line: &str) -> bool {
        let _guard = self.write_lock.lock().await;
        let result = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "Failed to write score log");
                false
            }
        }
    }

    pub async fn stats(&self) -> LogStats {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => LogStats {
                total_episodes: content.lines().filter(|l| l.contains("Episode:")).count(),
                log_file_exists: true,
                log_file_size: content.len() as u64,
            },
            Err(e) if e.kind() == ErrorKind::NotFound => LogStats::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read log stats");
                LogStats::default()
            }
        }
    }

    /// The last `lines` lines (all of them for 0), blank ones dropped; `None`
    /// if there is no log yet.
    pub async fn tail(&self, lines: usize) -> std::io::Result<Option<LogTail>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let all: Vec<&str> = content.lines().collect();
        let start = match lines {
            0 => 0,
            n => all.len().saturating_sub(n),
        };
        Ok(Some(LogTail {
            total_lines: all.len(),
            lines: all[start..]
                .iter()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        }))
    }
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

fn header(started: &str) -> String {
    format!(
        "{rule}\nVideo Reward Analysis Score Log\nStarted: {started}\n{rule}\n\
         Timestamp           | Episode | Attempt | Size(MB) | Score  | Analysis(s)\n{dash}\n",
        rule = "=".repeat(RULE_WIDTH),
        dash = "-".repeat(RULE_WIDTH),
    )
}

fn received_line(ts: &str, episode: EpisodeKey, size: u64, filename: Option<&str>) -> String {
    let mut line = format!(
        "{} | Episode: {:4} | Attempt: {} | Size: {:6.2}MB | Event: RECEIVED",
        ts,
        episode.episode_number,
        episode.attempt_number,
        megabytes(size)
    );
    if let Some(name) = filename.filter(|n| !n.is_empty()) {
        line.push_str(" | File: ");
        line.push_str(name);
    }
    line.push('\n');
    line
}

fn score_line(ts: &str, outcome: &RewardOutcome) -> String {
    format!(
        "{} | Episode: {:4} | Attempt: {} | Size: {:6.2}MB | Score: {:6.4} | Analysis: {:6.2}s\n",
        ts,
        outcome.episode.episode_number,
        outcome.episode.attempt_number,
        megabytes(outcome.upload_bytes),
        outcome.reward,
        outcome.analysis_time
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vreward_models::{ClassificationTarget, PipelineStage};

    fn outcome() -> RewardOutcome {
        RewardOutcome {
            episode: EpisodeKey::new(7, 2),
            reward: 0.75,
            analysis_time: 3.5,
            upload_bytes: 3 * 1024 * 1024 / 2,
            target: ClassificationTarget::Segmented,
            windows_scored: 4,
            stages: vec![PipelineStage::Done],
            reason: None,
        }
    }

    #[test]
    fn test_line_formats() {
        assert_eq!(
            score_line("2024-01-01 00:00:00", &outcome()),
            "2024-01-01 00:00:00 | Episode:    7 | Attempt: 2 | Size:   1.50MB | Score: 0.7500 | Analysis:   3.50s\n"
        );
        assert_eq!(
            received_line("2024-01-01 00:00:00", EpisodeKey::new(12, 1), 0, Some("run.mp4")),
            "2024-01-01 00:00:00 | Episode:   12 | Attempt: 1 | Size:   0.00MB | Event: RECEIVED | File: run.mp4\n"
        );
    }

    #[test]
    fn test_header_layout() {
        let header = header("2024-01-01 00:00:00");
        let lines: Vec<_> = header.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "=".repeat(80));
        assert_eq!(lines[2], "Started: 2024-01-01 00:00:00");
        assert!(lines[4].starts_with("Timestamp"));
        assert_eq!(lines[5], "-".repeat(80));
    }

    #[tokio::test]
    async fn test_records_and_stats() {
        let dir = TempDir::new().unwrap();
        let log = ScoreLog::new(dir.path().join("logs"));
        assert_eq!(log.stats().await, LogStats::default());
        assert!(log.tail(10).await.unwrap().is_none());

        log.initialize().await;
        log.record_received(EpisodeKey::new(7, 2), 1024, None).await;
        log.record_score(&outcome()).await;

        let stats = log.stats().await;
        assert!(stats.log_file_exists);
        assert_eq!(stats.total_episodes, 2);

        let tail = log.tail(1).await.unwrap().unwrap();
        assert_eq!(tail.total_lines, 8);
        assert_eq!(tail.lines.len(), 1);
        assert!(tail.lines[0].contains("Score: 0.7500"));

        let all = log.tail(0).await.unwrap().unwrap();
        assert_eq!(all.total_lines, 8);
        assert_eq!(all.lines.len(), 8);
        assert!(all.lines.last().unwrap().contains("Score: 0.7500"));
    }

    #[tokio::test]
    async fn test_initialize_keeps_existing_log() {
        let dir = TempDir::new().unwrap();
        let log = ScoreLog::new(dir.path());
        log.initialize().await;
        log.record_score(&outcome()).await;
        log.initialize().await;

        assert_eq!(log.stats().await.total_episodes, 1);
    }
}

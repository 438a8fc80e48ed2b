use std::fmt;

use parking_lot::RwLock;

/// Where the most recent download attempt stands. In-memory only; a restart
/// resets it to idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadStatus {
    #[default]
    Idle,
    InProgress,
    Completed,
    Error,
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DownloadStatus::Idle => "idle",
            DownloadStatus::InProgress => "in-progress",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Single owner of the download status. Only the download handler writes it;
/// concurrent downloads are last-writer-wins.
#[derive(Debug, Default)]
pub struct StatusTracker {
    current: RwLock<DownloadStatus>,
}

impl StatusTracker {
    pub fn get(&self) -> DownloadStatus {
        *self.current.read()
    }

    pub fn set(&self, status: DownloadStatus) {
        *self.current.write() = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        assert_eq!(StatusTracker::default().get(), DownloadStatus::Idle);
    }

    #[test]
    fn set_replaces_the_current_status() {
        let tracker = StatusTracker::default();
        tracker.set(DownloadStatus::InProgress);
        assert_eq!(tracker.get(), DownloadStatus::InProgress);
        tracker.set(DownloadStatus::Completed);
        assert_eq!(tracker.get(), DownloadStatus::Completed);
    }

    #[test]
    fn renders_as_plain_status_strings() {
        assert_eq!(DownloadStatus::Idle.to_string(), "idle");
        assert_eq!(DownloadStatus::InProgress.to_string(), "in-progress");
        assert_eq!(DownloadStatus::Completed.to_string(), "completed");
        assert_eq!(DownloadStatus::Error.to_string(), "error");
    }
}

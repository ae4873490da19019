//! Pure interpreters from probe output to findings. Nothing in here touches
//! the filesystem, the process table or the network.

pub mod activity;
pub mod config_lint;
pub mod host;
pub mod inference;
pub mod startup;

/// Keep only the last `cap` items pushed.
#[derive(Debug, Clone, Default)]
pub struct RecentLines {
    cap: usize,
    lines: std::collections::VecDeque<String>,
}

impl RecentLines {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            lines: std::collections::VecDeque::with_capacity(cap),
        }
    }

    pub fn push(&mut self, line: &str) {
        if self.cap == 0 {
            return;
        }
        if self.lines.len() == self.cap {
            self.lines.pop_front();
        }
        self.lines.push_back(line.trim_end().to_string());
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

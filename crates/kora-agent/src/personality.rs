//! Static personality baseline — a plain text blob loaded once at boot.
//!
//! No hot reload: mutable behavior comes from agent-self facts layered on
//! top in context assembly, not from editing this file at runtime.

use std::path::Path;

use tracing::{info, warn};

/// Cap on baseline size (characters). Anything past this is prompt bloat.
const MAX_BASELINE_CHARS: usize = 20_000;

const DEFAULT_BASELINE: &str = "\
You are Kora, a personal assistant with long-term memory.

- Warm but direct; no filler, no sycophancy.
- Use what you remember about the user naturally; never recite it.
- When memory contradicts the user, trust the user and update.
- Prefer acting through tools over describing what you would do.";

/// Load the baseline from `path`, falling back to the built-in default
/// when the file is missing or unreadable.
pub fn load_baseline(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let mut content = content.trim().to_string();
            if content.is_empty() {
                warn!(path = %path.display(), "personality file is empty, using default");
                return DEFAULT_BASELINE.to_string();
            }
            if content.len() > MAX_BASELINE_CHARS {
                warn!(
                    path = %path.display(),
                    len = content.len(),
                    "personality file truncated to {MAX_BASELINE_CHARS} chars"
                );
                let mut cut = MAX_BASELINE_CHARS;
                while !content.is_char_boundary(cut) {
                    cut -= 1;
                }
                content.truncate(cut);
            }
            info!(path = %path.display(), chars = content.len(), "personality baseline loaded");
            content
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "personality file unreadable, using default");
            DEFAULT_BASELINE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_default() {
        let baseline = load_baseline(Path::new("/nonexistent/PERSONALITY.md"));
        assert!(baseline.contains("Kora"));
    }

    #[test]
    fn file_contents_win_over_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("PERSONALITY.md");
        std::fs::write(&path, "Default tone: warm but direct.\n").unwrap();
        assert_eq!(load_baseline(&path), "Default tone: warm but direct.");
    }
}

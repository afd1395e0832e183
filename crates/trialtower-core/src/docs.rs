use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

/// One titled section of the operations playbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chapter {
    pub title: String,
    pub body: String,
}

pub fn load_playbook(path: &Path) -> Result<Vec<Chapter>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read playbook: {}", path.display()))?;
    Ok(split_chapters(&text))
}

/// Split playbook text on `[[CHAPTER: <title>]]` marker lines. Text before
/// the first marker is discarded; a marker with no following text yields an
/// empty-bodied chapter.
pub fn split_chapters(text: &str) -> Vec<Chapter> {
    let mut chapters: Vec<Chapter> = Vec::new();
    let mut current: Option<Chapter> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(title) = parse_marker(trimmed) {
            if let Some(chapter) = current.take() {
                chapters.push(finish(chapter));
            }
            current = Some(Chapter {
                title: title.to_string(),
                body: String::new(),
            });
        } else if let Some(chapter) = &mut current {
            chapter.body.push_str(line);
            chapter.body.push('\n');
        }
    }

    if let Some(chapter) = current {
        chapters.push(finish(chapter));
    }
    chapters
}

fn parse_marker(line: &str) -> Option<&str> {
    let inner = line.strip_prefix("[[CHAPTER:")?.strip_suffix("]]")?;
    Some(inner.trim())
}

fn finish(mut chapter: Chapter) -> Chapter {
    chapter.body = chapter.body.trim().to_string();
    chapter
}

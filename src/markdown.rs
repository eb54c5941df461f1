//! Heading-based counting for the legacy single-file listings
//! (`skill.md`, `agent.md`), where every `##` section is one entry.

use std::io::BufRead;
use std::path::Path;

/// Count the level-2 sections in a markdown file.
///
/// A line counts when, after trimming, it starts with `##` and has
/// non-blank content after the marker. A missing file surfaces as an
/// `io::ErrorKind::NotFound` error so callers can treat it as zero.
///
/// Lines are read as bytes; invalid UTF-8 is replaced rather than
/// treated as a read failure.
pub fn count_sections(path: &Path) -> std::io::Result<u64> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);

    let mut count = 0;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        if is_section_heading(&String::from_utf8_lossy(&buf)) {
            count += 1;
        }
    }
    Ok(count)
}

/// Like [`count_sections`], but a missing file counts as zero.
pub fn count_sections_or_zero(path: &Path) -> std::io::Result<u64> {
    match count_sections(path) {
        Ok(count) => Ok(count),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

fn is_section_heading(line: &str) -> bool {
    match line.trim().strip_prefix("##") {
        Some(rest) => !rest.trim_start_matches([' ', '\t']).is_empty(),
        None => false,
    }
}

use omr_core::{ArtifactKind, GroupKey};
use sha2::{Digest, Sha256};

const MAX_STEM_LEN: usize = 80;

/// Local file name for a downloaded artifact, e.g. `MATH101_grades.csv`.
///
/// Keys that are not already safe on every platform are cleaned up and get a
/// short hash of the original key appended, so two different keys never map
/// to the same file. Single graded images are named after the key and the
/// image, keeping the image's extension.
pub fn artifact_filename(key: &GroupKey, kind: &ArtifactKind) -> String {
    let stem = safe_stem(key.as_str());
    match kind {
        ArtifactKind::GradesCsv => format!("{stem}_grades.csv"),
        ArtifactKind::GradedImagesZip => format!("{stem}_graded_images.zip"),
        ArtifactKind::GradedImage(image) => match split_extension(image) {
            Some((base, ext)) => format!("{stem}_{}.{ext}", safe_stem(base)),
            None => format!("{stem}_{}", safe_stem(image)),
        },
    }
}

fn safe_stem(input: &str) -> String {
    let sanitized = sanitize_key(input);
    if sanitized == input {
        sanitized
    } else {
        format!("{sanitized}--{}", short_hash(input))
    }
}

fn split_extension(name: &str) -> Option<(&str, &str)> {
    let (base, ext) = name.rsplit_once('.')?;
    let plain_ext = (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric());
    (plain_ext && !base.is_empty()).then_some((base, ext))
}

fn sanitize_key(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]);
    if cleaned.is_empty() {
        return "exam".to_string();
    }

    let mut compacted = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for c in cleaned.chars() {
        if c == '_' && prev_underscore {
            continue;
        }
        prev_underscore = c == '_';
        compacted.push(c);
    }
    if compacted.len() > MAX_STEM_LEN {
        let mut end = MAX_STEM_LEN;
        while !compacted.is_char_boundary(end) {
            end -= 1;
        }
        compacted.truncate(end);
    }
    if is_reserved_windows_name(&compacted) {
        compacted.push('_');
    }
    compacted
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn short_hash(input: &str) -> String {
    use std::fmt::Write;

    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_key_is_used_verbatim() {
        let key = GroupKey::from("MATH101");
        assert_eq!(artifact_filename(&key, &ArtifactKind::GradesCsv), "MATH101_grades.csv");
        assert_eq!(
            artifact_filename(&key, &ArtifactKind::GradedImagesZip),
            "MATH101_graded_images.zip"
        );
    }

    #[test]
    fn unsafe_keys_get_distinct_hashed_names() {
        let a = artifact_filename(&GroupKey::from("A/B"), &ArtifactKind::GradesCsv);
        let b = artifact_filename(&GroupKey::from("A:B"), &ArtifactKind::GradesCsv);
        assert!(a.starts_with("A_B--"));
        assert!(a.ends_with("_grades.csv"));
        assert_ne!(a, b);
        assert!(!a.contains('/'));
    }

    #[test]
    fn reserved_and_empty_keys_are_renamed() {
        let con = artifact_filename(&GroupKey::from("con"), &ArtifactKind::GradesCsv);
        assert!(con.starts_with("con_--"));
        let empty = artifact_filename(&GroupKey::from("..."), &ArtifactKind::GradesCsv);
        assert!(empty.starts_with("exam--"));
    }

    #[test]
    fn long_keys_are_truncated_on_char_boundary() {
        let key = GroupKey::from("é".repeat(60).as_str());
        let name = artifact_filename(&key, &ArtifactKind::GradesCsv);
        let stem = name.split("--").next().unwrap();
        assert!(stem.len() <= MAX_STEM_LEN);
    }

    #[test]
    fn graded_image_keeps_its_extension() {
        let key = GroupKey::from("MATH101");
        let plain = ArtifactKind::GradedImage("sheet_007.png".to_string());
        assert_eq!(artifact_filename(&key, &plain), "MATH101_sheet_007.png");

        let nested = ArtifactKind::GradedImage("out/sheet 7.jpg".to_string());
        let name = artifact_filename(&key, &nested);
        assert!(name.starts_with("MATH101_out_sheet 7--"));
        assert!(name.ends_with(".jpg"));
        assert!(!name.contains('/'));
    }
}

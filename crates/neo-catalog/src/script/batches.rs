//! Splitting a script into batches on `GO` separators.

/// A batch and the script line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 1-based position among non-empty batches.
    pub number: usize,
    pub start_line: usize,
    pub sql: String,
}

/// `GO` alone on a line, optionally followed by a repeat count.
fn is_separator(line: &str) -> bool {
    let mut words = line.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some(go), count, None) => {
            go.eq_ignore_ascii_case("go") && count.map_or(true, |c| c.parse::<u32>().is_ok())
        }
        _ => false,
    }
}

/// Split on separator lines, dropping batches that hold only whitespace.
/// Repeat counts are not honoured.
pub fn split_batches(script: &str) -> Vec<Batch> {
    let mut batches = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut start_line = 1;

    let mut flush = |current: &mut Vec<&str>, start_line: usize| {
        let sql = current.join("\n");
        if !sql.trim().is_empty() {
            batches.push(Batch {
                number: batches.len() + 1,
                start_line,
                sql: sql.trim_matches('\n').to_string(),
            });
        }
        current.clear();
    };

    for (idx, line) in script.lines().enumerate() {
        let line = line.trim_start_matches('\u{feff}');
        if is_separator(line) {
            flush(&mut current, start_line);
            start_line = idx + 2;
        } else {
            if current.is_empty() && line.trim().is_empty() {
                start_line = idx + 2;
                continue;
            }
            current.push(line);
        }
    }
    flush(&mut current, start_line);
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_go_lines() {
        let script = "USE [master]\nGO\n\nCREATE DATABASE [NEOs]\n go \nGO\nSELECT 1 -- GO here is not a separator\nSELECT 'GO'\ngo 5\n";
        let batches = split_batches(script);

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].sql, "USE [master]");
        assert_eq!(batches[0].start_line, 1);
        assert_eq!(batches[1].sql, "CREATE DATABASE [NEOs]");
        assert_eq!(batches[1].start_line, 4);
        assert_eq!(batches[2].number, 3);
        assert_eq!(
            batches[2].sql,
            "SELECT 1 -- GO here is not a separator\nSELECT 'GO'"
        );
        assert_eq!(batches[2].start_line, 7);
    }

    #[test]
    fn test_script_without_separator_is_one_batch() {
        let batches = split_batches("\u{feff}SELECT 1;\nSELECT 2;");
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].sql, "SELECT 1;\nSELECT 2;");
    }

    #[test]
    fn test_separator_detection() {
        assert!(is_separator("GO"));
        assert!(is_separator("\tgo  "));
        assert!(is_separator("Go 10"));
        assert!(!is_separator("GOTO label"));
        assert!(!is_separator("GO x"));
        assert!(!is_separator(""));
    }
}

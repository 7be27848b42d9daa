//! `*` / `?` wildcard matching.
//!
//! `*` matches any run of characters and `?` exactly one. The matcher makes
//! a single left-to-right pass: each literal run in the pattern is matched
//! at its first occurrence and never retried further along. So `?Y*X?`
//! matches `XYYYXY` but not `XYYXYXY`.

use super::CaseSensitivity;

const STAR: char = '*';
const QUESTION: char = '?';

fn is_wild(c: char) -> bool {
    c == STAR || c == QUESTION
}

fn first_not_wild(wc: &[char], from: usize) -> Option<usize> {
    (from..wc.len()).find(|&i| !is_wild(wc[i]))
}

fn first_wild(wc: &[char], from: usize) -> Option<usize> {
    (from..wc.len()).find(|&i| is_wild(wc[i]))
}

fn find(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

fn chars(s: &str, case: CaseSensitivity) -> Vec<char> {
    match case {
        CaseSensitivity::Sensitive => s.chars().collect(),
        CaseSensitivity::Insensitive => s.to_uppercase().chars().collect(),
    }
}

/// True when `text` matches `pattern`.
pub fn matches_wildcards(text: &str, pattern: &str, case: CaseSensitivity) -> bool {
    let t = chars(text, case);
    let wc = chars(pattern, case);

    if t.is_empty() && wc.is_empty() {
        return true;
    }
    if t.is_empty() && wc.iter().any(|&c| c != STAR) {
        return false;
    }
    if wc.is_empty() {
        return false;
    }
    if wc == t {
        return true;
    }
    if !wc.contains(&STAR) && t.len() != wc.len() {
        return false;
    }
    let questions = wc.iter().filter(|&&c| c == QUESTION).count();
    if t.len() < questions {
        return false;
    }

    let mut curr_wc = Some(0);
    let mut curr_t = 0;
    let mut next_t = Some(0);

    loop {
        let Some(cw) = curr_wc.filter(|&i| i < wc.len()) else {
            break;
        };
        if !next_t.is_some_and(|n| n < t.len()) {
            break;
        }

        let literal_start = first_not_wild(&wc, cw);
        let wild_run = &wc[cw..literal_start.unwrap_or(wc.len())];
        let next_wc = literal_start.and_then(|i| first_wild(&wc, i));
        let literal: &[char] = match literal_start {
            Some(i) => &wc[i..next_wc.unwrap_or(wc.len())],
            None => &[],
        };

        let has_star = wild_run.contains(&STAR);
        let run_questions = wild_run.iter().filter(|&&c| c == QUESTION).count();

        let found = if literal.is_empty() {
            Some(t.len())
        } else {
            find(&t, literal, curr_t + run_questions)
        };

        let Some(at) = found else {
            return false;
        };
        if !has_star && at - curr_t > run_questions {
            return false;
        }
        if next_wc.is_none() {
            let remain: &[char] = match literal_start {
                Some(i) => &wc[i..],
                None => &[],
            };
            if !remain.is_empty() {
                if !t.ends_with(remain) {
                    return false;
                }
            } else if curr_t == t.len() && wild_run == [QUESTION] {
                return false;
            }
        }

        curr_wc = next_wc;
        next_t = found;
        curr_t = at + literal.len();
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(text: &str, pattern: &str) -> bool {
        matches_wildcards(text, pattern, CaseSensitivity::Sensitive)
    }

    #[test]
    fn test_trivial_cases() {
        assert!(m("", ""));
        assert!(m("", "*"));
        assert!(m("", "**"));
        assert!(!m("", "?"));
        assert!(!m("a", ""));
        assert!(m("abc", "abc"));
        assert!(!m("abc", "abd"));
        assert!(!m("abc", "ab"));
    }

    #[test]
    fn test_star() {
        assert!(m("anything", "*"));
        assert!(m("report.txt", "*.txt"));
        assert!(!m("report.txt", "*.log"));
        assert!(m("report.txt", "rep*"));
        assert!(m("report.txt", "r*t"));
        assert!(m("abc", "a*c"));
        assert!(m("ac", "a*c"));
    }

    #[test]
    fn test_question() {
        assert!(m("abc", "a?c"));
        assert!(m("abc", "???"));
        assert!(!m("ab", "???"));
        assert!(!m("abcd", "???"));
        assert!(m("abcd", "?*"));
        assert!(m("abcd", "*?"));
        assert!(!m("abc", "abc?"));
    }

    #[test]
    fn test_no_backtracking() {
        assert!(m("XYYYXY", "?Y*X?"));
        assert!(m("XYYYXX", "?Y*X?"));
        assert!(!m("XYYXYXY", "?Y*X?"));
    }

    #[test]
    fn test_case_insensitive() {
        assert!(!m("README", "readme"));
        assert!(matches_wildcards("README", "read*", CaseSensitivity::Insensitive));
        assert!(matches_wildcards("Makefile", "m?KEFILE", CaseSensitivity::Insensitive));
    }

    #[test]
    fn test_path_prefix_patterns() {
        assert!(m("/tmp/a/b/", "/tmp/*"));
        assert!(m("/tmp/a/b/", "/tmp/a/*"));
        assert!(!m("/tmp/b/", "/tmp/a/*"));
        assert!(m("/tmp/a/", "/tmp/a/"));
    }
}

//! Path assembly and disassembly.
//!
//! A path is split into a root, a list of directories, a name and an
//! extension. Assembling the parts again yields an equivalent path with
//! redundant separators removed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator conventions for path syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathStyle {
    /// `/` separated, root is `/`.
    Unix,
    /// `\` or `/` separated, roots are `C:`, `\` or `\\server\share`.
    Windows,
}

impl PathStyle {
    /// The style of the host.
    pub const fn native() -> Self {
        if cfg!(windows) {
            PathStyle::Windows
        } else {
            PathStyle::Unix
        }
    }

    /// Separator written between components.
    pub const fn separator(self) -> char {
        match self {
            PathStyle::Unix => '/',
            PathStyle::Windows => '\\',
        }
    }

    /// True if `c` separates components in this style.
    pub fn is_separator(self, c: char) -> bool {
        match self {
            PathStyle::Unix => c == '/',
            PathStyle::Windows => c == '\\' || c == '/',
        }
    }

    /// Strips trailing separators unless the path consists only of them.
    pub fn remove_trailing_separators(self, path: &str) -> &str {
        let trimmed = path.trim_end_matches(|c| self.is_separator(c));
        if trimmed.is_empty() {
            path
        } else {
            trimmed
        }
    }

    fn split_root<'a>(self, path: &'a str) -> (String, &'a str) {
        let strip = |s: &'a str| s.trim_start_matches(|c| self.is_separator(c));
        let has_trailing = path.ends_with(|c| self.is_separator(c));

        match self {
            PathStyle::Unix => {
                if path.starts_with('/') {
                    ("/".to_string(), strip(path))
                } else {
                    (String::new(), path)
                }
            }
            PathStyle::Windows => {
                let bytes = path.as_bytes();
                if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
                    let mut root = path[..2].to_string();
                    let rest = strip(&path[2..]);
                    if rest.is_empty() && has_trailing {
                        root.push('\\');
                    }
                    return (root, rest);
                }

                let sep_at = |i: usize| path[i..].starts_with(|c| self.is_separator(c));
                if path.len() >= 2 && sep_at(0) && sep_at(1) {
                    // \\server\share
                    let after_server = path[2..]
                        .find(|c| self.is_separator(c))
                        .map(|i| i + 2)
                        .filter(|&i| i >= 3);
                    if let Some(server_end) = after_server {
                        let share_start = path[server_end..]
                            .find(|c| !self.is_separator(c))
                            .map(|i| i + server_end);
                        if let Some(share_start) = share_start {
                            let end = path[share_start..]
                                .find(|c| self.is_separator(c))
                                .map_or(path.len(), |share_len| share_start + share_len);
                            let mut root = path[..end].to_string();
                            let rest = strip(&path[end..]);
                            if rest.is_empty() && has_trailing {
                                root.push('\\');
                            }
                            return (root, rest);
                        }
                    }
                }

                if sep_at(0) {
                    ("\\".to_string(), strip(path))
                } else {
                    (String::new(), path)
                }
            }
        }
    }

    /// Joins the parts into a path string.
    pub fn assemble(self, root: &str, dirs: &[String], name: &str, extension: &str) -> String {
        let sep = self.separator();
        let mut result = String::from(root);
        let needs_sep = |s: &str| !s.is_empty() && !s.ends_with(|c| self.is_separator(c));

        if !dirs.is_empty() {
            if needs_sep(&result) {
                result.push(sep);
            }
            for (i, dir) in dirs.iter().enumerate() {
                if i > 0 {
                    result.push(sep);
                }
                result.push_str(dir);
            }
        }

        if !name.is_empty() || !extension.is_empty() {
            if needs_sep(&result) {
                result.push(sep);
            }
            result.push_str(name);
            if !extension.is_empty() {
                result.push('.');
                result.push_str(extension);
            }
        }
        result
    }

    /// Splits `path` into its parts.
    pub fn disassemble(self, path: &str) -> FsPath {
        let (root, rest) = self.split_root(path);
        let rest = rest.trim_end_matches(|c| self.is_separator(c));

        let mut dirs = Vec::new();
        let mut last = rest;
        while let Some(at) = last.find(|c| self.is_separator(c)) {
            dirs.push(last[..at].to_string());
            last = last[at..].trim_start_matches(|c| self.is_separator(c));
        }

        let (name, extension) = if last == "." || last == ".." {
            (last.to_string(), String::new())
        } else {
            match last.rfind('.') {
                Some(dot) if dot + 1 != last.len() => {
                    (last[..dot].to_string(), last[dot + 1..].to_string())
                }
                _ => (last.to_string(), String::new()),
            }
        };

        FsPath {
            style: self,
            root,
            dirs,
            name,
            extension,
        }
    }
}

/// A path split into root, directories, name and extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsPath {
    style: PathStyle,
    /// Root such as `/`, `C:` or empty for relative paths.
    pub root: String,
    /// Directory components between root and name.
    pub dirs: Vec<String>,
    /// Final component without its extension.
    pub name: String,
    /// Text after the last `.` of the final component.
    pub extension: String,
}

impl FsPath {
    /// An empty relative path in the native style.
    pub fn new() -> Self {
        Self::with_style(PathStyle::native())
    }

    /// An empty relative path in `style`.
    pub fn with_style(style: PathStyle) -> Self {
        Self {
            style,
            root: String::new(),
            dirs: Vec::new(),
            name: String::new(),
            extension: String::new(),
        }
    }

    /// Splits a native path.
    pub fn parse(path: &str) -> Self {
        PathStyle::native().disassemble(path)
    }

    /// Splits a path written in `style`.
    pub fn parse_as(path: &str, style: PathStyle) -> Self {
        style.disassemble(path)
    }

    /// The separator conventions of this path.
    pub fn style(&self) -> PathStyle {
        self.style
    }

    /// Replaces the root.
    pub fn set_root(&mut self, root: impl Into<String>) -> &mut Self {
        self.root = root.into();
        self
    }

    /// Appends a directory.
    pub fn add_dir(&mut self, dir: impl Into<String>) -> &mut Self {
        self.dirs.push(dir.into());
        self
    }

    /// Replaces the name.
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    /// Replaces the extension.
    pub fn set_extension(&mut self, extension: impl Into<String>) -> &mut Self {
        self.extension = extension.into();
        self
    }

    /// Reassembles the path.
    pub fn as_string(&self) -> String {
        self.style
            .assemble(&self.root, &self.dirs, &self.name, &self.extension)
    }
}

impl Default for FsPath {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(p: &FsPath) -> (&str, Vec<&str>, &str, &str) {
        (
            p.root.as_str(),
            p.dirs.iter().map(String::as_str).collect(),
            p.name.as_str(),
            p.extension.as_str(),
        )
    }

    #[test]
    fn test_unix_disassemble() {
        let p = FsPath::parse_as("/usr/local/staf/bin/STAFProc.exe", PathStyle::Unix);
        assert_eq!(
            parts(&p),
            ("/", vec!["usr", "local", "staf", "bin"], "STAFProc", "exe")
        );

        let p = FsPath::parse_as("relative/file", PathStyle::Unix);
        assert_eq!(parts(&p), ("", vec!["relative"], "file", ""));
    }

    #[test]
    fn test_unix_redundant_separators() {
        let p = FsPath::parse_as("///tmp//a///b.txt//", PathStyle::Unix);
        assert_eq!(parts(&p), ("/", vec!["tmp", "a"], "b", "txt"));
        assert_eq!(p.as_string(), "/tmp/a/b.txt");
    }

    #[test]
    fn test_root_only() {
        let p = FsPath::parse_as("/", PathStyle::Unix);
        assert_eq!(parts(&p), ("/", vec![], "", ""));
        assert_eq!(p.as_string(), "/");
    }

    #[test]
    fn test_dot_names() {
        let p = FsPath::parse_as("/tmp/.", PathStyle::Unix);
        assert_eq!(parts(&p), ("/", vec!["tmp"], ".", ""));
        let p = FsPath::parse_as("/tmp/..", PathStyle::Unix);
        assert_eq!(parts(&p), ("/", vec!["tmp"], "..", ""));
    }

    #[test]
    fn test_extension_rules() {
        let p = FsPath::parse_as("archive.tar.gz", PathStyle::Unix);
        assert_eq!(parts(&p), ("", vec![], "archive.tar", "gz"));
        let p = FsPath::parse_as("trailing.", PathStyle::Unix);
        assert_eq!(parts(&p), ("", vec![], "trailing.", ""));
        let p = FsPath::parse_as(".profile", PathStyle::Unix);
        assert_eq!(parts(&p), ("", vec![], "", "profile"));
        assert_eq!(p.as_string(), ".profile");
    }

    #[test]
    fn test_assemble() {
        let dirs = vec!["a".to_string(), "b".to_string()];
        assert_eq!(PathStyle::Unix.assemble("/", &dirs, "c", "txt"), "/a/b/c.txt");
        assert_eq!(PathStyle::Unix.assemble("", &dirs, "c", ""), "a/b/c");
        assert_eq!(PathStyle::Unix.assemble("/", &[], "", ""), "/");
        assert_eq!(PathStyle::Unix.assemble("", &[], "", "cfg"), ".cfg");
        assert_eq!(PathStyle::Windows.assemble("C:", &dirs, "c", "txt"), "C:\\a\\b\\c.txt");
        assert_eq!(PathStyle::Windows.assemble("C:\\", &[], "boot", "ini"), "C:\\boot.ini");
    }

    #[test]
    fn test_builder() {
        let mut p = FsPath::with_style(PathStyle::Unix);
        p.set_root("/").add_dir("var").add_dir("log").set_name("staf").set_extension("log");
        assert_eq!(p.to_string(), "/var/log/staf.log");
    }

    #[test]
    fn test_windows_drive() {
        let p = FsPath::parse_as("C:\\STAF\\bin\\STAF.dll", PathStyle::Windows);
        assert_eq!(parts(&p), ("C:", vec!["STAF", "bin"], "STAF", "dll"));
        assert_eq!(p.as_string(), "C:\\STAF\\bin\\STAF.dll");

        let p = FsPath::parse_as("C:/", PathStyle::Windows);
        assert_eq!(parts(&p), ("C:\\", vec![], "", ""));
    }

    #[test]
    fn test_windows_unc_and_mixed() {
        let p = FsPath::parse_as("\\\\server\\share\\dir\\f.txt", PathStyle::Windows);
        assert_eq!(parts(&p), ("\\\\server\\share", vec!["dir"], "f", "txt"));

        let p = FsPath::parse_as("\\\\server\\share\\", PathStyle::Windows);
        assert_eq!(parts(&p), ("\\\\server\\share\\", vec![], "", ""));
        assert_eq!(p.as_string(), "\\\\server\\share\\");

        let p = FsPath::parse_as("\\\\server\\share", PathStyle::Windows);
        assert_eq!(parts(&p), ("\\\\server\\share", vec![], "", ""));

        let p = FsPath::parse_as("/temp/dir/f", PathStyle::Windows);
        assert_eq!(parts(&p), ("\\", vec!["temp", "dir"], "f", ""));
    }

    #[test]
    fn test_remove_trailing_separators() {
        assert_eq!(PathStyle::Unix.remove_trailing_separators("/tmp/x//"), "/tmp/x");
        assert_eq!(PathStyle::Unix.remove_trailing_separators("/"), "/");
        assert_eq!(PathStyle::Unix.remove_trailing_separators("//"), "//");
        assert_eq!(PathStyle::Unix.remove_trailing_separators("a"), "a");
    }
}

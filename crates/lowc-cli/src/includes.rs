use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use lowc_compiler::{IncludedSource, SourceFile, Span};

/// Loads `#include` files relative to the directory of the main source and
/// keeps every loaded file for diagnostics.
///
/// File indexes are handed out in first-seen order; index 0 is the main
/// file.
pub struct IncludeFiles {
    dir: PathBuf,
    files: RefCell<Vec<SourceFile>>,
}

impl IncludeFiles {
    pub fn new(main: &Path, source: &str) -> Self {
        let dir = main
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            dir,
            files: RefCell::new(vec![SourceFile::new(main.display().to_string(), source)]),
        }
    }

    pub fn resolve(&self, name: &str) -> Option<IncludedSource> {
        let path = self.dir.join(name);
        let display = path.display().to_string();
        let mut files = self.files.borrow_mut();
        if let Some(index) = files.iter().position(|f| f.name == display) {
            return Some(IncludedSource {
                source: files[index].source.clone(),
                file_index: index as u32,
            });
        }
        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read include");
                return None;
            }
        };
        files.push(SourceFile::new(display, source.clone()));
        Some(IncludedSource {
            source,
            file_index: (files.len() - 1) as u32,
        })
    }

    /// Display name of a file index.
    pub fn name(&self, index: u32) -> String {
        self.files
            .borrow()
            .get(index as usize)
            .map(|f| f.name.clone())
            .unwrap_or_else(|| format!("<file {index}>"))
    }

    /// The source line a span starts on, underlined.
    pub fn excerpt(&self, span: &Span) -> Option<String> {
        self.files.borrow().get(span.file as usize)?.excerpt(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(test: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lowc-cli-{test}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_indexes_in_first_seen_order() {
        let dir = scratch_dir("order");
        fs::write(dir.join("a.lc"), "// a\n").unwrap();
        fs::write(dir.join("b.lc"), "// b\n").unwrap();
        let files = IncludeFiles::new(&dir.join("main.lc"), "");

        assert_eq!(files.resolve("b.lc").unwrap().file_index, 1);
        assert_eq!(files.resolve("a.lc").unwrap().file_index, 2);
        let again = files.resolve("b.lc").unwrap();
        assert_eq!(again.file_index, 1);
        assert_eq!(again.source, "// b\n");

        assert!(files.name(0).ends_with("main.lc"));
        assert!(files.name(2).ends_with("a.lc"));
        assert_eq!(files.name(9), "<file 9>");
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = scratch_dir("missing");
        let files = IncludeFiles::new(&dir.join("main.lc"), "");
        assert!(files.resolve("nope.lc").is_none());
        assert_eq!(files.files.borrow().len(), 1);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_excerpt_from_included_file() {
        let dir = scratch_dir("excerpt");
        fs::write(dir.join("util.lc"), "func g() {\n    oops;\n}\n").unwrap();
        let files = IncludeFiles::new(&dir.join("main.lc"), "#include \"util.lc\"\n");
        let index = files.resolve("util.lc").unwrap().file_index;

        let span = Span::new(index, (15, 2, 5), (19, 2, 9));
        assert_eq!(files.excerpt(&span).unwrap(), "    oops;\n    ^^^^");
        assert_eq!(
            files.excerpt(&Span::point(0, 0, 1, 1)).unwrap(),
            "#include \"util.lc\"\n^"
        );
        fs::remove_dir_all(dir).unwrap();
    }
}

//! Plain-text rendering of answers for the terminal.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use evmanual_shared::{AnswerResult, GenerationFailure};

static IMAGE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_page\d+_img\d+\.png$").expect("valid regex"));

const MISSING: &str = "(file not found)";

/// Image name without its `_page<N>_img<N>.png` suffix.
pub(crate) fn display_image_name(name: &str) -> String {
    IMAGE_SUFFIX.replace(name, "").into_owned()
}

/// Document title shown for a source path: the file stem.
pub(crate) fn source_title(source: &str) -> String {
    Path::new(source)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.to_string())
}

fn exists_under(assets_root: &Path, relative: &str) -> bool {
    !relative.trim().is_empty() && assets_root.join(relative).exists()
}

/// Full text rendering of an answer.
///
/// Sources and images whose files are missing under `assets_root` get a
/// placeholder instead of a path; rendering never fails on them.
pub(crate) struct AnswerView<'a> {
    pub result: &'a AnswerResult,
    pub assets_root: &'a Path,
}

impl fmt::Display for AnswerView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.result;

        writeln!(f)?;
        writeln!(f, "  Answer")?;
        writeln!(f, "  ------")?;
        for line in result.answer.lines() {
            writeln!(f, "  {line}")?;
        }

        writeln!(f)?;
        writeln!(f, "  Sources")?;
        writeln!(f, "  -------")?;
        if result.source_documents.is_empty() {
            writeln!(f, "  No related documents found.")?;
        }
        for (i, chunk) in result.source_documents.iter().enumerate() {
            let title = source_title(&chunk.source);
            if exists_under(self.assets_root, &chunk.source) {
                let path = self.assets_root.join(&chunk.source);
                writeln!(f, "  {}. {title}  {}", i + 1, path.display())?;
            } else {
                writeln!(f, "  {}. {title}  {MISSING}", i + 1)?;
            }
        }

        writeln!(f)?;
        writeln!(f, "  Section:  {}", result.section)?;
        writeln!(f, "  Document: {}", result.document)?;

        if result.image_paths.is_empty() {
            return Ok(());
        }
        writeln!(f)?;
        writeln!(f, "  Images")?;
        writeln!(f, "  ------")?;
        for (path, name) in result.images() {
            let label = display_image_name(name);
            if exists_under(self.assets_root, path) {
                writeln!(f, "  - {label}  {}", self.assets_root.join(path).display())?;
            } else {
                writeln!(f, "  - {label}  {MISSING}")?;
            }
        }
        Ok(())
    }
}

/// Lines describing a failed query, including decisions made before the failure.
pub(crate) struct FailureView<'a>(pub &'a GenerationFailure);

impl fmt::Display for FailureView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failure = self.0;
        writeln!(f, "  Answer generation failed during {}.", failure.stage)?;
        if let Some(section) = &failure.section {
            writeln!(f, "  Section:  {section}")?;
        }
        if let Some(document) = &failure.document {
            writeln!(f, "  Document: {document}")?;
        }
        writeln!(f, "  Cause:    {}", failure.source)
    }
}

//! Applying patches to document text.
//!
//! Deletions are validated against the live text: a patch whose recorded
//! deleted text differs from the document means the local copy has diverged
//! from the patch stream, which is reported rather than papered over.

use crate::diff::DiffKind;
use crate::patch::Patch;
use std::borrow::Cow;

/// Apply `patches` to `content` in order, returning the new document.
///
/// Patches use LF line endings. When `content` uses CRLF each patch is
/// converted against the LF view of the document before it is applied.
///
/// # Errors
///
/// Returns [`ApplyError::Consistency`] when a deletion's text does not match
/// the document, [`ApplyError::InvalidPosition`] when an insertion would split
/// a `\r\n` pair, and [`ApplyError::OutOfBounds`] or [`ApplyError::Overlap`]
/// when a diff does not fit the document.
pub fn apply_patch(content: &str, patches: &[Patch]) -> Result<String, ApplyError> {
    let mut document = content.to_string();
    for patch in patches {
        document = apply_one(&document, patch)?;
    }
    Ok(document)
}

fn apply_one(content: &str, patch: &Patch) -> Result<String, ApplyError> {
    let patch = if content.contains("\r\n") {
        Cow::Owned(patch.to_crlf(&content.replace("\r\n", "\n")))
    } else {
        Cow::Borrowed(patch)
    };

    let chars: Vec<char> = content.chars().collect();
    let mut output = String::with_capacity(content.len());
    let mut cursor = 0;

    for diff in patch.diffs() {
        let start = diff.start_index;
        if start < cursor {
            return Err(ApplyError::Overlap { index: start });
        }
        if start > chars.len() {
            return Err(ApplyError::OutOfBounds {
                index: start,
                length: chars.len(),
            });
        }
        output.extend(&chars[cursor..start]);
        cursor = start;

        match diff.kind {
            DiffKind::Insertion => {
                if start > 0 && chars[start - 1] == '\r' && chars.get(start) == Some(&'\n') {
                    return Err(ApplyError::InvalidPosition { index: start });
                }
                output.push_str(&diff.text);
            }
            DiffKind::Deletion => {
                let end = start + diff.len();
                let found: String = chars[start..end.min(chars.len())].iter().collect();
                if found != diff.text {
                    tracing::error!(
                        index = start,
                        expected = %diff.text,
                        found = %found,
                        "Deleted text does not match document"
                    );
                    return Err(ApplyError::Consistency {
                        index: start,
                        expected: diff.text.clone(),
                        found,
                    });
                }
                cursor = end;
            }
        }
    }

    output.extend(&chars[cursor..]);
    Ok(output)
}

/// Errors raised while applying a patch to a document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// A deletion's recorded text differs from the document
    #[error("deleted text at {index} is {found:?}, patch expected {expected:?}")]
    Consistency {
        /// Start of the deletion
        index: usize,
        /// Text recorded in the patch
        expected: String,
        /// Text found in the document
        found: String,
    },
    /// An insertion would land between `\r` and `\n`
    #[error("insertion at {index} splits a CRLF pair")]
    InvalidPosition {
        /// Insertion index
        index: usize,
    },
    /// A diff starts past the end of the document
    #[error("diff at {index} is outside a document of {length} characters")]
    OutOfBounds {
        /// Start of the diff
        index: usize,
        /// Document length
        length: usize,
    },
    /// A diff starts inside the span of the previous one
    #[error("diff at {index} overlaps the previous diff")]
    Overlap {
        /// Start of the diff
        index: usize,
    },
}

//! Line-level diff between the original and tailored document.
//!
//! Classic LCS table over lines, walked front to back. Lines keep their
//! terminators so the parts concatenate back into the exact inputs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffTag {
    Added,
    Removed,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffPart {
    pub tag: DiffTag,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiffResult {
    pub parts: Vec<DiffPart>,
}

impl DiffResult {
    fn count(&self, tag: DiffTag) -> usize {
        self.parts.iter().filter(|p| p.tag == tag).count()
    }

    pub fn added_lines(&self) -> usize {
        self.count(DiffTag::Added)
    }

    pub fn removed_lines(&self) -> usize {
        self.count(DiffTag::Removed)
    }

    pub fn unchanged_lines(&self) -> usize {
        self.count(DiffTag::Unchanged)
    }

    pub fn is_identical(&self) -> bool {
        self.parts.iter().all(|p| p.tag == DiffTag::Unchanged)
    }

    /// Concatenation of `unchanged` and `removed` parts.
    #[cfg(test)]
    pub fn original_text(&self) -> String {
        self.collect(DiffTag::Removed)
    }

    /// Concatenation of `unchanged` and `added` parts.
    #[cfg(test)]
    pub fn modified_text(&self) -> String {
        self.collect(DiffTag::Added)
    }

    #[cfg(test)]
    fn collect(&self, side: DiffTag) -> String {
        self.parts
            .iter()
            .filter(|p| p.tag == DiffTag::Unchanged || p.tag == side)
            .map(|p| p.text.as_str())
            .collect()
    }
}

/// Computes the line diff of `original` → `modified`.
///
/// Deterministic: ties in the LCS walk always prefer consuming the original
/// side first, and each change hunk is emitted as removed/added pairs.
/// The common prefix and suffix are matched directly, so the LCS table only
/// spans the lines in between.
pub fn compute_diff(original: &str, modified: &str) -> DiffResult {
    let a: Vec<&str> = original.split_inclusive('\n').collect();
    let b: Vec<&str> = modified.split_inclusive('\n').collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let mut parts = Vec::with_capacity(a.len().max(b.len()));
    parts.extend(a[..prefix].iter().map(|line| unchanged(line)));
    diff_middle(
        &mut parts,
        &a[prefix..a.len() - suffix],
        &b[prefix..b.len() - suffix],
    );
    parts.extend(a[a.len() - suffix..].iter().map(|line| unchanged(line)));

    DiffResult { parts }
}

/// Re-appends the original's final line break when the tailored text lost it.
///
/// Provider output is trimmed, so an unchanged last line would otherwise
/// show up as a removed/added pair.
pub fn align_trailing_newline(original: &str, mut modified: String) -> String {
    if original.ends_with('\n') && !modified.is_empty() && !modified.ends_with('\n') {
        modified.push('\n');
    }
    modified
}

fn unchanged(line: &str) -> DiffPart {
    DiffPart {
        tag: DiffTag::Unchanged,
        text: line.to_string(),
    }
}

fn diff_middle(parts: &mut Vec<DiffPart>, a: &[&str], b: &[&str]) {
    // lcs[i][j] = LCS length of a[i..] and b[j..]
    let mut lcs = vec![vec![0u32; b.len() + 1]; a.len() + 1];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut removed: Vec<&str> = Vec::new();
    let mut added: Vec<&str> = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < a.len() || j < b.len() {
        if i < a.len() && j < b.len() && a[i] == b[j] {
            flush_hunk(parts, &mut removed, &mut added);
            parts.push(unchanged(a[i]));
            i += 1;
            j += 1;
        } else if j == b.len() || (i < a.len() && lcs[i + 1][j] >= lcs[i][j + 1]) {
            removed.push(a[i]);
            i += 1;
        } else {
            added.push(b[j]);
            j += 1;
        }
    }
    flush_hunk(parts, &mut removed, &mut added);
}

/// Emits a change hunk as removed/added pairs, then whatever is left over.
fn flush_hunk(parts: &mut Vec<DiffPart>, removed: &mut Vec<&str>, added: &mut Vec<&str>) {
    let paired = removed.len().min(added.len());
    for k in 0..paired {
        parts.push(DiffPart {
            tag: DiffTag::Removed,
            text: removed[k].to_string(),
        });
        parts.push(DiffPart {
            tag: DiffTag::Added,
            text: added[k].to_string(),
        });
    }
    parts.extend(removed[paired..].iter().map(|line| DiffPart {
        tag: DiffTag::Removed,
        text: line.to_string(),
    }));
    parts.extend(added[paired..].iter().map(|line| DiffPart {
        tag: DiffTag::Added,
        text: line.to_string(),
    }));
    removed.clear();
    added.clear();
}

use crate::error::SelectionError;
use crate::models::RemoteFileEntry;

/// Checked state over a repository listing.
///
/// Every entry starts checked. A filter hides entries without unchecking
/// them; bulk operations and the summary only consider visible entries.
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    entries: &'a [RemoteFileEntry],
    checked: Vec<bool>,
    visible: Vec<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionSummary {
    pub count: usize,
    pub bytes: u64,
}

impl<'a> Selection<'a> {
    pub fn new(entries: &'a [RemoteFileEntry]) -> Self {
        Self {
            entries,
            checked: vec![true; entries.len()],
            visible: vec![true; entries.len()],
        }
    }

    /// Case-insensitive substring filter on the relative path. Empty shows all.
    pub fn filter(&mut self, query: &str) {
        let query = query.trim().to_lowercase();
        for (visible, entry) in self.visible.iter_mut().zip(self.entries) {
            *visible = query.is_empty() || entry.relative_path.to_lowercase().contains(&query);
        }
    }

    pub fn select_all(&mut self) {
        self.for_visible(|checked| *checked = true);
    }

    pub fn clear(&mut self) {
        self.for_visible(|checked| *checked = false);
    }

    pub fn invert(&mut self) {
        self.for_visible(|checked| *checked = !*checked);
    }

    /// Flips one entry. Returns `false` if the index is out of range.
    pub fn toggle(&mut self, index: usize) -> bool {
        match self.checked.get_mut(index) {
            Some(checked) => {
                *checked = !*checked;
                true
            }
            None => false,
        }
    }

    /// Keeps only the given indices checked.
    pub fn select_only(&mut self, indices: &[usize]) -> Result<(), SelectionError> {
        if let Some(&index) = indices.iter().find(|&&i| i >= self.entries.len()) {
            return Err(SelectionError::OutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        self.checked.iter_mut().for_each(|checked| *checked = false);
        for &index in indices {
            self.checked[index] = true;
        }
        Ok(())
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.checked.get(index).copied().unwrap_or(false)
            && self.visible.get(index).copied().unwrap_or(false)
    }

    /// Checked and visible indices, in listing order.
    pub fn selected_indices(&self) -> Vec<usize> {
        (0..self.entries.len())
            .filter(|&index| self.is_selected(index))
            .collect()
    }

    pub fn summary(&self) -> SelectionSummary {
        self.selected_indices()
            .into_iter()
            .fold(SelectionSummary::default(), |acc, index| SelectionSummary {
                count: acc.count + 1,
                bytes: acc.bytes + self.entries[index].size_bytes,
            })
    }

    fn for_visible(&mut self, mut apply: impl FnMut(&mut bool)) {
        for (checked, visible) in self.checked.iter_mut().zip(&self.visible) {
            if *visible {
                apply(checked);
            }
        }
    }
}

/// Parses index lists such as `0,2,5-7` against a listing of `len` entries.
///
/// Bounds are checked before a range is expanded.
pub fn parse_index_spec(spec: &str, len: usize) -> Result<Vec<usize>, SelectionError> {
    let invalid = |reason: &str| SelectionError::InvalidSpec {
        spec: spec.to_string(),
        reason: reason.to_string(),
    };
    let in_range = |index: usize| {
        if index < len {
            Ok(index)
        } else {
            Err(SelectionError::OutOfRange { index, len })
        }
    };

    let mut indices = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start: usize = start.trim().parse().map_err(|_| invalid(part))?;
                let end: usize = end.trim().parse().map_err(|_| invalid(part))?;
                if start > end {
                    return Err(invalid(part));
                }
                in_range(end)?;
                indices.extend(start..=end);
            }
            None => indices.push(in_range(part.parse().map_err(|_| invalid(part))?)?),
        }
    }

    if indices.is_empty() {
        return Err(invalid("no indices"));
    }
    indices.sort_unstable();
    indices.dedup();
    Ok(indices)
}

//! Page offsets and termination detection.

use crate::ledger::Page;

/// Returns the offset page `page_index` is requested at.
///
/// Page 0 starts at offset 0. Every later page starts one past the end of the previous page as the API's
/// continuation offsets are one-based.
///
/// # Examples
///
/// ```
/// use stx_sync::cursor::compute_next_offset;
///
/// assert_eq!(compute_next_offset(0, 30), 0);
/// assert_eq!(compute_next_offset(1, 30), 31);
/// assert_eq!(compute_next_offset(3, 10), 31);
/// ```
pub fn compute_next_offset(page_index: u64, limit: u64) -> u64 {
    if page_index == 0 {
        0
    } else {
        limit.saturating_mul(page_index).saturating_add(1)
    }
}

/// Returns true if no further page exists after `page`.
///
/// A page is the last page if it is empty or holds fewer items than the limit it was requested with.
pub fn is_last_page<T>(page: &Page<T>) -> bool {
    page.items.is_empty() || (page.items.len() as u64) < page.limit
}

/// Concatenates the items of all pages in page order, preserving the order within each page.
pub fn merge_all<T: Clone>(pages: &[Page<T>]) -> Vec<T> {
    pages
        .iter()
        .flat_map(|page| page.items.iter().cloned())
        .collect()
}

/// Splits the result of a single windowed request back into pages of `limit` items.
///
/// Every resulting page carries `limit` so termination detection behaves as if each page had been fetched on its
/// own. An empty window yields one empty page.
pub(crate) fn paginate<T>(items: Vec<T>, limit: u64, total: Option<u64>) -> Vec<Page<T>> {
    if items.is_empty() || limit == 0 {
        return vec![Page {
            items,
            offset: 0,
            limit,
            total,
        }];
    }

    let limit_usize = usize::try_from(limit).unwrap_or(usize::MAX);
    let full_pages = items.len() / limit_usize;
    let mut pages = Vec::with_capacity(full_pages + 1);
    let mut items = items.into_iter().peekable();
    let mut page_index = 0;
    while items.peek().is_some() {
        pages.push(Page {
            items: items.by_ref().take(limit_usize).collect(),
            offset: compute_next_offset(page_index, limit),
            limit,
            total,
        });
        page_index += 1;
    }

    pages
}

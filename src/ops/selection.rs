//! Page selections.
//!
//! Users write page numbers 1-based: `"all"`, `"1,3-5,8"`, `"4-"` (4 to
//! the end) or `"-3"` (1 to 3). Internally pages are 0-based.

use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref RANGE_ITEM: Regex = Regex::new(r"^\s*(\d*)\s*(-)?\s*(\d*)\s*$").unwrap();
}

/// Pages an operator applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Every page
    #[default]
    All,
    /// These 0-based indices, in this order; duplicates are kept
    Pages(Vec<usize>),
}

impl PageSelection {
    /// Parse a 1-based range string against a document of `page_count` pages.
    ///
    /// ```
    /// use pdf_engine::ops::PageSelection;
    ///
    /// let sel = PageSelection::parse("1,3-5,8", 10).unwrap();
    /// assert_eq!(sel, PageSelection::Pages(vec![0, 2, 3, 4, 7]));
    /// assert_eq!(PageSelection::parse("9-", 10).unwrap(), PageSelection::Pages(vec![8, 9]));
    /// ```
    pub fn parse(input: &str, page_count: usize) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(PageSelection::All);
        }
        if trimmed.is_empty() {
            return Err(Error::InvalidPageRange("empty page selection".to_string()));
        }

        let mut pages = Vec::new();
        for item in trimmed.split(',') {
            let caps = RANGE_ITEM
                .captures(item)
                .ok_or_else(|| Error::InvalidPageRange(format!("cannot read '{}'", item.trim())))?;
            let start = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let dash = caps.get(2).is_some();
            let end = caps.get(3).map(|m| m.as_str()).unwrap_or("");

            let (first, last) = match (start.is_empty(), dash, end.is_empty()) {
                (false, false, _) => {
                    let n = page_number(start)?;
                    (n, n)
                },
                (false, true, false) => (page_number(start)?, page_number(end)?),
                (false, true, true) => (page_number(start)?, page_count.max(1)),
                (true, true, false) => (1, page_number(end)?),
                _ => {
                    return Err(Error::InvalidPageRange(format!(
                        "cannot read '{}'",
                        item.trim()
                    )))
                },
            };
            if first > last {
                return Err(Error::InvalidPageRange(format!(
                    "range {}-{} runs backwards",
                    first, last
                )));
            }
            if last > page_count {
                return Err(Error::PageOutOfRange {
                    index: last - 1,
                    count: page_count,
                });
            }
            pages.extend((first - 1)..last);
        }
        Ok(PageSelection::Pages(pages))
    }

    /// 0-based indices for a document of `page_count` pages.
    pub fn indices(&self, page_count: usize) -> Result<Vec<usize>> {
        match self {
            PageSelection::All => Ok((0..page_count).collect()),
            PageSelection::Pages(pages) => {
                if let Some(&index) = pages.iter().find(|&&i| i >= page_count) {
                    return Err(Error::PageOutOfRange {
                        index,
                        count: page_count,
                    });
                }
                Ok(pages.clone())
            },
        }
    }
}

impl From<Vec<usize>> for PageSelection {
    fn from(pages: Vec<usize>) -> Self {
        PageSelection::Pages(pages)
    }
}

fn page_number(s: &str) -> Result<usize> {
    match s.parse::<usize>() {
        Ok(0) => Err(Error::InvalidPageRange("page numbers start at 1".to_string())),
        Ok(n) => Ok(n),
        Err(_) => Err(Error::InvalidPageRange(format!("'{}' is not a page number", s))),
    }
}

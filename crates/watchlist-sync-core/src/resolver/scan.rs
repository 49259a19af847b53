//! Lazy, restartable walk over `(section, year, page)` triples.
//!
//! For a target year `y` the scan visits, for each section in order, the
//! years `y-1`, `y`, `y+1`, paging through each with a fixed page size.
//! A page shorter than the page size (including an empty one) closes the
//! current `(section, year)` pair.
//!
//! The cursor only advances after a page has been fetched successfully, so
//! calling [`SectionScan::next_page`] again after an error retries the same
//! page instead of restarting from the first section.

use anyhow::Result;
use std::fmt;

use super::{Candidate, LibraryService, Section};

pub struct SectionScan<'a> {
    library: &'a dyn LibraryService,
    sections: Vec<Section>,
    years: [i32; 3],
    page_size: usize,
    section_idx: usize,
    year_idx: usize,
    offset: usize,
}

impl<'a> SectionScan<'a> {
    pub fn new(
        library: &'a dyn LibraryService,
        sections: Vec<Section>,
        year: i32,
        page_size: usize,
    ) -> Self {
        Self {
            library,
            sections,
            years: [year.saturating_sub(1), year, year.saturating_add(1)],
            page_size: page_size.max(1),
            section_idx: 0,
            year_idx: 0,
            offset: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.section_idx >= self.sections.len()
    }

    /// Fetch the page under the cursor.
    ///
    /// Returns `Ok(None)` once every triple has been visited.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Candidate>>> {
        let Some(section) = self.sections.get(self.section_idx) else {
            return Ok(None);
        };
        let year = self.years[self.year_idx];

        let page = self
            .library
            .list_section_entries(&section.key, year, self.offset, self.page_size)
            .await?;

        if page.len() < self.page_size {
            self.advance_pair();
        } else {
            self.offset += self.page_size;
        }
        Ok(Some(page))
    }

    fn advance_pair(&mut self) {
        self.offset = 0;
        self.year_idx += 1;
        if self.year_idx == self.years.len() {
            self.year_idx = 0;
            self.section_idx += 1;
        }
    }
}

impl fmt::Display for SectionScan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sections.get(self.section_idx) {
            Some(section) => write!(
                f,
                "section '{}' year {} offset {}",
                section.title, self.years[self.year_idx], self.offset
            ),
            None => f.write_str("end of scan"),
        }
    }
}

//! Paginated row iterator over a completed job.

use crate::error::Result;
use crate::result::Row;
use crate::service::{JobReference, QueryService};
use crate::value::Field;

/// Pulls pages lazily from the service. Each instance starts from the first row,
/// so a fresh iterator after an interruption re-reads the whole result.
pub struct Rows<'s, S: QueryService + ?Sized> {
    service: &'s S,
    job: JobReference,
    page_size: Option<u32>,
    schema: Option<Vec<Field>>,
    buffer: std::vec::IntoIter<Row>,
    next_token: Option<String>,
    started: bool,
    exhausted: bool,
    pages: u32,
}

impl<'s, S: QueryService + ?Sized> Rows<'s, S> {
    pub fn new(service: &'s S, job: JobReference, page_size: Option<u32>) -> Self {
        Self {
            service,
            job,
            page_size,
            schema: None,
            buffer: Vec::new().into_iter(),
            next_token: None,
            started: false,
            exhausted: false,
            pages: 0,
        }
    }

    /// Schema of the result, fetching the first page if nothing was read yet.
    pub fn schema(&mut self) -> Result<&[Field]> {
        if !self.started {
            self.fetch_page()?;
        }
        Ok(self.schema.as_deref().unwrap_or(&[]))
    }

    pub fn pages_read(&self) -> u32 { self.pages }

    fn fetch_page(&mut self) -> Result<()> {
        let token = if self.started { self.next_token.take() } else { None };
        let page = match self.service.read_page(&self.job, token.as_deref(), self.page_size) {
            Ok(p) => p,
            Err(e) => {
                self.exhausted = true;
                return Err(e);
            }
        };
        self.pages += 1;
        tracing::debug!(job=%self.job, page=self.pages, rows=page.rows.len(), "read result page");
        if self.schema.is_none() || !page.schema.is_empty() {
            self.schema = Some(page.schema);
        }
        self.buffer = page.rows.into_iter();
        self.next_token = page.next_page_token;
        self.started = true;
        if self.next_token.is_none() {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl<'s, S: QueryService + ?Sized> Iterator for Rows<'s, S> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.buffer.next() {
                return Some(Ok(row));
            }
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fetch_page() {
                return Some(Err(e));
            }
        }
    }
}

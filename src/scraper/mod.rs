mod content;
mod page;
pub mod strategy;

pub use content::{infer_keyword, ContentScraper, FieldValue};
pub use page::{NextLink, PageInfo, PageScraper};
pub use strategy::{FieldSpec, ListSpec, Strategy};

use crate::page::Element;
use scraper::Html;

pub struct Scraper<'e> {
    document: Html,
    element: Option<&'e Element>,
}

impl<'e> Scraper<'e> {
    pub fn new(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
            element: None,
        }
    }

    /// Scrapes within one element snapshot.
    pub fn element(element: &'e Element) -> Self {
        Self {
            document: element.document(),
            element: Some(element),
        }
    }

    pub fn page(&self) -> PageScraper {
        PageScraper::new(&self.document)
    }

    pub fn content(&self) -> ContentScraper {
        ContentScraper::new(&self.document, self.element)
    }
}

use serde::{Deserialize, Serialize};

use super::citation::Citation;
use super::document::Document;
use super::event::Event;
use super::extensions::Extensions;
use super::gap::Gap;
use super::provider::Provider;
use super::source::{Page, SourceDocument};

/// The run's output: flat collections addressed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceGraph {
    pub schema_version: String,
    pub matter_id: String,
    pub source_documents: Vec<SourceDocument>,
    pub pages: Vec<Page>,
    pub documents: Vec<Document>,
    pub providers: Vec<Provider>,
    pub events: Vec<Event>,
    pub citations: Vec<Citation>,
    pub gaps: Vec<Gap>,
    /// Exported event ids in chronological order
    pub chronology: Vec<String>,
    #[serde(default)]
    pub extensions: Extensions,
}

impl EvidenceGraph {
    pub fn event(&self, event_id: &str) -> Option<&Event> {
        self.events.iter().find(|e| e.event_id == event_id)
    }

    pub fn provider(&self, provider_id: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.provider_id == provider_id)
    }

    pub fn citation(&self, citation_id: &str) -> Option<&Citation> {
        self.citations.iter().find(|c| c.citation_id == citation_id)
    }

    pub fn page(&self, page_number: u32) -> Option<&Page> {
        // Pages are stored in page-number order starting at 1
        self.pages
            .get(page_number.saturating_sub(1) as usize)
            .filter(|p| p.page_number == page_number)
            .or_else(|| self.pages.iter().find(|p| p.page_number == page_number))
    }

    /// Exported events in chronology order.
    pub fn chronology_events(&self) -> impl Iterator<Item = &Event> {
        self.chronology.iter().filter_map(|id| self.event(id))
    }
}

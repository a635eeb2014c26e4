//! Documentation Search Tool
//!
//! Exposes the retrieval collaborator as a tool: `search(query) -> text`.
//! The collaborator itself is behind the [`DocumentSearch`] trait; the
//! bundled [`KeywordIndex`] is a small in-process implementation good
//! enough for demos and tests.

use std::sync::Arc;

use agent_auth::Principal;
use agent_core::ToolDescriptor;
use agent_core::tool::ParameterSchema;
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::DeskError;
use crate::server::ToolHandler;

/// Default number of documents returned per query
pub const DEFAULT_TOP_K: usize = 2;

/// The retrieval collaborator
pub trait DocumentSearch: Send + Sync {
    /// Return the `k` most relevant snippets for `query`, joined as text
    fn search(&self, query: &str, k: usize) -> String;
}

/// One indexed document
#[derive(Clone, Debug)]
pub struct Document {
    pub title: String,
    pub body: String,
}

/// Naive keyword index over in-memory documents
#[derive(Default)]
pub struct KeywordIndex {
    documents: Vec<Document>,
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index seeded with a small product-documentation set
    pub fn seeded() -> Self {
        let mut index = Self::new();
        index.add(
            "Radio pairing",
            "To pair a portable radio with the dispatch console, hold the side \
             button for five seconds until the LED blinks amber, then confirm \
             the unit id on the console. Pairing fails if the radio firmware \
             is older than version 4.2.",
        );
        index.add(
            "Battery maintenance",
            "Batteries should be conditioned monthly. A battery that drops \
             below 70 percent health must be replaced; continued use shortens \
             transmit range and can corrupt the charge controller.",
        );
        index.add(
            "Dispatch console alerts",
            "The dispatch console raises a priority alert when a unit signals \
             an emergency. Alerts are acknowledged from the incident panel; \
             unacknowledged alerts escalate to the supervisor position after \
             sixty seconds.",
        );
        index.add(
            "Ticket escalation policy",
            "Support tickets remain active until an administrator resolves \
             them with a resolution note. Tickets older than seven days are \
             escalated during the weekly review.",
        );
        index
    }

    pub fn add(&mut self, title: &str, body: &str) {
        self.documents.push(Document {
            title: title.to_string(),
            body: body.to_string(),
        });
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn score(document: &Document, terms: &[String]) -> usize {
        let haystack = format!("{} {}", document.title, document.body).to_lowercase();
        terms.iter().filter(|t| haystack.contains(t.as_str())).count()
    }
}

impl DocumentSearch for KeywordIndex {
    fn search(&self, query: &str, k: usize) -> String {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let mut scored: Vec<(usize, &Document)> = self
            .documents
            .iter()
            .map(|d| (Self::score(d, &terms), d))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        if scored.is_empty() {
            return "No matching documentation found.".into();
        }

        scored
            .iter()
            .take(k.max(1))
            .map(|(_, d)| format!("### {}\n{}", d.title, d.body))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }
}

/// `search_docs` — query product documentation. Any role.
pub struct SearchDocsTool {
    index: Arc<dyn DocumentSearch>,
}

impl SearchDocsTool {
    pub fn new(index: Arc<dyn DocumentSearch>) -> Self {
        Self { index }
    }

    pub fn descriptor(audience: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: "search_docs".into(),
            description: "Search the product documentation and return the most \
                          relevant passages. Use before answering product questions."
                .into(),
            parameters: vec![
                ParameterSchema::required("query", "string", "Search query"),
                ParameterSchema::optional("k", "number", "Number of passages to return"),
            ],
            required_roles: vec![],
            audience: audience.into(),
        }
    }
}

#[async_trait]
impl ToolHandler for SearchDocsTool {
    async fn call(
        &self,
        args: &serde_json::Map<String, Value>,
        _principal: &Principal,
    ) -> Result<Value, DeskError> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| DeskError::InvalidArguments("query must be a string".into()))?;
        let k = args
            .get("k")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_TOP_K, |k| k as usize);

        Ok(json!(self.index.search(query, k)))
    }
}

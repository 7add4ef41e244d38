//! Static tool catalog
//!
//! Descriptors for the campus action tools, built once at startup and read
//! only at request time. Used both for parameter-extraction prompting and
//! for strict validation before invocation.

use std::collections::BTreeMap;

use serde_json::{json, Value};

/// A named side-effecting action with its parameter schema.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub required_params: Vec<String>,
    pub schema: Value,
}

/// Lookup-by-name registry over the fixed tool set. BTreeMap keeps listings
/// in a stable order for prompts and guidance replies.
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    tools: BTreeMap<String, ToolDescriptor>,
}

impl ToolCatalog {
    /// The five campus helpdesk tools.
    pub fn standard() -> Self {
        let mut catalog = Self {
            tools: BTreeMap::new(),
        };
        catalog.register(ToolDescriptor {
            name: "reset_password".into(),
            description: "Reset a student's account password".into(),
            required_params: vec!["student_id".into()],
            schema: json!({
                "type": "object",
                "properties": { "student_id": { "type": "string" } },
                "required": ["student_id"]
            }),
        });
        catalog.register(ToolDescriptor {
            name: "renew_library_card".into(),
            description: "Renew a student's library card".into(),
            required_params: vec![
                "student_id".into(),
                "card_number".into(),
                "duration".into(),
            ],
            schema: json!({
                "type": "object",
                "properties": {
                    "student_id": { "type": "string" },
                    "card_number": { "type": "string" },
                    "duration": { "type": "string" }
                },
                "required": ["student_id", "card_number", "duration"]
            }),
        });
        catalog.register(ToolDescriptor {
            name: "book_room".into(),
            description: "Book a study or meeting room".into(),
            required_params: vec![
                "room_id".into(),
                "start_time".into(),
                "end_time".into(),
            ],
            schema: json!({
                "type": "object",
                "properties": {
                    "room_id": { "type": "string" },
                    "start_time": { "type": "string", "format": "date-time" },
                    "end_time": { "type": "string", "format": "date-time" }
                },
                "required": ["room_id", "start_time", "end_time"]
            }),
        });
        catalog.register(ToolDescriptor {
            name: "create_glpi_ticket".into(),
            description: "Open a ticket in the GLPI helpdesk system".into(),
            required_params: vec![
                "title".into(),
                "description".into(),
                "category".into(),
            ],
            schema: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "description": { "type": "string" },
                    "category": { "type": "string" }
                },
                "required": ["title", "description", "category"]
            }),
        });
        catalog.register(ToolDescriptor {
            name: "request_dorm_fix".into(),
            description: "Request a dormitory repair".into(),
            required_params: vec![
                "room_number".into(),
                "issue_type".into(),
                "description".into(),
            ],
            schema: json!({
                "type": "object",
                "properties": {
                    "room_number": { "type": "string" },
                    "issue_type": { "type": "string" },
                    "description": { "type": "string" },
                    "urgency": { "type": "string" }
                },
                "required": ["room_number", "issue_type", "description"]
            }),
        });
        catalog
    }

    fn register(&mut self, tool: ToolDescriptor) {
        self.tools.insert(tool.name.clone(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// "- name: description" lines for prompts and guidance replies.
    pub fn listing(&self) -> String {
        self.tools
            .values()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

use std::fmt::Display;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// The operation a data API request performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataAction {
    /// Find or list records; the only action whose response carries records
    #[default]
    Read,
    /// Describe a layout or table
    MetaData,
    /// Create a record
    Create,
    /// Modify a record
    Update,
    /// Remove a record
    Delete,
    /// Copy a record
    Duplicate,
}

impl DataAction {
    /// The name of the action on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            DataAction::Read => "read",
            DataAction::MetaData => "metaData",
            DataAction::Create => "create",
            DataAction::Update => "update",
            DataAction::Delete => "delete",
            DataAction::Duplicate => "duplicate",
        }
    }
}

impl Display for DataAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a sort rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    /// Smallest first
    #[default]
    Ascend,
    /// Largest first
    Descend,
}

/// One field to sort read results by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortRule {
    /// The field to sort by
    pub field_name: String,
    /// The direction to sort in
    #[serde(default)]
    pub sort_order: SortOrder,
}

/// A request for the host's structured data API.
///
/// Fields that are `None` are left out of the request. Fields this type does
/// not model can be passed through [`DataApiRequest::extra`].
///
/// ```
/// use webviewer_bridge::{DataApiRequest, SortOrder};
/// use serde_json::json;
///
/// let request = DataApiRequest::read("Invoices")
///     .find(json!({ "Status": "Open" }))
///     .sort("Date", SortOrder::Descend)
///     .limit(20);
///
/// assert_eq!(
///     serde_json::to_value(&request).unwrap(),
///     json!({
///         "action": "read",
///         "layouts": "Invoices",
///         "query": [{ "Status": "Open" }],
///         "limit": 20,
///         "sort": [{ "fieldName": "Date", "sortOrder": "descend" }]
///     })
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataApiRequest {
    /// What the request does
    #[serde(default)]
    pub action: DataAction,
    /// The layout the request runs against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layouts: Option<String>,
    /// The table the request runs against, for table level metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<String>,
    /// Find requests; a read without a query lists records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Vec<Value>>,
    /// The record an update, delete, duplicate or single read targets
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text_or_number"
    )]
    pub record_id: Option<String>,
    /// Maximum number of records to read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// One-based position of the first record to read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    /// Sort rules, applied in order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<SortRule>>,
    /// The portals to include in read results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal: Option<Vec<String>>,
    /// Field values for creates and updates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_data: Option<Map<String, Value>>,
    /// Modification id an update must match
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "text_or_number"
    )]
    pub mod_id: Option<String>,
    /// Any other request fields, sent as given
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DataApiRequest {
    fn on_layout(action: DataAction, layout: &str) -> Self {
        Self {
            action,
            layouts: Some(layout.to_owned()),
            ..Self::default()
        }
    }

    /// Read records from a layout
    pub fn read(layout: &str) -> Self {
        Self::on_layout(DataAction::Read, layout)
    }

    /// Describe a layout
    pub fn metadata(layout: &str) -> Self {
        Self::on_layout(DataAction::MetaData, layout)
    }

    /// Describe a table
    pub fn table_metadata(table: &str) -> Self {
        Self {
            action: DataAction::MetaData,
            tables: Some(table.to_owned()),
            ..Self::default()
        }
    }

    /// Create a record with the given field values
    pub fn create(layout: &str, field_data: Map<String, Value>) -> Self {
        Self::on_layout(DataAction::Create, layout).field_data(field_data)
    }

    /// Change field values of an existing record
    pub fn update(layout: &str, record_id: &str, field_data: Map<String, Value>) -> Self {
        Self::on_layout(DataAction::Update, layout)
            .record_id(record_id)
            .field_data(field_data)
    }

    /// Remove a record
    pub fn delete(layout: &str, record_id: &str) -> Self {
        Self::on_layout(DataAction::Delete, layout).record_id(record_id)
    }

    /// Copy a record
    pub fn duplicate(layout: &str, record_id: &str) -> Self {
        Self::on_layout(DataAction::Duplicate, layout).record_id(record_id)
    }

    /// Add a find request
    pub fn find(mut self, criteria: Value) -> Self {
        self.query.get_or_insert_with(Vec::new).push(criteria);
        self
    }

    /// Target a single record
    pub fn record_id(mut self, record_id: &str) -> Self {
        self.record_id = Some(record_id.to_owned());
        self
    }

    /// Require the record to be at this modification id
    pub fn mod_id(mut self, mod_id: &str) -> Self {
        self.mod_id = Some(mod_id.to_owned());
        self
    }

    /// Read at most `limit` records
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Start reading at the one-based position `offset`
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Add a sort rule
    pub fn sort(mut self, field_name: &str, sort_order: SortOrder) -> Self {
        self.sort.get_or_insert_with(Vec::new).push(SortRule {
            field_name: field_name.to_owned(),
            sort_order,
        });
        self
    }

    /// Include a portal in read results
    pub fn portal(mut self, name: &str) -> Self {
        self.portal.get_or_insert_with(Vec::new).push(name.to_owned());
        self
    }

    /// Set the field values for a create or update
    pub fn field_data(mut self, field_data: Map<String, Value>) -> Self {
        self.field_data = Some(field_data);
        self
    }
}

/// Accepts identifiers given either as text or as a number
pub(crate) fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(other) => {
            return Err(serde::de::Error::custom(format!(
                "expected text or a number, found {other}"
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn it_defaults_to_reading() {
        let request: DataApiRequest = serde_json::from_value(json!({ "layouts": "Invoices" })).unwrap();
        assert_eq!(request, DataApiRequest::read("Invoices"));
    }

    #[test]
    fn it_accepts_numeric_identifiers() {
        let request: DataApiRequest = serde_json::from_value(json!({
            "action": "update",
            "layouts": "Invoices",
            "recordId": 12,
            "modId": "3",
            "fieldData": { "Status": "Paid" }
        }))
        .unwrap();

        assert_eq!(request.record_id.as_deref(), Some("12"));
        assert_eq!(request.mod_id.as_deref(), Some("3"));
    }

    #[test]
    fn it_passes_unmodelled_fields_through() {
        let request: DataApiRequest = serde_json::from_value(json!({
            "action": "read",
            "layouts": "Invoices",
            "layout.response": "Invoice Detail"
        }))
        .unwrap();

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "action": "read",
                "layouts": "Invoices",
                "layout.response": "Invoice Detail"
            })
        );
    }

    #[test]
    fn it_builds_mutations() {
        let mut fields = Map::new();
        fields.insert("Status".into(), json!("Paid"));

        assert_eq!(
            serde_json::to_value(DataApiRequest::update("Invoices", "7", fields).mod_id("2"))
                .unwrap(),
            json!({
                "action": "update",
                "layouts": "Invoices",
                "recordId": "7",
                "fieldData": { "Status": "Paid" },
                "modId": "2"
            })
        );
        assert_eq!(
            serde_json::to_value(DataApiRequest::table_metadata("INVOICE")).unwrap(),
            json!({ "action": "metaData", "tables": "INVOICE" })
        );
    }
}

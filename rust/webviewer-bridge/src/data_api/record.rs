use indexmap::IndexMap;
use serde::{Serialize, Serializer, ser::SerializeMap, ser::SerializeSeq};
use serde_json::{Map, Value};

use crate::BridgeError;

/// Separates a portal's name from a field name in portal rows
pub const FIELD_QUALIFIER: &str = "::";

/// A record from a read response, with its portals folded in.
///
/// Serializing a record yields only its data: its fields, followed by one
/// array per portal. The record's identity (`recordId` and `modId`) is kept
/// apart and reachable through [`Record::record_id`] and
/// [`Record::mod_id`], so that it never leaks into the data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,
    portals: IndexMap<String, Vec<Record>>,
    record_id: Option<String>,
    mod_id: Option<String>,
}

impl Record {
    /// Assemble a record from its parts
    pub fn new(
        fields: Map<String, Value>,
        portals: IndexMap<String, Vec<Record>>,
        record_id: Option<String>,
        mod_id: Option<String>,
    ) -> Self {
        Self {
            fields,
            portals,
            record_id,
            mod_id,
        }
    }

    /// Flatten one entry of a read response's `data` list
    pub fn from_raw(raw: &Value) -> Result<Self, BridgeError> {
        let raw = raw
            .as_object()
            .ok_or_else(|| BridgeError::MalformedEnvelope("record is not an object".into()))?;

        let fields = match raw.get("fieldData") {
            Some(Value::Object(fields)) => fields.clone(),
            None | Some(Value::Null) => Map::new(),
            Some(_) => {
                return Err(BridgeError::MalformedEnvelope(
                    "fieldData is not an object".into(),
                ));
            }
        };

        let mut portals = IndexMap::new();
        match raw.get("portalData") {
            Some(Value::Object(portal_data)) => {
                for (name, rows) in portal_data {
                    let rows = rows.as_array().ok_or_else(|| {
                        BridgeError::MalformedEnvelope(format!("portal {name} is not a list"))
                    })?;
                    let rows = rows
                        .iter()
                        .map(|row| Self::from_portal_row(name, row))
                        .collect::<Result<Vec<_>, _>>()?;
                    portals.insert(name.clone(), rows);
                }
            }
            None | Some(Value::Null) => (),
            Some(_) => {
                return Err(BridgeError::MalformedEnvelope(
                    "portalData is not an object".into(),
                ));
            }
        }

        Ok(Self {
            fields,
            portals,
            record_id: identity(raw.get("recordId")),
            mod_id: identity(raw.get("modId")),
        })
    }

    fn from_portal_row(portal: &str, row: &Value) -> Result<Self, BridgeError> {
        let row = row.as_object().ok_or_else(|| {
            BridgeError::MalformedEnvelope(format!("a row of portal {portal} is not an object"))
        })?;
        let prefix = format!("{portal}{FIELD_QUALIFIER}");

        let fields = row
            .iter()
            .filter(|(name, _)| !matches!(name.as_str(), "recordId" | "modId"))
            .map(|(name, value)| {
                let name = name.strip_prefix(&prefix).unwrap_or(name);
                (name.to_owned(), value.clone())
            })
            .collect();

        Ok(Self {
            fields,
            portals: IndexMap::new(),
            record_id: identity(row.get("recordId")),
            mod_id: identity(row.get("modId")),
        })
    }

    /// The host's internal id of this record
    pub fn record_id(&self) -> Option<&str> {
        self.record_id.as_deref()
    }

    /// The modification count of this record when it was read
    pub fn mod_id(&self) -> Option<&str> {
        self.mod_id.as_deref()
    }

    /// The value of a field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// The rows of a portal
    pub fn portal(&self, name: &str) -> Option<&[Record]> {
        self.portals.get(name).map(Vec::as_slice)
    }

    /// All field values
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// All portals, in the order the host listed them
    pub fn portals(&self) -> &IndexMap<String, Vec<Record>> {
        &self.portals
    }

    /// The record's data as a single JSON object
    pub fn to_value(&self) -> Value {
        let mut object = self.fields.clone();
        for (name, rows) in &self.portals {
            object.insert(
                name.clone(),
                Value::Array(rows.iter().map(Record::to_value).collect()),
            );
        }
        Value::Object(object)
    }
}

impl Serialize for Record {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // A portal named like a field replaces that field
        let fields = self
            .fields
            .iter()
            .filter(|(name, _)| !self.portals.contains_key(name.as_str()))
            .collect::<Vec<_>>();

        let mut map = serializer.serialize_map(Some(fields.len() + self.portals.len()))?;
        for (name, value) in fields {
            map.serialize_entry(name, value)?;
        }
        for (name, rows) in &self.portals {
            map.serialize_entry(name, rows)?;
        }
        map.end()
    }
}

fn identity(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// The records of a read response.
///
/// Serializes as a plain list of records; the counts reported by the host
/// are only reachable through accessors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    records: Vec<Record>,
    found_count: Option<u64>,
    total_count: Option<u64>,
    returned_count: Option<u64>,
}

impl RecordSet {
    /// Flatten a read response body
    pub fn from_response(response: &Value) -> Result<Self, BridgeError> {
        let records = match response.get("data") {
            Some(Value::Array(data)) => data
                .iter()
                .map(Record::from_raw)
                .collect::<Result<Vec<_>, _>>()?,
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                return Err(BridgeError::MalformedEnvelope(
                    "response data is not a list".into(),
                ));
            }
        };

        let info = response.get("dataInfo");
        let count = |name: &str| info.and_then(|info| info.get(name)).and_then(count_value);

        Ok(Self {
            found_count: count("foundCount"),
            total_count: count("totalRecordCount"),
            returned_count: count("returnedCount"),
            records,
        })
    }

    /// The number of records matching the request
    pub fn found_count(&self) -> Option<u64> {
        self.found_count
    }

    /// The number of records in the table
    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    /// The number of records the host returned
    pub fn returned_count(&self) -> Option<u64> {
        self.returned_count
    }

    /// The records, in the order the host returned them
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Iterate over the records
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// The number of records in this set
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether this set holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn count_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

impl Serialize for RecordSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.records.len()))?;
        for record in &self.records {
            seq.serialize_element(record)?;
        }
        seq.end()
    }
}

impl IntoIterator for RecordSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn it_folds_portals_into_the_record() {
        let record = Record::from_raw(&json!({
            "fieldData": { "a": 1 },
            "portalData": { "P": [{ "P::a": 2, "recordId": "9", "modId": "4" }] },
            "recordId": "5",
            "modId": "1"
        }))
        .unwrap();

        assert_eq!(serde_json::to_value(&record).unwrap(), json!({ "a": 1, "P": [{ "a": 2 }] }));
        assert_eq!(record.record_id(), Some("5"));
        assert_eq!(record.mod_id(), Some("1"));

        let row = &record.portal("P").unwrap()[0];
        assert_eq!(row.get("a"), Some(&json!(2)));
        assert_eq!(row.record_id(), Some("9"));
        assert_eq!(row.mod_id(), Some("4"));
    }

    #[test]
    fn it_only_strips_the_owning_portal_prefix() {
        let record = Record::from_raw(&json!({
            "fieldData": {},
            "portalData": { "Lines": [{ "Lines::qty": 2, "Products::name": "Bolt", "note": "x" }] },
            "recordId": 1,
            "modId": 0
        }))
        .unwrap();

        assert_eq!(
            record.to_value(),
            json!({ "Lines": [{ "qty": 2, "Products::name": "Bolt", "note": "x" }] })
        );
        assert_eq!(record.record_id(), Some("1"));
        assert_eq!(record.mod_id(), Some("0"));
    }

    #[test]
    fn it_agrees_with_its_own_serialization() {
        let record = Record::from_raw(&json!({
            "fieldData": { "P": "shadowed", "b": true },
            "portalData": { "P": [] },
            "recordId": "2",
            "modId": "7"
        }))
        .unwrap();

        assert_eq!(serde_json::to_value(&record).unwrap(), record.to_value());
        assert_eq!(record.to_value(), json!({ "b": true, "P": [] }));
    }

    #[test]
    fn it_rejects_malformed_records() {
        assert!(matches!(
            Record::from_raw(&json!("nope")),
            Err(BridgeError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            Record::from_raw(&json!({ "portalData": { "P": {} } })),
            Err(BridgeError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn it_keeps_counts_out_of_the_serialized_set() {
        let set = RecordSet::from_response(&json!({
            "dataInfo": { "foundCount": 2, "totalRecordCount": 10, "returnedCount": 1 },
            "data": [{ "fieldData": { "a": 1 }, "portalData": {}, "recordId": "1", "modId": "0" }]
        }))
        .unwrap();

        assert_eq!(set.found_count(), Some(2));
        assert_eq!(set.total_count(), Some(10));
        assert_eq!(set.returned_count(), Some(1));
        assert_eq!(serde_json::to_value(&set).unwrap(), json!([{ "a": 1 }]));
    }

    #[test]
    fn it_treats_missing_data_as_no_records() {
        let set = RecordSet::from_response(&json!({})).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.found_count(), None);
    }
}

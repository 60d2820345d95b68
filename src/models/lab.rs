use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One measurement row of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabRecord {
    pub label: String,
    pub unit: String,
    /// `None` when the store cell was blank or not a number.
    pub value: Option<f64>,
    pub date: Option<NaiveDate>,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    #[serde(default, skip_serializing_if = "RawCells::is_empty")]
    pub raw: RawCells,
}

/// Store text of numeric columns that did not parse (`<0.01`, `>90`, ...).
/// Kept so a rewrite puts the cell back as it was read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCells {
    pub value: Option<String>,
    pub lower_bound: Option<String>,
    pub upper_bound: Option<String>,
}

impl RawCells {
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.lower_bound.is_none() && self.upper_bound.is_none()
    }
}

impl LabRecord {
    pub fn value_text(&self) -> String {
        cell_text(self.value, self.raw.value.as_deref())
    }

    pub fn lower_text(&self) -> String {
        cell_text(self.lower_bound, self.raw.lower_bound.as_deref())
    }

    pub fn upper_text(&self) -> String {
        cell_text(self.upper_bound, self.raw.upper_bound.as_deref())
    }
}

/// Number if there is one, else the kept store text, else empty.
fn cell_text(number: Option<f64>, raw: Option<&str>) -> String {
    match (number, raw) {
        (Some(n), _) => n.to_string(),
        (None, Some(text)) => text.to_string(),
        (None, None) => String::new(),
    }
}

/// Ascending date order with missing dates after every real date.
pub fn cmp_date_nulls_last(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Header names of the six store columns, kept so a rewrite reproduces the
/// header the store was read with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNames(pub [String; 6]);

impl ColumnNames {
    pub const LABEL: usize = 0;
    pub const UNIT: usize = 1;
    pub const VALUE: usize = 2;
    pub const DATE: usize = 3;
    pub const LOWER: usize = 4;
    pub const UPPER: usize = 5;

    pub fn get(&self, column: usize) -> &str {
        &self.0[column]
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self(
            ["label", "unit", "value", "date", "lower_bound", "upper_bound"]
                .map(String::from),
        )
    }
}

/// All records in ingestion/append order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub columns: ColumnNames,
    pub records: Vec<LabRecord>,
}

impl Dataset {
    pub fn new(columns: ColumnNames, records: Vec<LabRecord>) -> Self {
        Self { columns, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LabRecord> {
        self.records.get(index)
    }
}

/// Label → member indices into a [`Dataset`], ingestion order preserved
/// within each group, labels iterated in ascending order.
///
/// Built once per dataset version and handed by reference to every consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grouping {
    groups: BTreeMap<String, Vec<usize>>,
}

impl Grouping {
    pub fn build(dataset: &Dataset) -> Self {
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, record) in dataset.records.iter().enumerate() {
            groups.entry(record.label.clone()).or_default().push(idx);
        }
        Self { groups }
    }

    pub fn members(&self, label: &str) -> Option<&[usize]> {
        self.groups.get(label).map(Vec::as_slice)
    }

    /// Number of records for `label`; 0 for an unknown label.
    pub fn cardinality(&self, label: &str) -> usize {
        self.groups.get(label).map_or(0, Vec::len)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.groups.contains_key(label)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.groups
            .iter()
            .map(|(label, members)| (label.as_str(), members.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Dataset plus its derived grouping. Mutations produce a new value; the
/// caller replaces the old one.
#[derive(Debug, Clone, Default)]
pub struct LabData {
    pub dataset: Dataset,
    pub grouping: Grouping,
}

impl LabData {
    pub fn new(dataset: Dataset) -> Self {
        let grouping = Grouping::build(&dataset);
        Self { dataset, grouping }
    }
}

use serde::{Deserialize, Serialize};

use super::csv_store::parse_date;
use super::StoreError;
use crate::models::{Dataset, LabRecord};

/// A new measurement as typed by the user. Value and date are still text;
/// they are validated here before anything changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEntry {
    pub label: String,
    /// Required for a label not yet in the store; otherwise the existing
    /// unit is used when absent.
    pub unit: Option<String>,
    pub value: String,
    pub date: String, // MM/DD/YY
}

/// New reference range for every record of one analyte. Empty or absent
/// text clears the bound.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoundsUpdate {
    pub label: String,
    pub lower: Option<String>,
    pub upper: Option<String>,
}

/// Returns a copy of `dataset` with the entry appended (bounds left empty).
/// Nothing is returned on a validation failure, so the caller's dataset and
/// store stay as they were.
pub fn append_entry(dataset: &Dataset, entry: &NewEntry) -> Result<Dataset, StoreError> {
    let label = entry.label.trim();
    if label.is_empty() {
        return Err(StoreError::Validation("Please enter a label".into()));
    }

    let supplied_unit = entry.unit.as_deref().map(str::trim).filter(|u| !u.is_empty());
    let unit = match (supplied_unit, unit_for(dataset, label)) {
        (Some(unit), _) => unit.to_string(),
        (None, Some(existing)) => existing.to_string(),
        (None, None) => {
            return Err(StoreError::Validation(format!(
                "New label '{label}' needs a unit"
            )))
        }
    };

    let value_text = entry.value.trim();
    let date_text = entry.date.trim();
    if value_text.is_empty() || date_text.is_empty() {
        return Err(StoreError::Validation("Please fill all fields".into()));
    }

    let value = parse_finite(value_text).ok_or_else(|| {
        StoreError::Validation(format!("Value '{value_text}' is not a number"))
    })?;
    let date = parse_date(date_text).ok_or_else(|| {
        StoreError::Validation(format!("Date '{date_text}' is not in MM/DD/YY format"))
    })?;

    let mut updated = dataset.clone();
    updated.records.push(LabRecord {
        label: label.to_string(),
        unit,
        value: Some(value),
        date: Some(date),
        lower_bound: None,
        upper_bound: None,
        raw: Default::default(),
    });
    Ok(updated)
}

/// Overwrites both bounds of every record carrying `update.label`.
pub fn update_bounds(dataset: &Dataset, update: &BoundsUpdate) -> Result<Dataset, StoreError> {
    let label = update.label.trim();
    if label.is_empty() {
        return Err(StoreError::Validation("Please select a label".into()));
    }
    if !dataset.records.iter().any(|r| r.label == label) {
        return Err(StoreError::Validation(format!("Unknown label '{label}'")));
    }

    let lower = parse_optional_bound(update.lower.as_deref())?;
    let upper = parse_optional_bound(update.upper.as_deref())?;

    let mut updated = dataset.clone();
    for record in updated.records.iter_mut().filter(|r| r.label == label) {
        record.lower_bound = lower;
        record.upper_bound = upper;
        record.raw.lower_bound = None;
        record.raw.upper_bound = None;
    }
    Ok(updated)
}

/// Unit of the first record carrying `label`.
pub fn unit_for<'a>(dataset: &'a Dataset, label: &str) -> Option<&'a str> {
    dataset
        .records
        .iter()
        .find(|r| r.label == label)
        .map(|r| r.unit.as_str())
}

/// `(lower, upper)` of the first record carrying `label`.
pub fn current_bounds(dataset: &Dataset, label: &str) -> Option<(Option<f64>, Option<f64>)> {
    dataset
        .records
        .iter()
        .find(|r| r.label == label)
        .map(|r| (r.lower_bound, r.upper_bound))
}

fn parse_optional_bound(text: Option<&str>) -> Result<Option<f64>, StoreError> {
    match text.map(str::trim).filter(|t| !t.is_empty()) {
        None => Ok(None),
        Some(t) => parse_finite(t).map(Some).ok_or_else(|| {
            StoreError::Validation(format!("Bound '{t}' is not a number"))
        }),
    }
}

fn parse_finite(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnNames;
    use chrono::NaiveDate;

    fn seed() -> Dataset {
        Dataset::new(
            ColumnNames::default(),
            vec![
                LabRecord {
                    label: "Sodium".into(),
                    unit: "mmol/L".into(),
                    value: Some(140.0),
                    date: NaiveDate::from_ymd_opt(2024, 1, 1),
                    lower_bound: Some(135.0),
                    upper_bound: Some(145.0),
                    raw: Default::default(),
                },
                LabRecord {
                    label: "Glucose".into(),
                    unit: "mg/dL".into(),
                    value: Some(90.0),
                    date: NaiveDate::from_ymd_opt(2024, 1, 1),
                    lower_bound: Some(70.0),
                    upper_bound: None,
                    raw: Default::default(),
                },
            ],
        )
    }

    fn entry(label: &str, unit: Option<&str>, value: &str, date: &str) -> NewEntry {
        NewEntry {
            label: label.into(),
            unit: unit.map(String::from),
            value: value.into(),
            date: date.into(),
        }
    }

    #[test]
    fn append_existing_label_takes_known_unit() {
        let dataset = seed();
        let updated = append_entry(&dataset, &entry("Sodium", None, "138", "03/01/24")).unwrap();

        assert_eq!(updated.len(), 3);
        let last = updated.records.last().unwrap();
        assert_eq!(last.unit, "mmol/L");
        assert_eq!(last.value, Some(138.0));
        assert_eq!(last.date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(last.lower_bound, None);
        assert_eq!(last.upper_bound, None);
    }

    #[test]
    fn append_non_numeric_value_is_rejected() {
        let dataset = seed();
        let err = append_entry(&dataset, &entry("Sodium", None, "abc", "03/01/24")).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(dataset, seed());
    }

    #[test]
    fn append_bad_date_is_rejected() {
        let err = append_entry(&seed(), &entry("Sodium", None, "138", "2024-03-01")).unwrap_err();
        assert!(err.to_string().contains("MM/DD/YY"));
    }

    #[test]
    fn append_new_label_requires_unit() {
        let err = append_entry(&seed(), &entry("Ferritin", None, "50", "03/01/24")).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let updated =
            append_entry(&seed(), &entry("Ferritin", Some("ng/mL"), "50", "03/01/24")).unwrap();
        assert_eq!(unit_for(&updated, "Ferritin"), Some("ng/mL"));
    }

    #[test]
    fn append_missing_fields_rejected() {
        assert!(append_entry(&seed(), &entry("", Some("x"), "1", "03/01/24")).is_err());
        assert!(append_entry(&seed(), &entry("Sodium", None, "", "03/01/24")).is_err());
        assert!(append_entry(&seed(), &entry("Sodium", None, "138", " ")).is_err());
    }

    #[test]
    fn update_bounds_overwrites_whole_group() {
        let update = BoundsUpdate {
            label: "Glucose".into(),
            lower: Some("65".into()),
            upper: Some(" ".into()),
        };
        let dataset = append_entry(&seed(), &entry("Glucose", None, "99", "02/01/24")).unwrap();
        let updated = update_bounds(&dataset, &update).unwrap();

        for r in updated.records.iter().filter(|r| r.label == "Glucose") {
            assert_eq!(r.lower_bound, Some(65.0));
            assert_eq!(r.upper_bound, None);
        }
        assert_eq!(current_bounds(&updated, "Sodium"), Some((Some(135.0), Some(145.0))));
    }

    #[test]
    fn update_bounds_replaces_kept_bound_text_only_for_its_label() {
        let mut dataset = seed();
        dataset.records[0].upper_bound = None;
        dataset.records[0].raw.upper_bound = Some(">150".into());
        dataset.records[1].value = None;
        dataset.records[1].raw.value = Some("<0.01".into());

        let update = BoundsUpdate {
            label: "Sodium".into(),
            lower: Some("136".into()),
            upper: Some("146".into()),
        };
        let updated = update_bounds(&dataset, &update).unwrap();

        assert_eq!(updated.records[0].upper_text(), "146");
        assert_eq!(updated.records[0].raw.upper_bound, None);
        assert_eq!(updated.records[1].value_text(), "<0.01");
    }

    #[test]
    fn update_bounds_rejects_bad_input() {
        let bad_number = BoundsUpdate {
            label: "Glucose".into(),
            lower: Some("low".into()),
            upper: None,
        };
        assert!(matches!(
            update_bounds(&seed(), &bad_number),
            Err(StoreError::Validation(_))
        ));

        let unknown = BoundsUpdate {
            label: "Ferritin".into(),
            ..Default::default()
        };
        assert!(update_bounds(&seed(), &unknown).is_err());
    }
}

use std::cmp::Ordering;

use chrono::NaiveDate;

use crate::models::{Dataset, Grouping, LabRecord};

/// Latest result per analyte, in label order. The latest is the member with
/// the greatest date; on equal dates the one read first wins. A group with
/// no dates at all yields its first member.
pub fn latest_entries<'a>(dataset: &'a Dataset, grouping: &Grouping) -> Vec<&'a LabRecord> {
    grouping
        .iter()
        .filter_map(|(_, members)| {
            let mut best: Option<&LabRecord> = None;
            for record in members.iter().filter_map(|&i| dataset.get(i)) {
                best = match best {
                    Some(current) if !is_later(record.date, current.date) => Some(current),
                    _ => Some(record),
                };
            }
            best
        })
        .collect()
}

/// Every record ordered by label ascending, then date descending with
/// missing dates last. Equal keys keep ingestion order.
pub fn sorted_for_listing(dataset: &Dataset) -> Vec<&LabRecord> {
    let mut rows: Vec<&LabRecord> = dataset.records.iter().collect();
    rows.sort_by(|a, b| {
        a.label
            .cmp(&b.label)
            .then_with(|| newest_first(a.date, b.date))
    });
    rows
}

fn is_later(candidate: Option<NaiveDate>, current: Option<NaiveDate>) -> bool {
    match (candidate, current) {
        (Some(c), Some(cur)) => c > cur,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

fn newest_first(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnNames;

    fn rec(label: &str, value: f64, date: Option<(i32, u32, u32)>) -> LabRecord {
        LabRecord {
            label: label.into(),
            unit: "u".into(),
            value: Some(value),
            date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            lower_bound: None,
            upper_bound: None,
            raw: Default::default(),
        }
    }

    fn dataset() -> Dataset {
        Dataset::new(
            ColumnNames::default(),
            vec![
                rec("Sodium", 140.0, Some((2024, 1, 1))),
                rec("Glucose", 90.0, Some((2024, 1, 1))),
                rec("Sodium", 138.0, Some((2024, 3, 1))),
                rec("Glucose", 95.0, None),
                rec("Sodium", 139.0, Some((2024, 3, 1))),
                rec("TSH", 2.0, None),
                rec("TSH", 2.5, None),
            ],
        )
    }

    #[test]
    fn one_row_per_label_with_max_date() {
        let dataset = dataset();
        let grouping = Grouping::build(&dataset);
        let latest = latest_entries(&dataset, &grouping);

        assert_eq!(latest.len(), grouping.len());
        for record in &latest {
            let max = dataset
                .records
                .iter()
                .filter(|r| r.label == record.label)
                .filter_map(|r| r.date)
                .max();
            assert_eq!(record.date, max);
        }
    }

    #[test]
    fn ties_go_to_first_read() {
        let dataset = dataset();
        let latest = latest_entries(&dataset, &Grouping::build(&dataset));
        let sodium = latest.iter().find(|r| r.label == "Sodium").unwrap();
        assert_eq!(sodium.value, Some(138.0));
    }

    #[test]
    fn undated_group_keeps_first_member() {
        let dataset = dataset();
        let latest = latest_entries(&dataset, &Grouping::build(&dataset));
        let tsh = latest.iter().find(|r| r.label == "TSH").unwrap();
        assert_eq!(tsh.value, Some(2.0));

        let glucose = latest.iter().find(|r| r.label == "Glucose").unwrap();
        assert_eq!(glucose.value, Some(90.0));
    }

    #[test]
    fn listing_sorted_by_label_then_newest() {
        let dataset = dataset();
        let rows = sorted_for_listing(&dataset);
        let keys: Vec<(&str, Option<f64>)> = rows.iter().map(|r| (r.label.as_str(), r.value)).collect();
        assert_eq!(
            keys,
            vec![
                ("Glucose", Some(90.0)),
                ("Glucose", Some(95.0)),
                ("Sodium", Some(138.0)),
                ("Sodium", Some(139.0)),
                ("Sodium", Some(140.0)),
                ("TSH", Some(2.0)),
                ("TSH", Some(2.5)),
            ]
        );
    }
}

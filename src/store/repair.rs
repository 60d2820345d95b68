use crate::models::{Dataset, Grouping, LabRecord};

/// Fills missing bounds per analyte: forward-fill then backward-fill over the
/// group's members in ingestion order (file position, not date). Lower and
/// upper columns are filled independently. A bound cell holding unparsed
/// store text is left as it is and does not seed its neighbours.
///
/// Returns the repaired dataset with the grouping built from it.
pub fn repair_bounds(mut dataset: Dataset) -> (Dataset, Grouping) {
    let grouping = Grouping::build(&dataset);
    let mut filled = 0usize;

    for (_, members) in grouping.iter() {
        filled += fill_column(&mut dataset.records, members, lower_cell);
        filled += fill_column(&mut dataset.records, members, upper_cell);
    }

    tracing::debug!(groups = grouping.len(), filled, "Repaired reference bounds");
    (dataset, grouping)
}

/// A bound cell plus whether it holds kept text.
type BoundCell<'a> = (&'a mut Option<f64>, bool);

fn lower_cell(record: &mut LabRecord) -> BoundCell<'_> {
    (&mut record.lower_bound, record.raw.lower_bound.is_some())
}

fn upper_cell(record: &mut LabRecord) -> BoundCell<'_> {
    (&mut record.upper_bound, record.raw.upper_bound.is_some())
}

/// Returns how many cells were filled.
fn fill_column(
    records: &mut [LabRecord],
    members: &[usize],
    column: fn(&mut LabRecord) -> BoundCell<'_>,
) -> usize {
    let mut filled = 0;

    let mut carry = None;
    for &idx in members {
        let (cell, is_text) = column(&mut records[idx]);
        if is_text {
            continue;
        }
        if cell.is_some() {
            carry = *cell;
        } else if carry.is_some() {
            *cell = carry;
            filled += 1;
        }
    }

    // Only leading gaps can remain after the forward pass.
    let mut carry = None;
    for &idx in members.iter().rev() {
        let (cell, is_text) = column(&mut records[idx]);
        if is_text {
            continue;
        }
        if cell.is_some() {
            carry = *cell;
        } else if carry.is_some() {
            *cell = carry;
            filled += 1;
        }
    }

    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnNames;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn rec(label: &str, value: f64, date: &str, lower: Option<f64>, upper: Option<f64>) -> LabRecord {
        LabRecord {
            label: label.into(),
            unit: "mg/dL".into(),
            value: Some(value),
            date: NaiveDate::parse_from_str(date, "%m/%d/%y").ok(),
            lower_bound: lower,
            upper_bound: upper,
            raw: Default::default(),
        }
    }

    fn dataset(records: Vec<LabRecord>) -> Dataset {
        Dataset::new(ColumnNames::default(), records)
    }

    #[test]
    fn glucose_bounds_fill_both_directions() {
        let (repaired, _) = repair_bounds(dataset(vec![
            rec("Glucose", 90.0, "01/01/24", Some(70.0), None),
            rec("Glucose", 95.0, "02/01/24", None, Some(110.0)),
        ]));

        for r in &repaired.records {
            assert_eq!(r.lower_bound, Some(70.0));
            assert_eq!(r.upper_bound, Some(110.0));
        }
    }

    #[test]
    fn groups_do_not_leak_into_each_other() {
        let (repaired, grouping) = repair_bounds(dataset(vec![
            rec("Sodium", 140.0, "01/01/24", Some(135.0), Some(145.0)),
            rec("Potassium", 4.1, "01/01/24", None, None),
            rec("Sodium", 138.0, "02/01/24", None, None),
        ]));

        assert_eq!(grouping.len(), 2);
        assert_eq!(repaired.records[1].lower_bound, None);
        assert_eq!(repaired.records[1].upper_bound, None);
        assert_eq!(repaired.records[2].lower_bound, Some(135.0));
        assert_eq!(repaired.records[2].upper_bound, Some(145.0));
    }

    #[test]
    fn propagation_follows_file_order_not_dates() {
        // The later-dated row comes first in the file, so its bound seeds the
        // earlier-dated row through the forward pass.
        let (repaired, _) = repair_bounds(dataset(vec![
            rec("TSH", 2.0, "05/01/24", Some(0.4), None),
            rec("TSH", 2.5, "01/01/24", None, None),
        ]));
        assert_eq!(repaired.records[1].lower_bound, Some(0.4));
    }

    #[test]
    fn at_most_one_distinct_bound_per_group() {
        let (repaired, grouping) = repair_bounds(dataset(vec![
            rec("Glucose", 90.0, "01/01/24", None, None),
            rec("Sodium", 140.0, "01/01/24", None, Some(145.0)),
            rec("Glucose", 92.0, "01/15/24", Some(70.0), None),
            rec("Glucose", 99.0, "02/01/24", None, Some(110.0)),
            rec("Sodium", 141.0, "02/01/24", Some(135.0), None),
            rec("Albumin", 4.0, "02/01/24", None, None),
        ]));

        for (_, members) in grouping.iter() {
            let lowers: HashSet<u64> = members
                .iter()
                .filter_map(|&i| repaired.records[i].lower_bound.map(f64::to_bits))
                .collect();
            let uppers: HashSet<u64> = members
                .iter()
                .filter_map(|&i| repaired.records[i].upper_bound.map(f64::to_bits))
                .collect();
            assert!(lowers.len() <= 1);
            assert!(uppers.len() <= 1);
        }
    }

    #[test]
    fn conflicting_bounds_are_carried_not_merged() {
        let (repaired, _) = repair_bounds(dataset(vec![
            rec("Iron", 80.0, "01/01/24", Some(60.0), None),
            rec("Iron", 82.0, "02/01/24", None, None),
            rec("Iron", 85.0, "03/01/24", Some(50.0), None),
        ]));
        let lowers: Vec<Option<f64>> = repaired.records.iter().map(|r| r.lower_bound).collect();
        assert_eq!(lowers, vec![Some(60.0), Some(60.0), Some(50.0)]);
    }

    #[test]
    fn text_bound_is_kept_and_skipped() {
        let mut records = vec![
            rec("Ferritin", 40.0, "01/01/24", None, None),
            rec("Ferritin", 45.0, "02/01/24", None, None),
            rec("Ferritin", 50.0, "03/01/24", Some(30.0), None),
        ];
        records[1].raw.lower_bound = Some(">20".into());
        let (repaired, _) = repair_bounds(dataset(records));

        assert_eq!(repaired.records[0].lower_bound, Some(30.0));
        assert_eq!(repaired.records[1].lower_bound, None);
        assert_eq!(repaired.records[1].lower_text(), ">20");
    }

    #[test]
    fn empty_dataset_is_fine() {
        let (repaired, grouping) = repair_bounds(Dataset::default());
        assert!(repaired.is_empty());
        assert!(grouping.is_empty());
    }
}

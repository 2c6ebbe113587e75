//! Test storing crash reports through the record codec.

use crate::e2e_tests::helpers::TestStore;
use crate::storage::{DeleteMode, UpdateOutcome};
use crate::types::{CrashReport, sample_report};

#[test]
fn test_crash_reports_roundtrip_through_store() {
    let mut test = TestStore::new();

    let mut reports: Vec<CrashReport> = (0..5)
        .map(|i| {
            let mut r = sample_report(0);
            r.crash_hour = i;
            r
        })
        .collect();
    for report in &mut reports {
        test.store.insert_record(report).expect("insert");
    }
    assert_eq!(
        reports.iter().map(|r| r.id).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5]
    );

    // Shorter text fits in place; decoding ignores the zero padding.
    let mut shorter = reports[1].clone();
    shorter.weather_condition = "RAIN".to_string();
    assert!(matches!(
        test.store.update_record(2, &mut shorter).expect("update"),
        UpdateOutcome::InPlace { .. }
    ));

    // An extra injury label does not fit and relocates the record.
    let mut longer = reports[3].clone();
    longer
        .most_severe_injury
        .push("INCAPACITATING INJURY".to_string());
    assert!(matches!(
        test.store.update_record(4, &mut longer).expect("update"),
        UpdateOutcome::Relocated { .. }
    ));

    test.store.delete(5, DeleteMode::Logical).expect("delete");
    test.reopen();

    let read: CrashReport = test.store.get_record(2).expect("get");
    assert_eq!(read, shorter);
    let read: CrashReport = test.store.get_record(4).expect("get");
    assert_eq!(read, longer);

    let all: Vec<CrashReport> = test.store.scan_records().expect("scan");
    let ids: Vec<i32> = all.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

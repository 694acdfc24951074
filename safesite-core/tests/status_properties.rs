use proptest::prelude::*;
use safesite_core::{ComplianceStatus, Detection, StatusEngine, ViolationKind};
use std::collections::BTreeSet;

fn label_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("NO-Hardhat".to_string()),
        Just("NO-Mask".to_string()),
        Just("NO-Safety Vest".to_string()),
        Just("Person".to_string()),
        Just("Hardhat".to_string()),
        Just("Mask".to_string()),
        Just("Safety Vest".to_string()),
        Just("machinery".to_string()),
        "[a-z]{1,8}",
    ]
}

fn status_strategy() -> impl Strategy<Value = ComplianceStatus> {
    prop_oneof![
        Just(ComplianceStatus::Scanning),
        Just(ComplianceStatus::Compliant),
        prop::sample::subsequence(ViolationKind::ALL.to_vec(), 1..=3)
            .prop_map(ComplianceStatus::alert),
    ]
}

proptest! {
    #[test]
    fn test_alert_missing_set_matches_markers(
        labels in prop::collection::vec(label_strategy(), 0..12),
        previous in status_strategy(),
    ) {
        let detections: Vec<Detection> = labels.iter().map(Detection::labeled).collect();
        let expected: BTreeSet<ViolationKind> = labels
            .iter()
            .filter_map(|l| ViolationKind::from_marker(l))
            .collect();

        let eval = StatusEngine::new().evaluate(&previous, &detections);

        if !expected.is_empty() {
            prop_assert_eq!(eval.status.missing(), Some(&expected));
        } else if !detections.is_empty() {
            prop_assert_eq!(&eval.status, &ComplianceStatus::Compliant);
        } else {
            prop_assert_eq!(&eval.status, &ComplianceStatus::Scanning);
        }
    }

    #[test]
    fn test_should_log_iff_new_alert(
        labels in prop::collection::vec(label_strategy(), 0..12),
        previous in status_strategy(),
    ) {
        let detections: Vec<Detection> = labels.iter().map(Detection::labeled).collect();
        let eval = StatusEngine::new().evaluate(&previous, &detections);
        prop_assert_eq!(eval.should_log, eval.status.is_alert() && eval.status != previous);
    }

    #[test]
    fn test_order_is_irrelevant(labels in prop::collection::vec(label_strategy(), 0..12)) {
        let forward: Vec<Detection> = labels.iter().map(Detection::labeled).collect();
        let mut backward = forward.clone();
        backward.reverse();
        prop_assert_eq!(StatusEngine::classify(&forward), StatusEngine::classify(&backward));
    }

    #[test]
    fn test_steady_alert_logs_once(repeats in 1usize..20) {
        let engine = StatusEngine::new();
        let frame = vec![Detection::labeled("NO-Hardhat")];
        let mut current = ComplianceStatus::Scanning;
        let mut logs = 0;
        for _ in 0..repeats {
            let eval = engine.evaluate(&current, &frame);
            logs += eval.should_log as usize;
            current = eval.status;
        }
        prop_assert_eq!(logs, 1);
    }
}

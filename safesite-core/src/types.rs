use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Rendering used for audit log timestamps and their persisted text column.
pub const AUDIT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Axis-aligned box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Right and bottom edges
    pub fn max_corner(&self) -> (f32, f32) {
        (self.x + self.width, self.y + self.height)
    }

    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width >= 0.0
            && self.height >= 0.0
    }
}

/// One labeled object reported by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    #[serde(rename = "bbox", with = "bbox_array")]
    pub bounding_box: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bounding_box: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bounding_box,
        }
    }

    /// Detection with a zero-sized box, handy when only the label matters
    pub fn labeled(label: impl Into<String>) -> Self {
        Self::new(label, 1.0, BoundingBox::new(0.0, 0.0, 0.0, 0.0))
    }

    /// The PPE category this label marks as missing, if any
    pub fn violation(&self) -> Option<ViolationKind> {
        ViolationKind::from_marker(&self.label)
    }
}

/// Detectors speak `[x, y, w, h]`
mod bbox_array {
    use super::BoundingBox;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(b: &BoundingBox, s: S) -> Result<S::Ok, S::Error> {
        [b.x, b.y, b.width, b.height].serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BoundingBox, D::Error> {
        let [x, y, width, height] = <[f32; 4]>::deserialize(d)?;
        Ok(BoundingBox { x, y, width, height })
    }
}

/// A missing piece of protective equipment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    HardHat,
    Mask,
    SafetyVest,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 3] = [
        ViolationKind::HardHat,
        ViolationKind::Mask,
        ViolationKind::SafetyVest,
    ];

    /// Detector label that signals this item is absent
    pub fn marker(&self) -> &'static str {
        match self {
            ViolationKind::HardHat => "NO-Hardhat",
            ViolationKind::Mask => "NO-Mask",
            ViolationKind::SafetyVest => "NO-Safety Vest",
        }
    }

    pub fn from_marker(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.marker() == label)
    }

    /// Name shown to operators
    pub fn display_name(&self) -> &'static str {
        match self {
            ViolationKind::HardHat => "HARD HAT",
            ViolationKind::Mask => "MASK",
            ViolationKind::SafetyVest => "SAFETY VEST",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Current compliance verdict for the monitored scene.
///
/// `Alert` carries an ordered set so two alerts compare equal exactly when
/// the same items are missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "missing", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Scanning,
    Compliant,
    Alert(BTreeSet<ViolationKind>),
}

impl ComplianceStatus {
    pub fn alert(missing: impl IntoIterator<Item = ViolationKind>) -> Self {
        ComplianceStatus::Alert(missing.into_iter().collect())
    }

    pub fn is_alert(&self) -> bool {
        matches!(self, ComplianceStatus::Alert(_))
    }

    pub fn missing(&self) -> Option<&BTreeSet<ViolationKind>> {
        match self {
            ComplianceStatus::Alert(missing) => Some(missing),
            _ => None,
        }
    }

    /// Human-readable rendering served by the status endpoint and written to the audit log
    pub fn message(&self) -> String {
        match self {
            ComplianceStatus::Scanning => "🔍 Scanning for personnel...".to_string(),
            ComplianceStatus::Compliant => "✅ ALL PPE DETECTED".to_string(),
            ComplianceStatus::Alert(missing) => {
                let items: Vec<&str> = missing.iter().map(|k| k.display_name()).collect();
                format!("⚠️ ALERT: {} MISSING", items.join(", "))
            }
        }
    }
}

impl Default for ComplianceStatus {
    fn default() -> Self {
        ComplianceStatus::Scanning
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Append-only record of a transition into a violation state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl AuditLogEntry {
    pub fn new(timestamp: DateTime<Local>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }

    /// Entry stamped with the current wall-clock time
    pub fn now(status: &ComplianceStatus) -> Self {
        Self::new(Local::now(), status.message())
    }

    /// Timestamp in the persisted text layout
    pub fn timestamp_text(&self) -> String {
        self.timestamp.format(AUDIT_TIMESTAMP_FORMAT).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_markers_round_trip() {
        for kind in ViolationKind::ALL {
            assert_eq!(ViolationKind::from_marker(kind.marker()), Some(kind));
        }
        assert_eq!(ViolationKind::from_marker("Hardhat"), None);
        assert_eq!(ViolationKind::from_marker("no-hardhat"), None);
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(ComplianceStatus::Scanning.message(), "🔍 Scanning for personnel...");
        assert_eq!(ComplianceStatus::Compliant.message(), "✅ ALL PPE DETECTED");
        let alert = ComplianceStatus::alert([ViolationKind::SafetyVest, ViolationKind::HardHat]);
        assert_eq!(alert.message(), "⚠️ ALERT: HARD HAT, SAFETY VEST MISSING");
    }

    #[test]
    fn test_alert_equality_is_by_missing_set() {
        let a = ComplianceStatus::alert([ViolationKind::Mask, ViolationKind::HardHat]);
        let b = ComplianceStatus::alert([ViolationKind::HardHat, ViolationKind::Mask]);
        let c = ComplianceStatus::alert([ViolationKind::HardHat]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_detection_json_uses_bbox_array() {
        let json = r#"{"label":"NO-Mask","confidence":0.91,"bbox":[10.0,20.0,30.0,40.0]}"#;
        let detection: Detection = serde_json::from_str(json).unwrap();
        assert_eq!(detection.label, "NO-Mask");
        assert_eq!(detection.bounding_box, BoundingBox::new(10.0, 20.0, 30.0, 40.0));
        assert_eq!(detection.violation(), Some(ViolationKind::Mask));

        let back = serde_json::to_value(&detection).unwrap();
        assert_eq!(back["bbox"][3], 40.0);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let d = Detection::new("person", 1.7, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn test_audit_timestamp_text() {
        use chrono::TimeZone;
        let ts = Local.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let entry = AuditLogEntry::new(ts, "x");
        assert_eq!(entry.timestamp_text(), "2025-03-04 05:06:07");
    }
}

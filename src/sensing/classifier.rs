use serde::{Deserialize, Serialize};

/// Engagement label derived from the last classified frame. `Loading` is the
/// published value until the first classification completes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DetectionStatus {
    Loading,
    Studying,
    Distracted,
}

impl DetectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionStatus::Loading => "Loading",
            DetectionStatus::Studying => "Studying",
            DetectionStatus::Distracted => "Distracted",
        }
    }
}

/// One detected object as reported by the detector service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
}

/// Objects whose presence marks a frame as potentially distracting.
const DISTRACTOR_LABELS: &[&str] = &[
    "cell phone",
    "phone",
    "remote",
    "book",
    "laptop",
    "keyboard",
    "mouse",
    "cup",
    "bottle",
];

/// Handheld-device labels that flip a frame to Distracted on their own when
/// seen above this confidence.
const DEVICE_LABELS: &[&str] = &["cell phone", "phone"];
const DEVICE_CONFIDENCE_THRESHOLD: f32 = 0.5;

fn label_matches(label: &str, vocabulary: &[&str]) -> bool {
    let label = label.to_lowercase();
    vocabulary.iter().any(|entry| label.contains(entry))
}

/// Map a frame's detections to an engagement status.
///
/// No person in frame means the subject stepped away: Distracted. With a
/// person present, ambiguous objects (books, cups, peripherals) stay benign
/// unless a phone-class label clears the confidence threshold.
pub fn classify(detections: &[Detection]) -> DetectionStatus {
    let has_person = detections
        .iter()
        .any(|d| d.label.to_lowercase().contains("person"));
    if !has_person {
        return DetectionStatus::Distracted;
    }

    let has_distractor = detections
        .iter()
        .any(|d| label_matches(&d.label, DISTRACTOR_LABELS));
    if has_distractor {
        let high_confidence_device = detections.iter().any(|d| {
            label_matches(&d.label, DEVICE_LABELS) && d.confidence > DEVICE_CONFIDENCE_THRESHOLD
        });
        if high_confidence_device {
            return DetectionStatus::Distracted;
        }
    }

    DetectionStatus::Studying
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, confidence: f32) -> Detection {
        Detection {
            label: label.to_string(),
            confidence,
        }
    }

    #[test]
    fn person_alone_is_studying() {
        assert_eq!(
            classify(&[det("person", 0.92)]),
            DetectionStatus::Studying
        );
    }

    #[test]
    fn empty_frame_is_distracted() {
        assert_eq!(classify(&[]), DetectionStatus::Distracted);
    }

    #[test]
    fn person_with_confident_phone_is_distracted() {
        assert_eq!(
            classify(&[det("person", 0.9), det("cell phone", 0.9)]),
            DetectionStatus::Distracted
        );
    }

    #[test]
    fn person_with_low_confidence_book_is_studying() {
        assert_eq!(
            classify(&[det("person", 0.9), det("book", 0.3)]),
            DetectionStatus::Studying
        );
    }

    #[test]
    fn phone_without_person_is_distracted() {
        assert_eq!(
            classify(&[det("cell phone", 0.9)]),
            DetectionStatus::Distracted
        );
    }

    #[test]
    fn low_confidence_phone_with_person_stays_benign() {
        assert_eq!(
            classify(&[det("person", 0.8), det("cell phone", 0.4)]),
            DetectionStatus::Studying
        );
    }

    #[test]
    fn distractor_match_is_case_insensitive_substring() {
        assert_eq!(
            classify(&[det("Person", 0.9), det("Laptop Computer", 0.8)]),
            DetectionStatus::Studying
        );
        assert_eq!(
            classify(&[det("PERSON", 0.9), det("Cell Phone", 0.7)]),
            DetectionStatus::Distracted
        );
    }

    #[test]
    fn non_device_distractors_never_flip_alone() {
        // High-confidence cup and keyboard with a person present stay benign.
        assert_eq!(
            classify(&[det("person", 0.9), det("cup", 0.99), det("keyboard", 0.97)]),
            DetectionStatus::Studying
        );
    }
}

//! Medication payload normalisation.
//!
//! Callers hand in whatever the client sent; this module trims it down to the canonical
//! [`Medication`] shape, or to nothing when no meaningful content survives.

use serde::{Deserialize, Serialize};

use crate::task::{Dose, Medication};

/// Loosely-typed medication as received from a client or template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MedicationInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub doses: Option<Vec<DoseInput>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DoseInput {
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl From<Medication> for MedicationInput {
    fn from(m: Medication) -> Self {
        MedicationInput {
            name: m.name,
            kind: m.kind,
            notes: m.notes,
            doses: Some(
                m.doses
                    .into_iter()
                    .map(|d| DoseInput {
                        time: d.time,
                        dosage: d.dosage,
                        instructions: d.instructions,
                    })
                    .collect(),
            ),
        }
    }
}

/// Normalise a medication payload, returning `None` when nothing meaningful remains.
pub fn sanitize_medication(input: Option<&MedicationInput>) -> Option<Medication> {
    let input = input?;

    let doses: Vec<Dose> = input
        .doses
        .iter()
        .flatten()
        .filter_map(sanitize_dose)
        .collect();

    let medication = Medication {
        name: clean(input.name.as_deref()),
        kind: clean(input.kind.as_deref()),
        notes: clean(input.notes.as_deref()),
        doses,
    };

    if medication.name.is_none()
        && medication.kind.is_none()
        && medication.notes.is_none()
        && medication.doses.is_empty()
    {
        return None;
    }
    Some(medication)
}

fn sanitize_dose(dose: &DoseInput) -> Option<Dose> {
    let time = dose
        .time
        .as_deref()
        .map(str::trim)
        .filter(|t| is_clock_time(t))
        .map(str::to_string);
    let dosage = clean(dose.dosage.as_deref());
    let instructions = clean(dose.instructions.as_deref());

    if time.is_none() && dosage.is_none() && instructions.is_none() {
        return None;
    }
    Some(Dose {
        time,
        dosage,
        instructions,
    })
}

/// Literal `DD:DD` shape. Values are not range-checked.
fn is_clock_time(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 5
        && b[0].is_ascii_digit()
        && b[1].is_ascii_digit()
        && b[2] == b':'
        && b[3].is_ascii_digit()
        && b[4].is_ascii_digit()
}

fn clean(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dose(time: Option<&str>, dosage: Option<&str>) -> DoseInput {
        DoseInput {
            time: time.map(Into::into),
            dosage: dosage.map(Into::into),
            instructions: None,
        }
    }

    #[test]
    fn test_absent_input() {
        assert_eq!(sanitize_medication(None), None);
    }

    #[test]
    fn test_single_digit_hour_collapses_to_absent() {
        let input = MedicationInput {
            name: Some("".into()),
            doses: Some(vec![dose(Some("8:00"), None)]),
            ..Default::default()
        };
        assert_eq!(sanitize_medication(Some(&input)), None);
    }

    #[test]
    fn test_dose_without_time_survives() {
        let input = MedicationInput {
            doses: Some(vec![dose(None, Some("5ml"))]),
            ..Default::default()
        };
        let med = sanitize_medication(Some(&input)).unwrap();
        assert_eq!(med.doses.len(), 1);
        assert_eq!(med.doses[0].time, None);
        assert_eq!(med.doses[0].dosage.as_deref(), Some("5ml"));
    }

    #[test]
    fn test_free_text_time_dropped_but_row_kept() {
        let input = MedicationInput {
            doses: Some(vec![dose(Some("morning"), Some("1 tablet"))]),
            ..Default::default()
        };
        let med = sanitize_medication(Some(&input)).unwrap();
        assert_eq!(med.doses[0].time, None);
    }

    #[test]
    fn test_trims_fields() {
        let input = MedicationInput {
            name: Some("  Meloxicam ".into()),
            kind: Some("   ".into()),
            notes: Some(" with food".into()),
            doses: Some(vec![dose(Some(" 08:30 "), None), dose(None, Some("  "))]),
        };
        let med = sanitize_medication(Some(&input)).unwrap();
        assert_eq!(med.name.as_deref(), Some("Meloxicam"));
        assert_eq!(med.kind, None);
        assert_eq!(med.notes.as_deref(), Some("with food"));
        assert_eq!(med.doses.len(), 1);
        assert_eq!(med.doses[0].time.as_deref(), Some("08:30"));
    }

    #[test]
    fn test_clock_shape() {
        assert!(is_clock_time("23:59"));
        assert!(is_clock_time("99:99"));
        assert!(!is_clock_time("8:00"));
        assert!(!is_clock_time("08:00:00"));
        assert!(!is_clock_time("ab:cd"));
    }
}

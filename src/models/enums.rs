use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The string form is also the serde form, so graph JSON, CSV and the
/// database all agree on spelling.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(PageType {
    ClinicalNote => "clinical_note",
    OperativeReport => "operative_report",
    ImagingReport => "imaging_report",
    PtNote => "pt_note",
    Billing => "billing",
    Administrative => "administrative",
    Other => "other",
});

str_enum!(TextSource {
    Embedded => "embedded",
    Ocr => "ocr",
    None => "none",
});

str_enum!(DocumentType {
    MedicalRecord => "medical_record",
    MedicalBill => "medical_bill",
    Correspondence => "correspondence",
    Unknown => "unknown",
});

str_enum!(EventType {
    ErVisit => "er_visit",
    OfficeVisit => "office_visit",
    HospitalAdmission => "hospital_admission",
    HospitalDischarge => "hospital_discharge",
    Procedure => "procedure",
    ImagingStudy => "imaging_study",
    PtVisit => "pt_visit",
    Billing => "billing",
});

// What a billed amount represents, from the wording on its line
str_enum!(AmountType {
    Charge => "charge",
    Payment => "payment",
    Copay => "copay",
    Coinsurance => "coinsurance",
    Adjustment => "adjustment",
    Writeoff => "writeoff",
    Balance => "balance",
    Deductible => "deductible",
    Total => "total",
    Unknown => "unknown",
});

str_enum!(Sex {
    Male => "male",
    Female => "female",
    Uncertain => "uncertain",
});

str_enum!(EvidenceTier {
    Tier1 => "tier1",
    Tier2 => "tier2",
});

str_enum!(ProviderKind {
    Facility => "facility",
    Clinician => "clinician",
});

str_enum!(CareSetting {
    Er => "er",
    Hospital => "hospital",
    Imaging => "imaging",
    Pt => "pt",
    Pcp => "pcp",
    Specialist => "specialist",
    Unknown => "unknown",
});

str_enum!(FactKind {
    ChiefComplaint => "chief_complaint",
    History => "history",
    Assessment => "assessment",
    Diagnosis => "diagnosis",
    Plan => "plan",
    Restriction => "restriction",
    Procedure => "procedure",
    Medication => "medication",
    Vitals => "vitals",
    Impression => "impression",
    Findings => "findings",
    Progress => "progress",
    Goal => "goal",
    VisitSummary => "visit_summary",
    Charge => "charge",
    Total => "total",
    Other => "other",
});

// MISSING_EOB_DATA: no payments seen, so insurer explanations of benefits
// are likely missing. PARTIAL_BILLING_ONLY: no adjustments, totals are gross.
str_enum!(SpecialsFlag {
    NoBillingData => "NO_BILLING_DATA",
    MissingEobData => "MISSING_EOB_DATA",
    PartialBillingOnly => "PARTIAL_BILLING_ONLY",
    ProviderUnresolved => "PROVIDER_UNRESOLVED",
});

str_enum!(EventFlag {
    LowConfidence => "LOW_CONFIDENCE",
    MultipleDateConflict => "MULTIPLE_DATE_CONFLICT",
    ProviderUncertain => "PROVIDER_UNCERTAIN",
    PageTypeUncertain => "PAGE_TYPE_UNCERTAIN",
    MissingDate => "MISSING_DATE",
    MissingCitation => "MISSING_CITATION",
    PtPerVisitFallback => "PT_PER_VISIT_FALLBACK",
    OcrDerived => "OCR_DERIVED",
});

str_enum!(GapScope {
    Provider => "provider",
    Global => "global",
});

str_enum!(GapSeverity {
    Medium => "medium",
    High => "high",
});

str_enum!(RunStatus {
    Pending => "pending",
    Running => "running",
    Success => "success",
    Partial => "partial",
    Failed => "failed",
});

impl PageType {
    /// Document class used by the segmenter to decide boundaries.
    pub fn document_class(&self) -> DocumentType {
        match self {
            Self::Billing => DocumentType::MedicalBill,
            Self::ClinicalNote | Self::OperativeReport | Self::ImagingReport | Self::PtNote => {
                DocumentType::MedicalRecord
            }
            Self::Administrative => DocumentType::Correspondence,
            Self::Other => DocumentType::Unknown,
        }
    }
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Partial | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn page_type_round_trip() {
        for variant in [
            PageType::ClinicalNote,
            PageType::OperativeReport,
            PageType::ImagingReport,
            PageType::PtNote,
            PageType::Billing,
            PageType::Administrative,
            PageType::Other,
        ] {
            assert_eq!(PageType::from_str(variant.as_str()).unwrap(), variant);
        }
    }

    #[test]
    fn serde_uses_string_form() {
        let json = serde_json::to_string(&EventFlag::MultipleDateConflict).unwrap();
        assert_eq!(json, "\"MULTIPLE_DATE_CONFLICT\"");
        let back: EventType = serde_json::from_str("\"er_visit\"").unwrap();
        assert_eq!(back, EventType::ErVisit);
    }

    #[test]
    fn invalid_enum_errors() {
        assert!(matches!(
            RunStatus::from_str("done"),
            Err(DatabaseError::InvalidEnum { .. })
        ));
    }

    #[test]
    fn document_class_groups_clinical_pages() {
        assert_eq!(PageType::ImagingReport.document_class(), DocumentType::MedicalRecord);
        assert_eq!(PageType::PtNote.document_class(), DocumentType::MedicalRecord);
        assert_eq!(PageType::Billing.document_class(), DocumentType::MedicalBill);
        assert_eq!(PageType::Administrative.document_class(), DocumentType::Correspondence);
        assert_eq!(PageType::Other.document_class(), DocumentType::Unknown);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Partial.is_terminal());
    }
}

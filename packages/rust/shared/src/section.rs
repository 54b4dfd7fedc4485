//! The closed vocabulary of service-manual sections.
//!
//! The classifier prompt, the candidate index, and the corpus labels all
//! agree on this list. Bump [`SECTION_VOCABULARY_VERSION`] whenever it changes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EvManualError;

/// Version of the section list below.
pub const SECTION_VOCABULARY_VERSION: u32 = 1;

/// Label the ingestion step assigns when a file sits outside the section folders.
pub const CATCH_ALL_LABEL: &str = "기타";

/// One top-level section of the EV service manual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    DriveShaftAndAxle,
    MotorAndReducer,
    Body,
    BodyElectrical,
    BatteryControl,
    Brake,
    Suspension,
    Steering,
    Airbag,
    General,
    EvCooling,
    Adas,
    Hvac,
}

impl Section {
    /// Every section, in prompt order.
    pub const ALL: [Section; 13] = [
        Section::DriveShaftAndAxle,
        Section::MotorAndReducer,
        Section::Body,
        Section::BodyElectrical,
        Section::BatteryControl,
        Section::Brake,
        Section::Suspension,
        Section::Steering,
        Section::Airbag,
        Section::General,
        Section::EvCooling,
        Section::Adas,
        Section::Hvac,
    ];

    /// Corpus label, exactly as it appears in the manual folder tree.
    pub fn label(self) -> &'static str {
        match self {
            Self::DriveShaftAndAxle => "드라이브 샤프트 및 액슬",
            Self::MotorAndReducer => "모터 및 감속기 시스템",
            Self::Body => "바디 (내장 및 외장)",
            Self::BodyElectrical => "바디 전장",
            Self::BatteryControl => "배터리 제어 시스템",
            Self::Brake => "브레이크 시스템",
            Self::Suspension => "서스펜션 시스템",
            Self::Steering => "스티어링 시스템",
            Self::Airbag => "에어백 시스템",
            Self::General => "일반사항",
            Self::EvCooling => "전기차 냉각 시스템",
            Self::Adas => "첨단 운전자 보조 시스템(ADAS)",
            Self::Hvac => "히터 및 에어컨 장치",
        }
    }

    /// Match a raw label (classifier output or stored metadata) against the vocabulary.
    ///
    /// Comparison ignores case, surrounding whitespace and runs of inner whitespace.
    pub fn parse(raw: &str) -> Option<Section> {
        let wanted = normalize_label(raw);
        if wanted.is_empty() {
            return None;
        }
        Self::ALL
            .into_iter()
            .find(|section| normalize_label(section.label()) == wanted)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Section {
    type Err = EvManualError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Section::parse(s)
            .ok_or_else(|| EvManualError::validation(format!("unknown manual section '{s}'")))
    }
}

impl Serialize for Section {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Section {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Section::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown manual section '{raw}'")))
    }
}

/// Case- and whitespace-insensitive form of a label or document name.
pub fn normalize_label(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_unique() {
        let mut labels: Vec<_> = Section::ALL.iter().map(|s| s.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), Section::ALL.len());
    }

    #[test]
    fn parse_exact_label() {
        assert_eq!(
            Section::parse("배터리 제어 시스템"),
            Some(Section::BatteryControl)
        );
    }

    #[test]
    fn parse_ignores_case_and_spacing() {
        // Ingestion lower-cases labels, which touches the ASCII suffix.
        assert_eq!(
            Section::parse("첨단 운전자 보조 시스템(adas)"),
            Some(Section::Adas)
        );
        assert_eq!(
            Section::parse("  브레이크   시스템\n"),
            Some(Section::Brake)
        );
    }

    #[test]
    fn catch_all_and_free_text_do_not_match() {
        assert_eq!(Section::parse(CATCH_ALL_LABEL), None);
        assert_eq!(Section::parse("I think it is the battery"), None);
        assert_eq!(Section::parse(""), None);
    }

    #[test]
    fn serde_uses_labels() {
        let json = serde_json::to_string(&Section::Hvac).unwrap();
        assert_eq!(json, "\"히터 및 에어컨 장치\"");
        let back: Section = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Section::Hvac);
    }

    #[test]
    fn from_str_rejects_unknown() {
        let err = "엔진".parse::<Section>().unwrap_err();
        assert!(err.to_string().contains("unknown manual section"));
    }
}

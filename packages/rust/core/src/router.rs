//! Two-step routing: query → section → document.
//!
//! A [`Router`] produces raw decisions; [`SectionDecision::resolve`] and
//! [`resolve_document`] map them onto the vocabulary and the candidate list.
//! Neither step fails on a mismatch: the raw value is kept and retrieval
//! then finds nothing, which ends in the refusal answer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use evmanual_shared::{CATCH_ALL_LABEL, LanguageModel, Result, Section, normalize_label};

use crate::prompts;

/// Routing capability used by the pipeline.
#[async_trait]
pub trait Router: Send + Sync {
    /// Raw section label for `query`.
    async fn classify_section(&self, query: &str) -> Result<String>;

    /// Raw document name for `query` among `candidates` (sorted, possibly empty).
    async fn select_document(
        &self,
        query: &str,
        section: &str,
        candidates: &[String],
    ) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Outcome of section classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDecision {
    /// Canonical label when matched, otherwise the raw classifier output.
    pub label: String,
    /// Matched vocabulary entry.
    pub section: Option<Section>,
}

impl SectionDecision {
    pub fn resolve(raw: &str) -> Self {
        let cleaned = strip_wrapping(raw);
        match Section::parse(cleaned) {
            Some(section) => Self {
                label: section.label().to_string(),
                section: Some(section),
            },
            None => Self {
                label: raw.trim().to_string(),
                section: None,
            },
        }
    }
}

/// Outcome of document selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentDecision {
    /// Matched candidate, or the raw selector output.
    pub name: String,
    pub matched: bool,
}

/// Resolve a selector answer against the candidates.
///
/// Tried in order: exact, without quotes and `.pdf`, normalized equality,
/// then containment in either direction when it picks a single candidate.
pub fn resolve_document(raw: &str, candidates: &[String]) -> DocumentDecision {
    let trimmed = raw.trim();
    let matched = |name: &String| DocumentDecision {
        name: name.clone(),
        matched: true,
    };

    if let Some(hit) = candidates.iter().find(|c| c.as_str() == trimmed) {
        return matched(hit);
    }

    let cleaned = strip_pdf_suffix(strip_wrapping(trimmed));
    if let Some(hit) = candidates.iter().find(|c| c.as_str() == cleaned) {
        return matched(hit);
    }

    let wanted = normalize_label(cleaned);
    if !wanted.is_empty() {
        if let Some(hit) = candidates.iter().find(|c| normalize_label(c) == wanted) {
            return matched(hit);
        }

        let containing: Vec<&String> = candidates
            .iter()
            .filter(|c| {
                let candidate = normalize_label(c);
                !candidate.is_empty() && (candidate.contains(&wanted) || wanted.contains(&candidate))
            })
            .collect();
        if let [hit] = containing.as_slice() {
            return matched(*hit);
        }
    }

    DocumentDecision {
        name: trimmed.to_string(),
        matched: false,
    }
}

const WRAPPING: &[char] = &[
    '"', '\'', '`', '“', '”', '‘', '’', '「', '」', '『', '』', '[', ']', '*',
];

fn strip_wrapping(raw: &str) -> &str {
    raw.trim().trim_matches(WRAPPING).trim()
}

fn strip_pdf_suffix(name: &str) -> &str {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        name[..name.len() - 4].trim_end()
    } else {
        name
    }
}

// ---------------------------------------------------------------------------
// LlmRouter
// ---------------------------------------------------------------------------

/// Router that asks a language model for both decisions.
pub struct LlmRouter {
    model: Arc<dyn LanguageModel>,
}

impl LlmRouter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Router for LlmRouter {
    #[instrument(skip_all, fields(model = self.model.model_id()))]
    async fn classify_section(&self, query: &str) -> Result<String> {
        let raw = self.model.complete(&prompts::section_prompt(query)).await?;
        debug!(raw = %raw.trim(), "section completion");
        Ok(raw.trim().to_string())
    }

    #[instrument(skip_all, fields(model = self.model.model_id(), section = %section, candidates = candidates.len()))]
    async fn select_document(
        &self,
        query: &str,
        section: &str,
        candidates: &[String],
    ) -> Result<String> {
        let prompt = prompts::document_prompt(query, section, candidates);
        let raw = self.model.complete(&prompt).await?;
        debug!(raw = %raw.trim(), "document completion");
        Ok(raw.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// KeywordRouter
// ---------------------------------------------------------------------------

/// Deterministic router driven by a keyword table and token overlap.
///
/// Makes no model calls. A query without any keyword hit is routed to the
/// catch-all label, which is outside the vocabulary.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordRouter;

impl KeywordRouter {
    pub fn new() -> Self {
        Self
    }

    /// Best section for `query`; ties go to the earlier vocabulary entry.
    pub fn section_for(query: &str) -> Option<Section> {
        let query = normalize_label(query);
        let mut best: Option<(usize, Section)> = None;
        for section in Section::ALL {
            let score: usize = section_keywords(section)
                .iter()
                .filter(|keyword| query.contains(*keyword))
                .map(|keyword| keyword.chars().count())
                .sum();
            if score > 0 && best.is_none_or(|(top, _)| score > top) {
                best = Some((score, section));
            }
        }
        best.map(|(_, section)| section)
    }

    /// Candidate sharing the most query tokens; ties go to the earlier candidate.
    pub fn document_for<'a>(query: &str, candidates: &'a [String]) -> Option<&'a String> {
        if let [only] = candidates {
            return Some(only);
        }
        let query = normalize_label(query);
        let query_tokens = tokens(&query);

        let mut best: Option<(usize, &String)> = None;
        for candidate in candidates {
            let name = normalize_label(candidate);
            let score = tokens(&name)
                .iter()
                .filter(|token| query.contains(*token))
                .map(|token| token.chars().count())
                .sum::<usize>()
                + query_tokens
                    .iter()
                    .filter(|token| name.contains(*token))
                    .map(|token| token.chars().count())
                    .sum::<usize>();
            if score > 0 && best.is_none_or(|(top, _)| score > top) {
                best = Some((score, candidate));
            }
        }
        best.map(|(_, candidate)| candidate)
    }
}

#[async_trait]
impl Router for KeywordRouter {
    async fn classify_section(&self, query: &str) -> Result<String> {
        Ok(Self::section_for(query)
            .map(|section| section.label())
            .unwrap_or(CATCH_ALL_LABEL)
            .to_string())
    }

    async fn select_document(
        &self,
        query: &str,
        _section: &str,
        candidates: &[String],
    ) -> Result<String> {
        Ok(Self::document_for(query, candidates)
            .cloned()
            .unwrap_or_default())
    }
}

/// Tokens of at least two characters, split on anything not alphanumeric.
fn tokens(text: &str) -> Vec<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2)
        .collect()
}

fn section_keywords(section: Section) -> &'static [&'static str] {
    match section {
        Section::DriveShaftAndAxle => &["드라이브 샤프트", "드라이브샤프트", "액슬", "등속", "허브 베어링", "axle", "drive shaft"],
        Section::MotorAndReducer => &["모터", "감속기", "인버터", "motor", "reducer"],
        Section::Body => &["도어", "범퍼", "후드", "테일게이트", "트림", "내장", "외장", "시트", "door", "bumper"],
        Section::BodyElectrical => &["전장", "램프", "와이퍼", "퓨즈", "배선", "스마트키", "오디오", "lamp", "wiper", "fuse"],
        Section::BatteryControl => &["배터리", "bms", "고전압", "충전", "battery", "charging"],
        Section::Brake => &["브레이크", "제동", "캘리퍼", "패드", "abs", "brake"],
        Section::Suspension => &["서스펜션", "쇽업소버", "쇼크 업소버", "스프링", "얼라인먼트", "suspension"],
        Section::Steering => &["스티어링", "조향", "핸들", "mdps", "steering"],
        Section::Airbag => &["에어백", "시트벨트", "프리텐셔너", "srs", "airbag"],
        Section::General => &["일반사항", "정비 안전", "견인", "리프트", "주의사항", "towing"],
        Section::EvCooling => &["냉각수", "냉각", "쿨런트", "라디에이터", "워터 펌프", "coolant"],
        Section::Adas => &["adas", "레이더", "카메라", "차로", "크루즈", "radar", "camera"],
        Section::Hvac => &["히터", "에어컨", "공조", "냉매", "블로어", "히트 펌프", "hvac", "heater"],
    }
}

//! Prompt templates for the three model calls.
//!
//! The wording is Korean to match the manual corpus. The section prompt
//! enumerates [`Section::ALL`], so the classifier and the corpus labels
//! share one vocabulary.

use evmanual_shared::Section;

/// Sentence the answer model must produce when the context has nothing relevant.
pub const REFUSAL: &str = "문서에 없는 내용이라 답변 드릴 수 없습니다.";

/// Role marker that ends the answer prompt; models sometimes echo it.
pub const ROLE_MARKER: &str = "[정비사 답변]";

/// Prompt asking for exactly one section label.
pub fn section_prompt(question: &str) -> String {
    let choices = Section::ALL
        .iter()
        .map(|section| section.label())
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "다음 사용자의 질문이 어느 전기차 정비 시스템 섹션에 가장 관련 있는지 아래 선택지 중 하나만 골라주세요.\n\
         \n\
         선택지:\n\
         {choices}\n\
         \n\
         질문: {question}\n\
         \n\
         가장 관련 있는 섹션:\n"
    )
}

/// Prompt asking for one document name out of `candidates` (already sorted).
pub fn document_prompt(question: &str, section: &str, candidates: &[String]) -> String {
    let document_list = candidates.join("\n");

    format!(
        "다음은 \"{section}\" 섹션의 문서 목록입니다:\n\
         \n\
         {document_list}\n\
         \n\
         사용자의 질문: {question}\n\
         \n\
         위 문서 중에서 가장 관련 있는 문서명을 정확히 골라주세요. 반드시 목록에 있는 문서명과 일치시켜 출력하세요.\n\
         \n\
         선택한 문서명:\n"
    )
}

/// Grounded answer prompt for a mechanic persona.
pub fn answer_prompt(context: &str, question: &str) -> String {
    format!(
        "당신은 전기차 정비 문서에 기반하여 질문에 답하는 전문 정비사입니다.\n\
         \n\
         - 문서에서 유사하거나 관련 있는 내용을 참고하여 단계별로 설명하세요.\n\
         - 직접적인 문장이 없더라도, 문맥상 유추 가능한 경우는 '문서에 따르면...'의 형식으로 정리해 주세요.\n\
         - 단, 완전히 문서에 없을 경우에는 '{REFUSAL}'라고 말하세요.\n\
         \n\
         [문서 내용]\n\
         {context}\n\
         \n\
         [질문]\n\
         {question}\n\
         \n\
         {ROLE_MARKER}\n"
    )
}

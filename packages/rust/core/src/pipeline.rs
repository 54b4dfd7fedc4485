//! End-to-end answer pipeline: query → section → document → chunks → context → answer.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use evmanual_shared::{
    AnswerResult, CorpusStore, EvManualError, LanguageModel, PipelineConfig, Result, Stage,
};

use crate::assembler::{apply_budget, assemble_within};
use crate::index::{DocumentIndex, DocumentIndexCache};
use crate::retriever::retrieve;
use crate::router::{Router, SectionDecision, resolve_document};
use crate::synthesizer::Synthesizer;

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a stage starts.
    fn stage(&self, stage: Stage);
    /// Called once both routing decisions are made.
    fn routed(&self, section: &str, document: &str);
    /// Called when the pipeline completes.
    fn done(&self, result: &AnswerResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage(&self, _stage: Stage) {}
    fn routed(&self, _section: &str, _document: &str) {}
    fn done(&self, _result: &AnswerResult) {}
}

/// The staged question-answering pipeline.
///
/// Built once per process and shared by concurrent requests. Stages run
/// strictly in sequence and any failure aborts the request.
pub struct Pipeline {
    router: Arc<dyn Router>,
    store: Arc<dyn CorpusStore>,
    synthesizer: Synthesizer,
    config: PipelineConfig,
    index_cache: DocumentIndexCache,
}

impl Pipeline {
    pub fn new(
        router: Arc<dyn Router>,
        store: Arc<dyn CorpusStore>,
        answer_model: Arc<dyn LanguageModel>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            router,
            store,
            synthesizer: Synthesizer::new(answer_model),
            config,
            index_cache: DocumentIndexCache::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Section → documents index, cached by store revision when enabled.
    pub async fn document_index(&self) -> Result<Arc<DocumentIndex>> {
        if self.config.cache_document_index {
            self.index_cache.get(self.store.as_ref()).await
        } else {
            Ok(Arc::new(DocumentIndex::build(self.store.as_ref()).await?))
        }
    }

    /// Answer `query` without progress reporting.
    pub async fn answer_query(&self, query: &str) -> Result<AnswerResult> {
        self.answer_query_with(query, &SilentProgress).await
    }

    /// Answer `query`, reporting each stage to `progress`.
    ///
    /// Routing mismatches and empty retrieval end in the refusal answer.
    /// Model failures surface as [`EvManualError::Generation`] carrying the
    /// decisions made so far.
    #[instrument(skip_all, fields(query_chars = query.chars().count()))]
    pub async fn answer_query_with(
        &self,
        query: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<AnswerResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EvManualError::validation("query must not be empty"));
        }
        let start = Instant::now();

        // --- Stage 1: Section ---
        progress.stage(Stage::Section);
        let raw_section = self
            .router
            .classify_section(query)
            .await
            .map_err(generation_failure(Stage::Section, None, None))?;
        let section = SectionDecision::resolve(&raw_section);

        let candidates = match section.section {
            Some(matched) => self.document_index().await?.documents(matched),
            None => {
                warn!(raw = %section.label, "section outside vocabulary, no candidates");
                Vec::new()
            }
        };
        info!(section = %section.label, candidates = candidates.len(), "section classified");

        // --- Stage 2: Document ---
        progress.stage(Stage::Document);
        let raw_document = self
            .router
            .select_document(query, &section.label, &candidates)
            .await
            .map_err(generation_failure(Stage::Document, Some(section.label.as_str()), None))?;
        let document = resolve_document(&raw_document, &candidates);
        if !document.matched {
            warn!(raw = %document.name, "document not among candidates");
        }
        info!(document = %document.name, "document selected");
        progress.routed(&section.label, &document.name);

        // --- Stage 3: Retrieval ---
        progress.stage(Stage::Retrieval);
        let chunks = retrieve(self.store.as_ref(), query, &document.name, self.config.top_k)
            .await
            .map_err(generation_failure(
                Stage::Retrieval,
                Some(section.label.as_str()),
                Some(document.name.as_str()),
            ))?;
        let retrieved = chunks.len();
        let chunks = apply_budget(chunks, self.config.max_context_chars);
        if chunks.len() < retrieved {
            info!(kept = chunks.len(), retrieved, "context budget applied");
        }
        let assembled = assemble_within(&chunks, self.config.max_context_chars);

        // --- Stage 4: Answer ---
        progress.stage(Stage::Answer);
        let synthesis = self
            .synthesizer
            .synthesize(&assembled.context, query)
            .await
            .map_err(generation_failure(
                Stage::Answer,
                Some(section.label.as_str()),
                Some(document.name.as_str()),
            ))?;

        let (image_paths, image_names) = assembled
            .images
            .into_iter()
            .map(|image| (image.path, image.name))
            .unzip();

        let result = AnswerResult {
            answer: synthesis.answer,
            refused: synthesis.refused,
            section: section.label,
            document: document.name,
            source_documents: chunks,
            image_paths,
            image_names,
        };

        info!(
            chunks = result.source_documents.len(),
            refused = result.refused,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "query answered"
        );
        progress.done(&result);
        Ok(result)
    }
}

/// Wrap model-service errors for `stage`; other errors pass through unchanged.
fn generation_failure<'a>(
    stage: Stage,
    section: Option<&'a str>,
    document: Option<&'a str>,
) -> impl FnOnce(EvManualError) -> EvManualError + 'a {
    move |err| {
        if err.is_model_failure() {
            EvManualError::generation(stage, section, document, err)
        } else {
            err
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::REFUSAL;
    use crate::router::{KeywordRouter, LlmRouter};
    use crate::testing::{FixedRouter, MemoryCorpus, ScriptedModel, chunk};

    const AXLE: &str = "드라이브 샤프트 및 액슬";
    const BATTERY: &str = "배터리 제어 시스템";

    fn config() -> PipelineConfig {
        PipelineConfig {
            top_k: 10,
            max_context_chars: None,
            cache_document_index: true,
        }
    }

    fn axle_corpus() -> Vec<evmanual_shared::Chunk> {
        vec![
            chunk(AXLE, "Axle Manual", "드라이브 액슬 탈거 절차", &[("img1.png", "n1")]),
            chunk(AXLE, "Axle Manual", "드라이브 액슬 장착 절차", &[("img2.png", "n2")]),
            chunk(AXLE, "허브 베어링", "허브 베어링 점검 기준", &[]),
        ]
    }

    fn pipeline(
        router: Arc<dyn Router>,
        store: Arc<MemoryCorpus>,
        model: Arc<ScriptedModel>,
        config: PipelineConfig,
    ) -> Pipeline {
        Pipeline::new(router, store, model, config)
    }

    #[tokio::test]
    async fn routes_into_section_documents() {
        let store = Arc::new(MemoryCorpus::new(vec![
            chunk(BATTERY, "BMS 점검", "BMS 커넥터 분리", &[]),
            chunk(BATTERY, "고전압 배터리", "배터리 팩 탈거", &[]),
        ]));
        let router = Arc::new(FixedRouter::new(BATTERY, "BMS 점검"));
        let model = Arc::new(ScriptedModel::replying(&["문서에 따르면 커넥터를 분리합니다."]));
        let pipeline = pipeline(router.clone(), store, model, config());

        let result = pipeline.answer_query("What is the section-one topic?").await.unwrap();

        assert_eq!(result.section, BATTERY);
        assert_eq!(router.seen_candidates(), vec![vec!["BMS 점검".to_string(), "고전압 배터리".to_string()]]);
        assert_eq!(result.document, "BMS 점검");
        assert!(result.source_documents.iter().all(|c| c.document == "BMS 점검"));
        assert_eq!(result.source_documents.len(), 1);
        assert!(!result.refused);
    }

    #[tokio::test]
    async fn unrelated_query_is_refused_with_no_images() {
        let store = Arc::new(MemoryCorpus::new(axle_corpus()));
        let router = Arc::new(FixedRouter::new("날씨", "모르는 문서"));
        let model = Arc::new(ScriptedModel::replying(&[]));
        let pipeline = pipeline(router.clone(), store, model.clone(), config());

        let result = pipeline.answer_query("오늘 날씨는?").await.unwrap();

        assert_eq!(result.answer, REFUSAL);
        assert!(result.refused);
        assert!(result.source_documents.is_empty());
        assert!(result.image_paths.is_empty());
        assert!(result.image_names.is_empty());
        assert_eq!(result.section, "날씨");
        assert_eq!(result.document, "모르는 문서");
        assert_eq!(router.seen_candidates(), vec![Vec::<String>::new()]);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn images_follow_chunk_order() {
        let store = Arc::new(MemoryCorpus::new(axle_corpus()));
        let router = Arc::new(FixedRouter::new(AXLE, "Axle Manual"));
        let model = Arc::new(ScriptedModel::replying(&["[정비사 답변]\n1. 탈거합니다."]));
        let pipeline = pipeline(router, store, model, config());

        let result = pipeline.answer_query("액슬 탈거").await.unwrap();

        assert_eq!(result.answer, "1. 탈거합니다.");
        assert_eq!(result.image_paths, vec!["img1.png", "img2.png"]);
        assert_eq!(result.image_names, vec!["n1", "n2"]);
        assert_eq!(
            result.images().collect::<Vec<_>>(),
            vec![("img1.png", "n1"), ("img2.png", "n2")]
        );
    }

    #[tokio::test]
    async fn synthesis_failure_keeps_routing_decisions() {
        let store = Arc::new(MemoryCorpus::new(axle_corpus()));
        let router = Arc::new(FixedRouter::new(AXLE, "Axle Manual"));
        let model = Arc::new(ScriptedModel::new(vec![Err(EvManualError::Network(
            "connection reset".into(),
        ))]));
        let pipeline = pipeline(router, store, model, config());

        let err = pipeline.answer_query("액슬 탈거").await.unwrap_err();

        let failure = err.as_generation().expect("generation failure");
        assert_eq!(failure.stage, Stage::Answer);
        assert_eq!(failure.section.as_deref(), Some(AXLE));
        assert_eq!(failure.document.as_deref(), Some("Axle Manual"));
        assert!(matches!(*failure.source, EvManualError::Network(_)));
        assert!(err.to_string().contains("answer synthesis"));
    }

    #[tokio::test]
    async fn classification_failure_has_no_decisions() {
        let store = Arc::new(MemoryCorpus::new(axle_corpus()));
        let router = Arc::new(FixedRouter::failing_section(EvManualError::Network("down".into())));
        let model = Arc::new(ScriptedModel::replying(&[]));
        let pipeline = pipeline(router, store, model, config());

        let err = pipeline.answer_query("액슬").await.unwrap_err();
        let failure = err.as_generation().expect("generation failure");
        assert_eq!(failure.stage, Stage::Section);
        assert!(failure.section.is_none());
        assert!(failure.document.is_none());
    }

    #[tokio::test]
    async fn identical_queries_give_identical_results() {
        let store = Arc::new(MemoryCorpus::new(axle_corpus()));
        let router = Arc::new(FixedRouter::new(AXLE, "Axle Manual"));
        let model = Arc::new(ScriptedModel::replying(&["같은 답", "같은 답"]));
        let pipeline = pipeline(router, store.clone(), model, config());

        let first = pipeline.answer_query("액슬 탈거").await.unwrap();
        let second = pipeline.answer_query("액슬 탈거").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.metadata_scans(), 1);
    }

    #[tokio::test]
    async fn index_rebuilt_per_request_without_cache() {
        let store = Arc::new(MemoryCorpus::new(axle_corpus()));
        let router = Arc::new(FixedRouter::new(AXLE, "Axle Manual"));
        let model = Arc::new(ScriptedModel::replying(&["답", "답"]));
        let uncached = PipelineConfig {
            cache_document_index: false,
            ..config()
        };
        let pipeline = pipeline(router, store.clone(), model, uncached);

        pipeline.answer_query("액슬").await.unwrap();
        pipeline.answer_query("액슬").await.unwrap();
        assert_eq!(store.metadata_scans(), 2);
    }

    #[tokio::test]
    async fn chunk_count_respects_top_k_and_budget() {
        let store = Arc::new(MemoryCorpus::new(axle_corpus()));
        let router = Arc::new(FixedRouter::new(AXLE, "Axle Manual"));
        let model = Arc::new(ScriptedModel::replying(&["답"]));
        let single = PipelineConfig {
            top_k: 1,
            ..config()
        };
        let result = pipeline(router, store, model, single)
            .answer_query("액슬")
            .await
            .unwrap();
        assert_eq!(result.source_documents.len(), 1);
        assert_eq!(result.image_names, vec!["n1"]);

        let store = Arc::new(MemoryCorpus::new(axle_corpus()));
        let router = Arc::new(FixedRouter::new(AXLE, "Axle Manual"));
        let model = Arc::new(ScriptedModel::replying(&["답"]));
        let budgeted = PipelineConfig {
            max_context_chars: Some(15),
            ..config()
        };
        let result = pipeline(router, store, model.clone(), budgeted)
            .answer_query("액슬")
            .await
            .unwrap();
        assert_eq!(result.source_documents.len(), 1);
        assert!(model.prompts()[0].contains("드라이브 액슬 탈거 절차"));
        assert!(!model.prompts()[0].contains("장착"));
    }

    #[tokio::test]
    async fn selector_output_is_resolved_against_candidates() {
        let store = Arc::new(MemoryCorpus::new(axle_corpus()));
        let router = Arc::new(FixedRouter::new(" 드라이브 샤프트 및 액슬 ", "\"axle manual.pdf\""));
        let model = Arc::new(ScriptedModel::replying(&["답"]));
        let result = pipeline(router, store, model, config())
            .answer_query("액슬")
            .await
            .unwrap();
        assert_eq!(result.section, AXLE);
        assert_eq!(result.document, "Axle Manual");
        assert_eq!(result.source_documents.len(), 2);
    }

    #[tokio::test]
    async fn keyword_router_end_to_end() {
        let store = Arc::new(MemoryCorpus::new(axle_corpus()));
        let model = Arc::new(ScriptedModel::replying(&["문서에 따르면 베어링을 점검합니다."]));
        let result = pipeline(Arc::new(KeywordRouter::new()), store, model, config())
            .answer_query("허브 베어링 점검 방법")
            .await
            .unwrap();
        assert_eq!(result.section, AXLE);
        assert_eq!(result.document, "허브 베어링");
        assert!(result.image_paths.is_empty());
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let store = Arc::new(MemoryCorpus::new(axle_corpus()));
        let router = Arc::new(FixedRouter::new(AXLE, "Axle Manual"));
        let model = Arc::new(ScriptedModel::replying(&[]));
        let err = pipeline(router, store, model, config())
            .answer_query("   ")
            .await
            .unwrap_err();
        assert!(matches!(err, EvManualError::Validation { .. }));
    }

    #[tokio::test]
    async fn document_selection_failure_keeps_section() {
        let store = Arc::new(MemoryCorpus::new(axle_corpus()));
        let router = Arc::new(FixedRouter::failing_document(
            AXLE,
            EvManualError::Network("reset".into()),
        ));
        let model = Arc::new(ScriptedModel::replying(&[]));
        let err = pipeline(router, store.clone(), model.clone(), config())
            .answer_query("액슬 탈거")
            .await
            .unwrap_err();

        let failure = err.as_generation().expect("generation failure");
        assert_eq!(failure.stage, Stage::Document);
        assert_eq!(failure.section.as_deref(), Some(AXLE));
        assert!(failure.document.is_none());
        assert!(store.queries().is_empty());
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn retrieval_failure_keeps_both_decisions() {
        let store = Arc::new(MemoryCorpus::failing_search(axle_corpus(), || {
            EvManualError::Network("embedding service down".into())
        }));
        let router = Arc::new(FixedRouter::new(AXLE, "Axle Manual"));
        let model = Arc::new(ScriptedModel::replying(&[]));
        let err = pipeline(router, store, model.clone(), config())
            .answer_query("액슬 탈거")
            .await
            .unwrap_err();

        let failure = err.as_generation().expect("generation failure");
        assert_eq!(failure.stage, Stage::Retrieval);
        assert_eq!(failure.section.as_deref(), Some(AXLE));
        assert_eq!(failure.document.as_deref(), Some("Axle Manual"));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn storage_errors_are_not_wrapped() {
        let store = Arc::new(MemoryCorpus::failing_search(axle_corpus(), || {
            EvManualError::Storage("database is locked".into())
        }));
        let router = Arc::new(FixedRouter::new(AXLE, "Axle Manual"));
        let model = Arc::new(ScriptedModel::replying(&[]));
        let err = pipeline(router, store, model, config())
            .answer_query("액슬 탈거")
            .await
            .unwrap_err();

        assert!(matches!(err, EvManualError::Storage(_)));
        assert!(err.as_generation().is_none());
    }

    #[tokio::test]
    async fn llm_router_calls_run_in_stage_order() {
        let store = Arc::new(MemoryCorpus::new(vec![
            chunk(AXLE, "허브 베어링", "허브 베어링 점검 기준", &[]),
            chunk(AXLE, "Axle Manual", "드라이브 액슬 탈거 절차", &[]),
        ]));
        let model = Arc::new(ScriptedModel::replying(&[
            AXLE,
            "Axle Manual",
            "문서에 따르면 액슬을 탈거합니다.",
        ]));
        let router = Arc::new(LlmRouter::new(model.clone()));
        let result = pipeline(router, store, model.clone(), config())
            .answer_query("액슬 탈거 방법")
            .await
            .unwrap();

        assert_eq!(result.section, AXLE);
        assert_eq!(result.document, "Axle Manual");
        assert_eq!(result.answer, "문서에 따르면 액슬을 탈거합니다.");

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].contains("가장 관련 있는 섹션"));
        assert!(prompts[0].contains("질문: 액슬 탈거 방법"));
        assert!(prompts[1].contains(&format!("\"{AXLE}\" 섹션의 문서 목록")));
        assert!(prompts[1].contains("Axle Manual\n허브 베어링"));
        assert!(prompts[2].contains("[문서 내용]\n드라이브 액슬 탈거 절차"));
        assert!(!prompts[2].contains("허브 베어링 점검 기준"));
    }

    #[tokio::test]
    async fn unrecognized_section_chunks_never_reach_the_answer() {
        let store = Arc::new(MemoryCorpus::new(vec![
            chunk(AXLE, "Axle Manual", "valid text", &[]),
            chunk("기타", "Axle Manual", "stray text", &[("stray.png", "stray")]),
        ]));
        let router = Arc::new(FixedRouter::new(AXLE, "Axle Manual"));
        let model = Arc::new(ScriptedModel::replying(&["답"]));
        let result = pipeline(router, store, model.clone(), config())
            .answer_query("액슬")
            .await
            .unwrap();

        let sections: Vec<_> = result.source_documents.iter().map(|c| c.section.as_str()).collect();
        assert_eq!(sections, vec![AXLE]);
        assert!(result.image_names.is_empty());
        assert!(!model.prompts()[0].contains("stray text"));
    }

    #[tokio::test]
    async fn oversized_first_chunk_keeps_stored_text() {
        let store = Arc::new(MemoryCorpus::new(axle_corpus()));
        let router = Arc::new(FixedRouter::new(AXLE, "Axle Manual"));
        let model = Arc::new(ScriptedModel::replying(&["답"]));
        let tight = PipelineConfig {
            max_context_chars: Some(5),
            ..config()
        };
        let result = pipeline(router, store, model.clone(), tight)
            .answer_query("액슬")
            .await
            .unwrap();

        assert_eq!(result.source_documents.len(), 1);
        assert_eq!(result.source_documents[0].text, "드라이브 액슬 탈거 절차");
        assert_eq!(result.image_names, vec!["n1"]);
        assert!(model.prompts()[0].contains("[문서 내용]\n드라이브 \n\n[질문]"));
    }

    #[tokio::test]
    async fn zero_budget_keeps_full_context() {
        let store = Arc::new(MemoryCorpus::new(axle_corpus()));
        let router = Arc::new(FixedRouter::new(AXLE, "Axle Manual"));
        let model = Arc::new(ScriptedModel::replying(&["문서에 따르면 탈거 후 장착합니다."]));
        let unbounded = PipelineConfig {
            max_context_chars: Some(0),
            ..config()
        };
        let result = pipeline(router, store, model.clone(), unbounded)
            .answer_query("액슬")
            .await
            .unwrap();

        assert!(!result.refused);
        assert_eq!(result.source_documents.len(), 2);
        assert!(model.prompts()[0].contains("드라이브 액슬 탈거 절차\n\n드라이브 액슬 장착 절차"));
    }

    mod libsql_store {
        use super::*;
        use async_trait::async_trait;
        use evmanual_shared::{Embedder, ImageRef};
        use evmanual_storage::{LibsqlCorpus, NewChunk, Storage};

        /// Two-axis embedding: axle-ness and brake-ness.
        struct AxisEmbedder;

        #[async_trait]
        impl Embedder for AxisEmbedder {
            async fn embed(&self, text: &str) -> Result<Vec<f32>> {
                let axle = text.matches("액슬").count() as f32;
                let brake = text.matches("브레이크").count() as f32;
                Ok(vec![axle, brake, 0.1])
            }
        }

        async fn seeded() -> LibsqlCorpus {
            let path = std::env::temp_dir()
                .join(format!("evm_pipeline_{}.db", uuid::Uuid::now_v7()));
            let storage = Storage::open(&path).await.unwrap();
            let rows = [
                (AXLE, "Axle Manual", "드라이브 액슬 탈거", vec![ImageRef::new("data/images/axle_page0_img0.png", "axle_page0_img0.png")], vec![1.0, 0.0, 0.1]),
                (AXLE, "Axle Manual", "액슬 너트 토크", vec![], vec![0.8, 0.0, 0.1]),
                ("브레이크 시스템", "Brake Pads", "브레이크 패드 교체", vec![], vec![0.0, 1.0, 0.1]),
                ("기타", "Misc", "분류되지 않은 문서", vec![], vec![0.5, 0.5, 0.1]),
            ];
            for (section, document, text, image_refs, embedding) in rows {
                storage
                    .insert_chunk(&NewChunk {
                        text: text.into(),
                        section: section.into(),
                        document: document.into(),
                        source: format!("data/pdfs/{document}.pdf"),
                        image_refs,
                        embedding,
                    })
                    .await
                    .unwrap();
            }
            LibsqlCorpus::new(storage, Arc::new(AxisEmbedder))
        }

        #[tokio::test]
        async fn answers_from_filtered_store_chunks() {
            let store = Arc::new(seeded().await);
            let router = Arc::new(FixedRouter::new(AXLE, "Axle Manual"));
            let model = Arc::new(ScriptedModel::replying(&["문서에 따르면 너트를 먼저 풉니다."]));
            let pipeline = Pipeline::new(router.clone(), store, model, config());

            let result = pipeline.answer_query("액슬 탈거 방법").await.unwrap();

            assert_eq!(router.seen_candidates(), vec![vec!["Axle Manual".to_string()]]);
            assert_eq!(result.source_documents.len(), 2);
            assert!(result.source_documents.iter().all(|c| c.document == "Axle Manual"));
            assert_eq!(result.image_paths, vec!["data/images/axle_page0_img0.png"]);
            assert_eq!(result.image_names, vec!["axle_page0_img0.png"]);
        }

        #[tokio::test]
        async fn unknown_document_refuses_through_store() {
            let store = Arc::new(seeded().await);
            let router = Arc::new(FixedRouter::new(AXLE, "존재하지 않는 문서"));
            let model = Arc::new(ScriptedModel::replying(&[]));
            let result = Pipeline::new(router, store, model, config())
                .answer_query("액슬")
                .await
                .unwrap();
            assert!(result.refused);
            assert!(result.source_documents.is_empty());
        }
    }
}

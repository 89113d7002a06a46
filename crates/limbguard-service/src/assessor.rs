//! Assessment orchestrator: classify, advise, retrieve, assemble.

use std::sync::Arc;

use limbguard_ai::{ClassifyError, EvidenceRetriever, GradeClassifier};
use limbguard_core::{AdviceTable, AssessmentResponse, ConfigError, Settings};
use thiserror::Error;
use tracing::{info, warn};

use crate::capabilities::{Capabilities, ClassifierMode, RetrievalMode};

#[derive(Debug, Error)]
pub enum AssessError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// The blocking classification task panicked or was cancelled.
    #[error("classification worker failed: {0}")]
    Worker(String),
}

/// Composes the classifier, advice table and retriever into one response
/// per image. Read-only after construction; share behind an `Arc`.
pub struct Assessor {
    classifier: Arc<GradeClassifier>,
    advice: AdviceTable,
    retriever: EvidenceRetriever,
    capabilities: Capabilities,
}

impl Assessor {
    pub fn new(
        classifier: GradeClassifier,
        advice: AdviceTable,
        retriever: EvidenceRetriever,
    ) -> Self {
        let capabilities = Capabilities {
            classifier: if classifier.is_demo() {
                ClassifierMode::Demo
            } else {
                ClassifierMode::Live
            },
            retrieval: if retriever.is_enabled() {
                RetrievalMode::Enabled
            } else {
                RetrievalMode::Disabled
            },
        };
        Self {
            classifier: Arc::new(classifier),
            advice,
            retriever,
            capabilities,
        }
    }

    /// Probe the configured artifacts and fix the process modes.
    ///
    /// Missing artifacts degrade the mode. Invalid settings, an incomplete
    /// advice table or an index built for a different embedding width are
    /// fatal.
    pub async fn startup(settings: &Settings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let advice = AdviceTable::standard()?;
        let classifier = GradeClassifier::load(&settings.checkpoint_path, settings.demo_fallback);
        let retriever = detect_retriever(settings).await?;

        let assessor = Self::new(classifier, advice, retriever);
        let caps = assessor.capabilities;
        info!(
            classifier = ?caps.classifier,
            retrieval = ?caps.retrieval,
            modes = %caps,
            "assessment pipeline ready"
        );
        if caps.demo_mode() {
            warn!("DEMO MODE: predictions are simulated from filenames, not image analysis");
        }
        Ok(assessor)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn demo_mode(&self) -> bool {
        self.capabilities.demo_mode()
    }

    /// Assess one uploaded image.
    ///
    /// Only an unreadable image or a failed forward pass is an error.
    /// Retrieval failures are logged and yield no guidance.
    pub async fn assess(
        &self,
        image: Vec<u8>,
        filename: &str,
    ) -> Result<AssessmentResponse, AssessError> {
        let classifier = Arc::clone(&self.classifier);
        let name = filename.to_string();
        let prediction = tokio::task::spawn_blocking(move || classifier.classify(&image, &name))
            .await
            .map_err(|e| AssessError::Worker(e.to_string()))??;

        let advice = self.advice.advise(prediction.label).clone();

        let rag_guidance = match self.retriever.retrieve(prediction.label).await {
            Ok(guidance) => guidance,
            Err(e) => {
                warn!(label = %prediction.label, error = %e, "evidence retrieval failed");
                None
            }
        };

        info!(
            filename,
            label = %prediction.label,
            confidence = ?prediction.confidence,
            guidance = rag_guidance.is_some(),
            "assessed image"
        );
        Ok(AssessmentResponse::assemble(
            prediction,
            self.demo_mode(),
            advice,
            rag_guidance,
        ))
    }
}

#[cfg(all(feature = "onnx", feature = "lancedb"))]
async fn detect_retriever(settings: &Settings) -> Result<EvidenceRetriever, ConfigError> {
    use limbguard_ai::Embedder;
    use limbguard_store::PassageStore;

    use crate::index::LanceIndex;

    let store = match PassageStore::open_existing(&settings.index_dir).await {
        Ok(store) => store,
        Err(e) => {
            warn!(
                path = %settings.index_dir.display(),
                error = %e,
                "reference index unavailable, retrieval disabled"
            );
            return Ok(EvidenceRetriever::disabled());
        }
    };
    let reader = match store.reader().await {
        Ok(reader) => reader,
        Err(e) => {
            warn!(error = %e, "failed to open reference index, retrieval disabled");
            return Ok(EvidenceRetriever::disabled());
        }
    };

    let embedder = match Embedder::load(&settings.embedding_model_dir) {
        Ok(embedder) => embedder,
        Err(e) => {
            warn!(
                path = %settings.embedding_model_dir.display(),
                error = %e,
                "embedding model unavailable, retrieval disabled"
            );
            return Ok(EvidenceRetriever::disabled());
        }
    };

    EvidenceRetriever::enabled(
        Arc::new(embedder),
        Arc::new(LanceIndex::new(reader)),
        settings.top_k,
    )
}

#[cfg(not(all(feature = "onnx", feature = "lancedb")))]
async fn detect_retriever(_settings: &Settings) -> Result<EvidenceRetriever, ConfigError> {
    warn!("built without the `onnx` and `lancedb` features, retrieval disabled");
    Ok(EvidenceRetriever::disabled())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use limbguard_ai::preprocess::PixelTensor;
    use limbguard_ai::{DemoClassifier, LiveClassifier, LogitsModel, PassageIndex, TextEmbedder};
    use limbguard_core::{EvidencePassage, GradeLabel, Urgency};

    pub(crate) fn png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(16, 16, image::Rgb([205, 165, 145]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    struct FixedLogits(Vec<f32>);

    impl LogitsModel for FixedLogits {
        fn logits(&self, _: &PixelTensor) -> anyhow::Result<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    struct ConstEmbedder;

    impl TextEmbedder for ConstEmbedder {
        fn model_name(&self) -> &str {
            "all-MiniLM-L6-v2"
        }

        fn dim(&self) -> usize {
            3
        }

        fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0, 0.0, 1.0]).collect())
        }
    }

    struct CannedIndex {
        passages: Vec<EvidencePassage>,
        fail: bool,
        searches: Mutex<usize>,
    }

    #[async_trait]
    impl PassageIndex for CannedIndex {
        fn dim(&self) -> usize {
            3
        }

        fn embedding_model(&self) -> Option<&str> {
            Some("all-MiniLM-L6-v2")
        }

        async fn search(&self, _: &[f32], limit: usize) -> anyhow::Result<Vec<EvidencePassage>> {
            *self.searches.lock().unwrap() += 1;
            if self.fail {
                anyhow::bail!("lance fragment missing");
            }
            Ok(self.passages.iter().take(limit).cloned().collect())
        }
    }

    fn canned(fail: bool) -> Arc<CannedIndex> {
        Arc::new(CannedIndex {
            passages: vec![EvidencePassage {
                text: "Offload pressure and debride necrotic tissue.".into(),
                source: "wagner.txt".into(),
                score: 0.8,
            }],
            fail,
            searches: Mutex::new(0),
        })
    }

    pub(crate) fn demo_assessor() -> Assessor {
        Assessor::new(
            GradeClassifier::Demo(DemoClassifier::new()),
            AdviceTable::standard().unwrap(),
            EvidenceRetriever::disabled(),
        )
    }

    fn with_index(classifier: GradeClassifier, index: Arc<CannedIndex>) -> Assessor {
        Assessor::new(
            classifier,
            AdviceTable::standard().unwrap(),
            EvidenceRetriever::enabled(Arc::new(ConstEmbedder), index, 3).unwrap(),
        )
    }

    #[tokio::test]
    async fn demo_grade2_by_filename() {
        let assessor = demo_assessor();
        let r = assessor.assess(png(), "grade2_test.jpg").await.unwrap();
        assert!(r.success);
        assert!(r.demo_mode);
        assert_eq!(r.classification, GradeLabel::Grade2);
        assert_eq!(r.display_name, "Grade 2");
        assert_eq!(r.advice.urgency, Some(Urgency::Moderate));
        assert!(r.advice.sugar_maintenance.is_none());
        assert!(r.confidence.is_none());
    }

    #[tokio::test]
    async fn demo_unmatched_filename_is_normal() {
        let r = demo_assessor().assess(png(), "foot.jpg").await.unwrap();
        assert_eq!(r.classification, GradeLabel::Normal);
        assert!(r.advice.sugar_maintenance.is_some());
        assert!(r.advice.skin_care.is_some());
        assert!(r.advice.footwear.is_some());
        assert!(r.advice.scheduling.is_some());
        assert!(r.rag_guidance.is_none());
    }

    #[tokio::test]
    async fn live_checkpoint_ignores_filename() {
        let live = GradeClassifier::Live(LiveClassifier::new(Box::new(FixedLogits(vec![
            5.0, 0.1, 0.1, 0.1, 0.1,
        ]))));
        let assessor = Assessor::new(
            live,
            AdviceTable::standard().unwrap(),
            EvidenceRetriever::disabled(),
        );
        let r = assessor.assess(png(), "grade4_severe.jpg").await.unwrap();
        assert!(!r.demo_mode);
        assert_eq!(r.classification, GradeLabel::Normal);
        assert!(r.confidence.unwrap() > 0.9);
        assert_eq!(assessor.capabilities().classifier, ClassifierMode::Live);
    }

    #[tokio::test]
    async fn missing_index_means_no_guidance() {
        let assessor = demo_assessor();
        for name in ["grade1.jpg", "grade2.jpg", "grade3.jpg", "grade4.jpg"] {
            let r = assessor.assess(png(), name).await.unwrap();
            assert!(r.classification.is_abnormal());
            assert!(r.rag_guidance.is_none(), "{name}");
        }
        assert_eq!(assessor.capabilities().retrieval, RetrievalMode::Disabled);
    }

    #[tokio::test]
    async fn abnormal_label_gets_guidance() {
        let assessor = with_index(GradeClassifier::Demo(DemoClassifier::new()), canned(false));
        let r = assessor.assess(png(), "grade3.jpg").await.unwrap();
        let guidance = r.rag_guidance.unwrap();
        assert!(guidance.starts_with("Evidence-based guidance for Grade 3:"));
        assert!(guidance.contains("debride necrotic tissue"));
        assert!(assessor.capabilities().rag_enabled());
    }

    #[tokio::test]
    async fn normal_label_skips_retrieval() {
        let index = canned(false);
        let assessor = with_index(GradeClassifier::Demo(DemoClassifier::new()), index.clone());
        let r = assessor.assess(png(), "healthy.jpg").await.unwrap();
        assert!(r.rag_guidance.is_none());
        assert_eq!(*index.searches.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn retrieval_failure_is_absorbed() {
        let assessor = with_index(GradeClassifier::Demo(DemoClassifier::new()), canned(true));
        let r = assessor.assess(png(), "grade4.jpg").await.unwrap();
        assert_eq!(r.classification, GradeLabel::Grade4);
        assert!(r.rag_guidance.is_none());
    }

    #[tokio::test]
    async fn invalid_image_propagates() {
        let err = demo_assessor()
            .assess(b"plain text".to_vec(), "grade2.jpg")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AssessError::Classify(ClassifyError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn demo_flag_is_process_wide() {
        let assessor = demo_assessor();
        for name in ["normal.jpg", "grade1.jpg", "anything.png"] {
            assert!(assessor.assess(png(), name).await.unwrap().demo_mode);
        }
    }

    #[tokio::test]
    async fn startup_without_artifacts_degrades() {
        let tmp = tempfile::TempDir::new().unwrap();
        let settings = Settings {
            checkpoint_path: tmp.path().join("vit.onnx"),
            embedding_model_dir: tmp.path().join("model"),
            index_dir: tmp.path().join("lancedb"),
            ..Settings::default()
        };
        let assessor = Assessor::startup(&settings).await.unwrap();
        assert_eq!(
            assessor.capabilities(),
            Capabilities {
                classifier: ClassifierMode::Demo,
                retrieval: RetrievalMode::Disabled,
            }
        );
    }

    #[tokio::test]
    async fn startup_rejects_invalid_settings() {
        let settings = Settings {
            top_k: 0,
            ..Settings::default()
        };
        assert!(matches!(
            Assessor::startup(&settings).await,
            Err(ConfigError::InvalidSetting { field: "top_k", .. })
        ));
    }

    #[tokio::test]
    async fn startup_honours_demo_fallback() {
        let tmp = tempfile::TempDir::new().unwrap();
        let settings = Settings {
            checkpoint_path: tmp.path().join("vit.onnx"),
            index_dir: tmp.path().join("lancedb"),
            demo_fallback: GradeLabel::Grade1,
            ..Settings::default()
        };
        let assessor = Assessor::startup(&settings).await.unwrap();
        let r = assessor.assess(png(), "foot.jpg").await.unwrap();
        assert_eq!(r.classification, GradeLabel::Grade1);
    }
}

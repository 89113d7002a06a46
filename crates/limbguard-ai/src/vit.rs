//! ONNX Runtime backend for the fine-tuned ViT grade classifier.
//!
//! The checkpoint is an ONNX export of `google/vit-base-patch16-224-in21k`
//! with a five-way head. Input `pixel_values` is `[1, 3, 224, 224]`; the first
//! output holds the logits `[1, 5]`.

use std::path::Path;
use std::sync::Mutex;

use limbguard_core::GradeLabel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::info;

use crate::classifier::LogitsModel;
use crate::embedder::infer_dim;
use crate::preprocess::PixelTensor;

pub struct VitModel {
    // `Session::run` needs exclusive access.
    session: Mutex<Session>,
}

impl VitModel {
    /// Load a checkpoint, rejecting models whose head does not emit one logit per label.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        anyhow::ensure!(path.exists(), "checkpoint not found: {path:?}");

        let session = Session::builder()?.commit_from_file(path)?;

        if let Some(classes) = infer_dim(session.outputs()[0].dtype()) {
            anyhow::ensure!(
                classes == GradeLabel::COUNT,
                "checkpoint head has {classes} classes, expected {}",
                GradeLabel::COUNT
            );
        }

        info!(model = %path.display(), "loaded ViT classifier");
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl LogitsModel for VitModel {
    fn logits(&self, pixels: &PixelTensor) -> anyhow::Result<Vec<f32>> {
        let input = Tensor::from_array((pixels.shape(), pixels.data.clone().into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("classifier session lock poisoned"))?;
        let outputs = session.run(ort::inputs!["pixel_values" => input])?;

        let (output_shape, output_data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: &[i64] = output_shape;
        anyhow::ensure!(
            dims.last().copied() == Some(GradeLabel::COUNT as i64),
            "unexpected output shape: {dims:?}, expected [1, {}]",
            GradeLabel::COUNT
        );

        Ok(output_data[..GradeLabel::COUNT].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::classifier::{GradeClassifier, LiveClassifier};
    use crate::preprocess::tests::png;

    fn checkpoint() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("checkpoints")
            .join("vit_classifier.onnx")
    }

    #[test]
    #[ignore = "requires checkpoints/vit_classifier.onnx exported from the training run"]
    fn live_checkpoint_classifies() {
        let path = checkpoint();
        let model = VitModel::load(&path).unwrap();
        let live = LiveClassifier::new(Box::new(model));
        let p = live.classify(&png(300, 200, [200, 160, 140])).unwrap();
        assert!(!p.demo_mode);
        let conf = p.confidence.unwrap();
        assert!((0.0..=1.0).contains(&conf));

        let clf = GradeClassifier::load(&path, GradeLabel::Normal);
        assert!(!clf.is_demo());
    }

    #[test]
    fn missing_checkpoint_fails_to_load() {
        assert!(VitModel::load(Path::new("/nonexistent/vit.onnx")).is_err());
    }
}

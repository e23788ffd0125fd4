use anyhow::{bail, Context, Result};
use ndarray::ArrayViewD;
use opencv::core::Mat;
use opencv::prelude::*;
use ort::session::Session;
use ort::value::Tensor;
use tracing::debug;

use crate::config::DetectorConfig;
use crate::pose::backend;
use crate::pose::keypoint::{Keypoint, KeypointIndex, Pose};
use crate::pose::preprocess;

/// 対応モデルファミリ。前処理と出力デコードはファミリごとに完結させ、
/// 分岐間のフォールスルーを型で排除する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    MoveNet,
    SpinePose,
    Rtmw3d,
}

/// モデルIDを (ONNXファイルパス, ファミリ) に解決する。
/// 未知のIDは設定エラーとして上位で致命扱いになる。
pub fn resolve_model(id: &str) -> Result<(&'static str, ModelFamily)> {
    Ok(match id {
        "movenet_lightning" => ("models/movenet_lightning.onnx", ModelFamily::MoveNet),
        "movenet_thunder" => ("models/movenet_thunder.onnx", ModelFamily::MoveNet),
        "spinepose_small" => ("models/spinepose_small.onnx", ModelFamily::SpinePose),
        "spinepose_medium" => ("models/spinepose_medium.onnx", ModelFamily::SpinePose),
        "rtmw3d" => ("models/rtmw3d-x.onnx", ModelFamily::Rtmw3d),
        other => bail!("unknown model id: {other}"),
    })
}

/// SimCC出力1行分のargmax
fn simcc_argmax(view: &ArrayViewD<f32>, row: usize, bins: usize) -> (usize, f32) {
    let mut best_val = f32::NEG_INFINITY;
    let mut best_idx = 0usize;
    for j in 0..bins {
        let v = view[[0, row, j]];
        if v > best_val {
            best_val = v;
            best_idx = j;
        }
    }
    (best_idx, best_val)
}

/// ONNX姿勢検出器。セッションの所有者はライフサイクル管理側のスロット。
pub struct PoseDetector {
    session: Session,
    family: ModelFamily,
    max_poses: usize,
    mirror: bool,
}

impl PoseDetector {
    pub fn from_config(config: &DetectorConfig) -> Result<Self> {
        let (model_path, family) = resolve_model(&config.model)?;
        let session = backend::session_builder(config)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load ONNX model: {model_path}"))?;
        debug!(model = %config.model, backend = %config.backend, "detector ready");

        Ok(Self {
            session,
            family,
            max_poses: config.max_poses.max(1),
            mirror: config.mirror,
        })
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    /// 推論オプションのみの変更。セッション再構築は不要。
    pub fn set_options(&mut self, max_poses: usize, mirror: bool) {
        self.max_poses = max_poses.max(1);
        self.mirror = mirror;
    }

    /// 1フレームから姿勢列を推定する
    pub fn estimate(&mut self, frame: &Mat) -> Result<Vec<Pose>> {
        let pose = match self.family {
            ModelFamily::MoveNet => self.estimate_movenet(frame)?,
            ModelFamily::SpinePose => self.estimate_spinepose(frame)?,
            ModelFamily::Rtmw3d => self.estimate_rtmw3d(frame)?,
        };

        // 現行ファミリはいずれも単一人物モデル
        let mut poses = vec![pose];
        poses.truncate(self.max_poses);
        if self.mirror {
            for pose in poses.iter_mut() {
                pose.mirror_x();
            }
        }
        Ok(poses)
    }

    /// 黒画像で1回推論し、初回レイテンシの外れ値を避ける
    pub fn warm_up(&mut self, width: i32, height: i32) -> Result<()> {
        let black = Mat::zeros(height, width, opencv::core::CV_8UC3)
            .context("Failed to allocate warm-up frame")?
            .to_mat()?;
        self.estimate(&black)?;
        Ok(())
    }

    fn estimate_movenet(&mut self, frame: &Mat) -> Result<Pose> {
        let input = preprocess::preprocess_for_movenet(frame)?;
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs!["serving_default_input_0" => input_tensor])
            .context("Inference failed")?;

        // 出力は [1, 1, 17, 3] (y, x, confidence)
        let output: ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
            .try_extract_array()
            .context("Failed to extract output tensor")?;

        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        for i in 0..KeypointIndex::COUNT {
            let y = output[[0, 0, i, 0]];
            let x = output[[0, 0, i, 1]];
            let confidence = output[[0, 0, i, 2]];
            keypoints[i] = Keypoint::new(x, y, confidence);
        }
        Ok(Pose::new(keypoints))
    }

    fn estimate_spinepose(&mut self, frame: &Mat) -> Result<Pose> {
        let input = preprocess::preprocess_for_spinepose(frame)?;
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs!["input" => input_tensor])
            .context("Inference failed")?;
        let simcc_x: ArrayViewD<f32> = outputs["simcc_x"]
            .try_extract_array()
            .context("Failed to extract simcc_x")?;
        let simcc_y: ArrayViewD<f32> = outputs["simcc_y"]
            .try_extract_array()
            .context("Failed to extract simcc_y")?;

        let (input_w, input_h) = preprocess::SPINEPOSE_INPUT_SIZE;
        const SIMCC_SPLIT_RATIO: f32 = 2.0;

        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        for i in 0..KeypointIndex::COUNT {
            let (x_idx, x_val) = simcc_argmax(&simcc_x, i, (input_w as f32 * SIMCC_SPLIT_RATIO) as usize);
            let (y_idx, y_val) = simcc_argmax(&simcc_y, i, (input_h as f32 * SIMCC_SPLIT_RATIO) as usize);

            let x = x_idx as f32 / (SIMCC_SPLIT_RATIO * input_w as f32);
            let y = y_idx as f32 / (SIMCC_SPLIT_RATIO * input_h as f32);
            // SimCCのlogit平均をシグモイドで0-1の信頼度に潰す
            let avg_logit = (x_val + y_val) / 2.0;
            let confidence = 1.0 / (1.0 + (-avg_logit).exp());
            keypoints[i] = Keypoint::new(x, y, confidence);
        }
        Ok(Pose::new(keypoints))
    }

    fn estimate_rtmw3d(&mut self, frame: &Mat) -> Result<Pose> {
        let input = preprocess::preprocess_for_rtmw3d(frame)?;
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs!["input" => input_tensor])
            .context("Inference failed")?;
        let simcc_x: ArrayViewD<f32> = outputs["output"]
            .try_extract_array()
            .context("Failed to extract simcc_x")?;
        let simcc_y: ArrayViewD<f32> = outputs["1554"]
            .try_extract_array()
            .context("Failed to extract simcc_y")?;
        let simcc_z: ArrayViewD<f32> = outputs["1556"]
            .try_extract_array()
            .context("Failed to extract simcc_z")?;

        const SIMCC_SPLIT_RATIO: f32 = 2.0;
        const MODEL_W: f32 = 288.0;
        const MODEL_H: f32 = 384.0;
        const Z_RANGE: f32 = 2.1744869;

        // 先頭17点がCOCO本体キーポイント。残り(顔・手など)は使わない。
        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        for i in 0..KeypointIndex::COUNT {
            let (x_idx, x_val) = simcc_argmax(&simcc_x, i, (MODEL_W * SIMCC_SPLIT_RATIO) as usize);
            let (y_idx, y_val) = simcc_argmax(&simcc_y, i, (MODEL_H * SIMCC_SPLIT_RATIO) as usize);
            let (z_idx, _z_val) = simcc_argmax(&simcc_z, i, (MODEL_W * SIMCC_SPLIT_RATIO) as usize);

            let x = x_idx as f32 / SIMCC_SPLIT_RATIO / MODEL_W;
            let y = y_idx as f32 / SIMCC_SPLIT_RATIO / MODEL_H;
            let z_raw = z_idx as f32 / SIMCC_SPLIT_RATIO;
            let z = (z_raw / (MODEL_H / 2.0) - 1.0) * Z_RANGE;

            let confidence = x_val.min(y_val).max(0.0);
            keypoints[i] = Keypoint::new_3d(x, y, z, confidence);
        }
        Ok(Pose::new(keypoints))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_model_families() {
        assert_eq!(resolve_model("movenet_lightning").unwrap().1, ModelFamily::MoveNet);
        assert_eq!(resolve_model("movenet_thunder").unwrap().1, ModelFamily::MoveNet);
        assert_eq!(resolve_model("spinepose_small").unwrap().1, ModelFamily::SpinePose);
        assert_eq!(resolve_model("spinepose_medium").unwrap().1, ModelFamily::SpinePose);
        assert_eq!(resolve_model("rtmw3d").unwrap().1, ModelFamily::Rtmw3d);
    }

    #[test]
    fn test_resolve_model_variant_paths_differ() {
        let (lightning, _) = resolve_model("movenet_lightning").unwrap();
        let (thunder, _) = resolve_model("movenet_thunder").unwrap();
        assert_ne!(lightning, thunder);
    }

    #[test]
    fn test_resolve_model_unknown_is_error() {
        assert!(resolve_model("posenet").is_err());
        assert!(resolve_model("").is_err());
    }
}

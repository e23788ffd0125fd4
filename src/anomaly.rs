use std::collections::HashMap;
use std::time::Instant;

use crate::pose::{KeypointIndex, Pose};

/// 急変監視の対象キーポイント(体幹と鼻)。四肢は誤検出が多いため対象外。
pub const MONITORED_KEYPOINTS: [KeypointIndex; 5] = [
    KeypointIndex::LeftShoulder,
    KeypointIndex::RightShoulder,
    KeypointIndex::LeftHip,
    KeypointIndex::RightHip,
    KeypointIndex::Nose,
];

/// 信頼度ゲート。これ以下のキーポイントは状態を更新せず黙ってスキップする。
pub const SCORE_GATE: f32 = 0.7;

/// ばらつき差の急変しきい値
pub const DISPERSION_THRESHOLD: f32 = 0.65;

/// 算術平均
pub fn mean(values: &[f32]) -> f32 {
    values.iter().sum::<f32>() / values.len() as f32
}

/// 母標準偏差
pub fn std_deviation(values: &[f32]) -> f32 {
    let m = mean(values);
    let avg_square_diff = values
        .iter()
        .map(|v| {
            let diff = v - m;
            diff * diff
        })
        .sum::<f32>()
        / values.len() as f32;
    avg_square_diff.sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Anomaly,
    Normal,
}

impl MotionState {
    pub fn label(self) -> &'static str {
        match self {
            MotionState::Anomaly => "急変検出",
            MotionState::Normal => "平常",
        }
    }
}

/// 1キーポイント分の判定結果。表示が終われば破棄されるその場限りの値。
#[derive(Debug, Clone, Copy)]
pub struct MotionEvent {
    pub keypoint: KeypointIndex,
    pub std_dev: f32,
    pub mean: f32,
    pub state: MotionState,
    pub at: Instant,
}

/// 判定: 前回ばらつきとの差がしきい値以上なら急変
fn classify(std_dev: f32, last_std_dev: f32) -> MotionState {
    if (std_dev - last_std_dev).abs() >= DISPERSION_THRESHOLD {
        MotionState::Anomaly
    } else {
        MotionState::Normal
    }
}

/// キーポイントごとのばらつき監視。
///
/// 状態はキーポイント名単位の「前回値キャッシュ」であり、移動窓ではない。
/// ゲートを通らなかったフレームでは古い値がそのまま残り、
/// 次にゲートを通ったサンプルと比較される(フレーム間隔は問わない)。
#[derive(Debug, Default)]
pub struct MotionMonitor {
    last_std_dev: HashMap<KeypointIndex, f32>,
}

impl MotionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1ティック分の姿勢列を観測し、対象キーポイントごとに判定結果を返す。
    ///
    /// 判定の有無によらず、ゲートを通ったキーポイントの前回値は
    /// 今回のばらつきで常に上書きされる。
    pub fn observe(&mut self, poses: &[Pose], now: Instant) -> Vec<MotionEvent> {
        let mut events = Vec::new();

        for pose in poses {
            for (i, kp) in pose.keypoints.iter().enumerate() {
                let Some(index) = KeypointIndex::from_index(i) else {
                    continue;
                };
                if !MONITORED_KEYPOINTS.contains(&index) {
                    continue;
                }
                if kp.confidence <= SCORE_GATE {
                    continue;
                }

                // 各軸の絶対値を独立に扱う(合成ノルムではない)
                let norms = [kp.x.abs(), kp.y.abs(), kp.z.abs()];
                let std_dev = std_deviation(&norms);
                let mean = mean(&norms);

                let last = self.last_std_dev.get(&index).copied().unwrap_or(0.0);
                let state = classify(std_dev, last);
                self.last_std_dev.insert(index, std_dev);

                events.push(MotionEvent {
                    keypoint: index,
                    std_dev,
                    mean,
                    state,
                    at: now,
                });
            }
        }

        events
    }

    /// 保存中の前回ばらつき(未観測なら0)
    pub fn last_dispersion(&self, index: KeypointIndex) -> f32 {
        self.last_std_dev.get(&index).copied().unwrap_or(0.0)
    }

    pub fn reset(&mut self) {
        self.last_std_dev.clear();
    }
}

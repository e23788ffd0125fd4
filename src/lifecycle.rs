use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::config::DetectorConfig;
use crate::pose::PoseDetector;

/// 再構成要求の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SwapDisposition {
    /// 現在の構成と同一。何もしない
    Unchanged,
    /// 推論オプションのみの変更。セッションはそのまま
    InPlace,
    /// モデル・バックエンド・実行フラグの変更。再構築が必要
    Swap,
}

pub(crate) fn swap_disposition(current: &DetectorConfig, next: &DetectorConfig) -> SwapDisposition {
    if next == current {
        SwapDisposition::Unchanged
    } else if next.requires_swap(current) {
        SwapDisposition::Swap
    } else {
        SwapDisposition::InPlace
    }
}

/// スロットの状態。Swapping の間、スロットは生きたセッションを持たない。
enum SlotState {
    Ready(PoseDetector),
    Swapping,
}

/// 検出器のライフサイクルを司る単一スロット。
///
/// 生きたセッションは常に高々ひとつ。スワップは「旧を解放→新を構築」を
/// ひとつの論理ステップとして行い、破棄済みインスタンスを指したままの
/// 状態を外に見せない。
///
/// 構築失敗は致命的エラーとして呼び出し側へ返す。旧セッションは既に
/// 解放済みなので、前のモデルへのフォールバックはしない。
pub struct DetectorSlot {
    state: SlotState,
    current: DetectorConfig,
    pending: Option<DetectorConfig>,
}

impl DetectorSlot {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        let detector = PoseDetector::from_config(&config)
            .with_context(|| format!("検出器の初期化に失敗 (model={})", config.model))?;
        Ok(Self {
            state: SlotState::Ready(detector),
            current: config,
            pending: None,
        })
    }

    /// 再構成要求を受け付ける。
    ///
    /// オプションのみの変更はその場で適用し、スワップが必要な変更だけを
    /// 保留に積む。保留は次の reconcile まで上書きされうる(最後の要求が勝つ)。
    pub fn request(&mut self, next: DetectorConfig) {
        match swap_disposition(&self.current, &next) {
            SwapDisposition::Unchanged => {}
            SwapDisposition::InPlace => {
                if let SlotState::Ready(detector) = &mut self.state {
                    detector.set_options(next.max_poses, next.mirror);
                }
                debug!(max_poses = next.max_poses, mirror = next.mirror, "detector options updated");
                self.current = next;
            }
            SwapDisposition::Swap => {
                info!(model = %next.model, backend = %next.backend, "detector swap requested");
                self.pending = Some(next);
            }
        }
    }

    /// スワップ要求が保留中か。保留中に旧モデルで計算した結果を
    /// 描画してはならない(パイプライン側が描画前に確認する)。
    pub fn swap_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.current
    }

    /// 保留中の再構成を適用する。毎ティックの先頭、推論を発行する前に呼ぶこと。
    /// この順序が「破棄済みハンドルへ推論を発行しない」ことを保証する。
    pub fn reconcile(&mut self) -> Result<bool> {
        let Some(next) = self.pending.take() else {
            return Ok(false);
        };

        // 旧セッションを先に解放する(GPUメモリの二重確保を避ける)
        self.state = SlotState::Swapping;

        if next.requires_backend_reconfigure(&self.current) {
            // バックエンド・実行フラグはセッション構築時に再適用される。
            // プロバイダ初期化を含むため時間がかかることがある。
            info!(backend = %next.backend, intra_threads = next.intra_threads,
                "reapplying backend configuration");
        }

        let detector = PoseDetector::from_config(&next)
            .with_context(|| format!("検出器の再構築に失敗 (model={})", next.model))?;

        self.state = SlotState::Ready(detector);
        self.current = next;
        Ok(true)
    }

    /// 現在の検出器。Swapping 中のアクセスは呼び出し順序のバグ。
    pub fn detector_mut(&mut self) -> Result<&mut PoseDetector> {
        match &mut self.state {
            SlotState::Ready(detector) => Ok(detector),
            SlotState::Swapping => bail!("detector slot is mid-swap"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_unchanged() {
        let a = DetectorConfig::default();
        assert_eq!(swap_disposition(&a, &a.clone()), SwapDisposition::Unchanged);
    }

    #[test]
    fn test_disposition_in_place_for_options() {
        let a = DetectorConfig::default();
        let mut b = a.clone();
        b.mirror = true;
        assert_eq!(swap_disposition(&a, &b), SwapDisposition::InPlace);

        let mut c = a.clone();
        c.max_poses = 3;
        assert_eq!(swap_disposition(&a, &c), SwapDisposition::InPlace);
    }

    #[test]
    fn test_disposition_swap_for_model_backend_flags() {
        let a = DetectorConfig::default();

        let mut b = a.clone();
        b.model = "spinepose_small".to_string();
        assert_eq!(swap_disposition(&a, &b), SwapDisposition::Swap);

        let mut c = a.clone();
        c.backend = "cuda".to_string();
        assert_eq!(swap_disposition(&a, &c), SwapDisposition::Swap);

        let mut d = a.clone();
        d.intra_threads = 2;
        assert_eq!(swap_disposition(&a, &d), SwapDisposition::Swap);
    }

    #[test]
    fn test_disposition_swap_wins_over_options() {
        // モデル変更とオプション変更が同時でも再構築側に倒す
        let a = DetectorConfig::default();
        let mut b = a.clone();
        b.model = "rtmw3d".to_string();
        b.mirror = true;
        assert_eq!(swap_disposition(&a, &b), SwapDisposition::Swap);
    }
}

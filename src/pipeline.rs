use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::debug;

use crate::anomaly::MotionMonitor;
use crate::camera::FrameSource;
use crate::config::Config;
use crate::display::DisplayArbiter;
use crate::lifecycle::DetectorSlot;
use crate::render::{FpsPanel, Key, MinifbRenderer, StatusPanel};
use crate::stats::InferenceStats;

/// デバッグ描画の信頼度しきい値
const RENDER_CONFIDENCE_THRESHOLD: f32 = 0.3;

/// [M]キーで巡回するモデルの順序
const MODEL_CYCLE: [&str; 5] = [
    "movenet_lightning",
    "movenet_thunder",
    "spinepose_small",
    "spinepose_medium",
    "rtmw3d",
];

fn next_model(current: &str) -> &'static str {
    let pos = MODEL_CYCLE.iter().position(|&m| m == current).unwrap_or(0);
    MODEL_CYCLE[(pos + 1) % MODEL_CYCLE.len()]
}

/// フレームパイプライン本体。
///
/// 単一スレッドの固定レートループで、1ティックにつき
/// 再構成の適用 → 終端判定 → 推論 → 急変監視 → 表示調停 → 描画
/// を順に行う。推論は常に高々1件しか飛ばない。
pub fn run(config: &Config) -> Result<()> {
    let mut source =
        FrameSource::open(&config.app, &config.camera).context("入力ソースを開けません")?;
    let (width, height) = source.resolution();
    println!("入力: {}x{}", width, height);

    let mut slot = DetectorSlot::new(config.detector.clone())?;
    slot.detector_mut()?
        .warm_up(width as i32, height as i32)
        .context("ウォームアップに失敗")?;
    println!("モデル準備完了 ({})", slot.config().model);

    let mut renderer = if config.debug.view {
        Some(MinifbRenderer::new(
            "mimamori",
            width as usize,
            height as usize,
        )?)
    } else {
        None
    };

    let mut monitor = MotionMonitor::new();
    let mut arbiter = DisplayArbiter::new();
    let mut stats = InferenceStats::new();
    let mut status_panel = StatusPanel::new();
    let mut fps_panel = FpsPanel::new();

    let frame_duration = Duration::from_secs_f64(1.0 / config.app.target_fps.max(1) as f64);

    loop {
        let loop_start = Instant::now();

        if let Some(ref r) = renderer {
            if !r.is_open() {
                break;
            }
        }

        // 保留中の再構成を推論より先に適用する。
        // この順序が「破棄済みセッションへの推論」を構造的に防ぐ。
        // 再構築の失敗は致命的(旧セッションは解放済みで戻せない)。
        if slot.reconcile()? {
            slot.detector_mut()?
                .warm_up(width as i32, height as i32)
                .context("切替後のウォームアップに失敗")?;
            println!("モデル切替完了 ({})", slot.config().model);
        }

        // 終端シグナル: エラーではなく正常終了
        let Some(frame) = source.next_frame()? else {
            status_panel.show_note("再生終了");
            if let Some(ref mut r) = renderer {
                r.clear()?;
            }
            break;
        };

        // FPSは推論時間のみを数える
        let token = stats.begin();
        let poses = slot.detector_mut()?.estimate(&frame)?;
        stats.end(token);
        if let Some(fps) = stats.maybe_flush(Instant::now()) {
            fps_panel.update(fps);
        }

        // 再構成キーは推論結果を持った状態で拾う。この時点で要求が入ると
        // 下の描画ゲートが今ティックの(旧モデルの)結果を落とす。
        if let Some(ref r) = renderer {
            if r.is_key_pressed(Key::M) {
                let mut next = slot.config().clone();
                next.model = next_model(&next.model).to_string();
                println!("モデル切替要求: {}", next.model);
                slot.request(next);
            }
            if cfg!(feature = "cuda") && r.is_key_pressed(Key::B) {
                let mut next = slot.config().clone();
                next.backend = if next.backend == "cpu" { "cuda" } else { "cpu" }.to_string();
                println!("バックエンド切替要求: {}", next.backend);
                slot.request(next);
            }
            if r.is_key_pressed(Key::F) {
                let mut next = slot.config().clone();
                next.mirror = !next.mirror;
                slot.request(next);
            }
        }

        let now = Instant::now();
        let events = monitor.observe(&poses, now);
        if let Some(message) = arbiter.decide(&events, now) {
            status_panel.show(&message);
        }

        if let Some(ref mut r) = renderer {
            r.draw_frame(&frame)?;
            // スワップ要求が保留中なら、旧モデルで計算した姿勢は描かない
            if !poses.is_empty() && !slot.swap_pending() {
                r.draw_poses(&poses, RENDER_CONFIDENCE_THRESHOLD);
            } else if slot.swap_pending() {
                debug!("dropping stale poses (swap pending)");
            }
            r.update()?;
        }

        // 次ティックまで待つ(固定レート。spin wait for precision)
        while loop_start.elapsed() < frame_duration {
            std::hint::spin_loop();
        }
    }

    println!("Shutting down...");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_cycle_wraps() {
        assert_eq!(next_model("movenet_lightning"), "movenet_thunder");
        assert_eq!(next_model("rtmw3d"), "movenet_lightning");
    }

    #[test]
    fn test_model_cycle_unknown_falls_back() {
        // 未知のIDでも先頭からの巡回に戻るだけでパニックしない
        assert_eq!(next_model("posenet"), "movenet_thunder");
    }

    #[test]
    fn test_model_cycle_ids_resolve() {
        for id in MODEL_CYCLE {
            assert!(crate::pose::resolve_model(id).is_ok(), "id={id}");
        }
    }
}

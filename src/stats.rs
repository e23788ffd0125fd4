use std::time::{Duration, Instant};

/// FPSパネルの更新間隔
const PANEL_UPDATE_INTERVAL: Duration = Duration::from_millis(1000);

/// begin/end を対で使うための計測トークン
#[must_use]
#[derive(Debug)]
pub struct InferenceToken {
    started: Instant,
}

/// 推論レイテンシの積算からFPSを算出するトラッカー。
///
/// フラッシュ間隔内の平均推論時間を1秒あたりの回数に換算する。
/// カウント0のときはフラッシュしない(ゼロ除算ガード)。
#[derive(Debug, Default)]
pub struct InferenceStats {
    latency_sum_ms: f64,
    count: u32,
    last_flush: Option<Instant>,
}

impl InferenceStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 推論開始を記録する。返ったトークンは必ず end に渡すこと。
    pub fn begin(&self) -> InferenceToken {
        InferenceToken {
            started: Instant::now(),
        }
    }

    /// 推論終了。経過時間を積算しカウントを進める。
    pub fn end(&mut self, token: InferenceToken) {
        self.latency_sum_ms += token.started.elapsed().as_secs_f64() * 1000.0;
        self.count += 1;
    }

    /// 前回フラッシュから1秒以上経っていれば平均推論時間からFPSを返し、
    /// 積算をリセットする。それ以外は None。
    pub fn maybe_flush(&mut self, now: Instant) -> Option<f32> {
        if self.count == 0 {
            return None;
        }
        let due = match self.last_flush {
            Some(t) => now.saturating_duration_since(t) >= PANEL_UPDATE_INTERVAL,
            None => true,
        };
        if !due {
            return None;
        }

        let average_ms = self.latency_sum_ms / self.count as f64;
        self.latency_sum_ms = 0.0;
        self.count = 0;
        self.last_flush = Some(now);
        Some((1000.0 / average_ms) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_no_flush_without_samples() {
        let mut stats = InferenceStats::new();
        assert!(stats.maybe_flush(Instant::now()).is_none());
    }

    #[test]
    fn test_first_flush_immediate() {
        let mut stats = InferenceStats::new();
        let token = stats.begin();
        thread::sleep(Duration::from_millis(2));
        stats.end(token);

        // 初回はフラッシュ履歴が無いので即座に出る
        let fps = stats.maybe_flush(Instant::now());
        assert!(fps.is_some());
        assert!(fps.unwrap() > 0.0);
    }

    #[test]
    fn test_flush_resets_accumulator() {
        let mut stats = InferenceStats::new();
        let token = stats.begin();
        thread::sleep(Duration::from_millis(2));
        stats.end(token);

        let now = Instant::now();
        assert!(stats.maybe_flush(now).is_some());
        // リセット後はサンプルが無いので、窓が開いていてもNone
        assert!(stats.maybe_flush(now + Duration::from_secs(5)).is_none());
    }

    #[test]
    fn test_flush_rate_limited_to_window() {
        let mut stats = InferenceStats::new();

        let token = stats.begin();
        stats.end(token);
        let t0 = Instant::now();
        assert!(stats.maybe_flush(t0).is_some());

        // 窓内の再フラッシュはサンプルがあってもNone
        let token = stats.begin();
        stats.end(token);
        assert!(stats.maybe_flush(t0 + Duration::from_millis(500)).is_none());

        // 1秒経過で出る
        assert!(stats.maybe_flush(t0 + Duration::from_millis(1000)).is_some());
    }

    #[test]
    fn test_fps_matches_average_latency() {
        let mut stats = InferenceStats::new();
        // 約10msの推論を3回
        for _ in 0..3 {
            let token = stats.begin();
            thread::sleep(Duration::from_millis(10));
            stats.end(token);
        }
        let fps = stats.maybe_flush(Instant::now()).unwrap();
        // 平均10ms強 → 100fps弱。スリープ精度を考慮して上限だけ固く見る
        assert!(fps > 5.0 && fps < 105.0, "fps={fps}");
    }
}
